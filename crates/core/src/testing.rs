//! Scripted completion provider for tests.
//!
//! Available to this crate's tests and, through the `test-utils` feature, to downstream crates.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use tokio::sync::Notify;

use crate::error::ProviderError;
use crate::provider::{CompletionProvider, CompletionRequest, DeltaStream};

/// One scripted action of a fake completion stream.
#[derive(Debug, Clone)]
pub enum Step {
    /// Yield a content delta.
    Delta(String),
    /// Sleep before the next step.
    Delay(Duration),
    /// Yield `ProviderError::Upstream` and end the stream.
    Fail(String),
    /// Never yield again.
    Hang,
}

impl Step {
    pub fn delta(content: impl Into<String>) -> Self {
        Self::Delta(content.into())
    }
}

#[derive(Debug, Clone)]
enum Script {
    Steps(Vec<Step>),
    /// Echo every submitted message back as one delta each, pausing between them.
    Echo(Duration),
    FailOnOpen(String),
}

#[derive(Default)]
struct Signals {
    cancelled: AtomicUsize,
    notify: Notify,
}

/// Fake provider that records requests and replays a script for each call.
pub struct ScriptedProvider {
    script: Script,
    requests: Mutex<Vec<CompletionRequest>>,
    signals: Arc<Signals>,
}

impl ScriptedProvider {
    pub fn new(steps: Vec<Step>) -> Self {
        Self::with_script(Script::Steps(steps))
    }

    pub fn deltas<I, S>(deltas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(deltas.into_iter().map(Step::delta).collect())
    }

    pub fn echo(pause: Duration) -> Self {
        Self::with_script(Script::Echo(pause))
    }

    pub fn failing_on_open(message: impl Into<String>) -> Self {
        Self::with_script(Script::FailOnOpen(message.into()))
    }

    fn with_script(script: Script) -> Self {
        Self {
            script,
            requests: Mutex::new(Vec::new()),
            signals: Arc::default(),
        }
    }

    /// Number of times `stream_completion` was called.
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of streams dropped before their script ran out.
    pub fn cancelled_count(&self) -> usize {
        self.signals.cancelled.load(Ordering::SeqCst)
    }

    /// Waits until at least one stream has been cancelled. Returns `false` on timeout.
    pub async fn wait_for_cancellation(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            loop {
                let notified = self.signals.notify.notified();
                if self.cancelled_count() > 0 {
                    return;
                }
                notified.await;
            }
        })
        .await
        .is_ok()
    }
}

/// Counts a cancellation when dropped before the script finished.
struct CancelGuard {
    signals: Arc<Signals>,
    finished: bool,
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.signals.cancelled.fetch_add(1, Ordering::SeqCst);
            self.signals.notify.notify_one();
        }
    }
}

struct Playback {
    steps: VecDeque<Step>,
    guard: CancelGuard,
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn stream_completion(
        &self,
        request: CompletionRequest,
    ) -> Result<DeltaStream, ProviderError> {
        let steps: VecDeque<Step> = match &self.script {
            Script::Steps(steps) => steps.iter().cloned().collect(),
            Script::Echo(pause) => request
                .messages
                .iter()
                .flat_map(|m| [Step::Delay(*pause), Step::delta(m.content.clone())])
                .collect(),
            Script::FailOnOpen(message) => {
                self.requests.lock().unwrap().push(request);
                return Err(ProviderError::Upstream(message.clone()));
            }
        };
        self.requests.lock().unwrap().push(request);

        let playback = Playback {
            steps,
            guard: CancelGuard {
                signals: Arc::clone(&self.signals),
                finished: false,
            },
        };

        Ok(stream::unfold(playback, |mut pb| async move {
            loop {
                match pb.steps.pop_front() {
                    None => {
                        pb.guard.finished = true;
                        return None;
                    }
                    Some(Step::Delta(content)) => return Some((Ok(content), pb)),
                    Some(Step::Delay(pause)) => tokio::time::sleep(pause).await,
                    Some(Step::Fail(message)) => {
                        pb.steps.clear();
                        pb.guard.finished = true;
                        return Some((Err(ProviderError::Upstream(message)), pb));
                    }
                    Some(Step::Hang) => std::future::pending::<()>().await,
                }
            }
        })
        .boxed())
    }
}
