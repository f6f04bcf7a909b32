//! Per-call session bookkeeping.
//!
//! A `Session` lives exactly as long as one `Diagnose` call. It carries the caller identity and
//! a correlation id for every log line, and holds the call's slot in the server's in-flight
//! tracker. Patient content is never logged.

use std::time::Instant;

use diagnosis_core::{ProviderError, ValidationError};
use tokio_util::task::task_tracker::TaskTrackerToken;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Completed,
    Rejected,
    Failed,
    Terminated,
}

pub(crate) struct Session {
    id: Uuid,
    peer: String,
    started: Instant,
    fragments: usize,
    outcome: Option<Outcome>,
    _in_flight: TaskTrackerToken,
}

impl Session {
    pub(crate) fn start(peer: Option<String>, in_flight: TaskTrackerToken) -> Self {
        let session = Self {
            id: Uuid::new_v4(),
            peer: peer.unwrap_or_else(|| "unknown".to_string()),
            started: Instant::now(),
            fragments: 0,
            outcome: None,
            _in_flight: in_flight,
        };
        tracing::info!(request_id = %session.id, peer = %session.peer, "diagnosis started");
        session
    }

    pub(crate) fn record_fragment(&mut self) {
        self.fragments += 1;
    }

    pub(crate) fn rejected(&mut self, err: &ValidationError) {
        self.outcome = Some(Outcome::Rejected);
        tracing::warn!(
            request_id = %self.id,
            peer = %self.peer,
            error = %err,
            "diagnosis request rejected"
        );
    }

    pub(crate) fn completed(&mut self) {
        self.outcome = Some(Outcome::Completed);
        tracing::info!(
            request_id = %self.id,
            peer = %self.peer,
            fragments = self.fragments,
            elapsed_ms = self.elapsed_ms(),
            "diagnosis completed"
        );
    }

    pub(crate) fn failed(&mut self, err: &ProviderError) {
        self.outcome = Some(Outcome::Failed);
        tracing::error!(
            request_id = %self.id,
            peer = %self.peer,
            fragments = self.fragments,
            elapsed_ms = self.elapsed_ms(),
            error = ?err,
            "diagnosis failed"
        );
    }

    pub(crate) fn terminated(&mut self) {
        self.outcome = Some(Outcome::Terminated);
        tracing::warn!(
            request_id = %self.id,
            peer = %self.peer,
            fragments = self.fragments,
            elapsed_ms = self.elapsed_ms(),
            "diagnosis terminated by server shutdown"
        );
    }

    fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

impl Drop for Session {
    // Dropped without an outcome means the transport let go of the response stream first.
    fn drop(&mut self) {
        if self.outcome.is_none() {
            tracing::info!(
                request_id = %self.id,
                peer = %self.peer,
                fragments = self.fragments,
                elapsed_ms = self.elapsed_ms(),
                "diagnosis cancelled by caller"
            );
        }
    }
}
