//! Diagnosis engine.
//!
//! Turns a validated [`DiagnosisRequest`] into a lazy stream of text fragments produced by the
//! completion provider.

use std::sync::Arc;

use futures_util::stream::{self, BoxStream, StreamExt, TryStreamExt};

use crate::error::ProviderError;
use crate::patient::DiagnosisRequest;
use crate::prompt::build_completion_request;
use crate::provider::CompletionProvider;

/// One non-empty unit of generated diagnosis text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosisFragment(String);

impl DiagnosisFragment {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_content(self) -> String {
        self.0
    }
}

/// Fragments of one diagnosis, in provider order.
///
/// The stream is single-pass. An `Err` item means the result is incomplete; fragments already
/// yielded stay valid. Dropping the stream cancels the in-flight provider call.
pub type FragmentStream = BoxStream<'static, Result<DiagnosisFragment, ProviderError>>;

/// Produces diagnoses from a shared completion provider.
///
/// Holds no per-request state; one engine serves every concurrent request.
#[derive(Clone)]
pub struct DiagnosisEngine {
    provider: Arc<dyn CompletionProvider>,
}

impl DiagnosisEngine {
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self { provider }
    }

    /// Starts a diagnosis for `request`.
    ///
    /// Nothing is sent to the provider until the returned stream is first polled. Empty deltas
    /// are dropped; every other delta becomes exactly one fragment. No retry is attempted.
    pub fn diagnose(&self, request: DiagnosisRequest) -> FragmentStream {
        let completion = build_completion_request(&request);
        let provider = Arc::clone(&self.provider);

        stream::once(async move { provider.stream_completion(completion).await })
            .try_flatten()
            .try_filter_map(|delta| async move {
                Ok((!delta.is_empty()).then_some(DiagnosisFragment(delta)))
            })
            .boxed()
    }
}

impl std::fmt::Debug for DiagnosisEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiagnosisEngine").finish_non_exhaustive()
    }
}
