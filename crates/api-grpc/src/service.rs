// Re-export the proto module from the shared `api-shared` crate so callers
// can reference `api_grpc::pb`.
pub use api_shared::pb;

use std::pin::Pin;

use api_shared::pb::ai_service_server::AiService;
use api_shared::pb::{DiagnoseRequest, DiagnoseResponse};
use diagnosis_core::{DiagnosisEngine, DiagnosisFragment, FragmentStream, ProviderError};
use futures_util::stream::{self, Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tonic::{Request, Response, Status};

use crate::decode::decode_request;
use crate::session::Session;

pub type ResponseStream = Pin<Box<dyn Stream<Item = Result<DiagnoseResponse, Status>> + Send>>;

/// gRPC adapter around the diagnosis engine.
///
/// Cloned handles share the engine, the in-flight tracker and the termination token. All
/// per-call data flows through the call itself; nothing request-specific is stored here.
#[derive(Clone, Debug)]
pub struct DiagnosisService {
    engine: DiagnosisEngine,
    in_flight: TaskTracker,
    terminate: CancellationToken,
}

impl DiagnosisService {
    pub fn new(engine: DiagnosisEngine) -> Self {
        Self {
            engine,
            in_flight: TaskTracker::new(),
            terminate: CancellationToken::new(),
        }
    }

    /// Tracks every open call. Closing it makes the service refuse new calls.
    pub(crate) fn in_flight(&self) -> &TaskTracker {
        &self.in_flight
    }

    /// Cancelling this ends every open response stream with `UNAVAILABLE`.
    pub(crate) fn terminate_token(&self) -> &CancellationToken {
        &self.terminate
    }
}

#[tonic::async_trait]
impl AiService for DiagnosisService {
    type DiagnoseStream = ResponseStream;

    async fn diagnose(
        &self,
        req: Request<DiagnoseRequest>,
    ) -> Result<Response<Self::DiagnoseStream>, Status> {
        if self.in_flight.is_closed() {
            return Err(Status::unavailable("server is shutting down"));
        }

        let peer = req.remote_addr().map(|addr| addr.to_string());
        let mut session = Session::start(peer, self.in_flight.token());

        let request = match decode_request(req.into_inner()) {
            Ok(request) => request,
            Err(e) => {
                session.rejected(&e);
                return Err(Status::invalid_argument(e.to_string()));
            }
        };

        let fragments = self.engine.diagnose(request);
        Ok(Response::new(relay(fragments, session, self.terminate.clone())))
    }
}

/// State threaded through the `unfold` stream.
struct Relay {
    fragments: FragmentStream,
    session: Session,
    terminate: CancellationToken,
    done: bool,
}

enum Next {
    Terminated,
    Fragment(Option<Result<DiagnosisFragment, ProviderError>>),
}

/// Forward engine fragments one-for-one as responses.
///
/// The stream ends cleanly when the engine does, or with one error status on provider failure or
/// forced shutdown. On either error the engine stream is released before the status is yielded.
fn relay(
    fragments: FragmentStream,
    session: Session,
    terminate: CancellationToken,
) -> ResponseStream {
    let state = Relay {
        fragments,
        session,
        terminate,
        done: false,
    };

    Box::pin(stream::unfold(state, |mut st| async move {
        if st.done {
            return None;
        }

        let next = tokio::select! {
            biased;
            _ = st.terminate.cancelled() => Next::Terminated,
            item = st.fragments.next() => Next::Fragment(item),
        };

        match next {
            Next::Fragment(Some(Ok(fragment))) => {
                st.session.record_fragment();
                let response = DiagnoseResponse {
                    content: fragment.into_content(),
                };
                Some((Ok(response), st))
            }
            Next::Fragment(Some(Err(e))) => {
                st.done = true;
                st.fragments = stream::empty().boxed();
                st.session.failed(&e);
                Some((Err(Status::internal(format!("diagnosis failed: {e}"))), st))
            }
            Next::Fragment(None) => {
                st.session.completed();
                None
            }
            Next::Terminated => {
                st.done = true;
                st.fragments = stream::empty().boxed();
                st.session.terminated();
                Some((Err(Status::unavailable("server is shutting down")), st))
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use diagnosis_core::testing::{ScriptedProvider, Step};
    use std::sync::Arc;
    use std::time::Duration;
    use tonic::Code;

    fn valid_request() -> DiagnoseRequest {
        DiagnoseRequest {
            patient_info: Some(pb::PatientInfoForPrompt {
                name: "Beatriz Rocha".into(),
                age: 63,
                gender: "feminino".into(),
                weight: 70.0,
                height: 158.0,
            }),
            messages: vec![pb::Message {
                role: "user".into(),
                content: "Tenho sede excessiva e urino muito.".into(),
            }],
        }
    }

    fn service(provider: &Arc<ScriptedProvider>) -> DiagnosisService {
        DiagnosisService::new(DiagnosisEngine::new(provider.clone()))
    }

    async fn open(
        svc: &DiagnosisService,
        request: DiagnoseRequest,
    ) -> Result<ResponseStream, Status> {
        svc.diagnose(Request::new(request))
            .await
            .map(Response::into_inner)
    }

    #[tokio::test]
    async fn test_one_response_per_fragment_in_order() {
        let provider = Arc::new(ScriptedProvider::deltas([
            "Os sintomas ",
            "sugerem ",
            "diabetes.",
        ]));
        let svc = service(&provider);

        let items: Vec<_> = open(&svc, valid_request()).await.unwrap().collect().await;

        let contents: Vec<String> = items.into_iter().map(|r| r.unwrap().content).collect();
        assert_eq!(contents, vec!["Os sintomas ", "sugerem ", "diabetes."]);
        assert_eq!(contents.concat(), "Os sintomas sugerem diabetes.");
    }

    #[tokio::test]
    async fn test_provider_failure_after_k_fragments_ends_with_internal() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Step::delta("um"),
            Step::delta("dois"),
            Step::Fail("upstream 502".into()),
            Step::delta("never"),
        ]));
        let svc = service(&provider);

        let items: Vec<_> = open(&svc, valid_request()).await.unwrap().collect().await;

        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_ref().unwrap().content, "um");
        assert_eq!(items[1].as_ref().unwrap().content, "dois");
        let status = items[2].as_ref().unwrap_err();
        assert_eq!(status.code(), Code::Internal);
        assert!(status.message().contains("upstream 502"));
        assert_eq!(provider.cancelled_count(), 0);
    }

    #[tokio::test]
    async fn test_provider_failure_before_any_fragment() {
        let provider = Arc::new(ScriptedProvider::failing_on_open("HTTP 401"));
        let svc = service(&provider);

        let items: Vec<_> = open(&svc, valid_request()).await.unwrap().collect().await;

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap_err().code(), Code::Internal);
    }

    #[tokio::test]
    async fn test_invalid_requests_never_reach_provider() {
        let provider = Arc::new(ScriptedProvider::deltas(["x"]));
        let svc = service(&provider);

        let mut no_patient = valid_request();
        no_patient.patient_info = None;

        let mut no_name = valid_request();
        no_name.patient_info.as_mut().unwrap().name = "  ".into();

        let mut no_weight = valid_request();
        no_weight.patient_info.as_mut().unwrap().weight = 0.0;

        let mut negative_age = valid_request();
        negative_age.patient_info.as_mut().unwrap().age = -3;

        let mut no_messages = valid_request();
        no_messages.messages.clear();

        let mut bad_role = valid_request();
        bad_role.messages[0].role = "system".into();

        for request in [no_patient, no_name, no_weight, negative_age, no_messages, bad_role] {
            let status = open(&svc, request).await.err().unwrap();
            assert_eq!(status.code(), Code::InvalidArgument);
        }
        assert_eq!(provider.call_count(), 0);
        assert!(svc.in_flight().is_empty());
    }

    #[tokio::test]
    async fn test_dropping_response_stream_cancels_provider_call() {
        let provider = Arc::new(ScriptedProvider::new(vec![Step::delta("início"), Step::Hang]));
        let svc = service(&provider);

        let mut stream = open(&svc, valid_request()).await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap().content, "início");
        assert_eq!(svc.in_flight().len(), 1);

        drop(stream);

        assert!(provider.wait_for_cancellation(Duration::from_secs(1)).await);
        assert!(svc.in_flight().is_empty());
    }

    #[tokio::test]
    async fn test_termination_ends_stream_with_unavailable() {
        let provider = Arc::new(ScriptedProvider::new(vec![Step::delta("a"), Step::Hang]));
        let svc = service(&provider);

        let mut stream = open(&svc, valid_request()).await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap().content, "a");

        svc.terminate_token().cancel();

        let status = stream.next().await.unwrap().unwrap_err();
        assert_eq!(status.code(), Code::Unavailable);
        assert!(stream.next().await.is_none());
        assert_eq!(provider.cancelled_count(), 1);
    }

    #[tokio::test]
    async fn test_closed_tracker_refuses_new_calls() {
        let provider = Arc::new(ScriptedProvider::deltas(["x"]));
        let svc = service(&provider);
        svc.in_flight().close();

        let status = open(&svc, valid_request()).await.err().unwrap();
        assert_eq!(status.code(), Code::Unavailable);
        assert_eq!(provider.call_count(), 0);
    }
}
