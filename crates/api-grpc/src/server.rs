//! Server lifecycle: bind, serve, drain, terminate.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use api_shared::pb::ai_service_server::AiServiceServer;
use api_shared::FILE_DESCRIPTOR_SET;
use tokio::net::TcpListener;
use tokio::task::JoinError;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;

use crate::service::DiagnosisService;

/// How long forcibly terminated calls get to release their streams.
const TERMINATION_TIMEOUT: Duration = Duration::from_secs(2);

/// How long the transport gets to close idle connections after every call has ended.
const TRANSPORT_CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Fatal server errors. Any of these before serving starts aborts the process.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind gRPC listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to build reflection service: {0}")]
    Reflection(String),
    #[error("gRPC transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
    #[error("gRPC server task failed: {0}")]
    Task(#[from] JoinError),
}

/// Bind the gRPC listener.
///
/// Binding happens before any service is registered so an occupied port fails startup early.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })
}

/// A bound gRPC server for the diagnosis service.
pub struct GrpcServer {
    listener: TcpListener,
    service: DiagnosisService,
    grace_period: Duration,
    reflection: bool,
}

impl GrpcServer {
    pub fn new(listener: TcpListener, service: DiagnosisService, grace_period: Duration) -> Self {
        Self {
            listener,
            service,
            grace_period,
            reflection: false,
        }
    }

    /// Also register gRPC server reflection.
    pub fn with_reflection(mut self, enabled: bool) -> Self {
        self.reflection = enabled;
        self
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until `shutdown` resolves, then shut down.
    ///
    /// Shutdown stops accepting connections and calls, waits up to the grace period for
    /// in-flight calls, then ends any that remain with `UNAVAILABLE`. Returns `Ok(())` once the
    /// server has stopped, whether or not calls had to be terminated.
    ///
    /// # Errors
    ///
    /// Returns `ServerError` if reflection cannot be built or the transport fails while serving.
    pub async fn run<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        let addr = self.local_addr().ok();
        let in_flight = self.service.in_flight().clone();
        let terminate = self.service.terminate_token().clone();
        let stop_accepting = CancellationToken::new();

        let mut router = Server::builder().add_service(AiServiceServer::new(self.service));

        if self.reflection {
            let reflection_service = tonic_reflection::server::Builder::configure()
                .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
                .build_v1()
                .map_err(|e| ServerError::Reflection(e.to_string()))?;
            router = router.add_service(reflection_service);
            tracing::info!("gRPC server reflection enabled");
        } else {
            tracing::info!("gRPC server reflection disabled");
        }

        let incoming = TcpListenerStream::new(self.listener);
        let mut serving = tokio::spawn(
            router.serve_with_incoming_shutdown(incoming, stop_accepting.clone().cancelled_owned()),
        );

        if let Some(addr) = addr {
            tracing::info!("++ Diagnosis gRPC listening on {}", addr);
        }

        tokio::select! {
            result = &mut serving => {
                // The transport stopped without being asked to.
                result??;
                return Ok(());
            }
            _ = shutdown => {}
        }

        tracing::info!(
            in_flight = in_flight.len(),
            grace_secs = self.grace_period.as_secs_f64(),
            "shutdown requested, no longer accepting calls"
        );
        stop_accepting.cancel();
        in_flight.close();

        if tokio::time::timeout(self.grace_period, in_flight.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                remaining = in_flight.len(),
                "grace period elapsed, terminating in-flight calls"
            );
            terminate.cancel();
            if tokio::time::timeout(TERMINATION_TIMEOUT, in_flight.wait())
                .await
                .is_err()
            {
                tracing::warn!(
                    remaining = in_flight.len(),
                    "calls still open after termination"
                );
            }
        }

        match tokio::time::timeout(TRANSPORT_CLOSE_TIMEOUT, &mut serving).await {
            Ok(result) => result??,
            Err(_) => {
                tracing::warn!("transport did not close in time, dropping remaining connections");
                serving.abort();
            }
        }

        tracing::info!("-- Diagnosis gRPC stopped");
        Ok(())
    }
}
