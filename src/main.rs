use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tracing_subscriber::filter::{Directive, LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use api_grpc::config::{log_level_from_env_value, server_config_from_env_values};
use api_grpc::{DiagnosisService, GrpcServer};
use diagnosis_core::constants::DIAGNOSIS_MODEL;
use diagnosis_core::{provider_config_from_env_values, DiagnosisEngine, OpenAiProvider};

/// HTTP internals that are never logged below `info`, whatever `LOG_LEVEL` says.
const CAPPED_TARGETS: [&str; 3] = ["hyper", "h2", "reqwest"];

/// Main entry point for the diagnosis gRPC server
///
/// Loads `.env`, configures logging, resolves configuration, binds the listener and serves until
/// SIGINT or SIGTERM. In-flight calls then get the grace period to finish before they are
/// terminated.
///
/// # Environment Variables
/// - `GRPC_PORT`: gRPC listen port (default: 50051)
/// - `LOG_LEVEL`: TRACE, DEBUG, INFO, WARNING, ERROR or CRITICAL (default: INFO); `RUST_LOG`
///   takes precedence when set
/// - `OPENAI_API_KEY`: completion provider credential (required, never logged)
/// - `OPENAI_BASE_URL`: OpenAI-compatible API base (default: "https://api.openai.com/v1")
/// - `SHUTDOWN_GRACE_SECS`: grace period for in-flight calls on shutdown (default: 10)
/// - `GRPC_ENABLE_REFLECTION`: register gRPC server reflection (default: false)
///
/// # Returns
/// * `Ok(())` - After a clean shutdown
/// * `Err(anyhow::Error)` - If configuration, binding or the transport fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let log_level = log_level_from_env_value(env("LOG_LEVEL"))?;
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let mut filter = EnvFilter::default().add_directive(log_level.into());
            let capped = log_level.min(LevelFilter::INFO);
            for target in CAPPED_TARGETS {
                filter = filter.add_directive(format!("{target}={capped}").parse::<Directive>()?);
            }
            filter
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let server_config = server_config_from_env_values(
        env("GRPC_PORT"),
        env("SHUTDOWN_GRACE_SECS"),
        env("GRPC_ENABLE_REFLECTION"),
    )?;
    let provider_config =
        provider_config_from_env_values(env("OPENAI_API_KEY"), env("OPENAI_BASE_URL"))?;

    let provider = OpenAiProvider::new(provider_config)?;
    tracing::info!(
        endpoint = provider.endpoint(),
        model = DIAGNOSIS_MODEL,
        "completion provider configured"
    );

    let engine = DiagnosisEngine::new(Arc::new(provider));
    let listener = api_grpc::bind(server_config.addr()).await?;
    let server = GrpcServer::new(
        listener,
        DiagnosisService::new(engine),
        server_config.grace_period,
    )
    .with_reflection(server_config.reflection);

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let shutdown = async move {
        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM signal");
            }
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT signal");
            }
        }
    };

    server.run(shutdown).await?;

    Ok(())
}

fn env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}
