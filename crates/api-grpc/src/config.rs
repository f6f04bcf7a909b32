//! Server runtime configuration.
//!
//! Values are parsed once at startup from optional environment strings, so every parser here can
//! be tested without touching the process environment.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use diagnosis_core::ConfigError;
use tracing::level_filters::LevelFilter;

/// Port used when `GRPC_PORT` is unset.
pub const DEFAULT_GRPC_PORT: u16 = 50051;

/// Time in-flight calls get to finish once shutdown starts, when `SHUTDOWN_GRACE_SECS` is unset.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Server configuration resolved at startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    pub grace_period: Duration,
    pub reflection: bool,
}

impl ServerConfig {
    /// Listen on every IPv4 interface.
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_GRPC_PORT,
            grace_period: DEFAULT_SHUTDOWN_GRACE,
            reflection: false,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse `GRPC_PORT`. Missing or blank values use [`DEFAULT_GRPC_PORT`].
pub fn port_from_env_value(value: Option<String>) -> Result<u16, ConfigError> {
    let Some(value) = non_blank(value) else {
        return Ok(DEFAULT_GRPC_PORT);
    };

    match value.parse::<u16>() {
        Ok(0) | Err(_) => Err(ConfigError::Invalid {
            name: "GRPC_PORT",
            reason: format!("{value:?} is not a port between 1 and 65535"),
        }),
        Ok(port) => Ok(port),
    }
}

/// Parse `SHUTDOWN_GRACE_SECS` as whole seconds.
pub fn grace_period_from_env_value(value: Option<String>) -> Result<Duration, ConfigError> {
    let Some(value) = non_blank(value) else {
        return Ok(DEFAULT_SHUTDOWN_GRACE);
    };

    value
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| ConfigError::Invalid {
            name: "SHUTDOWN_GRACE_SECS",
            reason: format!("{value:?} is not a whole number of seconds"),
        })
}

/// Parse `GRPC_ENABLE_REFLECTION`. Only `true`/`false` (any case) are accepted.
pub fn reflection_from_env_value(value: Option<String>) -> Result<bool, ConfigError> {
    match non_blank(value) {
        None => Ok(false),
        Some(v) if v.eq_ignore_ascii_case("true") => Ok(true),
        Some(v) if v.eq_ignore_ascii_case("false") => Ok(false),
        Some(v) => Err(ConfigError::Invalid {
            name: "GRPC_ENABLE_REFLECTION",
            reason: format!("{v:?} is not true or false"),
        }),
    }
}

/// Map a `LOG_LEVEL` severity name to a tracing level filter.
///
/// Accepts the usual severity names in any case, including `WARNING` and `CRITICAL`. Missing or
/// blank values mean `INFO`.
pub fn log_level_from_env_value(value: Option<String>) -> Result<LevelFilter, ConfigError> {
    let Some(value) = non_blank(value) else {
        return Ok(LevelFilter::INFO);
    };

    let level = match value.to_ascii_uppercase().as_str() {
        "TRACE" => LevelFilter::TRACE,
        "DEBUG" => LevelFilter::DEBUG,
        "INFO" => LevelFilter::INFO,
        "WARN" | "WARNING" => LevelFilter::WARN,
        "ERROR" | "CRITICAL" | "FATAL" => LevelFilter::ERROR,
        "OFF" | "NONE" => LevelFilter::OFF,
        _ => {
            return Err(ConfigError::Invalid {
                name: "LOG_LEVEL",
                reason: format!("{value:?} is not a known severity"),
            })
        }
    };
    Ok(level)
}

/// Resolve the full server configuration from optional environment values.
pub fn server_config_from_env_values(
    port: Option<String>,
    grace_secs: Option<String>,
    reflection: Option<String>,
) -> Result<ServerConfig, ConfigError> {
    Ok(ServerConfig {
        port: port_from_env_value(port)?,
        grace_period: grace_period_from_env_value(grace_secs)?,
        reflection: reflection_from_env_value(reflection)?,
    })
}
