/// Reasons a diagnosis request is rejected before any provider call is made.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("patient_info is required")]
    MissingPatientInfo,
    #[error("patient {0} is required")]
    MissingField(&'static str),
    #[error("patient age cannot be negative (got {0})")]
    NegativeAge(i32),
    #[error("patient {field} must be a finite number greater than zero (got {value})")]
    NonPositive { field: &'static str, value: f32 },
    #[error("at least one message is required")]
    NoMessages,
    #[error("message {index} has unsupported role {role:?} (expected \"user\" or \"assistant\")")]
    UnsupportedRole { index: usize, role: String },
    #[error("message {index} has empty content")]
    EmptyContent { index: usize },
}

/// Failures of the upstream completion provider.
///
/// Raised either when opening the streamed completion or at any point while it is being read.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("failed to reach completion provider: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("completion provider returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("completion provider reported an error: {0}")]
    Upstream(String),
    #[error("malformed completion stream chunk: {0}")]
    MalformedChunk(#[source] serde_json::Error),
    #[error("completion stream ended before the completion signal")]
    UnexpectedEof,
    #[error("completion stream line exceeds {0} bytes")]
    LineTooLong(usize),
}

/// Invalid process configuration detected at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
    #[error("failed to build provider HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

pub type ValidationResult<T> = std::result::Result<T, ValidationError>;
