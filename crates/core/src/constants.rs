//! Constants used throughout the diagnosis core crate.
//!
//! Model selection and sampling are fixed process-wide and never derived from request input.

/// Model identifier sent with every completion request.
pub const DIAGNOSIS_MODEL: &str = "gpt-4o";

/// Sampling temperature sent with every completion request.
pub const DIAGNOSIS_TEMPERATURE: f32 = 0.2;

/// Base URL of the default OpenAI-compatible completion provider.
pub const DEFAULT_PROVIDER_BASE_URL: &str = "https://api.openai.com/v1";

/// Path appended to the provider base URL for chat completions.
pub const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";

/// Maximum number of bytes of a provider error body kept in `ProviderError::Status`.
pub const MAX_ERROR_BODY_BYTES: usize = 512;

/// Completion signal carried by the final Server-Sent Events `data:` line.
pub const SSE_DONE_SENTINEL: &str = "[DONE]";

/// Longest Server-Sent Events line accepted from the provider before the stream is failed.
pub const MAX_SSE_LINE_BYTES: usize = 1024 * 1024;
