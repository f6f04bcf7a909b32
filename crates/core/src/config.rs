//! Completion provider configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into the provider. Request handling never reads environment variables.

use crate::constants::DEFAULT_PROVIDER_BASE_URL;
use crate::error::ConfigError;

/// Provider credential. Its `Debug` output never contains the secret.
#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wraps a credential, rejecting blank values.
    pub fn new(value: impl Into<String>) -> Result<Self, ConfigError> {
        let value = value.into().trim().to_owned();
        if value.is_empty() {
            return Err(ConfigError::Missing("OPENAI_API_KEY"));
        }
        Ok(Self(value))
    }

    pub(crate) fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

/// Provider configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct ProviderConfig {
    api_key: ApiKey,
    base_url: String,
}

impl ProviderConfig {
    /// Create a new `ProviderConfig`.
    ///
    /// `base_url` must be an absolute `http` or `https` URL; a trailing slash is allowed.
    pub fn new(api_key: ApiKey, base_url: impl Into<String>) -> Result<Self, ConfigError> {
        let base_url = base_url.into().trim().to_owned();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                name: "OPENAI_BASE_URL",
                reason: format!("{base_url:?} is not an http(s) URL"),
            });
        }

        Ok(Self { api_key, base_url })
    }

    pub fn api_key(&self) -> &ApiKey {
        &self.api_key
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Build the provider configuration from optional environment values.
///
/// `api_key` is required. A missing or blank `base_url` falls back to the public OpenAI API.
pub fn provider_config_from_env_values(
    api_key: Option<String>,
    base_url: Option<String>,
) -> Result<ProviderConfig, ConfigError> {
    let api_key = ApiKey::new(api_key.ok_or(ConfigError::Missing("OPENAI_API_KEY"))?)?;
    let base_url = base_url
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_PROVIDER_BASE_URL.to_string());

    ProviderConfig::new(api_key, base_url)
}
