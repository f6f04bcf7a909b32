//! # Diagnosis Core
//!
//! Core logic for the streaming diagnosis service.
//!
//! This crate contains:
//! - The validated patient and conversation model
//! - The diagnosis instruction template and provider payload assembly
//! - The completion provider port and its OpenAI-compatible adapter
//! - The diagnosis engine, which exposes a provider call as a lazy, cancellable fragment stream
//!
//! **No API concerns**: gRPC servers, wire types and status mapping belong in `api-grpc` and
//! `api-shared`.

pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod patient;
pub mod prompt;
pub mod provider;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use config::{provider_config_from_env_values, ApiKey, ProviderConfig};
pub use engine::{DiagnosisEngine, DiagnosisFragment, FragmentStream};
pub use error::{ConfigError, ProviderError, ValidationError};
pub use patient::{ConversationTurn, DiagnosisRequest, PatientContext, Role};
pub use provider::{CompletionProvider, OpenAiProvider};
