//! # API gRPC
//!
//! gRPC server implementation for the diagnosis service.
//!
//! Handles:
//! - Decoding wire requests into `diagnosis-core` types
//! - Streaming engine fragments back as `DiagnoseResponse` messages
//! - Per-call session logging and cancellation
//! - Server lifecycle: binding, serving, graceful and forced shutdown
//!
//! Uses `api-shared` for the generated protobuf types.

#![warn(rust_2018_idioms)]

pub use service::{pb, DiagnosisService};
pub use server::{bind, GrpcServer, ServerError};

pub mod config;
pub mod decode;
pub mod server;
pub mod service;
mod session;
