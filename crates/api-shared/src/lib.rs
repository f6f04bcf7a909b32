//! # API Shared
//!
//! Wire definitions for the diagnosis API.
//!
//! Contains:
//! - Protobuf-generated types (`pb` module) for the `ai.v1` package
//! - The encoded file-descriptor set used for gRPC reflection
//!
//! Used by `api-grpc`. Domain types live in `diagnosis-core` and never depend on this crate.

// The generated code is placed into OUT_DIR at build time by the build script.
pub mod pb {
    tonic::include_proto!("ai.v1");
}

pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("proto_descriptor");

pub use pb::*;
