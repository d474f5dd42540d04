//! Core protocol types for Connect, gRPC and gRPC-Web.
//!
//! This crate provides the wire-level pieces shared by the client
//! (`connectrpc-client`) and by the server-side helpers in [`server`].
//!
//! ## Modules
//!
//! - `error`: Status codes and the [`ConnectError`] failure type
//! - `metadata`: Case-insensitive, multi-valued headers and trailers
//! - `pool`: The [`CompressionPool`] trait and built-in algorithms
//! - `compression`: Compression negotiation
//! - `envelope`: Length-prefixed message framing
//! - `completion`: gRPC status trailers
//! - `timeout`: `grpc-timeout` and `connect-timeout-ms`
//! - `json`: Connect error bodies and end-of-stream messages
//! - [`server`]: Server-side request parsing and response encoding

mod completion;
mod compression;
mod envelope;
mod error;
mod json;
mod metadata;
mod pool;
mod timeout;

pub mod server;

pub use completion::*;
pub use compression::*;
pub use envelope::*;
pub use error::*;
pub use json::*;
pub use metadata::*;
pub use pool::*;
pub use timeout::*;
