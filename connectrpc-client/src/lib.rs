//! Connect, gRPC and gRPC-Web client for Rust.
//!
//! A [`ProtocolClient`] speaks one of three wire protocols to one host. The
//! protocol is an interceptor like any other: it sits innermost in the
//! chain, turning protocol-agnostic requests into its headers and framing,
//! and classifying responses into a message or a [`ConnectError`].
//!
//! ## Features
//!
//! - Unary, server-streaming, client-streaming and bidirectional calls
//! - Connect (including GET for side-effect-free methods), gRPC and gRPC-Web
//! - Protobuf and JSON encoding
//! - Request compression and response decompression (gzip, deflate, brotli, zstd)
//! - Timeouts and caller cancellation
//!
//! ## Example
//!
//! ```ignore
//! use connectrpc_client::{CallOptions, ClientBuilder, MethodSpec, Protocol};
//!
//! let client = ClientBuilder::new("https://demo.connectrpc.com")
//!     .protocol(Protocol::Grpc)
//!     .build()?;
//!
//! let method = MethodSpec::unary("connectrpc.eliza.v1.ElizaService/Say");
//! let response = client
//!     .unary::<SayRequest, SayResponse>(&method, &request, CallOptions::new())
//!     .await;
//!
//! match response {
//!     ResponseMessage::Success { message, .. } => println!("{message:?}"),
//!     ResponseMessage::Failure { cause, .. } => eprintln!("{} {:?}", cause.code(), cause.message()),
//! }
//! ```
//!
//! ## Streaming
//!
//! Streams yield [`StreamResult`] events: `Headers` first, then any number of
//! `Message`s, then exactly one `Complete` with the trailers and, on
//! failure, the cause.
//!
//! ```ignore
//! let mut stream = client
//!     .server_stream::<ListRequest, ListItem>(&method, &request, CallOptions::new())
//!     .await;
//!
//! while let Some(event) = stream.receive().await {
//!     match event {
//!         StreamResult::Headers(headers) => println!("headers: {headers:?}"),
//!         StreamResult::Message(item) => println!("item: {item:?}"),
//!         StreamResult::Complete { cause: Some(cause), .. } => eprintln!("failed: {cause}"),
//!         StreamResult::Complete { .. } => println!("done"),
//!     }
//! }
//! ```
//!
//! ## Timeouts and Cancellation
//!
//! Calls time out after [`DEFAULT_TIMEOUT`] unless configured otherwise with
//! [`ClientBuilder::timeout`], [`ClientBuilder::no_timeout`] or
//! [`CallOptions::timeout`]. The timeout is also sent to the server as
//! `connect-timeout-ms` or `grpc-timeout`.
//!
//! A call that times out fails with [`Code::DeadlineExceeded`]. A call
//! aborted through a [`Cancelable`] fails with [`Code::Canceled`].
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `tls` (default) | `tls-ring` + `tls-native-roots` |
//! | `tls-ring` / `tls-aws-lc` | rustls crypto provider |
//! | `tls-native-roots` / `tls-webpki-roots` | Root certificates |
//! | `compression-gzip` (default) | Gzip |
//! | `compression-deflate` / `compression-br` / `compression-zstd` | Other compression pools |
//! | `compression-full` | All compression pools |
//! | `tracing` (default) | Spans and events for RPC calls |
//!
//! With `tracing` enabled, each call runs in an `rpc.call` span with
//! `rpc.method`, `rpc.type`, `rpc.protocol`, `rpc.encoding` and `otel.kind`.

mod builder;
mod call;
mod client;
mod codec;
mod config;
mod interceptor;
mod method;
mod options;
mod protocol;
mod request;
mod response;
mod stream_result;
mod streaming;
pub mod transport;

pub use builder::{ClientBuildError, ClientBuilder};
pub use call::{CallPhase, CallState, Cancelable};
pub use client::ProtocolClient;
pub use codec::{Encoding, Message};
pub use config::{DEFAULT_TIMEOUT, ProtocolClientConfig};
pub use interceptor::{Chain, HeaderInterceptor, Interceptor, RequestInterceptor, StreamFunction, UnaryFunction};
pub use method::{Idempotency, MethodSpec, StreamType};
pub use options::CallOptions;
pub use protocol::{GetConfiguration, Protocol, parse_grpc_web_trailers};
pub use request::HttpRequest;
pub use response::{HttpResponse, ResponseMessage};
pub use stream_result::StreamResult;
pub use streaming::{BidiStream, ClientStream, ServerStream};
pub use transport::{HttpClient, HttpStream, HyperTransport, HyperTransportBuilder, TransportError};

pub use connectrpc_core::{BoxedPool, Code, CompressionPool, CompressionPools, ConnectError, Metadata, RequestCompression};

pub use bytes::Bytes;
