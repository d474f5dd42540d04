//! The HTTP transport collaborator.
//!
//! Protocol interceptors produce and consume the protocol-agnostic
//! [`HttpRequest`] / [`HttpResponse`] shapes; an [`HttpClient`] moves them
//! over the network. [`HyperTransport`] is the built-in implementation:
//!
//! - HTTP/1.1 and HTTP/2, negotiated by ALPN or forced with `http2_only`
//! - TLS with rustls (feature-gated)
//! - Connection pooling
//!
//! # Feature Flags
//!
//! - `tls` (default) - Enables `tls-ring` + `tls-native-roots`
//! - `tls-ring` / `tls-aws-lc` - Crypto providers
//! - `tls-native-roots` / `tls-webpki-roots` - Root certificates
//!
//! # Example
//!
//! ```ignore
//! use connectrpc_client::transport::HyperTransport;
//! use std::time::Duration;
//!
//! let transport = HyperTransport::builder()
//!     .http2_only(true)
//!     .pool_idle_timeout(Duration::from_secs(60))
//!     .build()?;
//! ```

mod body;
mod connector;
mod hyper;

use bytes::Bytes;
use connectrpc_core::ConnectError;
use futures::future::BoxFuture;
use tokio::sync::mpsc;

use crate::request::HttpRequest;
use crate::response::HttpResponse;
use crate::stream_result::StreamResult;

pub use body::TransportBody;
pub use connector::{build_https_connector, default_tls_config, has_tls_support, tls_config_with_roots};
pub use hyper::{HyperTransport, HyperTransportBuilder};

pub use rustls::ClientConfig as TlsClientConfig;

/// Sends protocol-shaped requests over HTTP.
///
/// Implementations own connections, TLS and HTTP versions. They never
/// interpret RPC semantics beyond splitting a streaming body into envelopes.
pub trait HttpClient: Send + Sync {
    /// Send a request with a complete body and collect the whole response.
    ///
    /// Network failures are reported in [`HttpResponse::cause`], usually as
    /// `Unavailable`. Dropping the future aborts the request.
    fn unary(&self, request: HttpRequest) -> BoxFuture<'static, HttpResponse>;

    /// Open a stream. `request.body` is ignored; messages are sent through
    /// [`HttpStream::sender`].
    ///
    /// `duplex` is set for bidirectional methods, whose responses may begin
    /// before the request body ends.
    fn stream(&self, request: HttpRequest, duplex: bool) -> Result<HttpStream, ConnectError>;
}

/// The two halves of an open HTTP stream.
///
/// Dropping `sender` ends the request body. Dropping `receiver` aborts the
/// exchange.
#[derive(Debug)]
pub struct HttpStream {
    /// Already-framed request messages, in order.
    pub sender: mpsc::Sender<Bytes>,
    /// `Headers`, then one `Message` per response envelope, then a single
    /// `Complete` carrying the HTTP trailers or the transport failure.
    pub receiver: mpsc::Receiver<StreamResult<Bytes>>,
}

/// Building a transport failed.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error(
        "HTTPS requires a crypto provider: enable `tls-ring` or `tls-aws-lc`, or install one with `CryptoProvider::install_default()`"
    )]
    NoCryptoProvider,

    #[error("HTTPS requires root certificates: enable `tls-native-roots` or `tls-webpki-roots`")]
    NoRootCertificates,

    #[error("invalid TLS configuration: {0}")]
    Tls(#[from] rustls::Error),
}
