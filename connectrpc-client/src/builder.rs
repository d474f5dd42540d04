//! Client builder.
//!
//! Provides a fluent API for configuring and building a [`ProtocolClient`].

use std::sync::Arc;
use std::time::Duration;

use connectrpc_core::{BoxedPool, CompressionPools, RequestCompression};

use crate::client::ProtocolClient;
use crate::codec::Encoding;
use crate::config::ProtocolClientConfig;
use crate::interceptor::Interceptor;
use crate::protocol::{GetConfiguration, Protocol};
use crate::transport::{HttpClient, HyperTransport, TlsClientConfig, TransportError};

/// Builder for creating a [`ProtocolClient`].
///
/// # Example
///
/// ```ignore
/// use connectrpc_client::{ClientBuilder, Encoding, Protocol};
///
/// let client = ClientBuilder::new("http://localhost:3000")
///     .protocol(Protocol::GrpcWeb)
///     .encoding(Encoding::Json)
///     .build()?;
/// ```
pub struct ClientBuilder {
    config: ProtocolClientConfig,
    /// Overrides the built-in hyper transport.
    transport: Option<Arc<dyn HttpClient>>,
    tls_config: Option<TlsClientConfig>,
    http2_only: Option<bool>,
}

impl std::fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("config", &self.config)
            .field("transport", &self.transport.is_some())
            .field("tls_config", &self.tls_config.is_some())
            .field("http2_only", &self.http2_only)
            .finish()
    }
}

impl ClientBuilder {
    /// Create a builder for the service at `host`, e.g. `"https://demo.connectrpc.com"`.
    pub fn new<S: Into<String>>(host: S) -> Self {
        Self {
            config: ProtocolClientConfig::new(host),
            transport: None,
            tls_config: None,
            http2_only: None,
        }
    }

    /// The wire protocol. Defaults to Connect.
    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.config = self.config.with_protocol(protocol);
        self
    }

    /// The message encoding. Defaults to protobuf.
    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.config = self.config.with_encoding(encoding);
        self
    }

    /// Compress requests of at least `min_bytes` with `pool`.
    ///
    /// The pool is also offered for responses.
    pub fn request_compression(mut self, min_bytes: usize, pool: BoxedPool) -> Self {
        self.config = self
            .config
            .with_request_compression(RequestCompression::new(min_bytes, pool));
        self
    }

    /// Accept responses compressed with `pool`.
    pub fn compression_pool(mut self, pool: BoxedPool) -> Self {
        self.config.compression_pools = std::mem::take(&mut self.config.compression_pools).register(pool);
        self
    }

    /// Replace the response compression pools. An empty set accepts only identity.
    pub fn compression_pools(mut self, pools: CompressionPools) -> Self {
        self.config = self.config.with_compression_pools(pools);
        self
    }

    /// Send side-effect-free unary Connect calls as GET.
    pub fn get_configuration(mut self, get_configuration: GetConfiguration) -> Self {
        self.config = self.config.with_get_configuration(get_configuration);
        self
    }

    /// Add an interceptor. Interceptors see requests in the order they are added.
    pub fn interceptor<I: Interceptor + 'static>(mut self, interceptor: I) -> Self {
        self.config = self.config.with_interceptor(Arc::new(interceptor));
        self
    }

    /// Default timeout for every call. [`CallOptions::timeout`](crate::CallOptions::timeout)
    /// overrides it per call.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_timeout(Some(timeout));
        self
    }

    /// Calls without a per-call timeout never time out.
    pub fn no_timeout(mut self) -> Self {
        self.config = self.config.with_timeout(None);
        self
    }

    /// Use a custom transport instead of the built-in hyper client.
    ///
    /// `tls_config` and `http2_only` are ignored when a transport is set.
    pub fn transport<T: HttpClient + 'static>(mut self, transport: T) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// TLS settings for the built-in transport.
    pub fn tls_config(mut self, config: TlsClientConfig) -> Self {
        self.tls_config = Some(config);
        self
    }

    /// Force HTTP/2 on the built-in transport. Defaults to on for gRPC only.
    pub fn http2_only(mut self, enabled: bool) -> Self {
        self.http2_only = Some(enabled);
        self
    }

    /// Build the client.
    ///
    /// # Errors
    ///
    /// Returns an error if the host is not an `http` or `https` URL, or if
    /// the built-in transport cannot be created.
    pub fn build(self) -> Result<ProtocolClient, ClientBuildError> {
        let uri: http::Uri = self
            .config
            .host()
            .parse()
            .map_err(|_| ClientBuildError::InvalidUrl(self.config.host().to_string()))?;
        match uri.scheme_str() {
            Some("http") | Some("https") => {}
            other => return Err(ClientBuildError::InvalidScheme(other.unwrap_or_default().to_string())),
        }

        let transport = match self.transport {
            Some(transport) => transport,
            None => {
                // gRPC needs trailers, which only HTTP/2 carries.
                let http2_only = self
                    .http2_only
                    .unwrap_or(self.config.protocol() == Protocol::Grpc);
                let mut builder = HyperTransport::builder().http2_only(http2_only);
                if let Some(tls_config) = self.tls_config {
                    builder = builder.tls_config(tls_config);
                }
                Arc::new(builder.build()?)
            }
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(
            host = %self.config.host(),
            protocol = self.config.protocol().as_str(),
            encoding = self.config.encoding().name(),
            "built client"
        );

        Ok(ProtocolClient::new(self.config, transport))
    }
}

/// Error type for client building failures.
#[derive(Debug, thiserror::Error)]
pub enum ClientBuildError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("unsupported URL scheme {0:?}: expected http or https")]
    InvalidScheme(String),

    #[error("failed to create transport: {0}")]
    Transport(#[from] TransportError),
}
