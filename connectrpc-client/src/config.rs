//! Client configuration.
//!
//! A [`ProtocolClientConfig`] is assembled by
//! [`ClientBuilder`](crate::ClientBuilder) and shared read-only by every call
//! the client makes.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use connectrpc_core::{BoxedPool, CompressionPools, RequestCompression};

use crate::codec::Encoding;
use crate::interceptor::Interceptor;
use crate::protocol::{GetConfiguration, Protocol};

/// Timeout applied to calls that do not set their own.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything a protocol client needs to know about its peer.
#[derive(Clone)]
pub struct ProtocolClientConfig {
    /// Scheme, authority and optional path prefix, without a trailing slash.
    pub(crate) host: String,
    pub(crate) protocol: Protocol,
    pub(crate) encoding: Encoding,
    pub(crate) request_compression: Option<RequestCompression>,
    pub(crate) compression_pools: CompressionPools,
    pub(crate) get_configuration: GetConfiguration,
    pub(crate) interceptors: Vec<Arc<dyn Interceptor>>,
    pub(crate) timeout: Option<Duration>,
}

impl ProtocolClientConfig {
    /// A Connect, protobuf, uncompressed configuration for `host` that
    /// accepts every built-in compression for responses.
    pub fn new(host: impl Into<String>) -> Self {
        let host = host.into();
        Self {
            host: host.trim_end_matches('/').to_string(),
            protocol: Protocol::default(),
            encoding: Encoding::default(),
            request_compression: None,
            compression_pools: CompressionPools::builtin(),
            get_configuration: GetConfiguration::default(),
            interceptors: Vec::new(),
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Compress request messages of at least `min_bytes` with the pool.
    ///
    /// The pool is also registered for responses.
    pub fn with_request_compression(mut self, compression: RequestCompression) -> Self {
        self.compression_pools = self.compression_pools.register(compression.pool.clone());
        self.request_compression = Some(compression);
        self
    }

    pub fn with_compression_pools(mut self, pools: CompressionPools) -> Self {
        self.compression_pools = pools;
        self
    }

    pub fn with_get_configuration(mut self, get_configuration: GetConfiguration) -> Self {
        self.get_configuration = get_configuration;
        self
    }

    pub fn with_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn request_compression(&self) -> Option<&RequestCompression> {
        self.request_compression.as_ref()
    }

    pub fn compression_pools(&self) -> &CompressionPools {
        &self.compression_pools
    }

    /// Look up a registered pool by wire name.
    pub fn compression_pool(&self, name: &str) -> Option<&BoxedPool> {
        self.compression_pools.get(name)
    }

    pub fn get_configuration(&self) -> GetConfiguration {
        self.get_configuration
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// The user interceptors followed by the protocol interceptor.
    pub(crate) fn interceptor_chain(self: &Arc<Self>) -> Vec<Arc<dyn Interceptor>> {
        let mut chain = self.interceptors.clone();
        chain.push(self.protocol.interceptor(self.clone()));
        chain
    }
}

impl fmt::Debug for ProtocolClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolClientConfig")
            .field("host", &self.host)
            .field("protocol", &self.protocol)
            .field("encoding", &self.encoding)
            .field("request_compression", &self.request_compression)
            .field("compression_pools", &self.compression_pools.names().collect::<Vec<_>>())
            .field("get_configuration", &self.get_configuration)
            .field("interceptors", &self.interceptors.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}
