//! Compression negotiation.
//!
//! - [`RequestCompression`]: which pool compresses outbound payloads, and from what size
//! - [`CompressionPools`]: the read-only registry of pools available for inbound payloads

use crate::pool::{BoxedPool, builtin_pools};

/// Header name for Connect unary request/response compression.
pub const CONTENT_ENCODING: &str = "content-encoding";

/// Header name for Connect unary compression negotiation.
pub const ACCEPT_ENCODING: &str = "accept-encoding";

/// Header name for Connect streaming request compression.
pub const CONNECT_CONTENT_ENCODING: &str = "connect-content-encoding";

/// Header name for Connect streaming response compression negotiation.
pub const CONNECT_ACCEPT_ENCODING: &str = "connect-accept-encoding";

/// Header name for gRPC and gRPC-Web message compression.
pub const GRPC_ENCODING: &str = "grpc-encoding";

/// Header name for gRPC compression negotiation.
pub const GRPC_ACCEPT_ENCODING: &str = "grpc-accept-encoding";

/// Outbound compression settings.
///
/// Payloads shorter than `min_bytes` are sent uncompressed.
#[derive(Debug, Clone)]
pub struct RequestCompression {
    /// Minimum payload size before compression is applied.
    pub min_bytes: usize,
    /// The pool that compresses outbound payloads.
    pub pool: BoxedPool,
}

impl RequestCompression {
    pub fn new(min_bytes: usize, pool: BoxedPool) -> Self {
        Self { min_bytes, pool }
    }

    /// Whether a payload of `len` bytes should be compressed.
    pub fn should_compress(&self, len: usize) -> bool {
        len >= self.min_bytes
    }

    /// The pool to apply to `payload`, if any.
    pub fn select(&self, payload: &[u8]) -> Option<&BoxedPool> {
        self.should_compress(payload.len()).then_some(&self.pool)
    }
}

/// Registry of compression pools, keyed by wire name.
///
/// Built once during configuration and shared read-only between calls.
#[derive(Debug, Clone, Default)]
pub struct CompressionPools {
    pools: Vec<BoxedPool>,
}

impl CompressionPools {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every pool compiled into this build.
    pub fn builtin() -> Self {
        builtin_pools().into_iter().fold(Self::new(), Self::register)
    }

    /// Add a pool, replacing any pool with the same name.
    pub fn register(mut self, pool: BoxedPool) -> Self {
        self.pools.retain(|existing| existing.name() != pool.name());
        self.pools.push(pool);
        self
    }

    /// Look up a pool by name.
    pub fn get(&self, name: &str) -> Option<&BoxedPool> {
        self.pools.iter().find(|pool| pool.name() == name)
    }

    /// Registered encoding names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.pools.iter().map(BoxedPool::name)
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// The value to advertise in an accept-encoding style header, or `None`
    /// if no pools are registered.
    pub fn accept_header(&self) -> Option<String> {
        if self.pools.is_empty() {
            return None;
        }
        Some(self.names().collect::<Vec<_>>().join(","))
    }

    /// Resolve the pool named by a content-encoding style header.
    ///
    /// Absent, `identity` and unrecognized names all yield `None`; the caller
    /// then treats the payload as uncompressed.
    pub fn select_response(&self, encoding: Option<&str>) -> Option<BoxedPool> {
        let name = encoding?.split(',').next()?.trim();
        if name.is_empty() || name == "identity" {
            return None;
        }
        self.get(name).cloned()
    }

    /// Pick a pool for a response from the peer's accept-encoding header.
    ///
    /// The first acceptable registered encoding wins (peer preference order).
    /// `q=0` means "not acceptable" per RFC 7231.
    pub fn negotiate(&self, accept: Option<&str>) -> Option<BoxedPool> {
        let accept = accept?;

        for token in accept.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }

            // Parse "gzip;q=0.5" into encoding="gzip", q_value=Some("0.5")
            let (encoding, q_value) = match token.split_once(';') {
                Some((enc, params)) => {
                    let q = params.split(';').find_map(|p| p.trim().strip_prefix("q="));
                    (enc.trim(), q)
                }
                None => (token, None),
            };

            if let Some(q) = q_value {
                if q.trim().parse::<f32>().map(|q| q <= 0.0).unwrap_or(false) {
                    continue;
                }
            }

            if encoding == "identity" {
                return None;
            }
            if let Some(pool) = self.get(encoding) {
                return Some(pool.clone());
            }
        }

        None
    }
}

impl FromIterator<BoxedPool> for CompressionPools {
    fn from_iter<I: IntoIterator<Item = BoxedPool>>(iter: I) -> Self {
        iter.into_iter().fold(Self::new(), Self::register)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::CompressionPool;
    use bytes::Bytes;
    use std::io;

    #[derive(Clone, Copy)]
    struct Named(&'static str);

    impl CompressionPool for Named {
        fn name(&self) -> &'static str {
            self.0
        }

        fn compress(&self, data: &[u8]) -> io::Result<Bytes> {
            Ok(Bytes::copy_from_slice(data))
        }

        fn decompress(&self, data: &[u8]) -> io::Result<Bytes> {
            Ok(Bytes::copy_from_slice(data))
        }
    }

    fn registry() -> CompressionPools {
        [BoxedPool::new(Named("gzip")), BoxedPool::new(Named("br"))]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_request_compression_threshold() {
        let config = RequestCompression::new(10, BoxedPool::new(Named("gzip")));
        assert!(!config.should_compress(9));
        assert!(config.should_compress(10));
        assert!(config.select(&[0u8; 3]).is_none());
        assert_eq!(config.select(&[0u8; 30]).map(|p| p.name()), Some("gzip"));
    }

    #[test]
    fn test_registry_lookup() {
        let pools = registry();
        assert_eq!(pools.get("gzip").map(|p| p.name()), Some("gzip"));
        assert!(pools.get("zstd").is_none());
        assert_eq!(pools.names().collect::<Vec<_>>(), vec!["gzip", "br"]);
    }

    #[test]
    fn test_registry_register_replaces_same_name() {
        let pools = registry().register(BoxedPool::new(Named("gzip")));
        assert_eq!(pools.names().collect::<Vec<_>>(), vec!["br", "gzip"]);
    }

    #[test]
    fn test_accept_header() {
        assert_eq!(registry().accept_header().as_deref(), Some("gzip,br"));
        assert_eq!(CompressionPools::new().accept_header(), None);
    }

    #[test]
    fn test_select_response() {
        let pools = registry();
        assert_eq!(pools.select_response(Some("br")).map(|p| p.name()), Some("br"));
        assert!(pools.select_response(None).is_none());
        assert!(pools.select_response(Some("identity")).is_none());
        assert!(pools.select_response(Some("lz4")).is_none());
    }

    #[test]
    fn test_negotiate_identity() {
        let pools = registry();
        assert!(pools.negotiate(None).is_none());
        assert!(pools.negotiate(Some("")).is_none());
        assert!(pools.negotiate(Some("identity, gzip")).is_none());
    }

    #[test]
    fn test_negotiate_preference_order() {
        let pools = registry();
        assert_eq!(pools.negotiate(Some("br, gzip")).map(|p| p.name()), Some("br"));
        assert_eq!(pools.negotiate(Some("lz4, gzip")).map(|p| p.name()), Some("gzip"));
    }

    #[test]
    fn test_negotiate_q_values() {
        let pools = registry();
        // q=0 means "not acceptable"
        assert!(pools.negotiate(Some("gzip;q=0")).is_none());
        assert_eq!(
            pools.negotiate(Some("gzip;q=0.0, br")).map(|p| p.name()),
            Some("br")
        );
        assert_eq!(
            pools.negotiate(Some("gzip;q=0.5")).map(|p| p.name()),
            Some("gzip")
        );
    }
}
