//! Compression pools.
//!
//! A [`CompressionPool`] compresses and decompresses whole message payloads
//! and is looked up by its wire name (e.g. "gzip"). Built-in pools:
//! - [`GzipPool`]: Gzip compression (requires `compression-gzip` feature)
//! - [`DeflatePool`]: Deflate compression (requires `compression-deflate` feature)
//! - [`BrotliPool`]: Brotli compression (requires `compression-br` feature)
//! - [`ZstdPool`]: Zstd compression (requires `compression-zstd` feature)

use bytes::Bytes;
use std::io;
use std::sync::Arc;

#[cfg(any(
    feature = "compression-gzip",
    feature = "compression-deflate",
    feature = "compression-br",
    feature = "compression-zstd"
))]
use std::io::{Read, Write};

#[cfg(feature = "compression-gzip")]
use flate2::Compression as GzipLevel;
#[cfg(feature = "compression-gzip")]
use flate2::read::GzDecoder;
#[cfg(feature = "compression-gzip")]
use flate2::write::GzEncoder;

/// A compression algorithm applied to individual message payloads.
///
/// Used for enveloped messages (gRPC, gRPC-Web and Connect streams) and for
/// the whole body of Connect unary calls.
///
/// # Example
///
/// ```ignore
/// use connectrpc_core::CompressionPool;
/// use bytes::Bytes;
/// use std::io;
///
/// struct Lz4Pool;
///
/// impl CompressionPool for Lz4Pool {
///     fn name(&self) -> &'static str { "lz4" }
///
///     fn compress(&self, data: &[u8]) -> io::Result<Bytes> {
///         // ... lz4 compression
///     }
///
///     fn decompress(&self, data: &[u8]) -> io::Result<Bytes> {
///         // ... lz4 decompression
///     }
/// }
/// ```
pub trait CompressionPool: Send + Sync + 'static {
    /// The encoding name used in headers (e.g., "gzip", "zstd", "br").
    fn name(&self) -> &'static str;

    /// Compress data.
    fn compress(&self, data: &[u8]) -> io::Result<Bytes>;

    /// Decompress data.
    fn decompress(&self, data: &[u8]) -> io::Result<Bytes>;
}

/// A shared, type-erased compression pool.
///
/// Use `Option<BoxedPool>` where `None` represents identity (no compression).
#[derive(Clone)]
pub struct BoxedPool(Arc<dyn CompressionPool>);

impl BoxedPool {
    /// Wrap a pool.
    pub fn new<P: CompressionPool>(pool: P) -> Self {
        BoxedPool(Arc::new(pool))
    }

    /// Get the encoding name.
    pub fn name(&self) -> &'static str {
        self.0.name()
    }

    /// Compress data.
    pub fn compress(&self, data: &[u8]) -> io::Result<Bytes> {
        self.0.compress(data)
    }

    /// Decompress data.
    pub fn decompress(&self, data: &[u8]) -> io::Result<Bytes> {
        self.0.decompress(data)
    }
}

impl std::fmt::Debug for BoxedPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("BoxedPool").field(&self.name()).finish()
    }
}

/// Gzip compression using flate2.
#[cfg(feature = "compression-gzip")]
#[derive(Debug, Clone, Copy)]
pub struct GzipPool {
    /// Compression level (0-9). Default is 6.
    pub level: u32,
}

#[cfg(feature = "compression-gzip")]
impl Default for GzipPool {
    fn default() -> Self {
        Self { level: 6 }
    }
}

#[cfg(feature = "compression-gzip")]
impl GzipPool {
    /// Use the given level, clamped to 0-9.
    pub fn with_level(level: u32) -> Self {
        Self {
            level: level.min(9),
        }
    }
}

#[cfg(feature = "compression-gzip")]
impl CompressionPool for GzipPool {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn compress(&self, data: &[u8]) -> io::Result<Bytes> {
        let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), GzipLevel::new(self.level));
        encoder.write_all(data)?;
        encoder.finish().map(Bytes::from)
    }

    fn decompress(&self, data: &[u8]) -> io::Result<Bytes> {
        read_all(GzDecoder::new(data))
    }
}

/// Deflate compression in zlib framing (RFC 1950), as HTTP uses it.
#[cfg(feature = "compression-deflate")]
#[derive(Debug, Clone, Copy)]
pub struct DeflatePool {
    /// Compression level (0-9). Default is 6.
    pub level: u32,
}

#[cfg(feature = "compression-deflate")]
impl Default for DeflatePool {
    fn default() -> Self {
        Self { level: 6 }
    }
}

#[cfg(feature = "compression-deflate")]
impl DeflatePool {
    /// Use the given level, clamped to 0-9.
    pub fn with_level(level: u32) -> Self {
        Self {
            level: level.min(9),
        }
    }
}

#[cfg(feature = "compression-deflate")]
impl CompressionPool for DeflatePool {
    fn name(&self) -> &'static str {
        "deflate"
    }

    fn compress(&self, data: &[u8]) -> io::Result<Bytes> {
        use flate2::write::ZlibEncoder;
        let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::new(self.level));
        encoder.write_all(data)?;
        encoder.finish().map(Bytes::from)
    }

    fn decompress(&self, data: &[u8]) -> io::Result<Bytes> {
        read_all(flate2::read::ZlibDecoder::new(data))
    }
}

/// Brotli compression.
#[cfg(feature = "compression-br")]
#[derive(Debug, Clone, Copy)]
pub struct BrotliPool {
    /// Compression quality (0-11). Default is 4.
    pub quality: u32,
}

#[cfg(feature = "compression-br")]
impl Default for BrotliPool {
    fn default() -> Self {
        Self { quality: 4 }
    }
}

#[cfg(feature = "compression-br")]
impl BrotliPool {
    /// Use the given quality, clamped to 0-11.
    pub fn with_quality(quality: u32) -> Self {
        Self {
            quality: quality.min(11),
        }
    }
}

#[cfg(feature = "compression-br")]
impl CompressionPool for BrotliPool {
    fn name(&self) -> &'static str {
        "br"
    }

    fn compress(&self, data: &[u8]) -> io::Result<Bytes> {
        use brotli::enc::BrotliEncoderParams;
        let mut output = Vec::new();
        let params = BrotliEncoderParams {
            quality: self.quality as i32,
            ..Default::default()
        };
        brotli::enc::BrotliCompress(&mut io::Cursor::new(data), &mut output, &params)?;
        Ok(Bytes::from(output))
    }

    fn decompress(&self, data: &[u8]) -> io::Result<Bytes> {
        read_all(brotli::Decompressor::new(data, 4096))
    }
}

/// Zstd compression.
#[cfg(feature = "compression-zstd")]
#[derive(Debug, Clone, Copy)]
pub struct ZstdPool {
    /// Compression level (1-22). Default is 3.
    pub level: i32,
}

#[cfg(feature = "compression-zstd")]
impl Default for ZstdPool {
    fn default() -> Self {
        Self { level: 3 }
    }
}

#[cfg(feature = "compression-zstd")]
impl ZstdPool {
    /// Use the given level, clamped to 1-22.
    pub fn with_level(level: i32) -> Self {
        Self {
            level: level.clamp(1, 22),
        }
    }
}

#[cfg(feature = "compression-zstd")]
impl CompressionPool for ZstdPool {
    fn name(&self) -> &'static str {
        "zstd"
    }

    fn compress(&self, data: &[u8]) -> io::Result<Bytes> {
        zstd::bulk::compress(data, self.level).map(Bytes::from)
    }

    fn decompress(&self, data: &[u8]) -> io::Result<Bytes> {
        read_all(zstd::Decoder::new(data)?)
    }
}

#[cfg(any(
    feature = "compression-gzip",
    feature = "compression-deflate",
    feature = "compression-br",
    feature = "compression-zstd"
))]
fn read_all<R: Read>(mut reader: R) -> io::Result<Bytes> {
    let mut decompressed = Vec::new();
    reader.read_to_end(&mut decompressed)?;
    Ok(Bytes::from(decompressed))
}

/// Every pool compiled into this build, in preference order.
pub fn builtin_pools() -> Vec<BoxedPool> {
    #[allow(unused_mut)]
    let mut pools = Vec::new();
    #[cfg(feature = "compression-gzip")]
    pools.push(BoxedPool::new(GzipPool::default()));
    #[cfg(feature = "compression-br")]
    pools.push(BoxedPool::new(BrotliPool::default()));
    #[cfg(feature = "compression-zstd")]
    pools.push(BoxedPool::new(ZstdPool::default()));
    #[cfg(feature = "compression-deflate")]
    pools.push(BoxedPool::new(DeflatePool::default()));
    pools
}
