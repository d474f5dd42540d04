//! Length-prefixed message framing.
//!
//! Connect streams, gRPC and gRPC-Web all frame messages the same way:
//!
//! ```text
//! [flags:1][length:4 big-endian][payload:length]
//! ```
//!
//! Bit `0x01` of the flags marks a compressed payload. The other bits are
//! protocol specific ([`envelope_flags::END_STREAM`] for Connect,
//! [`envelope_flags::TRAILERS`] for gRPC-Web) and are only interpreted by the
//! protocol that reads the frame.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::compression::RequestCompression;
use crate::error::EnvelopeError;
use crate::pool::BoxedPool;

/// Envelope flag bits.
pub mod envelope_flags {
    /// Regular message (uncompressed).
    pub const MESSAGE: u8 = 0x00;
    /// Compressed message.
    pub const COMPRESSED: u8 = 0x01;
    /// Connect end-of-stream message.
    pub const END_STREAM: u8 = 0x02;
    /// gRPC-Web trailers frame.
    pub const TRAILERS: u8 = 0x80;
}

/// Envelope header size (flags + length).
pub const ENVELOPE_HEADER_SIZE: usize = 5;

/// A single unpacked frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Envelope {
    /// The raw flags byte as read from the wire.
    pub flags: u8,
    /// The payload, decompressed if the frame was compressed and a pool was given.
    pub payload: Bytes,
}

impl Envelope {
    /// Whether every bit of `flag` is set on this frame.
    pub fn has_flag(&self, flag: u8) -> bool {
        self.flags & flag == flag
    }

    /// Whether the frame was sent compressed.
    pub fn is_compressed(&self) -> bool {
        self.has_flag(envelope_flags::COMPRESSED)
    }
}

/// Frame a payload, compressing it when `compression` asks for it.
///
/// The compressed flag is set iff compression was applied.
pub fn pack(payload: &[u8], compression: Option<&RequestCompression>) -> Result<Bytes, EnvelopeError> {
    match compression.and_then(|c| c.select(payload)) {
        Some(pool) => {
            let compressed = pool
                .compress(payload)
                .map_err(|e| EnvelopeError::Compression(e.to_string()))?;
            Ok(pack_with_flags(envelope_flags::COMPRESSED, &compressed))
        }
        None => Ok(pack_with_flags(envelope_flags::MESSAGE, payload)),
    }
}

/// Frame a payload verbatim with the given flags.
pub fn pack_with_flags(flags: u8, payload: &[u8]) -> Bytes {
    let mut frame = BytesMut::with_capacity(ENVELOPE_HEADER_SIZE + payload.len());
    frame.put_u8(flags);
    frame.put_u32(payload.len() as u32);
    frame.put_slice(payload);
    frame.freeze()
}

/// Parse an envelope header.
///
/// Returns `(flags, length)`.
pub fn parse_envelope_header(data: &[u8]) -> Result<(u8, u32), EnvelopeError> {
    if data.len() < ENVELOPE_HEADER_SIZE {
        return Err(EnvelopeError::IncompleteHeader {
            expected: ENVELOPE_HEADER_SIZE,
            actual: data.len(),
        });
    }

    let flags = data[0];
    let length = u32::from_be_bytes([data[1], data[2], data[3], data[4]]);

    Ok((flags, length))
}

/// Total size of the first frame in `data`, if the whole frame is present.
///
/// Used to split a byte stream into frames before unpacking them.
pub fn frame_length(data: &[u8]) -> Option<usize> {
    let (_, length) = parse_envelope_header(data).ok()?;
    let total = ENVELOPE_HEADER_SIZE + length as usize;
    (data.len() >= total).then_some(total)
}

/// Read one frame from the front of `buf`, advancing past it.
///
/// Bytes after the frame are left in `buf` for the next call. An empty
/// buffer yields an empty frame with flags `0` rather than an error, so
/// callers that must tell "no frame" apart from "an empty frame" check
/// `buf.is_empty()` first.
///
/// A compressed frame is decompressed with `pool`; with no pool the payload
/// is returned as-is.
pub fn unpack(buf: &mut Bytes, pool: Option<&BoxedPool>) -> Result<Envelope, EnvelopeError> {
    if buf.is_empty() {
        return Ok(Envelope::default());
    }

    let (flags, length) = parse_envelope_header(buf)?;
    let length = length as usize;
    let available = buf.len() - ENVELOPE_HEADER_SIZE;
    if available < length {
        return Err(EnvelopeError::IncompleteBody {
            expected: length,
            actual: available,
        });
    }

    buf.advance(ENVELOPE_HEADER_SIZE);
    let body = buf.split_to(length);

    let payload = match pool {
        Some(pool) if flags & envelope_flags::COMPRESSED != 0 => pool
            .decompress(&body)
            .map_err(|e| EnvelopeError::Decompression(e.to_string()))?,
        _ => body,
    };

    Ok(Envelope { flags, payload })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::CompressionPool;
    use std::io;

    /// Reverses bytes so "compressed" output is observably different.
    struct Reverse;

    impl CompressionPool for Reverse {
        fn name(&self) -> &'static str {
            "reverse"
        }

        fn compress(&self, data: &[u8]) -> io::Result<Bytes> {
            Ok(data.iter().rev().copied().collect::<Vec<_>>().into())
        }

        fn decompress(&self, data: &[u8]) -> io::Result<Bytes> {
            self.compress(data)
        }
    }

    struct Broken;

    impl CompressionPool for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn compress(&self, _: &[u8]) -> io::Result<Bytes> {
            Err(io::Error::other("no space"))
        }

        fn decompress(&self, _: &[u8]) -> io::Result<Bytes> {
            Err(io::Error::new(io::ErrorKind::InvalidData, "corrupt"))
        }
    }

    fn reverse() -> RequestCompression {
        RequestCompression::new(0, BoxedPool::new(Reverse))
    }

    #[test]
    fn test_pack_uncompressed() {
        let frame = pack(b"hello", None).unwrap();
        assert_eq!(&frame[..], &[0x00, 0x00, 0x00, 0x00, 0x05, b'h', b'e', b'l', b'l', b'o']);
    }

    #[test]
    fn test_pack_compressed_sets_flag() {
        let frame = pack(b"abc", Some(&reverse())).unwrap();
        assert_eq!(&frame[..], &[0x01, 0x00, 0x00, 0x00, 0x03, b'c', b'b', b'a']);
    }

    #[test]
    fn test_pack_below_min_bytes_is_not_compressed() {
        let compression = RequestCompression::new(100, BoxedPool::new(Reverse));
        let frame = pack(b"abc", Some(&compression)).unwrap();
        assert_eq!(frame[0], envelope_flags::MESSAGE);
        assert_eq!(&frame[5..], b"abc");
    }

    #[test]
    fn test_pack_compression_failure() {
        let compression = RequestCompression::new(0, BoxedPool::new(Broken));
        let err = pack(b"abc", Some(&compression)).unwrap_err();
        assert_eq!(err, EnvelopeError::Compression("no space".into()));
    }

    #[test]
    fn test_round_trip() {
        let compression = reverse();
        for payload in [&b""[..], b"x", b"some longer payload"] {
            let mut plain = pack(payload, None).unwrap();
            let envelope = unpack(&mut plain, Some(&compression.pool)).unwrap();
            assert!(!envelope.is_compressed());
            assert_eq!(&envelope.payload[..], payload);

            let mut packed = pack(payload, Some(&compression)).unwrap();
            let envelope = unpack(&mut packed, Some(&compression.pool)).unwrap();
            assert!(envelope.is_compressed());
            assert_eq!(&envelope.payload[..], payload);
            assert!(packed.is_empty());
        }
    }

    #[test]
    fn test_unpack_consumes_one_frame() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&pack(b"first", None).unwrap());
        buf.extend_from_slice(&pack_with_flags(envelope_flags::TRAILERS, b"second"));
        let mut buf = buf.freeze();

        let first = unpack(&mut buf, None).unwrap();
        assert_eq!(first.flags, envelope_flags::MESSAGE);
        assert_eq!(&first.payload[..], b"first");

        let second = unpack(&mut buf, None).unwrap();
        assert!(second.has_flag(envelope_flags::TRAILERS));
        assert_eq!(&second.payload[..], b"second");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_unpack_empty_buffer() {
        let mut buf = Bytes::new();
        let envelope = unpack(&mut buf, None).unwrap();
        assert_eq!(envelope.flags, 0);
        assert!(envelope.payload.is_empty());
    }

    #[test]
    fn test_unpack_compressed_without_pool_passes_through() {
        let mut buf = pack_with_flags(envelope_flags::COMPRESSED, b"cba");
        let envelope = unpack(&mut buf, None).unwrap();
        assert!(envelope.is_compressed());
        assert_eq!(&envelope.payload[..], b"cba");
    }

    #[test]
    fn test_unpack_truncated() {
        let mut buf = Bytes::from_static(&[0x00, 0x00, 0x00]);
        assert_eq!(
            unpack(&mut buf, None),
            Err(EnvelopeError::IncompleteHeader {
                expected: 5,
                actual: 3
            })
        );

        let mut buf = Bytes::from_static(&[0x00, 0x00, 0x00, 0x00, 0x0a, b'a', b'b']);
        assert_eq!(
            unpack(&mut buf, None),
            Err(EnvelopeError::IncompleteBody {
                expected: 10,
                actual: 2
            })
        );
    }

    #[test]
    fn test_unpack_decompression_failure() {
        let mut buf = pack_with_flags(envelope_flags::COMPRESSED, b"zzz");
        let err = unpack(&mut buf, Some(&BoxedPool::new(Broken))).unwrap_err();
        assert_eq!(err, EnvelopeError::Decompression("corrupt".into()));
    }

    #[test]
    fn test_parse_envelope_header() {
        let (flags, length) = parse_envelope_header(&[0x02, 0x00, 0x00, 0x01, 0x00]).unwrap();
        assert_eq!(flags, envelope_flags::END_STREAM);
        assert_eq!(length, 256);
    }

    #[test]
    fn test_frame_length() {
        let frame = pack(b"hello", None).unwrap();
        assert_eq!(frame_length(&frame), Some(10));
        assert_eq!(frame_length(&frame[..7]), None);
        assert_eq!(frame_length(&frame[..2]), None);
    }
}
