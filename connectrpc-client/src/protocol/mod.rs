//! Protocol interceptors.
//!
//! Each protocol translates protocol-agnostic requests into its own headers,
//! content types and framing, and classifies responses into success or a
//! [`ConnectError`]. The client installs exactly one of them as the innermost
//! interceptor.

mod connect;
mod get;
mod grpc;
mod grpc_web;

use std::sync::Arc;

use connectrpc_core::{BoxedPool, Code, ConnectError, Envelope, Metadata};

pub use get::GetConfiguration;
pub use grpc_web::parse_grpc_web_trailers;

use crate::codec::Encoding;
use crate::config::ProtocolClientConfig;
use crate::interceptor::Interceptor;

/// The wire protocol a client speaks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Protocol {
    #[default]
    Connect,
    Grpc,
    GrpcWeb,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Connect => "connect",
            Protocol::Grpc => "grpc",
            Protocol::GrpcWeb => "grpc_web",
        }
    }

    /// The interceptor implementing this protocol.
    pub(crate) fn interceptor(&self, config: Arc<ProtocolClientConfig>) -> Arc<dyn Interceptor> {
        match self {
            Protocol::Connect => Arc::new(connect::ConnectInterceptor::new(config)),
            Protocol::Grpc => Arc::new(grpc::GrpcInterceptor::new(config)),
            Protocol::GrpcWeb => Arc::new(grpc_web::GrpcWebInterceptor::new(config)),
        }
    }
}

pub(crate) const USER_AGENT: &str = "user-agent";
pub(crate) const CONTENT_TYPE: &str = "content-type";

pub(crate) const CONNECT_USER_AGENT: &str = concat!("connect-rust/", env!("CARGO_PKG_VERSION"));
pub(crate) const GRPC_USER_AGENT: &str = concat!("grpc-rust-connect/", env!("CARGO_PKG_VERSION"));

/// Check a response content type against `<prefix>+<codec>`.
///
/// A bare `prefix` means protobuf. A mismatch that still starts with
/// `prefix` is a codec disagreement with a peer speaking the protocol
/// (`Internal`); anything else is not a response of this protocol at all
/// (`Unknown`).
pub(crate) fn check_content_type(
    headers: &Metadata,
    prefix: &str,
    encoding: Encoding,
) -> Result<(), ConnectError> {
    let actual = headers.get(CONTENT_TYPE).unwrap_or_default().to_ascii_lowercase();
    let expected = format!("{prefix}+{}", encoding.name());
    if actual == expected || (actual == prefix && encoding == Encoding::Proto) {
        return Ok(());
    }

    let code = if actual.starts_with(prefix) {
        Code::Internal
    } else {
        Code::Unknown
    };
    #[cfg(feature = "tracing")]
    tracing::warn!(content_type = %actual, expected = %expected, "unexpected response content-type");
    Err(ConnectError::new(
        code,
        format!("invalid content-type: \"{actual}\"; expecting \"{expected}\""),
    )
    .with_metadata(headers.clone()))
}

/// Reject a compressed frame when no encoding was negotiated.
pub(crate) fn check_compressed(
    envelope: &Envelope,
    pool: Option<&BoxedPool>,
    header: &str,
) -> Result<(), ConnectError> {
    if envelope.is_compressed() && pool.is_none() {
        return Err(ConnectError::internal(format!(
            "protocol error: received compressed message without {header}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use connectrpc_core::envelope_flags;

    fn headers(content_type: &str) -> Metadata {
        [(CONTENT_TYPE, content_type)].into_iter().collect()
    }

    #[test]
    fn test_check_content_type() {
        let grpc = "application/grpc";
        assert!(check_content_type(&headers("application/grpc+proto"), grpc, Encoding::Proto).is_ok());
        assert!(check_content_type(&headers("application/grpc"), grpc, Encoding::Proto).is_ok());
        assert!(check_content_type(&headers("Application/GRPC+json"), grpc, Encoding::Json).is_ok());

        let err = check_content_type(&headers("application/grpc"), grpc, Encoding::Json).unwrap_err();
        assert_eq!(err.code(), Code::Internal);

        let err = check_content_type(&headers("application/grpc+json"), grpc, Encoding::Proto).unwrap_err();
        assert_eq!(err.code(), Code::Internal);

        let err = check_content_type(&headers("text/html"), grpc, Encoding::Proto).unwrap_err();
        assert_eq!(err.code(), Code::Unknown);
        assert_eq!(err.metadata().get(CONTENT_TYPE), Some("text/html"));

        let err = check_content_type(&Metadata::empty(), grpc, Encoding::Proto).unwrap_err();
        assert_eq!(err.code(), Code::Unknown);
    }

    #[test]
    fn test_check_compressed() {
        let envelope = Envelope {
            flags: envelope_flags::COMPRESSED,
            payload: Bytes::new(),
        };
        let err = check_compressed(&envelope, None, "grpc-encoding").unwrap_err();
        assert_eq!(err.code(), Code::Internal);

        assert!(check_compressed(&Envelope::default(), None, "grpc-encoding").is_ok());
    }

    #[test]
    fn test_protocol_names() {
        assert_eq!(Protocol::default(), Protocol::Connect);
        assert_eq!(Protocol::GrpcWeb.as_str(), "grpc_web");
    }
}
