//! gRPC status parsing.
//!
//! gRPC and gRPC-Web report the outcome of a call in trailers
//! (`grpc-status`, `grpc-message`, `grpc-status-details-bin`). A response
//! without a body may instead carry them in its headers ("trailers-only").

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use prost::Message;

use crate::error::{Code, ConnectError, ErrorDetail};
use crate::metadata::Metadata;

/// Trailer carrying the numeric status code.
pub const GRPC_STATUS: &str = "grpc-status";

/// Trailer carrying the percent-encoded status message.
pub const GRPC_MESSAGE: &str = "grpc-message";

/// Trailer carrying a base64 `google.rpc.Status`.
pub const GRPC_STATUS_DETAILS_BIN: &str = "grpc-status-details-bin";

const TYPE_URL_PREFIX: &str = "type.googleapis.com/";

/// `google.rpc.Status`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Status {
    #[prost(int32, tag = "1")]
    pub code: i32,
    #[prost(string, tag = "2")]
    pub message: String,
    #[prost(message, repeated, tag = "3")]
    pub details: Vec<prost_types::Any>,
}

/// The terminal status of a gRPC-family response.
#[derive(Debug, Clone, Default)]
pub struct GrpcCompletion {
    /// Whether a `grpc-status` was found at all.
    pub present: bool,
    /// `None` means OK.
    pub code: Option<Code>,
    /// The percent-decoded `grpc-message`.
    pub message: String,
    pub details: Vec<ErrorDetail>,
    /// Union of the response headers and trailers.
    pub metadata: Metadata,
    /// The status was read from headers because there was no body and no trailers.
    pub trailers_only: bool,
}

impl GrpcCompletion {
    /// Parse the completion of a response.
    ///
    /// When there is no body and no trailers, `headers` are the status source.
    /// A malformed `grpc-status-details-bin` yields empty details rather than
    /// an error.
    pub fn parse(headers: &Metadata, has_body: bool, trailers: &Metadata) -> Self {
        let trailers_only = !has_body && trailers.is_empty();
        let source = if trailers_only { headers } else { trailers };

        let mut metadata = headers.clone();
        metadata.merge(trailers);

        let Some(status) = source.get(GRPC_STATUS) else {
            return Self {
                present: false,
                code: Some(Code::Unknown),
                message: String::new(),
                details: vec![],
                metadata,
                trailers_only,
            };
        };

        let code = match status.trim().parse::<i64>() {
            Ok(value) => Code::from_value(value),
            Err(_) => Some(Code::Unknown),
        };
        let message = source.get(GRPC_MESSAGE).map(grpc_percent_decode).unwrap_or_default();
        let details = source
            .get(GRPC_STATUS_DETAILS_BIN)
            .and_then(|raw| decode_status_details(raw).ok())
            .map(|status| status_to_details(status.details))
            .unwrap_or_default();

        Self {
            present: true,
            code,
            message,
            details,
            metadata,
            trailers_only,
        }
    }

    /// Whether the call succeeded.
    pub fn is_ok(&self) -> bool {
        self.present && self.code.is_none()
    }

    /// The failure this completion describes, or `None` on success.
    pub fn to_error(&self) -> Option<ConnectError> {
        if !self.present {
            return Some(
                ConnectError::unknown("protocol error: status is missing from trailers")
                    .with_metadata(self.metadata.clone()),
            );
        }
        let code = self.code?;
        let err = if self.message.is_empty() {
            ConnectError::from_code(code)
        } else {
            ConnectError::new(code, self.message.clone())
        };
        Some(
            err.with_details(self.details.clone())
                .with_metadata(self.metadata.clone()),
        )
    }
}

/// Decode a `grpc-status-details-bin` value.
///
/// Both padded and unpadded base64 are accepted.
pub fn decode_status_details(raw: &str) -> Result<Status, ConnectError> {
    let raw = raw.trim();
    let bytes = STANDARD
        .decode(raw)
        .or_else(|_| STANDARD_NO_PAD.decode(raw))
        .map_err(|e| ConnectError::from_cause(Code::Internal, e))?;
    Status::decode(bytes.as_slice()).map_err(|e| ConnectError::from_cause(Code::Internal, e))
}

/// Encode a status as a `grpc-status-details-bin` value.
pub fn encode_status_details(code: Code, message: Option<&str>, details: &[ErrorDetail]) -> String {
    let status = Status {
        code: code.value() as i32,
        message: message.unwrap_or_default().to_string(),
        details: details
            .iter()
            .map(|detail| prost_types::Any {
                type_url: if detail.type_url().contains('/') {
                    detail.type_url().to_string()
                } else {
                    format!("{TYPE_URL_PREFIX}{}", detail.type_url())
                },
                value: detail.value().to_vec(),
            })
            .collect(),
    };
    STANDARD.encode(status.encode_to_vec())
}

fn status_to_details(details: Vec<prost_types::Any>) -> Vec<ErrorDetail> {
    details
        .into_iter()
        .map(|any| ErrorDetail::new(any.type_url, any.value))
        .collect()
}

/// Percent-encode a `grpc-message` value.
///
/// Printable ASCII other than `%` passes through; every other byte of the
/// UTF-8 encoding becomes `%XX`.
pub fn grpc_percent_encode(message: &str) -> String {
    let mut encoded = String::with_capacity(message.len());
    for &byte in message.as_bytes() {
        if (0x20..=0x7E).contains(&byte) && byte != b'%' {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }
    encoded
}

/// Decode a percent-encoded `grpc-message` value.
///
/// `%XY` with hex digits becomes that byte; any other `%` is kept literally.
/// Invalid UTF-8 in the result is replaced rather than rejected.
pub fn grpc_percent_decode(encoded: &str) -> String {
    let bytes = encoded.as_bytes();
    let Some(start) = (0..bytes.len()).find(|&i| bytes[i] == b'%' && i + 2 < bytes.len()) else {
        return encoded.to_string();
    };

    let mut decoded = Vec::with_capacity(bytes.len());
    decoded.extend_from_slice(&bytes[..start]);
    let mut i = start;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                decoded.push((hi << 4) | lo);
                i += 3;
                continue;
            }
        }
        decoded.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&decoded).into_owned()
}

fn hex_value(byte: u8) -> Option<u8> {
    (byte as char).to_digit(16).map(|d| d as u8)
}
