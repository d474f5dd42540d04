//! Status codes and error types shared by every protocol.
//!
//! This module provides:
//! - [`Code`]: RPC status codes (there is no `Ok` member; success is never a code)
//! - [`ErrorDetail`]: Self-describing error details
//! - [`ConnectError`]: The failure value every call resolves to when it does not succeed
//! - [`EnvelopeError`]: Envelope framing errors

use std::error::Error as StdError;
use std::str::FromStr;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Serialize, Serializer};

use crate::metadata::Metadata;

/// RPC status codes shared by Connect, gRPC and gRPC-Web.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Code {
    Canceled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl Code {
    /// Every code, in numeric order.
    pub const ALL: [Code; 16] = [
        Code::Canceled,
        Code::Unknown,
        Code::InvalidArgument,
        Code::DeadlineExceeded,
        Code::NotFound,
        Code::AlreadyExists,
        Code::PermissionDenied,
        Code::ResourceExhausted,
        Code::FailedPrecondition,
        Code::Aborted,
        Code::OutOfRange,
        Code::Unimplemented,
        Code::Internal,
        Code::Unavailable,
        Code::DataLoss,
        Code::Unauthenticated,
    ];

    /// Get the string representation of this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Code::Canceled => "canceled",
            Code::Unknown => "unknown",
            Code::InvalidArgument => "invalid_argument",
            Code::DeadlineExceeded => "deadline_exceeded",
            Code::NotFound => "not_found",
            Code::AlreadyExists => "already_exists",
            Code::PermissionDenied => "permission_denied",
            Code::ResourceExhausted => "resource_exhausted",
            Code::FailedPrecondition => "failed_precondition",
            Code::Aborted => "aborted",
            Code::OutOfRange => "out_of_range",
            Code::Unimplemented => "unimplemented",
            Code::Internal => "internal",
            Code::Unavailable => "unavailable",
            Code::DataLoss => "data_loss",
            Code::Unauthenticated => "unauthenticated",
        }
    }

    /// The numeric value used by `grpc-status`.
    pub fn value(&self) -> u32 {
        *self as u32
    }

    /// Look up a code by its wire name, mapping unrecognized names to
    /// [`Code::Unknown`].
    pub fn from_name(name: &str) -> Code {
        name.parse().unwrap_or(Code::Unknown)
    }

    /// Look up a code by its numeric value.
    ///
    /// Returns `None` for `0`, which means success. Values outside the
    /// known range map to [`Code::Unknown`].
    pub fn from_value(value: i64) -> Option<Code> {
        if value == 0 {
            return None;
        }
        let code = Code::ALL
            .iter()
            .copied()
            .find(|code| i64::from(code.value()) == value)
            .unwrap_or(Code::Unknown);
        Some(code)
    }

    /// Infer a code from the HTTP status of a response that did not carry
    /// a protocol-level status.
    ///
    /// See <https://github.com/grpc/grpc/blob/master/doc/http-grpc-status-mapping.md>.
    pub fn from_http_status(status: u16) -> Code {
        match status {
            400 => Code::Internal,
            401 => Code::Unauthenticated,
            403 => Code::PermissionDenied,
            404 => Code::Unimplemented,
            429 | 502 | 503 | 504 => Code::Unavailable,
            _ => Code::Unknown,
        }
    }

    /// The HTTP status a server sends for a Connect error with this code.
    pub fn http_status(&self) -> u16 {
        match self {
            Code::Canceled => 408,
            Code::Unknown => 500,
            Code::InvalidArgument => 400,
            Code::DeadlineExceeded => 408,
            Code::NotFound => 404,
            Code::AlreadyExists => 409,
            Code::PermissionDenied => 403,
            Code::ResourceExhausted => 429,
            Code::FailedPrecondition => 400,
            Code::Aborted => 409,
            Code::OutOfRange => 400,
            Code::Unimplemented => 404,
            Code::Internal => 500,
            Code::Unavailable => 503,
            Code::DataLoss => 500,
            Code::Unauthenticated => 401,
        }
    }
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing a [`Code`] from a string fails.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseCodeError(());

impl std::fmt::Display for ParseCodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown error code")
    }
}

impl std::error::Error for ParseCodeError {}

impl FromStr for Code {
    type Err = ParseCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "canceled" | "cancelled" => Ok(Code::Canceled),
            "unknown" => Ok(Code::Unknown),
            "invalid_argument" => Ok(Code::InvalidArgument),
            "deadline_exceeded" => Ok(Code::DeadlineExceeded),
            "not_found" => Ok(Code::NotFound),
            "already_exists" => Ok(Code::AlreadyExists),
            "permission_denied" => Ok(Code::PermissionDenied),
            "resource_exhausted" => Ok(Code::ResourceExhausted),
            "failed_precondition" => Ok(Code::FailedPrecondition),
            "aborted" => Ok(Code::Aborted),
            "out_of_range" => Ok(Code::OutOfRange),
            "unimplemented" => Ok(Code::Unimplemented),
            "internal" => Ok(Code::Internal),
            "unavailable" => Ok(Code::Unavailable),
            "data_loss" => Ok(Code::DataLoss),
            "unauthenticated" => Ok(Code::Unauthenticated),
            _ => Err(ParseCodeError(())),
        }
    }
}

/// A self-describing error detail, the wire analogue of `google.protobuf.Any`.
///
/// # Wire Format
///
/// In Connect JSON, details are objects with `type` and `value` fields:
/// ```json
/// {"type": "google.rpc.RetryInfo", "value": "base64-encoded-protobuf"}
/// ```
/// In gRPC they travel inside the `grpc-status-details-bin` trailer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorDetail {
    /// Fully-qualified type name (e.g., "google.rpc.RetryInfo").
    type_url: String,
    /// Protobuf-encoded message bytes.
    value: Bytes,
}

impl ErrorDetail {
    /// Create a new error detail with a type name and protobuf-encoded bytes.
    pub fn new<S: Into<String>, B: Into<Bytes>>(type_url: S, value: B) -> Self {
        Self {
            type_url: type_url.into(),
            value: value.into(),
        }
    }

    /// Get the fully-qualified type name.
    pub fn type_url(&self) -> &str {
        &self.type_url
    }

    /// The type name without a `type.googleapis.com/` style prefix.
    pub fn type_name(&self) -> &str {
        self.type_url
            .rsplit_once('/')
            .map(|(_, name)| name)
            .unwrap_or(&self.type_url)
    }

    /// Get the protobuf-encoded value bytes.
    pub fn value(&self) -> &Bytes {
        &self.value
    }

    /// Decode the payload as `M` if the type names match.
    pub fn unpack<M>(&self) -> Option<M>
    where
        M: prost::Message + prost::Name + Default,
    {
        if self.type_name() != M::full_name() {
            return None;
        }
        M::decode(self.value.clone()).ok()
    }
}

impl Serialize for ErrorDetail {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use base64::Engine;
        use serde::ser::SerializeStruct;

        let mut s = serializer.serialize_struct("ErrorDetail", 2)?;

        // Connect uses short type names
        s.serialize_field("type", self.type_name())?;

        // Connect protocol uses raw base64 (no padding)
        let encoded = base64::engine::general_purpose::STANDARD_NO_PAD.encode(&self.value);
        s.serialize_field("value", &encoded)?;

        s.end()
    }
}

/// Envelope framing errors.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeError {
    /// Incomplete envelope header.
    #[error("incomplete envelope header: expected {expected} bytes, got {actual}")]
    IncompleteHeader { expected: usize, actual: usize },

    /// The declared payload length exceeds the bytes available.
    #[error("incomplete envelope body: expected {expected} bytes, got {actual}")]
    IncompleteBody { expected: usize, actual: usize },

    /// Decompression failed.
    #[error("decompression failed: {0}")]
    Decompression(String),

    /// Compression failed.
    #[error("compression failed: {0}")]
    Compression(String),
}

/// JSON body structure for Connect error responses.
#[derive(Serialize)]
pub struct ErrorResponseBody {
    pub code: Code,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<ErrorDetail>,
}

type Cause = Arc<dyn StdError + Send + Sync + 'static>;

/// The failure outcome of an RPC.
///
/// Carries the code, an optional message, structured details, and any
/// headers or trailers gathered before the failure. May wrap the native
/// error that caused it.
///
/// # Example
///
/// ```
/// use connectrpc_core::{Code, ConnectError};
///
/// let err = ConnectError::not_found("user not found");
/// assert_eq!(err.code(), Code::NotFound);
/// assert_eq!(err.message(), Some("user not found"));
///
/// let err = err.add_detail("google.rpc.RetryInfo", vec![1, 2, 3]);
/// assert_eq!(err.details().len(), 1);
/// ```
#[derive(Clone, Debug)]
pub struct ConnectError {
    code: Code,
    message: Option<String>,
    details: Vec<ErrorDetail>,
    metadata: Metadata,
    cause: Option<Cause>,
}

impl ConnectError {
    /// Create a new error with a code and message.
    pub fn new<S: Into<String>>(code: Code, message: S) -> Self {
        Self {
            code,
            message: Some(message.into()),
            details: vec![],
            metadata: Metadata::empty(),
            cause: None,
        }
    }

    /// Create a new error with just a code.
    pub fn from_code(code: Code) -> Self {
        Self {
            code,
            message: None,
            details: vec![],
            metadata: Metadata::empty(),
            cause: None,
        }
    }

    /// Wrap a native error, using its display text as the message.
    pub fn from_cause<E>(code: Code, cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::new(code, cause.to_string()).with_cause(cause)
    }

    /// Get the error code.
    pub fn code(&self) -> Code {
        self.code
    }

    /// Get the error message.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Get the error details.
    pub fn details(&self) -> &[ErrorDetail] {
        &self.details
    }

    /// Headers or trailers that accompanied the error.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// The underlying native error, if any.
    pub fn cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    /// Replace the code, keeping everything else.
    pub fn with_code(mut self, code: Code) -> Self {
        self.code = code;
        self
    }

    /// Replace the message.
    pub fn with_message<S: Into<String>>(mut self, message: S) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Replace the details.
    pub fn with_details(mut self, details: Vec<ErrorDetail>) -> Self {
        self.details = details;
        self
    }

    /// Replace the metadata.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Attach the native error that caused this failure.
    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.cause = Some(Arc::new(cause));
        self
    }

    /// Add an error detail with type name and protobuf-encoded bytes.
    pub fn add_detail<S: Into<String>, B: Into<Bytes>>(mut self, type_url: S, value: B) -> Self {
        self.details.push(ErrorDetail::new(type_url, value));
        self
    }

    /// Add a pre-constructed ErrorDetail.
    pub fn add_error_detail(mut self, detail: ErrorDetail) -> Self {
        self.details.push(detail);
        self
    }

    /// Decode every detail whose type matches `M`.
    pub fn unpacked_details<M>(&self) -> Vec<M>
    where
        M: prost::Message + prost::Name + Default,
    {
        self.details.iter().filter_map(ErrorDetail::unpack).collect()
    }

    // Convenience constructors for all error codes

    /// Create a canceled error.
    pub fn canceled<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Canceled, message)
    }

    /// Create an unknown error.
    pub fn unknown<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Unknown, message)
    }

    /// Create an invalid argument error.
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    /// Create a deadline exceeded error.
    pub fn deadline_exceeded<S: Into<String>>(message: S) -> Self {
        Self::new(Code::DeadlineExceeded, message)
    }

    /// Create a not found error.
    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::new(Code::NotFound, message)
    }

    /// Create an already exists error.
    pub fn already_exists<S: Into<String>>(message: S) -> Self {
        Self::new(Code::AlreadyExists, message)
    }

    /// Create a permission denied error.
    pub fn permission_denied<S: Into<String>>(message: S) -> Self {
        Self::new(Code::PermissionDenied, message)
    }

    /// Create a resource exhausted error.
    pub fn resource_exhausted<S: Into<String>>(message: S) -> Self {
        Self::new(Code::ResourceExhausted, message)
    }

    /// Create a failed precondition error.
    pub fn failed_precondition<S: Into<String>>(message: S) -> Self {
        Self::new(Code::FailedPrecondition, message)
    }

    /// Create an aborted error.
    pub fn aborted<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Aborted, message)
    }

    /// Create an out of range error.
    pub fn out_of_range<S: Into<String>>(message: S) -> Self {
        Self::new(Code::OutOfRange, message)
    }

    /// Create an unimplemented error.
    pub fn unimplemented<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Unimplemented, message)
    }

    /// Create an internal error.
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Internal, message)
    }

    /// Create an unavailable error.
    pub fn unavailable<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Unavailable, message)
    }

    /// Create a data loss error.
    pub fn data_loss<S: Into<String>>(message: S) -> Self {
        Self::new(Code::DataLoss, message)
    }

    /// Create an unauthenticated error.
    pub fn unauthenticated<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Unauthenticated, message)
    }
}

impl std::fmt::Display for ConnectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code.as_str())?;
        if let Some(msg) = &self.message {
            write!(f, ": {}", msg)?;
        }
        Ok(())
    }
}

impl StdError for ConnectError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn StdError + 'static))
    }
}

impl Serialize for ConnectError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        ErrorResponseBody {
            code: self.code,
            message: self.message.clone(),
            details: self.details.clone(),
        }
        .serialize(serializer)
    }
}

impl From<EnvelopeError> for ConnectError {
    fn from(err: EnvelopeError) -> Self {
        ConnectError::from_cause(Code::Internal, err)
    }
}
