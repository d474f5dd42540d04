//! Connect JSON error bodies and end-of-stream messages.
//!
//! Unary errors are sent as the response body:
//! ```json
//! {"code": "not_found", "message": "...", "details": [{"type": "...", "value": "<base64>"}]}
//! ```
//! Streams end with an end-of-stream frame holding
//! `{"error": <error>?, "metadata": {"key": ["value", ...]}?}`.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{Code, ConnectError, ErrorDetail};
use crate::metadata::Metadata;

#[derive(Debug, Deserialize)]
struct ErrorJson {
    code: Option<String>,
    message: Option<String>,
    details: Option<Vec<ErrorDetailJson>>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetailJson {
    #[serde(rename = "type")]
    type_url: Option<String>,
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EndStreamJson {
    error: Option<ErrorJson>,
    metadata: Option<BTreeMap<String, Vec<String>>>,
}

#[derive(Serialize)]
struct EndStreamBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a ConnectError>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    metadata: BTreeMap<&'a str, Vec<&'a str>>,
}

/// A parsed end-of-stream message.
#[derive(Debug, Clone, Default)]
pub struct EndStream {
    /// The error the stream ended with; `None` means success.
    pub error: Option<ConnectError>,
    /// Trailers, keys lower-cased.
    pub metadata: Metadata,
}

impl ErrorJson {
    fn into_error(self) -> ConnectError {
        let code = self.code.as_deref().map(Code::from_name).unwrap_or(Code::Unknown);
        let err = match self.message {
            Some(message) => ConnectError::new(code, message),
            None => ConnectError::from_code(code),
        };
        let details = self
            .details
            .unwrap_or_default()
            .into_iter()
            .filter_map(|detail| {
                let type_url = detail.type_url?;
                let value = detail.value.as_deref().map(decode_detail_value).unwrap_or_default();
                Some(ErrorDetail::new(type_url, value))
            })
            .collect();
        err.with_details(details)
    }
}

/// Detail values are unpadded base64 on the wire, but padded values are accepted.
fn decode_detail_value(value: &str) -> Vec<u8> {
    STANDARD_NO_PAD
        .decode(value)
        .or_else(|_| STANDARD.decode(value))
        .unwrap_or_default()
}

/// Parse a Connect error body.
///
/// Unknown or missing `code` strings map to [`Code::Unknown`]. Details
/// without a `type` are dropped.
pub fn parse_error_json(body: &[u8]) -> Result<ConnectError, serde_json::Error> {
    let json: ErrorJson = serde_json::from_slice(body)?;
    Ok(json.into_error())
}

/// Parse an end-of-stream message.
///
/// Metadata keys are lower-cased and values for keys that collide after
/// lower-casing are merged. A stream error carries the metadata too.
pub fn parse_end_stream(body: &[u8]) -> Result<EndStream, serde_json::Error> {
    let json: EndStreamJson = serde_json::from_slice(body)?;

    let mut metadata = Metadata::empty();
    for (key, values) in json.metadata.unwrap_or_default() {
        let key = key.to_ascii_lowercase();
        for value in values {
            metadata.append(&key, &value);
        }
    }

    let error = json
        .error
        .map(|error| error.into_error().with_metadata(metadata.clone()));
    Ok(EndStream { error, metadata })
}

/// Encode a Connect error body.
pub fn encode_error_json(err: &ConnectError) -> Bytes {
    match serde_json::to_vec(err) {
        Ok(body) => body.into(),
        Err(_) => Bytes::from(format!(r#"{{"code":"{}"}}"#, err.code())),
    }
}

/// Encode an end-of-stream message.
pub fn encode_end_stream(error: Option<&ConnectError>, trailers: &Metadata) -> Bytes {
    let mut metadata: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for key in trailers.keys() {
        metadata.insert(key, trailers.get_all(key).collect());
    }
    let body = EndStreamBody { error, metadata };
    match serde_json::to_vec(&body) {
        Ok(body) => body.into(),
        Err(_) => Bytes::from_static(b"{}"),
    }
}
