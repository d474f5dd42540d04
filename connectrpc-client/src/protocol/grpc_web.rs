//! The gRPC-Web protocol.
//!
//! Framed like gRPC, but the trailers travel inside the body as a final
//! envelope with the `0x80` flag, holding `key: value` lines separated by
//! CRLF. This lets the protocol run over HTTP/1.1 and through proxies that
//! drop HTTP trailers.

use std::sync::Arc;

use bytes::Bytes;
use connectrpc_core::{
    BoxedPool, ConnectError, Envelope, GRPC_ENCODING, GRPC_TIMEOUT, GrpcCompletion, Metadata, encode_grpc_timeout,
    envelope_flags, grpc_percent_encode, pack, unpack,
};
use http::StatusCode;

use super::grpc::{complete_from_trailers, http_status_error};
use super::{GRPC_USER_AGENT, check_compressed, check_content_type};
use crate::config::ProtocolClientConfig;
use crate::interceptor::{Interceptor, StreamFunction, UnaryFunction, insert_default};
use crate::request::HttpRequest;
use crate::response::HttpResponse;
use crate::stream_result::StreamResult;

const GRPC_WEB_CONTENT_TYPE: &str = "application/grpc-web";

/// Browsers own `user-agent`, so gRPC-Web clients identify themselves here.
const X_USER_AGENT: &str = "x-user-agent";

/// Parse the text of a gRPC-Web trailers frame.
///
/// Lines are separated by CRLF; blank lines and lines without a `:` are
/// skipped. Keys are lower-cased and both sides are trimmed. Repeated keys
/// accumulate. Values that are not valid header text are percent-encoded,
/// which the status parser undoes for `grpc-message`.
pub fn parse_grpc_web_trailers(payload: &[u8]) -> Metadata {
    let text = String::from_utf8_lossy(payload);
    let mut trailers = Metadata::empty();
    for line in text.split("\r\n") {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        if key.is_empty() {
            continue;
        }
        let value = value.trim();
        if value.bytes().all(|b| b == b'\t' || (0x20..=0x7e).contains(&b)) {
            trailers.append(&key, value);
        } else {
            trailers.append(&key, &grpc_percent_encode(value));
        }
    }
    trailers
}

pub(crate) struct GrpcWebInterceptor {
    config: Arc<ProtocolClientConfig>,
}

impl GrpcWebInterceptor {
    pub(crate) fn new(config: Arc<ProtocolClientConfig>) -> Self {
        Self { config }
    }
}

impl Interceptor for GrpcWebInterceptor {
    fn unary(&self) -> Box<dyn UnaryFunction> {
        Box::new(GrpcWebUnary {
            config: self.config.clone(),
        })
    }

    fn stream(&self) -> Box<dyn StreamFunction> {
        Box::new(GrpcWebStream {
            config: self.config.clone(),
            response_pool: None,
            headers: Metadata::empty(),
            seen_message: false,
        })
    }
}

fn prepare_request(config: &ProtocolClientConfig, request: &mut HttpRequest) {
    let headers = &mut request.headers;
    insert_default(headers, X_USER_AGENT, GRPC_USER_AGENT);
    if let Some(compression) = &config.request_compression {
        headers.insert(GRPC_ENCODING, compression.pool.name());
    }
    if let Some(timeout) = request.timeout {
        headers.insert(GRPC_TIMEOUT, &encode_grpc_timeout(timeout));
    }
    request.content_type = format!("{GRPC_WEB_CONTENT_TYPE}+{}", config.encoding.name());
}

fn is_trailers(envelope: &Envelope) -> bool {
    envelope.has_flag(envelope_flags::TRAILERS)
}

/// Read the next frame, rejecting compressed frames without a negotiated pool.
fn next_frame(body: &mut Bytes, pool: Option<&BoxedPool>) -> Result<Envelope, ConnectError> {
    let envelope = unpack(body, pool)?;
    check_compressed(&envelope, pool, GRPC_ENCODING)?;
    Ok(envelope)
}

/// The pieces of a unary gRPC-Web body.
struct UnaryBody {
    message: Option<Bytes>,
    trailers: Metadata,
}

/// Split a non-empty unary body into at most one message and the trailers frame.
fn split_unary_body(mut body: Bytes, pool: Option<&BoxedPool>) -> Result<UnaryBody, ConnectError> {
    let first = next_frame(&mut body, pool)?;
    let (message, trailer_frame) = if is_trailers(&first) {
        (None, first)
    } else {
        if body.is_empty() {
            return Err(ConnectError::internal("protocol error: missing end-of-stream message"));
        }
        let second = next_frame(&mut body, pool)?;
        if !is_trailers(&second) {
            return Err(ConnectError::unimplemented("unary stream has multiple messages"));
        }
        (Some(first.payload), second)
    };
    if !body.is_empty() {
        return Err(ConnectError::internal("protocol error: data after end-of-stream"));
    }
    Ok(UnaryBody {
        message,
        trailers: parse_grpc_web_trailers(&trailer_frame.payload),
    })
}

struct GrpcWebUnary {
    config: Arc<ProtocolClientConfig>,
}

impl UnaryFunction for GrpcWebUnary {
    fn request(&mut self, mut request: HttpRequest) -> Result<HttpRequest, ConnectError> {
        prepare_request(&self.config, &mut request);
        request.body = pack(&request.body, self.config.request_compression.as_ref())?;
        Ok(request)
    }

    fn response(&mut self, response: HttpResponse) -> HttpResponse {
        if response.cause.is_some() {
            return response;
        }
        let Some(status) = response.status else {
            return response.into_failure(ConnectError::unknown("response has no status"));
        };
        if status != StatusCode::OK {
            let cause = http_status_error(status, &response.headers);
            return response.into_failure(cause);
        }
        if let Err(cause) = check_content_type(&response.headers, GRPC_WEB_CONTENT_TYPE, self.config.encoding) {
            return response.into_failure(cause);
        }

        if response.body.is_empty() {
            let completion = GrpcCompletion::parse(&response.headers, false, &response.trailers);
            let cause = completion
                .to_error()
                .unwrap_or_else(|| ConnectError::unimplemented("unary stream has no messages"));
            return response.into_failure(cause);
        }

        let pool = self
            .config
            .compression_pools
            .select_response(response.headers.get(GRPC_ENCODING));
        let parts = match split_unary_body(response.body.clone(), pool.as_ref()) {
            Ok(parts) => parts,
            Err(cause) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(error = %cause, "malformed grpc-web response body");
                return response.into_failure(cause);
            }
        };

        let completion = GrpcCompletion::parse(&response.headers, parts.message.is_some(), &parts.trailers);
        let response = HttpResponse {
            trailers: parts.trailers,
            ..response
        };
        if let Some(cause) = completion.to_error() {
            return response.into_failure(cause);
        }
        match parts.message {
            Some(body) => HttpResponse { body, ..response },
            None => response.into_failure(ConnectError::unimplemented("unary stream has no messages")),
        }
    }
}

struct GrpcWebStream {
    config: Arc<ProtocolClientConfig>,
    response_pool: Option<BoxedPool>,
    headers: Metadata,
    seen_message: bool,
}

impl StreamFunction for GrpcWebStream {
    fn request(&mut self, mut request: HttpRequest) -> Result<HttpRequest, ConnectError> {
        prepare_request(&self.config, &mut request);
        Ok(request)
    }

    fn request_body(&mut self, body: Bytes) -> Result<Bytes, ConnectError> {
        Ok(pack(&body, self.config.request_compression.as_ref())?)
    }

    fn stream_result(&mut self, result: StreamResult<Bytes>) -> StreamResult<Bytes> {
        match result {
            StreamResult::Headers(headers) => {
                if let Err(cause) = check_content_type(&headers, GRPC_WEB_CONTENT_TYPE, self.config.encoding) {
                    return StreamResult::fail(cause);
                }
                self.response_pool = self
                    .config
                    .compression_pools
                    .select_response(headers.get(GRPC_ENCODING));
                self.headers = headers.clone();
                StreamResult::Headers(headers)
            }
            StreamResult::Message(mut frame) => {
                let envelope = match next_frame(&mut frame, self.response_pool.as_ref()) {
                    Ok(envelope) => envelope,
                    Err(cause) => return StreamResult::fail(cause),
                };
                if is_trailers(&envelope) {
                    let trailers = parse_grpc_web_trailers(&envelope.payload);
                    return complete_from_trailers(&self.headers, self.seen_message, trailers);
                }
                self.seen_message = true;
                StreamResult::Message(envelope.payload)
            }
            StreamResult::Complete {
                cause: Some(cause),
                trailers,
            } => StreamResult::Complete {
                cause: Some(cause),
                trailers,
            },
            // The body ended without a trailers frame: only a trailers-only
            // response carries its status in the headers.
            StreamResult::Complete { cause: None, trailers } => {
                complete_from_trailers(&self.headers, self.seen_message, trailers)
            }
        }
    }
}
