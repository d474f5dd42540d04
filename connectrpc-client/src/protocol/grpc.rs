//! The gRPC protocol over HTTP/2.
//!
//! Every message, unary or not, is enveloped. The outcome of the call is
//! reported in HTTP trailers, or in the headers of a response without a body
//! ("trailers-only").

use std::sync::Arc;

use bytes::Bytes;
use connectrpc_core::{
    BoxedPool, ConnectError, GRPC_ACCEPT_ENCODING, GRPC_ENCODING, GRPC_TIMEOUT, GrpcCompletion, Metadata,
    encode_grpc_timeout, pack, unpack,
};
use http::StatusCode;

use super::{GRPC_USER_AGENT, USER_AGENT, check_compressed, check_content_type};
use crate::config::ProtocolClientConfig;
use crate::interceptor::{Interceptor, StreamFunction, UnaryFunction, insert_default};
use crate::request::HttpRequest;
use crate::response::HttpResponse;
use crate::stream_result::StreamResult;

const GRPC_CONTENT_TYPE: &str = "application/grpc";

pub(crate) struct GrpcInterceptor {
    config: Arc<ProtocolClientConfig>,
}

impl GrpcInterceptor {
    pub(crate) fn new(config: Arc<ProtocolClientConfig>) -> Self {
        Self { config }
    }
}

impl Interceptor for GrpcInterceptor {
    fn unary(&self) -> Box<dyn UnaryFunction> {
        Box::new(GrpcUnary {
            config: self.config.clone(),
        })
    }

    fn stream(&self) -> Box<dyn StreamFunction> {
        Box::new(GrpcStream {
            config: self.config.clone(),
            response_pool: None,
            headers: Metadata::empty(),
            seen_message: false,
        })
    }
}

fn prepare_request(config: &ProtocolClientConfig, request: &mut HttpRequest) {
    let headers = &mut request.headers;
    headers.insert("te", "trailers");
    insert_default(headers, USER_AGENT, GRPC_USER_AGENT);
    if let Some(compression) = &config.request_compression {
        headers.insert(GRPC_ENCODING, compression.pool.name());
    }
    if let Some(accept) = config.compression_pools.accept_header() {
        headers.insert(GRPC_ACCEPT_ENCODING, &accept);
    }
    if let Some(timeout) = request.timeout {
        headers.insert(GRPC_TIMEOUT, &encode_grpc_timeout(timeout));
    }
    request.content_type = format!("{GRPC_CONTENT_TYPE}+{}", config.encoding.name());
}

/// Failure for a response whose HTTP status is not 200.
pub(super) fn http_status_error(status: StatusCode, headers: &Metadata) -> ConnectError {
    ConnectError::new(
        connectrpc_core::Code::from_http_status(status.as_u16()),
        format!("HTTP status {}", status.as_u16()),
    )
    .with_metadata(headers.clone())
}

struct GrpcUnary {
    config: Arc<ProtocolClientConfig>,
}

impl UnaryFunction for GrpcUnary {
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
        if let Err(cause) = check_content_type(&response.headers, GRPC_CONTENT_TYPE, self.config.encoding) {
            return response.into_failure(cause);
        }

        let completion = GrpcCompletion::parse(&response.headers, !response.body.is_empty(), &response.trailers);
        if let Some(cause) = completion.to_error() {
            return response.into_failure(cause);
        }

        let pool = self
            .config
            .compression_pools
            .select_response(response.headers.get(GRPC_ENCODING));
        match single_message(response.body.clone(), pool.as_ref()) {
            Ok(body) => HttpResponse { body, ..response },
            Err(cause) => response.into_failure(cause),
        }
    }
}

/// Unpack the one message a unary response must contain.
fn single_message(mut body: Bytes, pool: Option<&BoxedPool>) -> Result<Bytes, ConnectError> {
    if body.is_empty() {
        return Err(ConnectError::unimplemented("unary stream has no messages"));
    }
    let envelope = unpack(&mut body, pool)?;
    check_compressed(&envelope, pool, GRPC_ENCODING)?;
    if !body.is_empty() {
        return Err(ConnectError::unimplemented("unary stream has multiple messages"));
    }
    Ok(envelope.payload)
}

struct GrpcStream {
    config: Arc<ProtocolClientConfig>,
    response_pool: Option<BoxedPool>,
    headers: Metadata,
    seen_message: bool,
}

impl StreamFunction for GrpcStream {
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
                if let Err(cause) = check_content_type(&headers, GRPC_CONTENT_TYPE, self.config.encoding) {
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
                let envelope = match unpack(&mut frame, self.response_pool.as_ref()) {
                    Ok(envelope) => envelope,
                    Err(e) => return StreamResult::fail(e.into()),
                };
                if let Err(cause) = check_compressed(&envelope, self.response_pool.as_ref(), GRPC_ENCODING) {
                    return StreamResult::fail(cause);
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
            StreamResult::Complete { cause: None, trailers } => {
                complete_from_trailers(&self.headers, self.seen_message, trailers)
            }
        }
    }
}

/// Turn the final trailers of a gRPC or gRPC-Web stream into its completion.
pub(super) fn complete_from_trailers(
    headers: &Metadata,
    has_body: bool,
    trailers: Metadata,
) -> StreamResult<Bytes> {
    let completion = GrpcCompletion::parse(headers, has_body, &trailers);
    let trailers = if completion.trailers_only {
        headers.clone()
    } else {
        trailers
    };
    StreamResult::Complete {
        cause: completion.to_error(),
        trailers,
    }
}
