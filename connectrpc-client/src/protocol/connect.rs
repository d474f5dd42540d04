//! The Connect protocol.
//!
//! Unary calls send the bare message as the body (or as a GET query) and
//! report errors as a JSON body with a non-200 status. Streams exchange
//! envelopes and end with an `END_STREAM` frame carrying a JSON error and
//! trailers.

use std::sync::Arc;

use bytes::Bytes;
use connectrpc_core::server::{CONNECT_PROTOCOL_VERSION, CONNECT_TRAILER_PREFIX};
use connectrpc_core::{
    ACCEPT_ENCODING, BoxedPool, CONNECT_ACCEPT_ENCODING, CONNECT_CONTENT_ENCODING, CONNECT_TIMEOUT_MS,
    CONTENT_ENCODING, Code, ConnectError, Metadata, encode_connect_timeout, envelope_flags, pack,
    parse_end_stream, parse_error_json, unpack,
};
use http::StatusCode;

use super::get::{into_get_request, should_use_get};
use super::{CONNECT_USER_AGENT, CONTENT_TYPE, USER_AGENT, check_compressed};
use crate::codec::Encoding;
use crate::config::ProtocolClientConfig;
use crate::interceptor::{Interceptor, StreamFunction, UnaryFunction, insert_default};
use crate::request::HttpRequest;
use crate::response::HttpResponse;
use crate::stream_result::StreamResult;

pub(crate) struct ConnectInterceptor {
    config: Arc<ProtocolClientConfig>,
}

impl ConnectInterceptor {
    pub(crate) fn new(config: Arc<ProtocolClientConfig>) -> Self {
        Self { config }
    }
}

impl Interceptor for ConnectInterceptor {
    fn unary(&self) -> Box<dyn UnaryFunction> {
        Box::new(ConnectUnary {
            config: self.config.clone(),
        })
    }

    fn stream(&self) -> Box<dyn StreamFunction> {
        Box::new(ConnectStream {
            config: self.config.clone(),
            response_pool: None,
        })
    }
}

fn common_headers(headers: &mut Metadata, request_timeout: Option<std::time::Duration>) {
    headers.insert(CONNECT_PROTOCOL_VERSION, "1");
    insert_default(headers, USER_AGENT, CONNECT_USER_AGENT);
    if let Some(timeout) = request_timeout {
        headers.insert(CONNECT_TIMEOUT_MS, &encode_connect_timeout(timeout));
    }
}

// ============================================================================
// Unary
// ============================================================================

struct ConnectUnary {
    config: Arc<ProtocolClientConfig>,
}

impl UnaryFunction for ConnectUnary {
    fn request(&mut self, mut request: HttpRequest) -> Result<HttpRequest, ConnectError> {
        let config = &self.config;
        common_headers(&mut request.headers, request.timeout);
        if let Some(accept) = config.compression_pools.accept_header() {
            request.headers.insert(ACCEPT_ENCODING, &accept);
        }
        request.content_type = format!("application/{}", config.encoding.name());

        let body = std::mem::take(&mut request.body);
        let (body, compression) = match config.request_compression.as_ref().and_then(|c| c.select(&body)) {
            Some(pool) => {
                let compressed = pool
                    .compress(&body)
                    .map_err(|e| ConnectError::from_cause(Code::Internal, e))?;
                (compressed, Some(pool.name()))
            }
            None => (body, None),
        };

        if should_use_get(&config.get_configuration, &request.method_spec, &body) {
            return Ok(into_get_request(request, body, compression, config.encoding));
        }

        if let Some(name) = compression {
            request.headers.insert(CONTENT_ENCODING, name);
        }
        request.body = body;
        Ok(request)
    }

    fn response(&mut self, response: HttpResponse) -> HttpResponse {
        if response.cause.is_some() {
            return response;
        }
        let Some(status) = response.status else {
            return response.into_failure(ConnectError::unknown("response has no status"));
        };

        let (headers, trailers) = split_trailers(response.headers, response.trailers);
        let failure = |cause: ConnectError, headers: Metadata, trailers: Metadata| HttpResponse {
            status: Some(status),
            headers,
            body: Bytes::new(),
            trailers,
            cause: Some(cause),
        };

        let pool = self
            .config
            .compression_pools
            .select_response(headers.get(CONTENT_ENCODING));
        let body = match &pool {
            Some(pool) => match pool.decompress(&response.body) {
                Ok(body) => body,
                Err(e) => {
                    let cause = ConnectError::from_cause(Code::Internal, e);
                    return failure(cause, headers, trailers);
                }
            },
            None => response.body,
        };

        if status != StatusCode::OK {
            let mut metadata = headers.clone();
            metadata.merge(&trailers);
            let cause = unary_error(status, &body).with_metadata(metadata);
            return failure(cause, headers, trailers);
        }

        if let Err(cause) = check_unary_content_type(&headers, self.config.encoding) {
            return failure(cause, headers, trailers);
        }

        HttpResponse {
            status: Some(status),
            headers,
            body,
            trailers,
            cause: None,
        }
    }
}

/// Move `trailer-` prefixed headers into the trailers.
fn split_trailers(headers: Metadata, mut trailers: Metadata) -> (Metadata, Metadata) {
    let mut kept = Metadata::empty();
    for (name, value) in headers.iter() {
        let Ok(value) = value.to_str() else {
            continue;
        };
        match name.as_str().strip_prefix(CONNECT_TRAILER_PREFIX) {
            Some(trailer) => trailers.append(trailer, value),
            None => kept.append(name.as_str(), value),
        };
    }
    (kept, trailers)
}

/// Decode the error of a non-200 unary response.
///
/// A body that is not a Connect error keeps the status-derived code and
/// uses the raw text as the message.
fn unary_error(status: StatusCode, body: &[u8]) -> ConnectError {
    match parse_error_json(body) {
        Ok(err) => err,
        Err(e) => {
            let text = String::from_utf8_lossy(body);
            let message = if text.trim().is_empty() {
                format!("HTTP status {}", status.as_u16())
            } else {
                text.into_owned()
            };
            ConnectError::new(Code::from_http_status(status.as_u16()), message).with_cause(e)
        }
    }
}

fn check_unary_content_type(headers: &Metadata, encoding: Encoding) -> Result<(), ConnectError> {
    let actual = headers.get(CONTENT_TYPE).unwrap_or_default().to_ascii_lowercase();
    let expected = format!("application/{}", encoding.name());
    if actual == expected || (encoding == Encoding::Json && actual.starts_with("application/json")) {
        return Ok(());
    }

    let code = if actual.starts_with("application/") {
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

// ============================================================================
// Streaming
// ============================================================================

struct ConnectStream {
    config: Arc<ProtocolClientConfig>,
    response_pool: Option<BoxedPool>,
}

impl StreamFunction for ConnectStream {
    fn request(&mut self, mut request: HttpRequest) -> Result<HttpRequest, ConnectError> {
        let config = &self.config;
        common_headers(&mut request.headers, request.timeout);
        if let Some(compression) = &config.request_compression {
            request.headers.insert(CONNECT_CONTENT_ENCODING, compression.pool.name());
        }
        if let Some(accept) = config.compression_pools.accept_header() {
            request.headers.insert(CONNECT_ACCEPT_ENCODING, &accept);
        }
        request.content_type = format!("application/connect+{}", config.encoding.name());
        Ok(request)
    }

    fn request_body(&mut self, body: Bytes) -> Result<Bytes, ConnectError> {
        Ok(pack(&body, self.config.request_compression.as_ref())?)
    }

    fn stream_result(&mut self, result: StreamResult<Bytes>) -> StreamResult<Bytes> {
        match result {
            StreamResult::Headers(headers) => {
                if let Err(cause) =
                    super::check_content_type(&headers, "application/connect", self.config.encoding)
                {
                    return StreamResult::fail(cause);
                }
                self.response_pool = self
                    .config
                    .compression_pools
                    .select_response(headers.get(CONNECT_CONTENT_ENCODING));
                StreamResult::Headers(headers)
            }
            StreamResult::Message(mut frame) => {
                let envelope = match unpack(&mut frame, self.response_pool.as_ref()) {
                    Ok(envelope) => envelope,
                    Err(e) => return StreamResult::fail(e.into()),
                };
                if let Err(cause) =
                    check_compressed(&envelope, self.response_pool.as_ref(), CONNECT_CONTENT_ENCODING)
                {
                    return StreamResult::fail(cause);
                }
                if !envelope.has_flag(envelope_flags::END_STREAM) {
                    return StreamResult::Message(envelope.payload);
                }
                match parse_end_stream(&envelope.payload) {
                    Ok(end) => StreamResult::Complete {
                        cause: end.error,
                        trailers: end.metadata,
                    },
                    Err(e) => {
                        #[cfg(feature = "tracing")]
                        tracing::debug!(error = %e, "malformed end-of-stream message");
                        StreamResult::fail(ConnectError::from_cause(Code::Unknown, e))
                    }
                }
            }
            complete @ StreamResult::Complete { .. } => complete,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::{Idempotency, MethodSpec};
    use crate::protocol::GetConfiguration;
    use connectrpc_core::{CompressionPools, encode_end_stream, pack_with_flags};
    use http::Method;
    use std::time::Duration;

    #[cfg(feature = "compression-gzip")]
    use connectrpc_core::{GzipPool, RequestCompression};

    fn config() -> ProtocolClientConfig {
        ProtocolClientConfig::new("https://example.com").with_compression_pools(CompressionPools::new())
    }

    fn interceptor(config: ProtocolClientConfig) -> ConnectInterceptor {
        ConnectInterceptor::new(Arc::new(config))
    }

    fn unary_request(body: &'static [u8]) -> HttpRequest {
        let mut request = HttpRequest::new("https://example.com", MethodSpec::unary("pkg.Svc/Do"));
        request.body = Bytes::from_static(body);
        request
    }

    fn ok_response(content_type: &str, body: &'static [u8]) -> HttpResponse {
        let headers: Metadata = [(CONTENT_TYPE, content_type)].into_iter().collect();
        HttpResponse::new(StatusCode::OK, headers, Bytes::from_static(body), Metadata::empty())
    }

    #[test]
    fn test_unary_request_headers() {
        let mut request = unary_request(b"payload");
        request.timeout = Some(Duration::from_millis(2500));
        let request = interceptor(config()).unary().request(request).unwrap();

        assert_eq!(request.method, Method::POST);
        assert_eq!(request.content_type, "application/proto");
        assert_eq!(request.headers.get(CONNECT_PROTOCOL_VERSION), Some("1"));
        assert_eq!(request.headers.get(CONNECT_TIMEOUT_MS), Some("2500"));
        assert_eq!(request.headers.get(USER_AGENT), Some(CONNECT_USER_AGENT));
        assert!(!request.headers.contains(ACCEPT_ENCODING));
        assert!(!request.headers.contains(CONTENT_ENCODING));
        assert_eq!(&request.body[..], b"payload");
    }

    #[test]
    fn test_unary_request_keeps_user_agent() {
        let mut request = unary_request(b"");
        request.headers.insert("User-Agent", "custom/1.0");
        let request = interceptor(config()).unary().request(request).unwrap();
        assert_eq!(request.headers.get(USER_AGENT), Some("custom/1.0"));
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn test_unary_request_compression() {
        let gzip = BoxedPool::new(GzipPool::default());
        let config = ProtocolClientConfig::new("https://example.com")
            .with_compression_pools(CompressionPools::new().register(gzip.clone()))
            .with_request_compression(RequestCompression::new(4, gzip.clone()));
        let interceptor = interceptor(config);

        let request = interceptor.unary().request(unary_request(b"compress me")).unwrap();
        assert_eq!(request.headers.get(CONTENT_ENCODING), Some("gzip"));
        assert_eq!(request.headers.get(ACCEPT_ENCODING), Some("gzip"));
        assert_eq!(&gzip.decompress(&request.body).unwrap()[..], b"compress me");

        let request = interceptor.unary().request(unary_request(b"abc")).unwrap();
        assert!(!request.headers.contains(CONTENT_ENCODING));
        assert_eq!(&request.body[..], b"abc");
    }

    #[test]
    fn test_unary_request_get() {
        let config = config().with_get_configuration(GetConfiguration::Enabled);
        let mut request = unary_request(b"hi");
        request.method_spec = MethodSpec::unary("pkg.Svc/Get").with_idempotency(Idempotency::NoSideEffects);
        request.url = "https://example.com/pkg.Svc/Get".into();

        let request = interceptor(config).unary().request(request).unwrap();
        assert_eq!(request.method, Method::GET);
        assert!(request.url.ends_with("?base64=1&connect=v1&encoding=proto&message=aGk"));
        assert!(request.body.is_empty());
    }

    #[test]
    fn test_unary_request_get_fallback() {
        let config = config().with_get_configuration(GetConfiguration::EnabledWithFallback { max_message_bytes: 1 });
        let mut request = unary_request(b"too big");
        request.method_spec = MethodSpec::unary("pkg.Svc/Get").with_idempotency(Idempotency::NoSideEffects);

        let request = interceptor(config).unary().request(request).unwrap();
        assert_eq!(request.method, Method::POST);
        assert_eq!(&request.body[..], b"too big");
    }

    #[test]
    fn test_unary_request_get_within_limit() {
        use base64::Engine;
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;

        let config = config().with_get_configuration(GetConfiguration::EnabledWithFallback {
            max_message_bytes: 10_000,
        });
        let mut request = unary_request(b"");
        request.body = Bytes::from(vec![7u8; 5000]);
        request.method_spec = MethodSpec::unary("pkg.Svc/Get").with_idempotency(Idempotency::NoSideEffects);
        request.url = "https://example.com/pkg.Svc/Get".into();

        let request = interceptor(config).unary().request(request).unwrap();
        assert_eq!(request.method, Method::GET);
        assert!(request.body.is_empty());
        let (base, query) = request.url.split_once('?').unwrap();
        assert_eq!(base, "https://example.com/pkg.Svc/Get");
        let message = query
            .strip_prefix("base64=1&connect=v1&encoding=proto&message=")
            .unwrap();
        assert_eq!(URL_SAFE_NO_PAD.decode(message).unwrap(), vec![7u8; 5000]);
        assert!(!request.headers.contains(CONNECT_PROTOCOL_VERSION));
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn test_unary_request_get_fallback_keeps_post_headers() {
        let gzip = BoxedPool::new(GzipPool::default());
        let config = config()
            .with_request_compression(RequestCompression::new(0, gzip))
            .with_get_configuration(GetConfiguration::EnabledWithFallback { max_message_bytes: 1 });
        let mut request = unary_request(b"too big");
        request.method_spec = MethodSpec::unary("pkg.Svc/Get").with_idempotency(Idempotency::NoSideEffects);
        request.url = "https://example.com/pkg.Svc/Get".into();

        let request = interceptor(config).unary().request(request).unwrap();
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.url, "https://example.com/pkg.Svc/Get");
        assert!(!request.url.contains('?'));
        assert_eq!(request.headers.get(CONNECT_PROTOCOL_VERSION), Some("1"));
        assert_eq!(request.headers.get(CONTENT_ENCODING), Some("gzip"));
    }

    #[test]
    fn test_unary_response_success_with_trailers() {
        let mut response = ok_response("application/proto", b"ok");
        response.headers.append("trailer-x-checksum", "abc");
        response.headers.append("x-server", "1");

        let response = interceptor(config()).unary().response(response);
        assert!(response.cause.is_none());
        assert_eq!(&response.body[..], b"ok");
        assert_eq!(response.trailers.get("x-checksum"), Some("abc"));
        assert!(!response.headers.contains("trailer-x-checksum"));
        assert_eq!(response.headers.get("x-server"), Some("1"));
    }

    #[test]
    fn test_unary_response_json_charset() {
        let config = config().with_encoding(Encoding::Json);
        for content_type in [
            "application/json; charset=utf-8",
            "application/json;charset=utf-8",
            "application/json;charset=utf8",
            "application/json; charset=UTF-8",
        ] {
            let response = interceptor(config.clone())
                .unary()
                .response(ok_response(content_type, b"{}"));
            assert!(response.cause.is_none(), "{content_type}");
        }
    }

    #[test]
    fn test_unary_response_error_json() {
        let body = br#"{"code":"resource_exhausted","message":"no more resources!","details":[{"type":"type","value":"dmFsdWU"}]}"#;
        let headers: Metadata = [(CONTENT_TYPE, "application/json"), ("x-id", "7")].into_iter().collect();
        let response = HttpResponse::new(
            StatusCode::TOO_MANY_REQUESTS,
            headers,
            Bytes::from_static(body),
            Metadata::empty(),
        );

        let response = interceptor(config()).unary().response(response);
        let cause = response.cause.unwrap();
        assert_eq!(cause.code(), Code::ResourceExhausted);
        assert_eq!(cause.message(), Some("no more resources!"));
        assert_eq!(cause.details().len(), 1);
        assert_eq!(cause.details()[0].type_url(), "type");
        assert_eq!(&cause.details()[0].value()[..], b"value");
        assert_eq!(cause.metadata().get("x-id"), Some("7"));
        assert!(response.body.is_empty());
    }

    #[test]
    fn test_unary_response_error_not_json() {
        let response = HttpResponse::new(
            StatusCode::SERVICE_UNAVAILABLE,
            Metadata::empty(),
            Bytes::from_static(b"upstream connect error"),
            Metadata::empty(),
        );
        let cause = interceptor(config()).unary().response(response).cause.unwrap();
        assert_eq!(cause.code(), Code::Unavailable);
        assert_eq!(cause.message(), Some("upstream connect error"));

        let response = HttpResponse::new(StatusCode::NOT_FOUND, Metadata::empty(), Bytes::new(), Metadata::empty());
        let cause = interceptor(config()).unary().response(response).cause.unwrap();
        assert_eq!(cause.code(), Code::Unimplemented);
        assert_eq!(cause.message(), Some("HTTP status 404"));
    }

    #[test]
    fn test_unary_response_content_type_mismatch() {
        let cause = interceptor(config())
            .unary()
            .response(ok_response("application/json", b"{}"))
            .cause
            .unwrap();
        assert_eq!(cause.code(), Code::Internal);

        let cause = interceptor(config())
            .unary()
            .response(ok_response("text/html", b"<html>"))
            .cause
            .unwrap();
        assert_eq!(cause.code(), Code::Unknown);
    }

    #[test]
    fn test_unary_response_passes_transport_failure() {
        let response = HttpResponse::failed(ConnectError::unavailable("connection refused"));
        let response = interceptor(config()).unary().response(response);
        assert_eq!(response.cause.unwrap().code(), Code::Unavailable);
    }

    #[test]
    fn test_stream_request_headers() {
        let config = config().with_encoding(Encoding::Json);
        let request = HttpRequest::new("https://example.com", MethodSpec::bidi_stream("pkg.Svc/Chat"));
        let request = interceptor(config).stream().request(request).unwrap();
        assert_eq!(request.content_type, "application/connect+json");
        assert_eq!(request.headers.get(CONNECT_PROTOCOL_VERSION), Some("1"));
        assert!(!request.headers.contains(CONNECT_CONTENT_ENCODING));
    }

    #[test]
    fn test_stream_request_body_is_enveloped() {
        let body = interceptor(config()).stream().request_body(Bytes::from_static(b"hi")).unwrap();
        assert_eq!(&body[..], &[0, 0, 0, 0, 2, b'h', b'i']);
    }

    #[test]
    fn test_stream_results() {
        let mut stream = interceptor(config()).stream();
        let headers: Metadata = [(CONTENT_TYPE, "application/connect+proto")].into_iter().collect();
        assert!(matches!(stream.stream_result(StreamResult::Headers(headers)), StreamResult::Headers(_)));

        let frame = pack_with_flags(0, b"msg");
        match stream.stream_result(StreamResult::Message(frame)) {
            StreamResult::Message(payload) => assert_eq!(&payload[..], b"msg"),
            other => panic!("unexpected {other:?}"),
        }

        let trailers: Metadata = [("x-trailer", "t")].into_iter().collect();
        let end = pack_with_flags(envelope_flags::END_STREAM, &encode_end_stream(None, &trailers));
        match stream.stream_result(StreamResult::Message(end)) {
            StreamResult::Complete { cause, trailers } => {
                assert!(cause.is_none());
                assert_eq!(trailers.get("x-trailer"), Some("t"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_stream_end_with_error() {
        let mut stream = interceptor(config()).stream();
        let err = ConnectError::new(Code::Aborted, "conflict");
        let end = pack_with_flags(envelope_flags::END_STREAM, &encode_end_stream(Some(&err), &Metadata::empty()));
        match stream.stream_result(StreamResult::Message(end)) {
            StreamResult::Complete { cause, .. } => {
                let cause = cause.unwrap();
                assert_eq!(cause.code(), Code::Aborted);
                assert_eq!(cause.message(), Some("conflict"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_stream_malformed_end_stream() {
        let mut stream = interceptor(config()).stream();
        let end = pack_with_flags(envelope_flags::END_STREAM, b"{not json");
        match stream.stream_result(StreamResult::Message(end)) {
            StreamResult::Complete { cause, .. } => assert_eq!(cause.unwrap().code(), Code::Unknown),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_stream_content_type_mismatch() {
        let mut stream = interceptor(config()).stream();
        let headers: Metadata = [(CONTENT_TYPE, "application/proto")].into_iter().collect();
        match stream.stream_result(StreamResult::Headers(headers)) {
            StreamResult::Complete { cause, .. } => assert_eq!(cause.unwrap().code(), Code::Unknown),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_stream_compressed_without_encoding() {
        let mut stream = interceptor(config()).stream();
        let frame = pack_with_flags(envelope_flags::COMPRESSED, b"zzz");
        match stream.stream_result(StreamResult::Message(frame)) {
            StreamResult::Complete { cause, .. } => assert_eq!(cause.unwrap().code(), Code::Internal),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_stream_truncated_frame() {
        let mut stream = interceptor(config()).stream();
        let frame = Bytes::from_static(&[0, 0, 0, 0, 9, b'x']);
        match stream.stream_result(StreamResult::Message(frame)) {
            StreamResult::Complete { cause, .. } => assert_eq!(cause.unwrap().code(), Code::Internal),
            other => panic!("unexpected {other:?}"),
        }
    }
}
