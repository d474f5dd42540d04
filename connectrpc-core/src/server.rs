//! Server-side request parsing and response encoding.
//!
//! These helpers turn an HTTP request into the messages it carries and a
//! handler outcome back into status, headers, body and trailers, for Connect,
//! gRPC and gRPC-Web. They do no I/O.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use bytes::{Bytes, BytesMut};
use http::{HeaderMap, Method, Request, StatusCode, header};

use crate::completion::{GRPC_MESSAGE, GRPC_STATUS, GRPC_STATUS_DETAILS_BIN, encode_status_details, grpc_percent_encode};
use crate::compression::{
    ACCEPT_ENCODING, CONNECT_ACCEPT_ENCODING, CONNECT_CONTENT_ENCODING, CONTENT_ENCODING, CompressionPools,
    GRPC_ACCEPT_ENCODING, GRPC_ENCODING, RequestCompression,
};
use crate::envelope::{envelope_flags, pack, pack_with_flags, unpack};
use crate::error::{Code, ConnectError};
use crate::json::{encode_end_stream, encode_error_json};
use crate::metadata::Metadata;
use crate::pool::BoxedPool;
use crate::timeout::{CONNECT_TIMEOUT_MS, GRPC_TIMEOUT, parse_connect_timeout, parse_grpc_timeout};

/// Header carrying the Connect protocol version.
pub const CONNECT_PROTOCOL_VERSION: &str = "connect-protocol-version";

/// Prefix Connect unary responses use to send trailers as headers.
pub const CONNECT_TRAILER_PREFIX: &str = "trailer-";

/// The wire protocol a request arrived with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerProtocol {
    /// Connect unary (`application/<codec>`, or a GET).
    Connect,
    /// Connect streaming (`application/connect+<codec>`).
    ConnectStream,
    Grpc,
    GrpcWeb,
}

impl ServerProtocol {
    /// Classify a request by method and content-type.
    pub fn detect(method: &Method, content_type: Option<&str>) -> Option<Self> {
        if method == Method::GET {
            return Some(ServerProtocol::Connect);
        }
        if method != Method::POST {
            return None;
        }
        let content_type = content_type?;
        if content_type.starts_with("application/grpc-web") {
            Some(ServerProtocol::GrpcWeb)
        } else if content_type == "application/grpc" || content_type.starts_with("application/grpc+") {
            Some(ServerProtocol::Grpc)
        } else if content_type.starts_with("application/connect+") {
            Some(ServerProtocol::ConnectStream)
        } else if content_type.starts_with("application/") {
            Some(ServerProtocol::Connect)
        } else {
            None
        }
    }

    /// Whether request and response bodies are sequences of envelopes.
    pub fn is_enveloped(&self) -> bool {
        !matches!(self, ServerProtocol::Connect)
    }

    fn encoding_header(&self) -> &'static str {
        match self {
            ServerProtocol::Connect => CONTENT_ENCODING,
            ServerProtocol::ConnectStream => CONNECT_CONTENT_ENCODING,
            ServerProtocol::Grpc | ServerProtocol::GrpcWeb => GRPC_ENCODING,
        }
    }

    fn accept_encoding_header(&self) -> &'static str {
        match self {
            ServerProtocol::Connect => ACCEPT_ENCODING,
            ServerProtocol::ConnectStream => CONNECT_ACCEPT_ENCODING,
            ServerProtocol::Grpc | ServerProtocol::GrpcWeb => GRPC_ACCEPT_ENCODING,
        }
    }
}

/// A decoded RPC request.
#[derive(Debug, Clone)]
pub struct ServerRequest {
    pub protocol: ServerProtocol,
    /// e.g. `acme.v1.UserService`
    pub service: String,
    /// e.g. `GetUser`
    pub method: String,
    /// The message codec name, e.g. `proto` or `json`.
    pub codec: String,
    pub content_type: String,
    pub headers: Metadata,
    pub timeout: Option<Duration>,
    /// The request compression name, if the request was compressed.
    pub compression: Option<String>,
    /// Decompressed messages, in order. Unary requests carry exactly one.
    pub messages: Vec<Bytes>,
}

impl ServerRequest {
    /// The `service/method` procedure name.
    pub fn procedure(&self) -> String {
        format!("{}/{}", self.service, self.method)
    }

    /// The first message, or an empty one.
    pub fn message(&self) -> Bytes {
        self.messages.first().cloned().unwrap_or_default()
    }
}

/// A handler outcome to encode.
#[derive(Debug, Clone)]
pub enum ServerResponse {
    Success {
        messages: Vec<Bytes>,
        headers: Metadata,
        trailers: Metadata,
    },
    Failure {
        /// Messages already produced before a streaming handler failed.
        messages: Vec<Bytes>,
        error: ConnectError,
        headers: Metadata,
        trailers: Metadata,
    },
}

impl ServerResponse {
    /// A successful unary response.
    pub fn message(message: impl Into<Bytes>) -> Self {
        ServerResponse::Success {
            messages: vec![message.into()],
            headers: Metadata::empty(),
            trailers: Metadata::empty(),
        }
    }

    /// A failure with no messages.
    pub fn error(error: ConnectError) -> Self {
        ServerResponse::Failure {
            messages: vec![],
            error,
            headers: Metadata::empty(),
            trailers: Metadata::empty(),
        }
    }
}

/// An encoded HTTP response.
#[derive(Debug, Clone)]
pub struct EncodedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub trailers: HeaderMap,
}

/// Server-side compression settings.
#[derive(Debug, Clone, Default)]
pub struct ServerCompression {
    /// Pools available for request decompression and response compression.
    pub pools: CompressionPools,
    /// Compress responses at least this large; `None` disables response compression.
    pub min_bytes: Option<usize>,
}

/// Decode an RPC request.
///
/// Fails with `InvalidArgument` for malformed requests and `Unimplemented`
/// for unsupported compression.
pub fn parse_request(request: &Request<Bytes>, compression: &ServerCompression) -> Result<ServerRequest, ConnectError> {
    let headers = Metadata::new(request.headers().clone());
    let content_type = headers.get(header::CONTENT_TYPE.as_str()).map(str::to_string);
    let protocol = ServerProtocol::detect(request.method(), content_type.as_deref()).ok_or_else(|| {
        ConnectError::invalid_argument(format!(
            "unsupported request: {} with content-type {}",
            request.method(),
            content_type.as_deref().unwrap_or("<none>")
        ))
    })?;

    let path = request.uri().path().trim_start_matches('/');
    let (service, method) = path
        .rsplit_once('/')
        .filter(|(service, method)| !service.is_empty() && !method.is_empty())
        .ok_or_else(|| ConnectError::invalid_argument(format!("invalid procedure path: {path}")))?;

    let timeout = match protocol {
        ServerProtocol::Connect | ServerProtocol::ConnectStream => {
            if let Some(version) = headers.get(CONNECT_PROTOCOL_VERSION) {
                if version != "1" {
                    return Err(ConnectError::invalid_argument(format!(
                        "unsupported connect protocol version: {version}"
                    )));
                }
            }
            headers.get(CONNECT_TIMEOUT_MS).and_then(parse_connect_timeout)
        }
        ServerProtocol::Grpc | ServerProtocol::GrpcWeb => headers.get(GRPC_TIMEOUT).and_then(parse_grpc_timeout),
    };

    let mut parsed = ServerRequest {
        protocol,
        service: service.to_string(),
        method: method.to_string(),
        codec: String::new(),
        content_type: content_type.clone().unwrap_or_default(),
        headers,
        timeout,
        compression: None,
        messages: vec![],
    };

    if request.method() == Method::GET {
        return parse_get_request(parsed, request.uri().query().unwrap_or_default(), compression);
    }

    let content_type = parsed.content_type.as_str();
    parsed.codec = codec_from_content_type(content_type).to_string();

    let encoding = parsed.headers.get(protocol.encoding_header()).map(str::to_string);
    let pool = lookup_pool(encoding.as_deref(), &compression.pools)?;
    parsed.compression = pool.as_ref().map(|pool| pool.name().to_string());

    let body = request.body().clone();
    parsed.messages = if protocol.is_enveloped() {
        let mut body = body;
        let mut messages = vec![];
        while !body.is_empty() {
            messages.push(unpack(&mut body, pool.as_ref())?.payload);
        }
        messages
    } else {
        let message = match &pool {
            Some(pool) => pool
                .decompress(&body)
                .map_err(|e| ConnectError::from_cause(Code::InvalidArgument, e))?,
            None => body,
        };
        vec![message]
    };

    Ok(parsed)
}

fn parse_get_request(
    mut parsed: ServerRequest,
    query: &str,
    compression: &ServerCompression,
) -> Result<ServerRequest, ConnectError> {
    let mut message = None;
    let mut base64 = false;
    let mut encoding = None;
    let mut compression_name = None;
    for pair in query.split('&').filter(|pair| !pair.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        match key {
            "message" => message = Some(value),
            "base64" => base64 = value == "1",
            "encoding" => encoding = Some(value),
            "compression" => compression_name = Some(value),
            "connect" if value != "v1" => {
                return Err(ConnectError::invalid_argument(format!(
                    "unsupported connect version: {value}"
                )));
            }
            _ => {}
        }
    }

    let encoding =
        encoding.ok_or_else(|| ConnectError::invalid_argument("missing encoding query parameter"))?;
    let message = message.unwrap_or_default();
    let raw = if base64 {
        URL_SAFE_NO_PAD
            .decode(message)
            .or_else(|_| URL_SAFE.decode(message))
            .map_err(|e| ConnectError::from_cause(Code::InvalidArgument, e))?
    } else {
        message.as_bytes().to_vec()
    };

    let pool = lookup_pool(compression_name, &compression.pools)?;
    let message = match &pool {
        Some(pool) => pool
            .decompress(&raw)
            .map_err(|e| ConnectError::from_cause(Code::InvalidArgument, e))?,
        None => Bytes::from(raw),
    };

    parsed.codec = encoding.to_string();
    parsed.content_type = format!("application/{encoding}");
    parsed.compression = pool.map(|pool| pool.name().to_string());
    parsed.messages = vec![message];
    Ok(parsed)
}

fn lookup_pool(name: Option<&str>, pools: &CompressionPools) -> Result<Option<BoxedPool>, ConnectError> {
    match name {
        None | Some("") | Some("identity") => Ok(None),
        Some(name) => pools
            .get(name)
            .cloned()
            .map(Some)
            .ok_or_else(|| ConnectError::unimplemented(format!("unsupported compression: {name}"))),
    }
}

fn codec_from_content_type(content_type: &str) -> &str {
    let base = content_type.split(';').next().unwrap_or_default().trim();
    let subtype = base.strip_prefix("application/").unwrap_or(base);
    match subtype.split_once('+') {
        Some((_, codec)) => codec,
        None if subtype == "grpc" || subtype == "grpc-web" => "proto",
        None => subtype,
    }
}

/// Encode a handler outcome as an HTTP response for `request`.
pub fn encode_response(
    request: &ServerRequest,
    response: ServerResponse,
    compression: &ServerCompression,
) -> Result<EncodedResponse, ConnectError> {
    let (messages, error, headers, trailers) = match response {
        ServerResponse::Success {
            messages,
            headers,
            trailers,
        } => (messages, None, headers, trailers),
        ServerResponse::Failure {
            messages,
            error,
            headers,
            trailers,
        } => (messages, Some(error), headers, trailers),
    };

    let protocol = request.protocol;
    let response_pool = compression
        .min_bytes
        .and_then(|min_bytes| {
            compression
                .pools
                .negotiate(request.headers.get(protocol.accept_encoding_header()))
                .map(|pool| RequestCompression::new(min_bytes, pool))
        });

    let mut out_headers = headers;
    let content_type = match protocol {
        ServerProtocol::Connect => format!("application/{}", request.codec),
        ServerProtocol::ConnectStream => format!("application/connect+{}", request.codec),
        ServerProtocol::Grpc => format!("application/grpc+{}", request.codec),
        ServerProtocol::GrpcWeb => format!("application/grpc-web+{}", request.codec),
    };
    out_headers.insert(header::CONTENT_TYPE.as_str(), &content_type);

    match protocol {
        ServerProtocol::Connect => Ok(encode_connect_unary(
            messages,
            error,
            out_headers,
            trailers,
            response_pool.as_ref(),
        )),
        ServerProtocol::ConnectStream => {
            let mut body = BytesMut::new();
            if let Some(pool) = &response_pool {
                out_headers.insert(CONNECT_CONTENT_ENCODING, pool.pool.name());
            }
            for message in &messages {
                body.extend_from_slice(&pack(message, response_pool.as_ref())?);
            }
            let end_stream = encode_end_stream(error.as_ref(), &trailers);
            body.extend_from_slice(&pack_with_flags(envelope_flags::END_STREAM, &end_stream));
            Ok(EncodedResponse {
                status: StatusCode::OK,
                headers: out_headers.into_headers(),
                body: body.freeze(),
                trailers: HeaderMap::new(),
            })
        }
        ServerProtocol::Grpc | ServerProtocol::GrpcWeb => {
            if let Some(pool) = &response_pool {
                out_headers.insert(GRPC_ENCODING, pool.pool.name());
            }
            let mut body = BytesMut::new();
            for message in &messages {
                body.extend_from_slice(&pack(message, response_pool.as_ref())?);
            }

            let mut status_trailers = trailers;
            insert_grpc_status(&mut status_trailers, error.as_ref());

            if protocol == ServerProtocol::GrpcWeb {
                body.extend_from_slice(&pack_with_flags(
                    envelope_flags::TRAILERS,
                    &encode_grpc_web_trailers(&status_trailers),
                ));
                return Ok(EncodedResponse {
                    status: StatusCode::OK,
                    headers: out_headers.into_headers(),
                    body: body.freeze(),
                    trailers: HeaderMap::new(),
                });
            }

            if body.is_empty() && error.is_some() {
                // trailers-only
                out_headers.merge(&status_trailers);
                return Ok(EncodedResponse {
                    status: StatusCode::OK,
                    headers: out_headers.into_headers(),
                    body: Bytes::new(),
                    trailers: HeaderMap::new(),
                });
            }

            Ok(EncodedResponse {
                status: StatusCode::OK,
                headers: out_headers.into_headers(),
                body: body.freeze(),
                trailers: status_trailers.into_headers(),
            })
        }
    }
}

fn encode_connect_unary(
    messages: Vec<Bytes>,
    error: Option<ConnectError>,
    mut headers: Metadata,
    trailers: Metadata,
    response_pool: Option<&RequestCompression>,
) -> EncodedResponse {
    for (name, value) in trailers.iter() {
        if let Ok(value) = value.to_str() {
            headers.append(&format!("{CONNECT_TRAILER_PREFIX}{name}"), value);
        }
    }

    if let Some(error) = error {
        headers.insert(header::CONTENT_TYPE.as_str(), "application/json");
        return EncodedResponse {
            status: StatusCode::from_u16(error.code().http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            headers: headers.into_headers(),
            body: encode_error_json(&error),
            trailers: HeaderMap::new(),
        };
    }

    let message = messages.into_iter().next().unwrap_or_default();
    let body = match response_pool.and_then(|c| c.select(&message)) {
        Some(pool) => match pool.compress(&message) {
            Ok(compressed) => {
                headers.insert(CONTENT_ENCODING, pool.name());
                compressed
            }
            Err(_) => message,
        },
        None => message,
    };
    EncodedResponse {
        status: StatusCode::OK,
        headers: headers.into_headers(),
        body,
        trailers: HeaderMap::new(),
    }
}

fn insert_grpc_status(trailers: &mut Metadata, error: Option<&ConnectError>) {
    let Some(error) = error else {
        trailers.insert(GRPC_STATUS, "0");
        return;
    };
    trailers.insert(GRPC_STATUS, &error.code().value().to_string());
    if let Some(message) = error.message() {
        trailers.insert(GRPC_MESSAGE, &grpc_percent_encode(message));
    }
    if !error.details().is_empty() {
        trailers.insert(
            GRPC_STATUS_DETAILS_BIN,
            &encode_status_details(error.code(), error.message(), error.details()),
        );
    }
}

/// Serialize trailers as gRPC-Web trailer frame text.
pub fn encode_grpc_web_trailers(trailers: &Metadata) -> Bytes {
    let mut text = String::new();
    for (name, value) in trailers.iter() {
        if let Ok(value) = value.to_str() {
            text.push_str(name.as_str());
            text.push_str(": ");
            text.push_str(value);
            text.push_str("\r\n");
        }
    }
    text.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::GrpcCompletion;
    use crate::envelope::ENVELOPE_HEADER_SIZE;
    use crate::json::{parse_end_stream, parse_error_json};

    fn post(path: &str, content_type: &str) -> http::request::Builder {
        Request::builder()
            .method(Method::POST)
            .uri(path)
            .header("content-type", content_type)
    }

    #[test]
    fn test_detect() {
        assert_eq!(ServerProtocol::detect(&Method::GET, None), Some(ServerProtocol::Connect));
        assert_eq!(
            ServerProtocol::detect(&Method::POST, Some("application/proto")),
            Some(ServerProtocol::Connect)
        );
        assert_eq!(
            ServerProtocol::detect(&Method::POST, Some("application/json; charset=utf-8")),
            Some(ServerProtocol::Connect)
        );
        assert_eq!(
            ServerProtocol::detect(&Method::POST, Some("application/connect+json")),
            Some(ServerProtocol::ConnectStream)
        );
        assert_eq!(
            ServerProtocol::detect(&Method::POST, Some("application/grpc")),
            Some(ServerProtocol::Grpc)
        );
        assert_eq!(
            ServerProtocol::detect(&Method::POST, Some("application/grpc+proto")),
            Some(ServerProtocol::Grpc)
        );
        assert_eq!(
            ServerProtocol::detect(&Method::POST, Some("application/grpc-web+proto")),
            Some(ServerProtocol::GrpcWeb)
        );
        assert_eq!(ServerProtocol::detect(&Method::POST, Some("text/plain")), None);
        assert_eq!(ServerProtocol::detect(&Method::PUT, Some("application/proto")), None);
    }

    #[test]
    fn test_parse_connect_unary() {
        let request = post("/acme.v1.Users/Get", "application/proto")
            .header("connect-protocol-version", "1")
            .header("connect-timeout-ms", "1500")
            .body(Bytes::from_static(b"payload"))
            .unwrap();
        let parsed = parse_request(&request, &ServerCompression::default()).unwrap();

        assert_eq!(parsed.protocol, ServerProtocol::Connect);
        assert_eq!(parsed.service, "acme.v1.Users");
        assert_eq!(parsed.method, "Get");
        assert_eq!(parsed.procedure(), "acme.v1.Users/Get");
        assert_eq!(parsed.codec, "proto");
        assert_eq!(parsed.timeout, Some(Duration::from_millis(1500)));
        assert_eq!(parsed.message(), Bytes::from_static(b"payload"));
    }

    #[test]
    fn test_parse_rejects_bad_version_and_path() {
        let request = post("/acme.v1.Users/Get", "application/proto")
            .header("connect-protocol-version", "2")
            .body(Bytes::new())
            .unwrap();
        let err = parse_request(&request, &ServerCompression::default()).unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);

        let request = post("/nomethod", "application/proto").body(Bytes::new()).unwrap();
        let err = parse_request(&request, &ServerCompression::default()).unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
    }

    #[test]
    fn test_parse_unknown_compression() {
        let request = post("/svc/M", "application/grpc+proto")
            .header("grpc-encoding", "lz4")
            .body(pack(b"x", None).unwrap())
            .unwrap();
        let err = parse_request(&request, &ServerCompression::default()).unwrap_err();
        assert_eq!(err.code(), Code::Unimplemented);
        assert_eq!(err.message(), Some("unsupported compression: lz4"));
    }

    #[test]
    fn test_parse_grpc_enveloped() {
        let mut body = BytesMut::new();
        body.extend_from_slice(&pack(b"one", None).unwrap());
        body.extend_from_slice(&pack(b"two", None).unwrap());
        let request = post("/svc/Stream", "application/grpc")
            .header("grpc-timeout", "250m")
            .body(body.freeze())
            .unwrap();
        let parsed = parse_request(&request, &ServerCompression::default()).unwrap();

        assert_eq!(parsed.protocol, ServerProtocol::Grpc);
        assert_eq!(parsed.codec, "proto");
        assert_eq!(parsed.timeout, Some(Duration::from_millis(250)));
        assert_eq!(parsed.messages, vec![Bytes::from_static(b"one"), Bytes::from_static(b"two")]);
    }

    #[test]
    fn test_parse_get() {
        let request = Request::builder()
            .method(Method::GET)
            .uri("/svc/Get?base64=1&connect=v1&encoding=json&message=eyJpZCI6MX0")
            .body(Bytes::new())
            .unwrap();
        let parsed = parse_request(&request, &ServerCompression::default()).unwrap();
        assert_eq!(parsed.protocol, ServerProtocol::Connect);
        assert_eq!(parsed.codec, "json");
        assert_eq!(parsed.message(), Bytes::from_static(br#"{"id":1}"#));
    }

    fn request(protocol: ServerProtocol, codec: &str) -> ServerRequest {
        ServerRequest {
            protocol,
            service: "svc".into(),
            method: "M".into(),
            codec: codec.into(),
            content_type: String::new(),
            headers: Metadata::empty(),
            timeout: None,
            compression: None,
            messages: vec![],
        }
    }

    #[test]
    fn test_encode_connect_unary_success() {
        let response = ServerResponse::Success {
            messages: vec![Bytes::from_static(b"reply")],
            headers: [("x-header", "h")].into_iter().collect(),
            trailers: [("x-trailer", "t")].into_iter().collect(),
        };
        let encoded =
            encode_response(&request(ServerProtocol::Connect, "proto"), response, &ServerCompression::default())
                .unwrap();
        assert_eq!(encoded.status, StatusCode::OK);
        assert_eq!(encoded.headers["content-type"], "application/proto");
        assert_eq!(encoded.headers["trailer-x-trailer"], "t");
        assert_eq!(encoded.headers["x-header"], "h");
        assert_eq!(&encoded.body[..], b"reply");
    }

    #[test]
    fn test_encode_connect_unary_error() {
        let err = ConnectError::resource_exhausted("quota").add_detail("t", b"v".to_vec());
        let encoded = encode_response(
            &request(ServerProtocol::Connect, "proto"),
            ServerResponse::error(err),
            &ServerCompression::default(),
        )
        .unwrap();
        assert_eq!(encoded.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(encoded.headers["content-type"], "application/json");
        let parsed = parse_error_json(&encoded.body).unwrap();
        assert_eq!(parsed.code(), Code::ResourceExhausted);
        assert_eq!(parsed.details().len(), 1);
    }

    #[test]
    fn test_encode_connect_stream() {
        let response = ServerResponse::Failure {
            messages: vec![Bytes::from_static(b"a")],
            error: ConnectError::aborted("stop"),
            headers: Metadata::empty(),
            trailers: [("x-t", "1")].into_iter().collect(),
        };
        let encoded = encode_response(
            &request(ServerProtocol::ConnectStream, "json"),
            response,
            &ServerCompression::default(),
        )
        .unwrap();
        assert_eq!(encoded.headers["content-type"], "application/connect+json");

        let mut body = encoded.body;
        assert_eq!(unpack(&mut body, None).unwrap().payload, Bytes::from_static(b"a"));
        let end = unpack(&mut body, None).unwrap();
        assert!(end.has_flag(envelope_flags::END_STREAM));
        let end = parse_end_stream(&end.payload).unwrap();
        assert_eq!(end.error.map(|e| e.code()), Some(Code::Aborted));
        assert_eq!(end.metadata.get("x-t"), Some("1"));
        assert!(body.is_empty());
    }

    #[test]
    fn test_encode_grpc_success_and_trailers_only() {
        let req = request(ServerProtocol::Grpc, "proto");
        let encoded = encode_response(&req, ServerResponse::message("ok"), &ServerCompression::default()).unwrap();
        assert_eq!(encoded.headers["content-type"], "application/grpc+proto");
        assert_eq!(encoded.body.len(), ENVELOPE_HEADER_SIZE + 2);
        assert_eq!(encoded.trailers["grpc-status"], "0");

        let err = ConnectError::not_found("missing 100%");
        let encoded = encode_response(&req, ServerResponse::error(err), &ServerCompression::default()).unwrap();
        assert!(encoded.body.is_empty());
        assert!(encoded.trailers.is_empty());
        assert_eq!(encoded.headers["grpc-status"], "5");
        assert_eq!(encoded.headers["grpc-message"], "missing 100%25");

        let completion = GrpcCompletion::parse(&Metadata::new(encoded.headers), false, &Metadata::empty());
        assert!(completion.trailers_only);
        assert_eq!(completion.code, Some(Code::NotFound));
        assert_eq!(completion.message, "missing 100%");
    }

    #[test]
    fn test_encode_grpc_web_trailer_frame() {
        let req = request(ServerProtocol::GrpcWeb, "proto");
        let encoded = encode_response(&req, ServerResponse::message("m"), &ServerCompression::default()).unwrap();
        assert_eq!(encoded.headers["content-type"], "application/grpc-web+proto");

        let mut body = encoded.body;
        assert_eq!(unpack(&mut body, None).unwrap().payload, Bytes::from_static(b"m"));
        let trailers = unpack(&mut body, None).unwrap();
        assert!(trailers.has_flag(envelope_flags::TRAILERS));
        assert_eq!(&trailers.payload[..], b"grpc-status: 0\r\n");
    }

    #[test]
    fn test_codec_from_content_type() {
        assert_eq!(codec_from_content_type("application/proto"), "proto");
        assert_eq!(codec_from_content_type("application/json; charset=utf-8"), "json");
        assert_eq!(codec_from_content_type("application/connect+json"), "json");
        assert_eq!(codec_from_content_type("application/grpc"), "proto");
        assert_eq!(codec_from_content_type("application/grpc-web+json"), "json");
    }
}
