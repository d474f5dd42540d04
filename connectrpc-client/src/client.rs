//! The protocol client.
//!
//! [`ProtocolClient`] turns typed calls into [`HttpRequest`]s, runs them
//! through the interceptor chain (user interceptors first, the protocol
//! interceptor last) and hands them to the [`HttpClient`].

use std::sync::Arc;

use bytes::Bytes;
use connectrpc_core::Metadata;
use http::HeaderName;
use tokio::time::Instant;
#[cfg(feature = "tracing")]
use tracing::Instrument;

use crate::builder::ClientBuilder;
use crate::call::{CallState, abort_error, wait_abort};
use crate::codec::Message;
use crate::config::ProtocolClientConfig;
use crate::interceptor::{StreamChain, StreamFunction, UnaryChain, UnaryFunction};
use crate::method::MethodSpec;
use crate::options::CallOptions;
use crate::protocol::GetConfiguration;
use crate::request::HttpRequest;
use crate::response::{HttpResponse, ResponseMessage};
use crate::streaming::{BidiStream, ClientStream, ServerStream, StreamCore};
use crate::transport::HttpClient;

/// Check if a header name is owned by the protocol layer.
///
/// Headers beginning with `connect-` and `grpc-` are reserved, as are the
/// content headers the protocol interceptors set. Such headers in
/// [`CallOptions`] are ignored.
fn is_reserved_header(name: &HeaderName) -> bool {
    let name = name.as_str();
    name.starts_with("connect-")
        || name.starts_with("grpc-")
        || name == "content-type"
        || name == "content-encoding"
        || name == "accept-encoding"
        || name == "content-length"
        || name == "te"
}

/// A client for one host speaking one protocol.
///
/// Cheap to clone; clones share configuration and transport.
///
/// # Example
///
/// ```ignore
/// use connectrpc_client::{CallOptions, MethodSpec, ProtocolClient, Protocol};
///
/// let client = ProtocolClient::builder("http://localhost:3000")
///     .protocol(Protocol::Grpc)
///     .build()?;
///
/// let method = MethodSpec::unary("connectrpc.eliza.v1.ElizaService/Say");
/// let response = client
///     .unary::<SayRequest, SayResponse>(&method, &request, CallOptions::new())
///     .await;
/// println!("{:?}", response.into_result()?);
/// ```
#[derive(Clone)]
pub struct ProtocolClient {
    config: Arc<ProtocolClientConfig>,
    transport: Arc<dyn HttpClient>,
}

impl std::fmt::Debug for ProtocolClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolClient").field("config", &self.config).finish_non_exhaustive()
    }
}

impl ProtocolClient {
    pub fn builder<S: Into<String>>(host: S) -> ClientBuilder {
        ClientBuilder::new(host)
    }

    pub fn new(config: ProtocolClientConfig, transport: Arc<dyn HttpClient>) -> Self {
        Self {
            config: Arc::new(config),
            transport,
        }
    }

    pub fn config(&self) -> &ProtocolClientConfig {
        &self.config
    }

    /// The request every call starts from: URL, caller headers and timeout.
    fn base_request(&self, method: &MethodSpec, options: &CallOptions) -> HttpRequest {
        let mut request = HttpRequest::new(&self.config.host, method.clone());
        for (name, value) in options.headers.iter() {
            if is_reserved_header(name) {
                #[cfg(feature = "tracing")]
                tracing::debug!(header = %name, "ignoring reserved header in call options");
                continue;
            }
            request.headers.headers_mut().append(name.clone(), value.clone());
        }
        request.timeout = options.timeout.or(self.config.timeout);
        request
    }

    fn deadline(request: &HttpRequest) -> Option<Instant> {
        request.timeout.map(|timeout| Instant::now() + timeout)
    }

    /// Call a unary method.
    pub async fn unary<Req, Res>(&self, method: &MethodSpec, request: &Req, options: CallOptions) -> ResponseMessage<Res>
    where
        Req: Message,
        Res: Message,
    {
        let encoding = self.config.encoding;
        // GET requests must be cacheable, so identical messages must encode identically.
        let body = if method.has_no_side_effects() && self.config.get_configuration != GetConfiguration::Disabled {
            encoding.encode_deterministic(request)
        } else {
            encoding.encode(request)
        };
        let body = match body {
            Ok(body) => body,
            Err(cause) => {
                return ResponseMessage::Failure {
                    cause,
                    headers: Metadata::empty(),
                    trailers: Metadata::empty(),
                };
            }
        };
        self.unary_bytes(method, body, options)
            .await
            .and_then(|body| encoding.decode(&body))
    }

    /// Call a unary method with an already-encoded message.
    pub async fn unary_bytes(&self, method: &MethodSpec, body: Bytes, options: CallOptions) -> ResponseMessage<Bytes> {
        let call = self.unary_inner(method, body, options);

        #[cfg(feature = "tracing")]
        let call = call.instrument(self.span(method));

        ResponseMessage::from(call.await)
    }

    async fn unary_inner(&self, method: &MethodSpec, body: Bytes, options: CallOptions) -> HttpResponse {
        let mut function = UnaryChain(self.config.interceptor_chain().iter().map(|i| i.unary()).collect());

        let mut request = self.base_request(method, &options);
        request.body = body;
        let deadline = Self::deadline(&request);

        let request = match function.request(request) {
            Ok(request) => request,
            Err(cause) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(error = %cause, "interceptor rejected request");
                return HttpResponse::failed(cause);
            }
        };

        let state = CallState::new();
        let response = tokio::select! {
            response = self.transport.unary(request) => response,
            abort = wait_abort(deadline, options.cancel.as_ref()) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(?abort, "call aborted");
                HttpResponse::failed(abort_error(&state, abort))
            }
        };
        state.complete();

        let mut response = function.response(response);
        response.cause = response.cause.map(|cause| state.resolve(cause));
        #[cfg(feature = "tracing")]
        {
            if let Some(cause) = &response.cause {
                tracing::debug!(code = %cause.code(), "call failed");
            }
        }
        response
    }

    /// Open a stream: run the chain over the opening request and hand it to the transport.
    fn open_stream(&self, method: &MethodSpec, options: CallOptions) -> StreamCore {
        let encoding = self.config.encoding;
        let mut function = StreamChain(self.config.interceptor_chain().iter().map(|i| i.stream()).collect());

        let request = self.base_request(method, &options);
        let deadline = Self::deadline(&request);
        let opened = function
            .request(request)
            .and_then(|request| self.transport.stream(request, method.stream_type.is_duplex()));

        match opened {
            Ok(stream) => StreamCore::new(Box::new(function), stream, encoding, deadline, options.cancel),
            Err(cause) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(error = %cause, "failed to open stream");
                StreamCore::failed(cause, encoding)
            }
        }
    }

    /// Call a server-streaming method.
    ///
    /// Failures to send the request surface as the stream's `Complete` event.
    pub async fn server_stream<Req, Res>(&self, method: &MethodSpec, request: &Req, options: CallOptions) -> ServerStream<Res>
    where
        Req: Message,
        Res: Message,
    {
        let open = async {
            let mut stream = BidiStream::<Req, Res>::new(self.open_stream(method, options));
            // A failed send is reported again by `receive`.
            let _ = stream.send(request).await;
            stream.close_send();
            ServerStream::new(stream.into_core())
        };

        #[cfg(feature = "tracing")]
        let open = open.instrument(self.span(method));

        open.await
    }

    /// Call a client-streaming method.
    pub fn client_stream<Req, Res>(&self, method: &MethodSpec, options: CallOptions) -> ClientStream<Req, Res>
    where
        Req: Message,
        Res: Message,
    {
        #[cfg(feature = "tracing")]
        let _span = self.span(method).entered();

        ClientStream::new(self.open_stream(method, options))
    }

    /// Call a bidirectional-streaming method.
    pub fn bidi_stream<Req, Res>(&self, method: &MethodSpec, options: CallOptions) -> BidiStream<Req, Res>
    where
        Req: Message,
        Res: Message,
    {
        #[cfg(feature = "tracing")]
        let _span = self.span(method).entered();

        BidiStream::new(self.open_stream(method, options))
    }

    #[cfg(feature = "tracing")]
    fn span(&self, method: &MethodSpec) -> tracing::Span {
        tracing::info_span!(
            "rpc.call",
            rpc.method = %method.path,
            rpc.type = method.stream_type.as_str(),
            rpc.protocol = self.config.protocol.as_str(),
            rpc.encoding = self.config.encoding.name(),
            otel.kind = "client",
        )
    }
}
