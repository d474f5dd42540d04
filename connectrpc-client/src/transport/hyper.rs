//! Hyper-based HTTP transport.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use connectrpc_core::{Code, ConnectError, Metadata, frame_length};
use futures::FutureExt;
use futures::future::BoxFuture;
use http::header::{CONTENT_TYPE, HeaderValue};
use http::{Method, StatusCode};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::{Client, connect::HttpConnector};
use hyper_util::rt::{TokioExecutor, TokioTimer};
use rustls::ClientConfig;
use tokio::sync::mpsc;

use super::body::TransportBody;
use super::connector::build_https_connector;
use super::{HttpClient, HttpStream, TransportError};
use crate::request::HttpRequest;
use crate::response::HttpResponse;
use crate::stream_result::StreamResult;

type HyperClient = Client<HttpsConnector<HttpConnector>, TransportBody>;

/// Request messages buffered ahead of the network.
const REQUEST_BUFFER: usize = 16;

/// Response events buffered ahead of the caller.
const RESPONSE_BUFFER: usize = 16;

/// HTTP transport using hyper_util's legacy client.
///
/// Cloning is cheap; clones share the connection pool.
///
/// ```ignore
/// use connectrpc_client::{ClientBuilder, transport::HyperTransport};
///
/// let transport = HyperTransport::builder().http2_only(true).build()?;
/// let client = ClientBuilder::new("http://localhost:8080")
///     .transport(transport)
///     .build()?;
/// ```
#[derive(Clone)]
pub struct HyperTransport {
    client: HyperClient,
    http2_only: bool,
}

impl std::fmt::Debug for HyperTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperTransport")
            .field("http2_only", &self.http2_only)
            .finish_non_exhaustive()
    }
}

impl HyperTransport {
    pub fn builder() -> HyperTransportBuilder {
        HyperTransportBuilder::new()
    }

    /// A transport with default settings.
    pub fn new() -> Result<Self, TransportError> {
        Self::builder().build()
    }

    pub fn is_http2_only(&self) -> bool {
        self.http2_only
    }
}

impl HttpClient for HyperTransport {
    fn unary(&self, request: HttpRequest) -> BoxFuture<'static, HttpResponse> {
        let client = self.client.clone();
        async move {
            let body = TransportBody::full(request.body.clone());
            let request = match build_request(&request, body) {
                Ok(request) => request,
                Err(cause) => return HttpResponse::failed(cause),
            };
            let response = match client.request(request).await {
                Ok(response) => response,
                Err(e) => return HttpResponse::failed(unavailable(e)),
            };

            let (parts, body) = response.into_parts();
            match body.collect().await {
                Ok(collected) => {
                    let trailers = collected.trailers().cloned().map(Metadata::from).unwrap_or_default();
                    HttpResponse::new(parts.status, parts.headers.into(), collected.to_bytes(), trailers)
                }
                Err(e) => HttpResponse::failed(unavailable(e).with_metadata(parts.headers.into())),
            }
        }
        .boxed()
    }

    fn stream(&self, request: HttpRequest, duplex: bool) -> Result<HttpStream, ConnectError> {
        let (body_tx, body_rx) = mpsc::channel(REQUEST_BUFFER);
        let (event_tx, event_rx) = mpsc::channel(RESPONSE_BUFFER);
        let request = build_request(&request, TransportBody::channel(body_rx))?;

        #[cfg(feature = "tracing")]
        tracing::debug!(uri = %request.uri(), duplex, "opening stream");
        #[cfg(not(feature = "tracing"))]
        let _ = duplex;

        tokio::spawn(pump(self.client.clone(), request, event_tx));
        Ok(HttpStream {
            sender: body_tx,
            receiver: event_rx,
        })
    }
}

fn unavailable<E>(e: E) -> ConnectError
where
    E: std::error::Error + Send + Sync + 'static,
{
    #[cfg(feature = "tracing")]
    tracing::debug!(error = %e, "transport failure");
    let message = e.to_string();
    ConnectError::from_cause(Code::Unavailable, e).with_message(message)
}

fn build_request(request: &HttpRequest, body: TransportBody) -> Result<http::Request<TransportBody>, ConnectError> {
    let mut builder = http::Request::builder()
        .method(request.method.clone())
        .uri(request.url.as_str());
    if let Some(headers) = builder.headers_mut() {
        headers.extend(request.headers.headers().iter().map(|(k, v)| (k.clone(), v.clone())));
        // A GET carries no body and so no content type.
        if !(request.method == Method::GET && request.body.is_empty()) {
            let content_type = HeaderValue::from_str(&request.content_type)
                .map_err(|_| ConnectError::internal(format!("invalid content-type: {}", request.content_type)))?;
            headers.insert(CONTENT_TYPE, content_type);
        }
    }
    builder
        .body(body)
        .map_err(|e| ConnectError::from_cause(Code::InvalidArgument, e).with_message(format!("invalid request for {}", request.url)))
}

/// Accumulates body chunks and cuts them into whole envelopes.
#[derive(Debug, Default)]
struct FrameSplitter {
    buffer: BytesMut,
}

impl FrameSplitter {
    fn push(&mut self, data: &[u8]) -> Vec<Bytes> {
        self.buffer.extend_from_slice(data);
        let mut frames = Vec::new();
        while let Some(len) = frame_length(&self.buffer) {
            frames.push(self.buffer.split_to(len).freeze());
        }
        frames
    }

    /// Fails if the body ended partway through an envelope.
    fn finish(&self) -> Result<(), ConnectError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        Err(ConnectError::internal(format!(
            "protocol error: stream ended with {} bytes of an incomplete message",
            self.buffer.len()
        )))
    }
}

/// Drive one streaming exchange, forwarding events until the body ends or
/// the receiver is dropped.
async fn pump(client: HyperClient, request: http::Request<TransportBody>, tx: mpsc::Sender<StreamResult<Bytes>>) {
    let response = tokio::select! {
        response = client.request(request) => response,
        _ = tx.closed() => return,
    };
    let response = match response {
        Ok(response) => response,
        Err(e) => {
            let _ = tx.send(StreamResult::fail(unavailable(e))).await;
            return;
        }
    };

    let (parts, body) = response.into_parts();
    let headers = Metadata::from(parts.headers);
    if parts.status != StatusCode::OK {
        let cause = ConnectError::new(
            Code::from_http_status(parts.status.as_u16()),
            format!("HTTP status {}", parts.status.as_u16()),
        )
        .with_metadata(headers);
        let _ = tx.send(StreamResult::fail(cause)).await;
        return;
    }
    if tx.send(StreamResult::Headers(headers)).await.is_err() {
        return;
    }

    let result = tokio::select! {
        result = forward_body(body, &tx) => result,
        _ = tx.closed() => return,
    };
    let _ = match result {
        Ok(Some(trailers)) => tx.send(StreamResult::complete(trailers)).await,
        Ok(None) => Ok(()),
        Err(cause) => tx.send(StreamResult::fail(cause)).await,
    };
}

/// Forward each envelope of `body`, then return the trailers.
///
/// `Ok(None)` means the receiver went away.
async fn forward_body(mut body: Incoming, tx: &mpsc::Sender<StreamResult<Bytes>>) -> Result<Option<Metadata>, ConnectError> {
    let mut splitter = FrameSplitter::default();
    let mut trailers = Metadata::empty();
    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(unavailable)?;
        match frame.into_data() {
            Ok(data) => {
                for message in splitter.push(&data) {
                    if tx.send(StreamResult::Message(message)).await.is_err() {
                        return Ok(None);
                    }
                }
            }
            Err(frame) => {
                if let Ok(received) = frame.into_trailers() {
                    trailers.merge(&Metadata::from(received));
                }
            }
        }
    }
    splitter.finish()?;
    Ok(Some(trailers))
}

/// Builder for [`HyperTransport`].
pub struct HyperTransportBuilder {
    tls_config: Option<ClientConfig>,
    http2_only: bool,
    pool_idle_timeout: Option<Duration>,
    pool_max_idle_per_host: usize,
    h2_initial_stream_window_size: Option<u32>,
    h2_initial_connection_window_size: Option<u32>,
    h2_keep_alive_interval: Option<Duration>,
    h2_keep_alive_timeout: Option<Duration>,
}

impl Default for HyperTransportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HyperTransportBuilder {
    pub fn new() -> Self {
        Self {
            tls_config: None,
            http2_only: false,
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
            h2_initial_stream_window_size: None,
            h2_initial_connection_window_size: None,
            h2_keep_alive_interval: None,
            h2_keep_alive_timeout: None,
        }
    }

    /// Use a custom TLS configuration, e.g. for private roots or mTLS.
    pub fn tls_config(mut self, config: ClientConfig) -> Self {
        self.tls_config = Some(config);
        self
    }

    /// Speak HTTP/2 without negotiation.
    ///
    /// gRPC requires HTTP/2, and bidirectional streams over plaintext
    /// (h2c) need this set.
    pub fn http2_only(mut self, enabled: bool) -> Self {
        self.http2_only = enabled;
        self
    }

    /// Default: 90 seconds.
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = Some(timeout);
        self
    }

    pub fn pool_idle_timeout_none(mut self) -> Self {
        self.pool_idle_timeout = None;
        self
    }

    /// Default: 32.
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.pool_max_idle_per_host = max;
        self
    }

    pub fn h2_initial_stream_window_size(mut self, size: u32) -> Self {
        self.h2_initial_stream_window_size = Some(size);
        self
    }

    pub fn h2_initial_connection_window_size(mut self, size: u32) -> Self {
        self.h2_initial_connection_window_size = Some(size);
        self
    }

    /// Send HTTP/2 PINGs at this interval to detect dead connections.
    pub fn h2_keep_alive_interval(mut self, interval: Duration) -> Self {
        self.h2_keep_alive_interval = Some(interval);
        self
    }

    /// How long to wait for a PING acknowledgement. Only effective with
    /// `h2_keep_alive_interval`.
    pub fn h2_keep_alive_timeout(mut self, timeout: Duration) -> Self {
        self.h2_keep_alive_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<HyperTransport, TransportError> {
        let https_connector = build_https_connector(self.tls_config)?;

        let mut builder = Client::builder(TokioExecutor::new());
        // Required for pool_idle_timeout to take effect.
        builder.pool_timer(TokioTimer::new());
        if let Some(timeout) = self.pool_idle_timeout {
            builder.pool_idle_timeout(timeout);
        }
        builder.pool_max_idle_per_host(self.pool_max_idle_per_host);

        if self.http2_only {
            builder.http2_only(true);
        }
        if let Some(size) = self.h2_initial_stream_window_size {
            builder.http2_initial_stream_window_size(size);
        }
        if let Some(size) = self.h2_initial_connection_window_size {
            builder.http2_initial_connection_window_size(size);
        }
        if let Some(interval) = self.h2_keep_alive_interval {
            builder.http2_keep_alive_interval(interval);
        }
        if let Some(timeout) = self.h2_keep_alive_timeout {
            builder.http2_keep_alive_timeout(timeout);
        }

        Ok(HyperTransport {
            client: builder.build(https_connector),
            http2_only: self.http2_only,
        })
    }
}

impl std::fmt::Debug for HyperTransportBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperTransportBuilder")
            .field("tls_config", &self.tls_config.is_some())
            .field("http2_only", &self.http2_only)
            .field("pool_idle_timeout", &self.pool_idle_timeout)
            .field("pool_max_idle_per_host", &self.pool_max_idle_per_host)
            .field("h2_initial_stream_window_size", &self.h2_initial_stream_window_size)
            .field("h2_initial_connection_window_size", &self.h2_initial_connection_window_size)
            .field("h2_keep_alive_interval", &self.h2_keep_alive_interval)
            .field("h2_keep_alive_timeout", &self.h2_keep_alive_timeout)
            .finish()
    }
}
