//! Interceptors.
//!
//! An [`Interceptor`] hands out a fresh [`UnaryFunction`] or
//! [`StreamFunction`] for every call, so per-call state (a negotiated
//! compression pool, whether a message was seen) lives in the function and
//! is never shared between calls.
//!
//! User interceptors run in registration order on the way out and in reverse
//! order on the way in. The protocol interceptor is always innermost: it sees
//! the request last and the response first.
//!
//! # Example
//!
//! ```ignore
//! use connectrpc_client::{ClientBuilder, HeaderInterceptor};
//!
//! let client = ClientBuilder::new("https://demo.connectrpc.com")
//!     .interceptor(HeaderInterceptor::try_new("authorization", "Bearer token123")?)
//!     .build()?;
//! ```

use std::sync::Arc;

use bytes::Bytes;
use connectrpc_core::{ConnectError, Metadata};
use http::{HeaderName, HeaderValue};

use crate::request::HttpRequest;
use crate::response::HttpResponse;
use crate::stream_result::StreamResult;

/// Per-call transforms for a unary RPC.
pub trait UnaryFunction: Send {
    /// Transform the outgoing request. An error fails the call without
    /// sending anything.
    fn request(&mut self, request: HttpRequest) -> Result<HttpRequest, ConnectError> {
        Ok(request)
    }

    /// Transform the incoming response.
    fn response(&mut self, response: HttpResponse) -> HttpResponse {
        response
    }
}

/// Per-call transforms for a streaming RPC.
pub trait StreamFunction: Send {
    /// Transform the request that opens the stream.
    fn request(&mut self, request: HttpRequest) -> Result<HttpRequest, ConnectError> {
        Ok(request)
    }

    /// Transform one outgoing message.
    fn request_body(&mut self, body: Bytes) -> Result<Bytes, ConnectError> {
        Ok(body)
    }

    /// Transform one incoming stream event.
    fn stream_result(&mut self, result: StreamResult<Bytes>) -> StreamResult<Bytes> {
        result
    }
}

/// Produces per-call transforms.
pub trait Interceptor: Send + Sync {
    fn unary(&self) -> Box<dyn UnaryFunction> {
        Box::new(())
    }

    fn stream(&self) -> Box<dyn StreamFunction> {
        Box::new(())
    }
}

// ============================================================================
// Base case
// ============================================================================

/// `()` passes everything through unchanged.
impl UnaryFunction for () {}

impl StreamFunction for () {}

impl Interceptor for () {}

impl<T: Interceptor + ?Sized> Interceptor for Arc<T> {
    fn unary(&self) -> Box<dyn UnaryFunction> {
        (**self).unary()
    }

    fn stream(&self) -> Box<dyn StreamFunction> {
        (**self).stream()
    }
}

// ============================================================================
// Chaining
// ============================================================================

/// Unary transforms applied in order to requests and in reverse to responses.
pub(crate) struct UnaryChain(pub(crate) Vec<Box<dyn UnaryFunction>>);

impl UnaryFunction for UnaryChain {
    fn request(&mut self, request: HttpRequest) -> Result<HttpRequest, ConnectError> {
        self.0.iter_mut().try_fold(request, |request, f| f.request(request))
    }

    fn response(&mut self, response: HttpResponse) -> HttpResponse {
        self.0.iter_mut().rev().fold(response, |response, f| f.response(response))
    }
}

/// Stream transforms applied in order outbound and in reverse inbound.
pub(crate) struct StreamChain(pub(crate) Vec<Box<dyn StreamFunction>>);

impl StreamFunction for StreamChain {
    fn request(&mut self, request: HttpRequest) -> Result<HttpRequest, ConnectError> {
        self.0.iter_mut().try_fold(request, |request, f| f.request(request))
    }

    fn request_body(&mut self, body: Bytes) -> Result<Bytes, ConnectError> {
        self.0.iter_mut().try_fold(body, |body, f| f.request_body(body))
    }

    fn stream_result(&mut self, result: StreamResult<Bytes>) -> StreamResult<Bytes> {
        self.0.iter_mut().rev().fold(result, |result, f| f.stream_result(result))
    }
}

/// A compile-time chain of two interceptors.
///
/// `Chain<A, B>` applies `A` first, then `B` for requests. Responses and
/// stream events go through `B` then `A`.
#[derive(Clone, Debug)]
pub struct Chain<A, B>(pub A, pub B);

impl<A, B> Interceptor for Chain<A, B>
where
    A: Interceptor,
    B: Interceptor,
{
    fn unary(&self) -> Box<dyn UnaryFunction> {
        Box::new(UnaryChain(vec![self.0.unary(), self.1.unary()]))
    }

    fn stream(&self) -> Box<dyn StreamFunction> {
        Box::new(StreamChain(vec![self.0.stream(), self.1.stream()]))
    }
}

// ============================================================================
// Header Interceptor
// ============================================================================

/// Adds a header to every request.
#[derive(Clone, Debug)]
pub struct HeaderInterceptor {
    name: HeaderName,
    value: HeaderValue,
}

impl HeaderInterceptor {
    /// Returns an `InvalidArgument` error if the name or value is not a valid header.
    pub fn try_new(name: &str, value: &str) -> Result<Self, ConnectError> {
        let name = name
            .parse()
            .map_err(|_| ConnectError::invalid_argument(format!("invalid header name: {name}")))?;
        let value = value
            .parse()
            .map_err(|_| ConnectError::invalid_argument(format!("invalid header value: {value}")))?;
        Ok(Self { name, value })
    }

    pub fn from_parts(name: HeaderName, value: HeaderValue) -> Self {
        Self { name, value }
    }

    fn apply(&self, mut request: HttpRequest) -> HttpRequest {
        request
            .headers
            .headers_mut()
            .insert(self.name.clone(), self.value.clone());
        request
    }
}

impl UnaryFunction for HeaderInterceptor {
    fn request(&mut self, request: HttpRequest) -> Result<HttpRequest, ConnectError> {
        Ok(self.apply(request))
    }
}

impl StreamFunction for HeaderInterceptor {
    fn request(&mut self, request: HttpRequest) -> Result<HttpRequest, ConnectError> {
        Ok(self.apply(request))
    }
}

impl Interceptor for HeaderInterceptor {
    fn unary(&self) -> Box<dyn UnaryFunction> {
        Box::new(self.clone())
    }

    fn stream(&self) -> Box<dyn StreamFunction> {
        Box::new(self.clone())
    }
}

// ============================================================================
// Closure Interceptor
// ============================================================================

/// Adapts a closure over the outgoing request.
///
/// ```ignore
/// use connectrpc_client::RequestInterceptor;
///
/// let logging = RequestInterceptor::new(|request| {
///     println!("calling {}", request.method_spec.path);
///     Ok(())
/// });
/// ```
pub struct RequestInterceptor<F> {
    before: Arc<F>,
}

impl<F> RequestInterceptor<F>
where
    F: Fn(&mut HttpRequest) -> Result<(), ConnectError> + Send + Sync + 'static,
{
    pub fn new(before: F) -> Self {
        Self {
            before: Arc::new(before),
        }
    }
}

impl<F> Clone for RequestInterceptor<F> {
    fn clone(&self) -> Self {
        Self {
            before: self.before.clone(),
        }
    }
}

impl<F> std::fmt::Debug for RequestInterceptor<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestInterceptor").finish()
    }
}

impl<F> UnaryFunction for RequestInterceptor<F>
where
    F: Fn(&mut HttpRequest) -> Result<(), ConnectError> + Send + Sync + 'static,
{
    fn request(&mut self, mut request: HttpRequest) -> Result<HttpRequest, ConnectError> {
        (self.before)(&mut request)?;
        Ok(request)
    }
}

impl<F> StreamFunction for RequestInterceptor<F>
where
    F: Fn(&mut HttpRequest) -> Result<(), ConnectError> + Send + Sync + 'static,
{
    fn request(&mut self, mut request: HttpRequest) -> Result<HttpRequest, ConnectError> {
        (self.before)(&mut request)?;
        Ok(request)
    }
}

impl<F> Interceptor for RequestInterceptor<F>
where
    F: Fn(&mut HttpRequest) -> Result<(), ConnectError> + Send + Sync + 'static,
{
    fn unary(&self) -> Box<dyn UnaryFunction> {
        Box::new(self.clone())
    }

    fn stream(&self) -> Box<dyn StreamFunction> {
        Box::new(self.clone())
    }
}

/// Adds a header to the request's metadata unless already present.
pub(crate) fn insert_default(headers: &mut Metadata, key: &str, value: &str) {
    if !headers.contains(key) {
        headers.insert(key, value);
    }
}
