//! The outbound HTTP request handed to interceptors and transports.

use std::time::Duration;

use bytes::Bytes;
use connectrpc_core::Metadata;
use http::Method;

use crate::method::MethodSpec;

/// An outbound HTTP request, before or after interceptors have run.
///
/// For streams `body` is unused; messages are sent through the stream's
/// request channel instead.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    pub method: Method,
    pub headers: Metadata,
    pub content_type: String,
    pub body: Bytes,
    pub timeout: Option<Duration>,
    pub method_spec: MethodSpec,
}

impl HttpRequest {
    /// A POST to `<base_url>/<method path>` with no body.
    pub fn new(base_url: &str, method_spec: MethodSpec) -> Self {
        let url = format!("{}/{}", base_url.trim_end_matches('/'), method_spec.path);
        Self {
            url,
            method: Method::POST,
            headers: Metadata::empty(),
            content_type: String::new(),
            body: Bytes::new(),
            timeout: None,
            method_spec,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_url() {
        let request = HttpRequest::new("https://example.com/", MethodSpec::unary("/pkg.Svc/Do"));
        assert_eq!(request.url, "https://example.com/pkg.Svc/Do");
        assert_eq!(request.method, Method::POST);
        assert!(request.body.is_empty());
    }
}
