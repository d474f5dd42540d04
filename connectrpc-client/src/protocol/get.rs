//! Connect GET requests for side-effect-free unary methods.
//!
//! The message travels in the query string instead of the body, which lets
//! intermediaries cache responses:
//!
//! ```text
//! GET /pkg.Service/Method?base64=1&compression=gzip&connect=v1&encoding=proto&message=<base64url>
//! ```

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use bytes::Bytes;
use connectrpc_core::server::CONNECT_PROTOCOL_VERSION;
use connectrpc_core::{CONTENT_ENCODING, Metadata};
use http::Method;

use crate::codec::Encoding;
use crate::method::MethodSpec;
use crate::request::HttpRequest;

/// When unary calls may be sent as GET.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GetConfiguration {
    /// Always POST.
    #[default]
    Disabled,
    /// GET for every method marked `NO_SIDE_EFFECTS`.
    Enabled,
    /// GET for methods marked `NO_SIDE_EFFECTS` whose (possibly compressed)
    /// message fits in `max_message_bytes`; larger messages fall back to POST.
    EnabledWithFallback { max_message_bytes: usize },
}

impl GetConfiguration {
    /// Whether a message of `len` bytes may be sent as GET.
    pub fn allows(&self, len: usize) -> bool {
        match self {
            GetConfiguration::Disabled => false,
            GetConfiguration::Enabled => true,
            GetConfiguration::EnabledWithFallback { max_message_bytes } => len <= *max_message_bytes,
        }
    }
}

pub(crate) fn should_use_get(config: &GetConfiguration, method: &MethodSpec, body: &[u8]) -> bool {
    method.has_no_side_effects() && config.allows(body.len())
}

/// Rewrite a prepared unary POST as a GET carrying `body` in the query.
///
/// `compression` names the pool `body` was compressed with, if any.
pub(crate) fn into_get_request(
    mut request: HttpRequest,
    body: Bytes,
    compression: Option<&str>,
    encoding: Encoding,
) -> HttpRequest {
    let message = URL_SAFE_NO_PAD.encode(&body);
    let mut params: Vec<(&str, &str)> = vec![
        ("message", message.as_str()),
        ("base64", "1"),
        ("encoding", encoding.name()),
        ("connect", "v1"),
    ];
    if let Some(compression) = compression {
        params.push(("compression", compression));
    }
    params.sort_by(|a, b| a.0.cmp(b.0));

    let query = params
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");

    request.url = format!("{}?{}", request.url, query);
    request.method = Method::GET;
    request.body = Bytes::new();
    request.content_type = format!("application/{}", encoding.name());
    strip_body_headers(&mut request.headers);
    request
}

/// The query carries the protocol version and compression instead.
fn strip_body_headers(headers: &mut Metadata) {
    headers.remove(CONNECT_PROTOCOL_VERSION);
    headers.remove(CONTENT_ENCODING);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::Idempotency;

    fn get_method() -> MethodSpec {
        MethodSpec::unary("pkg.Service/Get").with_idempotency(Idempotency::NoSideEffects)
    }

    #[test]
    fn test_get_configuration() {
        assert!(!GetConfiguration::Disabled.allows(0));
        assert!(GetConfiguration::Enabled.allows(1 << 20));

        let fallback = GetConfiguration::EnabledWithFallback { max_message_bytes: 4 };
        assert!(fallback.allows(4));
        assert!(!fallback.allows(5));
    }

    #[test]
    fn test_should_use_get_requires_no_side_effects() {
        let config = GetConfiguration::Enabled;
        assert!(should_use_get(&config, &get_method(), b"abc"));
        assert!(!should_use_get(&config, &MethodSpec::unary("pkg.Service/Put"), b"abc"));
        assert!(!should_use_get(&GetConfiguration::Disabled, &get_method(), b"abc"));
    }

    #[test]
    fn test_into_get_request_query() {
        let mut request = HttpRequest::new("https://example.com", get_method());
        request.headers.insert(CONNECT_PROTOCOL_VERSION, "1");
        request.headers.insert("x-keep", "yes");

        let request = into_get_request(request, Bytes::from_static(&[0xfb, 0xff]), None, Encoding::Proto);

        assert_eq!(request.method, Method::GET);
        assert_eq!(
            request.url,
            "https://example.com/pkg.Service/Get?base64=1&connect=v1&encoding=proto&message=-_8"
        );
        assert!(request.body.is_empty());
        assert_eq!(request.content_type, "application/proto");
        assert!(!request.headers.contains(CONNECT_PROTOCOL_VERSION));
        assert_eq!(request.headers.get("x-keep"), Some("yes"));
    }

    #[test]
    fn test_into_get_request_with_compression() {
        let request = HttpRequest::new("https://example.com", get_method());
        let request = into_get_request(request, Bytes::from_static(b"{}"), Some("gzip"), Encoding::Json);
        assert_eq!(
            request.url,
            "https://example.com/pkg.Service/Get?base64=1&compression=gzip&connect=v1&encoding=json&message=e30"
        );
        assert_eq!(request.content_type, "application/json");
    }
}
