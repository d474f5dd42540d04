//! Inbound HTTP responses and unary call results.

use bytes::Bytes;
use connectrpc_core::{ConnectError, Metadata};
use http::StatusCode;

/// An inbound HTTP response.
///
/// `status` is `None` when no response arrived; `cause` then holds the
/// transport failure.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: Option<StatusCode>,
    pub headers: Metadata,
    pub body: Bytes,
    pub trailers: Metadata,
    pub cause: Option<ConnectError>,
}

impl HttpResponse {
    pub fn new(status: StatusCode, headers: Metadata, body: Bytes, trailers: Metadata) -> Self {
        Self {
            status: Some(status),
            headers,
            body,
            trailers,
            cause: None,
        }
    }

    /// A response that never arrived.
    pub fn failed(cause: ConnectError) -> Self {
        Self {
            cause: Some(cause),
            ..Self::default()
        }
    }

    /// Replace the body with a failure, keeping headers and trailers.
    pub fn into_failure(self, cause: ConnectError) -> Self {
        Self {
            body: Bytes::new(),
            cause: Some(cause),
            ..self
        }
    }
}

/// The outcome of a unary call.
///
/// Headers and any trailers received are kept on both variants.
#[derive(Debug, Clone)]
pub enum ResponseMessage<T> {
    Success {
        message: T,
        headers: Metadata,
        trailers: Metadata,
    },
    Failure {
        cause: ConnectError,
        headers: Metadata,
        trailers: Metadata,
    },
}

impl<T> ResponseMessage<T> {
    pub fn headers(&self) -> &Metadata {
        match self {
            ResponseMessage::Success { headers, .. } | ResponseMessage::Failure { headers, .. } => headers,
        }
    }

    pub fn trailers(&self) -> &Metadata {
        match self {
            ResponseMessage::Success { trailers, .. } | ResponseMessage::Failure { trailers, .. } => trailers,
        }
    }

    pub fn message(&self) -> Option<&T> {
        match self {
            ResponseMessage::Success { message, .. } => Some(message),
            ResponseMessage::Failure { .. } => None,
        }
    }

    pub fn cause(&self) -> Option<&ConnectError> {
        match self {
            ResponseMessage::Success { .. } => None,
            ResponseMessage::Failure { cause, .. } => Some(cause),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ResponseMessage::Success { .. })
    }

    /// Drop headers and trailers.
    pub fn into_result(self) -> Result<T, ConnectError> {
        match self {
            ResponseMessage::Success { message, .. } => Ok(message),
            ResponseMessage::Failure { cause, .. } => Err(cause),
        }
    }

    /// Convert the message; a conversion error turns the result into a failure.
    pub fn and_then<U, F>(self, f: F) -> ResponseMessage<U>
    where
        F: FnOnce(T) -> Result<U, ConnectError>,
    {
        match self {
            ResponseMessage::Success {
                message,
                headers,
                trailers,
            } => match f(message) {
                Ok(message) => ResponseMessage::Success {
                    message,
                    headers,
                    trailers,
                },
                Err(cause) => ResponseMessage::Failure {
                    cause,
                    headers,
                    trailers,
                },
            },
            ResponseMessage::Failure {
                cause,
                headers,
                trailers,
            } => ResponseMessage::Failure {
                cause,
                headers,
                trailers,
            },
        }
    }
}

impl From<HttpResponse> for ResponseMessage<Bytes> {
    fn from(response: HttpResponse) -> Self {
        match response.cause {
            Some(cause) => ResponseMessage::Failure {
                cause,
                headers: response.headers,
                trailers: response.trailers,
            },
            None => ResponseMessage::Success {
                message: response.body,
                headers: response.headers,
                trailers: response.trailers,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use connectrpc_core::Code;

    #[test]
    fn test_into_failure_keeps_metadata() {
        let headers: Metadata = [("x-id", "1")].into_iter().collect();
        let response = HttpResponse::new(StatusCode::OK, headers, Bytes::from_static(b"body"), Metadata::empty())
            .into_failure(ConnectError::internal("bad"));
        assert!(response.body.is_empty());
        assert_eq!(response.headers.get("x-id"), Some("1"));
        assert_eq!(response.cause.as_ref().map(|c| c.code()), Some(Code::Internal));

        let message = ResponseMessage::from(response);
        assert!(!message.is_success());
        assert_eq!(message.headers().get("x-id"), Some("1"));
    }

    #[test]
    fn test_response_message_from_success() {
        let trailers: Metadata = [("x-t", "2")].into_iter().collect();
        let response = HttpResponse::new(StatusCode::OK, Metadata::empty(), Bytes::from_static(b"ok"), trailers);
        let message = ResponseMessage::from(response);
        assert_eq!(message.message().map(|b| &b[..]), Some(&b"ok"[..]));
        assert_eq!(message.trailers().get("x-t"), Some("2"));
        assert!(message.cause().is_none());
    }

    #[test]
    fn test_and_then_failure_keeps_metadata() {
        let headers: Metadata = [("x-id", "1")].into_iter().collect();
        let message = ResponseMessage::Success {
            message: Bytes::from_static(b"garbage"),
            headers,
            trailers: Metadata::empty(),
        };
        let decoded: ResponseMessage<u32> = message.and_then(|_| Err(ConnectError::unknown("decode")));
        assert_eq!(decoded.cause().map(|c| c.code()), Some(Code::Unknown));
        assert_eq!(decoded.headers().get("x-id"), Some("1"));
        assert!(decoded.into_result().is_err());
    }
}
