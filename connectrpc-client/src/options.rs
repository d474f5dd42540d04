//! Call options for per-request configuration.

use std::time::Duration;

use connectrpc_core::Metadata;

use crate::call::Cancelable;

/// Options for configuring individual RPC calls.
///
/// # Example
///
/// ```ignore
/// use connectrpc_client::{CallOptions, Cancelable};
/// use std::time::Duration;
///
/// let cancel = Cancelable::new();
/// let options = CallOptions::new()
///     .timeout(Duration::from_secs(5))
///     .try_header("x-request-id", "abc-123")?
///     .cancelable(cancel.clone());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Overrides the client's default timeout.
    pub(crate) timeout: Option<Duration>,
    pub(crate) headers: Metadata,
    pub(crate) cancel: Option<Cancelable>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the timeout for this call.
    ///
    /// The timeout is enforced locally and sent to the server as
    /// `connect-timeout-ms` or `grpc-timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn get_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Try to add a custom header for this call.
    ///
    /// Returns `None` if the header name or value is invalid. Headers
    /// beginning with `connect-` and `grpc-` are reserved for the protocols
    /// and are ignored when the request is built.
    pub fn try_header(mut self, name: &str, value: &str) -> Option<Self> {
        self.headers.append(name, value).then_some(self)
    }

    /// Set all custom headers for this call, replacing any existing headers.
    pub fn headers(mut self, headers: Metadata) -> Self {
        self.headers = headers;
        self
    }

    pub fn get_headers(&self) -> &Metadata {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Metadata {
        &mut self.headers
    }

    /// Abort the call when `cancel` fires.
    pub fn cancelable(mut self, cancel: Cancelable) -> Self {
        self.cancel = Some(cancel);
        self
    }
}
