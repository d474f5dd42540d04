//! RPC method descriptors.

/// The shape of an RPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamType {
    /// One request, one response.
    Unary,
    /// Many requests, one response.
    ClientStream,
    /// One request, many responses.
    ServerStream,
    /// Many requests, many responses.
    BidiStream,
}

impl StreamType {
    /// Name used in tracing spans.
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamType::Unary => "unary",
            StreamType::ClientStream => "client_stream",
            StreamType::ServerStream => "server_stream",
            StreamType::BidiStream => "bidi_stream",
        }
    }

    /// Whether requests and responses interleave on one HTTP exchange.
    pub fn is_duplex(&self) -> bool {
        matches!(self, StreamType::BidiStream)
    }
}

/// The `idempotency_level` method option.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Idempotency {
    #[default]
    Unknown,
    /// Safe to issue as an HTTP GET.
    NoSideEffects,
    Idempotent,
}

/// Describes a single RPC method.
///
/// `path` is the procedure without a leading slash, e.g.
/// `"connectrpc.eliza.v1.ElizaService/Say"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSpec {
    pub path: String,
    pub stream_type: StreamType,
    pub idempotency: Idempotency,
}

impl MethodSpec {
    /// Create a descriptor for a method.
    pub fn new<S: Into<String>>(path: S, stream_type: StreamType) -> Self {
        let path = path.into();
        let path = match path.strip_prefix('/') {
            Some(stripped) => stripped.to_string(),
            None => path,
        };
        Self {
            path,
            stream_type,
            idempotency: Idempotency::Unknown,
        }
    }

    pub fn unary<S: Into<String>>(path: S) -> Self {
        Self::new(path, StreamType::Unary)
    }

    pub fn client_stream<S: Into<String>>(path: S) -> Self {
        Self::new(path, StreamType::ClientStream)
    }

    pub fn server_stream<S: Into<String>>(path: S) -> Self {
        Self::new(path, StreamType::ServerStream)
    }

    pub fn bidi_stream<S: Into<String>>(path: S) -> Self {
        Self::new(path, StreamType::BidiStream)
    }

    /// Set the idempotency level.
    pub fn with_idempotency(mut self, idempotency: Idempotency) -> Self {
        self.idempotency = idempotency;
        self
    }

    /// Whether the method may be sent as a GET.
    pub fn has_no_side_effects(&self) -> bool {
        self.stream_type == StreamType::Unary && self.idempotency == Idempotency::NoSideEffects
    }
}
