//! Stream events.

use connectrpc_core::{ConnectError, Metadata};

/// One event on a response stream.
///
/// A well-formed stream is one `Headers`, any number of `Message`s, then
/// exactly one `Complete`.
#[derive(Debug, Clone)]
pub enum StreamResult<T> {
    Headers(Metadata),
    Message(T),
    /// The stream ended. `cause` is `None` on success.
    Complete {
        cause: Option<ConnectError>,
        trailers: Metadata,
    },
}

impl<T> StreamResult<T> {
    /// A successful completion.
    pub fn complete(trailers: Metadata) -> Self {
        StreamResult::Complete { cause: None, trailers }
    }

    /// A failed completion; the error's metadata doubles as the trailers.
    pub fn fail(cause: ConnectError) -> Self {
        let trailers = cause.metadata().clone();
        StreamResult::Complete {
            cause: Some(cause),
            trailers,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, StreamResult::Complete { .. })
    }

    pub fn map<U, F>(self, f: F) -> StreamResult<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            StreamResult::Headers(headers) => StreamResult::Headers(headers),
            StreamResult::Message(message) => StreamResult::Message(f(message)),
            StreamResult::Complete { cause, trailers } => StreamResult::Complete { cause, trailers },
        }
    }
}
