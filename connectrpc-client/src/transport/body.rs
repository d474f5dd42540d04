//! Request bodies for the hyper transport.

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use http_body::{Body, Frame, SizeHint};
use pin_project_lite::pin_project;
use tokio::sync::mpsc;

pin_project! {
    /// The body of an outgoing RPC request.
    ///
    /// Unary calls send a `Full` body (or `Empty` for GET). Streaming calls
    /// send whatever is pushed into the channel behind `Streaming` until its
    /// sender is dropped.
    #[project = TransportBodyProj]
    pub enum TransportBody {
        Empty,
        Full {
            data: Option<Bytes>,
        },
        Streaming {
            #[pin]
            stream: Pin<Box<dyn Stream<Item = Bytes> + Send>>,
        },
    }
}

impl TransportBody {
    pub fn empty() -> Self {
        TransportBody::Empty
    }

    pub fn full(data: Bytes) -> Self {
        if data.is_empty() {
            return TransportBody::Empty;
        }
        TransportBody::Full { data: Some(data) }
    }

    pub fn streaming<S>(stream: S) -> Self
    where
        S: Stream<Item = Bytes> + Send + 'static,
    {
        TransportBody::Streaming {
            stream: Box::pin(stream),
        }
    }

    /// A body yielding every frame sent on `receiver`, ending when all senders are dropped.
    pub fn channel(receiver: mpsc::Receiver<Bytes>) -> Self {
        Self::streaming(futures::stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|frame| (frame, receiver))
        }))
    }
}

impl Body for TransportBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.project() {
            TransportBodyProj::Empty => Poll::Ready(None),
            TransportBodyProj::Full { data } => Poll::Ready(data.take().map(|d| Ok(Frame::data(d)))),
            TransportBodyProj::Streaming { stream } => stream.poll_next(cx).map(|frame| frame.map(|d| Ok(Frame::data(d)))),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            TransportBody::Empty => true,
            TransportBody::Full { data } => data.is_none(),
            TransportBody::Streaming { .. } => false,
        }
    }

    fn size_hint(&self) -> SizeHint {
        match self {
            TransportBody::Empty => SizeHint::with_exact(0),
            TransportBody::Full { data } => SizeHint::with_exact(data.as_ref().map_or(0, |d| d.len() as u64)),
            TransportBody::Streaming { .. } => SizeHint::default(),
        }
    }
}

impl Default for TransportBody {
    fn default() -> Self {
        TransportBody::Empty
    }
}

impl std::fmt::Debug for TransportBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportBody::Empty => write!(f, "TransportBody::Empty"),
            TransportBody::Full { data } => f
                .debug_struct("TransportBody::Full")
                .field("data_len", &data.as_ref().map(|d| d.len()))
                .finish(),
            TransportBody::Streaming { .. } => write!(f, "TransportBody::Streaming"),
        }
    }
}
