//! Stream handles.
//!
//! Every streaming call is driven by the same core: request messages are
//! encoded, framed by the interceptor chain and pushed to the transport;
//! response events come back through the chain in arrival order. The core
//! guarantees callers see `Headers` before any `Message` and exactly one
//! `Complete`.
//!
//! # Cancellation
//!
//! Calling `cancel` or firing the call's [`Cancelable`] completes the stream
//! with `Canceled`. When the call's timeout fires first it completes with
//! `DeadlineExceeded` instead. Dropping a handle aborts the exchange.

use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::Arc;

use bytes::Bytes;
use connectrpc_core::{ConnectError, Metadata};
use futures::Stream;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::call::{Abort, CallState, Cancelable, abort_error, wait_abort};
use crate::codec::{Encoding, Message};
use crate::interceptor::StreamFunction;
use crate::response::ResponseMessage;
use crate::stream_result::StreamResult;
use crate::transport::HttpStream;

/// State shared by every stream handle.
pub(crate) struct StreamCore {
    function: Box<dyn StreamFunction>,
    sender: Option<mpsc::Sender<Bytes>>,
    receiver: mpsc::Receiver<StreamResult<Bytes>>,
    state: Arc<CallState>,
    deadline: Option<Instant>,
    cancel: Option<Cancelable>,
    encoding: Encoding,
    headers: Option<Metadata>,
    pending: VecDeque<StreamResult<Bytes>>,
    completed: bool,
}

impl StreamCore {
    pub(crate) fn new(
        function: Box<dyn StreamFunction>,
        stream: HttpStream,
        encoding: Encoding,
        deadline: Option<Instant>,
        cancel: Option<Cancelable>,
    ) -> Self {
        Self {
            function,
            sender: Some(stream.sender),
            receiver: stream.receiver,
            state: Arc::new(CallState::new()),
            deadline,
            cancel,
            encoding,
            headers: None,
            pending: VecDeque::new(),
            completed: false,
        }
    }

    /// A stream that failed before it was opened.
    pub(crate) fn failed(cause: ConnectError, encoding: Encoding) -> Self {
        let (_, receiver) = mpsc::channel(1);
        let mut core = Self {
            function: Box::new(()),
            sender: None,
            receiver,
            state: Arc::new(CallState::new()),
            deadline: None,
            cancel: None,
            encoding,
            headers: None,
            pending: VecDeque::new(),
            completed: false,
        };
        core.state.complete();
        core.pending.push_back(StreamResult::fail(cause));
        core
    }

    /// Headers of the response, once received.
    fn headers(&self) -> Option<&Metadata> {
        self.headers.as_ref()
    }

    async fn send<T: Message>(&mut self, message: &T) -> Result<(), ConnectError> {
        let Some(sender) = self.sender.clone() else {
            return Err(ConnectError::failed_precondition("stream is closed for sending"));
        };
        let body = self.encoding.encode(message)?;
        let frame = self.function.request_body(body)?;

        let sent = tokio::select! {
            sent = sender.send(frame) => sent,
            abort = wait_abort(self.deadline, self.cancel.as_ref()) => {
                let cause = self.abort(abort);
                self.pending.push_back(StreamResult::fail(cause.clone()));
                return Err(cause);
            }
        };
        // The transport only drops its end once the response is over; the
        // real outcome is reported by `receive`.
        sent.map_err(|_| ConnectError::unavailable("stream closed by peer"))
    }

    fn close_send(&mut self) {
        self.sender = None;
    }

    /// Abort the exchange. Events not yet delivered are discarded.
    fn abort(&mut self, abort: Abort) -> ConnectError {
        let cause = abort_error(&self.state, abort);
        self.sender = None;
        self.receiver.close();
        self.pending.clear();
        cause
    }

    fn cancel(&mut self) {
        if !self.completed {
            let cause = self.abort(Abort::Canceled);
            self.pending.push_back(StreamResult::fail(cause));
        }
    }

    /// The next raw event, after the interceptor chain.
    async fn next_event(&mut self) -> StreamResult<Bytes> {
        if let Some(event) = self.pending.pop_front() {
            return event;
        }
        let event = tokio::select! {
            event = self.receiver.recv() => event,
            abort = wait_abort(self.deadline, self.cancel.as_ref()) => {
                return StreamResult::fail(self.abort(abort));
            }
        };
        let event = event.unwrap_or_else(|| StreamResult::fail(ConnectError::unavailable("stream ended without a status")));
        self.function.stream_result(event)
    }

    /// The next event, decoded.
    async fn receive<T: Message>(&mut self) -> Option<StreamResult<T>> {
        loop {
            if self.completed {
                return None;
            }
            match self.next_event().await {
                // Only the first headers event is reported.
                StreamResult::Headers(_) if self.headers.is_some() => continue,
                StreamResult::Headers(headers) => {
                    self.headers = Some(headers.clone());
                    return Some(StreamResult::Headers(headers));
                }
                StreamResult::Message(payload) if self.headers.is_none() => {
                    self.pending.push_front(StreamResult::Message(payload));
                    let headers = Metadata::empty();
                    self.headers = Some(headers.clone());
                    return Some(StreamResult::Headers(headers));
                }
                StreamResult::Message(payload) => {
                    return match self.encoding.decode(&payload) {
                        Ok(message) => Some(StreamResult::Message(message)),
                        Err(cause) => {
                            #[cfg(feature = "tracing")]
                            tracing::debug!(error = %cause, "failed to decode stream message");
                            self.finish(Some(cause), Metadata::empty())
                        }
                    };
                }
                StreamResult::Complete { cause, trailers } => return self.finish(cause, trailers),
            }
        }
    }

    fn finish<T>(&mut self, cause: Option<ConnectError>, trailers: Metadata) -> Option<StreamResult<T>> {
        self.completed = true;
        self.sender = None;
        self.pending.clear();
        self.receiver.close();
        self.state.complete();
        Some(StreamResult::Complete {
            cause: cause.map(|cause| self.state.resolve(cause)),
            trailers,
        })
    }
}

/// A bidirectional stream.
///
/// ```ignore
/// let mut stream = client.bidi_stream::<Ping, Pong>(&method, CallOptions::new());
/// stream.send(&ping).await?;
/// stream.close_send();
/// while let Some(event) = stream.receive().await {
///     match event {
///         StreamResult::Headers(headers) => println!("headers: {headers:?}"),
///         StreamResult::Message(pong) => println!("got {pong:?}"),
///         StreamResult::Complete { cause, .. } => println!("done: {cause:?}"),
///     }
/// }
/// ```
pub struct BidiStream<Req, Res> {
    core: StreamCore,
    _types: PhantomData<fn(Req) -> Res>,
}

impl<Req: Message, Res: Message> BidiStream<Req, Res> {
    pub(crate) fn new(core: StreamCore) -> Self {
        Self {
            core,
            _types: PhantomData,
        }
    }

    /// Send one message.
    ///
    /// An error means the message was not sent; after `Unavailable`, call
    /// [`receive`](Self::receive) for the stream's outcome.
    pub async fn send(&mut self, message: &Req) -> Result<(), ConnectError> {
        self.core.send(message).await
    }

    /// Finish the request side. Receiving continues.
    pub fn close_send(&mut self) {
        self.core.close_send();
    }

    /// The next event, or `None` after `Complete` was returned.
    pub async fn receive(&mut self) -> Option<StreamResult<Res>> {
        self.core.receive().await
    }

    pub fn response_headers(&self) -> Option<&Metadata> {
        self.core.headers()
    }

    pub fn cancel(&mut self) {
        self.core.cancel();
    }

    pub(crate) fn into_core(self) -> StreamCore {
        self.core
    }
}

/// A server-streaming call: one request, many responses.
pub struct ServerStream<Res> {
    core: StreamCore,
    _types: PhantomData<fn() -> Res>,
}

impl<Res: Message> ServerStream<Res> {
    pub(crate) fn new(core: StreamCore) -> Self {
        Self {
            core,
            _types: PhantomData,
        }
    }

    /// The next event, or `None` after `Complete` was returned.
    pub async fn receive(&mut self) -> Option<StreamResult<Res>> {
        self.core.receive().await
    }

    pub fn response_headers(&self) -> Option<&Metadata> {
        self.core.headers()
    }

    pub fn cancel(&mut self) {
        self.core.cancel();
    }

    /// All remaining events as a [`Stream`].
    pub fn into_stream(self) -> impl Stream<Item = StreamResult<Res>> + Send {
        futures::stream::unfold(self, |mut stream| async move {
            stream.receive().await.map(|event| (event, stream))
        })
    }
}

/// A client-streaming call: many requests, one response.
pub struct ClientStream<Req, Res> {
    core: StreamCore,
    _types: PhantomData<fn(Req) -> Res>,
}

impl<Req: Message, Res: Message> ClientStream<Req, Res> {
    pub(crate) fn new(core: StreamCore) -> Self {
        Self {
            core,
            _types: PhantomData,
        }
    }

    pub async fn send(&mut self, message: &Req) -> Result<(), ConnectError> {
        self.core.send(message).await
    }

    pub fn cancel(&mut self) {
        self.core.cancel();
    }

    /// Finish sending and wait for the single response.
    ///
    /// Zero or several response messages are an `Unimplemented` failure.
    pub async fn close_and_receive(mut self) -> ResponseMessage<Res> {
        self.core.close_send();
        let mut headers = Metadata::empty();
        let mut message = None;
        let mut extra = false;
        while let Some(event) = self.core.receive::<Res>().await {
            match event {
                StreamResult::Headers(received) => headers = received,
                StreamResult::Message(received) => {
                    extra |= message.is_some();
                    message.get_or_insert(received);
                }
                StreamResult::Complete { cause, trailers } => {
                    let result = match (cause, message) {
                        (Some(cause), _) => Err(cause),
                        (None, None) => Err(ConnectError::unimplemented("unary stream has no messages")),
                        (None, Some(_)) if extra => Err(ConnectError::unimplemented("unary stream has multiple messages")),
                        (None, Some(message)) => Ok(message),
                    };
                    return match result {
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
                    };
                }
            }
        }
        ResponseMessage::Failure {
            cause: ConnectError::unknown("stream ended without a status"),
            headers,
            trailers: Metadata::empty(),
        }
    }
}
