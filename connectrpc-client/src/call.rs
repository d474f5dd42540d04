//! Per-call lifecycle: timeouts and caller cancellation.
//!
//! A call starts `Pending` and moves exactly once to `TimedOut`,
//! `CanceledByCaller` or `Completed`. Aborting a call surfaces from the
//! transport as `Canceled`; [`CallState::resolve`] turns that into
//! `DeadlineExceeded` when it was the timeout that fired.

use std::future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use connectrpc_core::{Code, ConnectError};
use tokio::sync::Notify;
use tokio::time::Instant;

/// Where a call is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    Pending,
    TimedOut,
    CanceledByCaller,
    Completed,
}

const PENDING: u8 = 0;
const TIMED_OUT: u8 = 1;
const CANCELED_BY_CALLER: u8 = 2;
const COMPLETED: u8 = 3;

/// The lifecycle of a single call.
#[derive(Debug)]
pub struct CallState {
    phase: AtomicU8,
}

impl Default for CallState {
    fn default() -> Self {
        Self::new()
    }
}

impl CallState {
    pub fn new() -> Self {
        Self {
            phase: AtomicU8::new(PENDING),
        }
    }

    pub fn phase(&self) -> CallPhase {
        match self.phase.load(Ordering::Acquire) {
            PENDING => CallPhase::Pending,
            TIMED_OUT => CallPhase::TimedOut,
            CANCELED_BY_CALLER => CallPhase::CanceledByCaller,
            _ => CallPhase::Completed,
        }
    }

    fn transition(&self, to: u8) -> bool {
        self.phase
            .compare_exchange(PENDING, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Record that the timeout fired. Returns `false` if the call already left `Pending`.
    pub fn time_out(&self) -> bool {
        self.transition(TIMED_OUT)
    }

    /// Record caller cancellation. Returns `false` if the call already left `Pending`.
    pub fn cancel(&self) -> bool {
        self.transition(CANCELED_BY_CALLER)
    }

    /// Record normal completion. Returns `false` if the call already left `Pending`.
    pub fn complete(&self) -> bool {
        self.transition(COMPLETED)
    }

    /// Map a `Canceled` failure to `DeadlineExceeded` if the timeout fired.
    pub fn resolve(&self, cause: ConnectError) -> ConnectError {
        if cause.code() == Code::Canceled && self.phase() == CallPhase::TimedOut {
            cause
                .with_code(Code::DeadlineExceeded)
                .with_message("deadline exceeded")
        } else {
            cause
        }
    }
}

#[derive(Debug, Default)]
struct CancelInner {
    canceled: AtomicBool,
    notify: Notify,
}

/// A handle that aborts calls it is attached to.
///
/// Clones share the same signal. Attach with
/// [`CallOptions::cancelable`](crate::CallOptions::cancelable).
#[derive(Debug, Clone, Default)]
pub struct Cancelable {
    inner: Arc<CancelInner>,
}

impl Cancelable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal. Later calls are no-ops.
    pub fn cancel(&self) {
        if !self.inner.canceled.swap(true, Ordering::AcqRel) {
            self.inner.notify.notify_waiters();
        }
    }

    pub fn is_canceled(&self) -> bool {
        self.inner.canceled.load(Ordering::Acquire)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn canceled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_canceled() {
                return;
            }
            notified.await;
        }
    }
}

/// Why a call was aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Abort {
    TimedOut,
    Canceled,
}

/// Resolves when the deadline passes or the caller cancels, whichever is first.
pub(crate) async fn wait_abort(deadline: Option<Instant>, cancel: Option<&Cancelable>) -> Abort {
    let timer = async {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => future::pending().await,
        }
    };
    let canceled = async {
        match cancel {
            Some(cancel) => cancel.canceled().await,
            None => future::pending().await,
        }
    };
    tokio::select! {
        _ = timer => Abort::TimedOut,
        _ = canceled => Abort::Canceled,
    }
}

/// Move `state` out of `Pending` for `abort` and produce the failure the call ends with.
pub(crate) fn abort_error(state: &CallState, abort: Abort) -> ConnectError {
    match abort {
        Abort::TimedOut => state.time_out(),
        Abort::Canceled => state.cancel(),
    };
    state.resolve(ConnectError::canceled("call canceled"))
}
