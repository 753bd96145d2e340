//! Completion callbacks handed to effect executors
//!
//! A [`Callback`] settles at most once. Executors that settle
//! asynchronously must attach a cancellation function with
//! [`Callback::set_cancel`] before returning, so cancellation can be
//! propagated down to whatever the effect started.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::runtime::error::SagaError;
use crate::runtime::task::Outcome;
use crate::runtime::value::Value;

/// What a suspended coroutine is resumed with.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    /// Normal result, fed back through `resume`.
    Value(Value),
    /// Error, injected through `throw_into`.
    Error(SagaError),
    /// The awaited thing was cancelled; the receiver cancels its main flow.
    Cancel,
    /// An upstream source ended without an explicit END trap.
    Terminate,
}

impl Signal {
    #[inline]
    pub fn is_error(&self) -> bool {
        matches!(self, Signal::Error(_))
    }

    /// CANCEL and TERMINATE end an `all`/`race` early.
    #[inline]
    pub fn completes_early(&self) -> bool {
        matches!(self, Signal::Cancel | Signal::Terminate)
    }
}

impl From<Outcome> for Signal {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Done(value) => Signal::Value(value),
            Outcome::Cancelled => Signal::Cancel,
            Outcome::Aborted(error) => Signal::Error(error),
        }
    }
}

type Complete = Box<dyn FnOnce(Signal)>;
type Cancel = Box<dyn FnOnce()>;

struct CallbackInner {
    complete: RefCell<Option<Complete>>,
    cancel: RefCell<Option<Cancel>>,
    cancelled: Cell<bool>,
}

/// One-shot continuation with an attachable cancellation hook.
#[derive(Clone)]
pub struct Callback {
    inner: Rc<CallbackInner>,
}

impl Callback {
    /// Wrap `f`, which will be invoked at most once.
    pub fn new(f: impl FnOnce(Signal) + 'static) -> Self {
        Self {
            inner: Rc::new(CallbackInner {
                complete: RefCell::new(Some(Box::new(f))),
                cancel: RefCell::new(None),
                cancelled: Cell::new(false),
            }),
        }
    }

    /// A callback that ignores its result.
    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    /// Settle with `signal`. Later calls are ignored.
    ///
    /// The cancellation hook is dropped first: cancelling a settled
    /// callback does nothing.
    pub fn complete(
        &self,
        signal: Signal,
    ) {
        let complete = self.inner.complete.borrow_mut().take();
        if let Some(complete) = complete {
            self.inner.cancel.borrow_mut().take();
            complete(signal);
        }
    }

    #[inline]
    pub fn resolve(
        &self,
        value: Value,
    ) {
        self.complete(Signal::Value(value));
    }

    #[inline]
    pub fn reject(
        &self,
        error: SagaError,
    ) {
        self.complete(Signal::Error(error));
    }

    /// Whether the callback has already been settled.
    pub fn is_settled(&self) -> bool {
        self.inner.complete.borrow().is_none()
    }

    /// Attach (or replace) the cancellation hook. Ignored once settled.
    pub fn set_cancel(
        &self,
        f: impl FnOnce() + 'static,
    ) {
        if self.is_settled() {
            return;
        }
        *self.inner.cancel.borrow_mut() = Some(Box::new(f));
    }

    /// Drop the cancellation hook; a later `cancel` becomes a no-op.
    pub fn clear_cancel(&self) {
        self.inner.cancel.borrow_mut().take();
    }

    /// Whether [`Callback::cancel`] ran before the callback settled.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.get()
    }

    /// Neither settled nor cancelled: something may still settle it.
    #[inline]
    pub fn is_live(&self) -> bool {
        !self.is_settled() && !self.is_cancelled()
    }

    /// Run the cancellation hook, if any. Runs at most once.
    pub fn cancel(&self) {
        if !self.is_settled() {
            self.inner.cancelled.set(true);
        }
        let cancel = self.inner.cancel.borrow_mut().take();
        if let Some(cancel) = cancel {
            cancel();
        }
    }

    /// Whether both handles drive the same callback.
    #[inline]
    pub fn same(
        &self,
        other: &Callback,
    ) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Callback {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Callback")
            .field("settled", &self.is_settled())
            .field("cancellable", &self.inner.cancel.borrow().is_some())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
