//! Awaitables
//!
//! Anything a coroutine can wait on that is settled from outside the
//! interpreter. The driver adopts a yielded awaitable directly; if it
//! exposes a canceller, that becomes the cancellation hook of the pending
//! effect.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::runtime::driver::{Callback, Signal};
use crate::runtime::error::SagaError;
use crate::runtime::task::Outcome;
use crate::runtime::value::Value;

/// A value settled later, possibly asynchronously.
pub trait Awaitable {
    /// Deliver the settlement to `cb`, now if already settled.
    fn subscribe(
        &self,
        cb: Callback,
    );

    /// Optional cancellation function, run if the awaiting effect is
    /// cancelled before settlement.
    fn canceller(&self) -> Option<Box<dyn FnOnce()>> {
        None
    }
}

enum State {
    Pending(Vec<Callback>),
    Settled(Signal),
}

struct DeferredInner {
    state: RefCell<State>,
    canceller: RefCell<Option<Rc<dyn Fn()>>>,
}

/// Externally settled awaitable.
#[derive(Clone)]
pub struct Deferred {
    inner: Rc<DeferredInner>,
}

impl Deferred {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(DeferredInner {
                state: RefCell::new(State::Pending(Vec::new())),
                canceller: RefCell::new(None),
            }),
        }
    }

    /// Attach a cancellation function.
    pub fn with_canceller(
        self,
        canceller: impl Fn() + 'static,
    ) -> Self {
        *self.inner.canceller.borrow_mut() = Some(Rc::new(canceller));
        self
    }

    #[inline]
    pub fn resolve(
        &self,
        value: impl Into<Value>,
    ) {
        self.settle_with(Signal::Value(value.into()));
    }

    #[inline]
    pub fn reject(
        &self,
        error: impl Into<SagaError>,
    ) {
        self.settle_with(Signal::Error(error.into()));
    }

    /// Settle with a task outcome; cancellation settles with CANCEL.
    pub fn settle(
        &self,
        outcome: Outcome,
    ) {
        self.settle_with(outcome.into());
    }

    /// Settle once; later settlements are ignored.
    pub fn settle_with(
        &self,
        signal: Signal,
    ) {
        let waiting = {
            let mut state = self.inner.state.borrow_mut();
            match &mut *state {
                State::Settled(_) => return,
                State::Pending(waiting) => {
                    let waiting = std::mem::take(waiting);
                    *state = State::Settled(signal.clone());
                    waiting
                }
            }
        };
        for cb in waiting {
            cb.complete(signal.clone());
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(&*self.inner.state.borrow(), State::Settled(_))
    }

    /// Number of callbacks waiting for the settlement.
    pub fn waiting(&self) -> usize {
        match &*self.inner.state.borrow() {
            State::Pending(waiting) => waiting.len(),
            State::Settled(_) => 0,
        }
    }

    /// The settlement, if any.
    pub fn peek(&self) -> Option<Signal> {
        match &*self.inner.state.borrow() {
            State::Settled(signal) => Some(signal.clone()),
            State::Pending(_) => None,
        }
    }
}

impl Default for Deferred {
    fn default() -> Self {
        Self::new()
    }
}

impl Awaitable for Deferred {
    fn subscribe(
        &self,
        cb: Callback,
    ) {
        let settled = {
            let mut state = self.inner.state.borrow_mut();
            match &mut *state {
                State::Settled(signal) => Some(signal.clone()),
                State::Pending(waiting) => {
                    // Waiters of cancelled effects never settle; drop them.
                    waiting.retain(Callback::is_live);
                    waiting.push(cb.clone());
                    None
                }
            }
        };
        if let Some(signal) = settled {
            cb.complete(signal);
        }
    }

    fn canceller(&self) -> Option<Box<dyn FnOnce()>> {
        let canceller = self.inner.canceller.borrow().clone()?;
        Some(Box::new(move || canceller()))
    }
}

impl fmt::Debug for Deferred {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("settled", &self.is_settled())
            .finish()
    }
}
