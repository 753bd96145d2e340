//! Channels
//!
//! Two flavours:
//!
//! - multicast: every pending taker whose pattern matches receives the
//!   action; nothing is buffered. This is the runtime's default channel.
//! - buffered: point-to-point FIFO; actions wait in a buffer until taken.
//!
//! Closing a channel (or putting END on it) delivers END to every pending
//! taker; later takes receive END immediately.
//!
//! A buffered channel can also be fed from another channel
//! ([`Channel::forward_from`]); that is how `action_channel` queues actions
//! which arrive while the saga is busy elsewhere.

pub mod pattern;

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{trace, warn};

pub use pattern::Pattern;

use crate::runtime::error::{SagaError, SagaResult};
use crate::runtime::value::Action;

type Taker = Box<dyn FnOnce(Action)>;
type Registration = Rc<RefCell<Option<Box<dyn FnOnce()>>>>;

struct TakerSlot {
    pattern: Pattern,
    taker: RefCell<Option<Taker>>,
}

impl TakerSlot {
    fn take(&self) -> Option<Taker> {
        self.taker.borrow_mut().take()
    }
}

enum Mode {
    Multicast,
    Buffered {
        buffer: RefCell<VecDeque<Action>>,
        limit: Option<usize>,
    },
}

struct ChannelInner {
    mode: Mode,
    takers: RefCell<Vec<Rc<TakerSlot>>>,
    closed: Cell<bool>,
    on_close: RefCell<Vec<Box<dyn FnOnce()>>>,
}

/// Shared handle to a channel.
#[derive(Clone)]
pub struct Channel {
    inner: Rc<ChannelInner>,
}

impl Channel {
    fn with_mode(mode: Mode) -> Self {
        Self {
            inner: Rc::new(ChannelInner {
                mode,
                takers: RefCell::new(Vec::new()),
                closed: Cell::new(false),
                on_close: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Unbuffered channel delivering to every matching taker.
    pub fn multicast() -> Self {
        Self::with_mode(Mode::Multicast)
    }

    /// Point-to-point channel with an unbounded buffer.
    pub fn buffered() -> Self {
        Self::with_mode(Mode::Buffered {
            buffer: RefCell::new(VecDeque::new()),
            limit: None,
        })
    }

    /// Point-to-point channel whose buffer rejects puts beyond `limit`.
    pub fn fixed(limit: usize) -> Self {
        Self::with_mode(Mode::Buffered {
            buffer: RefCell::new(VecDeque::with_capacity(limit)),
            limit: Some(limit),
        })
    }

    /// Deliver `action`. Putting END closes the channel; puts on a closed
    /// channel are ignored.
    pub fn put(
        &self,
        action: Action,
    ) -> SagaResult<()> {
        if self.inner.closed.get() {
            return Ok(());
        }
        if action.is_end() {
            self.close();
            return Ok(());
        }

        match &self.inner.mode {
            Mode::Multicast => {
                // Takers registered while delivering wait for the next put.
                let takers = self.inner.takers.borrow().clone();
                for slot in takers {
                    if !slot.pattern.matches(&action) {
                        continue;
                    }
                    if let Some(taker) = slot.take() {
                        self.remove(&slot);
                        taker(action.clone());
                    }
                }
                Ok(())
            }
            Mode::Buffered { buffer, limit } => {
                loop {
                    let next = {
                        let mut takers = self.inner.takers.borrow_mut();
                        if takers.is_empty() {
                            None
                        } else {
                            Some(takers.remove(0))
                        }
                    };
                    match next {
                        Some(slot) => {
                            if let Some(taker) = slot.take() {
                                taker(action);
                                return Ok(());
                            }
                        }
                        None => break,
                    }
                }

                let mut buffer = buffer.borrow_mut();
                if let Some(limit) = limit {
                    if buffer.len() >= *limit {
                        return Err(SagaError::BufferOverflow(*limit));
                    }
                }
                trace!(%action, "channel: buffered");
                buffer.push_back(action);
                Ok(())
            }
        }
    }

    /// Register `taker` for the next action matching `pattern`.
    ///
    /// Returns a function removing the registration; it does nothing once
    /// the taker has run. Buffered channels ignore `pattern`.
    pub fn take(
        &self,
        pattern: Pattern,
        taker: impl FnOnce(Action) + 'static,
    ) -> Box<dyn FnOnce()> {
        if let Mode::Buffered { buffer, .. } = &self.inner.mode {
            let buffered = buffer.borrow_mut().pop_front();
            if let Some(action) = buffered {
                taker(action);
                return Box::new(|| {});
            }
        }
        if self.inner.closed.get() {
            taker(Action::end());
            return Box::new(|| {});
        }

        let slot = Rc::new(TakerSlot {
            pattern,
            taker: RefCell::new(Some(Box::new(taker))),
        });
        self.inner.takers.borrow_mut().push(slot.clone());

        let channel: Weak<ChannelInner> = Rc::downgrade(&self.inner);
        Box::new(move || {
            if slot.take().is_some() {
                if let Some(inner) = channel.upgrade() {
                    Channel { inner }.remove(&slot);
                }
            }
        })
    }

    fn remove(
        &self,
        slot: &Rc<TakerSlot>,
    ) {
        self.inner
            .takers
            .borrow_mut()
            .retain(|other| !Rc::ptr_eq(other, slot));
    }

    /// Close the channel, delivering END to every pending taker.
    pub fn close(&self) {
        if self.inner.closed.replace(true) {
            return;
        }
        let hooks = std::mem::take(&mut *self.inner.on_close.borrow_mut());
        for hook in hooks {
            hook();
        }
        let takers = std::mem::take(&mut *self.inner.takers.borrow_mut());
        for slot in takers {
            if let Some(taker) = slot.take() {
                taker(Action::end());
            }
        }
    }

    /// Remove and return every buffered action. Multicast channels hold
    /// nothing, so they always flush empty.
    pub fn flush(&self) -> Vec<Action> {
        match &self.inner.mode {
            Mode::Multicast => Vec::new(),
            Mode::Buffered { buffer, .. } => buffer.borrow_mut().drain(..).collect(),
        }
    }

    /// Copy every action on `source` matching `pattern` into this channel.
    ///
    /// Forwarding stops when either side closes: END on `source` closes
    /// this channel, and closing this channel withdraws the pending taker
    /// from `source`. Actions this channel cannot hold are dropped.
    pub fn forward_from(
        &self,
        source: &Channel,
        pattern: Pattern,
    ) {
        let registration: Registration = Rc::new(RefCell::new(None));
        Self::forward_next(
            source.clone(),
            pattern,
            Rc::downgrade(&self.inner),
            registration.clone(),
        );
        self.inner.on_close.borrow_mut().push(Box::new(move || {
            let cancel = registration.borrow_mut().take();
            if let Some(cancel) = cancel {
                cancel();
            }
        }));
    }

    fn forward_next(
        source: Channel,
        pattern: Pattern,
        target: Weak<ChannelInner>,
        registration: Registration,
    ) {
        let fired = Rc::new(Cell::new(false));
        let taker = {
            let source = source.clone();
            let pattern = pattern.clone();
            let registration = registration.clone();
            let fired = fired.clone();
            move |action: Action| {
                fired.set(true);
                let Some(inner) = target.upgrade() else {
                    return;
                };
                if inner.closed.get() {
                    return;
                }
                if !action.is_end() {
                    Self::forward_next(source, pattern, Rc::downgrade(&inner), registration);
                }
                if let Err(error) = (Channel { inner }).put(action) {
                    warn!(%error, "channel: forwarded action dropped");
                }
            }
        };
        let cancel = source.take(pattern, taker);
        // A taker that already ran has re-registered on its own.
        if !fired.get() {
            *registration.borrow_mut() = Some(cancel);
        }
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.get()
    }

    /// Number of pending takers.
    pub fn taker_count(&self) -> usize {
        self.inner.takers.borrow().len()
    }

    /// Number of buffered actions; always zero for multicast channels.
    pub fn buffered_len(&self) -> usize {
        match &self.inner.mode {
            Mode::Multicast => 0,
            Mode::Buffered { buffer, .. } => buffer.borrow().len(),
        }
    }

    #[inline]
    pub fn same(
        &self,
        other: &Channel,
    ) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for Channel {
    fn default() -> Self {
        Self::multicast()
    }
}

impl fmt::Debug for Channel {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let mode = match self.inner.mode {
            Mode::Multicast => "multicast",
            Mode::Buffered { .. } => "buffered",
        };
        f.debug_struct("Channel")
            .field("mode", &mode)
            .field("takers", &self.taker_count())
            .field("buffered", &self.buffered_len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests;
