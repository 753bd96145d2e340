//! Cooperative job scheduler
//!
//! Serializes driver continuations on a single thread. A job that is
//! scheduled while another job is executing is not run in place: it is
//! queued and drained in FIFO order once the scheduler is released. This
//! keeps synchronously-resolving effect chains from recursing and gives a
//! single happens-before order for everything that settles "at once".

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use tracing::trace;

/// A deferred zero-argument job.
pub type Job = Box<dyn FnOnce()>;

struct SchedulerInner {
    /// Jobs waiting for the scheduler to be released.
    queue: RefCell<VecDeque<Job>>,
    /// Counting semaphore, zero means released.
    busy: Cell<usize>,
}

/// Shared handle to one scheduler queue.
///
/// Cloning is cheap; every clone drives the same queue.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<SchedulerInner>,
}

/// Holds the scheduler suspended until dropped.
struct Suspended<'a> {
    scheduler: &'a Scheduler,
}

impl Drop for Suspended<'_> {
    fn drop(&mut self) {
        let busy = &self.scheduler.inner.busy;
        busy.set(busy.get().saturating_sub(1));
    }
}

impl Scheduler {
    /// Create an idle scheduler with an empty queue.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(SchedulerInner {
                queue: RefCell::new(VecDeque::new()),
                busy: Cell::new(0),
            }),
        }
    }

    fn suspend(&self) -> Suspended<'_> {
        self.inner.busy.set(self.inner.busy.get() + 1);
        Suspended { scheduler: self }
    }

    /// Run `job` as one atomic unit.
    ///
    /// Jobs scheduled while it runs are queued. The busy counter is released
    /// even if `job` panics.
    pub fn run_exclusive(
        &self,
        job: impl FnOnce(),
    ) {
        let _suspended = self.suspend();
        job();
    }

    /// Queue `job`; when the scheduler is idle run it now and drain the queue.
    pub fn schedule_asap(
        &self,
        job: impl FnOnce() + 'static,
    ) {
        self.inner.queue.borrow_mut().push_back(Box::new(job));
        if self.is_idle() {
            self.drain();
        }
    }

    /// Run `job` synchronously and return its result, then drain the queue.
    ///
    /// Jobs scheduled by `job` are deferred until it has returned.
    pub fn run_immediately<R>(
        &self,
        job: impl FnOnce() -> R,
    ) -> R {
        let result = {
            let _suspended = self.suspend();
            job()
        };
        self.drain();
        result
    }

    /// Drain queued jobs while the scheduler stays released.
    fn drain(&self) {
        while self.is_idle() {
            // The borrow must end before the job runs: jobs schedule more jobs.
            let next = self.inner.queue.borrow_mut().pop_front();
            match next {
                Some(job) => {
                    trace!(pending = self.pending(), "scheduler: running queued job");
                    self.run_exclusive(job);
                }
                None => break,
            }
        }
    }

    /// Whether no job is currently executing.
    #[inline]
    pub fn is_idle(&self) -> bool {
        self.inner.busy.get() == 0
    }

    /// Number of queued jobs.
    #[inline]
    pub fn pending(&self) -> usize {
        self.inner.queue.borrow().len()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("busy", &self.inner.busy.get())
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests;
