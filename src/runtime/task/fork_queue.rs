//! Fork queue
//!
//! Tracks the live subtasks of one task: its main flow plus every attached
//! fork. The owning task completes once the set drains, with the value
//! returned by the main flow; it aborts as soon as any subtask fails,
//! cancelling everything still live.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::debug;

use super::{MainFlow, Outcome, Task};
use crate::runtime::error::SagaError;
use crate::runtime::value::Value;

/// A member of a fork queue.
#[derive(Clone)]
pub enum Subtask {
    /// The coroutine driven by the owning task.
    Main(Rc<MainFlow>),
    /// An attached fork.
    Child(Task),
}

impl Subtask {
    pub fn name(&self) -> String {
        match self {
            Subtask::Main(main) => main.meta().name.clone(),
            Subtask::Child(task) => task.meta().name.clone(),
        }
    }

    #[inline]
    pub fn is_main(&self) -> bool {
        matches!(self, Subtask::Main(_))
    }

    fn cancel(&self) {
        match self {
            Subtask::Main(main) => main.cancel(),
            Subtask::Child(task) => task.cancel(),
        }
    }

    fn set_cont(
        &self,
        cont: Box<dyn FnOnce(Outcome)>,
    ) {
        match self {
            Subtask::Main(main) => main.set_cont(cont),
            Subtask::Child(task) => task.set_cont(cont),
        }
    }

    fn clear_cont(&self) {
        match self {
            Subtask::Main(main) => main.clear_cont(),
            Subtask::Child(task) => task.clear_cont(),
        }
    }
}

struct ForkQueueInner {
    /// Live subtasks, each tagged with a slot number.
    tasks: RefCell<Vec<(usize, Subtask)>>,
    next_slot: Cell<usize>,
    /// Value captured from the main flow.
    result: RefCell<Outcome>,
    completed: Cell<bool>,
    on_abort: Box<dyn Fn(&[String])>,
    on_end: Box<dyn Fn(Outcome)>,
}

/// Live-subtask aggregator of one task.
#[derive(Clone)]
pub struct ForkQueue {
    inner: Rc<ForkQueueInner>,
}

impl ForkQueue {
    /// Create an empty queue.
    ///
    /// `on_abort` receives the names of the subtasks about to be cancelled
    /// because of an error; `on_end` receives the owner's outcome.
    pub fn new(
        on_abort: impl Fn(&[String]) + 'static,
        on_end: impl Fn(Outcome) + 'static,
    ) -> Self {
        Self {
            inner: Rc::new(ForkQueueInner {
                tasks: RefCell::new(Vec::new()),
                next_slot: Cell::new(0),
                result: RefCell::new(Outcome::Done(Value::Unit)),
                completed: Cell::new(false),
                on_abort: Box::new(on_abort),
                on_end: Box::new(on_end),
            }),
        }
    }

    /// Register `subtask` and hook its completion.
    pub fn add_task(
        &self,
        subtask: Subtask,
    ) {
        let slot = self.inner.next_slot.get();
        self.inner.next_slot.set(slot + 1);
        self.inner.tasks.borrow_mut().push((slot, subtask.clone()));

        let queue: Weak<ForkQueueInner> = Rc::downgrade(&self.inner);
        let is_main = subtask.is_main();
        subtask.set_cont(Box::new(move |outcome| {
            if let Some(inner) = queue.upgrade() {
                ForkQueue { inner }.subtask_completed(slot, is_main, outcome);
            }
        }));
    }

    fn subtask_completed(
        &self,
        slot: usize,
        is_main: bool,
        outcome: Outcome,
    ) {
        if self.inner.completed.get() {
            return;
        }

        self.inner.tasks.borrow_mut().retain(|(s, _)| *s != slot);

        match outcome {
            Outcome::Aborted(error) => self.abort(error),
            outcome => {
                if is_main {
                    *self.inner.result.borrow_mut() = outcome;
                }
                if self.inner.tasks.borrow().is_empty() {
                    self.inner.completed.set(true);
                    let result = self.inner.result.borrow().clone();
                    (self.inner.on_end)(result);
                }
            }
        }
    }

    /// Cancel every live subtask. Idempotent.
    pub fn cancel_all(&self) {
        if self.inner.completed.replace(true) {
            return;
        }

        let tasks = std::mem::take(&mut *self.inner.tasks.borrow_mut());
        for (_, subtask) in tasks {
            subtask.clear_cont();
            subtask.cancel();
        }
    }

    /// Abort the owner with `error`, cancelling the remaining subtasks.
    pub fn abort(
        &self,
        error: SagaError,
    ) {
        let names = self.task_names();
        debug!(cancelled = ?names, %error, "fork queue aborted");
        (self.inner.on_abort)(&names);
        self.cancel_all();
        (self.inner.on_end)(Outcome::Aborted(error));
    }

    /// Names of the live subtasks, in registration order.
    pub fn task_names(&self) -> Vec<String> {
        self.inner
            .tasks
            .borrow()
            .iter()
            .map(|(_, subtask)| subtask.name())
            .collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.tasks.borrow().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn is_completed(&self) -> bool {
        self.inner.completed.get()
    }
}

impl fmt::Debug for ForkQueue {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("ForkQueue")
            .field("tasks", &self.task_names())
            .field("completed", &self.inner.completed.get())
            .finish()
    }
}
