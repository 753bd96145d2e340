//! Task descriptors
//!
//! A [`Task`] is the aggregation of one main flow (the coroutine being
//! driven) and every child forked from it. Its status moves forward only:
//!
//! ```text
//! Running ──> Done | Cancelled | Aborted
//! ```
//!
//! The terminal transition fires the continuation and every joiner exactly
//! once. Aborts leave a frame in the [`ErrorTrace`] of their tree; the root
//! task hands the rendered trace to the error reporter. Each root (a task
//! started by the runtime or by `spawn`) owns its tree's trace, so
//! unrelated trees never see each other's frames.
//!
//! [`ErrorTrace`]: crate::util::diagnostic::ErrorTrace

pub mod context;
pub mod fork_queue;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;
use tracing::debug;

pub use context::Context;
pub use fork_queue::{ForkQueue, Subtask};

use crate::runtime::awaitable::Deferred;
use crate::runtime::driver::Callback;
use crate::runtime::env::Env;
use crate::runtime::error::SagaError;
use crate::runtime::value::Value;
use crate::util::diagnostic::SharedTrace;

/// Effect identifier, also used as task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct EffectId(pub u64);

impl EffectId {
    /// Get the inner value.
    #[inline]
    pub fn inner(&self) -> u64 {
        self.0
    }
}

impl From<u64> for EffectId {
    fn from(val: u64) -> Self {
        Self(val)
    }
}

impl fmt::Display for EffectId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "Effect({})", self.0)
    }
}

/// Monotonic effect id source, one per runtime.
#[derive(Debug)]
pub struct EffectIdGenerator {
    next: Cell<u64>,
}

impl EffectIdGenerator {
    pub fn new() -> Self {
        Self { next: Cell::new(1) }
    }

    /// Allocate a fresh id.
    #[inline]
    pub fn next_id(&self) -> EffectId {
        let id = self.next.get();
        self.next.set(id + 1);
        EffectId(id)
    }
}

impl Default for EffectIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Main flow or some child still executing.
    Running,
    /// Cancelled by a parent, a `cancel` effect or by joining a cancelled task.
    Cancelled,
    /// An uncaught error escaped the main flow or a child.
    Aborted,
    /// Main flow returned and every child finished.
    Done,
}

impl TaskStatus {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Running)
    }
}

/// Terminal outcome of a task or main flow.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Done(Value),
    Cancelled,
    Aborted(SagaError),
}

impl Outcome {
    #[inline]
    pub fn is_error(&self) -> bool {
        matches!(self, Outcome::Aborted(_))
    }
}

/// Descriptive metadata used in diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskMeta {
    pub name: String,
    pub location: Option<String>,
}

impl TaskMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: None,
        }
    }

    pub fn with_location(
        mut self,
        location: impl Into<String>,
    ) -> Self {
        self.location = Some(location.into());
        self
    }
}

impl fmt::Display for TaskMeta {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{} ({})", self.name, location),
            None => write!(f, "{}", self.name),
        }
    }
}

type Continuation = Box<dyn FnOnce(Outcome)>;

/// The main flow of a task: the coroutine itself, tracked separately from
/// forked children.
pub struct MainFlow {
    meta: TaskMeta,
    status: Cell<TaskStatus>,
    cont: RefCell<Option<Continuation>>,
    canceller: RefCell<Option<Rc<dyn Fn()>>>,
}

impl MainFlow {
    pub fn new(meta: TaskMeta) -> Self {
        Self {
            meta,
            status: Cell::new(TaskStatus::Running),
            cont: RefCell::new(None),
            canceller: RefCell::new(None),
        }
    }

    #[inline]
    pub fn meta(&self) -> &TaskMeta {
        &self.meta
    }

    #[inline]
    pub fn status(&self) -> TaskStatus {
        self.status.get()
    }

    #[inline]
    pub fn set_status(
        &self,
        status: TaskStatus,
    ) {
        self.status.set(status);
    }

    /// Install the function that cancels the running coroutine.
    pub fn set_canceller(
        &self,
        canceller: Rc<dyn Fn()>,
    ) {
        *self.canceller.borrow_mut() = Some(canceller);
    }

    pub fn clear_canceller(&self) {
        self.canceller.borrow_mut().take();
    }

    /// Cancel the coroutine, if a canceller is installed.
    pub fn cancel(&self) {
        let canceller = self.canceller.borrow().clone();
        if let Some(canceller) = canceller {
            canceller();
        }
    }

    pub fn set_cont(
        &self,
        cont: Continuation,
    ) {
        *self.cont.borrow_mut() = Some(cont);
    }

    pub fn clear_cont(&self) {
        self.cont.borrow_mut().take();
    }

    /// Report the main flow's outcome to whoever registered for it.
    pub fn complete(
        &self,
        outcome: Outcome,
    ) {
        let cont = self.cont.borrow_mut().take();
        if let Some(cont) = cont {
            cont(outcome);
        }
    }
}

impl fmt::Debug for MainFlow {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("MainFlow")
            .field("meta", &self.meta)
            .field("status", &self.status.get())
            .finish()
    }
}

pub(crate) struct TaskInner {
    id: EffectId,
    meta: TaskMeta,
    is_root: bool,
    env: Rc<Env>,
    trace: SharedTrace,
    context: Context,
    status: Cell<TaskStatus>,
    main: Rc<MainFlow>,
    outcome: RefCell<Option<Outcome>>,
    joiners: RefCell<SmallVec<[Callback; 2]>>,
    cont: RefCell<Option<Continuation>>,
    queue: ForkQueue,
    cancelled_due_to_error: RefCell<Vec<String>>,
    deferred_end: RefCell<Option<Deferred>>,
}

/// Handle to a task descriptor.
#[derive(Clone)]
pub struct Task(pub(crate) Rc<TaskInner>);

impl Task {
    /// Create a task for `main`, with its own context layer on top of
    /// `parent_context`.
    ///
    /// With `parent_trace` the task joins that tree; without it the task is
    /// a root with a fresh trace.
    pub(crate) fn new(
        env: Rc<Env>,
        main: Rc<MainFlow>,
        parent_context: &Context,
        parent_effect_id: EffectId,
        meta: TaskMeta,
        parent_trace: Option<SharedTrace>,
    ) -> Self {
        let is_root = parent_trace.is_none();
        let trace = parent_trace.unwrap_or_default();
        let inner = Rc::new_cyclic(|weak: &Weak<TaskInner>| {
            let on_abort = {
                let weak = weak.clone();
                move |names: &[String]| {
                    if let Some(inner) = weak.upgrade() {
                        inner
                            .cancelled_due_to_error
                            .borrow_mut()
                            .extend(names.iter().cloned());
                    }
                }
            };
            let on_end = {
                let weak = weak.clone();
                move |outcome: Outcome| {
                    if let Some(inner) = weak.upgrade() {
                        Task(inner).end(outcome);
                    }
                }
            };

            TaskInner {
                id: parent_effect_id,
                meta,
                is_root,
                env,
                trace,
                context: parent_context.child(),
                status: Cell::new(TaskStatus::Running),
                main: main.clone(),
                outcome: RefCell::new(None),
                joiners: RefCell::new(SmallVec::new()),
                cont: RefCell::new(None),
                queue: ForkQueue::new(on_abort, on_end),
                cancelled_due_to_error: RefCell::new(Vec::new()),
                deferred_end: RefCell::new(None),
            }
        });
        inner.queue.add_task(Subtask::Main(main));
        Task(inner)
    }

    #[inline]
    pub fn id(&self) -> EffectId {
        self.0.id
    }

    #[inline]
    pub fn meta(&self) -> &TaskMeta {
        &self.0.meta
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.0.is_root
    }

    #[inline]
    pub fn status(&self) -> TaskStatus {
        self.0.status.get()
    }

    #[inline]
    pub fn context(&self) -> &Context {
        &self.0.context
    }

    /// Error trace of the tree this task belongs to.
    #[inline]
    pub fn trace(&self) -> &SharedTrace {
        &self.0.trace
    }

    #[inline]
    pub(crate) fn queue(&self) -> &ForkQueue {
        &self.0.queue
    }

    #[inline]
    pub(crate) fn main(&self) -> &Rc<MainFlow> {
        &self.0.main
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.status() == TaskStatus::Running
    }

    /// Whether the task counts as cancelled.
    ///
    /// A task whose main flow was cancelled while forked children keep it
    /// running answers `true` as well; an aborted task never does, even
    /// though the abort cancelled its main flow.
    pub fn is_cancelled(&self) -> bool {
        let status = self.status();
        status == TaskStatus::Cancelled
            || (status == TaskStatus::Running && self.0.main.status() == TaskStatus::Cancelled)
    }

    #[inline]
    pub fn is_aborted(&self) -> bool {
        self.status() == TaskStatus::Aborted
    }

    /// Terminal outcome, `None` while running.
    pub fn outcome(&self) -> Option<Outcome> {
        self.0.outcome.borrow().clone()
    }

    /// Returned value once the task is done.
    pub fn result(&self) -> Option<Value> {
        match &*self.0.outcome.borrow() {
            Some(Outcome::Done(value)) => Some(value.clone()),
            _ => None,
        }
    }

    /// Error once the task aborted.
    pub fn error(&self) -> Option<SagaError> {
        match &*self.0.outcome.borrow() {
            Some(Outcome::Aborted(error)) => Some(error.clone()),
            _ => None,
        }
    }

    /// Set the continuation fired by the terminal transition.
    pub(crate) fn set_cont(
        &self,
        cont: Continuation,
    ) {
        *self.0.cont.borrow_mut() = Some(cont);
    }

    pub(crate) fn clear_cont(&self) {
        self.0.cont.borrow_mut().take();
    }

    /// Cancel the task: its main flow and every live child.
    ///
    /// No-op unless the task is running.
    pub fn cancel(&self) {
        if !self.is_running() {
            return;
        }
        debug!(task = %self.0.meta, id = self.0.id.inner(), "task cancelled");
        self.0.status.set(TaskStatus::Cancelled);
        self.0.queue.cancel_all();
        self.end(Outcome::Cancelled);
    }

    /// Terminal transition. Only the first call has any effect.
    pub(crate) fn end(
        &self,
        outcome: Outcome,
    ) {
        if self.0.outcome.borrow().is_some() {
            return;
        }

        match &outcome {
            Outcome::Done(_) => {
                if self.status() != TaskStatus::Cancelled {
                    self.0.status.set(TaskStatus::Done);
                }
            }
            Outcome::Cancelled => self.0.status.set(TaskStatus::Cancelled),
            Outcome::Aborted(error) => {
                self.0.status.set(TaskStatus::Aborted);
                let cancelled = self.0.cancelled_due_to_error.borrow().clone();
                self.0
                    .trace
                    .borrow_mut()
                    .add_frame(self.0.meta.clone(), cancelled);

                if self.0.is_root {
                    let saga_stack = {
                        let mut trace = self.0.trace.borrow_mut();
                        let rendered = trace.render();
                        trace.clear();
                        rendered
                    };
                    self.0.env.report_error(error, saga_stack);
                }
            }
        }
        debug!(
            task = %self.0.meta,
            id = self.0.id.inner(),
            status = ?self.status(),
            "task ended"
        );

        *self.0.outcome.borrow_mut() = Some(outcome.clone());

        let deferred = self.0.deferred_end.borrow().clone();
        if let Some(deferred) = deferred {
            deferred.settle(outcome.clone());
        }

        let cont = self.0.cont.borrow_mut().take();
        if let Some(cont) = cont {
            cont(outcome.clone());
        }

        let joiners = std::mem::take(&mut *self.0.joiners.borrow_mut());
        for joiner in joiners {
            joiner.complete(outcome.clone().into());
        }
    }

    /// Register `joiner` for the terminal outcome, or settle it now if the
    /// task already ended.
    pub fn add_joiner(
        &self,
        joiner: Callback,
    ) {
        let outcome = self.outcome();
        match outcome {
            Some(outcome) => joiner.complete(outcome.into()),
            None => self.0.joiners.borrow_mut().push(joiner),
        }
    }

    /// Drop a joiner registered with [`Task::add_joiner`].
    pub fn remove_joiner(
        &self,
        joiner: &Callback,
    ) {
        self.0.joiners.borrow_mut().retain(|j| !j.same(joiner));
    }

    /// Number of registered joiners.
    pub fn joiner_count(&self) -> usize {
        self.0.joiners.borrow().len()
    }

    /// Awaitable settled with the terminal outcome.
    ///
    /// Created lazily; already settled when the task has ended.
    pub fn to_awaitable(&self) -> Deferred {
        if let Some(deferred) = self.0.deferred_end.borrow().as_ref() {
            return deferred.clone();
        }

        let deferred = Deferred::new();
        if let Some(outcome) = self.outcome() {
            deferred.settle(outcome);
        }
        *self.0.deferred_end.borrow_mut() = Some(deferred.clone());
        deferred
    }

    /// Merge `props` into this task's own context layer.
    pub fn set_context<I, K>(
        &self,
        props: I,
    ) where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.0.context.extend(props);
    }

    /// Whether both handles point at the same task.
    #[inline]
    pub fn same(
        &self,
        other: &Task,
    ) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Task {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.0.id)
            .field("meta", &self.0.meta)
            .field("status", &self.status())
            .field("main", &self.0.main.status())
            .finish()
    }
}
