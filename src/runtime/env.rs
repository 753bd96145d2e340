//! Execution environment
//!
//! Everything shared by the tasks of one runtime: the scheduler, the
//! effect executor table, the default channel, the monitor, the error
//! reporter and effect middlewares. Diagnostic traces are per task tree,
//! see [`Task::trace`](crate::runtime::task::Task::trace).

use std::fmt;
use std::rc::Rc;

use tracing::{debug, error, trace};

use crate::channel::Channel;
use crate::effects::ExecutorTable;
use crate::runtime::coroutine::Yielded;
use crate::runtime::driver::Signal;
use crate::runtime::error::{SagaError, SagaResult};
use crate::runtime::scheduler::Scheduler;
use crate::runtime::task::{EffectId, EffectIdGenerator};
use crate::runtime::value::{Action, Value};

/// Extra information handed to the error reporter.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorInfo {
    /// Rendered saga stack, see
    /// [`ErrorTrace::render`](crate::util::diagnostic::ErrorTrace::render).
    pub saga_stack: String,
}

/// Root-level error reporter.
pub type ErrorReporter = Rc<dyn Fn(&SagaError, &ErrorInfo)>;

/// Default reporter: log through `tracing`.
pub fn log_error(
    err: &SagaError,
    info: &ErrorInfo,
) {
    error!(error = %err, "uncaught error in root saga\n{}", info.saga_stack);
}

/// Observer of the interpreter's activity.
///
/// Every method has an empty default.
pub trait SagaMonitor {
    fn root_saga_started(
        &self,
        _effect_id: EffectId,
        _name: &str,
    ) {
    }

    fn effect_triggered(
        &self,
        _effect_id: EffectId,
        _parent_effect_id: EffectId,
        _label: &str,
        _description: &str,
    ) {
    }

    fn effect_resolved(
        &self,
        _effect_id: EffectId,
        _result: &Signal,
    ) {
    }

    fn effect_rejected(
        &self,
        _effect_id: EffectId,
        _error: &SagaError,
    ) {
    }

    fn effect_cancelled(
        &self,
        _effect_id: EffectId,
    ) {
    }

    fn action_dispatched(
        &self,
        _action: &Action,
    ) {
    }
}

/// Monitor logging every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMonitor;

impl SagaMonitor for TracingMonitor {
    fn root_saga_started(
        &self,
        effect_id: EffectId,
        name: &str,
    ) {
        debug!(effect = effect_id.inner(), saga = name, "root saga started");
    }

    fn effect_triggered(
        &self,
        effect_id: EffectId,
        parent_effect_id: EffectId,
        label: &str,
        description: &str,
    ) {
        trace!(
            effect = effect_id.inner(),
            parent = parent_effect_id.inner(),
            label,
            description,
            "effect triggered"
        );
    }

    fn effect_resolved(
        &self,
        effect_id: EffectId,
        result: &Signal,
    ) {
        trace!(effect = effect_id.inner(), ?result, "effect resolved");
    }

    fn effect_rejected(
        &self,
        effect_id: EffectId,
        error: &SagaError,
    ) {
        debug!(effect = effect_id.inner(), %error, "effect rejected");
    }

    fn effect_cancelled(
        &self,
        effect_id: EffectId,
    ) {
        debug!(effect = effect_id.inner(), "effect cancelled");
    }

    fn action_dispatched(
        &self,
        action: &Action,
    ) {
        trace!(%action, "action dispatched");
    }
}

/// Wraps the dispatch of every yielded item.
///
/// A middleware either forwards (possibly a substitute) to `next`, or
/// swallows the item, in which case the effect never settles.
pub trait EffectMiddleware {
    fn handle(
        &self,
        yielded: Yielded,
        next: Next<'_>,
    );
}

impl<F> EffectMiddleware for F
where
    F: Fn(Yielded, Next<'_>),
{
    fn handle(
        &self,
        yielded: Yielded,
        next: Next<'_>,
    ) {
        self(yielded, next)
    }
}

/// The rest of the middleware chain, ending in the real effect runner.
pub struct Next<'a> {
    chain: &'a [Rc<dyn EffectMiddleware>],
    run: &'a dyn Fn(Yielded),
}

impl Next<'_> {
    /// Pass `yielded` down the chain.
    pub fn run(
        self,
        yielded: Yielded,
    ) {
        match self.chain.split_first() {
            Some((first, rest)) => first.handle(
                yielded,
                Next {
                    chain: rest,
                    run: self.run,
                },
            ),
            None => (self.run)(yielded),
        }
    }
}

/// Shared runtime environment.
pub struct Env {
    scheduler: Scheduler,
    executors: ExecutorTable,
    channel: Channel,
    monitor: Option<Rc<dyn SagaMonitor>>,
    on_error: ErrorReporter,
    middlewares: Vec<Rc<dyn EffectMiddleware>>,
    effect_ids: EffectIdGenerator,
}

impl Env {
    pub fn new(
        executors: ExecutorTable,
        channel: Channel,
        monitor: Option<Rc<dyn SagaMonitor>>,
        on_error: ErrorReporter,
        middlewares: Vec<Rc<dyn EffectMiddleware>>,
    ) -> Self {
        Self {
            scheduler: Scheduler::new(),
            executors,
            channel,
            monitor,
            on_error,
            middlewares,
            effect_ids: EffectIdGenerator::new(),
        }
    }

    #[inline]
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    #[inline]
    pub fn executors(&self) -> &ExecutorTable {
        &self.executors
    }

    /// Default channel used by `put` and `take`.
    #[inline]
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    #[inline]
    pub fn monitor(&self) -> Option<&dyn SagaMonitor> {
        self.monitor.as_deref()
    }

    #[inline]
    pub fn next_effect_id(&self) -> EffectId {
        self.effect_ids.next_id()
    }

    /// Hand an error to the root reporter.
    pub fn report_error(
        &self,
        error: &SagaError,
        saga_stack: String,
    ) {
        (self.on_error)(error, &ErrorInfo { saga_stack });
    }

    /// Emit `action` on the default channel.
    pub fn dispatch(
        &self,
        action: Action,
    ) -> SagaResult<Value> {
        if let Some(monitor) = self.monitor() {
            monitor.action_dispatched(&action);
        }
        self.channel.put(action.clone())?;
        Ok(Value::Action(action))
    }

    /// Run `yielded` through the middleware chain into `run`.
    pub(crate) fn run_middlewares(
        &self,
        yielded: Yielded,
        run: &dyn Fn(Yielded),
    ) {
        Next {
            chain: &self.middlewares,
            run,
        }
        .run(yielded)
    }
}

impl fmt::Debug for Env {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Env")
            .field("scheduler", &self.scheduler)
            .field("channel", &self.channel)
            .field("monitor", &self.monitor.is_some())
            .field("middlewares", &self.middlewares.len())
            .finish()
    }
}
