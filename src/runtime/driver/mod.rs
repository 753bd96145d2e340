//! Task driver
//!
//! Steps one coroutine to completion. Each yielded item is dispatched
//! through the environment's middlewares to the matching runner, and its
//! settlement resumes the coroutine in place. A settlement that arrives
//! while the driver is still dispatching the effect is parked and picked up
//! by the stepping loop, so a long chain of effects that settle
//! synchronously runs as a flat loop instead of a recursion.

pub mod callback;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::{debug, trace};

pub use callback::{Callback, Signal};

use crate::runtime::coroutine::{Coroutine, Finalize, Step, StepResult, Yielded};
use crate::runtime::env::Env;
use crate::runtime::error::SagaError;
use crate::runtime::task::{Context, EffectId, MainFlow, Outcome, Task, TaskMeta, TaskStatus};
use crate::runtime::value::Value;
use crate::util::diagnostic::SharedTrace;

/// Drives one coroutine.
pub(crate) struct Driver {
    env: Rc<Env>,
    coroutine: RefCell<Box<dyn Coroutine>>,
    main: Rc<MainFlow>,
    task: Task,
    parent_effect_id: EffectId,
    /// Callback of the effect currently awaited by the main flow.
    step_cb: RefCell<Option<Callback>>,
    /// Bumped on every step; settlements from an older step are dropped.
    generation: Cell<u64>,
    /// Inside the stepping loop.
    stepping: Cell<bool>,
    /// Settlement parked while stepping, tagged with its step's generation.
    parked: RefCell<Option<(u64, Signal)>>,
}

/// Start driving `coroutine` and return its task.
///
/// Without `parent_trace` the task is the root of a new tree. When `cont`
/// is given the task is an attached call: its outcome settles `cont`, and
/// cancelling `cont` cancels the task.
pub fn proc(
    env: &Rc<Env>,
    coroutine: Box<dyn Coroutine>,
    parent_context: &Context,
    parent_effect_id: EffectId,
    meta: TaskMeta,
    parent_trace: Option<SharedTrace>,
    cont: Option<Callback>,
) -> Task {
    let main = Rc::new(MainFlow::new(meta.clone()));
    let task = Task::new(
        env.clone(),
        main.clone(),
        parent_context,
        parent_effect_id,
        meta,
        parent_trace,
    );

    let driver = Rc::new(Driver {
        env: env.clone(),
        coroutine: RefCell::new(coroutine),
        main: main.clone(),
        task: task.clone(),
        parent_effect_id,
        step_cb: RefCell::new(None),
        generation: Cell::new(0),
        stepping: Cell::new(false),
        parked: RefCell::new(None),
    });

    {
        let driver = driver.clone();
        main.set_canceller(Rc::new(move || driver.cancel_main()));
    }

    if let Some(cb) = cont {
        let on_end = cb.clone();
        task.set_cont(Box::new(move |outcome| on_end.complete(outcome.into())));
        let cancel = task.clone();
        cb.set_cancel(move || cancel.cancel());
    }

    debug!(
        task = %task.meta(),
        id = parent_effect_id.inner(),
        root = task.is_root(),
        "task started"
    );
    driver.run_steps(Signal::Value(Value::Unit));
    task
}

impl Driver {
    /// Run one coroutine step with `f`.
    fn step(
        &self,
        f: impl FnOnce(&mut dyn Coroutine) -> StepResult,
    ) -> StepResult {
        match self.coroutine.try_borrow_mut() {
            Ok(mut coroutine) => f(coroutine.as_mut()),
            Err(_) => Err(SagaError::msg(format!(
                "coroutine `{}` resumed while already running",
                self.main.meta().name
            ))),
        }
    }

    /// Step with `signal`, then with every settlement parked meanwhile.
    ///
    /// Also entered from inside a step when the task cancels itself; the
    /// inner loop runs the cleanup to its end before returning.
    fn run_steps(
        self: &Rc<Self>,
        signal: Signal,
    ) {
        let outer = self.stepping.replace(true);
        let mut signal = Some(signal);
        while let Some(current) = signal {
            self.next(current);
            signal = match self.parked.borrow_mut().take() {
                Some((generation, parked)) if generation == self.generation.get() => Some(parked),
                _ => None,
            };
        }
        self.stepping.set(outer);
    }

    /// Settlement of the effect awaited by step `generation`.
    fn settle(
        self: &Rc<Self>,
        generation: u64,
        signal: Signal,
    ) {
        if self.generation.get() != generation {
            return;
        }
        if self.stepping.get() {
            *self.parked.borrow_mut() = Some((generation, signal));
        } else {
            self.run_steps(signal);
        }
    }

    /// Resume the coroutine with `signal` and act on the step it takes.
    fn next(
        self: &Rc<Self>,
        signal: Signal,
    ) {
        self.generation.set(self.generation.get() + 1);
        let pending = self.step_cb.borrow_mut().take();

        let result = match signal {
            Signal::Error(error) => {
                let result = self.step(|co| co.throw_into(error));
                if result.is_ok() {
                    // Recovered: stale frames must not leak into later failures.
                    self.task.trace().borrow_mut().clear();
                }
                result
            }
            Signal::Cancel => {
                self.main.set_status(TaskStatus::Cancelled);
                if let Some(pending) = pending {
                    pending.cancel();
                }
                self.step(|co| co.finalize(Finalize::Cancel))
            }
            Signal::Terminate => self.step(|co| co.finalize(Finalize::Terminate)),
            Signal::Value(value) => self.step(|co| co.resume(value)),
        };

        match result {
            Ok(Step::Yield(yielded)) => {
                let cb = self.step_callback();
                *self.step_cb.borrow_mut() = Some(cb.clone());
                self.digest_effect(yielded, self.parent_effect_id, cb, "");
            }
            Ok(Step::Done(value)) => {
                let outcome = if self.main.status() == TaskStatus::Cancelled {
                    Outcome::Cancelled
                } else {
                    self.main.set_status(TaskStatus::Done);
                    Outcome::Done(value)
                };
                self.finish(outcome);
            }
            Err(error) if self.main.status() == TaskStatus::Cancelled => {
                // Nobody awaits a cancelled flow; its cleanup failure goes
                // straight to the reporter.
                let saga_stack = {
                    let mut trace = self.task.trace().borrow_mut();
                    trace.add_frame(self.main.meta().clone(), Vec::new());
                    let rendered = trace.render();
                    trace.clear();
                    rendered
                };
                self.env.report_error(&error, saga_stack);
                self.finish(Outcome::Cancelled);
            }
            Err(error) => {
                self.main.set_status(TaskStatus::Aborted);
                self.finish(Outcome::Aborted(error));
            }
        }
    }

    fn finish(
        &self,
        outcome: Outcome,
    ) {
        trace!(task = %self.main.meta(), ?outcome, "main flow finished");
        self.main.clear_canceller();
        self.main.complete(outcome);
    }

    /// Continuation for the effect about to be yielded.
    fn step_callback(self: &Rc<Self>) -> Callback {
        let driver = self.clone();
        let generation = self.generation.get();
        Callback::new(move |signal| driver.settle(generation, signal))
    }

    fn cancel_main(self: &Rc<Self>) {
        if self.main.status() == TaskStatus::Running {
            self.main.set_status(TaskStatus::Cancelled);
            self.run_steps(Signal::Cancel);
        }
    }

    /// Dispatch `yielded`, settling `cb` exactly once unless `cb` is
    /// cancelled first.
    fn digest_effect(
        self: &Rc<Self>,
        yielded: Yielded,
        parent_effect_id: EffectId,
        cb: Callback,
        label: &str,
    ) {
        let env = &self.env;
        let effect_id = env.next_effect_id();
        let description = yielded.describe();
        trace!(effect = effect_id.inner(), %description, "digest effect");
        if let Some(monitor) = env.monitor() {
            monitor.effect_triggered(effect_id, parent_effect_id, label, &description);
        }

        // Completion and cancellation are mutually exclusive.
        let settled = Rc::new(Cell::new(false));

        let curr_cb = {
            let settled = settled.clone();
            let cb = cb.clone();
            let env = env.clone();
            let trace = self.task.trace().clone();
            Callback::new(move |signal| {
                if settled.replace(true) {
                    return;
                }
                cb.clear_cancel();
                if let Some(monitor) = env.monitor() {
                    match &signal {
                        Signal::Error(error) => monitor.effect_rejected(effect_id, error),
                        other => monitor.effect_resolved(effect_id, other),
                    }
                }
                if signal.is_error() {
                    trace.borrow_mut().set_crashed_effect(description);
                }
                cb.complete(signal);
            })
        };

        {
            let settled = settled.clone();
            let curr_cb = curr_cb.clone();
            let env = env.clone();
            cb.set_cancel(move || {
                if settled.replace(true) {
                    return;
                }
                curr_cb.cancel();
                if let Some(monitor) = env.monitor() {
                    monitor.effect_cancelled(effect_id);
                }
            });
        }

        let driver = self.clone();
        env.run_middlewares(yielded, &move |yielded| {
            driver.run_effect(yielded, effect_id, curr_cb.clone())
        });
    }

    fn run_effect(
        self: &Rc<Self>,
        yielded: Yielded,
        effect_id: EffectId,
        cb: Callback,
    ) {
        match yielded {
            Yielded::Awaitable(awaitable) => {
                if let Some(canceller) = awaitable.canceller() {
                    cb.set_cancel(canceller);
                }
                awaitable.subscribe(cb);
            }
            Yielded::Coroutine(coroutine) => {
                let meta = TaskMeta::new(coroutine.name());
                proc(
                    &self.env,
                    coroutine,
                    self.task.context(),
                    effect_id,
                    meta,
                    Some(self.task.trace().clone()),
                    Some(cb),
                );
            }
            Yielded::Effect(effect) => {
                let kind = effect.kind();
                match self.env.executors().get(&kind) {
                    Some(executor) => {
                        let executor = executor.clone();
                        let ctx = ExecutionContext {
                            driver: self.clone(),
                            effect_id,
                        };
                        executor(effect, cb, &ctx);
                    }
                    None => cb.reject(SagaError::UnhandledEffect(kind.to_string())),
                }
            }
            Yielded::Value(value) => cb.resolve(value),
        }
    }
}

/// What an effect executor may use of the task running it.
pub struct ExecutionContext {
    driver: Rc<Driver>,
    effect_id: EffectId,
}

impl ExecutionContext {
    /// Task that yielded the effect.
    #[inline]
    pub fn task(&self) -> &Task {
        &self.driver.task
    }

    #[inline]
    pub fn env(&self) -> &Rc<Env> {
        &self.driver.env
    }

    /// Id of the effect being executed.
    #[inline]
    pub fn effect_id(&self) -> EffectId {
        self.effect_id
    }

    /// Dispatch a sub-effect, parented to the effect being executed.
    pub fn digest(
        &self,
        yielded: Yielded,
        cb: Callback,
        label: &str,
    ) {
        self.driver.digest_effect(yielded, self.effect_id, cb, label);
    }

    /// Run `yielded` in place of the effect being executed, under the same
    /// id: a coroutine becomes an attached call, an awaitable is adopted.
    pub fn run(
        &self,
        yielded: Yielded,
        cb: Callback,
    ) {
        self.driver.run_effect(yielded, self.effect_id, cb);
    }
}
