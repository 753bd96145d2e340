//! Effect executor table
//!
//! Every executor receives the effect, the completion callback and the
//! execution context of the yielding task. It must settle the callback
//! exactly once, and attach a cancellation function to it before settling
//! asynchronously.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use super::{CallDesc, CancelTarget, Effect, EffectKind, ShapeKeys, Tasks};
use crate::channel::Channel;
use crate::runtime::coroutine::{failing, once, Coroutine, Yielded};
use crate::runtime::driver::{proc, Callback, ExecutionContext, Signal};
use crate::runtime::error::SagaError;
use crate::runtime::task::{Subtask, Task, TaskMeta};
use crate::runtime::value::{Action, Value};

/// Effect executor.
pub type Executor = Rc<dyn Fn(Effect, Callback, &ExecutionContext)>;

/// Effect kind to executor mapping.
#[derive(Clone, Default)]
pub struct ExecutorTable {
    executors: HashMap<EffectKind, Executor>,
}

impl ExecutorTable {
    /// Empty table; every effect rejects as unhandled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with every built-in effect.
    pub fn standard() -> Self {
        let mut table = Self::new();
        table.register(EffectKind::Call, run_call);
        table.register(EffectKind::Fork, run_fork);
        table.register(EffectKind::Join, run_join);
        table.register(EffectKind::Cancel, run_cancel);
        table.register(EffectKind::Cancelled, run_cancelled);
        table.register(EffectKind::GetContext, run_get_context);
        table.register(EffectKind::SetContext, run_set_context);
        table.register(EffectKind::Put, run_put);
        table.register(EffectKind::Take, run_take);
        table.register(EffectKind::All, run_all);
        table.register(EffectKind::Race, run_race);
        table.register(EffectKind::ActionChannel, run_action_channel);
        table.register(EffectKind::Flush, run_flush);
        table.register(EffectKind::Cps, run_cps);
        table
    }

    /// Register (or replace) the executor for `kind`.
    pub fn register(
        &mut self,
        kind: EffectKind,
        executor: impl Fn(Effect, Callback, &ExecutionContext) + 'static,
    ) {
        self.executors.insert(kind, Rc::new(executor));
    }

    /// Register an executor for `custom(kind, payload)` effects.
    pub fn register_custom(
        &mut self,
        kind: impl Into<String>,
        executor: impl Fn(Value, Callback, &ExecutionContext) + 'static,
    ) {
        let kind = kind.into();
        self.register(EffectKind::Custom(kind), move |effect, cb, ctx| {
            match effect {
                Effect::Custom { payload, .. } => executor(payload, cb, ctx),
                other => cb.reject(mismatch("custom", &other)),
            }
        });
    }

    #[inline]
    pub fn get(
        &self,
        kind: &EffectKind,
    ) -> Option<&Executor> {
        self.executors.get(kind)
    }

    #[inline]
    pub fn contains(
        &self,
        kind: &EffectKind,
    ) -> bool {
        self.executors.contains_key(kind)
    }

    /// Merge `other` into this table, replacing duplicates.
    pub fn extend(
        &mut self,
        other: ExecutorTable,
    ) {
        self.executors.extend(other.executors);
    }
}

impl fmt::Debug for ExecutorTable {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let mut kinds: Vec<String> = self.executors.keys().map(|k| k.to_string()).collect();
        kinds.sort();
        f.debug_struct("ExecutorTable").field("kinds", &kinds).finish()
    }
}

fn mismatch(
    expected: &str,
    effect: &Effect,
) -> SagaError {
    SagaError::InvalidEffect(format!(
        "{} executor received {}",
        expected,
        effect.describe()
    ))
}

fn run_call(
    effect: Effect,
    cb: Callback,
    ctx: &ExecutionContext,
) {
    let call = match effect {
        Effect::Call(call) => call,
        other => return cb.reject(mismatch("call", &other)),
    };
    match call.invoke() {
        Ok(Yielded::Value(value)) => cb.resolve(value),
        Ok(Yielded::Effect(effect)) => ctx.digest(Yielded::Effect(effect), cb, ""),
        Ok(other) => ctx.run(other, cb),
        Err(error) => cb.reject(error),
    }
}

/// Turn a call into the coroutine a forked task runs.
fn task_coroutine(call: &CallDesc) -> Box<dyn Coroutine> {
    match call.invoke() {
        Ok(Yielded::Coroutine(coroutine)) => coroutine,
        Ok(other) => once(call.name.clone(), other),
        Err(error) => failing(call.name.clone(), error),
    }
}

fn run_fork(
    effect: Effect,
    cb: Callback,
    ctx: &ExecutionContext,
) {
    let (call, detached) = match effect {
        Effect::Fork { call, detached } => (call, detached),
        other => return cb.reject(mismatch("fork", &other)),
    };

    let coroutine = task_coroutine(&call);
    let meta = TaskMeta::new(call.name.clone());
    let env = ctx.env().clone();
    let parent = ctx.task().clone();
    let effect_id = ctx.effect_id();

    // Spawned tasks start a tree of their own.
    let parent_trace = (!detached).then(|| parent.trace().clone());

    env.scheduler().run_immediately(|| {
        let child = proc(
            &env,
            coroutine,
            parent.context(),
            effect_id,
            meta,
            parent_trace,
            None,
        );

        if detached {
            cb.resolve(Value::Task(child));
        } else if child.is_running() {
            parent.queue().add_task(Subtask::Child(child.clone()));
            cb.resolve(Value::Task(child));
        } else if let Some(error) = child.error() {
            parent.queue().abort(error);
        } else {
            cb.resolve(Value::Task(child));
        }
    });
}

fn join_single(
    target: Task,
    cb: Callback,
) {
    if target.is_running() {
        let task = target.clone();
        let joiner = cb.clone();
        cb.set_cancel(move || {
            if task.is_running() {
                task.remove_joiner(&joiner);
            }
        });
    }
    target.add_joiner(cb);
}

fn run_join(
    effect: Effect,
    cb: Callback,
    _ctx: &ExecutionContext,
) {
    match effect {
        Effect::Join(Tasks::One(task)) => join_single(task, cb),
        Effect::Join(Tasks::Many(tasks)) => {
            if tasks.is_empty() {
                return cb.resolve(Value::List(Vec::new()));
            }
            let group = AllStyle::new(ShapeKeys::List(tasks.len()), &cb);
            for (task, child) in tasks.into_iter().zip(group.children.iter().cloned()) {
                join_single(task, child);
            }
        }
        other => cb.reject(mismatch("join", &other)),
    }
}

fn run_cancel(
    effect: Effect,
    cb: Callback,
    ctx: &ExecutionContext,
) {
    let target = match effect {
        Effect::Cancel(target) => target,
        other => return cb.reject(mismatch("cancel", &other)),
    };

    let cancel_single = |task: &Task| {
        if task.is_running() {
            task.cancel();
        }
    };
    match target {
        CancelTarget::SelfTask => cancel_single(ctx.task()),
        CancelTarget::One(task) => cancel_single(&task),
        CancelTarget::Many(tasks) => tasks.iter().for_each(cancel_single),
    }
    // Not cancellable.
    cb.resolve(Value::Unit);
}

fn run_cancelled(
    _effect: Effect,
    cb: Callback,
    ctx: &ExecutionContext,
) {
    cb.resolve(Value::Bool(ctx.task().is_cancelled()));
}

fn run_get_context(
    effect: Effect,
    cb: Callback,
    ctx: &ExecutionContext,
) {
    let key = match effect {
        Effect::GetContext(key) => key,
        other => return cb.reject(mismatch("getContext", &other)),
    };
    cb.resolve(ctx.task().context().get(&key).unwrap_or_default());
}

fn run_set_context(
    effect: Effect,
    cb: Callback,
    ctx: &ExecutionContext,
) {
    let props = match effect {
        Effect::SetContext(props) => props,
        other => return cb.reject(mismatch("setContext", &other)),
    };
    ctx.task().set_context(props);
    cb.resolve(Value::Unit);
}

fn run_put(
    effect: Effect,
    cb: Callback,
    ctx: &ExecutionContext,
) {
    let (channel, action) = match effect {
        Effect::Put { channel, action } => (channel, action),
        other => return cb.reject(mismatch("put", &other)),
    };

    let env = ctx.env().clone();
    let scheduler = env.scheduler().clone();
    // Not cancellable.
    scheduler.schedule_asap(move || {
        let result = match channel {
            Some(channel) => channel
                .put(action.clone())
                .map(|_| Value::Action(action)),
            None => env.dispatch(action),
        };
        match result {
            Ok(value) => cb.resolve(value),
            Err(error) => cb.reject(error),
        }
    });
}

fn run_take(
    effect: Effect,
    cb: Callback,
    ctx: &ExecutionContext,
) {
    let (channel, pattern, maybe) = match effect {
        Effect::Take {
            channel,
            pattern,
            maybe,
        } => (channel, pattern, maybe),
        other => return cb.reject(mismatch("take", &other)),
    };

    let channel = channel.unwrap_or_else(|| ctx.env().channel().clone());
    let taker_cb = cb.clone();
    let cancel = channel.take(pattern, move |action: Action| {
        if action.is_end() && !maybe {
            taker_cb.complete(Signal::Terminate);
        } else {
            taker_cb.resolve(Value::Action(action));
        }
    });
    cb.set_cancel(cancel);
}

fn run_action_channel(
    effect: Effect,
    cb: Callback,
    ctx: &ExecutionContext,
) {
    let (pattern, limit) = match effect {
        Effect::ActionChannel { pattern, limit } => (pattern, limit),
        other => return cb.reject(mismatch("actionChannel", &other)),
    };

    let queue = match limit {
        Some(limit) => Channel::fixed(limit),
        None => Channel::buffered(),
    };
    queue.forward_from(ctx.env().channel(), pattern);
    cb.resolve(Value::Channel(queue));
}

fn run_flush(
    effect: Effect,
    cb: Callback,
    _ctx: &ExecutionContext,
) {
    let channel = match effect {
        Effect::Flush(channel) => channel,
        other => return cb.reject(mismatch("flush", &other)),
    };

    let actions = channel.flush();
    if actions.is_empty() && channel.is_closed() {
        cb.resolve(Value::Action(Action::end()));
    } else {
        cb.resolve(Value::List(actions.into_iter().map(Value::Action).collect()));
    }
}

fn run_cps(
    effect: Effect,
    cb: Callback,
    _ctx: &ExecutionContext,
) {
    let cps = match effect {
        Effect::Cps(cps) => cps,
        other => return cb.reject(mismatch("cps", &other)),
    };

    // An error after the function settled is dropped with the second settle.
    if let Err(error) = (cps.func)(&cps.args, cb.clone()) {
        cb.reject(error);
    }
}

/// Child callbacks aggregating into `parent` the way `all` does: every
/// child must resolve; an error, CANCEL or TERMINATE completes at once.
struct AllStyle {
    children: Vec<Callback>,
    completed: Rc<Cell<bool>>,
}

impl AllStyle {
    fn new(
        keys: ShapeKeys,
        parent: &Callback,
    ) -> Self {
        let total = keys.len();
        let completed = Rc::new(Cell::new(false));
        let results: Rc<RefCell<Vec<Option<Value>>>> = Rc::new(RefCell::new(vec![None; total]));
        let count = Rc::new(Cell::new(0usize));
        let keys = Rc::new(keys);

        let children: Vec<Callback> = (0..total)
            .map(|index| {
                let completed = completed.clone();
                let results = results.clone();
                let count = count.clone();
                let keys = keys.clone();
                let parent = parent.clone();
                Callback::new(move |signal| {
                    if completed.get() {
                        return;
                    }
                    match signal {
                        Signal::Value(value) => {
                            results.borrow_mut()[index] = Some(value);
                            count.set(count.get() + 1);
                            if count.get() == total {
                                completed.set(true);
                                let results = std::mem::take(&mut *results.borrow_mut());
                                parent.resolve(keys.assemble(results));
                            }
                        }
                        signal => {
                            parent.cancel();
                            parent.complete(signal);
                        }
                    }
                })
            })
            .collect();

        {
            let completed = completed.clone();
            let children = children.clone();
            parent.set_cancel(move || {
                if !completed.replace(true) {
                    for child in &children {
                        child.cancel();
                    }
                }
            });
        }

        Self {
            children,
            completed,
        }
    }

    #[inline]
    fn is_completed(&self) -> bool {
        self.completed.get()
    }
}

fn run_all(
    effect: Effect,
    cb: Callback,
    ctx: &ExecutionContext,
) {
    let shape = match effect {
        Effect::All(shape) => shape,
        other => return cb.reject(mismatch("all", &other)),
    };

    let (keys, items) = shape.split();
    if items.is_empty() {
        return cb.resolve(keys.assemble(Vec::new()));
    }

    let group = AllStyle::new(keys, &cb);
    for ((label, item), child) in items.into_iter().zip(group.children.iter().cloned()) {
        if group.is_completed() {
            trace!(%label, "all: already settled, skipping");
            break;
        }
        ctx.digest(item, child, &label);
    }
}

fn run_race(
    effect: Effect,
    cb: Callback,
    ctx: &ExecutionContext,
) {
    let shape = match effect {
        Effect::Race(shape) => shape,
        other => return cb.reject(mismatch("race", &other)),
    };

    let (keys, items) = shape.split();
    let keys = Rc::new(keys);
    let completed = Rc::new(Cell::new(false));

    let children: Vec<Callback> = (0..items.len())
        .map(|index| {
            let completed = completed.clone();
            let keys = keys.clone();
            let parent = cb.clone();
            Callback::new(move |signal| {
                if completed.get() {
                    return;
                }
                match signal {
                    Signal::Value(value) => {
                        parent.cancel();
                        completed.set(true);
                        parent.resolve(keys.single(index, value));
                    }
                    signal => {
                        parent.cancel();
                        parent.complete(signal);
                    }
                }
            })
        })
        .collect();

    {
        let completed = completed.clone();
        let children = children.clone();
        cb.set_cancel(move || {
            if !completed.replace(true) {
                for child in &children {
                    child.cancel();
                }
            }
        });
    }

    for ((label, item), child) in items.into_iter().zip(children) {
        if completed.get() {
            break;
        }
        ctx.digest(item, child, &label);
    }
}
