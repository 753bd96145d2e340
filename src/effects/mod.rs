//! Effect descriptions
//!
//! An [`Effect`] is plain data describing an operation a coroutine wants
//! performed. The driver looks its [`EffectKind`] up in the environment's
//! [`ExecutorTable`]; the standard table is built by
//! [`ExecutorTable::standard`].

pub mod executors;
pub mod helpers;

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

pub use executors::{Executor, ExecutorTable};
pub use helpers::take_every;

use crate::channel::{Channel, Pattern};
use crate::runtime::coroutine::{Coroutine, Yielded};
use crate::runtime::driver::Callback;
use crate::runtime::error::SagaResult;
use crate::runtime::task::Task;
use crate::runtime::value::{Action, Value};

/// Function invoked by `call`, `fork` and `spawn`.
pub type CallFn = Rc<dyn Fn(&[Value]) -> SagaResult<Yielded>>;

/// A function together with its arguments.
#[derive(Clone)]
pub struct CallDesc {
    pub name: String,
    pub func: CallFn,
    pub args: Vec<Value>,
}

impl CallDesc {
    pub fn new<F>(
        name: impl Into<String>,
        func: F,
        args: Vec<Value>,
    ) -> Self
    where
        F: Fn(&[Value]) -> SagaResult<Yielded> + 'static,
    {
        Self {
            name: name.into(),
            func: Rc::new(func),
            args,
        }
    }

    #[inline]
    pub fn invoke(&self) -> SagaResult<Yielded> {
        (self.func)(&self.args)
    }
}

impl fmt::Debug for CallDesc {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("CallDesc")
            .field("name", &self.name)
            .field("args", &self.args)
            .finish()
    }
}

/// Node-style function run by `cps`: it receives the arguments and the
/// completion callback, and settles the callback whenever it is done.
pub type CpsFn = Rc<dyn Fn(&[Value], Callback) -> SagaResult<()>>;

/// A continuation-passing function together with its arguments.
#[derive(Clone)]
pub struct CpsDesc {
    pub name: String,
    pub func: CpsFn,
    pub args: Vec<Value>,
}

impl fmt::Debug for CpsDesc {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("CpsDesc")
            .field("name", &self.name)
            .field("args", &self.args)
            .finish()
    }
}

/// One or several tasks.
#[derive(Debug, Clone)]
pub enum Tasks {
    One(Task),
    Many(Vec<Task>),
}

/// Target of a `cancel` effect.
#[derive(Debug, Clone)]
pub enum CancelTarget {
    /// The task yielding the effect.
    SelfTask,
    One(Task),
    Many(Vec<Task>),
}

/// Children of an `all` or `race`.
#[derive(Debug)]
pub enum Shape {
    List(Vec<Yielded>),
    Keyed(IndexMap<String, Yielded>),
}

impl Shape {
    pub fn len(&self) -> usize {
        match self {
            Shape::List(items) => items.len(),
            Shape::Keyed(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Split into the result layout and the labelled children.
    pub(crate) fn split(self) -> (ShapeKeys, Vec<(String, Yielded)>) {
        match self {
            Shape::List(items) => (
                ShapeKeys::List(items.len()),
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| (i.to_string(), item))
                    .collect(),
            ),
            Shape::Keyed(items) => {
                let keys = items.keys().cloned().collect();
                (ShapeKeys::Keyed(keys), items.into_iter().collect())
            }
        }
    }

    fn describe(&self) -> String {
        match self {
            Shape::List(items) => items
                .iter()
                .map(Yielded::describe)
                .collect::<Vec<_>>()
                .join(", "),
            Shape::Keyed(items) => items
                .iter()
                .map(|(key, item)| format!("{}: {}", key, item.describe()))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

/// Result layout of an `all` or `race`.
#[derive(Debug, Clone)]
pub(crate) enum ShapeKeys {
    List(usize),
    Keyed(Vec<String>),
}

impl ShapeKeys {
    pub(crate) fn len(&self) -> usize {
        match self {
            ShapeKeys::List(n) => *n,
            ShapeKeys::Keyed(keys) => keys.len(),
        }
    }

    /// Full result; missing slots become unit.
    pub(crate) fn assemble(
        &self,
        results: Vec<Option<Value>>,
    ) -> Value {
        match self {
            ShapeKeys::List(_) => {
                Value::List(results.into_iter().map(Option::unwrap_or_default).collect())
            }
            ShapeKeys::Keyed(keys) => Value::Map(
                keys.iter()
                    .cloned()
                    .zip(results.into_iter().map(Option::unwrap_or_default))
                    .collect(),
            ),
        }
    }

    /// Result holding only the winner at `index`.
    pub(crate) fn single(
        &self,
        index: usize,
        value: Value,
    ) -> Value {
        match self {
            ShapeKeys::List(n) => {
                let mut items = vec![Value::Unit; *n];
                items[index] = value;
                Value::List(items)
            }
            ShapeKeys::Keyed(keys) => {
                let mut map = IndexMap::new();
                map.insert(keys[index].clone(), value);
                Value::Map(map)
            }
        }
    }
}

/// Effect kind tag, the executor table key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EffectKind {
    Call,
    Fork,
    Join,
    Cancel,
    Cancelled,
    GetContext,
    SetContext,
    Put,
    Take,
    All,
    Race,
    ActionChannel,
    Flush,
    Cps,
    Custom(String),
}

impl fmt::Display for EffectKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let name = match self {
            EffectKind::Call => "CALL",
            EffectKind::Fork => "FORK",
            EffectKind::Join => "JOIN",
            EffectKind::Cancel => "CANCEL",
            EffectKind::Cancelled => "CANCELLED",
            EffectKind::GetContext => "GET_CONTEXT",
            EffectKind::SetContext => "SET_CONTEXT",
            EffectKind::Put => "PUT",
            EffectKind::Take => "TAKE",
            EffectKind::All => "ALL",
            EffectKind::Race => "RACE",
            EffectKind::ActionChannel => "ACTION_CHANNEL",
            EffectKind::Flush => "FLUSH",
            EffectKind::Cps => "CPS",
            EffectKind::Custom(kind) => kind,
        };
        f.write_str(name)
    }
}

/// A requested operation.
#[derive(Debug)]
pub enum Effect {
    Call(CallDesc),
    Fork {
        call: CallDesc,
        /// Detached forks (`spawn`) are independent roots.
        detached: bool,
    },
    Join(Tasks),
    Cancel(CancelTarget),
    Cancelled,
    GetContext(String),
    SetContext(Vec<(String, Value)>),
    Put {
        /// `None` means the runtime's default channel.
        channel: Option<Channel>,
        action: Action,
    },
    Take {
        channel: Option<Channel>,
        pattern: Pattern,
        /// Receive END as an action instead of terminating.
        maybe: bool,
    },
    All(Shape),
    Race(Shape),
    /// Queue actions from the default channel into a fresh buffered channel.
    ActionChannel {
        pattern: Pattern,
        /// `None` grows without bound.
        limit: Option<usize>,
    },
    Flush(Channel),
    Cps(CpsDesc),
    Custom {
        kind: String,
        payload: Value,
    },
}

impl Effect {
    pub fn kind(&self) -> EffectKind {
        match self {
            Effect::Call(_) => EffectKind::Call,
            Effect::Fork { .. } => EffectKind::Fork,
            Effect::Join(_) => EffectKind::Join,
            Effect::Cancel(_) => EffectKind::Cancel,
            Effect::Cancelled => EffectKind::Cancelled,
            Effect::GetContext(_) => EffectKind::GetContext,
            Effect::SetContext(_) => EffectKind::SetContext,
            Effect::Put { .. } => EffectKind::Put,
            Effect::Take { .. } => EffectKind::Take,
            Effect::All(_) => EffectKind::All,
            Effect::Race(_) => EffectKind::Race,
            Effect::ActionChannel { .. } => EffectKind::ActionChannel,
            Effect::Flush(_) => EffectKind::Flush,
            Effect::Cps(_) => EffectKind::Cps,
            Effect::Custom { kind, .. } => EffectKind::Custom(kind.clone()),
        }
    }

    /// Short form used in monitors and the saga stack.
    pub fn describe(&self) -> String {
        match self {
            Effect::Call(call) => format!("call({})", call.name),
            Effect::Fork {
                call,
                detached: false,
            } => format!("fork({})", call.name),
            Effect::Fork {
                call,
                detached: true,
            } => format!("spawn({})", call.name),
            Effect::Join(Tasks::One(task)) => format!("join({})", task.meta().name),
            Effect::Join(Tasks::Many(tasks)) => format!("join([{} tasks])", tasks.len()),
            Effect::Cancel(CancelTarget::SelfTask) => "cancel(@@self)".to_string(),
            Effect::Cancel(CancelTarget::One(task)) => format!("cancel({})", task.meta().name),
            Effect::Cancel(CancelTarget::Many(tasks)) => {
                format!("cancel([{} tasks])", tasks.len())
            }
            Effect::Cancelled => "cancelled()".to_string(),
            Effect::GetContext(key) => format!("getContext({})", key),
            Effect::SetContext(props) => format!(
                "setContext({})",
                props
                    .iter()
                    .map(|(k, _)| k.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Effect::Put { action, .. } => format!("put({})", action),
            Effect::Take {
                channel: Some(_), ..
            } => "take(channel)".to_string(),
            Effect::Take {
                pattern,
                maybe: false,
                ..
            } => format!("take({})", pattern),
            Effect::Take { pattern, .. } => format!("takeMaybe({})", pattern),
            Effect::All(shape) => format!("all([{}])", shape.describe()),
            Effect::Race(shape) => format!("race([{}])", shape.describe()),
            Effect::ActionChannel { pattern, .. } => format!("actionChannel({})", pattern),
            Effect::Flush(_) => "flush(channel)".to_string(),
            Effect::Cps(cps) => format!("cps({})", cps.name),
            Effect::Custom { kind, payload } => format!("{}({})", kind, payload),
        }
    }
}

/// Adapt a coroutine factory to a [`CallFn`]-compatible closure.
pub fn saga_fn<F>(f: F) -> impl Fn(&[Value]) -> SagaResult<Yielded>
where
    F: Fn(&[Value]) -> Box<dyn Coroutine>,
{
    move |args| Ok(Yielded::Coroutine(f(args)))
}

/// Call `func` with `args` and wait for its result.
pub fn call<F>(
    name: impl Into<String>,
    func: F,
    args: Vec<Value>,
) -> Effect
where
    F: Fn(&[Value]) -> SagaResult<Yielded> + 'static,
{
    Effect::Call(CallDesc::new(name, func, args))
}

/// Start `func` as an attached child task.
pub fn fork<F>(
    name: impl Into<String>,
    func: F,
    args: Vec<Value>,
) -> Effect
where
    F: Fn(&[Value]) -> SagaResult<Yielded> + 'static,
{
    Effect::Fork {
        call: CallDesc::new(name, func, args),
        detached: false,
    }
}

/// Start `func` as a detached root task.
pub fn spawn<F>(
    name: impl Into<String>,
    func: F,
    args: Vec<Value>,
) -> Effect
where
    F: Fn(&[Value]) -> SagaResult<Yielded> + 'static,
{
    Effect::Fork {
        call: CallDesc::new(name, func, args),
        detached: true,
    }
}

pub fn join(task: Task) -> Effect {
    Effect::Join(Tasks::One(task))
}

pub fn join_all(tasks: Vec<Task>) -> Effect {
    Effect::Join(Tasks::Many(tasks))
}

pub fn cancel(task: Task) -> Effect {
    Effect::Cancel(CancelTarget::One(task))
}

pub fn cancel_all(tasks: Vec<Task>) -> Effect {
    Effect::Cancel(CancelTarget::Many(tasks))
}

/// Cancel the task yielding the effect.
pub fn cancel_self() -> Effect {
    Effect::Cancel(CancelTarget::SelfTask)
}

pub fn cancelled() -> Effect {
    Effect::Cancelled
}

pub fn get_context(key: impl Into<String>) -> Effect {
    Effect::GetContext(key.into())
}

pub fn set_context<I, K>(props: I) -> Effect
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    Effect::SetContext(props.into_iter().map(|(k, v)| (k.into(), v)).collect())
}

/// Emit `action` on the default channel.
pub fn put(action: Action) -> Effect {
    Effect::Put {
        channel: None,
        action,
    }
}

pub fn put_on(
    channel: Channel,
    action: Action,
) -> Effect {
    Effect::Put {
        channel: Some(channel),
        action,
    }
}

/// Wait for an action matching `pattern` on the default channel.
pub fn take(pattern: impl Into<Pattern>) -> Effect {
    Effect::Take {
        channel: None,
        pattern: pattern.into(),
        maybe: false,
    }
}

pub fn take_from(channel: Channel) -> Effect {
    Effect::Take {
        channel: Some(channel),
        pattern: Pattern::Any,
        maybe: false,
    }
}

/// Like [`take`], but END is received as an action.
pub fn take_maybe(pattern: impl Into<Pattern>) -> Effect {
    Effect::Take {
        channel: None,
        pattern: pattern.into(),
        maybe: true,
    }
}

pub fn take_maybe_from(channel: Channel) -> Effect {
    Effect::Take {
        channel: Some(channel),
        pattern: Pattern::Any,
        maybe: true,
    }
}

/// Run every item; resolve with all results in order.
pub fn all(items: Vec<Yielded>) -> Effect {
    Effect::All(Shape::List(items))
}

pub fn all_keyed(items: IndexMap<String, Yielded>) -> Effect {
    Effect::All(Shape::Keyed(items))
}

/// Run every item; resolve with the first result, cancelling the rest.
pub fn race(items: Vec<Yielded>) -> Effect {
    Effect::Race(Shape::List(items))
}

pub fn race_keyed(items: IndexMap<String, Yielded>) -> Effect {
    Effect::Race(Shape::Keyed(items))
}

/// Start queueing actions matching `pattern` and resolve with the queue.
///
/// With `limit`, actions arriving while the queue is full are dropped.
pub fn action_channel(
    pattern: impl Into<Pattern>,
    limit: Option<usize>,
) -> Effect {
    Effect::ActionChannel {
        pattern: pattern.into(),
        limit,
    }
}

/// Drain `channel`; resolves with the buffered actions as a list, or with
/// END when the channel is closed and empty.
pub fn flush(channel: Channel) -> Effect {
    Effect::Flush(channel)
}

/// Call a function that reports its result through a callback.
pub fn cps<F>(
    name: impl Into<String>,
    func: F,
    args: Vec<Value>,
) -> Effect
where
    F: Fn(&[Value], Callback) -> SagaResult<()> + 'static,
{
    Effect::Cps(CpsDesc {
        name: name.into(),
        func: Rc::new(func),
        args,
    })
}

/// Effect handled by an executor registered under `kind`.
pub fn custom(
    kind: impl Into<String>,
    payload: Value,
) -> Effect {
    Effect::Custom {
        kind: kind.into(),
        payload,
    }
}
