//! Runtime value type for sagaflow
//!
//! `Value` is deliberately small: scalars, strings, lists, ordered maps,
//! actions, task handles and channel handles. Anything richer lives behind
//! an effect.

use std::fmt;

use indexmap::IndexMap;

use crate::channel::Channel;
use crate::runtime::task::Task;

/// Kind used by the END action.
pub const END_KIND: &str = "@@sagaflow/CHANNEL_END";

/// A message travelling through channels.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    /// Action kind, matched by patterns.
    pub kind: String,
    /// Arbitrary payload.
    pub payload: Box<Value>,
}

impl Action {
    /// Create an action without payload.
    #[inline]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: Box::new(Value::Unit),
        }
    }

    /// Create an action carrying a payload.
    #[inline]
    pub fn with_payload(
        kind: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            kind: kind.into(),
            payload: Box::new(payload),
        }
    }

    /// The action delivered to takers once a channel is closed.
    pub fn end() -> Self {
        Self::new(END_KIND)
    }

    /// Whether this is the END action.
    #[inline]
    pub fn is_end(&self) -> bool {
        self.kind == END_KIND
    }
}

impl fmt::Display for Action {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self.payload.as_ref() {
            Value::Unit => write!(f, "{{{}}}", self.kind),
            payload => write!(f, "{{{}: {}}}", self.kind, payload),
        }
    }
}

/// Unified runtime value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    /// Insertion-ordered map (keyed `all`/`race` results, structured payloads)
    Map(IndexMap<String, Value>),
    Action(Action),
    /// Handle to a forked, spawned or root task
    Task(Task),
    /// Handle to a channel, as created by `action_channel`
    Channel(Channel),
}

impl Value {
    /// Type name used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Unit => "unit",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Action(_) => "action",
            Value::Task(_) => "task",
            Value::Channel(_) => "channel",
        }
    }

    #[inline]
    pub fn is_unit(&self) -> bool {
        matches!(self, Value::Unit)
    }

    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    #[inline]
    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    #[inline]
    pub fn as_action(&self) -> Option<&Action> {
        match self {
            Value::Action(action) => Some(action),
            _ => None,
        }
    }

    #[inline]
    pub fn as_task(&self) -> Option<&Task> {
        match self {
            Value::Task(task) => Some(task),
            _ => None,
        }
    }

    #[inline]
    pub fn as_channel(&self) -> Option<&Channel> {
        match self {
            Value::Channel(channel) => Some(channel),
            _ => None,
        }
    }
}

// Tasks and channels compare by identity, everything else structurally.
impl PartialEq for Value {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        match (self, other) {
            (Value::Unit, Value::Unit) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Action(a), Value::Action(b)) => a == b,
            (Value::Task(a), Value::Task(b)) => a.same(b),
            (Value::Channel(a), Value::Channel(b)) => a.same(b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Value::Unit => write!(f, "unit"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(fl) => write!(f, "{}", fl),
            Value::Str(s) => write!(f, "\"{}\"", s),
            Value::List(items) => {
                write!(
                    f,
                    "[{}]",
                    items
                        .iter()
                        .map(|v| v.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            }
            Value::Map(map) => {
                write!(
                    f,
                    "{{{}}}",
                    map.iter()
                        .map(|(k, v)| format!("{}: {}", k, v))
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            }
            Value::Action(action) => write!(f, "{}", action),
            Value::Task(task) => write!(f, "task<{}>", task.meta().name),
            Value::Channel(_) => write!(f, "channel"),
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Unit
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(fl: f64) -> Self {
        Value::Float(fl)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<Action> for Value {
    fn from(action: Action) -> Self {
        Value::Action(action)
    }
}

impl From<Task> for Value {
    fn from(task: Task) -> Self {
        Value::Task(task)
    }
}

impl From<Channel> for Value {
    fn from(channel: Channel) -> Self {
        Value::Channel(channel)
    }
}
