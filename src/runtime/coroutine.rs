//! Resumable coroutines
//!
//! A saga is any value implementing [`Coroutine`]: an explicit state machine
//! that is resumed with the result of the effect it last yielded, can have
//! an error thrown into it, and is finalized when it gets cancelled or its
//! upstream ends.
//!
//! Small sagas are most easily written with [`coroutine`], which wraps a
//! closure receiving each [`Input`].

use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use crate::effects::Effect;
use crate::runtime::awaitable::Awaitable;
use crate::runtime::error::SagaError;
use crate::runtime::value::Value;

/// Result of one coroutine step; `Err` is an uncaught throw.
pub type StepResult = Result<Step, SagaError>;

/// One step of a coroutine.
pub enum Step {
    /// Suspend on `Yielded` until it settles.
    Yield(Yielded),
    /// Finished with a return value.
    Done(Value),
}

impl Step {
    #[inline]
    pub fn is_done(&self) -> bool {
        matches!(self, Step::Done(_))
    }
}

/// Why a coroutine is being finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finalize {
    /// The task, or the effect it was waiting on, was cancelled.
    Cancel,
    /// The channel it was taking from ended.
    Terminate,
}

/// Whatever a coroutine can yield.
pub enum Yielded {
    Effect(Effect),
    Awaitable(Rc<dyn Awaitable>),
    /// A nested coroutine, run as an attached call.
    Coroutine(Box<dyn Coroutine>),
    /// A plain value, handed straight back.
    Value(Value),
}

impl Yielded {
    /// Short human readable form used by monitors and diagnostics.
    pub fn describe(&self) -> String {
        match self {
            Yielded::Effect(effect) => effect.describe(),
            Yielded::Awaitable(_) => "awaitable".to_string(),
            Yielded::Coroutine(co) => format!("coroutine({})", co.name()),
            Yielded::Value(value) => value.to_string(),
        }
    }
}

impl fmt::Debug for Yielded {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "Yielded({})", self.describe())
    }
}

impl From<Effect> for Yielded {
    fn from(effect: Effect) -> Self {
        Yielded::Effect(effect)
    }
}

impl From<Value> for Yielded {
    fn from(value: Value) -> Self {
        Yielded::Value(value)
    }
}

/// Explicitly resumable computation.
pub trait Coroutine {
    /// Resume with the result of the last yielded item (unit on the first
    /// call).
    fn resume(
        &mut self,
        value: Value,
    ) -> StepResult;

    /// Resume by raising `error` at the suspension point.
    fn throw_into(
        &mut self,
        error: SagaError,
    ) -> StepResult {
        Err(error)
    }

    /// Jump to cleanup. The coroutine may still yield effects from here.
    fn finalize(
        &mut self,
        reason: Finalize,
    ) -> StepResult {
        let _ = reason;
        Ok(Step::Done(Value::Unit))
    }

    /// Name used in diagnostics.
    fn name(&self) -> &str {
        "anonymous"
    }
}

/// What a closure coroutine is resumed with.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Next(Value),
    Throw(SagaError),
    Finalize(Finalize),
}

struct FnCoroutine<F> {
    name: String,
    f: F,
}

impl<F> Coroutine for FnCoroutine<F>
where
    F: FnMut(Input) -> StepResult,
{
    fn resume(
        &mut self,
        value: Value,
    ) -> StepResult {
        (self.f)(Input::Next(value))
    }

    fn throw_into(
        &mut self,
        error: SagaError,
    ) -> StepResult {
        (self.f)(Input::Throw(error))
    }

    fn finalize(
        &mut self,
        reason: Finalize,
    ) -> StepResult {
        (self.f)(Input::Finalize(reason))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Build a coroutine from a closure driven by [`Input`]s.
pub fn coroutine<F>(
    name: impl Into<String>,
    f: F,
) -> Box<dyn Coroutine>
where
    F: FnMut(Input) -> StepResult + 'static,
{
    Box::new(FnCoroutine {
        name: name.into(),
        f,
    })
}

struct Sequence {
    name: String,
    items: VecDeque<Yielded>,
}

impl Coroutine for Sequence {
    fn resume(
        &mut self,
        value: Value,
    ) -> StepResult {
        match self.items.pop_front() {
            Some(item) => Ok(Step::Yield(item)),
            None => Ok(Step::Done(value)),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Yield `items` in order, then return the result of the last one.
pub fn sequence(
    name: impl Into<String>,
    items: impl IntoIterator<Item = Yielded>,
) -> Box<dyn Coroutine> {
    Box::new(Sequence {
        name: name.into(),
        items: items.into_iter().collect(),
    })
}

struct Once {
    name: String,
    item: Option<Yielded>,
    started: bool,
}

impl Coroutine for Once {
    fn resume(
        &mut self,
        value: Value,
    ) -> StepResult {
        if self.started {
            return Ok(Step::Done(value));
        }
        self.started = true;
        match self.item.take() {
            Some(Yielded::Value(value)) => Ok(Step::Done(value)),
            Some(item) => Ok(Step::Yield(item)),
            None => Ok(Step::Done(Value::Unit)),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Wrap one yielded item as a coroutine returning its result.
///
/// A plain value completes without suspending.
pub fn once(
    name: impl Into<String>,
    item: Yielded,
) -> Box<dyn Coroutine> {
    Box::new(Once {
        name: name.into(),
        item: Some(item),
        started: false,
    })
}

struct Failing {
    name: String,
    error: Option<SagaError>,
}

impl Coroutine for Failing {
    fn resume(
        &mut self,
        _value: Value,
    ) -> StepResult {
        match self.error.take() {
            Some(error) => Err(error),
            None => Ok(Step::Done(Value::Unit)),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A coroutine that throws `error` on its first step.
pub fn failing(
    name: impl Into<String>,
    error: SagaError,
) -> Box<dyn Coroutine> {
    Box::new(Failing {
        name: name.into(),
        error: Some(error),
    })
}
