//! Coroutine helpers built from effects

use crate::channel::Pattern;
use crate::effects::{fork, take, CallFn};
use crate::runtime::coroutine::{Coroutine, Finalize, Step, StepResult, Yielded};
use crate::runtime::error::{SagaError, SagaResult};
use crate::runtime::value::Value;

use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Waiting for a matching action
    Take,
    /// Forking the worker for the action just taken
    Fork,
    Done,
}

/// Two-state machine: take a matching action, fork the worker with it,
/// repeat until the channel ends.
struct TakeEvery {
    name: String,
    pattern: Pattern,
    worker_name: String,
    worker: CallFn,
    state: State,
}

impl Coroutine for TakeEvery {
    fn resume(
        &mut self,
        value: Value,
    ) -> StepResult {
        match self.state {
            State::Take => {
                self.state = State::Fork;
                Ok(Step::Yield(Yielded::Effect(take(self.pattern.clone()))))
            }
            State::Fork => {
                self.state = State::Take;
                let worker = self.worker.clone();
                Ok(Step::Yield(Yielded::Effect(fork(
                    self.worker_name.clone(),
                    move |args| worker(args),
                    vec![value],
                ))))
            }
            State::Done => Ok(Step::Done(value)),
        }
    }

    fn throw_into(
        &mut self,
        error: SagaError,
    ) -> StepResult {
        self.state = State::Done;
        Err(error)
    }

    fn finalize(
        &mut self,
        _reason: Finalize,
    ) -> StepResult {
        self.state = State::Done;
        Ok(Step::Done(Value::Unit))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Fork `worker` with every action matching `pattern`.
///
/// The worker receives the action as its single argument. The loop ends
/// when the channel closes or the task is cancelled.
pub fn take_every<F>(
    pattern: impl Into<Pattern>,
    worker_name: impl Into<String>,
    worker: F,
) -> Box<dyn Coroutine>
where
    F: Fn(&[Value]) -> SagaResult<Yielded> + 'static,
{
    let pattern = pattern.into();
    let worker_name = worker_name.into();
    Box::new(TakeEvery {
        name: format!("takeEvery({}, {})", pattern, worker_name),
        pattern,
        worker_name,
        worker: Rc::new(worker),
        state: State::Take,
    })
}
