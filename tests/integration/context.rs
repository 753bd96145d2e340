//! Context integration tests

use std::rc::Rc;

use sagaflow::effects::{all, fork, get_context, join, set_context};
use sagaflow::{coroutine, once, Deferred, Input, Runtime, SagaError, Step, Value, Yielded};

/// Waits on `gate`, then reads `keys` and writes `own` into its own layer.
fn reader(
    gate: &Deferred,
    keys: &'static [&'static str],
) -> Box<dyn sagaflow::Coroutine> {
    let gate = gate.clone();
    let mut phase = 0;
    coroutine("reader", move |input| {
        phase += 1;
        match (phase, input) {
            (1, Input::Next(_)) => Ok(Step::Yield(Yielded::Awaitable(Rc::new(gate.clone())))),
            (2, Input::Next(_)) => Ok(Step::Yield(Yielded::Effect(set_context([(
                "own",
                Value::from("child"),
            )])))),
            (3, Input::Next(_)) => Ok(Step::Yield(Yielded::Effect(all(
                keys.iter()
                    .map(|key| Yielded::Effect(get_context(*key)))
                    .collect(),
            )))),
            (_, Input::Next(value)) => Ok(Step::Done(value)),
            (_, Input::Throw(error)) => Err(error),
            (_, Input::Finalize(_)) => Ok(Step::Done(Value::Unit)),
        }
    })
}

#[test]
fn test_child_sees_only_writes_before_its_creation() {
    let runtime = Runtime::builder()
        .context([("env", Value::from("test"))])
        .build();
    let gate = Deferred::new();
    let mut phase = 0;
    let mut child_task = None;

    let task = runtime.run({
        let gate = gate.clone();
        coroutine("parent", move |input| {
            phase += 1;
            match (phase, input) {
                (1, Input::Next(_)) => Ok(Step::Yield(Yielded::Effect(set_context([(
                    "early",
                    Value::Int(1),
                )])))),
                (2, Input::Next(_)) => {
                    let gate = gate.clone();
                    Ok(Step::Yield(Yielded::Effect(fork(
                        "reader",
                        move |_| {
                            Ok(Yielded::Coroutine(reader(
                                &gate,
                                &["early", "late", "env", "own"],
                            )))
                        },
                        vec![],
                    ))))
                }
                (3, Input::Next(Value::Task(child))) => {
                    child_task = Some(child);
                    Ok(Step::Yield(Yielded::Effect(set_context([
                        ("late", Value::Int(2)),
                        ("early", Value::Int(3)),
                    ]))))
                }
                (4, Input::Next(_)) => match child_task.take() {
                    Some(child) => Ok(Step::Yield(Yielded::Effect(join(child)))),
                    None => Err(SagaError::msg("reader was not forked")),
                },
                (5, Input::Next(value)) => Ok(Step::Yield(Yielded::Effect(all(vec![
                    Yielded::Value(value),
                    Yielded::Effect(get_context("own")),
                    Yielded::Effect(get_context("early")),
                ])))),
                (_, Input::Next(value)) => Ok(Step::Done(value)),
                (_, Input::Throw(error)) => Err(error),
                (_, Input::Finalize(_)) => Ok(Step::Done(Value::Unit)),
            }
        })
    });
    assert!(task.is_running());

    gate.resolve(Value::Unit);

    let child_reads = Value::List(vec![
        Value::Int(1),
        Value::Unit,
        Value::from("test"),
        Value::from("child"),
    ]);
    assert_eq!(
        task.result(),
        Some(Value::List(vec![child_reads, Value::Unit, Value::Int(3)]))
    );
}

#[test]
fn test_runtime_context_visible_to_later_roots_only() {
    let runtime = Runtime::new();
    let gate = Deferred::new();
    let early = runtime.run(reader(&gate, &["api"]));

    runtime.set_context([("api", Value::from("http://localhost"))]);
    let late = runtime.run(once("late", Yielded::Effect(get_context("api"))));

    gate.resolve(Value::Unit);
    assert_eq!(early.result(), Some(Value::List(vec![Value::Unit])));
    assert_eq!(late.result(), Some(Value::from("http://localhost")));
    assert_eq!(runtime.context().get("own"), None);
}
