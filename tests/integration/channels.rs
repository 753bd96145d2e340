//! Channel integration tests

use std::cell::RefCell;
use std::rc::Rc;

use regex::Regex;

use sagaflow::effects::{
    action_channel, flush, put, put_on, take, take_every, take_from, take_maybe,
};
use sagaflow::{
    coroutine, once, sequence, Action, Channel, Deferred, Input, Runtime, SagaError, Step,
    TaskStatus, Value, Yielded,
};

use crate::common::new_log;

#[test]
fn test_take_waits_for_matching_action() {
    let runtime = Runtime::new();
    let task = runtime.run(once("waiter", Yielded::Effect(take(vec!["B", "C"]))));

    runtime.dispatch(Action::new("A"));
    assert!(task.is_running());

    runtime.dispatch(Action::new("C"));
    assert_eq!(task.result(), Some(Value::Action(Action::new("C"))));
}

#[test]
fn test_regex_pattern() {
    let runtime = Runtime::new();
    let pattern = Regex::new("^user/").expect("valid regex");
    let task = runtime.run(once("waiter", Yielded::Effect(take(pattern))));

    runtime.dispatch(Action::new("admin/login"));
    runtime.dispatch(Action::new("user/login"));
    assert_eq!(task.result(), Some(Value::Action(Action::new("user/login"))));
}

#[test]
fn test_put_reaches_other_saga() {
    let runtime = Runtime::new();
    let taker = runtime.run(once("taker", Yielded::Effect(take("PING"))));
    let ping = Action::with_payload("PING", Value::Int(1));
    let pinger = runtime.run(once("pinger", Yielded::Effect(put(ping.clone()))));

    assert_eq!(taker.result(), Some(Value::Action(ping.clone())));
    assert_eq!(pinger.result(), Some(Value::Action(ping)));
}

#[test]
fn test_take_every_forks_per_action_until_close() {
    let runtime = Runtime::new();
    let seen = new_log();
    let task = runtime.run(take_every("JOB", "worker", {
        let seen = seen.clone();
        move |args| {
            let payload = args
                .first()
                .and_then(Value::as_action)
                .map(|action| action.payload.to_string())
                .unwrap_or_default();
            seen.borrow_mut().push(payload);
            Ok(Yielded::Value(Value::Unit))
        }
    }));

    runtime.dispatch(Action::with_payload("JOB", Value::Int(1)));
    runtime.dispatch(Action::with_payload("JOB", Value::Int(2)));
    runtime.dispatch(Action::new("OTHER"));
    runtime.dispatch(Action::with_payload("JOB", Value::Int(3)));
    assert!(task.is_running());
    assert_eq!(*seen.borrow(), vec!["1", "2", "3"]);

    runtime.channel().close();
    assert_eq!(task.status(), TaskStatus::Done);
}

#[test]
fn test_end_terminates_take_but_not_take_maybe() {
    let runtime = Runtime::new();
    let plain = runtime.run(sequence(
        "plain",
        vec![
            Yielded::Effect(take("X")),
            Yielded::Value(Value::from("unreachable")),
        ],
    ));
    let maybe = runtime.run(once("maybe", Yielded::Effect(take_maybe("X"))));

    runtime.channel().close();

    assert_eq!(plain.result(), Some(Value::Unit));
    assert_eq!(maybe.result(), Some(Value::Action(Action::end())));

    // Takes on a closed channel see END at once.
    let late = runtime.run(once("late", Yielded::Effect(take_maybe("X"))));
    assert_eq!(late.result(), Some(Value::Action(Action::end())));
}

#[test]
fn test_buffered_channel_queues_until_taken() {
    let runtime = Runtime::new();
    let chan = Channel::buffered();
    let producer = runtime.run(sequence(
        "producer",
        vec![
            Yielded::Effect(put_on(chan.clone(), Action::new("first"))),
            Yielded::Effect(put_on(chan.clone(), Action::new("second"))),
        ],
    ));
    assert_eq!(producer.status(), TaskStatus::Done);
    assert_eq!(chan.buffered_len(), 2);

    let one = runtime.run(once("one", Yielded::Effect(take_from(chan.clone()))));
    let two = runtime.run(once("two", Yielded::Effect(take_from(chan.clone()))));
    assert_eq!(one.result(), Some(Value::Action(Action::new("first"))));
    assert_eq!(two.result(), Some(Value::Action(Action::new("second"))));
    assert_eq!(chan.buffered_len(), 0);
}

#[test]
fn test_fixed_buffer_overflow_aborts_producer() {
    let runtime = Runtime::builder().on_error(|_, _| {}).build();
    let chan = Channel::fixed(1);
    let producer = runtime.run(sequence(
        "producer",
        vec![
            Yielded::Effect(put_on(chan.clone(), Action::new("a"))),
            Yielded::Effect(put_on(chan.clone(), Action::new("b"))),
        ],
    ));

    assert_eq!(producer.error(), Some(SagaError::BufferOverflow(1)));
    assert_eq!(chan.buffered_len(), 1);
}

#[test]
fn test_action_channel_queues_actions_while_busy() {
    let runtime = Runtime::new();
    let busy = Deferred::new();
    let queue: Rc<RefCell<Option<Channel>>> = Rc::new(RefCell::new(None));
    let first = new_log();
    let mut step = 0;
    let task = runtime.run(coroutine("worker", {
        let busy = busy.clone();
        let queue = queue.clone();
        let first = first.clone();
        move |input| {
            step += 1;
            let value = match input {
                Input::Next(value) => value,
                Input::Throw(error) => return Err(error),
                Input::Finalize(_) => return Ok(Step::Done(Value::Unit)),
            };
            match step {
                1 => Ok(Step::Yield(Yielded::Effect(action_channel("REQ", None)))),
                2 => {
                    *queue.borrow_mut() = value.as_channel().cloned();
                    Ok(Step::Yield(Yielded::Awaitable(Rc::new(busy.clone()))))
                }
                3 => {
                    let chan = queue.borrow().clone().expect("action channel");
                    Ok(Step::Yield(Yielded::Effect(take_from(chan))))
                }
                4 => {
                    first.borrow_mut().push(value.to_string());
                    let chan = queue.borrow().clone().expect("action channel");
                    Ok(Step::Yield(Yielded::Effect(flush(chan))))
                }
                _ => Ok(Step::Done(value)),
            }
        }
    }));

    runtime.dispatch(Action::with_payload("REQ", Value::Int(1)));
    runtime.dispatch(Action::new("NOISE"));
    runtime.dispatch(Action::with_payload("REQ", Value::Int(2)));
    assert!(task.is_running());
    assert_eq!(queue.borrow().as_ref().map(Channel::buffered_len), Some(2));

    busy.resolve(Value::Unit);
    assert_eq!(first.borrow().len(), 1);
    assert_eq!(
        task.result(),
        Some(Value::List(vec![Value::Action(Action::with_payload(
            "REQ",
            Value::Int(2)
        ))]))
    );
}

#[test]
fn test_flush_of_closed_empty_channel_is_end() {
    let runtime = Runtime::new();
    let chan = Channel::buffered();
    let open = runtime.run(once("open", Yielded::Effect(flush(chan.clone()))));
    assert_eq!(open.result(), Some(Value::List(Vec::new())));

    chan.close();
    let closed = runtime.run(once("closed", Yielded::Effect(flush(chan))));
    assert_eq!(closed.result(), Some(Value::Action(Action::end())));
}

#[test]
fn test_action_channel_closes_with_default_channel() {
    let runtime = Runtime::new();
    let task = runtime.run(once(
        "subscriber",
        Yielded::Effect(action_channel("REQ", Some(1))),
    ));
    let chan = task
        .result()
        .as_ref()
        .and_then(Value::as_channel)
        .cloned()
        .expect("action channel");

    runtime.dispatch(Action::new("REQ"));
    runtime.dispatch(Action::new("REQ"));
    assert_eq!(chan.buffered_len(), 1);

    runtime.channel().close();
    assert!(chan.is_closed());
}
