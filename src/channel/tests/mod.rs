//! Channel 单元测试

use std::cell::RefCell;
use std::rc::Rc;

use regex::Regex;

use crate::channel::{Channel, Pattern};
use crate::runtime::error::SagaError;
use crate::runtime::value::Action;

fn recorder() -> (Rc<RefCell<Vec<String>>>, impl Fn(&str) -> Box<dyn FnOnce(Action)>) {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = log.clone();
    let make = move |tag: &str| {
        let sink = sink.clone();
        let tag = tag.to_string();
        Box::new(move |action: Action| sink.borrow_mut().push(format!("{}:{}", tag, action.kind)))
            as Box<dyn FnOnce(Action)>
    };
    (log, make)
}

#[test]
fn test_pattern_matching() {
    let ping = Action::new("PING");
    assert!(Pattern::Any.matches(&ping));
    assert!(Pattern::from("*").matches(&ping));
    assert!(Pattern::from("PING").matches(&ping));
    assert!(!Pattern::from("PONG").matches(&ping));
    assert!(Pattern::from(vec!["PONG", "PING"]).matches(&ping));
    assert!(Pattern::from(Regex::new("^PI").unwrap()).matches(&ping));
    assert!(Pattern::predicate(|a| a.kind.len() == 4).matches(&ping));
}

#[test]
fn test_multicast_delivers_to_every_matching_taker() {
    let channel = Channel::multicast();
    let (log, make) = recorder();
    let _ = channel.take(Pattern::Any, make("a"));
    let _ = channel.take(Pattern::from("PING"), make("b"));
    let _ = channel.take(Pattern::from("PONG"), make("c"));

    channel.put(Action::new("PING")).unwrap();
    assert_eq!(*log.borrow(), vec!["a:PING", "b:PING"]);
    assert_eq!(channel.taker_count(), 1);
}

#[test]
fn test_multicast_does_not_buffer() {
    let channel = Channel::multicast();
    channel.put(Action::new("LOST")).unwrap();
    let (log, make) = recorder();
    let _ = channel.take(Pattern::Any, make("a"));
    assert!(log.borrow().is_empty());
}

#[test]
fn test_taker_registered_during_put_waits_for_next_put() {
    let channel = Channel::multicast();
    let log = Rc::new(RefCell::new(Vec::new()));

    let inner_channel = channel.clone();
    let inner_log = log.clone();
    let _ = channel.take(Pattern::Any, move |action| {
        inner_log.borrow_mut().push(format!("first:{}", action.kind));
        let late_log = inner_log.clone();
        let _ = inner_channel.take(Pattern::Any, move |action| {
            late_log.borrow_mut().push(format!("late:{}", action.kind));
        });
    });

    channel.put(Action::new("ONE")).unwrap();
    assert_eq!(*log.borrow(), vec!["first:ONE"]);
    channel.put(Action::new("TWO")).unwrap();
    assert_eq!(*log.borrow(), vec!["first:ONE", "late:TWO"]);
}

#[test]
fn test_cancelled_taker_is_skipped() {
    let channel = Channel::multicast();
    let (log, make) = recorder();
    let cancel = channel.take(Pattern::Any, make("a"));
    cancel();
    assert_eq!(channel.taker_count(), 0);
    channel.put(Action::new("PING")).unwrap();
    assert!(log.borrow().is_empty());
}

#[test]
fn test_close_delivers_end() {
    let channel = Channel::multicast();
    let (log, make) = recorder();
    let _ = channel.take(Pattern::from("NEVER"), make("a"));
    channel.put(Action::end()).unwrap();
    assert!(channel.is_closed());
    let _ = channel.take(Pattern::Any, make("b"));
    assert_eq!(log.borrow().len(), 2);
    assert!(log.borrow().iter().all(|entry| entry.ends_with("@@sagaflow/CHANNEL_END")));
}

#[test]
fn test_buffered_channel_is_fifo() {
    let channel = Channel::buffered();
    channel.put(Action::new("A")).unwrap();
    channel.put(Action::new("B")).unwrap();
    assert_eq!(channel.buffered_len(), 2);

    let (log, make) = recorder();
    let _ = channel.take(Pattern::Any, make("t1"));
    let _ = channel.take(Pattern::Any, make("t2"));
    let _ = channel.take(Pattern::Any, make("t3"));
    channel.put(Action::new("C")).unwrap();
    assert_eq!(*log.borrow(), vec!["t1:A", "t2:B", "t3:C"]);
}

#[test]
fn test_buffered_close_drains_buffer_first() {
    let channel = Channel::buffered();
    channel.put(Action::new("A")).unwrap();
    channel.close();
    let (log, make) = recorder();
    let _ = channel.take(Pattern::Any, make("t1"));
    let _ = channel.take(Pattern::Any, make("t2"));
    assert_eq!(log.borrow()[0], "t1:A");
    assert!(log.borrow()[1].starts_with("t2:@@"));
}

#[test]
fn test_fixed_buffer_overflow() {
    let channel = Channel::fixed(1);
    channel.put(Action::new("A")).unwrap();
    assert_eq!(
        channel.put(Action::new("B")),
        Err(SagaError::BufferOverflow(1))
    );
}

#[test]
fn test_flush_drains_buffer() {
    let channel = Channel::buffered();
    channel.put(Action::new("A")).unwrap();
    channel.put(Action::new("B")).unwrap();

    let flushed: Vec<String> = channel.flush().into_iter().map(|a| a.kind).collect();
    assert_eq!(flushed, vec!["A", "B"]);
    assert_eq!(channel.buffered_len(), 0);
    assert!(Channel::multicast().flush().is_empty());
}

#[test]
fn test_forward_queues_matching_actions() {
    let source = Channel::multicast();
    let queue = Channel::buffered();
    queue.forward_from(&source, Pattern::from("JOB"));

    source.put(Action::new("JOB")).unwrap();
    source.put(Action::new("OTHER")).unwrap();
    source.put(Action::new("JOB")).unwrap();
    assert_eq!(queue.buffered_len(), 2);
    assert_eq!(source.taker_count(), 1);
}

#[test]
fn test_forward_stops_when_either_side_closes() {
    let source = Channel::multicast();
    let queue = Channel::buffered();
    queue.forward_from(&source, Pattern::Any);
    queue.close();
    assert_eq!(source.taker_count(), 0);

    let queue = Channel::buffered();
    queue.forward_from(&source, Pattern::Any);
    source.put(Action::new("A")).unwrap();
    source.close();
    assert!(queue.is_closed());
    assert_eq!(queue.buffered_len(), 1);
}

#[test]
fn test_forward_into_full_queue_drops_action() {
    let source = Channel::multicast();
    let queue = Channel::fixed(1);
    queue.forward_from(&source, Pattern::Any);

    source.put(Action::new("A")).unwrap();
    source.put(Action::new("B")).unwrap();
    let kept: Vec<String> = queue.flush().into_iter().map(|a| a.kind).collect();
    assert_eq!(kept, vec!["A"]);
    // Still forwarding after the drop.
    source.put(Action::new("C")).unwrap();
    assert_eq!(queue.buffered_len(), 1);
}
