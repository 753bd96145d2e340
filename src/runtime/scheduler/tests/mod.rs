//! Scheduler 单元测试
//!
//! 测试原子执行、重入排队和 FIFO 顺序

use crate::runtime::scheduler::Scheduler;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

#[cfg(test)]
mod scheduler_state_tests {
    use super::*;

    #[test]
    fn test_scheduler_starts_idle() {
        let scheduler = Scheduler::new();
        assert!(scheduler.is_idle());
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_scheduler_busy_inside_exclusive() {
        let scheduler = Scheduler::new();
        let seen = Rc::new(RefCell::new(None));
        let inner = scheduler.clone();
        let seen_in = seen.clone();
        scheduler.run_exclusive(|| {
            *seen_in.borrow_mut() = Some(inner.is_idle());
        });
        assert_eq!(*seen.borrow(), Some(false));
        assert!(scheduler.is_idle());
    }

    #[test]
    fn test_scheduler_debug() {
        let debug = format!("{:?}", Scheduler::default());
        assert!(debug.contains("Scheduler"));
    }
}

#[cfg(test)]
mod ordering_tests {
    use super::*;

    #[test]
    fn test_asap_runs_immediately_when_idle() {
        let scheduler = Scheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = log.clone();
        scheduler.schedule_asap(move || l.borrow_mut().push(1));
        assert_eq!(*log.borrow(), vec![1]);
    }

    #[test]
    fn test_reentrant_requests_drain_after_callback_in_order() {
        let scheduler = Scheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let s = scheduler.clone();
        let l = log.clone();
        scheduler.schedule_asap(move || {
            for i in 0..5 {
                let l2 = l.clone();
                s.schedule_asap(move || l2.borrow_mut().push(i));
            }
            // Nothing queued above may have run yet.
            l.borrow_mut().push(-1);
        });

        assert_eq!(*log.borrow(), vec![-1, 0, 1, 2, 3, 4]);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_nested_requests_keep_fifo() {
        let scheduler = Scheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let s = scheduler.clone();
        let l = log.clone();
        scheduler.schedule_asap(move || {
            let s2 = s.clone();
            let l2 = l.clone();
            s.schedule_asap(move || {
                l2.borrow_mut().push("a");
                let l3 = l2.clone();
                s2.schedule_asap(move || l3.borrow_mut().push("c"));
            });
            let l4 = l.clone();
            s.schedule_asap(move || l4.borrow_mut().push("b"));
        });

        assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_run_immediately_returns_value_then_drains() {
        let scheduler = Scheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let s = scheduler.clone();
        let l = log.clone();
        let value = scheduler.run_immediately(move || {
            let l2 = l.clone();
            s.schedule_asap(move || l2.borrow_mut().push("queued"));
            l.borrow_mut().push("body");
            42
        });

        assert_eq!(value, 42);
        assert_eq!(*log.borrow(), vec!["body", "queued"]);
    }

    #[test]
    fn test_run_immediately_nested_defers_to_outer() {
        let scheduler = Scheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let s = scheduler.clone();
        let l = log.clone();
        scheduler.run_exclusive(|| {
            let s2 = s.clone();
            let l2 = l.clone();
            s.run_immediately(move || {
                let l3 = l2.clone();
                s2.schedule_asap(move || l3.borrow_mut().push("inner-queued"));
            });
            // Still inside the outer job, so the queue must not have drained.
            l.borrow_mut().push("outer");
        });

        assert_eq!(*log.borrow(), vec!["outer"]);
        assert_eq!(scheduler.pending(), 1);
        scheduler.run_immediately(|| ());
        assert_eq!(*log.borrow(), vec!["outer", "inner-queued"]);
    }
}

#[cfg(test)]
mod release_tests {
    use super::*;

    #[test]
    fn test_panic_releases_busy_counter() {
        let scheduler = Scheduler::new();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            scheduler.run_exclusive(|| panic!("job failed"));
        }));
        assert!(result.is_err());
        assert!(scheduler.is_idle());
    }

    #[test]
    fn test_deep_chain_does_not_recurse() {
        // Each job schedules the next one; with trampolining the stack stays flat.
        fn step(
            scheduler: Scheduler,
            remaining: usize,
            count: Rc<RefCell<usize>>,
        ) {
            *count.borrow_mut() += 1;
            if remaining > 0 {
                let s = scheduler.clone();
                scheduler.schedule_asap(move || step(s, remaining - 1, count));
            }
        }

        let scheduler = Scheduler::new();
        let count = Rc::new(RefCell::new(0));
        let s = scheduler.clone();
        let c = count.clone();
        scheduler.schedule_asap(move || step(s, 100_000, c));
        assert_eq!(*count.borrow(), 100_001);
    }
}
