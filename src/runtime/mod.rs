//! Runtime system
//!
//! The saga interpreter, leaf-first:
//!
//! - [`scheduler`] - serializes continuations, flattens synchronous chains
//! - [`task`] - task descriptors, fork queues, layered context
//! - [`driver`] - steps coroutines and dispatches what they yield
//! - [`middleware`] - the [`Runtime`](middleware::Runtime) entry point

pub mod awaitable;
pub mod coroutine;
pub mod driver;
pub mod env;
pub mod error;
pub mod middleware;
pub mod scheduler;
pub mod task;
pub mod value;
