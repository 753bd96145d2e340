//! sagaflow
//!
//! A structured-concurrency saga interpreter. Sagas are resumable
//! coroutines that yield effect descriptions; the runtime executes them,
//! feeds the results back, and keeps the tree of forked tasks consistent:
//! a parent completes only after its children, cancellation flows down the
//! tree, errors flow up.
//!
//! # Example
//!
//! ```rust
//! use sagaflow::effects::{call, put};
//! use sagaflow::{sequence, Action, Runtime, Value, Yielded};
//!
//! let runtime = Runtime::new();
//! let task = runtime.run(sequence(
//!     "root",
//!     vec![
//!         Yielded::Effect(put(Action::new("STARTED"))),
//!         Yielded::Effect(call("answer", |_| Ok(Yielded::Value(Value::Int(42))), vec![])),
//!     ],
//! ));
//! assert_eq!(task.result(), Some(Value::Int(42)));
//! ```

#![doc(html_root_url = "https://docs.rs/sagaflow")]
#![warn(rust_2018_idioms)]

// Public modules
pub mod channel;
pub mod effects;
pub mod runtime;

// Utility modules
pub mod util;

// Re-exports
pub use channel::{Channel, Pattern};
pub use effects::{Effect, EffectKind, ExecutorTable};
pub use runtime::awaitable::{Awaitable, Deferred};
pub use runtime::coroutine::{
    coroutine, failing, once, sequence, Coroutine, Finalize, Input, Step, StepResult, Yielded,
};
pub use runtime::driver::{Callback, ExecutionContext, Signal};
pub use runtime::env::{EffectMiddleware, ErrorInfo, Next, SagaMonitor, TracingMonitor};
pub use runtime::error::{SagaError, SagaResult};
pub use runtime::middleware::{Runtime, RuntimeBuilder};
pub use runtime::task::{Context, EffectId, Outcome, Task, TaskMeta, TaskStatus};
pub use runtime::value::{Action, Value};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
