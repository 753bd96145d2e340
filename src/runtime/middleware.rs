//! Runtime entry point
//!
//! [`Runtime`] owns one environment: it starts root sagas, dispatches
//! actions from outside the interpreter and holds the root context.
//!
//! # Usage
//!
//! ```rust
//! use sagaflow::effects::take;
//! use sagaflow::{sequence, Action, Runtime, Value, Yielded};
//!
//! let runtime = Runtime::new();
//! let task = runtime.run(sequence("waiter", vec![Yielded::Effect(take("PING"))]));
//! assert!(task.is_running());
//!
//! runtime.dispatch(Action::new("PING"));
//! assert_eq!(task.result(), Some(Value::Action(Action::new("PING"))));
//! ```

use std::fmt;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::channel::Channel;
use crate::effects::{Effect, EffectKind, ExecutorTable};
use crate::runtime::coroutine::Coroutine;
use crate::runtime::driver::{proc, Callback, ExecutionContext, Signal};
use crate::runtime::env::{
    log_error, EffectMiddleware, Env, ErrorInfo, ErrorReporter, SagaMonitor, TracingMonitor,
};
use crate::runtime::error::SagaError;
use crate::runtime::task::{Context, Task, TaskMeta};
use crate::runtime::value::{Action, Value};
use crate::util::config::{MonitorKind, RuntimeConfig};

/// A saga runtime.
pub struct Runtime {
    env: Rc<Env>,
    context: Context,
}

impl Runtime {
    /// Runtime with the standard effects and a multicast channel.
    pub fn new() -> Self {
        RuntimeBuilder::new().build()
    }

    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Runtime configured from `config`.
    pub fn from_config(config: &RuntimeConfig) -> Self {
        RuntimeBuilder::from_config(config).build()
    }

    /// Start `saga` as a root task.
    ///
    /// Everything the saga does synchronously has happened when this
    /// returns.
    pub fn run(
        &self,
        saga: Box<dyn Coroutine>,
    ) -> Task {
        let env = &self.env;
        let effect_id = env.next_effect_id();
        let meta = TaskMeta::new(saga.name());
        if let Some(monitor) = env.monitor() {
            monitor.root_saga_started(effect_id, &meta.name);
        }
        debug!(saga = %meta, "running root saga");

        env.scheduler().run_immediately(|| {
            let task = proc(env, saga, &self.context, effect_id, meta, None, None);
            if let Some(monitor) = env.monitor() {
                monitor.effect_resolved(effect_id, &Signal::Value(Value::Task(task.clone())));
            }
            task
        })
    }

    /// Emit `action` on the runtime's channel.
    pub fn dispatch(
        &self,
        action: Action,
    ) {
        let env = self.env.clone();
        self.env.scheduler().schedule_asap(move || {
            if let Err(error) = env.dispatch(action) {
                warn!(%error, "dispatch failed");
            }
        });
    }

    /// Merge `props` into the root context.
    ///
    /// Root tasks see the writes made before they were started.
    pub fn set_context<I, K>(
        &self,
        props: I,
    ) where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.context.extend(props);
    }

    #[inline]
    pub fn context(&self) -> &Context {
        &self.context
    }

    #[inline]
    pub fn channel(&self) -> &Channel {
        self.env.channel()
    }

    #[inline]
    pub fn env(&self) -> &Rc<Env> {
        &self.env
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("env", &self.env)
            .field("context", &self.context)
            .finish()
    }
}

/// Assembles a [`Runtime`].
pub struct RuntimeBuilder {
    context: Vec<(String, Value)>,
    channel: Option<Channel>,
    monitor: Option<Rc<dyn SagaMonitor>>,
    on_error: Option<ErrorReporter>,
    middlewares: Vec<Rc<dyn EffectMiddleware>>,
    executors: ExecutorTable,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            context: Vec::new(),
            channel: None,
            monitor: None,
            on_error: None,
            middlewares: Vec::new(),
            executors: ExecutorTable::standard(),
        }
    }

    /// Builder seeded with `config`'s monitor and root context.
    pub fn from_config(config: &RuntimeConfig) -> Self {
        let builder = Self::new().context(config.context_values());
        match config.monitor {
            MonitorKind::None => builder,
            MonitorKind::Tracing => builder.monitor(TracingMonitor),
        }
    }

    /// Add initial root context entries.
    pub fn context<I, K>(
        mut self,
        props: I,
    ) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.context
            .extend(props.into_iter().map(|(k, v)| (k.into(), v)));
        self
    }

    /// Use `channel` instead of a fresh multicast channel.
    pub fn channel(
        mut self,
        channel: Channel,
    ) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn monitor(
        self,
        monitor: impl SagaMonitor + 'static,
    ) -> Self {
        self.shared_monitor(Rc::new(monitor))
    }

    /// Install a monitor the caller keeps a handle to.
    pub fn shared_monitor(
        mut self,
        monitor: Rc<dyn SagaMonitor>,
    ) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Reporter for errors escaping a root task. Defaults to logging.
    pub fn on_error(
        mut self,
        on_error: impl Fn(&SagaError, &ErrorInfo) + 'static,
    ) -> Self {
        self.on_error = Some(Rc::new(on_error));
        self
    }

    /// Append an effect middleware; the first added runs outermost.
    pub fn effect_middleware(
        mut self,
        middleware: impl EffectMiddleware + 'static,
    ) -> Self {
        self.middlewares.push(Rc::new(middleware));
        self
    }

    /// Register (or replace) the executor for `kind`.
    pub fn executor(
        mut self,
        kind: EffectKind,
        executor: impl Fn(Effect, Callback, &ExecutionContext) + 'static,
    ) -> Self {
        self.executors.register(kind, executor);
        self
    }

    /// Register an executor for `custom(kind, payload)` effects.
    pub fn custom_executor(
        mut self,
        kind: impl Into<String>,
        executor: impl Fn(Value, Callback, &ExecutionContext) + 'static,
    ) -> Self {
        self.executors.register_custom(kind, executor);
        self
    }

    pub fn build(self) -> Runtime {
        let on_error = self
            .on_error
            .unwrap_or_else(|| Rc::new(log_error) as ErrorReporter);
        let env = Env::new(
            self.executors,
            self.channel.unwrap_or_default(),
            self.monitor,
            on_error,
            self.middlewares,
        );
        Runtime {
            env: Rc::new(env),
            context: Context::with_props(self.context),
        }
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
