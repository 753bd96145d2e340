//! Log output for sagaflow
//!
//! The runtime reports through `tracing`: scheduler jobs and driver steps at
//! TRACE, task lifecycle at DEBUG, dropped actions and failed dispatches at
//! WARN. Embedding applications usually install their own subscriber; the
//! helpers here are for tests, benches and small hosts.
//!
//! Lines read `LEVEL sagaflow::runtime::driver: message`, so a saga's events
//! can be told apart from the host's. Only `sagaflow` targets follow the
//! chosen level; everything else is kept at WARN.
//!
//! ```rust
//! use sagaflow::util::logger::{self, LogLevel};
//!
//! logger::init_with_level(LogLevel::Debug);
//! tracing::debug!(target: "sagaflow", "runtime ready");
//! ```

use serde::{Deserialize, Serialize};
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer, Registry};

/// Level for `sagaflow` targets, as written in the config file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Install the subscriber at INFO.
pub fn init() -> bool {
    init_with_level(LogLevel::Info)
}

/// Filter passing `sagaflow` events at `level` and everything else at WARN.
pub fn filter_for(level: LogLevel) -> Targets {
    Targets::new()
        .with_default(LevelFilter::WARN)
        .with_target(env!("CARGO_CRATE_NAME"), tracing::Level::from(level))
}

/// Install the subscriber at `level`.
///
/// Returns `false` if a global subscriber was already installed, in which
/// case nothing changes.
pub fn init_with_level(level: LogLevel) -> bool {
    // 无时间戳、无颜色：输出常被测试捕获
    let layer = tracing_subscriber::fmt::layer()
        .without_time()
        .with_target(true)
        .with_ansi(false)
        .with_filter(filter_for(level));

    Registry::default().with(layer).try_init().is_ok()
}

/// Install the subscriber at DEBUG.
pub fn init_debug() -> bool {
    init_with_level(LogLevel::Debug)
}
