//! 诊断支持
//!
//! 收集未捕获错误沿任务树向上传播时留下的帧，并渲染成可读的 saga 调用栈。
//!
//! - [`trace`] - 错误追踪累加器 (ErrorTrace, SharedTrace, TraceFrame)

pub mod trace;

pub use trace::{ErrorTrace, SharedTrace, TraceFrame};
