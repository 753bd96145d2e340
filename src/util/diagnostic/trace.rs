//! 错误追踪累加器
//!
//! When an uncaught error aborts a task, the task appends one frame here;
//! the abort then bubbles to the parent which appends its own frame, and so
//! on up to the root, which renders the whole stack for the reporter and
//! clears it. A coroutine that catches the error clears it as well.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::runtime::task::TaskMeta;

/// 一棵任务树共享的追踪
///
/// Every root task owns one; attached descendants share their root's.
pub type SharedTrace = Rc<RefCell<ErrorTrace>>;

/// One aborted task on the way to the root.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceFrame {
    /// The aborted task
    pub meta: TaskMeta,
    /// Sibling tasks cancelled as collateral of the abort
    pub cancelled_tasks: Vec<String>,
    /// Effect that was executing when the error was raised, if known
    pub crashed_effect: Option<String>,
}

/// 错误追踪累加器
#[derive(Debug, Default, Clone)]
pub struct ErrorTrace {
    /// 帧列表，最先中止的任务在前
    frames: Vec<TraceFrame>,
    /// 最近一次失败的 effect 描述
    crashed_effect: Option<String>,
}

impl ErrorTrace {
    /// 创建空的追踪
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录失败的 effect
    pub fn set_crashed_effect(
        &mut self,
        description: impl Into<String>,
    ) {
        self.crashed_effect = Some(description.into());
    }

    /// 添加帧，并附上当前失败的 effect
    pub fn add_frame(
        &mut self,
        meta: TaskMeta,
        cancelled_tasks: Vec<String>,
    ) {
        self.frames.push(TraceFrame {
            meta,
            cancelled_tasks,
            crashed_effect: self.crashed_effect.clone(),
        });
    }

    /// 清空
    pub fn clear(&mut self) {
        self.frames.clear();
        self.crashed_effect = None;
    }

    /// 帧列表
    pub fn frames(&self) -> &[TraceFrame] {
        &self.frames
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Render the accumulated frames as a saga stack.
    pub fn render(&self) -> String {
        let Some((first, others)) = self.frames.split_first() else {
            return String::new();
        };

        let mut lines = Vec::with_capacity(self.frames.len() + 2);
        let mut head = format!("The above error occurred in task {}", first.meta);
        if let Some(effect) = &first.crashed_effect {
            head.push_str(&format!("\n when executing effect {}", effect));
        }
        lines.push(head);

        for frame in others {
            lines.push(format!("    created by {}", frame.meta));
        }

        let cancelled: Vec<&String> = self
            .frames
            .iter()
            .flat_map(|frame| frame.cancelled_tasks.iter())
            .collect();
        if !cancelled.is_empty() {
            lines.push("Tasks cancelled due to error:".to_string());
            lines.extend(cancelled.into_iter().cloned());
        }

        lines.join("\n")
    }
}

impl fmt::Display for ErrorTrace {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.render())
    }
}
