//! 在途任务计数器
//!
//! 记录正在执行的 invocation 数量，供 /ping 上报 HealthyBusy。
//! `start()` 返回 RAII 句柄，句柄被消费或 drop 时计数减一，
//! 因此 handler 出错、panic、客户端断开都不会漏减。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::infra::metrics;

/// 在途任务计数器
#[derive(Debug, Default)]
pub struct TaskTracker {
    active: AtomicU64,
}

impl TaskTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记一个任务开始，返回完成句柄
    pub fn start(self: &Arc<Self>) -> TaskHandle {
        self.active.fetch_add(1, Ordering::AcqRel);
        metrics::record_task_started();
        TaskHandle {
            tracker: Arc::clone(self),
            released: false,
        }
    }

    /// 当前在途任务数（非阻塞读取）
    pub fn current(&self) -> u64 {
        self.active.load(Ordering::Acquire)
    }

    /// 减一，已为 0 时保持不变
    fn decrement(&self) {
        let released = self
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        if released.is_ok() {
            metrics::record_task_finished();
        }
    }
}

/// 任务完成句柄
#[must_use = "dropping the handle immediately ends the task"]
#[derive(Debug)]
pub struct TaskHandle {
    tracker: Arc<TaskTracker>,
    released: bool,
}

impl TaskHandle {
    /// 登记任务结束
    pub fn end(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.tracker.decrement();
        }
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.release();
    }
}
