//! 周期调度器
//!
//! 固定间隔触发任务（不带抖动、不指数退避）；测试中可替换为手动调度器

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub type TickFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// 每次触发时调用，返回本次要执行的异步工作
pub type TickTask = Box<dyn FnMut() -> TickFuture + Send>;

/// 周期调度能力
pub trait Scheduler: Send + Sync {
    /// 每隔 `interval` 执行一次 `task`，第一次在一个间隔之后
    fn every(&self, interval: Duration, task: TickTask) -> ScheduleHandle;
}

/// 调度句柄，用于停止周期任务
#[derive(Debug, Clone)]
pub struct ScheduleHandle {
    cancel_token: CancellationToken,
}

impl ScheduleHandle {
    pub fn new(cancel_token: CancellationToken) -> Self {
        Self { cancel_token }
    }

    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// 基于 tokio 定时器的调度器
#[derive(Debug, Default)]
pub struct TokioScheduler {
    /// 父取消令牌，`shutdown` 时停止所有周期任务
    cancel_token: CancellationToken,
}

impl TokioScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// 停止所有由本调度器创建的周期任务
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}

impl Scheduler for TokioScheduler {
    fn every(&self, period: Duration, mut task: TickTask) -> ScheduleHandle {
        let cancel_token = self.cancel_token.child_token();
        let token = cancel_token.clone();

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            // 单次执行超时不会导致之后连续补发
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => task().await,
                    _ = token.cancelled() => {
                        tracing::debug!("周期任务已停止 (间隔 {:?})", period);
                        break;
                    }
                }
            }
        });

        ScheduleHandle::new(cancel_token)
    }
}
