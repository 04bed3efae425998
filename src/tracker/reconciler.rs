//! 活跃任务对账
//!
//! 启动时立即执行一次，之后按固定间隔轮询 `/status`，把服务端仍在运行的任务注册进注册表。
//! 页面重载、提交响应丢失、推送通道断开后都靠它恢复；失败只记录日志，下个周期无条件重试

use crate::api::JobApi;
use crate::error::Result;
use crate::tracker::registry::ProgressRegistry;
use crate::tracker::scheduler::{ScheduleHandle, Scheduler};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 一次对账的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcileOutcome {
    /// 服务端报告的活跃任务数
    pub active: usize,
    /// 本次新建的通道数
    pub registered: usize,
}

/// 活跃任务对账器
pub struct ActiveJobReconciler {
    api: Arc<dyn JobApi>,
    registry: Arc<ProgressRegistry>,
    interval: Duration,
}

impl ActiveJobReconciler {
    pub fn new(api: Arc<dyn JobApi>, registry: Arc<ProgressRegistry>, interval: Duration) -> Self {
        Self {
            api,
            registry,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// 查询活跃任务并逐个注册
    pub async fn reconcile(&self) -> Result<ReconcileOutcome> {
        let active = self.api.active_jobs().await?;

        let registered = active
            .iter()
            .filter(|id| self.registry.register(id))
            .count();

        if registered > 0 {
            info!("对账发现 {} 个未追踪的活跃任务", registered);
        }
        Ok(ReconcileOutcome {
            active: active.len(),
            registered,
        })
    }

    /// 对账一次，吞掉错误
    async fn tick(&self) {
        match self.reconcile().await {
            Ok(outcome) => debug!(
                "对账完成: 活跃 {} 个, 新注册 {} 个",
                outcome.active, outcome.registered
            ),
            Err(e) => warn!("活跃任务对账失败，{:?} 后重试: {}", self.interval, e),
        }
    }

    /// 立即对账一次，然后按固定间隔周期执行
    pub async fn start(self: Arc<Self>, scheduler: &dyn Scheduler) -> ScheduleHandle {
        self.tick().await;

        let this = Arc::clone(&self);
        scheduler.every(
            self.interval,
            Box::new(move || {
                let this = Arc::clone(&this);
                Box::pin(async move { this.tick().await })
            }),
        )
    }
}
