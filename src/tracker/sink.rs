//! 进度展示接口
//!
//! 运行时只依赖这个接口，不关心具体界面（进度条、终端、日志）

use crate::tracker::message::ProgressView;
use std::fmt;
use tracing::{debug, info, warn};

/// 通道关闭原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// 收到 completed，宽限期后关闭
    Completed,
    /// 收到 failed，立即关闭
    Failed,
    /// 服务端主动关闭连接
    StreamEnded,
    /// 连接中途出错
    TransportError(String),
    /// 连接未能建立
    ConnectFailed(String),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Completed => write!(f, "任务完成"),
            CloseReason::Failed => write!(f, "任务失败"),
            CloseReason::StreamEnded => write!(f, "服务端关闭连接"),
            CloseReason::TransportError(e) => write!(f, "连接错误: {}", e),
            CloseReason::ConnectFailed(e) => write!(f, "连接失败: {}", e),
        }
    }
}

/// 界面回调
pub trait ProgressSink: Send + Sync {
    /// 第一次可见更新时取消隐藏
    fn reveal(&self, job_id: &str);

    /// 刷新进度条
    fn progress(&self, job_id: &str, view: ProgressView);

    /// 标记完成
    fn done(&self, job_id: &str);

    /// 标记失败（覆盖之前显示的进度）
    fn error(&self, job_id: &str);

    /// 通道已关闭并从注册表移除
    fn closed(&self, job_id: &str, reason: &CloseReason);
}

/// 通过日志输出进度的界面实现（守护进程使用）
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgressSink;

impl ProgressSink for LogProgressSink {
    fn reveal(&self, job_id: &str) {
        debug!("开始显示任务进度: {}", job_id);
    }

    fn progress(&self, job_id: &str, view: ProgressView) {
        info!("任务 {} 进度: {}%", job_id, view.percent);
    }

    fn done(&self, job_id: &str) {
        info!("✓ 任务完成: {}", job_id);
    }

    fn error(&self, job_id: &str) {
        warn!("✗ 任务失败: {}", job_id);
    }

    fn closed(&self, job_id: &str, reason: &CloseReason) {
        info!("🔌 推送通道已关闭: {} ({})", job_id, reason);
    }
}
