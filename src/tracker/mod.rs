//! 任务进度追踪模块
//!
//! - `message.rs`: 推送帧解码、任务状态、显示百分比
//! - `channel.rs`: 单任务进度通道状态机
//! - `connector.rs`: 推送连接（WebSocket）
//! - `registry.rs`: 每个任务至多一个通道的注册表
//! - `reconciler.rs`: 周期对账服务端活跃任务
//! - `submitter.rs`: 提交下载并注册返回的任务
//! - `scheduler.rs`: 可替换的周期调度
//! - `sink.rs`: 界面回调接口

mod channel;
mod connector;
mod message;
mod reconciler;
mod registry;
mod scheduler;
mod sink;
mod submitter;

#[cfg(test)]
mod testing;

pub use channel::{ChannelEffect, JobSnapshot, ProgressChannel};
pub use connector::{push_url, FrameStream, PushConnector, WsConnector};
pub use message::{
    clamp_progress, decode_frame, display_percent, JobStatus, ProgressUpdate, ProgressView,
};
pub use reconciler::{ActiveJobReconciler, ReconcileOutcome};
pub use registry::ProgressRegistry;
pub use scheduler::{ScheduleHandle, Scheduler, TickFuture, TickTask, TokioScheduler};
pub use sink::{CloseReason, LogProgressSink, ProgressSink};
pub use submitter::JobSubmitter;
