//! 单任务进度通道
//!
//! 一个通道对应一个任务 ID 和一条推送连接。状态机：
//! Pending → Running → {Completed, Failed}，终态后忽略后续所有帧。
//! 连接关闭（任何原因）对本通道而言都是终结，不会自动重连

use crate::tracker::connector::FrameStream;
use crate::tracker::message::{clamp_progress, decode_frame, JobStatus, ProgressUpdate, ProgressView};
use crate::tracker::sink::{CloseReason, ProgressSink};
use futures::StreamExt;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// 任务的当前可见状态
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct JobSnapshot {
    pub status: JobStatus,
    /// 已限制在 [0, 100] 内的进度
    pub progress: f64,
}

impl Default for JobSnapshot {
    fn default() -> Self {
        Self {
            status: JobStatus::Pending,
            progress: 0.0,
        }
    }
}

/// 状态转移产生的界面副作用
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEffect {
    Progress(ProgressView),
    Reveal,
    Done,
    Error,
    /// 宽限期后关闭
    CloseAfter(Duration),
    /// 立即关闭
    CloseNow,
}

/// 进度通道状态机
#[derive(Debug)]
pub struct ProgressChannel {
    job_id: String,
    snapshot: JobSnapshot,
    revealed: bool,
    completion_grace: Duration,
}

impl ProgressChannel {
    pub fn new(job_id: impl Into<String>, completion_grace: Duration) -> Self {
        Self {
            job_id: job_id.into(),
            snapshot: JobSnapshot::default(),
            revealed: false,
            completion_grace,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn snapshot(&self) -> JobSnapshot {
        self.snapshot
    }

    pub fn status(&self) -> JobStatus {
        self.snapshot.status
    }

    fn reveal_once(&mut self, effects: &mut Vec<ChannelEffect>) {
        if !self.revealed {
            self.revealed = true;
            effects.push(ChannelEffect::Reveal);
        }
    }

    /// 应用一次更新，返回需要执行的副作用
    ///
    /// 先处理 progress，再处理 status
    pub fn apply(&mut self, update: &ProgressUpdate) -> Vec<ChannelEffect> {
        let mut effects = Vec::new();
        if self.snapshot.status.is_terminal() {
            return effects;
        }

        if let Some(p) = update.progress() {
            let view = ProgressView::from_progress(p);
            self.snapshot.progress = clamp_progress(p);
            if self.snapshot.status == JobStatus::Pending {
                self.snapshot.status = JobStatus::Running;
            }
            effects.push(ChannelEffect::Progress(view));
            self.reveal_once(&mut effects);
        }

        match update.status() {
            Some(JobStatus::Running) => self.snapshot.status = JobStatus::Running,
            Some(JobStatus::Completed) => {
                self.snapshot.status = JobStatus::Completed;
                self.snapshot.progress = 100.0;
                effects.push(ChannelEffect::Progress(ProgressView::full()));
                self.reveal_once(&mut effects);
                effects.push(ChannelEffect::Done);
                effects.push(ChannelEffect::CloseAfter(self.completion_grace));
            }
            Some(JobStatus::Failed) => {
                self.snapshot.status = JobStatus::Failed;
                self.reveal_once(&mut effects);
                effects.push(ChannelEffect::Error);
                effects.push(ChannelEffect::CloseNow);
            }
            // pending 不会让已运行的任务回退
            Some(JobStatus::Pending) | None => {}
        }

        effects
    }

    /// 驱动通道直到关闭
    ///
    /// `observe` 在每次状态变化后收到最新快照
    pub async fn run<F>(
        mut self,
        mut frames: FrameStream,
        sink: &dyn ProgressSink,
        mut observe: F,
    ) -> CloseReason
    where
        F: FnMut(JobSnapshot),
    {
        let mut close_at: Option<Instant> = None;

        loop {
            let next = match close_at {
                Some(deadline) => tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => return CloseReason::Completed,
                    frame = frames.next() => frame,
                },
                None => frames.next().await,
            };

            let text = match next {
                Some(Ok(text)) => text,
                Some(Err(e)) => {
                    if let Some(deadline) = close_at {
                        tokio::time::sleep_until(deadline).await;
                        return CloseReason::Completed;
                    }
                    warn!("推送通道出错: {} - {}", self.job_id, e);
                    return CloseReason::TransportError(e.to_string());
                }
                None => {
                    // 完成后服务端先断开也要保留最终画面直到宽限期结束
                    if let Some(deadline) = close_at {
                        tokio::time::sleep_until(deadline).await;
                        return CloseReason::Completed;
                    }
                    debug!("推送通道被服务端关闭: {}", self.job_id);
                    return CloseReason::StreamEnded;
                }
            };

            let update = match decode_frame(&text) {
                Ok(update) => update,
                Err(e) => {
                    warn!("忽略无法解析的推送帧: {} - {}", self.job_id, e);
                    continue;
                }
            };

            let effects = self.apply(&update);
            if effects.is_empty() {
                continue;
            }
            observe(self.snapshot);

            for effect in effects {
                match effect {
                    ChannelEffect::Progress(view) => sink.progress(&self.job_id, view),
                    ChannelEffect::Reveal => sink.reveal(&self.job_id),
                    ChannelEffect::Done => sink.done(&self.job_id),
                    ChannelEffect::Error => sink.error(&self.job_id),
                    ChannelEffect::CloseAfter(grace) => close_at = Some(Instant::now() + grace),
                    ChannelEffect::CloseNow => return CloseReason::Failed,
                }
            }
        }
    }
}
