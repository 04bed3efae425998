//! 推送通道消息定义
//!
//! 服务端每帧是一个 JSON 对象，`progress` 与 `status` 都是可选字段

use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// 任务状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// 等待中
    Pending,
    /// 运行中
    Running,
    /// 已完成
    Completed,
    /// 失败
    Failed,
}

impl JobStatus {
    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

/// 解码后的进度更新
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressUpdate {
    /// 只有进度，没有状态
    Progress(f64),
    /// 带状态（可附带进度）
    Status {
        status: JobStatus,
        progress: Option<f64>,
    },
    /// 没有任何可识别字段
    Empty,
}

impl ProgressUpdate {
    pub fn progress(&self) -> Option<f64> {
        match self {
            ProgressUpdate::Progress(p) => Some(*p),
            ProgressUpdate::Status { progress, .. } => *progress,
            ProgressUpdate::Empty => None,
        }
    }

    pub fn status(&self) -> Option<JobStatus> {
        match self {
            ProgressUpdate::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(default)]
    progress: Option<Value>,
    #[serde(default)]
    status: Option<Value>,
}

/// 解码一帧推送消息
///
/// 非数字或非有限的 progress、无法识别的 status 都视为缺失
pub fn decode_frame(text: &str) -> Result<ProgressUpdate> {
    let raw: RawFrame = serde_json::from_str(text)?;

    let progress = raw
        .progress
        .as_ref()
        .and_then(Value::as_f64)
        .filter(|p| p.is_finite());

    let status = match raw.status {
        Some(Value::String(s)) => {
            let parsed = JobStatus::parse(&s);
            if parsed.is_none() {
                debug!("忽略未知任务状态: {}", s);
            }
            parsed
        }
        _ => None,
    };

    Ok(match (status, progress) {
        (Some(status), progress) => ProgressUpdate::Status { status, progress },
        (None, Some(p)) => ProgressUpdate::Progress(p),
        (None, None) => ProgressUpdate::Empty,
    })
}

/// 把进度限制在 [0, 100]
pub fn clamp_progress(p: f64) -> f64 {
    p.clamp(0.0, 100.0)
}

/// 界面显示的百分比：`round(clamp(p, 0, 100))`
pub fn display_percent(p: f64) -> u8 {
    clamp_progress(p).round() as u8
}

/// 界面进度条状态
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProgressView {
    /// 进度条宽度（百分比，未取整）
    pub width: f64,
    /// 显示的整数百分比
    pub percent: u8,
}

impl ProgressView {
    pub fn from_progress(p: f64) -> Self {
        Self {
            width: clamp_progress(p),
            percent: display_percent(p),
        }
    }

    pub fn full() -> Self {
        Self::from_progress(100.0)
    }
}
