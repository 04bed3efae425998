//! 提交/状态接口的数据结构

use crate::error::{ClientError, Result};
use serde::Deserialize;
use serde_json::Value;

/// 任务 ID（服务端分配，不透明字符串）
pub type JobId = String;

/// 下载类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadKind {
    /// 单曲，响应 `{ "task_id": ... }`
    Track,
    /// 专辑，响应 `{ "tasks": [...] }`
    Album,
    /// 艺人，响应 `{ "tasks": [...] }`
    Artist,
}

impl DownloadKind {
    /// 提交接口路径
    pub fn endpoint(&self) -> &'static str {
        match self {
            DownloadKind::Track => "/download_track",
            DownloadKind::Album => "/download_album",
            DownloadKind::Artist => "/download_artist",
        }
    }
}

/// 下载提交请求（表单编码）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub kind: DownloadKind,
    pub fields: Vec<(String, String)>,
}

impl DownloadRequest {
    pub fn new(kind: DownloadKind) -> Self {
        Self {
            kind,
            fields: Vec::new(),
        }
    }

    pub fn track() -> Self {
        Self::new(DownloadKind::Track)
    }

    pub fn album() -> Self {
        Self::new(DownloadKind::Album)
    }

    pub fn artist() -> Self {
        Self::new(DownloadKind::Artist)
    }

    /// 追加一个表单字段
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }
}

#[derive(Debug, Deserialize)]
struct TrackSubmitResponse {
    task_id: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct BatchSubmitResponse {
    #[serde(default)]
    tasks: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ActiveJobsResponse {
    #[serde(default)]
    active: Option<Value>,
}

/// 数组中的字符串元素；非字符串元素跳过
fn string_items(items: &[Value]) -> Vec<JobId> {
    items
        .iter()
        .filter_map(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// 解析提交接口的响应
///
/// 批量响应缺少 `tasks` 数组时视为空列表（不更新界面），单曲响应缺少 `task_id` 视为格式异常
pub fn parse_submit_response(kind: DownloadKind, body: &str) -> Result<Vec<JobId>> {
    match kind {
        DownloadKind::Track => {
            let resp: TrackSubmitResponse = serde_json::from_str(body)?;
            match resp.task_id {
                Some(Value::String(id)) if !id.is_empty() => Ok(vec![id]),
                // 部分服务端版本返回数字 ID
                Some(Value::Number(n)) => Ok(vec![n.to_string()]),
                _ => Err(ClientError::MalformedPayload(
                    "提交响应缺少 task_id".to_string(),
                )),
            }
        }
        DownloadKind::Album | DownloadKind::Artist => {
            let resp: BatchSubmitResponse = serde_json::from_str(body)?;
            match resp.tasks {
                Some(Value::Array(items)) => Ok(string_items(&items)),
                _ => Ok(Vec::new()),
            }
        }
    }
}

/// 解析 `/status` 响应中的活跃任务列表
pub fn parse_active_jobs(body: &str) -> Result<Vec<JobId>> {
    let resp: ActiveJobsResponse = serde_json::from_str(body)?;
    match resp.active {
        Some(Value::Array(items)) => Ok(string_items(&items)),
        Some(other) => Err(ClientError::MalformedPayload(format!(
            "active 字段不是数组: {}",
            other
        ))),
        None => Err(ClientError::MalformedPayload(
            "状态响应缺少 active 字段".to_string(),
        )),
    }
}
