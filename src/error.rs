//! 客户端错误类型
//!
//! 所有错误都不会终止页面运行时：调用方记录日志后降级为"无更新"或"走网络"

use thiserror::Error;

/// 客户端运行时错误
#[derive(Debug, Error)]
pub enum ClientError {
    /// 网络传输失败（提交、轮询、推送通道、资源抓取）
    #[error("网络错误: {0}")]
    Transport(String),

    /// 服务端返回非 2xx 状态码
    #[error("服务端返回异常状态码 {status}: {url}")]
    HttpStatus { status: u16, url: String },

    /// JSON 解析失败
    #[error("解析错误: {0}")]
    Decode(#[from] serde_json::Error),

    /// 服务端负载缺少预期字段
    #[error("服务端负载格式异常: {0}")]
    MalformedPayload(String),

    /// 推送通道建立失败
    #[error("推送通道连接失败 ({job_id}): {reason}")]
    Connect { job_id: String, reason: String },

    /// 缓存存储不可用（配额、磁盘等）
    #[error("缓存存储错误: {0}")]
    Store(String),

    /// 网络不可用且缓存中也没有可用副本
    #[error("离线且无缓存副本: {0}")]
    Offline(String),

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if let (Some(status), Some(url)) = (e.status(), e.url()) {
            return ClientError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            };
        }
        ClientError::Transport(e.to_string())
    }
}

impl ClientError {
    /// 是否属于网络层面的失败（用于决定是否走缓存回退）
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            ClientError::Transport(_) | ClientError::Connect { .. } | ClientError::Offline(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
