// 下载服务客户端实现

use crate::api::types::{parse_active_jobs, parse_submit_response, DownloadRequest, JobId};
use crate::error::{ClientError, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use std::time::Duration;
use tracing::debug;

/// 作业提交与活跃任务查询
#[async_trait]
pub trait JobApi: Send + Sync {
    /// 提交下载请求，返回服务端分配的任务 ID
    async fn submit(&self, request: &DownloadRequest) -> Result<Vec<JobId>>;

    /// 查询服务端当前正在运行的任务
    async fn active_jobs(&self) -> Result<Vec<JobId>>;
}

/// 基于 HTTP 的下载服务客户端
#[derive(Debug, Clone)]
pub struct HttpJobApi {
    client: Client,
    base_url: Url,
}

impl HttpJobApi {
    /// 创建客户端
    ///
    /// # 参数
    /// * `base_url` - 上游服务地址
    /// * `timeout` - 单次请求超时
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ClientError::Config(format!("上游地址无效 {}: {}", base_url, e)))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Transport(format!("创建 HTTP 客户端失败: {}", e)))?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| ClientError::Config(format!("无法拼接接口地址 {}: {}", path, e)))
    }
}

#[async_trait]
impl JobApi for HttpJobApi {
    async fn submit(&self, request: &DownloadRequest) -> Result<Vec<JobId>> {
        let url = self.endpoint(request.kind.endpoint())?;
        debug!("提交下载请求: {} ({} 个字段)", url, request.fields.len());

        let body = self
            .client
            .post(url)
            .form(&request.fields)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        parse_submit_response(request.kind, &body)
    }

    async fn active_jobs(&self) -> Result<Vec<JobId>> {
        let url = self.endpoint("/status")?;
        let body = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        parse_active_jobs(&body)
    }
}
