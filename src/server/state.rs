// 壳代理状态

use crate::cache::{Network, WorkerHost};
use crate::error::{ClientError, Result};
use reqwest::Url;
use std::sync::Arc;

/// 代理路由共享的状态
#[derive(Clone)]
pub struct ProxyState {
    /// 缓存工作者宿主
    pub host: Arc<WorkerHost>,
    /// 绕过缓存的请求直接走这里
    pub network: Arc<dyn Network>,
    /// 上游服务地址，推送桥接由它推导
    pub upstream_url: Url,
}

impl ProxyState {
    pub fn new(host: Arc<WorkerHost>, network: Arc<dyn Network>, upstream_url: &str) -> Result<Self> {
        let upstream_url = Url::parse(upstream_url)
            .map_err(|e| ClientError::Config(format!("上游地址无效 {}: {}", upstream_url, e)))?;
        Ok(Self {
            host,
            network,
            upstream_url,
        })
    }
}
