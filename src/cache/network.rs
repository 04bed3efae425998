//! 网络抓取
//!
//! 非 2xx 响应不算失败，只有连接/传输层错误才会触发缓存回退

use crate::cache::types::{AssetRequest, AssetResponse};
use crate::error::{ClientError, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use std::time::Duration;
use tracing::debug;

/// 逐跳头，不在代理两端之间转发
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "content-length",
    "host",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub(crate) fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name))
}

/// 网络抓取能力
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &AssetRequest) -> Result<AssetResponse>;
}

/// 通过 reqwest 访问上游
#[derive(Debug, Clone)]
pub struct HttpNetwork {
    client: Client,
    base_url: Url,
}

impl HttpNetwork {
    pub fn new(upstream_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(upstream_url)
            .map_err(|e| ClientError::Config(format!("上游地址无效 {}: {}", upstream_url, e)))?;
        let client = Client::builder()
            .timeout(timeout)
            // 重定向原样交给页面处理
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ClientError::Transport(format!("创建 HTTP 客户端失败: {}", e)))?;
        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &AssetRequest) -> Result<AssetResponse> {
        let url = self
            .base_url
            .join(&request.url)
            .map_err(|e| ClientError::Config(format!("无法拼接地址 {}: {}", request.url, e)))?;
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| ClientError::Config(format!("非法的请求方法 {}: {}", request.method, e)))?;

        let mut builder = self.client.request(method, url.clone());
        for (name, value) in &request.headers {
            if !is_hop_by_hop(name) {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?
            .to_vec();

        debug!("上游响应: {} {} -> {}", request.method, url, status);
        Ok(AssetResponse {
            status,
            headers,
            body,
        })
    }
}
