// 缓存层测试替身

use crate::cache::network::Network;
use crate::cache::store::CacheStore;
use crate::cache::types::{AssetRequest, AssetResponse};
use crate::error::{ClientError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

/// 可编排的网络
#[derive(Default)]
pub(crate) struct FakeNetwork {
    responses: Mutex<HashMap<String, AssetResponse>>,
    unreachable: Mutex<HashSet<String>>,
    offline: AtomicBool,
    calls: Mutex<Vec<String>>,
}

impl FakeNetwork {
    pub(crate) fn serve(&self, url: &str, response: AssetResponse) {
        self.responses.lock().insert(url.to_string(), response);
    }

    pub(crate) fn unreachable(&self, url: &str) {
        self.unreachable.lock().insert(url.to_string());
    }

    pub(crate) fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Network for FakeNetwork {
    async fn fetch(&self, request: &AssetRequest) -> Result<AssetResponse> {
        self.calls
            .lock()
            .push(format!("{} {}", request.method, request.url));

        if self.offline.load(Ordering::SeqCst) || self.unreachable.lock().contains(&request.url) {
            return Err(ClientError::Transport(format!("unreachable: {}", request.url)));
        }
        Ok(self
            .responses
            .lock()
            .get(&request.url)
            .cloned()
            .unwrap_or_else(|| AssetResponse::new(404, "not found")))
    }
}

/// 所有操作都失败的存储
#[derive(Default)]
pub(crate) struct FlakyStore;

#[async_trait]
impl CacheStore for FlakyStore {
    async fn get(&self, _namespace: &str, _key: &str) -> Result<Option<AssetResponse>> {
        Err(ClientError::Store("disk unavailable".to_string()))
    }

    async fn put(&self, _namespace: &str, _key: &str, _value: AssetResponse) -> Result<()> {
        Err(ClientError::Store("disk full".to_string()))
    }

    async fn list_namespaces(&self) -> Result<Vec<String>> {
        Err(ClientError::Store("disk unavailable".to_string()))
    }

    async fn delete(&self, _namespace: &str) -> Result<bool> {
        Err(ClientError::Store("disk unavailable".to_string()))
    }
}
