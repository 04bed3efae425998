//! 缓存存储抽象
//!
//! 按命名空间（即带版本的缓存名）隔离，同一键后写覆盖先写，不加锁

use crate::cache::types::AssetResponse;
use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;

/// 缓存存储
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// 读取条目
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<AssetResponse>>;

    /// 写入条目（覆盖同键旧值）
    async fn put(&self, namespace: &str, key: &str, value: AssetResponse) -> Result<()>;

    /// 列出所有命名空间
    async fn list_namespaces(&self) -> Result<Vec<String>>;

    /// 删除整个命名空间，返回是否存在过
    async fn delete(&self, namespace: &str) -> Result<bool>;
}

/// 进程内存储
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    namespaces: DashMap<String, DashMap<String, AssetResponse>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 命名空间中的条目数
    pub fn entry_count(&self, namespace: &str) -> usize {
        self.namespaces.get(namespace).map(|ns| ns.len()).unwrap_or(0)
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<AssetResponse>> {
        Ok(self
            .namespaces
            .get(namespace)
            .and_then(|ns| ns.get(key).map(|entry| entry.value().clone())))
    }

    async fn put(&self, namespace: &str, key: &str, value: AssetResponse) -> Result<()> {
        self.namespaces
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn list_namespaces(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.namespaces.iter().map(|e| e.key().clone()).collect();
        names.sort();
        Ok(names)
    }

    async fn delete(&self, namespace: &str) -> Result<bool> {
        Ok(self.namespaces.remove(namespace).is_some())
    }
}
