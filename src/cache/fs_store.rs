//! 磁盘缓存存储
//!
//! 目录结构：`<root>/<命名空间>/<sha256(key)>.json`。
//! 写入先落临时文件再 rename，同键并发写入时最后一次 rename 生效。
//! 命名空间目录里有 [`NAMESPACE_MARKER`] 标记文件；没有标记的目录不是缓存，
//! 既不会被列出也不会被删除

use crate::cache::store::CacheStore;
use crate::cache::types::AssetResponse;
use crate::error::{ClientError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, warn};

/// 命名空间目录的标记文件名
pub const NAMESPACE_MARKER: &str = ".namespace";

/// 磁盘上的一条缓存
#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    /// 原始键，用于校验
    key: String,
    /// 写入时间（毫秒）
    stored_at: i64,
    response: AssetResponse,
}

/// 基于本地目录的缓存存储
#[derive(Debug, Clone)]
pub struct FsCacheStore {
    root: PathBuf,
}

impl FsCacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn namespace_dir(&self, namespace: &str) -> Result<PathBuf> {
        let invalid = namespace.is_empty()
            || namespace == "."
            || namespace == ".."
            || namespace.contains(&['/', '\\'][..]);
        if invalid {
            return Err(ClientError::Store(format!("非法的缓存命名空间: {:?}", namespace)));
        }
        Ok(self.root.join(namespace))
    }

    async fn is_namespace_dir(dir: &std::path::Path) -> bool {
        fs::try_exists(dir.join(NAMESPACE_MARKER))
            .await
            .unwrap_or(false)
    }

    fn entry_file_name(key: &str) -> String {
        format!("{}.json", hex::encode(Sha256::digest(key.as_bytes())))
    }
}

fn store_error(action: &str, e: std::io::Error) -> ClientError {
    ClientError::Store(format!("{}: {}", action, e))
}

#[async_trait]
impl CacheStore for FsCacheStore {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<AssetResponse>> {
        let path = self.namespace_dir(namespace)?.join(Self::entry_file_name(key));

        let content = match fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(store_error("读取缓存失败", e)),
        };

        match serde_json::from_slice::<StoredEntry>(&content) {
            Ok(entry) if entry.key == key => Ok(Some(entry.response)),
            Ok(_) => Ok(None),
            Err(e) => {
                // 损坏的条目按未命中处理，下次写入会覆盖
                warn!("缓存条目损坏，忽略: {:?} - {}", path, e);
                Ok(None)
            }
        }
    }

    async fn put(&self, namespace: &str, key: &str, value: AssetResponse) -> Result<()> {
        let dir = self.namespace_dir(namespace)?;
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| store_error("创建缓存目录失败", e))?;
        if !Self::is_namespace_dir(&dir).await {
            fs::write(dir.join(NAMESPACE_MARKER), namespace)
                .await
                .map_err(|e| store_error("写入命名空间标记失败", e))?;
        }

        let entry = StoredEntry {
            key: key.to_string(),
            stored_at: chrono::Utc::now().timestamp_millis(),
            response: value,
        };
        let content = serde_json::to_vec(&entry)?;

        let file_name = Self::entry_file_name(key);
        let tmp_path = dir.join(format!("{}.{}.tmp", file_name, uuid::Uuid::new_v4()));
        fs::write(&tmp_path, content)
            .await
            .map_err(|e| store_error("写入缓存失败", e))?;
        if let Err(e) = fs::rename(&tmp_path, dir.join(&file_name)).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(store_error("提交缓存失败", e));
        }

        debug!("已缓存 {} -> {}/{}", key, namespace, file_name);
        Ok(())
    }

    async fn list_namespaces(&self) -> Result<Vec<String>> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(store_error("读取缓存目录失败", e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| store_error("读取缓存目录失败", e))?
        {
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir || !Self::is_namespace_dir(&entry.path()).await {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn delete(&self, namespace: &str) -> Result<bool> {
        let dir = self.namespace_dir(namespace)?;
        if !Self::is_namespace_dir(&dir).await {
            if fs::try_exists(&dir).await.unwrap_or(false) {
                warn!("目录不是缓存命名空间，拒绝删除: {:?}", dir);
            }
            return Ok(false);
        }
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(store_error("删除缓存失败", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_put_get_survives_new_instance() {
        let dir = tempdir().unwrap();
        let store = FsCacheStore::new(dir.path());
        let resp = AssetResponse::ok("<html>shell</html>").with_header("content-type", "text/html");
        store.put("museerr-v3-1", "/", resp.clone()).await.unwrap();

        let reopened = FsCacheStore::new(dir.path());
        assert_eq!(reopened.get("museerr-v3-1", "/").await.unwrap(), Some(resp));
        assert!(reopened.get("museerr-v3-1", "/search").await.unwrap().is_none());
        assert!(reopened.get("museerr-v3-2", "/").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_and_delete_namespaces() {
        let dir = tempdir().unwrap();
        let store = FsCacheStore::new(dir.path().join("cache"));
        assert!(store.list_namespaces().await.unwrap().is_empty());

        store.put("a", "/x", AssetResponse::ok("1")).await.unwrap();
        store.put("b", "/x", AssetResponse::ok("2")).await.unwrap();
        assert_eq!(store.list_namespaces().await.unwrap(), vec!["a", "b"]);

        assert!(store.delete("a").await.unwrap());
        assert!(!store.delete("a").await.unwrap());
        assert_eq!(store.list_namespaces().await.unwrap(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_foreign_directories_are_not_namespaces() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("logs")).unwrap();
        std::fs::write(dir.path().join("logs").join("app.log"), b"line").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let store = FsCacheStore::new(dir.path());
        store.put("museerr-v3-1", "/", AssetResponse::ok("shell")).await.unwrap();
        assert_eq!(store.list_namespaces().await.unwrap(), vec!["museerr-v3-1"]);

        assert!(!store.delete("logs").await.unwrap());
        assert!(dir.path().join("logs").join("app.log").exists());
        assert!(dir.path().join("museerr-v3-1").join(NAMESPACE_MARKER).exists());
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let dir = tempdir().unwrap();
        let store = FsCacheStore::new(dir.path());
        store.put("ns", "/x", AssetResponse::ok("1")).await.unwrap();

        let path = dir.path().join("ns").join(FsCacheStore::entry_file_name("/x"));
        std::fs::write(&path, b"{not json").unwrap();
        assert!(store.get("ns", "/x").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let dir = tempdir().unwrap();
        let store = FsCacheStore::new(dir.path());
        assert!(matches!(
            store.put("../evil", "/", AssetResponse::ok("x")).await,
            Err(ClientError::Store(_))
        ));
        assert!(store.delete("..").await.is_err());
    }
}
