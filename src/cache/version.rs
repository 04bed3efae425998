//! 缓存版本
//!
//! 每次安装生成一个版本号：`<前缀>-<毫秒时间戳>`，进程内严格递增，永不复用

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

static LAST_STAMP: AtomicI64 = AtomicI64::new(0);

/// 取一个严格大于上次结果的毫秒时间戳
fn next_stamp() -> i64 {
    let now = chrono::Utc::now().timestamp_millis();
    let previous = LAST_STAMP
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(now.max(last + 1))
        })
        .unwrap_or(now);
    now.max(previous + 1)
}

/// 缓存版本号
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheVersion {
    tag: String,
}

impl CacheVersion {
    /// 生成新版本
    pub fn generate(version_prefix: &str) -> Self {
        Self {
            tag: format!("{}-{}", version_prefix, next_stamp()),
        }
    }

    /// 使用已知的版本号（测试或固定部署）
    pub fn from_tag(tag: impl Into<String>) -> Self {
        Self { tag: tag.into() }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// 完整的缓存名：`<缓存名前缀>-<版本号>`
    pub fn cache_name(&self, name_prefix: &str) -> String {
        format!("{}-{}", name_prefix, self.tag)
    }

    /// 从缓存名末段取出时间戳，不是本格式时返回 None
    pub fn stamp_of(cache_name: &str) -> Option<i64> {
        cache_name
            .rsplit_once('-')
            .and_then(|(_, stamp)| stamp.parse().ok())
    }
}

impl fmt::Display for CacheVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag)
    }
}
