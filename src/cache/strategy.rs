// 请求路由规则

use crate::cache::types::AssetRequest;
use crate::config::CacheConfig;

/// 抓取策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStrategy {
    /// 不经过缓存，原样走网络
    Bypass,
    /// 网络优先，成功时刷新缓存，失败时回退缓存
    NetworkFirst,
    /// 缓存优先，未命中走网络，再失败回退离线文档
    CacheFirst,
}

/// 路由规则，按优先级匹配
#[derive(Debug, Clone)]
pub struct RoutingRules {
    bypass_prefixes: Vec<String>,
    static_prefix: String,
}

impl RoutingRules {
    pub fn new(bypass_prefixes: Vec<String>, static_prefix: impl Into<String>) -> Self {
        Self {
            bypass_prefixes,
            static_prefix: static_prefix.into(),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.bypass_prefixes.clone(), config.static_prefix.clone())
    }

    pub fn route(&self, request: &AssetRequest) -> FetchStrategy {
        // 只有 GET 能进缓存
        if !request.is_get() {
            return FetchStrategy::Bypass;
        }

        let path = request.path();
        if self.bypass_prefixes.iter().any(|p| path.starts_with(p.as_str())) {
            return FetchStrategy::Bypass;
        }

        if request.accepts_html() || path.starts_with(self.static_prefix.as_str()) {
            return FetchStrategy::NetworkFirst;
        }

        FetchStrategy::CacheFirst
    }
}
