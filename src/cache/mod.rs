//! 离线资源缓存模块
//!
//! - `types.rs`: 请求/响应结构
//! - `version.rs`: 带时间戳的缓存版本
//! - `store.rs`: 存储抽象与内存实现
//! - `fs_store.rs`: 磁盘实现
//! - `network.rs`: 上游抓取
//! - `strategy.rs`: 路由规则（绕过 / 网络优先 / 缓存优先）
//! - `worker.rs`: 安装、激活、抓取拦截、控制消息
//! - `host.rs`: 活动版本与等待版本的切换

mod fs_store;
mod host;
mod network;
mod store;
mod strategy;
mod types;
mod version;
mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub(crate) use network::is_hop_by_hop;

pub use fs_store::{FsCacheStore, NAMESPACE_MARKER};
pub use host::{ClientGuard, WorkerHost};
pub use network::{HttpNetwork, Network};
pub use store::{CacheStore, MemoryCacheStore};
pub use strategy::{FetchStrategy, RoutingRules};
pub use types::{AssetRequest, AssetResponse};
pub use version::CacheVersion;
pub use worker::{
    ActivateReport, AssetWorker, ControlMessage, FetchOutcome, InstallReport, ResponseSource,
    WorkerPhase,
};
