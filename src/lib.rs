// Museerr Client Runtime
// 下载管理器客户端运行时：进度追踪 + 离线资源缓存

// 下载服务 API
pub mod api;

// 离线资源缓存
pub mod cache;

// 配置管理模块
pub mod config;

// 错误类型
pub mod error;

// 日志系统
pub mod logging;

// 本地壳代理
pub mod server;

// 任务进度追踪
pub mod tracker;

// 导出常用类型
pub use api::{DownloadKind, DownloadRequest, HttpJobApi, JobApi, JobId};
pub use cache::{
    AssetWorker, CacheStore, FsCacheStore, HttpNetwork, MemoryCacheStore, Network, WorkerHost,
};
pub use config::AppConfig;
pub use error::{ClientError, Result};
pub use server::ProxyState;
pub use tracker::{
    ActiveJobReconciler, JobSubmitter, LogProgressSink, ProgressRegistry, ProgressSink,
    PushConnector, Scheduler, TokioScheduler, WsConnector,
};
