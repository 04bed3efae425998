//! 缓存工作者宿主
//!
//! 同一时刻最多一个活动工作者负责抓取，最多一个等待中的新版本。
//! 新版本安装时旧版本继续服务；页面仍打开时新版本停在等待阶段，
//! 直到收到 `SKIP_WAITING` 或所有页面都关闭

use crate::cache::network::Network;
use crate::cache::store::CacheStore;
use crate::cache::types::AssetRequest;
use crate::cache::worker::{ActivateReport, AssetWorker, ControlMessage, FetchOutcome, InstallReport};
use crate::config::CacheConfig;
use crate::error::Result;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

pub struct WorkerHost {
    config: CacheConfig,
    store: Arc<dyn CacheStore>,
    network: Arc<dyn Network>,
    active: RwLock<Option<Arc<AssetWorker>>>,
    waiting: Mutex<Option<Arc<AssetWorker>>>,
    /// 当前打开的页面数（以推送连接计）
    open_clients: AtomicUsize,
    /// 安装串行执行
    install_lock: tokio::sync::Mutex<()>,
}

/// 页面连接守卫，drop 时计数减一
pub struct ClientGuard {
    host: Arc<WorkerHost>,
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        self.host.open_clients.fetch_sub(1, Ordering::SeqCst);
    }
}

impl WorkerHost {
    pub fn new(config: CacheConfig, store: Arc<dyn CacheStore>, network: Arc<dyn Network>) -> Self {
        Self {
            config,
            store,
            network,
            active: RwLock::new(None),
            waiting: Mutex::new(None),
            open_clients: AtomicUsize::new(0),
            install_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn active(&self) -> Option<Arc<AssetWorker>> {
        self.active.read().clone()
    }

    pub fn waiting(&self) -> Option<Arc<AssetWorker>> {
        self.waiting.lock().clone()
    }

    pub fn open_clients(&self) -> usize {
        self.open_clients.load(Ordering::SeqCst)
    }

    /// 记录一个打开的页面
    pub fn client_opened(self: &Arc<Self>) -> ClientGuard {
        self.open_clients.fetch_add(1, Ordering::SeqCst);
        ClientGuard { host: self.clone() }
    }

    /// 生成新版本并安装
    pub async fn update(&self) -> InstallReport {
        let worker = Arc::new(AssetWorker::new(
            &self.config,
            self.store.clone(),
            self.network.clone(),
        ));
        self.install(worker).await
    }

    /// 安装给定的工作者；可以激活就立即激活，否则进入等待
    pub async fn install(&self, worker: Arc<AssetWorker>) -> InstallReport {
        let _installing = self.install_lock.lock().await;
        let report = worker.on_install().await;

        if worker.ready_to_activate(self.open_clients()) {
            self.promote(worker).await;
        } else {
            info!(
                "[缓存] 新版本等待激活: {} (打开的页面 {})",
                report.cache_name,
                self.open_clients()
            );
            if let Some(replaced) = self.waiting.lock().replace(worker) {
                debug!("[缓存] 替换等待中的版本: {}", replaced.version());
            }
        }
        report
    }

    /// 把控制消息交给等待中的工作者
    pub async fn deliver(&self, message: &ControlMessage) -> Option<ActivateReport> {
        let Some(worker) = self.waiting() else {
            debug!("[缓存] 没有等待中的版本，忽略控制消息: {:?}", message);
            return None;
        };
        if worker.on_message(message) {
            return self.promote(worker).await;
        }
        None
    }

    /// 页面都关闭后激活等待中的版本
    pub async fn activate_if_ready(&self) -> Option<ActivateReport> {
        let worker = self.waiting()?;
        if worker.ready_to_activate(self.open_clients()) {
            return self.promote(worker).await;
        }
        None
    }

    async fn promote(&self, worker: Arc<AssetWorker>) -> Option<ActivateReport> {
        let report = worker.on_activate().await?;
        {
            let mut waiting = self.waiting.lock();
            if waiting.as_ref().is_some_and(|w| Arc::ptr_eq(w, &worker)) {
                *waiting = None;
            }
        }
        *self.active.write() = Some(worker);
        info!(
            "[缓存] 已激活: {} (清理 {} 个旧缓存)",
            report.retained,
            report.deleted.len()
        );
        Some(report)
    }

    /// 交给活动工作者；还没有活动版本时直通
    pub async fn on_fetch(&self, request: &AssetRequest) -> Result<FetchOutcome> {
        match self.active() {
            Some(worker) => worker.on_fetch(request).await,
            None => Ok(FetchOutcome::Bypass),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::store::MemoryCacheStore;
    use crate::cache::testing::FakeNetwork;
    use crate::cache::types::AssetResponse;
    use crate::cache::version::CacheVersion;
    use crate::cache::worker::{ResponseSource, WorkerPhase};

    fn waiting_config() -> CacheConfig {
        CacheConfig {
            skip_waiting_on_install: false,
            ..CacheConfig::default()
        }
    }

    fn shell_network(tag: &str) -> Arc<FakeNetwork> {
        let network = Arc::new(FakeNetwork::default());
        for path in CacheConfig::default().shell {
            network.serve(&path, AssetResponse::ok(format!("{} {}", tag, path)));
        }
        network
    }

    fn host_with(network: Arc<FakeNetwork>) -> (Arc<WorkerHost>, Arc<MemoryCacheStore>) {
        let store = Arc::new(MemoryCacheStore::new());
        let host = Arc::new(WorkerHost::new(waiting_config(), store.clone(), network));
        (host, store)
    }

    fn worker(host: &WorkerHost, tag: &str) -> Arc<AssetWorker> {
        Arc::new(AssetWorker::with_version(
            &host.config,
            CacheVersion::from_tag(tag),
            host.store.clone(),
            host.network.clone(),
        ))
    }

    #[tokio::test]
    async fn test_first_install_activates_without_clients() {
        let (host, _) = host_with(shell_network("v1"));
        assert!(matches!(
            host.on_fetch(&AssetRequest::get("/static/app.js")).await.unwrap(),
            FetchOutcome::Bypass
        ));

        let report = host.update().await;
        let active = host.active().unwrap();
        assert_eq!(active.cache_name(), report.cache_name);
        assert_eq!(active.phase(), WorkerPhase::Activated);
        assert!(host.waiting().is_none());
    }

    #[tokio::test]
    async fn test_new_version_waits_while_client_open_then_skip_waiting() {
        let (host, store) = host_with(shell_network("v1"));
        host.install(worker(&host, "v3-1")).await;

        let client = host.client_opened();
        host.install(worker(&host, "v3-2")).await;
        let waiting = host.waiting().unwrap();
        assert_eq!(waiting.phase(), WorkerPhase::Waiting);
        assert_eq!(host.active().unwrap().cache_name(), "museerr-v3-1");

        // 旧版本继续服务
        match host.on_fetch(&AssetRequest::get("/static/app.js")).await.unwrap() {
            FetchOutcome::Served { source, .. } => assert_eq!(source, ResponseSource::Cache),
            FetchOutcome::Bypass => panic!("unexpected bypass"),
        }

        assert!(host.deliver(&ControlMessage::Unknown).await.is_none());
        let report = host.deliver(&ControlMessage::SkipWaiting).await.unwrap();
        assert_eq!(report.retained, "museerr-v3-2");
        assert_eq!(report.deleted, vec!["museerr-v3-1"]);
        assert!(host.waiting().is_none());
        assert_eq!(host.active().unwrap().cache_name(), "museerr-v3-2");
        assert_eq!(store.list_namespaces().await.unwrap(), vec!["museerr-v3-2"]);

        // 重复的消息不会再次激活
        assert!(host.deliver(&ControlMessage::SkipWaiting).await.is_none());
        drop(client);
    }

    #[tokio::test]
    async fn test_waiting_version_activates_after_last_client_closes() {
        let (host, _) = host_with(shell_network("v1"));
        host.install(worker(&host, "v3-1")).await;

        let first = host.client_opened();
        let second = host.client_opened();
        host.install(worker(&host, "v3-2")).await;
        assert_eq!(host.open_clients(), 2);

        drop(first);
        assert!(host.activate_if_ready().await.is_none());
        drop(second);
        assert_eq!(host.open_clients(), 0);
        let report = host.activate_if_ready().await.unwrap();
        assert_eq!(report.retained, "museerr-v3-2");
        assert_eq!(host.active().unwrap().cache_name(), "museerr-v3-2");
    }

    #[tokio::test]
    async fn test_concurrent_skip_waiting_activates_once() {
        let (host, _) = host_with(shell_network("v1"));
        let _client = host.client_opened();
        host.install(worker(&host, "v3-1")).await;

        let (a, b) = tokio::join!(
            host.deliver(&ControlMessage::SkipWaiting),
            host.deliver(&ControlMessage::SkipWaiting)
        );
        assert_eq!(usize::from(a.is_some()) + usize::from(b.is_some()), 1);
        assert_eq!(host.active().unwrap().phase(), WorkerPhase::Activated);
    }
}
