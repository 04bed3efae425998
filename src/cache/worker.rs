//! 资源缓存工作者
//!
//! 生命周期：Installing → Waiting → Activating → Activated。
//! - 安装：逐个抓取应用外壳，单个失败只记录，不中止安装
//! - 激活：选定唯一的存活缓存，删除本应用的其余缓存，然后接管客户端
//! - 抓取：按 [`RoutingRules`] 选择策略
//! - 控制消息：`SKIP_WAITING` 让等待中的安装立即可激活
//!
//! 安装没能缓存离线文档时（例如启动时上游不可达），激活会沿用上一个
//! 含离线文档的版本，而不是用一个空缓存替换它

use crate::cache::network::Network;
use crate::cache::store::CacheStore;
use crate::cache::strategy::{FetchStrategy, RoutingRules};
use crate::cache::types::{AssetRequest, AssetResponse};
use crate::cache::version::CacheVersion;
use crate::config::CacheConfig;
use crate::error::{ClientError, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 工作者阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerPhase {
    /// 已创建，尚未安装
    Parsed,
    Installing,
    /// 安装完成，等待激活
    Waiting,
    Activating,
    Activated,
}

/// 页面发给缓存层的控制消息
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    /// 跳过等待，立即激活
    SkipWaiting,
    #[serde(other)]
    Unknown,
}

impl ControlMessage {
    /// 解析控制消息，无法解析时返回 None
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }
}

/// 安装结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub cache_name: String,
    /// 成功缓存的外壳资源
    pub cached: Vec<String>,
    /// 失败的外壳资源及原因
    pub failed: Vec<(String, String)>,
}

/// 激活结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivateReport {
    /// 激活后唯一存活的缓存
    pub retained: String,
    /// 是否沿用了上一个版本的缓存
    pub reused_previous: bool,
    pub deleted: Vec<String>,
    pub claimed: bool,
}

/// 响应来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
    /// 离线兜底文档
    OfflineFallback,
}

/// 一次抓取拦截的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// 不拦截，由调用方原样走网络
    Bypass,
    Served {
        response: AssetResponse,
        source: ResponseSource,
    },
}

/// 资源缓存工作者
pub struct AssetWorker {
    version: CacheVersion,
    /// 本次安装写入的缓存
    install_name: String,
    /// 属于本应用的缓存名前缀（`<name_prefix>-`）
    owned_prefix: String,
    /// 读写使用的缓存；激活时可能换成上一个版本
    live_cache: RwLock<String>,
    shell: Vec<String>,
    offline_document: String,
    skip_waiting_on_install: bool,
    rules: RoutingRules,
    store: Arc<dyn CacheStore>,
    network: Arc<dyn Network>,
    phase: RwLock<WorkerPhase>,
    skip_waiting: AtomicBool,
    offline_document_cached: AtomicBool,
    clients_claimed: AtomicBool,
}

impl AssetWorker {
    /// 创建工作者并生成新的缓存版本
    pub fn new(config: &CacheConfig, store: Arc<dyn CacheStore>, network: Arc<dyn Network>) -> Self {
        let version = CacheVersion::generate(&config.version_prefix);
        Self::with_version(config, version, store, network)
    }

    pub fn with_version(
        config: &CacheConfig,
        version: CacheVersion,
        store: Arc<dyn CacheStore>,
        network: Arc<dyn Network>,
    ) -> Self {
        let install_name = version.cache_name(&config.name_prefix);
        Self {
            live_cache: RwLock::new(install_name.clone()),
            install_name,
            owned_prefix: format!("{}-", config.name_prefix),
            version,
            shell: config.shell.clone(),
            offline_document: config.offline_document.clone(),
            skip_waiting_on_install: config.skip_waiting_on_install,
            rules: RoutingRules::from_config(config),
            store,
            network,
            phase: RwLock::new(WorkerPhase::Parsed),
            skip_waiting: AtomicBool::new(false),
            offline_document_cached: AtomicBool::new(false),
            clients_claimed: AtomicBool::new(false),
        }
    }

    pub fn version(&self) -> &CacheVersion {
        &self.version
    }

    /// 当前读写的缓存名
    pub fn cache_name(&self) -> String {
        self.live_cache.read().clone()
    }

    pub fn phase(&self) -> WorkerPhase {
        *self.phase.read()
    }

    fn set_phase(&self, phase: WorkerPhase) {
        *self.phase.write() = phase;
        debug!("缓存工作者阶段: {:?} ({})", phase, self.install_name);
    }

    /// 是否已接管客户端
    pub fn controls_clients(&self) -> bool {
        self.clients_claimed.load(Ordering::SeqCst)
    }

    /// 安装：预缓存应用外壳
    pub async fn on_install(&self) -> InstallReport {
        self.set_phase(WorkerPhase::Installing);
        let mut cached = Vec::new();
        let mut failed = Vec::new();

        for path in &self.shell {
            match self.cache_shell_asset(path).await {
                Ok(()) => cached.push(path.clone()),
                Err(e) => {
                    warn!("[缓存] 外壳资源缓存失败: {} - {}", path, e);
                    failed.push((path.clone(), e.to_string()));
                }
            }
        }

        self.offline_document_cached
            .store(cached.contains(&self.offline_document), Ordering::SeqCst);
        if self.skip_waiting_on_install {
            self.skip_waiting.store(true, Ordering::SeqCst);
        }
        self.set_phase(WorkerPhase::Waiting);
        info!(
            "[缓存] 安装完成: {} (成功 {}, 失败 {})",
            self.install_name,
            cached.len(),
            failed.len()
        );

        InstallReport {
            cache_name: self.install_name.clone(),
            cached,
            failed,
        }
    }

    async fn cache_shell_asset(&self, path: &str) -> Result<()> {
        let response = self.network.fetch(&AssetRequest::get(path)).await?;
        if !response.is_success() {
            return Err(ClientError::HttpStatus {
                status: response.status,
                url: path.to_string(),
            });
        }
        self.store.put(&self.install_name, path, response).await
    }

    /// 安装完成后是否可以激活
    ///
    /// 请求过跳过等待，或旧版本客户端都已关闭
    pub fn ready_to_activate(&self, open_old_clients: usize) -> bool {
        self.phase() == WorkerPhase::Waiting
            && (self.skip_waiting.load(Ordering::SeqCst) || open_old_clients == 0)
    }

    /// Waiting → Activating，只有一个调用方能成功
    fn begin_activation(&self) -> bool {
        let mut phase = self.phase.write();
        if *phase != WorkerPhase::Waiting {
            return false;
        }
        *phase = WorkerPhase::Activating;
        true
    }

    /// 激活：确定存活缓存，清理本应用的其余缓存并接管客户端
    ///
    /// 不在 Waiting 阶段时返回 None（未安装或已被其他调用方激活）。
    /// 只清理名字带本应用前缀的缓存；清理是尽力而为的，单个删除失败只记录日志
    pub async fn on_activate(&self) -> Option<ActivateReport> {
        if !self.begin_activation() {
            debug!("[缓存] 忽略重复或过早的激活: {}", self.install_name);
            return None;
        }

        let owned: Vec<String> = match self.store.list_namespaces().await {
            Ok(names) => names
                .into_iter()
                .filter(|name| name.starts_with(&self.owned_prefix))
                .collect(),
            Err(e) => {
                warn!("[缓存] 枚举缓存失败，跳过清理: {}", e);
                Vec::new()
            }
        };

        let retained = self.choose_live_cache(&owned).await;
        let reused_previous = retained != self.install_name;
        *self.live_cache.write() = retained.clone();

        let mut deleted = Vec::new();
        for name in owned.into_iter().filter(|n| n != &retained) {
            match self.store.delete(&name).await {
                Ok(_) => {
                    info!("[缓存] 删除旧缓存: {}", name);
                    deleted.push(name);
                }
                Err(e) => warn!("[缓存] 删除旧缓存失败: {} - {}", name, e),
            }
        }

        self.clients_claimed.store(true, Ordering::SeqCst);
        self.set_phase(WorkerPhase::Activated);

        Some(ActivateReport {
            retained,
            reused_previous,
            deleted,
            claimed: true,
        })
    }

    /// 本次安装缓存到了离线文档就用它；否则沿用最新的、含离线文档的旧版本
    async fn choose_live_cache(&self, owned: &[String]) -> String {
        if self.offline_document_cached.load(Ordering::SeqCst) {
            return self.install_name.clone();
        }

        let mut previous: Vec<(i64, &String)> = owned
            .iter()
            .filter(|name| **name != self.install_name)
            .filter_map(|name| CacheVersion::stamp_of(name).map(|stamp| (stamp, name)))
            .collect();
        previous.sort_by(|a, b| b.0.cmp(&a.0));

        for (_, name) in previous {
            if let Ok(Some(_)) = self.store.get(name, &self.offline_document).await {
                warn!(
                    "[缓存] 本次安装未缓存离线文档，沿用旧缓存: {} (放弃 {})",
                    name, self.install_name
                );
                return name.clone();
            }
        }
        self.install_name.clone()
    }

    /// 处理控制消息
    ///
    /// 返回 `true` 表示有一个等待中的安装现在可以立即激活
    pub fn on_message(&self, message: &ControlMessage) -> bool {
        match message {
            ControlMessage::SkipWaiting => {
                self.skip_waiting.store(true, Ordering::SeqCst);
                info!("[缓存] 收到 SKIP_WAITING");
                self.phase() == WorkerPhase::Waiting
            }
            ControlMessage::Unknown => {
                debug!("[缓存] 忽略未知控制消息");
                false
            }
        }
    }

    /// 拦截一次抓取
    pub async fn on_fetch(&self, request: &AssetRequest) -> Result<FetchOutcome> {
        match self.rules.route(request) {
            FetchStrategy::Bypass => Ok(FetchOutcome::Bypass),
            FetchStrategy::NetworkFirst => self.network_first(request).await,
            FetchStrategy::CacheFirst => self.cache_first(request).await,
        }
    }

    /// 读缓存；存储故障按未命中处理
    async fn lookup(&self, key: &str) -> Option<AssetResponse> {
        let cache_name = self.cache_name();
        match self.store.get(&cache_name, key).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!("[缓存] 读取失败，按未命中处理: {} - {}", key, e);
                None
            }
        }
    }

    async fn network_first(&self, request: &AssetRequest) -> Result<FetchOutcome> {
        match self.network.fetch(request).await {
            Ok(response) => {
                if response.is_success() {
                    let cache_name = self.cache_name();
                    if let Err(e) = self
                        .store
                        .put(&cache_name, request.cache_key(), response.clone())
                        .await
                    {
                        warn!("[缓存] 写入失败，仍返回网络响应: {} - {}", request.url, e);
                    }
                }
                Ok(FetchOutcome::Served {
                    response,
                    source: ResponseSource::Network,
                })
            }
            Err(e) => {
                debug!("[缓存] 网络失败，尝试缓存: {} - {}", request.url, e);
                match self.lookup(request.cache_key()).await {
                    Some(response) => Ok(FetchOutcome::Served {
                        response,
                        source: ResponseSource::Cache,
                    }),
                    None => Err(ClientError::Offline(request.url.clone())),
                }
            }
        }
    }

    async fn cache_first(&self, request: &AssetRequest) -> Result<FetchOutcome> {
        if let Some(response) = self.lookup(request.cache_key()).await {
            return Ok(FetchOutcome::Served {
                response,
                source: ResponseSource::Cache,
            });
        }

        match self.network.fetch(request).await {
            Ok(response) => Ok(FetchOutcome::Served {
                response,
                source: ResponseSource::Network,
            }),
            Err(e) => {
                debug!("[缓存] 网络失败，回退离线文档: {} - {}", request.url, e);
                match self.lookup(&self.offline_document).await {
                    Some(response) => Ok(FetchOutcome::Served {
                        response,
                        source: ResponseSource::OfflineFallback,
                    }),
                    None => Err(ClientError::Offline(request.url.clone())),
                }
            }
        }
    }
}
