// 配置管理模块

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;

/// 默认配置文件路径
pub const DEFAULT_CONFIG_PATH: &str = "config/app.toml";

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 服务器配置（上游地址与本地壳代理）
    #[serde(default)]
    pub server: ServerConfig,
    /// 任务进度追踪配置
    #[serde(default)]
    pub tracker: TrackerConfig,
    /// 资源缓存配置
    #[serde(default)]
    pub cache: CacheConfig,
    /// 🔥 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 是否启用日志文件持久化
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// 日志文件保存目录
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// 日志保留天数（默认 7 天）
    #[serde(default = "default_log_retention_days")]
    pub retention_days: u32,
    /// 日志级别（默认 info）
    #[serde(default = "default_log_level")]
    pub level: String,
    /// 单个日志文件最大大小（字节，默认 20MB）
    #[serde(default = "default_log_max_file_size")]
    pub max_file_size: u64,
}

fn default_log_enabled() -> bool {
    true
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_retention_days() -> u32 {
    7
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_max_file_size() -> u64 {
    20 * 1024 * 1024 // 20MB
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_log_enabled(),
            log_dir: default_log_dir(),
            retention_days: default_log_retention_days(),
            level: default_log_level(),
            max_file_size: default_log_max_file_size(),
        }
    }
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 上游下载服务地址（提交、状态轮询、推送通道都指向它）
    #[serde(default = "default_upstream_url")]
    pub upstream_url: String,
    /// 本地壳代理监听地址
    #[serde(default = "default_host")]
    pub host: String,
    /// 本地壳代理监听端口
    #[serde(default = "default_port")]
    pub port: u16,
    /// 是否启动本地壳代理
    #[serde(default = "default_true")]
    pub proxy_enabled: bool,
}

fn default_upstream_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8686
}

fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            upstream_url: default_upstream_url(),
            host: default_host(),
            port: default_port(),
            proxy_enabled: true,
        }
    }
}

/// 任务进度追踪配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// 活跃任务对账间隔（秒），默认 10 秒
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,
    /// 任务完成后保留最终画面的时长（毫秒），默认 1500
    #[serde(default = "default_completion_grace_ms")]
    pub completion_grace_ms: u64,
    /// HTTP 请求超时（秒）
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_reconcile_interval_secs() -> u64 {
    10
}

fn default_completion_grace_ms() -> u64 {
    1500
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            reconcile_interval_secs: default_reconcile_interval_secs(),
            completion_grace_ms: default_completion_grace_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl TrackerConfig {
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }

    pub fn completion_grace(&self) -> Duration {
        Duration::from_millis(self.completion_grace_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// 缓存存储后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStoreKind {
    /// 进程内存（重启即丢失）
    Memory,
    /// 本地磁盘（重启后仍可离线加载）
    Disk,
}

/// 资源缓存配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// 缓存名前缀
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,
    /// 版本号前缀，完整版本为 `<version_prefix>-<毫秒时间戳>`
    #[serde(default = "default_version_prefix")]
    pub version_prefix: String,
    /// 应用外壳清单，安装时预先缓存
    #[serde(default = "default_shell")]
    pub shell: Vec<String>,
    /// 永不缓存的路径前缀（API 与推送通道）
    #[serde(default = "default_bypass_prefixes")]
    pub bypass_prefixes: Vec<String>,
    /// 静态资源路径前缀（网络优先）
    #[serde(default = "default_static_prefix")]
    pub static_prefix: String,
    /// 离线兜底文档
    #[serde(default = "default_offline_document")]
    pub offline_document: String,
    /// 存储后端
    #[serde(default = "default_store_kind")]
    pub store: CacheStoreKind,
    /// 磁盘存储目录
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// 安装后是否立即跳过等待
    #[serde(default = "default_true")]
    pub skip_waiting_on_install: bool,
}

fn default_name_prefix() -> String {
    "museerr".to_string()
}

fn default_version_prefix() -> String {
    "v3".to_string()
}

fn default_shell() -> Vec<String> {
    [
        "/",
        "/search",
        "/static/style.css",
        "/static/app.js",
        "/static/icons/icon-192.png",
        "/static/icons/icon-512.png",
        "/manifest.webmanifest",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_bypass_prefixes() -> Vec<String> {
    vec!["/api".to_string(), "/ws".to_string()]
}

fn default_static_prefix() -> String {
    "/static/".to_string()
}

fn default_offline_document() -> String {
    "/".to_string()
}

fn default_store_kind() -> CacheStoreKind {
    CacheStoreKind::Memory
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache")
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            name_prefix: default_name_prefix(),
            version_prefix: default_version_prefix(),
            shell: default_shell(),
            bypass_prefixes: default_bypass_prefixes(),
            static_prefix: default_static_prefix(),
            offline_document: default_offline_document(),
            store: default_store_kind(),
            cache_dir: default_cache_dir(),
            skip_waiting_on_install: true,
        }
    }
}

impl AppConfig {
    /// 从文件加载配置
    pub async fn load_from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .context(format!("Failed to read config file: {}", path))?;

        let config: AppConfig = toml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;

        Ok(config)
    }

    /// 保存配置到文件
    pub async fn save_to_file(&self, path: &str) -> Result<()> {
        self.validate().context("保存配置失败")?;

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create config directory")?;
            }
        }

        fs::write(path, content)
            .await
            .context(format!("Failed to write config file: {}", path))?;

        tracing::info!("配置已保存到: {}", path);
        Ok(())
    }

    /// 加载配置，失败时使用默认配置并尝试写回
    pub async fn load_or_default(path: &str) -> Self {
        match Self::load_from_file(path).await {
            Ok(config) => {
                tracing::info!("配置文件加载成功: {}", path);
                config
            }
            Err(e) => {
                tracing::warn!("配置文件加载失败，使用默认配置: {:#}", e);
                let default_config = Self::default();

                if !std::path::Path::new(path).exists() {
                    if let Err(e) = default_config.save_to_file(path).await {
                        tracing::error!("保存默认配置失败: {:#}", e);
                    }
                }

                default_config
            }
        }
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        let upstream = reqwest::Url::parse(&self.server.upstream_url)
            .context(format!("上游地址无效: {}", self.server.upstream_url))?;
        if !matches!(upstream.scheme(), "http" | "https") {
            anyhow::bail!("上游地址必须是 http 或 https: {}", self.server.upstream_url);
        }
        if self.tracker.reconcile_interval_secs == 0 {
            anyhow::bail!("reconcile_interval_secs 必须大于 0");
        }
        if self.cache.name_prefix.is_empty() || self.cache.name_prefix.contains('-') {
            anyhow::bail!("缓存名前缀不能为空且不能包含 '-': {}", self.cache.name_prefix);
        }
        if self.cache.shell.iter().any(|p| !p.starts_with('/')) {
            anyhow::bail!("应用外壳清单中的路径必须以 '/' 开头");
        }
        Ok(())
    }
}
