use anyhow::Context;
use museerr_client::{
    api::{DownloadKind, DownloadRequest, HttpJobApi},
    cache::{CacheStore, FsCacheStore, HttpNetwork, MemoryCacheStore, Network, WorkerHost},
    config::{AppConfig, CacheStoreKind, LogConfig, DEFAULT_CONFIG_PATH},
    logging,
    server::{self, ProxyState},
    tracker::{
        ActiveJobReconciler, JobSubmitter, LogProgressSink, ProgressRegistry, TokioScheduler,
        WsConnector,
    },
};
use std::sync::Arc;
use tracing::{error, info, warn};

/// 加载日志配置
///
/// 尝试从配置文件加载，失败时返回默认配置
async fn load_log_config() -> LogConfig {
    if let Ok(content) = tokio::fs::read_to_string(DEFAULT_CONFIG_PATH).await {
        if let Ok(config) = toml::from_str::<toml::Value>(&content) {
            if let Some(log_table) = config.get("log") {
                if let Ok(log_config) = log_table.clone().try_into::<LogConfig>() {
                    return log_config;
                }
            }
        }
    }

    LogConfig::default()
}

/// 解析命令行中的一次性提交：`<track|album|artist> [字段=值]...`
fn parse_submit_args(args: &[String]) -> anyhow::Result<Option<DownloadRequest>> {
    let Some((kind, fields)) = args.split_first() else {
        return Ok(None);
    };

    let mut request = match kind.as_str() {
        "track" => DownloadRequest::new(DownloadKind::Track),
        "album" => DownloadRequest::new(DownloadKind::Album),
        "artist" => DownloadRequest::new(DownloadKind::Artist),
        other => anyhow::bail!("未知的下载类型: {} (可选 track / album / artist)", other),
    };
    for field in fields {
        let (name, value) = field
            .split_once('=')
            .with_context(|| format!("表单字段格式应为 名称=值: {}", field))?;
        request = request.field(name, value);
    }
    Ok(Some(request))
}

/// 创建缓存存储
fn build_cache_store(config: &AppConfig) -> Arc<dyn CacheStore> {
    match config.cache.store {
        CacheStoreKind::Memory => Arc::new(MemoryCacheStore::new()),
        CacheStoreKind::Disk => Arc::new(FsCacheStore::new(config.cache.cache_dir.clone())),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 先加载日志配置，失败时使用默认配置
    let log_config = load_log_config().await;

    // 初始化日志系统（必须保持 _log_guard 存活）
    let _log_guard = logging::init_logging(&log_config);

    info!("Museerr Client v{} 启动中...", env!("CARGO_PKG_VERSION"));

    let args: Vec<String> = std::env::args().skip(1).collect();
    let pending_submit = parse_submit_args(&args)?;

    let config = AppConfig::load_or_default(DEFAULT_CONFIG_PATH).await;
    let upstream = config.server.upstream_url.clone();
    let timeout = config.tracker.request_timeout();

    // 进度追踪
    let api = Arc::new(HttpJobApi::new(&upstream, timeout).context("创建下载服务客户端失败")?);
    let connector = Arc::new(WsConnector::new(&upstream).context("创建推送连接器失败")?);
    let registry = ProgressRegistry::new(
        connector,
        Arc::new(LogProgressSink),
        config.tracker.completion_grace(),
    );
    let scheduler = TokioScheduler::new();
    let reconciler = Arc::new(ActiveJobReconciler::new(
        api.clone(),
        registry.clone(),
        config.tracker.reconcile_interval(),
    ));
    let reconcile_handle = reconciler.start(&scheduler).await;
    info!(
        "进度追踪已启动: 上游={}, 对账间隔={:?}",
        upstream,
        config.tracker.reconcile_interval()
    );

    if let Some(request) = pending_submit {
        let submitter = JobSubmitter::new(api.clone(), registry.clone());
        match submitter.submit(&request).await {
            Ok(ids) => info!("已提交 {:?}，开始追踪 {} 个任务", request.kind, ids.len()),
            Err(e) => warn!("提交失败: {}", e),
        }
    }

    // 离线资源缓存：启动时还没有页面打开，安装完成即激活
    let network: Arc<dyn Network> =
        Arc::new(HttpNetwork::new(&upstream, timeout).context("创建上游抓取客户端失败")?);
    let host = Arc::new(WorkerHost::new(
        config.cache.clone(),
        build_cache_store(&config),
        network.clone(),
    ));
    let install = host.update().await;
    if !install.failed.is_empty() {
        warn!("{} 个外壳资源未能缓存", install.failed.len());
    }
    if let Some(active) = host.active() {
        info!("缓存已激活: {}", active.cache_name());
    }

    if config.server.proxy_enabled {
        let state = ProxyState::new(host, network, &upstream).context("创建代理状态失败")?;
        let app = server::build_router(state);
        let addr = format!("{}:{}", config.server.host, config.server.port);

        info!("壳代理启动在: http://{}", addr);
        info!("推送桥接: ws://{}/ws/<job_id>", addr);
        info!("安装新版本: POST http://{}{}", addr, server::UPDATE_PATH);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("监听失败: {}", addr))?;

        // 使用 select! 监听关闭信号
        tokio::select! {
            result = axum::serve(listener, app) => {
                if let Err(e) = result {
                    error!("服务器错误: {}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("收到 Ctrl+C，开始关闭...");
            }
        }
    } else {
        info!("壳代理已禁用，仅运行进度追踪");
        tokio::signal::ctrl_c().await.context("等待关闭信号失败")?;
        info!("收到 Ctrl+C，开始关闭...");
    }

    reconcile_handle.cancel();
    scheduler.shutdown();
    info!("正在追踪的任务: {:?}", registry.active_ids());
    info!("应用已安全退出");

    Ok(())
}
