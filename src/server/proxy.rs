//! 壳代理处理器
//!
//! 页面的每个请求都先交给缓存工作者决定：命中缓存、走网络并刷新，或直通上游

use crate::cache::{is_hop_by_hop, AssetRequest, AssetResponse, ControlMessage, FetchOutcome};
use crate::error::ClientError;
use crate::server::state::ProxyState;
use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::{debug, info, warn};

/// 请求体上限（提交表单足够用）
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// 兜底路由：所有非推送请求
pub async fn handle_asset(State(state): State<ProxyState>, request: Request) -> Response {
    let asset_request = match into_asset_request(request).await {
        Ok(request) => request,
        Err(response) => return response,
    };

    let result = match state.host.on_fetch(&asset_request).await {
        Ok(FetchOutcome::Bypass) => {
            debug!("直通上游: {} {}", asset_request.method, asset_request.url);
            state.network.fetch(&asset_request).await
        }
        Ok(FetchOutcome::Served { response, source }) => {
            debug!(
                "{} {} -> {} ({:?})",
                asset_request.method, asset_request.url, response.status, source
            );
            Ok(response)
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(response) => into_http_response(response),
        Err(e) => error_response(&asset_request.url, e),
    }
}

/// 控制消息入口：请求体是 `{"type": "..."}`
pub async fn handle_control_message(State(state): State<ProxyState>, body: String) -> Response {
    let message = match ControlMessage::parse(&body) {
        Some(message) => message,
        None => {
            warn!("无法解析的控制消息: {}", body);
            return (StatusCode::BAD_REQUEST, "无法解析的控制消息").into_response();
        }
    };

    if let Some(report) = state.host.deliver(&message).await {
        info!("跳过等待，已激活 {}", report.retained);
    }
    StatusCode::ACCEPTED.into_response()
}

/// 安装新版本；页面仍打开时新版本进入等待
pub async fn handle_update(State(state): State<ProxyState>) -> Response {
    let report = state.host.update().await;
    if !report.failed.is_empty() {
        warn!("更新时 {} 个外壳资源未能缓存", report.failed.len());
    }
    (StatusCode::OK, Json(report)).into_response()
}

async fn into_asset_request(request: Request) -> Result<AssetRequest, Response> {
    let (parts, body) = request.into_parts();
    let url = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());

    let body = to_bytes(body, MAX_BODY_BYTES).await.map_err(|e| {
        warn!("读取请求体失败: {} - {}", url, e);
        (StatusCode::BAD_REQUEST, "无法读取请求体").into_response()
    })?;

    let mut asset_request = AssetRequest::new(parts.method.as_str(), url).with_body(body.to_vec());
    for (name, value) in parts.headers.iter() {
        if let Ok(value) = value.to_str() {
            asset_request = asset_request.header(name.as_str(), value);
        }
    }
    Ok(asset_request)
}

/// 转成 axum 响应，丢弃逐跳头和非法头
pub(crate) fn into_http_response(asset: AssetResponse) -> Response {
    let status = StatusCode::from_u16(asset.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut response = Response::new(Body::from(asset.body));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    for (name, value) in &asset.headers {
        if is_hop_by_hop(name) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.append(name, value);
        }
    }
    response
}

fn error_response(url: &str, e: ClientError) -> Response {
    match e {
        ClientError::Offline(_) => {
            warn!("离线且无缓存: {}", url);
            (StatusCode::GATEWAY_TIMEOUT, e.to_string()).into_response()
        }
        other => {
            warn!("上游请求失败: {} - {}", url, other);
            (StatusCode::BAD_GATEWAY, other.to_string()).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::testing::FakeNetwork;
    use crate::cache::{
        AssetWorker, CacheStore, CacheVersion, MemoryCacheStore, WorkerHost, WorkerPhase,
    };
    use crate::config::CacheConfig;
    use std::sync::Arc;

    const CACHE_NAME: &str = "museerr-v3-42";

    fn version_worker(
        config: &CacheConfig,
        tag: &str,
        store: Arc<MemoryCacheStore>,
        network: Arc<FakeNetwork>,
    ) -> Arc<AssetWorker> {
        Arc::new(AssetWorker::with_version(
            config,
            CacheVersion::from_tag(tag),
            store,
            network,
        ))
    }

    /// 代理状态，版本 `v3-42` 已安装并激活
    async fn proxy_state(
        config: &CacheConfig,
        store: Arc<MemoryCacheStore>,
        network: Arc<FakeNetwork>,
    ) -> ProxyState {
        let host = Arc::new(WorkerHost::new(config.clone(), store.clone(), network.clone()));
        host.install(version_worker(config, "v3-42", store, network.clone()))
            .await;
        ProxyState::new(host, network, "http://127.0.0.1:8000").unwrap()
    }

    fn get(uri: &str) -> Request {
        axum::http::Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_api_request_is_forwarded_and_not_cached() {
        let store = Arc::new(MemoryCacheStore::new());
        let network = Arc::new(FakeNetwork::default());
        network.serve(
            "/api/active_downloads",
            AssetResponse::ok(r#"{"active":[]}"#).with_header("content-type", "application/json"),
        );
        let state = proxy_state(&CacheConfig::default(), store.clone(), network.clone()).await;
        let installed = network.calls().len();

        let response = handle_asset(State(state), get("/api/active_downloads")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );
        assert_eq!(body_text(response).await, r#"{"active":[]}"#);
        assert_eq!(network.calls()[installed..], ["GET /api/active_downloads"]);
        assert!(store.list_namespaces().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_form_post_keeps_method_and_body() {
        let network = Arc::new(FakeNetwork::default());
        network.serve("/download_track", AssetResponse::ok(r#"{"task_id":"t1"}"#));
        let state = proxy_state(
            &CacheConfig::default(),
            Arc::new(MemoryCacheStore::new()),
            network.clone(),
        )
        .await;
        let installed = network.calls().len();

        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/download_track")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from("track_id=1"))
            .unwrap();
        let response = handle_asset(State(state), request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(network.calls()[installed..], ["POST /download_track"]);
    }

    #[tokio::test]
    async fn test_offline_without_copy_is_gateway_timeout() {
        let network = Arc::new(FakeNetwork::default());
        network.go_offline();
        let state = proxy_state(
            &CacheConfig::default(),
            Arc::new(MemoryCacheStore::new()),
            network,
        )
        .await;

        let response = handle_asset(State(state), get("/static/app.js")).await;
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn test_bypassed_transport_failure_is_bad_gateway() {
        let network = Arc::new(FakeNetwork::default());
        network.go_offline();
        let state = proxy_state(
            &CacheConfig::default(),
            Arc::new(MemoryCacheStore::new()),
            network,
        )
        .await;

        let response = handle_asset(State(state), get("/api/active_downloads")).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_offline_page_is_served_from_root_document() {
        let store = Arc::new(MemoryCacheStore::new());
        store
            .put(
                CACHE_NAME,
                "/",
                AssetResponse::ok("<html>shell</html>").with_header("content-type", "text/html"),
            )
            .await
            .unwrap();
        let network = Arc::new(FakeNetwork::default());
        network.go_offline();
        let state = proxy_state(&CacheConfig::default(), store, network).await;

        let response = handle_asset(State(state), get("/artist/7")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "<html>shell</html>");
    }

    #[tokio::test]
    async fn test_skip_waiting_message_activates_waiting_version() {
        let mut config = CacheConfig::default();
        config.skip_waiting_on_install = false;
        let store = Arc::new(MemoryCacheStore::new());
        let network = Arc::new(FakeNetwork::default());
        for path in &config.shell {
            network.serve(path, AssetResponse::ok(format!("body of {}", path)));
        }
        let host = Arc::new(WorkerHost::new(config.clone(), store.clone(), network.clone()));
        host.install(version_worker(&config, "v3-1", store.clone(), network.clone()))
            .await;
        let state = ProxyState::new(host.clone(), network.clone(), "http://127.0.0.1:8000").unwrap();

        // 页面仍打开，新版本停在等待
        let _client = host.client_opened();
        let next = version_worker(&config, "v3-42", store.clone(), network);
        host.install(next.clone()).await;
        assert_eq!(next.phase(), WorkerPhase::Waiting);

        let response =
            handle_control_message(State(state.clone()), "not json".to_string()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(next.phase(), WorkerPhase::Waiting);

        let response = handle_control_message(
            State(state.clone()),
            r#"{"type":"SKIP_WAITING"}"#.to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(next.phase(), WorkerPhase::Activated);
        assert_eq!(host.active().unwrap().cache_name(), CACHE_NAME);
        assert!(store.get("museerr-v3-1", "/").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_installs_new_version() {
        let mut config = CacheConfig::default();
        config.skip_waiting_on_install = false;
        let store = Arc::new(MemoryCacheStore::new());
        let network = Arc::new(FakeNetwork::default());
        network.serve("/", AssetResponse::ok("<html>shell</html>"));
        let state = proxy_state(&config, store.clone(), network).await;
        let _client = state.host.client_opened();

        let response = handle_update(State(state.clone())).await;
        assert_eq!(response.status(), StatusCode::OK);
        let report: serde_json::Value =
            serde_json::from_str(&body_text(response).await).unwrap();
        let cache_name = report["cache_name"].as_str().unwrap().to_string();
        assert_ne!(cache_name, CACHE_NAME);
        assert_eq!(report["cached"], serde_json::json!(["/"]));

        // 旧版本仍在服务，新版本等待
        assert_eq!(state.host.active().unwrap().cache_name(), CACHE_NAME);
        assert_eq!(state.host.waiting().unwrap().cache_name(), cache_name);
    }

    #[test]
    fn test_response_drops_hop_by_hop_headers() {
        let response = into_http_response(
            AssetResponse::new(201, "x")
                .with_header("Content-Type", "text/plain")
                .with_header("Transfer-Encoding", "chunked")
                .with_header("Connection", "keep-alive"),
        );
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers().get("content-type").unwrap(), "text/plain");
        assert!(response.headers().get("transfer-encoding").is_none());
        assert!(response.headers().get("connection").is_none());
    }
}
