// 本地壳代理模块

pub mod bridge;
pub mod proxy;
pub mod state;

pub use state::ProxyState;

use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

/// 控制消息入口
pub const CONTROL_MESSAGE_PATH: &str = "/__shell/message";

/// 触发安装新版本
pub const UPDATE_PATH: &str = "/__shell/update";

/// 构建代理路由
///
/// 推送桥接、控制消息和更新走专用路由，其余请求全部交给缓存工作者
pub fn build_router(state: ProxyState) -> Router {
    Router::new()
        .route("/ws/:job_id", get(bridge::handle_push_bridge))
        .route(CONTROL_MESSAGE_PATH, post(proxy::handle_control_message))
        .route(UPDATE_PATH, post(proxy::handle_update))
        .fallback(proxy::handle_asset)
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}
