//! 下载服务 API 模块
//!
//! - `types.rs`: 提交请求与服务端响应的数据结构
//! - `client.rs`: `JobApi` 抽象与基于 reqwest 的实现

mod client;
mod types;

pub use client::{HttpJobApi, JobApi};
pub use types::*;
