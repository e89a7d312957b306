//! HTTP 服务器模块 - 使用 Axum 暴露网关
//!
//! 路由：
//! - `POST /invocations`
//! - `GET /ping`
//! - `GET /metrics`（启用指标时）

pub mod client;
pub mod routes;
pub mod server;

pub use client::client_key;
pub use server::{create_router, GateHttpServer, HttpServerState};
