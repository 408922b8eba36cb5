//! 路由定义
//!
//! - 健康检查：/health
//! - 设备轮询状态：/api/devices/status、/api/devices/:device_id/status
//! - 轮询指标：/api/metrics

use crate::AppState;
use crate::response::{device_not_found, ok};
use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    http::{HeaderValue, Request},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use ems_telemetry::{metrics, new_request_ids};
use tracing::Instrument;

/// 创建路由并挂载请求追踪中间件。
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/devices/status", get(list_device_status))
        .route("/api/devices/:device_id/status", get(get_device_status))
        .route("/api/metrics", get(get_metrics))
        .with_state(state)
        // 注入 request_id/trace_id
        .layer(middleware::from_fn(request_context))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true }))
}

async fn list_device_status(State(state): State<AppState>) -> Response {
    ok(state.scheduler.status().await)
}

async fn get_device_status(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Response {
    match state.scheduler.status_board().get(&device_id).await {
        Some(status) => ok(status),
        None => device_not_found(&device_id),
    }
}

async fn get_metrics() -> Response {
    ok(metrics().snapshot())
}

async fn request_context(mut req: Request<Body>, next: Next) -> Response {
    // 生成 request_id 与 trace_id，并注入请求扩展与日志
    let ids = new_request_ids();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    req.extensions_mut().insert(ids.clone());

    let span = tracing::info_span!(
        "request",
        request_id = %ids.request_id,
        trace_id = %ids.trace_id,
        method = %method,
        path = %path
    );

    let mut response = next.run(req).instrument(span).await;
    response.headers_mut().insert(
        "x-request-id",
        HeaderValue::from_str(&ids.request_id).unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    response.headers_mut().insert(
        "x-trace-id",
        HeaderValue::from_str(&ids.trace_id).unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    response
}
