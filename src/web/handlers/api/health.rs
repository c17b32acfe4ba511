//! 健康检查处理器

use std::sync::Arc;

use axum::{extract::State, response::Json};

use crate::web::types::{AppState, HealthResponse, QueueReport};

/// `GET /health`
///
/// 进程存活即返回 `ok`，`ready` 表示模型是否已加载。就绪后附带服务的组件健康
/// （编解码器、引擎）与调度队列统计。
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let Some(dispatcher) = state.dispatcher() else {
        return Json(HealthResponse::not_ready());
    };

    let health = dispatcher.service().get_health();
    let components = health
        .components
        .iter()
        .map(|(name, level)| (name.clone(), level.as_str()))
        .collect();

    Json(HealthResponse {
        status: "ok",
        ready: true,
        model: state.model_name().map(str::to_string),
        health: Some(health.overall.as_str()),
        components,
        queue: Some(QueueReport::from_dispatcher(dispatcher)),
    })
}
