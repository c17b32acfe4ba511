//! Web 模块的数据类型定义

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use axum::{http::StatusCode, response::Json};
use serde::{Deserialize, Serialize};

use crate::translation::{Dispatcher, ErrorCategory, TranslationError};

/// 应用状态
///
/// 模型在后台加载，加载完成后调度器只安装一次；此前所有翻译请求返回 503。
#[derive(Default)]
pub struct AppState {
    dispatcher: OnceLock<Arc<Dispatcher>>,
    model_name: OnceLock<String>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 用已就绪的调度器创建状态
    pub fn ready(dispatcher: Arc<Dispatcher>, model_name: impl Into<String>) -> Self {
        let state = Self::new();
        state.install(dispatcher, model_name);
        state
    }

    /// 安装调度器并标记就绪；重复安装会被忽略
    pub fn install(&self, dispatcher: Arc<Dispatcher>, model_name: impl Into<String>) {
        if self.dispatcher.set(dispatcher).is_err() {
            tracing::warn!("调度器已安装，忽略重复安装");
            return;
        }
        let _ = self.model_name.set(model_name.into());
    }

    pub fn is_ready(&self) -> bool {
        self.dispatcher.get().is_some()
    }

    pub fn dispatcher(&self) -> Option<&Arc<Dispatcher>> {
        self.dispatcher.get()
    }

    pub fn model_name(&self) -> Option<&str> {
        self.model_name.get().map(String::as_str)
    }
}

/// 翻译请求：`text` 与 `texts` 必须恰好给出一个
#[derive(Debug, Deserialize)]
pub struct TranslateRequest {
    pub text: Option<String>,
    pub texts: Option<Vec<String>>,
}

/// 翻译响应
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum TranslateResponse {
    One { translation: String },
    Many { translations: Vec<String> },
}

/// 健康检查响应
///
/// 未就绪时只有 `status` 与 `ready`；就绪后附带组件健康与队列统计。
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<&'static str>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub components: BTreeMap<String, &'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue: Option<QueueReport>,
}

impl HealthResponse {
    pub fn not_ready() -> Self {
        Self {
            status: "ok",
            ready: false,
            model: None,
            health: None,
            components: BTreeMap::new(),
            queue: None,
        }
    }
}

/// 调度队列统计
#[derive(Debug, Serialize)]
pub struct QueueReport {
    /// `None` 表示无界队列
    pub capacity: Option<usize>,
    pub workers: usize,
    pub queued: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub rejected: usize,
    pub timed_out: usize,
}

impl QueueReport {
    pub fn from_dispatcher(dispatcher: &Dispatcher) -> Self {
        let stats = dispatcher.stats();
        Self {
            capacity: dispatcher.config().queue_depth,
            workers: dispatcher.config().workers,
            queued: stats.queued,
            running: stats.running,
            completed: stats.completed,
            failed: stats.failed,
            rejected: stats.rejected,
            timed_out: stats.timed_out,
        }
    }
}

/// 错误响应
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: &'static str,
}

/// 处理器的错误返回类型
pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// 将翻译错误映射为 HTTP 状态码与错误负载
pub fn error_response(error: &TranslationError) -> ApiError {
    let category = error.category();
    let status = match category {
        ErrorCategory::Capacity | ErrorCategory::Availability => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCategory::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorCategory::Input => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            kind: category.as_str(),
        }),
    )
}
