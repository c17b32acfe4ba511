//! 翻译API处理器

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Json as ExtractJson, State},
    response::Json,
};

use crate::translation::TranslationError;
use crate::web::types::{error_response, ApiError, AppState, TranslateRequest, TranslateResponse};

/// `POST /translate`
///
/// 请求体为 `{"text": ...}` 或 `{"texts": [...]}`。翻译任务交给调度器，处理器只等待完成通知。
pub async fn translate(
    State(state): State<Arc<AppState>>,
    body: Result<ExtractJson<TranslateRequest>, JsonRejection>,
) -> Result<Json<TranslateResponse>, ApiError> {
    let ExtractJson(request) = body.map_err(|rejection| {
        error_response(&TranslationError::InvalidInput(rejection.body_text()))
    })?;

    let dispatcher = state.dispatcher().ok_or_else(|| {
        error_response(&TranslationError::ServiceUnavailable(
            "模型尚未加载完成".to_string(),
        ))
    })?;

    let result = match (request.text, request.texts) {
        (Some(text), None) => dispatcher
            .translate_one(text)
            .await
            .map(|translation| TranslateResponse::One { translation }),
        (None, Some(texts)) => {
            let count = texts.len();
            tracing::debug!("收到批量翻译请求: {} 条文本", count);
            dispatcher
                .translate_many(texts)
                .await
                .map(|translations| TranslateResponse::Many { translations })
        }
        (Some(_), Some(_)) => Err(TranslationError::InvalidInput(
            "只能提供 text 或 texts 其中之一".to_string(),
        )),
        (None, None) => Err(TranslationError::InvalidInput(
            "请求体必须包含 text 或 texts".to_string(),
        )),
    };

    result.map(Json).map_err(|error| {
        if error.category() != crate::translation::ErrorCategory::Input {
            tracing::warn!("翻译请求失败: {}", error);
        }
        error_response(&error)
    })
}
