//! HTTP 接口集成测试
//!
//! 直接驱动 axum 路由，不监听端口

#![cfg(feature = "web")]

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use opusmt::translation::engine::{DecodeStep, Seq2SeqModel};
use opusmt::translation::error::TranslationResult;
use opusmt::translation::{JobInput, JobState};
use opusmt::web::{create_router, AppState};

#[allow(dead_code)]
mod common {
    include!("common/mod.rs");
}

use common::{
    dispatch_config, lexicon_service, service_with, start_dispatcher, test_codec,
    wait_for_state, GatedModel,
};

fn ready_router() -> Router {
    let dispatcher = start_dispatcher(
        lexicon_service(),
        dispatch_config(2, Some(16), Duration::from_secs(10)),
    );
    create_router(Arc::new(AppState::ready(dispatcher, "lexicon")))
}

fn translate_request(body: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/translate")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

/// 批量翻译请求
#[tokio::test]
async fn test_translate_batch_endpoint() {
    let (status, body) = send(
        ready_router(),
        translate_request(r#"{"texts": ["Hello", "How are you?"]}"#),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"translations": ["Bonjour", "Comment allez-vous ?"]})
    );

    println!("✅ 批量翻译接口测试通过");
}

/// 单条翻译请求
#[tokio::test]
async fn test_translate_single_endpoint() {
    let (status, body) = send(ready_router(), translate_request(r#"{"text": "Hello world"}"#)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"translation": "Bonjour monde"}));

    let (status, body) = send(ready_router(), translate_request(r#"{"texts": []}"#)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"translations": []}));

    println!("✅ 单条翻译接口测试通过");
}

/// 请求体必须恰好包含 text 或 texts 之一
#[tokio::test]
async fn test_malformed_requests_are_rejected() {
    let cases = [
        r#"{"text": "Hello", "texts": ["Hello"]}"#,
        r#"{}"#,
        r#"{"texts": "Hello"}"#,
        r#"not json at all"#,
    ];

    for case in cases {
        let (status, body) = send(ready_router(), translate_request(case)).await;
        assert_eq!(
            status,
            StatusCode::UNPROCESSABLE_ENTITY,
            "Body {:?} should be rejected",
            case
        );
        assert_eq!(body["kind"], "input", "Body {:?}", case);
        assert!(body["error"].is_string());
    }

    println!("✅ 非法请求测试通过");
}

/// 模型加载完成前翻译返回 503，健康检查报告未就绪
#[tokio::test]
async fn test_not_ready_state() {
    let router = create_router(Arc::new(AppState::new()));

    let health = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(router.clone(), health).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok", "ready": false}));

    let (status, body) = send(router, translate_request(r#"{"text": "Hello"}"#)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["kind"], "unavailable");

    println!("✅ 未就绪状态测试通过");
}

/// 就绪后健康检查带上模型名称、组件健康与队列统计
#[tokio::test]
async fn test_health_reports_model() {
    let health = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(ready_router(), health).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "status": "ok",
            "ready": true,
            "model": "lexicon",
            "health": "healthy",
            "components": {"codec": "healthy", "engine": "healthy"},
            "queue": {
                "capacity": 16,
                "workers": 2,
                "queued": 0,
                "running": 0,
                "completed": 0,
                "failed": 0,
                "rejected": 0,
                "timed_out": 0
            }
        })
    );

    println!("✅ 健康检查测试通过");
}

/// 解码异常在健康检查中体现为编解码器降级
#[tokio::test]
async fn test_health_reflects_decoding_anomalies() {
    struct OutOfVocabularyModel;

    impl Seq2SeqModel for OutOfVocabularyModel {
        fn name(&self) -> &str {
            "out-of-vocabulary"
        }

        fn output_vocab_size(&self) -> usize {
            40
        }

        fn next_log_probs(&self, steps: &[DecodeStep<'_>]) -> TranslationResult<Vec<Vec<f32>>> {
            Ok(steps
                .iter()
                .map(|step| {
                    let next = if step.prefix.is_empty() { 33 } else { 0 };
                    let mut dist = vec![f32::NEG_INFINITY; 40];
                    dist[next] = 0.0;
                    dist
                })
                .collect())
        }
    }

    let dispatcher = start_dispatcher(
        service_with(Arc::new(OutOfVocabularyModel)),
        dispatch_config(1, None, Duration::from_secs(10)),
    );
    let router = create_router(Arc::new(AppState::ready(dispatcher, "out-of-vocabulary")));

    let (status, _) = send(router.clone(), translate_request(r#"{"text": "Hello"}"#)).await;
    assert_eq!(status, StatusCode::OK);

    let health = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(router, health).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["health"], "degraded");
    assert_eq!(body["components"]["codec"], "degraded");
    assert_eq!(body["components"]["engine"], "healthy");
    assert_eq!(body["queue"]["capacity"], Value::Null);
    assert_eq!(body["queue"]["failed"], 0);

    println!("✅ 健康检查异常降级测试通过");
}

/// 后台加载完成后安装调度器
#[tokio::test]
async fn test_install_makes_state_ready() {
    let state = Arc::new(AppState::new());
    let router = create_router(Arc::clone(&state));
    assert!(!state.is_ready());

    let dispatcher = start_dispatcher(
        lexicon_service(),
        dispatch_config(1, Some(4), Duration::from_secs(10)),
    );
    state.install(dispatcher, "lexicon");
    assert!(state.is_ready());

    let (status, body) = send(router, translate_request(r#"{"text": "Hello"}"#)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"translation": "Bonjour"}));

    println!("✅ 延迟就绪测试通过");
}

/// 队列已满映射为 503
#[tokio::test]
async fn test_capacity_exceeded_maps_to_503() {
    let model = Arc::new(GatedModel::new(test_codec().vocab_size()));
    let dispatcher = start_dispatcher(
        service_with(model.clone()),
        dispatch_config(1, Some(1), Duration::from_secs(10)),
    );
    let router = create_router(Arc::new(AppState::ready(Arc::clone(&dispatcher), "gated")));

    let running = dispatcher
        .submit(dispatcher.job(JobInput::One("Hello".into())))
        .unwrap();
    wait_for_state(&running, JobState::Running).await;
    let queued = dispatcher
        .submit(dispatcher.job(JobInput::One("Hello".into())))
        .unwrap();

    let (status, body) = send(router, translate_request(r#"{"text": "Hello"}"#)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["kind"], "capacity");

    model.gate.open();
    assert!(running.wait().await.is_ok());
    assert!(queued.wait().await.is_ok());
    dispatcher.shutdown();

    println!("✅ 队满状态码测试通过");
}

/// 超时映射为 504
#[tokio::test]
async fn test_timeout_maps_to_504() {
    let model = Arc::new(GatedModel::new(test_codec().vocab_size()));
    let dispatcher = start_dispatcher(
        service_with(model.clone()),
        dispatch_config(1, Some(4), Duration::from_millis(50)),
    );
    let router = create_router(Arc::new(AppState::ready(Arc::clone(&dispatcher), "gated")));

    let (status, body) = send(router, translate_request(r#"{"text": "Hello"}"#)).await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["kind"], "timeout");

    model.gate.open();
    dispatcher.shutdown();

    println!("✅ 超时状态码测试通过");
}

/// 跨域请求带上 CORS 头
#[tokio::test]
async fn test_cors_headers() {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/translate")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::ORIGIN, "http://example.com")
        .body(Body::from(r#"{"text": "Hello"}"#))
        .unwrap();

    let response = ready_router().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN),
        "Permissive CORS should answer cross-origin requests"
    );

    println!("✅ CORS 测试通过");
}
