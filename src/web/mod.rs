//! Web 服务器模块
//!
//! 提供 `GET /health` 与 `POST /translate`。模型在后台加载，加载期间健康检查报告
//! `ready: false`；加载失败时服务器退出并返回错误。

pub mod config;
pub mod handlers;
pub mod routes;
pub mod types;

pub use config::*;
pub use handlers::*;
pub use routes::*;
pub use types::*;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;

use crate::translation::{Dispatcher, ServiceConfig, TranslationError, TranslationResult, TranslationService};

/// Web 服务器
pub struct WebServer {
    config: WebConfig,
    service_config: ServiceConfig,
}

impl WebServer {
    /// 创建新的 Web 服务器
    pub fn new(service_config: ServiceConfig) -> Self {
        Self {
            config: WebConfig::from_service_config(&service_config),
            service_config,
        }
    }

    /// 启动 Web 服务器
    ///
    /// 先开始监听，再在阻塞线程池中加载模型；模型加载失败时停止服务并返回 `ConstructionError`。
    pub async fn start(self) -> TranslationResult<()> {
        self.config.validate()?;

        let state = Arc::new(AppState::new());
        let app = create_router(Arc::clone(&state));

        let address = self.config.listen_address();
        let listener = tokio::net::TcpListener::bind(&address)
            .await
            .map_err(|e| TranslationError::ConfigError(format!("绑定 {} 失败: {}", address, e)))?;

        tracing::info!("Web 服务已启动: http://{}", address);

        let mut server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await
        });

        let loader_state = Arc::clone(&state);
        let service_config = self.service_config.clone();
        let load = async move {
            let (dispatcher, model_name) =
                tokio::task::spawn_blocking(move || load_dispatcher(&service_config))
                    .await
                    .map_err(|e| {
                        TranslationError::InternalError(format!("模型加载线程异常: {}", e))
                    })??;
            loader_state.install(dispatcher, model_name.clone());
            tracing::info!("模型已就绪: {}", model_name);
            Ok::<(), TranslationError>(())
        };

        tokio::select! {
            loaded = load => {
                if let Err(error) = loaded {
                    tracing::error!("模型加载失败: {}", error);
                    server.abort();
                    return Err(error);
                }
            }
            finished = &mut server => {
                return flatten_server_result(finished);
            }
        }

        let finished = server.await;

        if let Some(dispatcher) = state.dispatcher() {
            let dispatcher = Arc::clone(dispatcher);
            let _ = tokio::task::spawn_blocking(move || dispatcher.shutdown()).await;
        }

        flatten_server_result(finished)
    }
}

/// 加载模型并启动调度器，返回调度器与模型名称
fn load_dispatcher(config: &ServiceConfig) -> TranslationResult<(Arc<Dispatcher>, String)> {
    let service = Arc::new(TranslationService::load(config)?);
    let model_name = service.model_name().to_string();
    let dispatcher = Dispatcher::start(service, config.dispatch_config())?;
    Ok((Arc::new(dispatcher), model_name))
}

fn flatten_server_result(
    finished: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> TranslationResult<()> {
    match finished {
        Ok(Ok(())) => {
            tracing::info!("Web 服务已停止");
            Ok(())
        }
        Ok(Err(e)) => Err(TranslationError::InternalError(format!("服务器错误: {}", e))),
        Err(e) => Err(TranslationError::InternalError(format!("服务器任务异常: {}", e))),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            tracing::warn!("无法监听 Ctrl+C 信号");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("收到停止信号，正在关闭");
}

/// 创建路由器
pub fn create_router(app_state: Arc<AppState>) -> Router {
    create_routes()
        .with_state(app_state)
        // 添加CORS支持
        .layer(CorsLayer::permissive())
}
