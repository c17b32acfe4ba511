//! 翻译模块
//!
//! 推理服务流水线，自底向上：
//! - **codec**: 文本与模型符号序列互转
//! - **engine**: 批量束搜索与模型运行时接口
//! - **core**: 编排编解码器与引擎的翻译服务
//! - **dispatch**: 有界任务队列与推理工作线程池
//! - **config**: 配置管理
//! - **error**: 错误处理
//!
//! # 基本用法
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use opusmt::translation::{ConfigManager, Dispatcher, TranslationService};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigManager::new()?.into_config();
//! let service = Arc::new(TranslationService::load(&config)?);
//! let dispatcher = Dispatcher::start(service, config.dispatch_config())?;
//!
//! let translations = dispatcher
//!     .translate_many(vec!["Hello".to_string(), "How are you?".to_string()])
//!     .await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// 子模块声明
// ============================================================================

/// 符号编解码器 - 词表加载、编码与解码
pub mod codec;

/// 配置管理模块 - 默认值、配置文件与环境变量覆盖
pub mod config;

/// 翻译服务模块 - 统计与健康检查
pub mod core;

/// 调度模块 - 任务队列、工作线程、超时
pub mod dispatch;

/// 推理引擎模块 - 束搜索与模型运行时
pub mod engine;

/// 错误处理模块 - 统一的错误类型和处理机制
pub mod error;

// ============================================================================
// 公共API重新导出
// ============================================================================

pub use codec::{BoundaryPolicy, CodecOptions, SpecialSymbols, SymbolCodec, SymbolId, SymbolSequence};
pub use config::{BackendKind, ConfigManager, ServiceConfig};
pub use core::{HealthLevel, HealthStatus, ServiceStats, TranslationService};
pub use dispatch::{
    DispatchConfig, Dispatcher, JobInput, JobOutput, JobState, PendingJob, TranslationJob,
};
pub use engine::{
    BeamSearchEngine, DecodeStep, EchoModel, EngineConfig, Hypothesis, InferenceParams,
    RankedHypotheses, Seq2SeqModel,
};
pub use error::{ErrorCategory, TranslationError, TranslationResult};
