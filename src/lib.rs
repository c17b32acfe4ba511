//! # opusmt
//!
//! 批量序列到序列翻译服务：把文本编码为模型符号、做批量束搜索、解码回文本，
//! 并在固定的工作线程池上执行推理，使接收请求的前端始终保持响应。
//!
//! ## 模块组织
//!
//! - `env` - 类型安全的环境变量
//! - `translation` - 编解码器、推理引擎、翻译服务与调度层
//! - `web` - HTTP 前端（可选，`web` 特性）

pub mod env;
pub mod translation;
#[cfg(feature = "web")]
pub mod web;

// Re-export commonly used items for convenience
pub use translation::{
    Dispatcher, ServiceConfig, TranslationError, TranslationResult, TranslationService,
};
