//! 翻译系统核心模块
//!
//! 服务层把编解码器和推理引擎组合起来：
//!
//! ```text
//! TranslationService (service.rs)
//!     ├── SymbolCodec (codec/)
//!     └── BeamSearchEngine (engine/beam.rs)
//!             └── Seq2SeqModel (engine/model.rs, engine/marian.rs)
//! ```

pub mod service;

/// 统一翻译服务 - 主要的对外接口
pub use service::TranslationService;

/// 服务运行统计信息
pub use service::{ServiceStats, ServiceStatsSnapshot};

/// 系统健康状态检查结果
pub use service::{HealthLevel, HealthStatus};
