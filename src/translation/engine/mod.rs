//! 批量推理引擎
//!
//! - `model`: 模型运行时接口与回显运行时
//! - `beam`: 批量束搜索
//! - `marian`: candle 驱动的 Marian 运行时（`candle` 特性）

pub mod beam;
#[cfg(feature = "candle")]
pub mod marian;
pub mod model;

pub use beam::{
    BeamSearchEngine, EngineConfig, EngineStats, EngineStatsSnapshot, Hypothesis,
    InferenceParams, RankedHypotheses,
};
#[cfg(feature = "candle")]
pub use marian::MarianModel;
pub use model::{DecodeStep, EchoModel, Seq2SeqModel};
