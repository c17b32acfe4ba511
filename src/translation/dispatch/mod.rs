//! 调度/卸载层
//!
//! 让接收请求的异步前端保持响应：CPU 密集的推理在固定数量的工作线程上执行，
//! 结果通过 oneshot 通道异步送回调用方。
//!
//! ```text
//! handler ──submit──▶ [有界队列] ──▶ translate-worker-N ──▶ TranslationService
//!    ▲                                       │
//!    └──────────── oneshot 完成通知 ◀────────┘
//! ```

pub mod job;
pub mod pool;

pub use job::{JobId, JobInput, JobOutput, JobState, PendingJob, TranslationJob};
pub use pool::{DispatchConfig, DispatchStats, DispatchStatsSnapshot, Dispatcher};
