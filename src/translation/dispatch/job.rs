//! 翻译任务与任务句柄

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::translation::engine::InferenceParams;
use crate::translation::error::{TranslationError, TranslationResult};

use super::pool::DispatchStats;

/// 任务编号，由调度器单调分配
pub type JobId = u64;

/// 任务输入
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobInput {
    One(String),
    Many(Vec<String>),
}

impl JobInput {
    pub fn len(&self) -> usize {
        match self {
            JobInput::One(_) => 1,
            JobInput::Many(texts) => texts.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 任务输出，形状与输入一致
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutput {
    One(String),
    Many(Vec<String>),
}

/// 一次入站调用对应的翻译任务
#[derive(Debug, Clone)]
pub struct TranslationJob {
    pub id: JobId,
    pub input: JobInput,
    pub params: InferenceParams,
}

/// 任务状态：`Submitted → Running → {Completed | Failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    Submitted,
    Running,
    Completed,
    Failed,
}

impl JobState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => JobState::Submitted,
            1 => JobState::Running,
            2 => JobState::Completed,
            _ => JobState::Failed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            JobState::Submitted => 0,
            JobState::Running => 1,
            JobState::Completed => 2,
            JobState::Failed => 3,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Submitted => "submitted",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// 调用方与工作线程共享的状态机
#[derive(Debug)]
pub(crate) struct JobTracker(AtomicU8);

impl JobTracker {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(JobState::Submitted.as_u8()))
    }

    pub(crate) fn state(&self) -> JobState {
        JobState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn transition(&self, from: JobState, to: JobState) -> bool {
        self.0
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// 工作线程领取任务；已被放弃的任务返回 false
    pub(crate) fn try_start(&self) -> bool {
        self.transition(JobState::Submitted, JobState::Running)
    }

    pub(crate) fn complete(&self) -> bool {
        self.transition(JobState::Running, JobState::Completed)
    }

    /// 从任何非终止状态转为失败
    pub(crate) fn fail(&self) -> bool {
        self.transition(JobState::Submitted, JobState::Failed)
            || self.transition(JobState::Running, JobState::Failed)
    }
}

/// 已提交任务的句柄
///
/// `wait` 挂起的是调用方的异步任务而不是运行时线程；超时后任务被标记为失败并放弃。
pub struct PendingJob {
    id: JobId,
    tracker: Arc<JobTracker>,
    reply: oneshot::Receiver<TranslationResult<JobOutput>>,
    timeout: Duration,
    stats: Arc<DispatchStats>,
}

impl PendingJob {
    pub(crate) fn new(
        id: JobId,
        tracker: Arc<JobTracker>,
        reply: oneshot::Receiver<TranslationResult<JobOutput>>,
        timeout: Duration,
        stats: Arc<DispatchStats>,
    ) -> Self {
        Self {
            id,
            tracker,
            reply,
            timeout,
            stats,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    /// 当前状态
    pub fn state(&self) -> JobState {
        self.tracker.state()
    }

    /// 等待结果，最长等待 `job_timeout`
    pub async fn wait(self) -> TranslationResult<JobOutput> {
        match tokio::time::timeout(self.timeout, self.reply).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(TranslationError::InternalError(format!(
                "任务 {} 的结果通道被提前关闭",
                self.id
            ))),
            Err(_) => {
                self.tracker.fail();
                let error = TranslationError::JobTimeout(self.timeout);
                self.stats.record_timeout(&error);
                tracing::warn!("任务 {} 超时 ({:?})，已放弃", self.id, self.timeout);
                Err(error)
            }
        }
    }
}

impl fmt::Debug for PendingJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingJob")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_follows_state_machine() {
        let tracker = JobTracker::new();
        assert_eq!(tracker.state(), JobState::Submitted);
        assert!(!tracker.complete());
        assert!(tracker.try_start());
        assert!(!tracker.try_start());
        assert!(tracker.complete());
        assert!(!tracker.fail());
        assert_eq!(tracker.state(), JobState::Completed);
    }

    #[test]
    fn abandoned_job_cannot_start() {
        let tracker = JobTracker::new();
        assert!(tracker.fail());
        assert!(!tracker.try_start());
        assert!(tracker.state().is_terminal());
    }

    #[test]
    fn input_len_counts_texts() {
        assert_eq!(JobInput::One("a".into()).len(), 1);
        assert!(JobInput::Many(Vec::new()).is_empty());
    }
}
