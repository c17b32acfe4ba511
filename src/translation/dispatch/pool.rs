//! 推理工作线程池
//!
//! 固定数量的操作系统线程从共享队列中取任务执行，异步前端只负责入队与等待。
//! 队列有界时，队满的提交立即以 `CapacityExceeded` 失败。

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;

use crate::translation::config::{constants, default_workers};
use crate::translation::core::TranslationService;
use crate::translation::engine::InferenceParams;
use crate::translation::error::{ErrorStats, TranslationError, TranslationResult};

use super::job::{JobInput, JobOutput, JobTracker, PendingJob, TranslationJob};

/// 调度配置
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// 工作线程数
    pub workers: usize,
    /// 队列容量，`None` 表示不限制
    pub queue_depth: Option<usize>,
    /// 单任务等待上限
    pub job_timeout: Duration,
    /// 复制进每个任务的推理参数
    pub params: InferenceParams,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_depth: Some(constants::DEFAULT_QUEUE_DEPTH),
            job_timeout: constants::DEFAULT_JOB_TIMEOUT,
            params: InferenceParams::default(),
        }
    }
}

impl DispatchConfig {
    pub fn validate(&self) -> TranslationResult<()> {
        if self.workers == 0 {
            return Err(TranslationError::ConfigError("工作线程数不能为0".to_string()));
        }
        if self.queue_depth == Some(0) {
            return Err(TranslationError::ConfigError(
                "队列容量不能为0，不限制请使用 None".to_string(),
            ));
        }
        if self.job_timeout.is_zero() {
            return Err(TranslationError::ConfigError("任务超时必须大于0".to_string()));
        }
        self.params.validate()
    }
}

/// 队列中的任务
struct QueuedJob {
    job: TranslationJob,
    tracker: Arc<JobTracker>,
    reply: oneshot::Sender<TranslationResult<JobOutput>>,
    enqueued_at: Instant,
}

enum QueueSender {
    Bounded(SyncSender<QueuedJob>, usize),
    Unbounded(mpsc::Sender<QueuedJob>),
}

impl QueueSender {
    fn try_send(&self, queued: QueuedJob) -> TranslationResult<()> {
        match self {
            QueueSender::Bounded(tx, capacity) => tx.try_send(queued).map_err(|e| match e {
                TrySendError::Full(_) => TranslationError::CapacityExceeded {
                    capacity: *capacity,
                },
                TrySendError::Disconnected(_) => {
                    TranslationError::ServiceUnavailable("工作线程已全部退出".to_string())
                }
            }),
            QueueSender::Unbounded(tx) => tx.send(queued).map_err(|_| {
                TranslationError::ServiceUnavailable("工作线程已全部退出".to_string())
            }),
        }
    }
}

/// 调度统计
#[derive(Debug, Default)]
pub struct DispatchStats {
    pub submitted: AtomicUsize,
    pub rejected: AtomicUsize,
    /// 当前排队中的任务数
    pub queued: AtomicUsize,
    /// 当前执行中的任务数
    pub running: AtomicUsize,
    pub completed: AtomicUsize,
    pub failed: AtomicUsize,
    pub timed_out: AtomicUsize,
    errors: Mutex<ErrorStats>,
}

/// 调度统计快照
#[derive(Debug, Clone, Default)]
pub struct DispatchStatsSnapshot {
    pub submitted: usize,
    pub rejected: usize,
    pub queued: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub errors: ErrorStats,
}

impl DispatchStats {
    fn record_error(&self, error: &TranslationError) {
        if let Ok(mut errors) = self.errors.lock() {
            errors.record_error(error);
        }
    }

    pub(crate) fn record_timeout(&self, error: &TranslationError) {
        self.timed_out.fetch_add(1, Ordering::Relaxed);
        self.record_error(error);
    }

    pub fn snapshot(&self) -> DispatchStatsSnapshot {
        DispatchStatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
            running: self.running.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            errors: self
                .errors
                .lock()
                .map(|errors| errors.clone())
                .unwrap_or_default(),
        }
    }
}

/// 任务调度器
///
/// 持有有界（或无界）任务队列和固定数量的工作线程。`submit` 从不执行编解码或推理，
/// 因此可以直接在异步运行时中调用。
pub struct Dispatcher {
    service: Arc<TranslationService>,
    sender: Mutex<Option<QueueSender>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    config: DispatchConfig,
    stats: Arc<DispatchStats>,
    next_id: AtomicU64,
}

impl Dispatcher {
    /// 启动工作线程
    pub fn start(service: Arc<TranslationService>, config: DispatchConfig) -> TranslationResult<Self> {
        config.validate()?;

        let (sender, receiver) = match config.queue_depth {
            Some(capacity) => {
                let (tx, rx) = mpsc::sync_channel(capacity);
                (QueueSender::Bounded(tx, capacity), rx)
            }
            None => {
                let (tx, rx) = mpsc::channel();
                (QueueSender::Unbounded(tx), rx)
            }
        };

        let receiver = Arc::new(Mutex::new(receiver));
        let stats = Arc::new(DispatchStats::default());
        let mut workers = Vec::with_capacity(config.workers);

        for index in 0..config.workers {
            let receiver = Arc::clone(&receiver);
            let service = Arc::clone(&service);
            let stats = Arc::clone(&stats);
            let handle = thread::Builder::new()
                .name(format!("translate-worker-{}", index))
                .spawn(move || worker_loop(index, receiver, service, stats))
                .map_err(|e| {
                    TranslationError::InternalError(format!("启动工作线程失败: {}", e))
                })?;
            workers.push(handle);
        }

        tracing::info!(
            "调度器已启动: {} 个工作线程, 队列容量 {}, 任务超时 {:?}",
            config.workers,
            config
                .queue_depth
                .map(|n| n.to_string())
                .unwrap_or_else(|| "不限".to_string()),
            config.job_timeout
        );

        Ok(Self {
            service,
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            config,
            stats,
            next_id: AtomicU64::new(1),
        })
    }

    /// 用调度器的固定推理参数创建任务
    pub fn job(&self, input: JobInput) -> TranslationJob {
        TranslationJob {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            input,
            params: self.config.params,
        }
    }

    /// 提交任务，不阻塞
    pub fn submit(&self, job: TranslationJob) -> TranslationResult<PendingJob> {
        let id = job.id;
        let tracker = Arc::new(JobTracker::new());
        let (reply_tx, reply_rx) = oneshot::channel();
        let queued = QueuedJob {
            job,
            tracker: Arc::clone(&tracker),
            reply: reply_tx,
            enqueued_at: Instant::now(),
        };

        let sent = {
            let sender = self.sender.lock().map_err(|_| {
                TranslationError::InternalError("调度器队列锁已中毒".to_string())
            })?;
            match sender.as_ref() {
                Some(sender) => {
                    // 先计数，避免工作线程在入队后立刻取走导致计数下溢
                    self.stats.queued.fetch_add(1, Ordering::Relaxed);
                    let sent = sender.try_send(queued);
                    if sent.is_err() {
                        self.stats.queued.fetch_sub(1, Ordering::Relaxed);
                    }
                    sent
                }
                None => Err(TranslationError::ServiceUnavailable(
                    "调度器已关闭".to_string(),
                )),
            }
        };

        if let Err(error) = sent {
            self.stats.rejected.fetch_add(1, Ordering::Relaxed);
            self.stats.record_error(&error);
            tracing::warn!("任务 {} 被拒绝: {}", id, error);
            return Err(error);
        }

        self.stats.submitted.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("任务 {} 已入队", id);

        Ok(PendingJob::new(
            id,
            tracker,
            reply_rx,
            self.config.job_timeout,
            Arc::clone(&self.stats),
        ))
    }

    /// 提交单条文本并等待结果
    pub async fn translate_one(&self, text: impl Into<String>) -> TranslationResult<String> {
        let pending = self.submit(self.job(JobInput::One(text.into())))?;
        match pending.wait().await? {
            JobOutput::One(translation) => Ok(translation),
            JobOutput::Many(_) => Err(TranslationError::InternalError(
                "单条任务返回了批量结果".to_string(),
            )),
        }
    }

    /// 提交一组文本并等待结果，输出与输入同序
    pub async fn translate_many(&self, texts: Vec<String>) -> TranslationResult<Vec<String>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let pending = self.submit(self.job(JobInput::Many(texts)))?;
        match pending.wait().await? {
            JobOutput::Many(translations) => Ok(translations),
            JobOutput::One(_) => Err(TranslationError::InternalError(
                "批量任务返回了单条结果".to_string(),
            )),
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// 工作线程共享的翻译服务，用于读取统计与健康状态
    pub fn service(&self) -> &Arc<TranslationService> {
        &self.service
    }

    pub fn stats(&self) -> DispatchStatsSnapshot {
        self.stats.snapshot()
    }

    /// 关闭队列并等待工作线程退出；已入队的任务会先执行完
    pub fn shutdown(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }

        let handles = match self.workers.lock() {
            Ok(mut workers) => std::mem::take(&mut *workers),
            Err(_) => Vec::new(),
        };
        let count = handles.len();
        for handle in handles {
            if handle.join().is_err() {
                tracing::error!("工作线程异常退出");
            }
        }
        if count > 0 {
            tracing::info!("调度器已关闭，{} 个工作线程已退出", count);
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
    }
}

fn worker_loop(
    index: usize,
    receiver: Arc<Mutex<Receiver<QueuedJob>>>,
    service: Arc<TranslationService>,
    stats: Arc<DispatchStats>,
) {
    tracing::debug!("工作线程 {} 已启动", index);

    loop {
        let next = {
            let guard = match receiver.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            guard.recv()
        };

        let queued = match next {
            Ok(queued) => queued,
            Err(_) => break,
        };
        stats.queued.fetch_sub(1, Ordering::Relaxed);
        run_job(index, queued, &service, &stats);
    }

    tracing::debug!("工作线程 {} 退出", index);
}

fn run_job(index: usize, queued: QueuedJob, service: &TranslationService, stats: &DispatchStats) {
    let QueuedJob {
        job,
        tracker,
        reply,
        enqueued_at,
    } = queued;

    if reply.is_closed() || !tracker.try_start() {
        tracing::debug!("任务 {} 已被放弃，跳过", job.id);
        return;
    }

    stats.running.fetch_add(1, Ordering::Relaxed);
    let waited = enqueued_at.elapsed();
    let started = Instant::now();

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        execute(service, &job).map_err(|e| e.with_context(format!("任务 {}", job.id)))
    }))
    .unwrap_or_else(|payload| {
        Err(TranslationError::InternalError(format!(
            "工作线程 {} 执行任务 {} 时 panic: {}",
            index,
            job.id,
            panic_message(payload.as_ref())
        )))
    });

    stats.running.fetch_sub(1, Ordering::Relaxed);

    match &result {
        Ok(_) => {
            if tracker.complete() {
                stats.completed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    "任务 {} 完成: {} 条文本, 排队 {:?}, 执行 {:?}",
                    job.id,
                    job.input.len(),
                    waited,
                    started.elapsed()
                );
            } else {
                tracing::debug!("任务 {} 完成时已被放弃", job.id);
            }
        }
        Err(error) => {
            if tracker.fail() {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                stats.record_error(error);
            }
            tracing::error!("任务 {} 失败: {}", job.id, error);
        }
    }

    let _ = reply.send(result);
}

fn execute(service: &TranslationService, job: &TranslationJob) -> TranslationResult<JobOutput> {
    match &job.input {
        JobInput::One(text) => {
            let mut out = service.translate_with(&[text.as_str()], &job.params)?;
            out.pop().map(JobOutput::One).ok_or_else(|| {
                TranslationError::InternalError("引擎未返回任何结果".to_string())
            })
        }
        JobInput::Many(texts) => service
            .translate_with(texts.as_slice(), &job.params)
            .map(JobOutput::Many),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "未知 panic".to_string()
    }
}
