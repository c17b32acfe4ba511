// 集成测试公共模块
//
// 提供测试用词表、分词器、模型目录与若干可控的模型运行时

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use opusmt::translation::codec::{CodecOptions, SymbolCodec, SymbolId};
use opusmt::translation::dispatch::{DispatchConfig, Dispatcher, JobState, PendingJob};
use opusmt::translation::engine::{
    DecodeStep, EchoModel, EngineConfig, InferenceParams, Seq2SeqModel,
};
use opusmt::translation::error::{TranslationError, TranslationResult};
use opusmt::translation::TranslationService;

pub const END: SymbolId = 0;
pub const UNK: SymbolId = 1;
pub const PAD: SymbolId = 2;

/// 英法小词表，编号与 Marian 的特殊符号布局一致
pub fn test_vocab() -> Vec<(&'static str, SymbolId)> {
    vec![
        ("</s>", END),
        ("<unk>", UNK),
        ("<pad>", PAD),
        ("▁Hello", 3),
        ("▁How", 4),
        ("▁are", 5),
        ("▁you", 6),
        ("?", 7),
        ("▁world", 8),
        ("!", 9),
        ("▁", 10),
        ("▁Bonjour", 11),
        ("▁Comment", 12),
        ("▁allez", 13),
        ("-vous", 14),
        ("▁?", 15),
        ("▁monde", 16),
    ]
}

/// 英 → 法逐符号对照
pub fn test_lexicon() -> HashMap<SymbolId, SymbolId> {
    [(3, 11), (4, 12), (5, 13), (6, 14), (7, 15), (8, 16)]
        .into_iter()
        .collect()
}

pub fn test_codec() -> Arc<SymbolCodec> {
    Arc::new(
        SymbolCodec::from_pieces(test_vocab(), CodecOptions::default())
            .expect("test vocabulary should be valid"),
    )
}

/// 写有 vocab.json 与分词器的临时模型目录
pub struct TestModelDir {
    pub dir: tempfile::TempDir,
}

impl TestModelDir {
    pub fn new() -> Self {
        let vocab: HashMap<&str, SymbolId> = test_vocab().into_iter().collect();
        Self::with_vocab_json(&serde_json::to_string(&vocab).unwrap())
    }

    /// 写入 vocab.json 与测试词表对应的 source_tokenizer.json
    pub fn with_vocab_json(content: &str) -> Self {
        let model_dir = Self::without_tokenizer(content);
        test_codec()
            .source_segmenter()
            .save(&model_dir.dir.path().join("source_tokenizer.json"))
            .expect("write source_tokenizer.json");
        model_dir
    }

    pub fn without_tokenizer(content: &str) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("vocab.json"), content).expect("write vocab.json");
        Self { dir }
    }

    pub fn empty() -> Self {
        Self {
            dir: tempfile::tempdir().expect("tempdir"),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    pub fn path_string(&self) -> String {
        self.dir.path().to_string_lossy().to_string()
    }
}

/// 按对照表逐符号输出源序列，源序列用完后输出结束符
pub struct LexiconModel {
    vocab_size: usize,
    lexicon: HashMap<SymbolId, SymbolId>,
}

impl LexiconModel {
    pub fn new(vocab_size: usize) -> Self {
        Self {
            vocab_size,
            lexicon: test_lexicon(),
        }
    }
}

impl Seq2SeqModel for LexiconModel {
    fn name(&self) -> &str {
        "lexicon"
    }

    fn output_vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn next_log_probs(&self, steps: &[DecodeStep<'_>]) -> TranslationResult<Vec<Vec<f32>>> {
        Ok(steps
            .iter()
            .map(|step| {
                let next = step
                    .source
                    .get(step.prefix.len())
                    .map(|s| *self.lexicon.get(s).unwrap_or(s))
                    .unwrap_or(END);
                let mut dist = vec![f32::NEG_INFINITY; self.vocab_size];
                dist[next as usize] = 0.0;
                dist
            })
            .collect())
    }
}

/// 统计调用次数的包装
pub struct CountingModel<M> {
    pub inner: M,
    pub calls: AtomicUsize,
    pub steps: AtomicUsize,
}

impl<M> CountingModel<M> {
    pub fn new(inner: M) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
            steps: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<M: Seq2SeqModel> Seq2SeqModel for CountingModel<M> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn output_vocab_size(&self) -> usize {
        self.inner.output_vocab_size()
    }

    fn next_log_probs(&self, steps: &[DecodeStep<'_>]) -> TranslationResult<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.steps.fetch_add(steps.len(), Ordering::SeqCst);
        self.inner.next_log_probs(steps)
    }
}

/// 手动开启的闸门
#[derive(Default)]
pub struct Gate {
    open: Mutex<bool>,
    cv: Condvar,
}

impl Gate {
    pub fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.cv.notify_all();
    }

    fn wait(&self) {
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.cv.wait(open).unwrap();
        }
    }
}

/// 在闸门打开前阻塞的回显运行时，用来占住工作线程
pub struct GatedModel {
    inner: EchoModel,
    pub gate: Arc<Gate>,
    pub entered: AtomicUsize,
}

impl GatedModel {
    pub fn new(vocab_size: usize) -> Self {
        Self {
            inner: EchoModel::new(vocab_size, END),
            gate: Arc::new(Gate::default()),
            entered: AtomicUsize::new(0),
        }
    }
}

impl Seq2SeqModel for GatedModel {
    fn name(&self) -> &str {
        "gated"
    }

    fn output_vocab_size(&self) -> usize {
        self.inner.output_vocab_size()
    }

    fn next_log_probs(&self, steps: &[DecodeStep<'_>]) -> TranslationResult<Vec<Vec<f32>>> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        self.gate.wait();
        self.inner.next_log_probs(steps)
    }
}

/// 总是失败的运行时
pub struct FailingModel;

impl Seq2SeqModel for FailingModel {
    fn name(&self) -> &str {
        "failing"
    }

    fn output_vocab_size(&self) -> usize {
        17
    }

    fn next_log_probs(&self, _steps: &[DecodeStep<'_>]) -> TranslationResult<Vec<Vec<f32>>> {
        Err(TranslationError::InferenceError("runtime exploded".to_string()))
    }
}

/// 遇到某个源符号时 panic 的运行时
pub struct PanickingModel {
    inner: EchoModel,
    trigger: SymbolId,
}

impl PanickingModel {
    pub fn new(vocab_size: usize, trigger: SymbolId) -> Self {
        Self {
            inner: EchoModel::new(vocab_size, END),
            trigger,
        }
    }
}

impl Seq2SeqModel for PanickingModel {
    fn name(&self) -> &str {
        "panicking"
    }

    fn output_vocab_size(&self) -> usize {
        self.inner.output_vocab_size()
    }

    fn next_log_probs(&self, steps: &[DecodeStep<'_>]) -> TranslationResult<Vec<Vec<f32>>> {
        if steps.iter().any(|s| s.source.contains(&self.trigger)) {
            panic!("model crashed on symbol {}", self.trigger);
        }
        self.inner.next_log_probs(steps)
    }
}

pub fn service_with(model: Arc<dyn Seq2SeqModel>) -> Arc<TranslationService> {
    Arc::new(TranslationService::new(
        test_codec(),
        model,
        EngineConfig::default(),
        InferenceParams::default(),
    ))
}

pub fn lexicon_service() -> Arc<TranslationService> {
    let codec = test_codec();
    service_with(Arc::new(LexiconModel::new(codec.vocab_size())))
}

pub fn dispatch_config(workers: usize, queue_depth: Option<usize>, timeout: Duration) -> DispatchConfig {
    DispatchConfig {
        workers,
        queue_depth,
        job_timeout: timeout,
        params: InferenceParams::default(),
    }
}

pub fn start_dispatcher(
    service: Arc<TranslationService>,
    config: DispatchConfig,
) -> Arc<Dispatcher> {
    Arc::new(Dispatcher::start(service, config).expect("dispatcher should start"))
}

/// 轮询直到条件成立或超时
pub async fn eventually<F: Fn() -> bool>(condition: F, what: &str) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub async fn wait_for_state(job: &PendingJob, state: JobState) {
    eventually(|| job.state() == state, &format!("job {} to be {}", job.id(), state)).await;
}
