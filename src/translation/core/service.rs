//! 翻译服务核心实现
//!
//! 本模块把符号编解码器与批量推理引擎组合成对外的翻译接口。服务构建完成后只读，
//! 可以通过 `Arc` 交给调度层的所有工作线程共享。
//!
//! ## 主要组件
//!
//! - `TranslationService`: 编码 → 推理 → 解码的编排
//! - `ServiceStats`: 线程安全的统计信息收集器
//! - `HealthStatus`: 服务健康状态监控
//!
//! ## 使用示例
//!
//! ```rust,no_run
//! use opusmt::translation::{ServiceConfig, TranslationService};
//!
//! let service = TranslationService::load(&ServiceConfig::default())?;
//! let french = service.translate_one("Hello")?;
//! let batch = service.translate_many(&["Hello", "How are you?"])?;
//! println!("{} / {:?}", french, batch);
//! # Ok::<(), opusmt::translation::TranslationError>(())
//! ```

use std::path::Path;
use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Arc,
};
use std::time::Instant;

use crate::translation::{
    codec::SymbolCodec,
    config::{BackendKind, ServiceConfig},
    engine::{BeamSearchEngine, EchoModel, EngineConfig, InferenceParams, Seq2SeqModel},
    error::{TranslationError, TranslationResult},
};

/// 翻译服务
///
/// 整合两个子系统：
///
/// - **符号编解码器**: 文本与符号序列互转
/// - **批量推理引擎**: 对整批符号序列做束搜索
///
/// 默认推理参数来自固定配置，调度层会把它复制进每个任务。
///
/// ## 线程安全
///
/// 编解码器与模型运行时构建后不可变，统计信息使用原子操作，因此 `&self` 上的
/// 所有方法都可以从多个工作线程同时调用。
pub struct TranslationService {
    /// 符号编解码器，构建后只读
    codec: Arc<SymbolCodec>,

    /// 束搜索引擎，持有模型运行时
    engine: BeamSearchEngine,

    /// 默认推理参数
    params: InferenceParams,

    /// 服务统计信息
    stats: ServiceStats,
}

impl TranslationService {
    /// 用已构建的组件创建服务
    ///
    /// # 参数
    ///
    /// * `codec` - 符号编解码器，其结束符也是引擎的结束符
    /// * `model` - 模型运行时
    /// * `engine_config` - 引擎分块配置
    /// * `params` - 默认推理参数
    pub fn new(
        codec: Arc<SymbolCodec>,
        model: Arc<dyn Seq2SeqModel>,
        engine_config: EngineConfig,
        params: InferenceParams,
    ) -> Self {
        let end_symbol = codec.specials().end;
        if model.output_vocab_size() != codec.vocab_size() {
            tracing::warn!(
                "模型输出维度 {} 与词表维度 {} 不一致",
                model.output_vocab_size(),
                codec.vocab_size()
            );
        }

        Self {
            codec,
            engine: BeamSearchEngine::new(model, end_symbol, engine_config),
            params,
            stats: ServiceStats::default(),
        }
    }

    /// 模型加载器：从 `model_dir` 构建编解码器与配置的后端
    ///
    /// 启动期调用一次。任何工件缺失或损坏都返回 `ConstructionError`，调用方应当让进程
    /// 以非零状态退出。
    ///
    /// # 错误
    ///
    /// - `vocab.json` 缺失、格式错误、编号重复或缺少特殊符号
    /// - `source_tokenizer.json` 缺失或无法解析
    /// - Marian 后端缺少 `config.json` / `model.safetensors`
    /// - 未启用 `candle` 特性却选择了 Marian 后端
    pub fn load(config: &ServiceConfig) -> TranslationResult<Self> {
        let start_time = Instant::now();
        let dir = shellexpand::tilde(&config.model_dir).to_string();
        let dir = Path::new(&dir);

        if !dir.is_dir() {
            return Err(TranslationError::ConstructionError(format!(
                "模型目录不存在: {}",
                dir.display()
            )));
        }

        let codec = Arc::new(SymbolCodec::from_dir(dir, config.codec_options())?);
        let model = Self::load_backend(config.backend, dir, &codec)?;

        tracing::info!(
            "模型加载完成: {} (后端 {}, 耗时 {:?})",
            dir.display(),
            config.backend.as_str(),
            start_time.elapsed()
        );

        Ok(Self::new(
            codec,
            model,
            config.engine_config(),
            config.inference_params(),
        ))
    }

    #[cfg_attr(not(feature = "candle"), allow(unused_variables))]
    fn load_backend(
        backend: BackendKind,
        dir: &Path,
        codec: &SymbolCodec,
    ) -> TranslationResult<Arc<dyn Seq2SeqModel>> {
        match backend {
            BackendKind::Echo => {
                tracing::warn!("使用 echo 后端：输出为源文本本身，不是翻译结果");
                Ok(Arc::new(EchoModel::new(
                    codec.vocab_size(),
                    codec.specials().end,
                )))
            }
            #[cfg(feature = "candle")]
            BackendKind::Marian => Ok(Arc::new(crate::translation::engine::MarianModel::load(
                dir,
            )?)),
            #[cfg(not(feature = "candle"))]
            BackendKind::Marian => Err(TranslationError::ConstructionError(
                "Marian 后端需要启用 candle 特性".to_string(),
            )),
        }
    }

    /// 翻译单条文本
    ///
    /// 等价于 `decode(best(translate_batch([encode(text)])))`。
    pub fn translate_one(&self, text: &str) -> TranslationResult<String> {
        let mut translations = self.translate_with(&[text], &self.params)?;
        translations.pop().ok_or_else(|| {
            TranslationError::InternalError("引擎未返回任何结果".to_string())
        })
    }

    /// 翻译一组文本，输出与输入同序
    ///
    /// 整组文本只调用一次引擎；空输入直接返回空结果，不调用引擎。
    pub fn translate_many<S: AsRef<str>>(&self, texts: &[S]) -> TranslationResult<Vec<String>> {
        self.translate_with(texts, &self.params)
    }

    /// 使用指定推理参数翻译，调度层通过这里执行任务
    pub fn translate_with<S: AsRef<str>>(
        &self,
        texts: &[S],
        params: &InferenceParams,
    ) -> TranslationResult<Vec<String>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let start_time = Instant::now();
        let encoded: Vec<_> = texts
            .iter()
            .map(|text| self.codec.encode(text.as_ref()))
            .collect();
        let chars: usize = texts.iter().map(|t| t.as_ref().chars().count()).sum();

        self.stats.inc_engine_calls();
        let ranked = match self.engine.translate_batch(&encoded, params) {
            Ok(ranked) => ranked,
            Err(e) => {
                self.stats.inc_errors();
                tracing::error!("批量推理失败 ({} 条文本): {}", texts.len(), e);
                return Err(e);
            }
        };

        if ranked.len() != texts.len() {
            self.stats.inc_errors();
            return Err(TranslationError::InternalError(format!(
                "引擎返回 {} 个结果，期望 {}",
                ranked.len(),
                texts.len()
            )));
        }

        let translations: Vec<String> = ranked
            .iter()
            .map(|hypotheses| {
                let symbols = hypotheses
                    .best()
                    .map(|best| best.symbols.as_slice())
                    .unwrap_or(&[]);
                let report = self.codec.decode_with_report(symbols);
                if report.anomalies > 0 {
                    self.stats.add_anomalies(report.anomalies);
                }
                report.text
            })
            .collect();

        self.stats.add_texts_translated(texts.len());
        self.stats.add_chars_processed(chars);
        self.stats.add_processing_time(start_time.elapsed());
        tracing::debug!(
            "翻译完成: {} 条文本, {} 个字符, 耗时 {:?}",
            texts.len(),
            chars,
            start_time.elapsed()
        );

        Ok(translations)
    }

    /// 默认推理参数
    pub fn params(&self) -> &InferenceParams {
        &self.params
    }

    pub fn codec(&self) -> &SymbolCodec {
        &self.codec
    }

    /// 模型运行时名称
    pub fn model_name(&self) -> &str {
        self.engine.model().name()
    }

    /// 获取服务统计信息的只读引用
    pub fn get_stats(&self) -> &ServiceStats {
        &self.stats
    }

    /// 获取服务健康状态
    ///
    /// 解码异常说明模型输出与词表不匹配，此时编解码器组件视为降级；
    /// 出现过推理失败时引擎组件视为降级。
    pub fn get_health(&self) -> HealthStatus {
        let snapshot = self.stats.snapshot();
        let mut components = std::collections::HashMap::new();

        let codec_level = if snapshot.decoding_anomalies > 0 {
            HealthLevel::Degraded
        } else {
            HealthLevel::Healthy
        };
        components.insert("codec".to_string(), codec_level);

        let engine_level = if snapshot.errors_encountered == 0 {
            HealthLevel::Healthy
        } else if snapshot.texts_translated == 0 {
            HealthLevel::Unhealthy
        } else {
            HealthLevel::Degraded
        };
        components.insert("engine".to_string(), engine_level);

        let overall = if components
            .values()
            .all(|&level| level == HealthLevel::Healthy)
        {
            HealthLevel::Healthy
        } else if components
            .values()
            .any(|&level| level == HealthLevel::Unhealthy)
        {
            HealthLevel::Unhealthy
        } else {
            HealthLevel::Degraded
        };

        HealthStatus {
            overall,
            components,
        }
    }
}

/// 翻译服务统计信息（线程安全版本）
///
/// - `texts_translated`: 成功翻译的文本数量
/// - `engine_calls`: 调用引擎 `translate_batch` 的次数
/// - `decoding_anomalies`: 解码时遇到的词表外符号数量
/// - `processing_time`: 总处理时间（微秒）
/// - `total_chars_processed`: 处理的源文本字符总数
/// - `errors_encountered`: 推理失败次数
#[derive(Debug, Default)]
pub struct ServiceStats {
    pub texts_translated: AtomicUsize,
    pub engine_calls: AtomicUsize,
    pub decoding_anomalies: AtomicUsize,
    /// 以微秒为单位存储
    pub processing_time: AtomicU64,
    pub total_chars_processed: AtomicUsize,
    pub errors_encountered: AtomicUsize,
}

impl ServiceStats {
    pub fn add_texts_translated(&self, count: usize) {
        self.texts_translated.fetch_add(count, Ordering::Relaxed);
    }

    pub fn inc_engine_calls(&self) {
        self.engine_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_anomalies(&self, count: usize) {
        self.decoding_anomalies.fetch_add(count, Ordering::Relaxed);
    }

    /// 累加处理时间，微秒精度
    pub fn add_processing_time(&self, duration: std::time::Duration) {
        self.processing_time
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn add_chars_processed(&self, count: usize) {
        self.total_chars_processed
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn inc_errors(&self) {
        self.errors_encountered.fetch_add(1, Ordering::Relaxed);
    }

    /// 获取统计数据快照
    ///
    /// 各字段分别原子读取，高并发下不同字段可能来自略有先后的时刻。
    pub fn snapshot(&self) -> ServiceStatsSnapshot {
        ServiceStatsSnapshot {
            texts_translated: self.texts_translated.load(Ordering::Relaxed),
            engine_calls: self.engine_calls.load(Ordering::Relaxed),
            decoding_anomalies: self.decoding_anomalies.load(Ordering::Relaxed),
            processing_time: std::time::Duration::from_micros(
                self.processing_time.load(Ordering::Relaxed),
            ),
            total_chars_processed: self.total_chars_processed.load(Ordering::Relaxed),
            errors_encountered: self.errors_encountered.load(Ordering::Relaxed),
        }
    }
}

/// 翻译服务统计数据的不可变快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceStatsSnapshot {
    pub texts_translated: usize,
    pub engine_calls: usize,
    pub decoding_anomalies: usize,
    pub processing_time: std::time::Duration,
    pub total_chars_processed: usize,
    pub errors_encountered: usize,
}

/// 翻译服务的健康状态报告
///
/// - `overall`: 整体健康状态，综合所有组件的状态得出
/// - `components`: 各个组件的详细健康状态映射
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// 整体健康级别
    pub overall: HealthLevel,

    /// 键是组件名称（"codec"、"engine"），值是对应的健康级别
    pub components: std::collections::HashMap<String, HealthLevel>,
}

/// 健康状态级别
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HealthLevel {
    /// 组件运行正常
    Healthy,

    /// 组件功能受限但仍可用
    Degraded,

    /// 组件无法正常工作
    Unhealthy,
}

impl HealthLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthLevel::Healthy => "healthy",
            HealthLevel::Degraded => "degraded",
            HealthLevel::Unhealthy => "unhealthy",
        }
    }
}
