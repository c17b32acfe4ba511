//! 批量束搜索推理引擎
//!
//! 对一批已编码的源序列做束搜索。每个解码步把一个分块内所有未结束条目的全部活动束
//! 合并成一次 `next_log_probs` 调用；每个请求都携带自己的源序列，条目之间不共享信息。
//!
//! ## 工作流程
//! 1. 按 `max_batch_items` 将输入切分为分块
//! 2. 每步收集所有活动束，调用一次模型
//! 3. 为每个条目从候选中保留得分最高的 `beam_width` 条路径
//! 4. 输出结束符或达到 `max_output_length` 的路径结束
//! 5. 按长度归一化得分排序，返回与输入同序的结果

use std::cmp::Ordering as CmpOrdering;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::Instant;

use crate::translation::codec::{SymbolId, SymbolSequence};
use crate::translation::config::constants;
use crate::translation::error::{TranslationError, TranslationResult};

use super::model::{DecodeStep, Seq2SeqModel};

/// 推理参数，作为固定配置复制进每个任务
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InferenceParams {
    pub beam_width: usize,
    pub max_output_length: usize,
    /// 排序时的长度惩罚指数，`score / len^length_penalty`
    pub length_penalty: f32,
}

impl Default for InferenceParams {
    fn default() -> Self {
        Self {
            beam_width: constants::DEFAULT_BEAM_WIDTH,
            max_output_length: constants::DEFAULT_MAX_OUTPUT_LENGTH,
            length_penalty: constants::DEFAULT_LENGTH_PENALTY,
        }
    }
}

impl InferenceParams {
    pub fn validate(&self) -> TranslationResult<()> {
        if self.beam_width == 0 {
            return Err(TranslationError::InvalidInput("beam_width 必须至少为1".to_string()));
        }
        if self.max_output_length == 0 {
            return Err(TranslationError::InvalidInput(
                "max_output_length 必须大于0".to_string(),
            ));
        }
        Ok(())
    }
}

/// 引擎配置
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// 单次模型调用覆盖的最大条目数
    pub max_batch_items: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_batch_items: constants::DEFAULT_MAX_BATCH_ITEMS,
        }
    }
}

/// 候选输出
#[derive(Debug, Clone, PartialEq)]
pub struct Hypothesis {
    pub symbols: SymbolSequence,
    /// 累计对数概率
    pub score: f32,
    /// 是否以结束符结尾（否则因长度上限截断）
    pub finished: bool,
}

impl Hypothesis {
    /// 长度归一化得分
    pub fn normalized_score(&self, length_penalty: f32) -> f32 {
        let len = self.symbols.len().max(1) as f32;
        self.score / len.powf(length_penalty)
    }
}

/// 按得分从高到低排序的候选列表
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankedHypotheses(Vec<Hypothesis>);

impl RankedHypotheses {
    fn rank(mut hypotheses: Vec<Hypothesis>, length_penalty: f32) -> Self {
        hypotheses.sort_by(|a, b| {
            b.normalized_score(length_penalty)
                .partial_cmp(&a.normalized_score(length_penalty))
                .unwrap_or(CmpOrdering::Equal)
        });
        Self(hypotheses)
    }

    /// 排名第一的候选
    pub fn best(&self) -> Option<&Hypothesis> {
        self.0.first()
    }

    pub fn as_slice(&self) -> &[Hypothesis] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// 引擎统计
#[derive(Debug, Default)]
pub struct EngineStats {
    pub batches: AtomicUsize,
    pub items: AtomicUsize,
    pub model_calls: AtomicUsize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStatsSnapshot {
    pub batches: usize,
    pub items: usize,
    pub model_calls: usize,
}

impl EngineStats {
    pub fn snapshot(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            batches: self.batches.load(Ordering::Relaxed),
            items: self.items.load(Ordering::Relaxed),
            model_calls: self.model_calls.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone)]
struct Beam {
    symbols: SymbolSequence,
    score: f32,
}

/// 单个条目的搜索状态
#[derive(Debug)]
struct ItemSearch {
    live: Vec<Beam>,
    finished: Vec<Hypothesis>,
}

impl ItemSearch {
    fn new() -> Self {
        Self {
            live: vec![Beam {
                symbols: Vec::new(),
                score: 0.0,
            }],
            finished: Vec::new(),
        }
    }

    fn is_done(&self, beam_width: usize) -> bool {
        self.live.is_empty() || self.finished.len() >= beam_width
    }

    /// 剩余活动束无法再扩展时按未完成结果收尾
    fn retire_live(&mut self) {
        for beam in self.live.drain(..) {
            self.finished.push(Hypothesis {
                symbols: beam.symbols,
                score: beam.score,
                finished: false,
            });
        }
    }
}

/// 批量束搜索引擎
pub struct BeamSearchEngine {
    model: Arc<dyn Seq2SeqModel>,
    end_symbol: SymbolId,
    config: EngineConfig,
    stats: EngineStats,
}

impl BeamSearchEngine {
    pub fn new(model: Arc<dyn Seq2SeqModel>, end_symbol: SymbolId, config: EngineConfig) -> Self {
        Self {
            model,
            end_symbol,
            config,
            stats: EngineStats::default(),
        }
    }

    pub fn model(&self) -> &dyn Seq2SeqModel {
        self.model.as_ref()
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// 翻译一批符号序列，结果与输入一一对应且顺序一致
    pub fn translate_batch(
        &self,
        items: &[SymbolSequence],
        params: &InferenceParams,
    ) -> TranslationResult<Vec<RankedHypotheses>> {
        params.validate()?;
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let start_time = Instant::now();
        let chunk_size = self.config.max_batch_items.max(1);
        let mut results = Vec::with_capacity(items.len());

        for chunk in items.chunks(chunk_size) {
            results.extend(self.search_chunk(chunk, params)?);
        }

        self.stats.batches.fetch_add(1, Ordering::Relaxed);
        self.stats.items.fetch_add(items.len(), Ordering::Relaxed);
        tracing::debug!(
            "批次完成: {} 个条目, 束宽 {}, 耗时 {:?}",
            items.len(),
            params.beam_width,
            start_time.elapsed()
        );

        Ok(results)
    }

    fn search_chunk(
        &self,
        chunk: &[SymbolSequence],
        params: &InferenceParams,
    ) -> TranslationResult<Vec<RankedHypotheses>> {
        let vocab_size = self.model.output_vocab_size();
        let mut searches: Vec<ItemSearch> = chunk.iter().map(|_| ItemSearch::new()).collect();

        loop {
            // (条目, 束) 与请求一一对应
            let mut owners = Vec::new();
            let mut steps = Vec::new();
            for (item_idx, search) in searches.iter().enumerate() {
                if search.is_done(params.beam_width) {
                    continue;
                }
                for (beam_idx, beam) in search.live.iter().enumerate() {
                    owners.push((item_idx, beam_idx));
                    steps.push(DecodeStep {
                        source: &chunk[item_idx],
                        prefix: &beam.symbols,
                    });
                }
            }

            if steps.is_empty() {
                break;
            }

            let dists = self.model.next_log_probs(&steps)?;
            self.stats.model_calls.fetch_add(1, Ordering::Relaxed);
            self.check_output(&dists, steps.len(), vocab_size)?;
            drop(steps);

            // 按条目分组候选
            let mut candidates: Vec<Vec<(usize, SymbolId, f32)>> = vec![Vec::new(); searches.len()];
            for ((item_idx, beam_idx), dist) in owners.into_iter().zip(dists.iter()) {
                let beam = &searches[item_idx].live[beam_idx];
                for (symbol, log_prob) in top_k(dist, 2 * params.beam_width) {
                    candidates[item_idx].push((beam_idx, symbol, beam.score + log_prob));
                }
            }

            for (search, mut item_candidates) in searches.iter_mut().zip(candidates) {
                if search.is_done(params.beam_width) {
                    continue;
                }
                if item_candidates.is_empty() {
                    search.retire_live();
                    continue;
                }

                item_candidates
                    .sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(CmpOrdering::Equal));

                // 每束取 2k 个候选：结束的候选不占活动束名额，活动束补足到 k
                let mut next_live = Vec::with_capacity(params.beam_width);
                for (rank, (beam_idx, symbol, score)) in item_candidates.into_iter().enumerate() {
                    if next_live.len() >= params.beam_width {
                        break;
                    }
                    let mut symbols = search.live[beam_idx].symbols.clone();
                    symbols.push(symbol);

                    let ended = symbol == self.end_symbol;
                    if ended || symbols.len() >= params.max_output_length {
                        // 排在前 k 之外的结束候选不收录
                        if rank < params.beam_width {
                            search.finished.push(Hypothesis {
                                symbols,
                                score,
                                finished: ended,
                            });
                        }
                    } else {
                        next_live.push(Beam { symbols, score });
                    }
                }
                search.live = next_live;
            }
        }

        Ok(searches
            .into_iter()
            .map(|mut search| {
                if search.finished.is_empty() {
                    search.retire_live();
                }
                RankedHypotheses::rank(search.finished, params.length_penalty)
            })
            .collect())
    }

    fn check_output(
        &self,
        dists: &[Vec<f32>],
        expected: usize,
        vocab_size: usize,
    ) -> TranslationResult<()> {
        if dists.len() != expected {
            return Err(TranslationError::InferenceError(format!(
                "模型 {} 返回 {} 个分布，期望 {}",
                self.model.name(),
                dists.len(),
                expected
            )));
        }
        if let Some(bad) = dists.iter().find(|dist| dist.len() != vocab_size) {
            return Err(TranslationError::InferenceError(format!(
                "模型 {} 返回的分布维度为 {}，期望 {}",
                self.model.name(),
                bad.len(),
                vocab_size
            )));
        }
        Ok(())
    }
}

/// 取分布中得分最高的 k 个有限值，NaN 视为负无穷
fn top_k(dist: &[f32], k: usize) -> Vec<(SymbolId, f32)> {
    let mut scored: Vec<(SymbolId, f32)> = dist
        .iter()
        .enumerate()
        .filter(|(_, p)| p.is_finite())
        .map(|(i, p)| (i as SymbolId, *p))
        .collect();

    if scored.len() > k {
        scored.select_nth_unstable_by(k - 1, |a, b| {
            b.1.partial_cmp(&a.1).unwrap_or(CmpOrdering::Equal)
        });
        scored.truncate(k);
    }
    scored
}
