//! 模型运行时接口
//!
//! 推理引擎只通过 `Seq2SeqModel` 与具体的神经网络交互：给定一批 (源序列, 已生成前缀)，
//! 返回每一项下一个符号的对数概率分布。

use crate::translation::codec::SymbolId;
use crate::translation::error::TranslationResult;

/// 单步解码请求
#[derive(Debug, Clone, Copy)]
pub struct DecodeStep<'a> {
    /// 已编码的源序列（含边界符号）
    pub source: &'a [SymbolId],
    /// 已生成的输出前缀，不含解码起始符
    pub prefix: &'a [SymbolId],
}

/// 序列到序列模型运行时
///
/// 实现必须是只读共享的；内部需要可变状态（例如 KV 缓存）的运行时自行加锁。
pub trait Seq2SeqModel: Send + Sync {
    /// 用于日志和健康检查的名称
    fn name(&self) -> &str;

    /// 输出分布的维度
    fn output_vocab_size(&self) -> usize;

    /// 为每个请求返回一条长度为 `output_vocab_size()` 的对数概率分布，顺序与输入一致
    fn next_log_probs(&self, steps: &[DecodeStep<'_>]) -> TranslationResult<Vec<Vec<f32>>>;
}

/// 回显运行时
///
/// 按顺序输出源序列中的符号，源序列用完后输出结束符。用于冒烟部署与测试。
#[derive(Debug, Clone)]
pub struct EchoModel {
    vocab_size: usize,
    end_symbol: SymbolId,
}

impl EchoModel {
    pub fn new(vocab_size: usize, end_symbol: SymbolId) -> Self {
        Self {
            vocab_size,
            end_symbol,
        }
    }

    fn next_symbol(&self, step: &DecodeStep<'_>) -> SymbolId {
        step.source
            .get(step.prefix.len())
            .copied()
            .unwrap_or(self.end_symbol)
    }
}

impl Seq2SeqModel for EchoModel {
    fn name(&self) -> &str {
        "echo"
    }

    fn output_vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn next_log_probs(&self, steps: &[DecodeStep<'_>]) -> TranslationResult<Vec<Vec<f32>>> {
        Ok(steps
            .iter()
            .map(|step| {
                let mut dist = vec![f32::NEG_INFINITY; self.vocab_size];
                let next = self.next_symbol(step) as usize;
                let target = if next < self.vocab_size {
                    next
                } else {
                    self.end_symbol as usize
                };
                if let Some(slot) = dist.get_mut(target) {
                    *slot = 0.0;
                }
                dist
            })
            .collect())
    }
}
