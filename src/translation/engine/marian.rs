//! Marian (opus-mt) 运行时
//!
//! 通过 candle 加载 `config.json` 与 `model.safetensors`。candle 的 Marian 模型在解码器中
//! 维护 KV 缓存，需要可变访问，因此放在 `Mutex` 后面串行执行。
//!
//! 每次调用把源长度与前缀长度都相同的解码步合成一组：组内去重后的源序列只编码一次，
//! 前缀堆叠为 `[n, len]` 一次解码。

use std::path::Path;
use std::sync::Mutex;

use candle_core::{DType, Device, IndexOp, Tensor, D};
use candle_nn::VarBuilder;
use candle_transformers::models::marian;
use serde::Deserialize;

use crate::translation::codec::SymbolId;
use crate::translation::config::constants;
use crate::translation::error::{TranslationError, TranslationResult};

use super::model::{DecodeStep, Seq2SeqModel};

fn to_inference_error(e: candle_core::Error) -> TranslationError {
    TranslationError::InferenceError(format!("candle: {}", e))
}

/// `config.json` 中决定输出维度的字段
#[derive(Debug, Deserialize)]
struct VocabHeader {
    vocab_size: usize,
    #[serde(default)]
    decoder_vocab_size: Option<usize>,
}

/// 可以合并为一次前向计算的解码步
#[derive(Debug, PartialEq, Eq)]
struct StepGroup<'a> {
    /// 组内去重后的源序列
    sources: Vec<&'a [SymbolId]>,
    /// 组内每一步在 `steps` 中的位置
    members: Vec<usize>,
    /// 组内每一步使用的源序列在 `sources` 中的位置
    rows: Vec<usize>,
}

/// 按 (源长度, 前缀长度) 分组，保持首次出现的顺序
fn group_steps<'a>(steps: &[DecodeStep<'a>]) -> Vec<StepGroup<'a>> {
    let mut keys: Vec<(usize, usize)> = Vec::new();
    let mut groups: Vec<StepGroup<'a>> = Vec::new();

    for (index, step) in steps.iter().enumerate() {
        let key = (step.source.len(), step.prefix.len());
        let slot = match keys.iter().position(|k| *k == key) {
            Some(slot) => slot,
            None => {
                keys.push(key);
                groups.push(StepGroup {
                    sources: Vec::new(),
                    members: Vec::new(),
                    rows: Vec::new(),
                });
                groups.len() - 1
            }
        };

        let group = &mut groups[slot];
        let row = match group.sources.iter().position(|s| *s == step.source) {
            Some(row) => row,
            None => {
                group.sources.push(step.source);
                group.sources.len() - 1
            }
        };
        group.members.push(index);
        group.rows.push(row);
    }

    groups
}

/// 只在 `column` 处为负无穷的加性掩码
fn column_mask(width: usize, column: usize, device: &Device) -> candle_core::Result<Tensor> {
    let mut mask = vec![0f32; width];
    mask[column] = f32::NEG_INFINITY;
    Tensor::from_vec(mask, width, device)
}

/// `[n, vocab]` logits 加掩码后按行 log-softmax
fn masked_log_softmax(logits: &Tensor, mask: Option<&Tensor>) -> candle_core::Result<Vec<Vec<f32>>> {
    let logits = match mask {
        Some(mask) => logits.broadcast_add(mask)?,
        None => logits.clone(),
    };
    candle_nn::ops::log_softmax(&logits, D::Minus1)?.to_vec2::<f32>()
}

/// candle 驱动的 Marian 编码器-解码器
pub struct MarianModel {
    model: Mutex<marian::MTModel>,
    device: Device,
    decoder_start: SymbolId,
    /// `<pad>` 列的掩码，生成时不允许输出填充符
    pad_mask: Option<Tensor>,
    vocab_size: usize,
    name: String,
}

impl MarianModel {
    /// 从模型目录加载
    pub fn load(dir: &Path) -> TranslationResult<Self> {
        let config_path = dir.join(constants::MODEL_CONFIG_FILE);
        let weights_path = dir.join(constants::MODEL_WEIGHTS_FILE);

        let raw = std::fs::read_to_string(&config_path).map_err(|e| {
            TranslationError::ConstructionError(format!(
                "读取模型配置失败 {}: {}",
                config_path.display(),
                e
            ))
        })?;
        let config: marian::Config = serde_json::from_str(&raw).map_err(|e| {
            TranslationError::ConstructionError(format!("模型配置格式错误: {}", e))
        })?;
        let header: VocabHeader = serde_json::from_str(&raw).map_err(|e| {
            TranslationError::ConstructionError(format!("模型配置缺少词表大小: {}", e))
        })?;

        if !weights_path.exists() {
            return Err(TranslationError::ConstructionError(format!(
                "缺少模型权重 {}",
                weights_path.display()
            )));
        }

        let device = Device::Cpu;
        let vocab_size = header.decoder_vocab_size.unwrap_or(header.vocab_size);

        let pad = config.pad_token_id as usize;
        let pad_mask = if pad < vocab_size {
            Some(column_mask(vocab_size, pad, &device).map_err(|e| {
                TranslationError::ConstructionError(format!("构建填充掩码失败: {}", e))
            })?)
        } else {
            tracing::warn!("pad_token_id {} 超出输出维度 {}，不做屏蔽", pad, vocab_size);
            None
        };

        // safetensors 以只读方式映射
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[&weights_path], DType::F32, &device)
        }
        .map_err(|e| TranslationError::ConstructionError(format!("加载权重失败: {}", e)))?;

        let model = marian::MTModel::new(&config, vb)
            .map_err(|e| TranslationError::ConstructionError(format!("构建模型失败: {}", e)))?;

        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "marian".to_string());

        tracing::info!("Marian 模型已加载: {} (词表 {})", name, vocab_size);

        Ok(Self {
            model: Mutex::new(model),
            device,
            decoder_start: config.decoder_start_token_id,
            pad_mask,
            vocab_size,
            name,
        })
    }

    /// 等长序列堆叠为 `[rows.len(), width]`
    fn stacked_tensor<'a, I>(&self, rows: I, width: usize) -> TranslationResult<Tensor>
    where
        I: ExactSizeIterator<Item = &'a [SymbolId]>,
    {
        let count = rows.len();
        let flat: Vec<SymbolId> = rows.flat_map(|row| row.iter().copied()).collect();
        Tensor::from_vec(flat, (count, width), &self.device).map_err(to_inference_error)
    }

    fn decode_group(
        &self,
        model: &mut marian::MTModel,
        steps: &[DecodeStep<'_>],
        group: &StepGroup<'_>,
    ) -> TranslationResult<Vec<Vec<f32>>> {
        let source_len = group.sources.first().map(|s| s.len()).unwrap_or(0);
        let sources = self.stacked_tensor(group.sources.iter().copied(), source_len)?;
        let encoded = model
            .encoder()
            .forward(&sources, 0)
            .map_err(to_inference_error)?;

        let rows: Vec<u32> = group.rows.iter().map(|&r| r as u32).collect();
        let rows = Tensor::new(rows.as_slice(), &self.device).map_err(to_inference_error)?;
        let encoder_xs = encoded.index_select(&rows, 0).map_err(to_inference_error)?;

        let prefixes: Vec<Vec<SymbolId>> = group
            .members
            .iter()
            .map(|&index| {
                let mut ids = Vec::with_capacity(steps[index].prefix.len() + 1);
                ids.push(self.decoder_start);
                ids.extend_from_slice(steps[index].prefix);
                ids
            })
            .collect();
        let len = prefixes.first().map(Vec::len).unwrap_or(1);
        let decoder_input = self.stacked_tensor(prefixes.iter().map(Vec::as_slice), len)?;

        // 整条前缀一次送入，先清空上一组留下的缓存
        model.reset_kv_cache();
        let logits = model
            .decode(&decoder_input, &encoder_xs, 0)
            .map_err(to_inference_error)?;
        let last = logits.i((.., len - 1)).map_err(to_inference_error)?;

        masked_log_softmax(&last, self.pad_mask.as_ref()).map_err(to_inference_error)
    }
}

impl Seq2SeqModel for MarianModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn output_vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn next_log_probs(&self, steps: &[DecodeStep<'_>]) -> TranslationResult<Vec<Vec<f32>>> {
        let mut model = self
            .model
            .lock()
            .map_err(|_| TranslationError::InternalError("Marian 模型锁已中毒".to_string()))?;

        let groups = group_steps(steps);
        tracing::trace!("{} 个解码步合并为 {} 次前向计算", steps.len(), groups.len());

        let mut dists: Vec<Vec<f32>> = vec![Vec::new(); steps.len()];
        for group in &groups {
            let rows = self.decode_group(&mut model, steps, group)?;
            for (&index, row) in group.members.iter().zip(rows) {
                dists[index] = row;
            }
        }

        model.reset_kv_cache();
        Ok(dists)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step<'a>(source: &'a [SymbolId], prefix: &'a [SymbolId]) -> DecodeStep<'a> {
        DecodeStep { source, prefix }
    }

    #[test]
    fn beams_of_one_item_share_a_group_and_an_encoding() {
        let a = [5, 6, 0];
        let b = [7, 8, 0];
        let c = [9, 0];
        let steps = [
            step(&a, &[11]),
            step(&a, &[12]),
            step(&b, &[13]),
            step(&c, &[14]),
            step(&a, &[15]),
        ];

        let groups = group_steps(&steps);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].sources, vec![&a[..], &b[..]]);
        assert_eq!(groups[0].members, vec![0, 1, 2, 4]);
        assert_eq!(groups[0].rows, vec![0, 0, 1, 0]);
        assert_eq!(groups[1].sources, vec![&c[..]]);
        assert_eq!(groups[1].members, vec![3]);
    }

    #[test]
    fn prefixes_of_different_length_are_not_stacked() {
        let a = [5, 0];
        let steps = [step(&a, &[]), step(&a, &[3])];
        let groups = group_steps(&steps);
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn pad_column_is_masked_before_normalisation() {
        let device = Device::Cpu;
        let logits = Tensor::new(&[[1f32, 5.0, 2.0], [0.0, 0.0, 0.0]], &device).unwrap();
        let mask = column_mask(3, 1, &device).unwrap();

        let rows = masked_log_softmax(&logits, Some(&mask)).unwrap();

        for row in &rows {
            assert_eq!(row[1], f32::NEG_INFINITY);
            let total: f32 = row.iter().map(|lp| lp.exp()).sum();
            assert!((total - 1.0).abs() < 1e-5, "probabilities should sum to 1, got {}", total);
        }
        assert!(rows[0][2] > rows[0][0]);
    }

    #[test]
    fn unmasked_rows_keep_every_column() {
        let device = Device::Cpu;
        let logits = Tensor::new(&[[0f32, 0.0]], &device).unwrap();
        let rows = masked_log_softmax(&logits, None).unwrap();
        assert!((rows[0][0] - (0.5f32).ln()).abs() < 1e-6);
    }
}
