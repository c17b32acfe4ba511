//! 符号编解码器
//!
//! 在原始文本与模型符号序列之间转换。切分交给模型目录中的分词器
//! （SentencePiece unigram，按词片分数切分），词片再经 `vocab.json` 映射为模型编号。
//! 构建完成后无状态，可以通过 `Arc` 在工作线程间共享。

pub mod segmenter;
pub mod vocab;

use std::collections::HashSet;
use std::path::Path;

use crate::translation::config::constants;
use crate::translation::error::TranslationResult;

pub use segmenter::PieceSegmenter;
pub use vocab::Vocabulary;

/// 词表中的符号编号
pub type SymbolId = u32;

/// 有序符号序列
pub type SymbolSequence = Vec<SymbolId>;

/// SentencePiece 的词首标记
pub const WORD_BOUNDARY: char = '▁';

/// 没有分数时每个词片的对数概率，切分结果即词片数最少的方案
const UNSCORED_PIECE: f64 = -1.0;

/// 编码时插入的边界符号
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundaryPolicy {
    pub prepend_start: bool,
    pub append_end: bool,
}

impl Default for BoundaryPolicy {
    /// Marian：源序列只追加 `</s>`
    fn default() -> Self {
        Self {
            prepend_start: false,
            append_end: true,
        }
    }
}

/// 编解码器选项
#[derive(Debug, Clone)]
pub struct CodecOptions {
    pub decoder_start_token: String,
    pub end_token: String,
    pub unknown_token: String,
    pub pad_token: String,
    /// 词表外符号在输出文本中的占位
    pub unknown_placeholder: String,
    pub boundary: BoundaryPolicy,
}

impl CodecOptions {
    fn special_tokens(&self) -> [&str; 4] {
        [
            self.decoder_start_token.as_str(),
            self.end_token.as_str(),
            self.unknown_token.as_str(),
            self.pad_token.as_str(),
        ]
    }
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            decoder_start_token: constants::DEFAULT_DECODER_START_TOKEN.to_string(),
            end_token: constants::DEFAULT_END_TOKEN.to_string(),
            unknown_token: constants::DEFAULT_UNKNOWN_TOKEN.to_string(),
            pad_token: constants::DEFAULT_PAD_TOKEN.to_string(),
            unknown_placeholder: constants::DEFAULT_UNKNOWN_PLACEHOLDER.to_string(),
            boundary: BoundaryPolicy::default(),
        }
    }
}

/// 词表中解析出的特殊符号
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialSymbols {
    pub start: SymbolId,
    pub end: SymbolId,
    pub unknown: SymbolId,
    pub pad: SymbolId,
}

impl SpecialSymbols {
    pub fn contains(&self, id: SymbolId) -> bool {
        id == self.start || id == self.end || id == self.unknown || id == self.pad
    }
}

/// 带异常计数的解码结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeReport {
    pub text: String,
    /// 词表外符号的数量（已替换为占位）
    pub anomalies: usize,
}

/// 符号编解码器
#[derive(Debug, Clone)]
pub struct SymbolCodec {
    vocab: Vocabulary,
    source: PieceSegmenter,
    target: PieceSegmenter,
    specials: SpecialSymbols,
    special_ids: HashSet<SymbolId>,
    options: CodecOptions,
}

impl SymbolCodec {
    pub fn new(
        vocab: Vocabulary,
        source: PieceSegmenter,
        target: PieceSegmenter,
        options: CodecOptions,
    ) -> TranslationResult<Self> {
        let specials = SpecialSymbols {
            start: vocab.require(&options.decoder_start_token)?,
            end: vocab.require(&options.end_token)?,
            unknown: vocab.require(&options.unknown_token)?,
            pad: vocab.require(&options.pad_token)?,
        };
        let special_ids = [specials.start, specials.end, specials.unknown, specials.pad]
            .into_iter()
            .collect();

        tracing::debug!(
            "符号表就绪: {} 个词片, 结束符 {}, 未知符 {}",
            vocab.len(),
            specials.end,
            specials.unknown
        );

        Ok(Self {
            vocab,
            source,
            target,
            specials,
            special_ids,
            options,
        })
    }

    /// 从模型目录构建：`vocab.json` 与 `source_tokenizer.json` 必须存在，
    /// `target_tokenizer.json` 缺失时解码沿用源端分词器
    pub fn from_dir(dir: &Path, options: CodecOptions) -> TranslationResult<Self> {
        let vocab = Vocabulary::from_file(&dir.join(constants::VOCAB_FILE))?;
        let source = PieceSegmenter::from_file(&dir.join(constants::SOURCE_TOKENIZER_FILE))?;

        let target_path = dir.join(constants::TARGET_TOKENIZER_FILE);
        let target = if target_path.exists() {
            PieceSegmenter::from_file(&target_path)?
        } else {
            source.clone()
        };

        Self::new(vocab, source, target, options)
    }

    /// 由 (词片, 编号, 对数概率) 构建，分词器为同一词表上的 unigram 模型
    pub fn from_scored_pieces<I, S>(pieces: I, options: CodecOptions) -> TranslationResult<Self>
    where
        I: IntoIterator<Item = (S, SymbolId, f64)>,
        S: Into<String>,
    {
        let pieces: Vec<(String, SymbolId, f64)> = pieces
            .into_iter()
            .map(|(piece, id, score)| (piece.into(), id, score))
            .collect();

        let vocab =
            Vocabulary::from_pieces(pieces.iter().map(|(piece, id, _)| (piece.clone(), *id)))?;

        let specials = options.special_tokens();
        let segmenter = PieceSegmenter::unigram(
            pieces
                .iter()
                .filter(|(piece, _, _)| !specials.contains(&piece.as_str()))
                .map(|(piece, _, score)| (piece.clone(), *score)),
            &options.unknown_token,
        )?;

        Self::new(vocab, segmenter.clone(), segmenter, options)
    }

    /// 不带分数的词表：每个词片同分
    pub fn from_pieces<I, S>(pieces: I, options: CodecOptions) -> TranslationResult<Self>
    where
        I: IntoIterator<Item = (S, SymbolId)>,
        S: Into<String>,
    {
        Self::from_scored_pieces(
            pieces
                .into_iter()
                .map(|(piece, id)| (piece, id, UNSCORED_PIECE)),
            options,
        )
    }

    pub fn specials(&self) -> SpecialSymbols {
        self.specials
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn source_segmenter(&self) -> &PieceSegmenter {
        &self.source
    }

    /// 模型输出分布的维度
    pub fn vocab_size(&self) -> usize {
        self.vocab.dimension()
    }

    /// 文本 → 符号序列
    ///
    /// 不在 `vocab.json` 中的词片映射为未知符号，因此编码不会失败。空文本只包含边界符号。
    pub fn encode(&self, text: &str) -> SymbolSequence {
        let mut symbols = Vec::new();
        if self.options.boundary.prepend_start {
            symbols.push(self.specials.start);
        }

        if !text.is_empty() {
            match self.source.segment(text) {
                Ok(pieces) => symbols.extend(pieces.iter().map(|piece| self.symbol_of(piece))),
                Err(e) => {
                    tracing::warn!("{}，整段文本按未知符号处理", e);
                    symbols.push(self.specials.unknown);
                }
            }
        }

        if self.options.boundary.append_end {
            symbols.push(self.specials.end);
        }
        symbols
    }

    /// 符号序列 → 文本
    pub fn decode(&self, symbols: &[SymbolId]) -> String {
        self.decode_with_report(symbols).text
    }

    /// 解码并返回异常符号数量
    ///
    /// 特殊符号（含 `<unk>`）全部去掉；词表外编号记为异常并替换为占位。
    pub fn decode_with_report(&self, symbols: &[SymbolId]) -> DecodeReport {
        let mut pieces = Vec::with_capacity(symbols.len());
        let mut anomalies = 0;

        for &id in symbols {
            if self.special_ids.contains(&id) {
                continue;
            }
            match self.vocab.piece_of(id) {
                Some(piece) => pieces.push(piece.to_string()),
                None => {
                    anomalies += 1;
                    tracing::warn!("解码遇到词表外符号 {}，以占位符替代", id);
                    pieces.push(self.options.unknown_placeholder.clone());
                }
            }
        }

        let text = self.target.join(pieces.clone()).unwrap_or_else(|e| {
            tracing::warn!("{}，按原样拼接词片", e);
            pieces.concat()
        });

        DecodeReport { text, anomalies }
    }

    fn symbol_of(&self, piece: &str) -> SymbolId {
        self.vocab
            .id_of(piece)
            .filter(|id| !self.special_ids.contains(id))
            .unwrap_or(self.specials.unknown)
    }
}
