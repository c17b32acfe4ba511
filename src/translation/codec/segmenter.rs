//! 词片切分
//!
//! 包装 `tokenizers::Tokenizer`。模型目录中的分词器（SentencePiece unigram 转换得到的
//! `tokenizer.json`）负责规范化与按分数切分；符号编号仍以 `vocab.json` 为准。

use std::path::Path;

use tokenizers::decoders::DecoderWrapper;
use tokenizers::models::unigram::Unigram;
use tokenizers::normalizers::NFKC;
use tokenizers::pre_tokenizers::metaspace::{Metaspace, PrependScheme};
use tokenizers::{Decoder, Tokenizer};

use crate::translation::error::{TranslationError, TranslationResult};

use super::WORD_BOUNDARY;

/// 文本 ⇄ 词片字符串
#[derive(Debug, Clone)]
pub struct PieceSegmenter {
    inner: Tokenizer,
}

impl PieceSegmenter {
    pub fn from_file(path: &Path) -> TranslationResult<Self> {
        let inner = Tokenizer::from_file(path).map_err(|e| {
            TranslationError::ConstructionError(format!(
                "加载分词器失败 {}: {}",
                path.display(),
                e
            ))
        })?;
        tracing::debug!("从 {} 加载分词器", path.display());
        Ok(Self { inner })
    }

    /// 由 (词片, 对数概率) 构建 unigram 分词器
    ///
    /// `unknown_piece` 会加入词表，用来承接无法切分的字符。
    pub fn unigram<I, S>(pieces: I, unknown_piece: &str) -> TranslationResult<Self>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut scored: Vec<(String, f64)> = vec![(unknown_piece.to_string(), 0.0)];
        scored.extend(
            pieces
                .into_iter()
                .map(|(piece, score)| (piece.into(), score))
                .filter(|(piece, _)| piece != unknown_piece),
        );

        let model = Unigram::from(scored, Some(0), false).map_err(|e| {
            TranslationError::ConstructionError(format!("构建 unigram 分词器失败: {}", e))
        })?;

        let metaspace = Metaspace::new(WORD_BOUNDARY, PrependScheme::Always, true);
        let mut inner = Tokenizer::new(model);
        inner.with_normalizer(NFKC);
        inner.with_pre_tokenizer(metaspace.clone());
        inner.with_decoder(metaspace);

        Ok(Self { inner })
    }

    /// 切分为词片；规范化与词首标记由分词器处理
    pub fn segment(&self, text: &str) -> TranslationResult<Vec<String>> {
        let encoding = self.inner.encode(text, false).map_err(|e| {
            TranslationError::InvalidInput(format!("分词失败: {}", e))
        })?;
        Ok(encoding.get_tokens().to_vec())
    }

    /// 把词片拼回文本
    pub fn join(&self, pieces: Vec<String>) -> TranslationResult<String> {
        let joined = match self.inner.get_decoder() {
            Some(decoder) => decoder.decode(pieces),
            None => DecoderWrapper::Metaspace(Metaspace::default()).decode(pieces),
        };
        joined.map_err(|e| TranslationError::InternalError(format!("词片拼接失败: {}", e)))
    }

    pub fn save(&self, path: &Path) -> TranslationResult<()> {
        self.inner.save(path, false).map_err(|e| {
            TranslationError::InternalError(format!("保存分词器失败 {}: {}", path.display(), e))
        })
    }
}
