//! 词表加载
//!
//! Marian 模型目录中的 `vocab.json` 是 `{"piece": id}` 形式的映射。

use std::collections::HashMap;
use std::path::Path;

use crate::translation::error::{TranslationError, TranslationResult};

use super::SymbolId;

/// 双向词表
#[derive(Debug, Clone)]
pub struct Vocabulary {
    piece_to_id: HashMap<String, SymbolId>,
    id_to_piece: HashMap<SymbolId, String>,
}

impl Vocabulary {
    /// 从 `vocab.json` 读取
    pub fn from_file(path: &Path) -> TranslationResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TranslationError::ConstructionError(format!(
                "读取词表失败 {}: {}",
                path.display(),
                e
            ))
        })?;

        let map: HashMap<String, SymbolId> = serde_json::from_str(&content).map_err(|e| {
            TranslationError::ConstructionError(format!(
                "词表格式错误 {}: {}",
                path.display(),
                e
            ))
        })?;

        tracing::debug!("从 {} 读取 {} 个词片", path.display(), map.len());
        Self::from_pieces(map)
    }

    /// 从 (词片, 编号) 对构建
    pub fn from_pieces<I, S>(pieces: I) -> TranslationResult<Self>
    where
        I: IntoIterator<Item = (S, SymbolId)>,
        S: Into<String>,
    {
        let mut piece_to_id = HashMap::new();
        let mut id_to_piece = HashMap::new();

        for (piece, id) in pieces {
            let piece = piece.into();
            if piece.is_empty() {
                return Err(TranslationError::ConstructionError(format!(
                    "词表中编号 {} 对应空词片",
                    id
                )));
            }
            if let Some(existing) = id_to_piece.get(&id) {
                return Err(TranslationError::ConstructionError(format!(
                    "词表编号重复: {} 同时对应 {:?} 和 {:?}",
                    id, existing, piece
                )));
            }
            id_to_piece.insert(id, piece.clone());
            piece_to_id.insert(piece, id);
        }

        if piece_to_id.is_empty() {
            return Err(TranslationError::ConstructionError("词表为空".to_string()));
        }

        Ok(Self {
            piece_to_id,
            id_to_piece,
        })
    }

    pub fn id_of(&self, piece: &str) -> Option<SymbolId> {
        self.piece_to_id.get(piece).copied()
    }

    pub fn piece_of(&self, id: SymbolId) -> Option<&str> {
        self.id_to_piece.get(&id).map(String::as_str)
    }

    /// 按特殊符号字符串解析编号，缺失时构建失败
    pub fn require(&self, piece: &str) -> TranslationResult<SymbolId> {
        self.id_of(piece).ok_or_else(|| {
            TranslationError::ConstructionError(format!("词表中缺少特殊符号 {:?}", piece))
        })
    }

    /// 词片数量
    pub fn len(&self) -> usize {
        self.piece_to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.piece_to_id.is_empty()
    }

    /// 模型输出维度：最大编号 + 1
    pub fn dimension(&self) -> usize {
        self.id_to_piece
            .keys()
            .max()
            .map(|max| *max as usize + 1)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn duplicate_ids_fail_construction() {
        let result = Vocabulary::from_pieces(vec![("a", 1), ("b", 1)]);
        assert!(matches!(result, Err(TranslationError::ConstructionError(_))));
    }

    #[test]
    fn dimension_covers_sparse_ids() {
        let vocab = Vocabulary::from_pieces(vec![("</s>", 0), ("▁hi", 9)]).unwrap();
        assert_eq!(vocab.len(), 2);
        assert_eq!(vocab.dimension(), 10);
        assert_eq!(vocab.piece_of(9), Some("▁hi"));
        assert!(vocab.piece_of(5).is_none());
    }

    #[test]
    fn malformed_json_is_construction_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{\"</s>\": \"zero\"}}").unwrap();
        let result = Vocabulary::from_file(file.path());
        assert!(matches!(result, Err(TranslationError::ConstructionError(_))));
    }

    #[test]
    fn missing_file_is_construction_error() {
        let result = Vocabulary::from_file(Path::new("/nonexistent/vocab.json"));
        assert!(matches!(result, Err(TranslationError::ConstructionError(_))));
    }
}
