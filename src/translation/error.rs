//! 翻译模块统一错误处理
//!
//! 提供结构化错误类型和错误处理机制。所有按任务产生的错误都通过同一条完成通道
//! 返回给调用方，并保留错误类别，调用方可以据此区分成功与各类失败。

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::env::EnvError;

/// 翻译错误类型
#[derive(Error, Debug, Clone)]
pub enum TranslationError {
    /// 模型或词表构建失败（启动期致命错误）
    #[error("模型加载失败: {0}")]
    ConstructionError(String),

    /// 配置错误
    #[error("配置错误: {0}")]
    ConfigError(String),

    /// 输入验证错误
    #[error("输入无效: {0}")]
    InvalidInput(String),

    /// 推理运行时错误
    #[error("推理失败: {0}")]
    InferenceError(String),

    /// 任务超时
    #[error("任务超时: 超过 {0:?} 仍未完成")]
    JobTimeout(Duration),

    /// 任务队列已满
    #[error("任务队列已满 (容量 {capacity})")]
    CapacityExceeded { capacity: usize },

    /// 服务暂不可用（模型未就绪或调度器已关闭）
    #[error("服务不可用: {0}")]
    ServiceUnavailable(String),

    /// 内部错误
    #[error("内部错误: {0}")]
    InternalError(String),
}

impl TranslationError {
    /// 检查错误是否可重试
    ///
    /// 本crate从不自动重试，这里只是给外部调用方的提示。
    pub fn is_retryable(&self) -> bool {
        match self {
            TranslationError::JobTimeout(_) => true,
            TranslationError::CapacityExceeded { .. } => true,
            TranslationError::ServiceUnavailable(_) => true,
            TranslationError::InferenceError(_) => false,
            TranslationError::ConstructionError(_) => false,
            TranslationError::ConfigError(_) => false,
            TranslationError::InvalidInput(_) => false,
            TranslationError::InternalError(_) => false,
        }
    }

    /// 获取错误的严重程度
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            TranslationError::ConstructionError(_) => ErrorSeverity::Critical,
            TranslationError::ConfigError(_) => ErrorSeverity::Critical,
            TranslationError::InvalidInput(_) => ErrorSeverity::Info,
            TranslationError::InferenceError(_) => ErrorSeverity::Error,
            TranslationError::JobTimeout(_) => ErrorSeverity::Warning,
            TranslationError::CapacityExceeded { .. } => ErrorSeverity::Warning,
            TranslationError::ServiceUnavailable(_) => ErrorSeverity::Warning,
            TranslationError::InternalError(_) => ErrorSeverity::Critical,
        }
    }

    /// 获取错误类别
    pub fn category(&self) -> ErrorCategory {
        match self {
            TranslationError::ConstructionError(_) => ErrorCategory::Construction,
            TranslationError::ConfigError(_) => ErrorCategory::Configuration,
            TranslationError::InvalidInput(_) => ErrorCategory::Input,
            TranslationError::InferenceError(_) => ErrorCategory::Inference,
            TranslationError::JobTimeout(_) => ErrorCategory::Timeout,
            TranslationError::CapacityExceeded { .. } => ErrorCategory::Capacity,
            TranslationError::ServiceUnavailable(_) => ErrorCategory::Availability,
            TranslationError::InternalError(_) => ErrorCategory::Internal,
        }
    }

    /// 创建带上下文的错误
    pub fn with_context<T: fmt::Display>(mut self, context: T) -> Self {
        let current_msg = match &self {
            TranslationError::ConstructionError(msg)
            | TranslationError::ConfigError(msg)
            | TranslationError::InvalidInput(msg)
            | TranslationError::InferenceError(msg)
            | TranslationError::ServiceUnavailable(msg)
            | TranslationError::InternalError(msg) => msg.clone(),
            // 结构化变体不携带自由文本
            TranslationError::JobTimeout(_) | TranslationError::CapacityExceeded { .. } => {
                return self;
            }
        };
        let new_msg = format!("{} (上下文: {})", current_msg, context);

        match &mut self {
            TranslationError::ConstructionError(ref mut msg) => *msg = new_msg,
            TranslationError::ConfigError(ref mut msg) => *msg = new_msg,
            TranslationError::InvalidInput(ref mut msg) => *msg = new_msg,
            TranslationError::InferenceError(ref mut msg) => *msg = new_msg,
            TranslationError::ServiceUnavailable(ref mut msg) => *msg = new_msg,
            TranslationError::InternalError(ref mut msg) => *msg = new_msg,
            TranslationError::JobTimeout(_) | TranslationError::CapacityExceeded { .. } => {}
        }

        self
    }
}

/// 错误严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Construction,
    Configuration,
    Input,
    Inference,
    Timeout,
    Capacity,
    Availability,
    Internal,
}

impl ErrorCategory {
    /// 对外暴露的类别标识，用于 API 错误负载中的 `kind` 字段
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Construction => "construction",
            ErrorCategory::Configuration => "config",
            ErrorCategory::Input => "input",
            ErrorCategory::Inference => "inference",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Capacity => "capacity",
            ErrorCategory::Availability => "unavailable",
            ErrorCategory::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 标准错误转换
impl From<std::io::Error> for TranslationError {
    fn from(error: std::io::Error) -> Self {
        TranslationError::InternalError(format!("IO错误: {}", error))
    }
}

impl From<serde_json::Error> for TranslationError {
    fn from(error: serde_json::Error) -> Self {
        TranslationError::ConfigError(format!("JSON解析错误: {}", error))
    }
}

impl From<toml::de::Error> for TranslationError {
    fn from(error: toml::de::Error) -> Self {
        TranslationError::ConfigError(format!("TOML解析错误: {}", error))
    }
}

impl From<tokio::time::error::Elapsed> for TranslationError {
    fn from(error: tokio::time::error::Elapsed) -> Self {
        TranslationError::InternalError(format!("等待超时: {}", error))
    }
}

impl From<EnvError> for TranslationError {
    fn from(error: EnvError) -> Self {
        TranslationError::ConfigError(error.to_string())
    }
}

/// 错误结果类型别名
pub type TranslationResult<T> = Result<T, TranslationError>;

/// 错误统计信息
#[derive(Debug, Clone, Default)]
pub struct ErrorStats {
    pub total_errors: usize,
    pub by_category: std::collections::HashMap<ErrorCategory, usize>,
    pub by_severity: std::collections::HashMap<ErrorSeverity, usize>,
    pub retryable_errors: usize,
    pub critical_errors: usize,
}

impl ErrorStats {
    /// 记录错误
    pub fn record_error(&mut self, error: &TranslationError) {
        self.total_errors += 1;

        let category = error.category();
        *self.by_category.entry(category).or_insert(0) += 1;

        let severity = error.severity();
        *self.by_severity.entry(severity).or_insert(0) += 1;

        if error.is_retryable() {
            self.retryable_errors += 1;
        }

        if severity == ErrorSeverity::Critical {
            self.critical_errors += 1;
        }
    }

    /// 某一类别的错误数量
    pub fn count(&self, category: ErrorCategory) -> usize {
        self.by_category.get(&category).copied().unwrap_or(0)
    }
}
