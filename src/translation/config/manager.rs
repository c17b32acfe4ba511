//! 配置管理器
//!
//! 提供统一的配置接口，支持文件配置、环境变量和默认值

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::constants;
use crate::translation::codec::{BoundaryPolicy, CodecOptions};
use crate::translation::dispatch::DispatchConfig;
use crate::translation::engine::{EngineConfig, InferenceParams};
use crate::translation::error::{TranslationError, TranslationResult};

/// 模型运行时后端
///
/// 默认总是 `marian`；`echo` 不做翻译，只能显式选择。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// 原样输出源序列的确定性运行时，用于冒烟检查
    Echo,
    /// candle 驱动的 Marian 编码器-解码器
    #[default]
    Marian,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Echo => "echo",
            BackendKind::Marian => "marian",
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = TranslationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "echo" => Ok(BackendKind::Echo),
            "marian" => Ok(BackendKind::Marian),
            other => Err(TranslationError::ConfigError(format!(
                "未知的模型后端: {}",
                other
            ))),
        }
    }
}

/// 服务配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    // 模型
    pub model_dir: String,
    pub backend: BackendKind,

    // 符号表
    pub decoder_start_token: String,
    pub end_token: String,
    pub unknown_token: String,
    pub pad_token: String,
    pub unknown_placeholder: String,
    pub prepend_start: bool,
    pub append_end: bool,

    // 推理
    pub beam_width: usize,
    pub max_output_length: usize,
    pub length_penalty: f32,
    pub max_batch_items: usize,

    // 调度，queue_depth 为 0 表示不限制队列
    pub workers: usize,
    pub queue_depth: usize,
    pub job_timeout_secs: u64,

    // Web 服务
    pub bind_address: String,
    pub port: u16,
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            model_dir: constants::DEFAULT_MODEL_DIR.to_string(),
            backend: BackendKind::default(),

            decoder_start_token: constants::DEFAULT_DECODER_START_TOKEN.to_string(),
            end_token: constants::DEFAULT_END_TOKEN.to_string(),
            unknown_token: constants::DEFAULT_UNKNOWN_TOKEN.to_string(),
            pad_token: constants::DEFAULT_PAD_TOKEN.to_string(),
            unknown_placeholder: constants::DEFAULT_UNKNOWN_PLACEHOLDER.to_string(),
            prepend_start: false,
            append_end: true,

            beam_width: constants::DEFAULT_BEAM_WIDTH,
            max_output_length: constants::DEFAULT_MAX_OUTPUT_LENGTH,
            length_penalty: constants::DEFAULT_LENGTH_PENALTY,
            max_batch_items: constants::DEFAULT_MAX_BATCH_ITEMS,

            workers: super::default_workers(),
            queue_depth: constants::DEFAULT_QUEUE_DEPTH,
            job_timeout_secs: constants::DEFAULT_JOB_TIMEOUT.as_secs(),

            bind_address: constants::DEFAULT_BIND_ADDRESS.to_string(),
            port: constants::DEFAULT_PORT,
            log_level: "info".to_string(),
        }
    }
}

impl ServiceConfig {
    /// 验证配置
    pub fn validate(&self) -> TranslationResult<()> {
        if self.model_dir.trim().is_empty() {
            return Err(TranslationError::ConfigError("模型目录不能为空".to_string()));
        }

        if self.beam_width == 0 {
            return Err(TranslationError::ConfigError("束宽不能为0".to_string()));
        }

        if self.max_output_length == 0 {
            return Err(TranslationError::ConfigError("最大输出长度不能为0".to_string()));
        }

        if !self.length_penalty.is_finite() {
            return Err(TranslationError::ConfigError("长度惩罚必须是有限数值".to_string()));
        }

        if self.max_batch_items == 0 {
            return Err(TranslationError::ConfigError("批次大小不能为0".to_string()));
        }

        if self.workers == 0 {
            return Err(TranslationError::ConfigError("工作线程数不能为0".to_string()));
        }

        if self.job_timeout_secs == 0 {
            return Err(TranslationError::ConfigError("任务超时必须大于0".to_string()));
        }

        for (name, token) in [
            ("decoder_start_token", &self.decoder_start_token),
            ("end_token", &self.end_token),
            ("unknown_token", &self.unknown_token),
            ("pad_token", &self.pad_token),
        ] {
            if token.is_empty() {
                return Err(TranslationError::ConfigError(format!(
                    "特殊符号 {} 不能为空",
                    name
                )));
            }
        }

        Ok(())
    }

    /// 应用环境变量覆盖（使用类型安全环境变量系统）
    ///
    /// 只有显式设置的变量才会覆盖；设置了但无法解析的变量返回错误。
    pub fn apply_env_overrides(&mut self) -> TranslationResult<()> {
        use crate::env::{core, dispatch, inference, model, web, EnvVar};

        if let Some(level) = core::LogLevel::get_if_set()? {
            self.log_level = level;
        }

        if let Some(dir) = model::ModelDir::get_if_set()? {
            tracing::info!("环境变量覆盖模型目录: {}", dir);
            self.model_dir = dir;
        }

        if let Some(backend) = model::Backend::get_if_set()? {
            self.backend = backend.parse()?;
        }

        if let Some(beam_width) = inference::BeamWidth::get_if_set()? {
            self.beam_width = beam_width;
        }

        if let Some(max_len) = inference::MaxOutputLength::get_if_set()? {
            self.max_output_length = max_len;
        }

        if let Some(workers) = dispatch::Workers::get_if_set()? {
            self.workers = workers;
        }

        if let Some(depth) = dispatch::QueueDepth::get_if_set()? {
            self.queue_depth = depth.unwrap_or(0);
        }

        if let Some(timeout) = dispatch::JobTimeout::get_if_set()? {
            self.job_timeout_secs = timeout.as_secs();
        }

        if let Some(addr) = web::BindAddress::get_if_set()? {
            self.bind_address = addr;
        }

        if let Some(port) = web::Port::get_if_set()? {
            self.port = port;
        }

        Ok(())
    }

    /// 队列容量，`None` 表示不限制
    pub fn queue_capacity(&self) -> Option<usize> {
        if self.queue_depth == 0 {
            None
        } else {
            Some(self.queue_depth)
        }
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn inference_params(&self) -> InferenceParams {
        InferenceParams {
            beam_width: self.beam_width,
            max_output_length: self.max_output_length,
            length_penalty: self.length_penalty,
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_batch_items: self.max_batch_items,
        }
    }

    pub fn codec_options(&self) -> CodecOptions {
        CodecOptions {
            decoder_start_token: self.decoder_start_token.clone(),
            end_token: self.end_token.clone(),
            unknown_token: self.unknown_token.clone(),
            pad_token: self.pad_token.clone(),
            unknown_placeholder: self.unknown_placeholder.clone(),
            boundary: BoundaryPolicy {
                prepend_start: self.prepend_start,
                append_end: self.append_end,
            },
        }
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            workers: self.workers,
            queue_depth: self.queue_capacity(),
            job_timeout: self.job_timeout(),
            params: self.inference_params(),
        }
    }
}

/// 配置管理器
pub struct ConfigManager {
    config: ServiceConfig,
}

impl ConfigManager {
    /// 按默认搜索路径加载配置
    pub fn new() -> TranslationResult<Self> {
        Self::load(None)
    }

    /// 加载配置；`path` 指定时只读取该文件，文件不存在视为错误
    pub fn load(path: Option<&str>) -> TranslationResult<Self> {
        Self::load_dotenv();

        let mut config = match path {
            Some(path) => {
                let expanded = shellexpand::tilde(path);
                tracing::info!("加载配置文件: {}", expanded);
                Self::load_from_file(&expanded)?
            }
            None => Self::load_config()?,
        };
        config.apply_env_overrides()?;
        config.validate()?;

        Ok(Self { config })
    }

    pub fn into_config(self) -> ServiceConfig {
        self.config
    }

    /// 从默认路径查找配置文件
    fn load_config() -> TranslationResult<ServiceConfig> {
        for path in constants::CONFIG_PATHS {
            let expanded_path = shellexpand::tilde(path);
            if Path::new(expanded_path.as_ref()).exists() {
                tracing::info!("加载配置文件: {}", expanded_path);
                return Self::load_from_file(&expanded_path);
            }
        }

        tracing::info!("未找到配置文件，使用默认配置");
        Ok(ServiceConfig::default())
    }

    /// 从指定文件加载配置
    pub fn load_from_file(path: &str) -> TranslationResult<ServiceConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TranslationError::ConfigError(format!("读取配置文件失败 {}: {}", path, e)))?;

        if path.ends_with(".json") {
            serde_json::from_str(&content)
                .map_err(|e| TranslationError::ConfigError(format!("解析JSON配置失败: {}", e)))
        } else {
            toml::from_str(&content)
                .map_err(|e| TranslationError::ConfigError(format!("解析TOML配置失败: {}", e)))
        }
    }

    /// 加载 .env 文件
    fn load_dotenv() {
        let env_files = [".env.local", ".env"];

        for env_file in &env_files {
            if Path::new(env_file).exists() && dotenv::from_filename(env_file).is_ok() {
                tracing::info!("已加载环境变量文件: {}", env_file);
                break;
            }
        }
    }

    /// 生成示例配置文件
    pub fn generate_example_config(path: &str) -> TranslationResult<()> {
        let config = ServiceConfig::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| TranslationError::ConfigError(format!("序列化配置失败: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| TranslationError::ConfigError(format!("写入配置文件失败: {}", e)))?;

        Ok(())
    }
}
