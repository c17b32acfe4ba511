//! 服务配置管理模块
//!
//! 配置按以下顺序叠加：默认值 → 配置文件 → `.env` 文件 → `OPUSMT_*` 环境变量 → 命令行参数

pub mod manager;

// 重新导出主要类型
pub use manager::{BackendKind, ConfigManager, ServiceConfig};

/// 配置常量
pub mod constants {
    use std::time::Duration;

    // 模型目录
    pub const DEFAULT_MODEL_DIR: &str = "models/opus-mt-en-fr";
    pub const VOCAB_FILE: &str = "vocab.json";
    pub const SOURCE_TOKENIZER_FILE: &str = "source_tokenizer.json";
    pub const TARGET_TOKENIZER_FILE: &str = "target_tokenizer.json";
    pub const MODEL_CONFIG_FILE: &str = "config.json";
    pub const MODEL_WEIGHTS_FILE: &str = "model.safetensors";

    // Marian 特殊符号
    pub const DEFAULT_DECODER_START_TOKEN: &str = "<pad>";
    pub const DEFAULT_END_TOKEN: &str = "</s>";
    pub const DEFAULT_UNKNOWN_TOKEN: &str = "<unk>";
    pub const DEFAULT_PAD_TOKEN: &str = "<pad>";
    pub const DEFAULT_UNKNOWN_PLACEHOLDER: &str = "\u{FFFD}";

    // 推理参数
    pub const DEFAULT_BEAM_WIDTH: usize = 1;
    pub const DEFAULT_MAX_OUTPUT_LENGTH: usize = 512;
    pub const DEFAULT_LENGTH_PENALTY: f32 = 1.0;
    pub const DEFAULT_MAX_BATCH_ITEMS: usize = 32;

    // 调度
    pub const DEFAULT_QUEUE_DEPTH: usize = 64;
    pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(60);

    // Web 服务
    pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1";
    pub const DEFAULT_PORT: u16 = 8000;

    // 配置文件搜索路径
    pub const CONFIG_PATHS: &[&str] = &[
        "opusmt.toml",
        "config.toml",
        ".opusmt.toml",
        "~/.config/opusmt/config.toml",
        "/etc/opusmt/config.toml",
    ];
}

/// 默认工作线程数：CPU 核数
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
