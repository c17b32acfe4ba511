//! 统一的环境变量管理系统
//!
//! 提供类型安全、可验证的环境变量访问。所有变量都以 `OPUSMT_` 为前缀，
//! 由 `ServiceConfig::apply_env_overrides` 在配置文件之后、命令行参数之前应用。
//! 未设置的变量不覆盖任何配置，因此这里不携带默认值，只记录文档用的默认说明。

use std::env;
use std::fmt;
use std::time::Duration;

/// 环境变量解析错误
#[derive(Debug, Clone)]
pub struct EnvError {
    pub variable: String,
    pub message: String,
}

impl EnvError {
    pub fn new(variable: &str, message: impl Into<String>) -> Self {
        Self {
            variable: variable.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Environment variable '{}': {}", self.variable, self.message)
    }
}

impl std::error::Error for EnvError {}

pub type EnvResult<T> = Result<T, EnvError>;

/// 环境变量访问器特性
pub trait EnvVar<T> {
    const NAME: &'static str;
    const DESCRIPTION: &'static str;
    /// 未设置时配置层使用的值，仅用于文档
    const DEFAULT_DOC: &'static str;

    fn parse(value: &str) -> EnvResult<T>;

    /// 只在变量被显式设置时返回值；未设置时返回 `Ok(None)`
    fn get_if_set() -> EnvResult<Option<T>> {
        match env::var(Self::NAME) {
            Ok(value) => Self::parse(&value).map(Some),
            Err(env::VarError::NotPresent) => Ok(None),
            Err(env::VarError::NotUnicode(_)) => {
                Err(EnvError::new(Self::NAME, "Value is not valid UTF-8"))
            }
        }
    }

    /// 文档中的一行
    fn doc_line() -> String {
        format!(
            "- `{}`: {} (default: {})\n",
            Self::NAME,
            Self::DESCRIPTION,
            Self::DEFAULT_DOC
        )
    }
}

/// 核心环境变量定义
pub mod core {
    use super::*;

    /// 日志级别
    pub struct LogLevel;
    impl EnvVar<String> for LogLevel {
        const NAME: &'static str = "OPUSMT_LOG_LEVEL";
        const DESCRIPTION: &'static str = "Log level: trace, debug, info, warn, error";
        const DEFAULT_DOC: &'static str = "info";

        fn parse(value: &str) -> EnvResult<String> {
            let level = value.trim().to_lowercase();
            match level.as_str() {
                "trace" | "debug" | "info" | "warn" | "error" => Ok(level),
                _ => Err(EnvError::new(
                    Self::NAME,
                    format!("Invalid log level '{}'. Use: trace, debug, info, warn, error", value),
                )),
            }
        }
    }
}

/// 模型相关环境变量
pub mod model {
    use super::*;

    /// 模型目录
    pub struct ModelDir;
    impl EnvVar<String> for ModelDir {
        const NAME: &'static str = "OPUSMT_MODEL_DIR";
        const DESCRIPTION: &'static str = "Directory holding vocab.json, source_tokenizer.json and the Marian weights";
        const DEFAULT_DOC: &'static str = "models/opus-mt-en-fr";

        fn parse(value: &str) -> EnvResult<String> {
            non_empty(value, Self::NAME, "Model directory cannot be empty")
        }
    }

    /// 推理后端
    pub struct Backend;
    impl EnvVar<String> for Backend {
        const NAME: &'static str = "OPUSMT_BACKEND";
        const DESCRIPTION: &'static str = "Model runtime: echo, marian";
        const DEFAULT_DOC: &'static str = "marian";

        fn parse(value: &str) -> EnvResult<String> {
            let backend = value.trim().to_lowercase();
            match backend.as_str() {
                "echo" | "marian" => Ok(backend),
                other => Err(EnvError::new(
                    Self::NAME,
                    format!("Unknown backend '{}'. Use: echo, marian", other),
                )),
            }
        }
    }
}

/// 推理参数环境变量
pub mod inference {
    use super::*;

    /// 束宽
    pub struct BeamWidth;
    impl EnvVar<usize> for BeamWidth {
        const NAME: &'static str = "OPUSMT_BEAM_WIDTH";
        const DESCRIPTION: &'static str = "Beam width used for every job (1 = greedy)";
        const DEFAULT_DOC: &'static str = "1";

        fn parse(value: &str) -> EnvResult<usize> {
            bounded_usize(value, Self::NAME, 1..=64)
        }
    }

    /// 最大输出长度
    pub struct MaxOutputLength;
    impl EnvVar<usize> for MaxOutputLength {
        const NAME: &'static str = "OPUSMT_MAX_OUTPUT_LENGTH";
        const DESCRIPTION: &'static str = "Maximum number of output symbols per item";
        const DEFAULT_DOC: &'static str = "512";

        fn parse(value: &str) -> EnvResult<usize> {
            bounded_usize(value, Self::NAME, 1..=4096)
        }
    }
}

/// 调度层环境变量
pub mod dispatch {
    use super::*;

    /// 工作线程数
    pub struct Workers;
    impl EnvVar<usize> for Workers {
        const NAME: &'static str = "OPUSMT_WORKERS";
        const DESCRIPTION: &'static str = "Number of inference worker threads";
        const DEFAULT_DOC: &'static str = "available CPU cores";

        fn parse(value: &str) -> EnvResult<usize> {
            bounded_usize(value, Self::NAME, 1..=128)
        }
    }

    /// 队列深度，`0` 或 `unbounded` 表示不限制
    pub struct QueueDepth;
    impl EnvVar<Option<usize>> for QueueDepth {
        const NAME: &'static str = "OPUSMT_QUEUE_DEPTH";
        const DESCRIPTION: &'static str = "Maximum queued jobs (0 or 'unbounded' disables the limit)";
        const DEFAULT_DOC: &'static str = "64";

        fn parse(value: &str) -> EnvResult<Option<usize>> {
            let value = value.trim();
            if value.eq_ignore_ascii_case("unbounded") || value == "0" {
                return Ok(None);
            }
            bounded_usize(value, Self::NAME, 1..=1_000_000).map(Some)
        }
    }

    /// 单任务超时（秒）
    pub struct JobTimeout;
    impl EnvVar<Duration> for JobTimeout {
        const NAME: &'static str = "OPUSMT_JOB_TIMEOUT";
        const DESCRIPTION: &'static str = "Per-job deadline in seconds";
        const DEFAULT_DOC: &'static str = "60";

        fn parse(value: &str) -> EnvResult<Duration> {
            bounded_usize(value, Self::NAME, 1..=3600).map(|secs| Duration::from_secs(secs as u64))
        }
    }
}

/// Web服务器相关环境变量
pub mod web {
    use super::*;

    /// 绑定地址
    pub struct BindAddress;
    impl EnvVar<String> for BindAddress {
        const NAME: &'static str = "OPUSMT_BIND_ADDRESS";
        const DESCRIPTION: &'static str = "Web server bind address";
        const DEFAULT_DOC: &'static str = "127.0.0.1";

        fn parse(value: &str) -> EnvResult<String> {
            non_empty(value, Self::NAME, "Address cannot be empty")
        }
    }

    /// 端口
    pub struct Port;
    impl EnvVar<u16> for Port {
        const NAME: &'static str = "OPUSMT_PORT";
        const DESCRIPTION: &'static str = "Web server port";
        const DEFAULT_DOC: &'static str = "8000";

        fn parse(value: &str) -> EnvResult<u16> {
            match value.trim().parse::<u16>() {
                Ok(0) => Err(EnvError::new(Self::NAME, "Port cannot be 0")),
                Ok(port) => Ok(port),
                Err(_) => Err(EnvError::new(
                    Self::NAME,
                    "Must be a valid port number (1-65535)",
                )),
            }
        }
    }
}

fn non_empty(value: &str, name: &str, message: &str) -> EnvResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EnvError::new(name, message));
    }
    Ok(trimmed.to_string())
}

fn bounded_usize(
    value: &str,
    name: &str,
    range: std::ops::RangeInclusive<usize>,
) -> EnvResult<usize> {
    let num: usize = value
        .trim()
        .parse()
        .map_err(|_| EnvError::new(name, "Must be a valid positive number"))?;

    if !range.contains(&num) {
        return Err(EnvError::new(
            name,
            format!(
                "Value {} is outside {}..={}",
                num,
                range.start(),
                range.end()
            ),
        ));
    }

    Ok(num)
}

/// 环境变量文档生成器
pub fn generate_env_docs() -> String {
    let sections: [(&str, Vec<String>); 4] = [
        ("Core", vec![core::LogLevel::doc_line()]),
        (
            "Model",
            vec![
                model::ModelDir::doc_line(),
                model::Backend::doc_line(),
                inference::BeamWidth::doc_line(),
                inference::MaxOutputLength::doc_line(),
            ],
        ),
        (
            "Dispatch",
            vec![
                dispatch::Workers::doc_line(),
                dispatch::QueueDepth::doc_line(),
                dispatch::JobTimeout::doc_line(),
            ],
        ),
        (
            "Web Server",
            vec![web::BindAddress::doc_line(), web::Port::doc_line()],
        ),
    ];

    let mut docs = String::from("# Environment Variables Documentation\n");
    for (title, lines) in sections {
        docs.push_str(&format!("\n## {} Configuration\n\n", title));
        for line in lines {
            docs.push_str(&line);
        }
    }
    docs
}
