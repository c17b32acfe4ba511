//! Web 服务器主程序入口

use clap::Parser;

use opusmt::translation::{BackendKind, ConfigManager, TranslationResult};
use opusmt::web::WebServer;

/// opus-mt 翻译服务器
#[derive(Parser, Debug)]
#[command(
    name = "opusmt-server",
    version,
    author,
    about = "Batched seq2seq translation server",
    help_template = "{name} {version}\n{author}\n{about}\n\n{usage-heading} {usage}\n\n{all-args}"
)]
struct Args {
    /// Bind address [default: 127.0.0.1]
    #[arg(short, long)]
    bind: Option<String>,

    /// Port number [default: 8000]
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory holding vocab.json, source_tokenizer.json (and config.json + model.safetensors for marian)
    #[arg(short, long, value_name = "DIR")]
    model_dir: Option<String>,

    /// Configuration file (TOML or JSON)
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Number of inference worker threads
    #[arg(short, long)]
    workers: Option<usize>,

    /// Maximum queued jobs, 0 disables the limit
    #[arg(long)]
    queue_depth: Option<usize>,

    /// Model runtime: echo, marian
    #[arg(long)]
    backend: Option<BackendKind>,

    /// Log level: trace, debug, info, warn, error
    #[arg(long)]
    log_level: Option<String>,

    /// Write an example configuration file and exit
    #[arg(long, value_name = "FILE")]
    generate_config: Option<String>,

    /// Print the supported environment variables and exit
    #[arg(long)]
    env_docs: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.env_docs {
        print!("{}", opusmt::env::generate_env_docs());
        return Ok(());
    }

    if let Some(path) = &args.generate_config {
        ConfigManager::generate_example_config(path)?;
        println!("示例配置已写入 {}", path);
        return Ok(());
    }

    let mut config = ConfigManager::load(args.config.as_deref())?.into_config();
    apply_cli_overrides(&mut config, &args)?;

    init_logging(&config.log_level);
    tracing::info!(
        "启动 opusmt-server: 模型目录 {}, 后端 {}, {} 个工作线程",
        config.model_dir,
        config.backend.as_str(),
        config.workers
    );

    WebServer::new(config).start().await?;

    Ok(())
}

/// 命令行参数覆盖配置文件与环境变量
fn apply_cli_overrides(
    config: &mut opusmt::translation::ServiceConfig,
    args: &Args,
) -> TranslationResult<()> {
    if let Some(bind) = &args.bind {
        config.bind_address = bind.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(dir) = &args.model_dir {
        config.model_dir = dir.clone();
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(depth) = args.queue_depth {
        config.queue_depth = depth;
    }
    if let Some(backend) = args.backend {
        config.backend = backend;
    }
    if let Some(level) = &args.log_level {
        config.log_level = level.clone();
    }
    config.validate()
}

fn init_logging(level: &str) {
    let level = level.parse().unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();
}
