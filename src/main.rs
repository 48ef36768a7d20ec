//! Quill 命令行
//!
//! - `quill draft <doc> --instructions <text|@file> [--asset name=path]...`：运行 Manager 主循环
//! - `quill cite <doc>`：运行引用流水线
//! - `quill status <doc>`：查看已保存的工作流状态

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use quill::agents::{AgentRuntime, PromptLibrary};
use quill::asset::Asset;
use quill::config::{load_config, AppConfig};
use quill::core::ShutdownManager;
use quill::document::FileDocument;
use quill::llm::create_gateway_from_config;
use quill::state::{FileStateStore, Limits, StateKey, StateStore};
use quill::workflow::{CitationPipeline, Manager};

#[derive(Parser)]
#[command(name = "quill")]
#[command(about = "Multi-agent long-form document drafting")]
#[command(version)]
struct Cli {
    /// 额外的配置文件（覆盖 config/default.toml）
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// 文档内的分节标识，不同分节各自保存状态
    #[arg(long, global = true, default_value = "main")]
    section: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 规划、撰写、评审并修订文档
    Draft {
        document: PathBuf,
        /// 写作要求；以 @ 开头时从文件读取
        #[arg(short, long)]
        instructions: String,
        /// 素材：name=path，可重复
        #[arg(long = "asset", value_parser = parse_asset_arg)]
        assets: Vec<(String, PathBuf)>,
    },
    /// 为文档中的论断补充引用
    Cite {
        document: PathBuf,
        #[arg(short, long, default_value = "Add supporting citations to factual claims.")]
        instructions: String,
    },
    /// 打印已保存的工作流状态
    Status { document: PathBuf },
}

fn parse_asset_arg(s: &str) -> Result<(String, PathBuf), String> {
    match s.split_once('=') {
        Some((name, path)) if !name.trim().is_empty() && !path.trim().is_empty() => {
            Ok((name.trim().to_string(), PathBuf::from(path.trim())))
        }
        _ => Err(format!("expected name=path, got {s:?}")),
    }
}

fn read_instructions(arg: &str) -> anyhow::Result<String> {
    match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read instructions from {path}")),
        None => Ok(arg.to_string()),
    }
}

fn state_key(document: &Path, section: &str) -> StateKey {
    StateKey::new(document.display().to_string(), section)
}

fn build_runtime(
    cfg: &AppConfig,
    store: Arc<dyn StateStore>,
    key: StateKey,
    shutdown: &ShutdownManager,
) -> AgentRuntime {
    let gateway = Arc::new(create_gateway_from_config(cfg));
    AgentRuntime::new(gateway, store, key)
        .with_limits(Limits::from(&cfg.workflow))
        .with_prompts(PromptLibrary::new(cfg.prompts.dir.clone()))
        .with_cancel_token(shutdown.token())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    quill::observability::init();

    let cli = Cli::parse();
    let cfg = load_config(cli.config.clone()).context("Failed to load configuration")?;
    let store: Arc<dyn StateStore> = Arc::new(FileStateStore::new(&cfg.app.state_dir));

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();

    match cli.command {
        Command::Draft {
            document,
            instructions,
            assets,
        } => {
            let instructions = read_instructions(&instructions)?;
            let mut loaded = Vec::with_capacity(assets.len());
            for (name, path) in assets {
                let asset = Asset::load(name, &path)
                    .await
                    .with_context(|| format!("Failed to load asset {}", path.display()))?;
                loaded.push(asset);
            }

            let runtime = build_runtime(&cfg, store, state_key(&document, &cli.section), &shutdown);
            let doc = FileDocument::new(&document);
            let outcome = Manager::new(&runtime, &doc)
                .with_assets(loaded)
                .run(&instructions)
                .await
                .context("Drafting run failed")?;

            let (prompt, completion, total) = runtime.gateway().token_usage();
            println!(
                "{} after {} iteration(s): {} words written to {}",
                if outcome.finished { "Finished" } else { "Stopped at iteration limit" },
                outcome.iterations,
                quill::agents::word_count(&outcome.document),
                document.display()
            );
            println!("Tokens: prompt {prompt}, completion {completion}, total {total}");
        }
        Command::Cite {
            document,
            instructions,
        } => {
            let instructions = read_instructions(&instructions)?;
            let runtime = build_runtime(&cfg, store, state_key(&document, &cli.section), &shutdown);
            let doc = FileDocument::new(&document);
            let report = CitationPipeline::new(&runtime, &doc)
                .run(&instructions)
                .await
                .context("Citation run failed")?;
            println!(
                "Citations: {} target(s), {} inserted, {} skipped",
                report.targets_found, report.inserted, report.skipped
            );
        }
        Command::Status { document } => {
            let key = state_key(&document, &cli.section);
            let state = store
                .get(&key)
                .await
                .context("Failed to read workflow state")?;
            match state {
                Some(state) => println!("{}", serde_json::to_string_pretty(&state)?),
                None => println!("No saved state for {key}"),
            }
        }
    }

    Ok(())
}
