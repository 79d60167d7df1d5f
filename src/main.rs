//! kasetsu-flow CLI
//!
//! # サブコマンド
//!
//! - `run` - パイプラインを実行し、終端状態をJSONで出力
//! - `validate` - パイプライン定義を検証（実行はしない)
//!
//! # 使用例
//!
//! ```text
//! kasetsu-flow run --mode agentic --focus "attention mechanisms" --source paper.txt
//! kasetsu-flow run --pipeline pipelines/custom.toml --source a.txt --source b.txt
//! kasetsu-flow validate --pipeline pipelines/custom.toml
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{Level, error, info};

use kasetsu_flow::config::{Pipeline, PipelineMode};
use kasetsu_flow::engine::{JsonCheckpointStore, WorkflowEngine};
use kasetsu_flow::runner::TaskManager;
use kasetsu_flow::state::{SourceDocument, WorkflowInput};
use kasetsu_flow::step::StepRegistry;
use kasetsu_flow::tool::{ToolLayerConfig, builtin_registry};

#[derive(Parser)]
#[command(name = "kasetsu-flow", version, about = "ロールパイプライン型の仮説生成ワークフローエンジン")]
struct Cli {
    /// ログをJSON形式で出力する
    #[arg(long, global = true)]
    log_json: bool,

    /// ログファイルの出力先ディレクトリ（省略時は標準エラー出力のみ）
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// デバッグログを有効にする
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// パイプラインを実行する
    Run {
        /// パイプライン定義ファイル（省略時は --mode の組み込み定義）
        #[arg(long)]
        pipeline: Option<PathBuf>,

        /// 組み込みパイプラインの種別（standard / agentic）
        #[arg(long, default_value = "agentic")]
        mode: String,

        /// 研究フォーカス
        #[arg(long)]
        focus: Option<String>,

        /// ソース文書ファイル（複数指定可）
        #[arg(long)]
        source: Vec<PathBuf>,

        /// チェックポイントの保存先ディレクトリ
        #[arg(long)]
        checkpoint_dir: Option<PathBuf>,

        /// 生成ツールが使うCLIコマンド名
        #[arg(long, default_value = "claude")]
        generate_command: String,
    },

    /// パイプライン定義を検証する
    Validate {
        /// パイプライン定義ファイル
        #[arg(long)]
        pipeline: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // ファイルロガーのフラッシュはガードの生存期間に紐づく
    let _guard = init_tracing(cli.verbose, cli.log_json, cli.log_dir.as_deref());

    let result = match cli.command {
        Command::Run {
            pipeline,
            mode,
            focus,
            source,
            checkpoint_dir,
            generate_command,
        } => run(
            pipeline,
            &mode,
            focus,
            &source,
            checkpoint_dir,
            generate_command,
        ),
        Command::Validate { pipeline } => validate(&pipeline),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "実行に失敗しました");
            eprintln!("エラー: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// tracing サブスクライバを初期化する
///
/// ファイル出力時は non-blocking ライターのガードを返します。
fn init_tracing(
    verbose: bool,
    json: bool,
    log_dir: Option<&Path>,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };

    if let Some(dir) = log_dir {
        let appender = tracing_appender::rolling::daily(dir, "kasetsu-flow.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        if json {
            tracing_subscriber::fmt()
                .with_max_level(level)
                .with_writer(writer)
                .with_ansi(false)
                .json()
                .init();
        } else {
            tracing_subscriber::fmt()
                .with_max_level(level)
                .with_writer(writer)
                .with_ansi(false)
                .init();
        }
        Some(guard)
    } else {
        if json {
            tracing_subscriber::fmt()
                .with_max_level(level)
                .with_writer(std::io::stderr)
                .json()
                .init();
        } else {
            tracing_subscriber::fmt()
                .with_max_level(level)
                .with_writer(std::io::stderr)
                .init();
        }
        None
    }
}

/// パイプライン定義を解決する
fn load_pipeline(
    pipeline: Option<&Path>,
    mode: &str,
) -> Result<Pipeline, Box<dyn std::error::Error>> {
    match pipeline {
        Some(path) => Ok(Pipeline::from_file(path)?),
        None => Ok(Pipeline::builtin(PipelineMode::parse(mode)?)?),
    }
}

/// ソース文書ファイルを読み込む
fn load_sources(paths: &[PathBuf]) -> Result<Vec<SourceDocument>, std::io::Error> {
    paths
        .iter()
        .map(|path| {
            let content = std::fs::read_to_string(path)?;
            let title = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "untitled".to_string());
            Ok(SourceDocument {
                id: path.to_string_lossy().into_owned(),
                title,
                content,
            })
        })
        .collect()
}

fn run(
    pipeline_path: Option<PathBuf>,
    mode: &str,
    focus: Option<String>,
    source_paths: &[PathBuf],
    checkpoint_dir: Option<PathBuf>,
    generate_command: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let pipeline = load_pipeline(pipeline_path.as_deref(), mode)?;
    let sources = load_sources(source_paths)?;

    info!(
        pipeline = %pipeline.name,
        sources = sources.len(),
        "パイプラインを実行します"
    );

    let tool_config = ToolLayerConfig {
        generate_command,
        ..ToolLayerConfig::default()
    };

    let mut engine = WorkflowEngine::new(
        pipeline,
        StepRegistry::builtin(),
        builtin_registry(&tool_config),
        tool_config,
    );

    if let Some(dir) = checkpoint_dir {
        engine = engine.with_checkpoint_store(Arc::new(JsonCheckpointStore::new(dir)?));
    }

    let runtime = tokio::runtime::Runtime::new()?;
    let state = runtime.block_on(async {
        TaskManager::new(engine)
            .run_sync(WorkflowInput { focus, sources })
            .await
    })?;

    println!("{}", state.to_json()?);
    Ok(())
}

fn validate(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let pipeline = Pipeline::from_file(path)?;
    println!(
        "OK: パイプライン '{}'（ステップ{}件・ルート{}件）",
        pipeline.name,
        pipeline.steps.len(),
        pipeline.routes.len()
    );
    Ok(())
}
