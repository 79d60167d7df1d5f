//! ワークフロー実行エンジン
//!
//! # 責務
//!
//! - パイプライン定義に沿ったステップの逐次実行（[`executor`]）
//! - 実行途中の状態の永続化（[`checkpoint`]）
//!
//! # アーキテクチャ
//!
//! 状態の変更経路は1本だけです。ステップはスナップショットに対して
//! 差分を計算し、エンジンがそれを正準状態へ適用します。ルーターの
//! 判定・差分適用・チェックポイント・進捗発行はすべてエンジンの
//! ループ内で行われます。
//!
//! # モジュール構成
//!
//! - `executor` - エンジン本体、キャンセルハンドル、進捗スナップショット
//! - `checkpoint` - 状態の保存・読み込み
//!
//! # 使用例
//!
//! ```rust,no_run
//! use tokio::sync::watch;
//! use kasetsu_flow::config::{Pipeline, PipelineMode};
//! use kasetsu_flow::engine::{CancelHandle, ProgressSnapshot, WorkflowEngine};
//! use kasetsu_flow::state::WorkflowInput;
//! use kasetsu_flow::step::StepRegistry;
//! use kasetsu_flow::tool::{ToolLayerConfig, builtin_registry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let tool_config = ToolLayerConfig::default();
//!     let engine = WorkflowEngine::new(
//!         Pipeline::builtin(PipelineMode::Agentic)?,
//!         StepRegistry::builtin(),
//!         builtin_registry(&tool_config),
//!         tool_config,
//!     );
//!
//!     let (progress, _) = watch::channel(ProgressSnapshot::default());
//!     let input = WorkflowInput {
//!         focus: Some("attention mechanisms".to_string()),
//!         sources: Vec::new(),
//!     };
//!     let state = engine.run(input, CancelHandle::new(), progress).await?;
//!     println!("{}", state.to_json()?);
//!     Ok(())
//! }
//! ```

pub mod checkpoint;
pub mod executor;

// 公開APIの再エクスポート
pub use checkpoint::{CheckpointStore, JsonCheckpointStore};
pub use executor::{CancelHandle, ProgressSnapshot, WorkflowEngine};
