//! ツール起動レイヤー
//!
//! # 責務
//!
//! - すべての外部能力（検索、検証、テキスト生成）を [`Tool`] トレイトの
//!   統一インターフェースに載せる
//! - ツール名からの解決を担う [`ToolRegistry`] を提供
//! - ステップごとの許可リスト・呼び出し予算・タイムアウトを強制する
//!   [`StepTools`] を提供
//!
//! # アーキテクチャ
//!
//! ツールは自分で例外を投げません。輸送・応答の失敗は
//! [`ToolFailure`](crate::state::ToolFailure) として成功と同じ経路で返り、
//! 呼び出し側のステップが劣化継続か中断かを判断します。
//! 起動レイヤーがエラーを返すのは呼び出し自体が不正な場合
//! （未許可ツール、予算超過、引数スキーマ違反）だけです。
//!
//! # モジュール構成
//!
//! - `traits` - 共通インターフェース（[`Tool`] トレイトと引数スキーマ）
//! - `invoker` - レジストリと予算付き呼び出し面
//! - `search` - 文献検索ツール（Semantic Scholar / arXiv）
//! - `validation` - 検証ヒューリスティックツール
//! - `generate` - LLM CLI テキスト生成ツール
//!
//! # 使用例
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use serde_json::json;
//! use kasetsu_flow::tool::{ToolLayerConfig, StepTools, builtin_registry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = Arc::new(builtin_registry(&ToolLayerConfig::default()));
//!
//!     let tools = StepTools::new(
//!         registry,
//!         vec!["arxiv_search".to_string()],
//!         3,
//!         Duration::from_secs(30),
//!     );
//!
//!     let result = tools
//!         .call("arxiv_search", json!({"query": "sparse attention"}))
//!         .await?;
//!     println!("{}", result.payload);
//!     Ok(())
//! }
//! ```

pub mod generate;
pub mod invoker;
pub mod search;
pub mod traits;
pub mod validation;

// 公開APIの再エクスポート
pub use generate::{GENERATE_TOOL, GenerateTool};
pub use invoker::{StepTools, ToolRegistry};
pub use search::{ARXIV_TOOL, ArxivSearchTool, SEMANTIC_SCHOLAR_TOOL, SemanticScholarTool};
pub use traits::{ArgKind, ArgSchema, ArgSpec, Tool};
pub use validation::{
    NOVELTY_TOOL, NoveltyCheckTool, STATISTICAL_CLAIM_TOOL, StatisticalClaimTool,
    TESTABILITY_TOOL, TestabilityScoreTool,
};

use std::sync::Arc;
use std::time::Duration;

/// ツール1回あたりのデフォルトタイムアウト
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// ツールレイヤーの構成
///
/// レジストリ構築時の既定値をまとめます。
#[derive(Debug, Clone)]
pub struct ToolLayerConfig {
    /// ツール1回の呼び出しタイムアウト
    pub call_timeout: Duration,

    /// 生成ツールが使うCLIコマンド名
    pub generate_command: String,

    /// 生成ツールのデフォルトモデル名
    pub generate_model: String,
}

impl Default for ToolLayerConfig {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            generate_command: "claude".to_string(),
            generate_model: "claude-sonnet-4-5".to_string(),
        }
    }
}

/// 組み込みツールをすべて登録したレジストリを構築
///
/// # 引数
///
/// - `config`: 生成ツールのコマンド名等の構成
///
/// # 戻り値
///
/// 6つの組み込みツールを登録済みの [`ToolRegistry`]
pub fn builtin_registry(config: &ToolLayerConfig) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(SemanticScholarTool::new()));
    registry.register(Arc::new(ArxivSearchTool::new()));
    registry.register(Arc::new(NoveltyCheckTool));
    registry.register(Arc::new(TestabilityScoreTool));
    registry.register(Arc::new(StatisticalClaimTool));
    registry.register(Arc::new(GenerateTool::with_command(
        config.generate_command.clone(),
        config.generate_model.clone(),
    )));
    registry
}
