//! パイプライン定義の読み込みと検証
//!
//! # 責務
//!
//! - TOML 形式のパイプライン定義を読み込み、検証済みのドメインモデルに変換
//! - ステップ列とルーティング規則の整合性チェック
//! - 組み込みパイプライン（standard / agentic）の提供
//!
//! # 設計思想
//!
//! TOML デシリアライズ専用の DTO と、バリデーション済みのドメインモデルを
//! 分離しています。外部に公開されるのはドメインモデルだけです。
//!
//! ```text
//! TOML ファイル
//!   ↓ (デシリアライズ)
//! PipelineDto
//!   ↓ (TryFrom でバリデーション)
//! Pipeline (ドメインモデル)
//! ```
//!
//! # モジュール構成
//!
//! - `dto` - TOML デシリアライズ用 DTO（外部非公開）
//! - `step` - ステップ仕様とロール定義
//! - `pipeline` - パイプライン定義のドメインモデル
//!
//! # 使用例
//!
//! ```rust
//! use kasetsu_flow::config::{Pipeline, PipelineMode};
//!
//! let pipeline = Pipeline::builtin(PipelineMode::Agentic).unwrap();
//! assert_eq!(pipeline.entry, "research");
//! assert_eq!(pipeline.steps.len(), 4);
//! ```

mod dto;
pub mod pipeline;
pub mod step;

// 公開APIの再エクスポート
pub use pipeline::{Pipeline, PipelineMode, RouteRule};
pub use step::{StepRole, StepSpec};
