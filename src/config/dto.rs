//! TOML デシリアライズ用の DTO (Data Transfer Object)
//!
//! # 責務
//!
//! このモジュールは、TOML ファイルからのデータ読み込み専用の構造体を提供します。
//! DTO はバリデーション前の「生データ」を表現し、ドメインモデルとは分離されています。
//!
//! ## 設計思想
//!
//! - **単一責務**: TOML のデシリアライズのみを担当
//! - **TOML 構造への密結合**: TOML の構造変更に柔軟に対応
//! - **バリデーション前の状態**: 不正なデータも一旦受け入れる
//! - **カプセル化**: config モジュール内部のみで使用（外部非公開）
//!
//! ## 変換フロー
//!
//! ```text
//! TOML ファイル
//!   ↓ (デシリアライズ)
//! PipelineDto
//!   ↓ (TryFrom でバリデーション)
//! Pipeline (ドメインモデル)
//! ```

use serde::{Deserialize, Serialize};

/// パイプライン DTO
///
/// TOML の `[pipeline]` セクション、`[[steps]]` 配列、`[[routes]]` 配列を
/// デシリアライズ/シリアライズします。
///
/// **注**: この構造体は config モジュール内部の実装詳細です。
/// 外部からは [`Pipeline`](super::pipeline::Pipeline) を使用してください。
#[derive(Debug, Serialize, Deserialize)]
pub(super) struct PipelineDto {
    /// パイプラインのメタデータ
    pub(super) pipeline: PipelineMetadataDto,

    /// ステップの配列（定義順がそのまま規定の実行順）
    pub(super) steps: Vec<StepSpecDto>,

    /// ルーティング規則の配列（定義順が評価順、省略時は空）
    #[serde(default)]
    pub(super) routes: Vec<RouteRuleDto>,
}

/// パイプラインメタデータ DTO
#[derive(Debug, Serialize, Deserialize)]
pub(super) struct PipelineMetadataDto {
    /// パイプライン名
    pub(super) name: String,

    /// 説明（任意）
    pub(super) description: Option<String>,

    /// 最初に実行するステップ名
    pub(super) entry: String,

    /// 反復回数の上限（省略時はデフォルト値）
    pub(super) max_iterations: Option<u32>,

    /// 出ていくルートのないステップを終端として扱うか（省略時は false）
    pub(super) fallback_terminal: Option<bool>,
}

/// ステップ仕様 DTO
#[derive(Debug, Serialize, Deserialize)]
pub(super) struct StepSpecDto {
    /// ステップ名（パイプライン内で一意）
    pub(super) name: String,

    /// ステップのロール（振る舞いの実装を選択）
    pub(super) role: String,

    /// このステップに許可するツール名（省略時は空＝ツール不使用）
    pub(super) tools: Option<Vec<String>>,

    /// ステップ1回あたりのツール呼び出し予算（省略時はデフォルト値）
    pub(super) tool_budget: Option<u32>,

    /// ステップ全体のタイムアウト秒数（省略時はデフォルト値）
    pub(super) timeout_secs: Option<u64>,
}

/// ルーティング規則 DTO
#[derive(Debug, Serialize, Deserialize)]
pub(super) struct RouteRuleDto {
    /// 直前に完了したステップ名
    pub(super) after: String,

    /// 次に実行するステップ名
    pub(super) to: String,
}
