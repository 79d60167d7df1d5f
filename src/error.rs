//! エラー型の定義
//!
//! # 責務
//!
//! このモジュールは、kasetsu-flow 全体で使用されるエラー型を定義します。
//!
//! # エラー分類
//!
//! - [`ConfigError`]: パイプライン定義の読み込み・バリデーション失敗（起動時に検出）
//! - [`ToolError`]: ツール呼び出しがディスパッチ前に拒否された場合のエラー
//!   （引数不正・未宣言ツール・予算超過）。通信系の失敗はエラーではなく
//!   [`ToolResult`](crate::state::ToolResult) の `success=false` として返されます。
//! - [`EngineError`]: ワークフローエンジンが続行不能になった場合のエラー

use thiserror::Error;

/// 設定関連のエラー
///
/// パイプライン定義（TOML）の読み込みとバリデーションで発生します。
/// ルーターのデッドロック（出口のないステップ）もここで検出し、
/// 実行時ではなく読み込み時に失敗させます。
#[derive(Debug, Error)]
pub enum ConfigError {
    /// ファイルの読み込みに失敗
    #[error("設定ファイルの読み込みに失敗しました: {0}")]
    FileRead(#[from] std::io::Error),

    /// TOML のデシリアライズに失敗
    #[error("TOML のデシリアライズに失敗しました: {0}")]
    TomlDeserialize(#[from] toml::de::Error),

    /// TOML のシリアライズに失敗
    #[error("TOML のシリアライズに失敗しました: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// バリデーションエラー
    #[error("設定のバリデーションに失敗しました: {0}")]
    Validation(String),

    /// ルーターデッドロック（遷移先のないステップ）
    #[error("ルーターデッドロック: ステップ '{step}' に遷移ルールもフォールバックもありません")]
    RouterDeadlock {
        /// 出口のないステップ名
        step: String,
    },
}

/// ツール呼び出しの拒否エラー
///
/// ディスパッチ前の検証で失敗した場合にのみ返されます。
/// ディスパッチ後の失敗（タイムアウト・通信不能・レート制限・不正応答）は
/// [`FailureCode`](crate::state::FailureCode) 付きの `ToolResult` として
/// 呼び出し元のステップに返され、リトライ・縮退・中断の判断はステップに委ねられます。
#[derive(Debug, Error)]
pub enum ToolError {
    /// 引数のスキーマ検証に失敗
    #[error("ツール '{tool}' の引数検証に失敗しました: {reason}")]
    Validation {
        /// 対象ツール名
        tool: String,
        /// 拒否理由
        reason: String,
    },

    /// 未登録または未宣言のツール
    #[error("ツール '{0}' は登録されていないか、このステップでは宣言されていません")]
    UnknownTool(String),

    /// ステップごとのツール呼び出し予算を超過
    #[error("ツール呼び出し予算を超過しました: {used}/{budget} 回")]
    BudgetExhausted {
        /// 使用済み回数
        used: u32,
        /// 予算上限
        budget: u32,
    },
}

/// ワークフローエンジンのエラー
///
/// エンジンが続行不能になった場合のエラーです。
/// ステップ内部の欠陥（パニック）はエンジンが捕捉して
/// 終端の `Failed` 状態として記録するため、呼び出し元には伝播しません。
#[derive(Debug, Error)]
pub enum EngineError {
    /// 設定エラー
    #[error("設定エラー: {0}")]
    Config(#[from] ConfigError),

    /// パイプラインが参照するステップの実装が見つからない
    #[error("ステップ '{0}' の実装が登録されていません")]
    UnknownStep(String),

    /// チェックポイント保存に失敗
    #[error("チェックポイントの保存に失敗しました: {0}")]
    Checkpoint(String),

    /// バックグラウンド実行タスクの合流に失敗
    #[error("ワークフロータスクの合流に失敗しました: {0}")]
    TaskJoin(String),
}
