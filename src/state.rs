//! ワークフロー状態の型定義
//!
//! # 責務
//!
//! - パイプライン全体を流れる共有状態 [`WorkflowState`] の定義
//! - ステップが返す差分 [`StateDelta`] と実行結果 [`StepResult`] の定義
//! - ツール呼び出し記録 [`ToolCallRecord`] / [`ToolResult`] の定義
//! - 成果物（仮説 [`Hypothesis`]、概念 [`Concept`]、主張 [`Claim`]）の定義
//!
//! # 設計方針
//!
//! 正本の状態を変更できるのはエンジンだけです。ステップは状態のスナップショットを
//! 読み取り、差分（[`StateDelta`]）を返します。エンジンが [`WorkflowState::apply`] で
//! 差分をマージするため、差分に含まれないフィールドは一切変更されません。
//! ツール呼び出し記録は追記専用で、作成後に書き換えられることはありません。
//!
//! # 不変条件
//!
//! - `iterations` はルーター判定ごとに単調増加し、エンジンが上限を超えた時点で
//!   fail-closed します
//! - `status` が終端（`Completed` / `Failed`）になった後の遷移はありません

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, SystemTime};
use uuid::Uuid;

/// ワークフローの入力パラメータ
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInput {
    /// 研究フォーカス（例: "attention mechanisms in low-resource settings"）
    pub focus: Option<String>,

    /// 分析対象のソース文書
    pub sources: Vec<SourceDocument>,
}

/// ソース文書（論文等の本文テキスト）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    /// 文書識別子
    pub id: String,

    /// タイトル
    pub title: String,

    /// 本文テキスト
    pub content: String,
}

/// ワークフロー実行ステータス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    /// 実行中
    Running,

    /// 全ステップが正常完了
    Completed,

    /// 失敗（ステップ欠陥・反復上限・キャンセルを含む）
    Failed,
}

/// 実行ログの1エントリ
///
/// 各ステップの完了時にエンジンが追記します。ステップ順に並びます。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// ステップ名
    pub step: String,

    /// ステップが報告したメッセージ（処理根拠の要約）
    pub message: String,

    /// 記録時刻
    pub recorded_at: SystemTime,
}

/// ツール失敗の構造化コード
///
/// ディスパッチ後の失敗は例外ではなくこのコード付きの [`ToolResult`] として
/// 返されます。HTTP 429 相当は [`FailureCode::RateLimited`] として区別され、
/// ステップ側でバックオフや非必須チェックのスキップを選択できます。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCode {
    /// 制限時間内に応答がなかった
    Timeout,

    /// 接続不能（DNS・接続拒否・トランスポート層の失敗）
    Unreachable,

    /// レート制限超過（HTTP 429 相当）
    RateLimited,

    /// 応答は得られたがパースできなかった
    InvalidResponse,
}

impl FailureCode {
    /// ログ出力用の固定文字列
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCode::Timeout => "timeout",
            FailureCode::Unreachable => "unreachable",
            FailureCode::RateLimited => "rate_limited",
            FailureCode::InvalidResponse => "invalid_response",
        }
    }
}

/// ツール失敗の詳細
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolFailure {
    /// 構造化コード
    pub code: FailureCode,

    /// 詳細メッセージ
    pub detail: String,
}

/// ツール呼び出しの結果
///
/// 成功・失敗いずれの場合も返されます（ディスパッチ前の検証失敗のみ
/// [`ToolError`](crate::error::ToolError) として別扱い）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// 成功フラグ
    pub success: bool,

    /// 結果ペイロード（失敗時は `null`）
    pub payload: serde_json::Value,

    /// 失敗詳細（成功時は `None`）
    pub failure: Option<ToolFailure>,

    /// 呼び出しに要した時間
    pub latency: Duration,
}

impl ToolResult {
    /// 成功結果を生成
    pub fn ok(payload: serde_json::Value, latency: Duration) -> Self {
        Self {
            success: true,
            payload,
            failure: None,
            latency,
        }
    }

    /// 失敗結果を生成
    pub fn failed(code: FailureCode, detail: impl Into<String>, latency: Duration) -> Self {
        Self {
            success: false,
            payload: serde_json::Value::Null,
            failure: Some(ToolFailure {
                code,
                detail: detail.into(),
            }),
            latency,
        }
    }
}

/// ツール呼び出しの記録（リクエスト + 結果）
///
/// ステップの記録内では追記専用です。作成後に変更されることはありません。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    /// ツール名
    pub tool: String,

    /// 呼び出し引数
    pub arguments: serde_json::Value,

    /// 呼び出し結果
    pub result: ToolResult,
}

/// ソース文書から抽出された概念
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    /// 概念識別子
    pub id: String,

    /// 概念名
    pub name: String,

    /// 出典となった文書の識別子
    pub source_ids: Vec<String>,
}

/// ソース文書から抽出された主張
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    /// 主張識別子
    pub id: String,

    /// 主張テキスト
    pub text: String,

    /// 主張の種別（例: "finding"）
    pub claim_type: String,

    /// 確信度（0.0〜1.0）
    pub confidence: f64,

    /// 出典文書の識別子
    pub source_id: String,
}

/// 仮説ステータス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HypothesisStatus {
    /// 生成済み（未検証）
    Generated,

    /// 批評ステップによる検証済み
    Validated,
}

/// 生成された研究仮説（ワークフローの成果物）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    /// 仮説識別子（例: "hyp_1"）
    pub id: String,

    /// 仮説ステートメント
    pub statement: String,

    /// 根拠（なぜ新規で興味深いか）
    pub rationale: String,

    /// 期待される結果（何が検証/反証になるか）
    pub expected_outcome: String,

    /// 元になった概念の識別子
    pub source_concepts: Vec<String>,

    /// 検証可能性スコア（0.0〜1.0）
    pub testability_score: f64,

    /// 新規性スコア（0.0〜1.0）
    pub novelty_score: f64,

    /// ステータス
    pub status: HypothesisStatus,

    /// 批評ステップからのフィードバック
    pub feedback: Option<String>,
}

/// ステップが返す状態差分
///
/// 追記とマージのみで表現され、全体上書きはできません。
/// 差分に含まれないフィールドは [`WorkflowState::apply`] で一切変更されません。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDelta {
    /// 追記する概念
    pub concepts: Vec<Concept>,

    /// 追記する主張
    pub claims: Vec<Claim>,

    /// 追記する成果物
    pub artifacts: Vec<Hypothesis>,

    /// 識別子一致で置き換える成果物（批評ステップのスコア更新用）
    pub artifact_updates: Vec<Hypothesis>,

    /// 回復不能な失敗の報告（設定されるとルーターが強制終了します）
    pub unrecoverable_error: Option<String>,
}

impl StateDelta {
    /// 変更を一切含まない差分かどうか
    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
            && self.claims.is_empty()
            && self.artifacts.is_empty()
            && self.artifact_updates.is_empty()
            && self.unrecoverable_error.is_none()
    }
}

/// 1ステップの実行結果
///
/// ステップが生成し、エンジンが消費・マージします。
/// ステップが正本の [`WorkflowState`] を直接変更することはありません。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// 状態差分
    pub delta: StateDelta,

    /// このステップ内で行われたツール呼び出しの記録
    pub tool_calls: Vec<ToolCallRecord>,

    /// 処理根拠の要約（ログメッセージになります）
    pub rationale: String,
}

impl StepResult {
    /// 差分なし・根拠のみの結果を生成
    pub fn message(rationale: impl Into<String>) -> Self {
        Self {
            delta: StateDelta::default(),
            tool_calls: Vec::new(),
            rationale: rationale.into(),
        }
    }
}

/// パイプライン全体を流れる共有状態
///
/// ワークフロー開始時に生成され、エンジンが適用する [`StepResult`] の差分
/// のみで変化し、ステータスが終端になった時点で確定します。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    /// セッション識別子（チェックポイントのキーにもなります）
    pub session_id: Uuid,

    /// 元の入力パラメータ
    pub input: WorkflowInput,

    /// ステップメッセージの順序付きログ
    pub log: Vec<LogEntry>,

    /// ステップ名 → そのステップのツール呼び出し記録
    pub tool_results: HashMap<String, Vec<ToolCallRecord>>,

    /// 抽出された概念
    pub concepts: Vec<Concept>,

    /// 抽出された主張
    pub claims: Vec<Claim>,

    /// 生成された成果物（仮説）
    pub artifacts: Vec<Hypothesis>,

    /// 反復カウンタ（ルーター判定ごとに単調増加）
    pub iterations: u32,

    /// 終端ステータス
    pub status: WorkflowStatus,

    /// エラーメッセージ（失敗時のみ）
    pub error: Option<String>,

    /// 直近に完了したステップ名（ルーターの判定材料）
    pub last_completed: Option<String>,

    /// 回復不能な失敗が報告されたか
    pub unrecoverable: bool,
}

impl WorkflowState {
    /// 新しいワークフロー状態を生成
    ///
    /// ステータスは `Running`、反復カウンタは 0 で初期化されます。
    pub fn new(input: WorkflowInput) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            input,
            log: Vec::new(),
            tool_results: HashMap::new(),
            concepts: Vec::new(),
            claims: Vec::new(),
            artifacts: Vec::new(),
            iterations: 0,
            status: WorkflowStatus::Running,
            error: None,
            last_completed: None,
            unrecoverable: false,
        }
    }

    /// ステップ結果を差分マージで適用
    ///
    /// 差分に含まれるフィールドのみが変化します。成果物の更新は識別子一致で
    /// 置き換え、一致しない更新は黙って無視します（存在しない成果物への
    /// 更新はステップ側のバグであり、全体を壊す理由にはならないため）。
    ///
    /// # 引数
    ///
    /// - `step_name`: 結果を返したステップの名前
    /// - `result`: ステップの実行結果
    pub fn apply(&mut self, step_name: &str, result: StepResult) {
        let StepResult {
            delta,
            tool_calls,
            rationale,
        } = result;

        self.concepts.extend(delta.concepts);
        self.claims.extend(delta.claims);
        self.artifacts.extend(delta.artifacts);

        for updated in delta.artifact_updates {
            if let Some(existing) = self.artifacts.iter_mut().find(|a| a.id == updated.id) {
                *existing = updated;
            }
        }

        if let Some(message) = delta.unrecoverable_error {
            self.unrecoverable = true;
            self.error = Some(message);
        }

        if !tool_calls.is_empty() {
            self.tool_results
                .entry(step_name.to_string())
                .or_default()
                .extend(tool_calls);
        }

        self.log.push(LogEntry {
            step: step_name.to_string(),
            message: rationale,
            recorded_at: SystemTime::now(),
        });

        self.last_completed = Some(step_name.to_string());
    }

    /// 反復カウンタを進める（ルーター判定ごとにエンジンが呼びます）
    pub fn advance_iteration(&mut self) {
        self.iterations += 1;
    }

    /// 成功終端に遷移
    pub fn complete(&mut self) {
        self.status = WorkflowStatus::Completed;
    }

    /// 失敗終端に遷移し、エラーを記録
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.status = WorkflowStatus::Failed;
        self.error = Some(reason.into());
    }

    /// 終端状態かどうか
    pub fn is_terminal(&self) -> bool {
        !matches!(self.status, WorkflowStatus::Running)
    }

    /// 状態を JSON 形式でシリアライズ
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
