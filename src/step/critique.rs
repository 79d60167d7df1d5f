//! 仮説批評ステップ
//!
//! # 責務
//!
//! - 生成済みの各仮説を検証可能性・新規性の2軸で採点する
//! - 採点結果とフィードバックを付与し、ステータスを検証済みに更新する
//!
//! # 予算との関係
//!
//! 仮説1件につき最大3回のツール呼び出し（類似研究検索、新規性、
//! 検証可能性）を行います。予算が尽きたら残りの仮説は未検証のまま
//! 残し、処理済み分だけを更新します。
//!
//! # 劣化動作
//!
//! 個々のツール失敗は該当軸のスコアを既定値のままにして続行します。
//! 批評は品質向上のための工程であり、失敗してもパイプラインは
//! 中断しません。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::StepRole;
use crate::error::ToolError;
use crate::state::{Hypothesis, HypothesisStatus, StateDelta, StepResult, WorkflowState};
use crate::tool::{NOVELTY_TOOL, SEMANTIC_SCHOLAR_TOOL, TESTABILITY_TOOL, StepTools};
use super::StepUnit;

/// 類似研究検索の取得件数
const SIMILAR_PAPERS_LIMIT: u64 = 3;

/// ツール失敗時に使うスコアの既定値
const DEFAULT_SCORE: f64 = 0.5;

/// 仮説批評ステップ
pub struct CritiqueStep;

impl CritiqueStep {
    /// 1件の仮説を採点し、更新後の仮説を返す
    ///
    /// 予算超過を検出した場合は `Err` を返し、呼び出し側がループを
    /// 打ち切ります。
    async fn score_one(
        hypothesis: &Hypothesis,
        tools: &StepTools,
    ) -> Result<Hypothesis, ToolError> {
        let statement = hypothesis.statement.as_str();

        // 類似研究の検索は任意。失敗・未許可なら空の結果で続行する
        let papers = match tools
            .call(
                SEMANTIC_SCHOLAR_TOOL,
                json!({"query": statement, "limit": SIMILAR_PAPERS_LIMIT}),
            )
            .await
        {
            Ok(result) if result.success => {
                result.payload.as_array().cloned().unwrap_or_default()
            }
            Ok(_) => Vec::new(),
            Err(e @ ToolError::BudgetExhausted { .. }) => return Err(e),
            Err(_) => Vec::new(),
        };

        let novelty = tools
            .call(
                NOVELTY_TOOL,
                json!({"hypothesis": statement, "papers": papers}),
            )
            .await;
        let testability = tools
            .call(TESTABILITY_TOOL, json!({"hypothesis": statement}))
            .await;

        let mut updated = hypothesis.clone();
        let mut feedback = Vec::new();

        match novelty {
            Ok(result) if result.success => {
                updated.novelty_score =
                    result.payload["novelty_score"].as_f64().unwrap_or(DEFAULT_SCORE);
                if let Some(assessment) = result.payload["assessment"].as_str() {
                    feedback.push(assessment.to_string());
                }
            }
            Err(e @ ToolError::BudgetExhausted { .. }) => return Err(e),
            _ => {
                warn!(hypothesis = %updated.id, "新規性チェックに失敗、既定値を使用");
                updated.novelty_score = DEFAULT_SCORE;
                feedback.push("新規性を評価できませんでした".to_string());
            }
        }

        match testability {
            Ok(result) if result.success => {
                updated.testability_score = result.payload["testability_score"]
                    .as_f64()
                    .unwrap_or(DEFAULT_SCORE);
                if let Some(assessment) = result.payload["assessment"].as_str() {
                    feedback.push(assessment.to_string());
                }
            }
            Err(e @ ToolError::BudgetExhausted { .. }) => return Err(e),
            _ => {
                warn!(hypothesis = %updated.id, "検証可能性採点に失敗、既定値を使用");
                updated.testability_score = DEFAULT_SCORE;
                feedback.push("検証可能性を評価できませんでした".to_string());
            }
        }

        updated.status = HypothesisStatus::Validated;
        updated.feedback = Some(feedback.join(" / "));
        Ok(updated)
    }
}

#[async_trait]
impl StepUnit for CritiqueStep {
    fn role(&self) -> StepRole {
        StepRole::Critique
    }

    async fn run(&self, state: WorkflowState, tools: Arc<StepTools>) -> StepResult {
        let pending: Vec<&Hypothesis> = state
            .artifacts
            .iter()
            .filter(|h| h.status == HypothesisStatus::Generated)
            .collect();

        if pending.is_empty() {
            return StepResult {
                delta: StateDelta::default(),
                tool_calls: tools.take_records(),
                rationale: "批評対象の仮説がありません".to_string(),
            };
        }

        let total = pending.len();
        let mut updates = Vec::new();
        let mut budget_hit = false;

        for hypothesis in pending {
            match Self::score_one(hypothesis, &tools).await {
                Ok(updated) => updates.push(updated),
                Err(ToolError::BudgetExhausted { used, budget }) => {
                    warn!(used, budget, "ツール予算が尽きたため批評を打ち切り");
                    budget_hit = true;
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "仮説の採点に失敗、スキップ");
                }
            }
        }

        debug!(scored = updates.len(), total, "仮説批評が完了");

        let rationale = if budget_hit {
            format!(
                "批評完了（予算打ち切り）: {}/{}件の仮説を検証",
                updates.len(),
                total
            )
        } else {
            format!("批評完了: {}/{}件の仮説を検証", updates.len(), total)
        };

        StepResult {
            delta: StateDelta {
                artifact_updates: updates,
                ..StateDelta::default()
            },
            tool_calls: tools.take_records(),
            rationale,
        }
    }
}
