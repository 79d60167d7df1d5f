//! 仮説生成ステップ
//!
//! # 責務
//!
//! - 抽出済みの概念・主張から構造化プロンプトを組み立てる
//! - `generate` ツール（LLM CLI）を呼び出す
//! - 応答テキストを `HYPOTHESIS n:` 形式でパースして成果物にする
//!
//! # パース形式
//!
//! ```text
//! HYPOTHESIS 1: <仮説ステートメント>
//! RATIONALE: <根拠>
//! EXPECTED OUTCOME: <予想される結果>
//! ```
//!
//! 上記のセクションが1つも見つからない場合、十分な長さの行を
//! そのまま仮説ステートメントとして扱うフォールバックに切り替えます。
//!
//! # 失敗時
//!
//! 仮説はこのパイプラインの最終成果物であり、生成の失敗は後続で
//! 補えません。生成ツールの失敗は回復不能エラーとして報告します。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::StepRole;
use crate::state::{Hypothesis, HypothesisStatus, StateDelta, StepResult, WorkflowState};
use crate::tool::{GENERATE_TOOL, StepTools};
use super::StepUnit;

/// 1回の生成で要求する仮説数
const REQUESTED_HYPOTHESES: usize = 3;

/// フォールバックパースで仮説として扱う行の最小長
const FALLBACK_MIN_LINE_LEN: usize = 20;

/// フォールバックパースで採用する最大行数
const FALLBACK_MAX_LINES: usize = 5;

/// 生成ツールへのシステムプロンプト
const SYSTEM_PROMPT: &str = "あなたは研究仮説の生成を支援するアシスタントです。\
与えられた概念と主張に基づき、検証可能で具体的な研究仮説を提案してください。\
各仮説は必ず次の形式で出力してください:\n\
HYPOTHESIS n: <仮説>\nRATIONALE: <根拠>\nEXPECTED OUTCOME: <予想される結果>";

/// 仮説生成ステップ
pub struct GenerateStep;

impl GenerateStep {
    /// 状態からユーザープロンプトを組み立てる
    fn build_prompt(state: &WorkflowState) -> String {
        let mut prompt = String::new();

        if let Some(focus) = &state.input.focus {
            prompt.push_str(&format!("研究フォーカス: {}\n\n", focus));
        }

        if !state.concepts.is_empty() {
            prompt.push_str("主要概念:\n");
            for concept in &state.concepts {
                prompt.push_str(&format!("- {}\n", concept.name));
            }
            prompt.push('\n');
        }

        if !state.claims.is_empty() {
            prompt.push_str("抽出された主張:\n");
            for claim in &state.claims {
                prompt.push_str(&format!(
                    "- [{} / 信頼度{:.1}] {}\n",
                    claim.claim_type, claim.confidence, claim.text
                ));
            }
            prompt.push('\n');
        }

        prompt.push_str(&format!(
            "上記に基づいて研究仮説を{}件提案してください。",
            REQUESTED_HYPOTHESES
        ));
        prompt
    }

    /// 生成テキストを仮説の配列にパースする
    ///
    /// `HYPOTHESIS n:` のセクション形式を優先し、1件も取れなかった
    /// 場合は行ベースのフォールバックに切り替えます。
    fn parse_hypotheses(text: &str, source_concepts: &[String]) -> Vec<Hypothesis> {
        let mut hypotheses: Vec<Hypothesis> = Vec::new();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let upper = line.to_uppercase();
            if upper.starts_with("HYPOTHESIS") {
                let statement = line
                    .split_once(':')
                    .map(|(_, rest)| rest.trim())
                    .unwrap_or("")
                    .to_string();
                hypotheses.push(Self::blank_hypothesis(statement, source_concepts));
            } else if let Some(rest) = strip_section(line, "RATIONALE:") {
                if let Some(last) = hypotheses.last_mut() {
                    last.rationale = rest.to_string();
                }
            } else if let Some(rest) = strip_section(line, "EXPECTED OUTCOME:") {
                if let Some(last) = hypotheses.last_mut() {
                    last.expected_outcome = rest.to_string();
                }
            }
        }

        hypotheses.retain(|h| !h.statement.is_empty());

        if !hypotheses.is_empty() {
            return hypotheses;
        }

        // セクション形式で取れなかった場合の行ベースフォールバック
        text.lines()
            .map(str::trim)
            .filter(|line| line.len() >= FALLBACK_MIN_LINE_LEN)
            .take(FALLBACK_MAX_LINES)
            .map(|line| Self::blank_hypothesis(line.to_string(), source_concepts))
            .collect()
    }

    fn blank_hypothesis(statement: String, source_concepts: &[String]) -> Hypothesis {
        Hypothesis {
            id: Uuid::new_v4().to_string(),
            statement,
            rationale: String::new(),
            expected_outcome: String::new(),
            source_concepts: source_concepts.to_vec(),
            testability_score: 0.0,
            novelty_score: 0.0,
            status: HypothesisStatus::Generated,
            feedback: None,
        }
    }
}

/// 行が大文字セクション見出しで始まる場合、見出しを除いた残りを返す
fn strip_section<'a>(line: &'a str, header: &str) -> Option<&'a str> {
    if line.to_uppercase().starts_with(header) {
        Some(line[header.len()..].trim())
    } else {
        None
    }
}

#[async_trait]
impl StepUnit for GenerateStep {
    fn role(&self) -> StepRole {
        StepRole::Generate
    }

    async fn run(&self, state: WorkflowState, tools: Arc<StepTools>) -> StepResult {
        let prompt = Self::build_prompt(&state);
        let arguments = json!({
            "system_prompt": SYSTEM_PROMPT,
            "prompt": prompt,
        });

        let unrecoverable = |reason: String, tools: &StepTools| StepResult {
            delta: StateDelta {
                unrecoverable_error: Some(reason.clone()),
                ..StateDelta::default()
            },
            tool_calls: tools.take_records(),
            rationale: reason,
        };

        let result = match tools.call(GENERATE_TOOL, arguments).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "生成ツールを呼び出せませんでした");
                return unrecoverable(format!("仮説生成の呼び出しに失敗: {}", e), &tools);
            }
        };

        if !result.success {
            let detail = result
                .failure
                .map(|f| format!("{}: {}", f.code.as_str(), f.detail))
                .unwrap_or_else(|| "不明な失敗".to_string());
            warn!(detail = %detail, "生成ツールが失敗");
            return unrecoverable(format!("仮説生成に失敗: {}", detail), &tools);
        }

        let content = result.payload["content"].as_str().unwrap_or_default();
        let concept_names: Vec<String> =
            state.concepts.iter().map(|c| c.name.clone()).collect();
        let artifacts = Self::parse_hypotheses(content, &concept_names);

        if artifacts.is_empty() {
            return unrecoverable(
                "生成テキストから仮説を1件も抽出できませんでした".to_string(),
                &tools,
            );
        }

        debug!(count = artifacts.len(), "仮説を生成");

        let rationale = format!("仮説生成完了: {}件の仮説を抽出", artifacts.len());
        StepResult {
            delta: StateDelta {
                artifacts,
                ..StateDelta::default()
            },
            tool_calls: tools.take_records(),
            rationale,
        }
    }
}
