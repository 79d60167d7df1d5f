//! 概念・主張抽出ステップ
//!
//! # 責務
//!
//! - ソース文書から主要概念（固有名詞句）を頻度ベースで抽出する
//! - 主張らしき文を指標語で拾い、信頼度付きの [`Claim`] として記録する
//!
//! このステップはツールを使わない純粋な処理です。同じ入力からは常に
//! 同じ差分が得られます。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use crate::config::StepRole;
use crate::state::{Claim, Concept, StateDelta, StepResult, WorkflowState};
use crate::tool::StepTools;
use super::StepUnit;

/// 抽出する概念の上限
const MAX_CONCEPTS: usize = 10;

/// 概念として残す句の最小出現回数
const MIN_PHRASE_FREQUENCY: usize = 2;

/// 主張を示す指標語
const CLAIM_INDICATORS: &[&str] = &[
    "show",
    "suggest",
    "demonstrate",
    "indicate",
    "found",
    "increase",
    "decrease",
    "correlat",
];

/// 冠詞等、単独では概念にならない語
const STOPWORDS: &[&str] = &["The", "A", "An", "This", "These", "In", "We", "It"];

/// 概念・主張抽出ステップ
pub struct AnalyzeStep;

impl AnalyzeStep {
    /// 大文字始まりの連続語を句として取り出す
    ///
    /// 戻り値は句 → 出現回数のマップです。1語の句はストップワードを除外します。
    fn capitalized_phrases(text: &str) -> BTreeMap<String, usize> {
        let mut phrases = BTreeMap::new();
        let mut current: Vec<&str> = Vec::new();

        let mut flush = |current: &mut Vec<&str>| {
            if current.is_empty() {
                return;
            }
            if current.len() == 1 && STOPWORDS.contains(&current[0]) {
                current.clear();
                return;
            }
            let phrase = current.join(" ");
            *phrases.entry(phrase).or_insert(0) += 1;
            current.clear();
        };

        for word in text.split_whitespace() {
            let cleaned: &str = word.trim_matches(|c: char| !c.is_alphanumeric());
            let is_capitalized = cleaned
                .chars()
                .next()
                .map(|c| c.is_uppercase())
                .unwrap_or(false);

            if is_capitalized && cleaned.len() > 1 {
                current.push(cleaned);
            } else {
                flush(&mut current);
            }
        }
        flush(&mut current);

        phrases
    }

    /// 全ソースから概念を抽出
    ///
    /// 出現頻度の降順、同率なら辞書順で上位を返します。
    fn extract_concepts(state: &WorkflowState) -> Vec<Concept> {
        let mut merged: BTreeMap<String, (usize, Vec<String>)> = BTreeMap::new();

        for source in &state.input.sources {
            let text = format!("{} {}", source.title, source.content);
            for (phrase, count) in Self::capitalized_phrases(&text) {
                let entry = merged.entry(phrase).or_insert((0, Vec::new()));
                entry.0 += count;
                if !entry.1.contains(&source.id) {
                    entry.1.push(source.id.clone());
                }
            }
        }

        let mut ranked: Vec<(String, usize, Vec<String>)> = merged
            .into_iter()
            .filter(|(_, (count, _))| *count >= MIN_PHRASE_FREQUENCY)
            .map(|(phrase, (count, ids))| (phrase, count, ids))
            .collect();

        // BTreeMap 由来で辞書順に並んでいるため、頻度ソートは安定で決定的
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked.truncate(MAX_CONCEPTS);

        ranked
            .into_iter()
            .map(|(name, _, source_ids)| Concept {
                id: format!("concept-{}", name.to_lowercase().replace(' ', "-")),
                name,
                source_ids,
            })
            .collect()
    }

    /// 主張らしき文を拾い上げる
    fn extract_claims(state: &WorkflowState) -> Vec<Claim> {
        let mut claims = Vec::new();

        for source in &state.input.sources {
            for sentence in source.content.split('.') {
                let sentence = sentence.trim();
                if sentence.len() < 20 {
                    continue;
                }

                let lower = sentence.to_lowercase();
                if !CLAIM_INDICATORS.iter().any(|ind| lower.contains(ind)) {
                    continue;
                }

                // 数値を含む文は実証的、含まない文は理論的な主張とみなす
                let empirical = sentence.chars().any(|c| c.is_ascii_digit());
                claims.push(Claim {
                    id: Uuid::new_v4().to_string(),
                    text: sentence.to_string(),
                    claim_type: if empirical { "empirical" } else { "theoretical" }
                        .to_string(),
                    confidence: if empirical { 0.6 } else { 0.4 },
                    source_id: source.id.clone(),
                });
            }
        }

        claims
    }
}

#[async_trait]
impl StepUnit for AnalyzeStep {
    fn role(&self) -> StepRole {
        StepRole::Analyze
    }

    async fn run(&self, state: WorkflowState, _tools: Arc<StepTools>) -> StepResult {
        if state.input.sources.is_empty() {
            return StepResult {
                delta: StateDelta {
                    unrecoverable_error: Some(
                        "解析対象のソース文書がありません".to_string(),
                    ),
                    ..StateDelta::default()
                },
                tool_calls: Vec::new(),
                rationale: "ソースが空のため解析できません".to_string(),
            };
        }

        let concepts = Self::extract_concepts(&state);
        let claims = Self::extract_claims(&state);

        debug!(
            concepts = concepts.len(),
            claims = claims.len(),
            "ソース解析が完了"
        );

        let rationale = format!(
            "解析完了: {}件のソースから概念{}件・主張{}件を抽出",
            state.input.sources.len(),
            concepts.len(),
            claims.len()
        );

        StepResult {
            delta: StateDelta {
                concepts,
                claims,
                ..StateDelta::default()
            },
            tool_calls: Vec::new(),
            rationale,
        }
    }
}
