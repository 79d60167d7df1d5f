//! 検証系ツール（ヒューリスティック）
//!
//! # 責務
//!
//! - 仮説の検証可能性を採点する [`TestabilityScoreTool`]
//! - 検索結果の引用数から新規性を採点する [`NoveltyCheckTool`]
//! - 統計的主張の妥当性をチェックする [`StatisticalClaimTool`]
//!
//! いずれもネットワークに依存しない純粋なヒューリスティックです。
//! 新規性チェックは検索ペイロードを引数で受け取る設計のため、
//! ステップ側で `semantic_scholar_search` → `novelty_check` と連鎖させます。
//! これによりツール単体でのモックとステップの予算計上が素直になります。

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::state::ToolFailure;
use crate::tool::traits::{ArgKind, ArgSchema, ArgSpec, Tool};

/// 検証可能性採点ツールの名前
pub const TESTABILITY_TOOL: &str = "testability_score";

/// 新規性チェックツールの名前
pub const NOVELTY_TOOL: &str = "novelty_check";

/// 統計的主張チェックツールの名前
pub const STATISTICAL_CLAIM_TOOL: &str = "statistical_claim_check";

/// 測定可能性を示す語
const MEASURABLE_TERMS: &[&str] = &[
    "measure",
    "quantify",
    "count",
    "rate",
    "level",
    "amount",
    "frequency",
    "correlation",
];

/// 具体的な予測を示す語
const PREDICTION_TERMS: &[&str] = &[
    "increase",
    "decrease",
    "higher",
    "lower",
    "more",
    "less",
    "affect",
    "influence",
];

/// 反証不能になりがちな絶対表現
const ABSOLUTE_TERMS: &[&str] = &["always", "never", "all", "none", "every"];

/// 過度に強い断定表現
const OVERCLAIM_TERMS: &[&str] = &["proves", "confirms", "definitely"];

fn contains_any(text: &str, terms: &[&str]) -> bool {
    let lower = text.to_lowercase();
    terms.iter().any(|term| lower.contains(term))
}

/// 仮説の検証可能性（反証可能性）を採点するツール
///
/// # 引数スキーマ
///
/// - `hypothesis` (string, 必須): 仮説ステートメント
///
/// # ペイロード
///
/// `{testability_score, is_testable, feedback, assessment}`
pub struct TestabilityScoreTool;

#[async_trait]
impl Tool for TestabilityScoreTool {
    fn name(&self) -> &'static str {
        TESTABILITY_TOOL
    }

    fn schema(&self) -> ArgSchema {
        ArgSchema::new(vec![ArgSpec::required("hypothesis", ArgKind::String)])
    }

    async fn invoke(&self, arguments: &Value) -> Result<Value, ToolFailure> {
        let hypothesis = arguments["hypothesis"].as_str().unwrap_or_default();

        let mut score: f64 = 0.5;
        let mut feedback = Vec::new();

        if contains_any(hypothesis, MEASURABLE_TERMS) {
            score += 0.2;
            feedback.push("測定可能な変数を含む");
        } else {
            feedback.push("明確に測定可能な変数がない");
        }

        if contains_any(hypothesis, PREDICTION_TERMS) {
            score += 0.15;
            feedback.push("具体的な予測を含む");
        } else {
            feedback.push("予測が曖昧");
        }

        if contains_any(hypothesis, ABSOLUTE_TERMS) {
            score -= 0.1;
            feedback.push("絶対表現が強く、反証可能でない恐れ");
        } else {
            score += 0.1;
            feedback.push("反証の余地がある");
        }

        let score = score.clamp(0.0, 1.0);
        let assessment = if score > 0.75 {
            "検証可能性が高い仮説"
        } else if score > 0.5 {
            "ある程度検証可能"
        } else {
            "検証が困難、要リファイン"
        };

        Ok(json!({
            "testability_score": score,
            "is_testable": score > 0.6,
            "feedback": feedback,
            "assessment": assessment,
        }))
    }
}

/// 新規性チェックツール
///
/// 類似研究の検索結果（引用数付き）を受け取り、
/// 総引用数のヒューリスティックで新規性を採点します。
/// 引用が多いほど既によく研究された領域とみなします。
///
/// # 引数スキーマ
///
/// - `hypothesis` (string, 必須): 対象の仮説
/// - `papers` (array, 任意): `semantic_scholar_search` のペイロード
///
/// # ペイロード
///
/// `{novelty_score, similar_papers_count, assessment}`
pub struct NoveltyCheckTool;

#[async_trait]
impl Tool for NoveltyCheckTool {
    fn name(&self) -> &'static str {
        NOVELTY_TOOL
    }

    fn schema(&self) -> ArgSchema {
        ArgSchema::new(vec![
            ArgSpec::required("hypothesis", ArgKind::String),
            ArgSpec::optional("papers", ArgKind::Array),
        ])
    }

    async fn invoke(&self, arguments: &Value) -> Result<Value, ToolFailure> {
        let papers = arguments["papers"].as_array().cloned().unwrap_or_default();

        if papers.is_empty() {
            return Ok(json!({
                "novelty_score": 0.8,
                "similar_papers_count": 0,
                "assessment": "類似研究が見つからない（高い新規性の可能性）",
            }));
        }

        let total_citations: u64 = papers
            .iter()
            .map(|paper| paper["citations"].as_u64().unwrap_or(0))
            .sum();

        let novelty_score = if total_citations > 100 {
            0.3 // 既によく研究されている
        } else if total_citations > 20 {
            0.6 // ある程度の先行研究がある
        } else {
            0.9 // 比較的新規
        };

        let assessment = if novelty_score > 0.7 {
            "新規性が高い（先行研究が少ない）"
        } else if novelty_score > 0.4 {
            "中程度の新規性（関連研究あり）"
        } else {
            "新規性が低い（よく研究された領域）"
        };

        Ok(json!({
            "novelty_score": novelty_score,
            "similar_papers_count": papers.len(),
            "assessment": assessment,
        }))
    }
}

/// 統計的主張チェックツール
///
/// # 引数スキーマ
///
/// - `claim` (string, 必須): 検証対象の主張
/// - `data_description` (string, 任意): データや手法の説明
///
/// # ペイロード
///
/// `{valid, confidence, warnings, assessment}`
pub struct StatisticalClaimTool;

#[async_trait]
impl Tool for StatisticalClaimTool {
    fn name(&self) -> &'static str {
        STATISTICAL_CLAIM_TOOL
    }

    fn schema(&self) -> ArgSchema {
        ArgSchema::new(vec![
            ArgSpec::required("claim", ArgKind::String),
            ArgSpec::optional("data_description", ArgKind::String),
        ])
    }

    async fn invoke(&self, arguments: &Value) -> Result<Value, ToolFailure> {
        let claim = arguments["claim"].as_str().unwrap_or_default();
        let data_description = arguments["data_description"].as_str().unwrap_or_default();
        let claim_lower = claim.to_lowercase();
        let data_lower = data_description.to_lowercase();

        let mut confidence: f64 = 0.5;
        let mut warnings = Vec::new();

        if claim_lower.contains("correlation") && claim_lower.contains("causation") {
            warnings.push("相関は因果を意味しない");
            confidence -= 0.2;
        }

        if claim_lower.contains("significant")
            && !["p<", "p =", "p-value"]
                .iter()
                .any(|p| claim_lower.contains(p))
        {
            warnings.push("p値のない有意性の主張");
            confidence -= 0.1;
        }

        if contains_any(claim, OVERCLAIM_TERMS) {
            warnings.push("断定が強すぎる（科学が「証明」することは稀）");
            confidence -= 0.15;
        }

        if data_lower.contains("sample size") {
            confidence += 0.2;
        }

        if ["randomized", "controlled", "blind"]
            .iter()
            .any(|term| data_lower.contains(term))
        {
            confidence += 0.2;
        }

        let confidence = confidence.clamp(0.1, 1.0);
        let assessment = if confidence > 0.6 {
            "軽微な懸念のある妥当な主張"
        } else if confidence > 0.3 {
            "疑わしい主張、要明確化"
        } else {
            "無効または裏付けのない主張"
        };

        Ok(json!({
            "valid": confidence > 0.5,
            "confidence": confidence,
            "warnings": warnings,
            "assessment": assessment,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn invoke(tool: &dyn Tool, args: Value) -> Value {
        tool.schema().validate(tool.name(), &args).expect("valid args");
        tool.invoke(&args).await.expect("tool success")
    }

    #[tokio::test]
    async fn test_testability_measurable_prediction_scores_high() {
        let payload = invoke(
            &TestabilityScoreTool,
            json!({"hypothesis": "Increasing the sparsity rate will decrease inference cost"}),
        )
        .await;

        // 0.5 + 0.2 (rate) + 0.15 (increase/decrease) + 0.1 (絶対表現なし)
        let score = payload["testability_score"].as_f64().unwrap();
        assert!((score - 0.95).abs() < 1e-9);
        assert_eq!(payload["is_testable"], json!(true));
    }

    #[tokio::test]
    async fn test_testability_absolute_vague_scores_low() {
        let payload = invoke(
            &TestabilityScoreTool,
            json!({"hypothesis": "This approach always works for everything"}),
        )
        .await;

        // 0.5 - 0.1 (always) で、測定語も予測語もなし
        let score = payload["testability_score"].as_f64().unwrap();
        assert!(score < 0.6);
        assert_eq!(payload["is_testable"], json!(false));
    }

    #[tokio::test]
    async fn test_novelty_no_papers_is_novel() {
        let payload = invoke(&NoveltyCheckTool, json!({"hypothesis": "x"})).await;
        assert_eq!(payload["novelty_score"], json!(0.8));
        assert_eq!(payload["similar_papers_count"], json!(0));
    }

    #[tokio::test]
    async fn test_novelty_citation_thresholds() {
        let well_studied = invoke(
            &NoveltyCheckTool,
            json!({
                "hypothesis": "x",
                "papers": [{"citations": 80}, {"citations": 60}],
            }),
        )
        .await;
        assert_eq!(well_studied["novelty_score"], json!(0.3));

        let some_work = invoke(
            &NoveltyCheckTool,
            json!({"hypothesis": "x", "papers": [{"citations": 25}]}),
        )
        .await;
        assert_eq!(some_work["novelty_score"], json!(0.6));

        let novel = invoke(
            &NoveltyCheckTool,
            json!({"hypothesis": "x", "papers": [{"citations": 2}]}),
        )
        .await;
        assert_eq!(novel["novelty_score"], json!(0.9));
    }

    #[tokio::test]
    async fn test_statistical_claim_correlation_causation_warned() {
        let payload = invoke(
            &StatisticalClaimTool,
            json!({"claim": "The correlation proves causation between A and B"}),
        )
        .await;

        let warnings = payload["warnings"].as_array().unwrap();
        assert_eq!(warnings.len(), 2); // 相関/因果 + 断定表現
        assert_eq!(payload["valid"], json!(false));
    }

    #[tokio::test]
    async fn test_statistical_claim_rigorous_methodology_raises_confidence() {
        let payload = invoke(
            &StatisticalClaimTool,
            json!({
                "claim": "Treatment group showed improvement (p<0.05)",
                "data_description": "randomized controlled trial with sample size 200",
            }),
        )
        .await;

        let confidence = payload["confidence"].as_f64().unwrap();
        assert!(confidence > 0.8);
        assert_eq!(payload["valid"], json!(true));
    }
}
