//! 文献検索ステップ
//!
//! # 責務
//!
//! - 入力のフォーカス（またはソースのタイトル）を検索クエリとして、
//!   許可された検索ツールで関連文献を収集する
//! - 見つかった文献を先行研究の主張として状態に追加する
//!
//! # 劣化動作
//!
//! 検索は補強であって前提ではありません。一部のツールが失敗しても
//! 成功した結果だけで続行します。試行したすべての呼び出しが失敗した
//! 場合のみ、回復不能エラーとして報告します。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::StepRole;
use crate::error::ToolError;
use crate::state::{Claim, StateDelta, StepResult, WorkflowState};
use crate::tool::{ARXIV_TOOL, SEMANTIC_SCHOLAR_TOOL, StepTools};
use super::StepUnit;

/// 1クエリあたりの取得件数
const RESULTS_PER_SOURCE: u64 = 5;

/// 文献検索ステップ
pub struct ResearchStep;

impl ResearchStep {
    /// 検索クエリを組み立てる
    ///
    /// フォーカスがあればそれを、なければソースのタイトルを連結して使います。
    fn build_query(state: &WorkflowState) -> Option<String> {
        if let Some(focus) = &state.input.focus {
            if !focus.trim().is_empty() {
                return Some(focus.trim().to_string());
            }
        }

        let titles: Vec<&str> = state
            .input
            .sources
            .iter()
            .map(|s| s.title.as_str())
            .filter(|t| !t.trim().is_empty())
            .collect();

        if titles.is_empty() {
            None
        } else {
            Some(titles.join(" "))
        }
    }
}

#[async_trait]
impl StepUnit for ResearchStep {
    fn role(&self) -> StepRole {
        StepRole::Research
    }

    async fn run(&self, state: WorkflowState, tools: Arc<StepTools>) -> StepResult {
        let Some(query) = Self::build_query(&state) else {
            // クエリが組めない場合は検索せずに続行する
            return StepResult::message("検索クエリを組み立てられないため文献検索をスキップ");
        };

        debug!(query = %query, "文献検索を開始");

        let mut delta = StateDelta::default();
        let mut attempted = 0u32;
        let mut succeeded = 0u32;
        let mut failures = Vec::new();

        for (tool_name, limit_key) in
            [(SEMANTIC_SCHOLAR_TOOL, "limit"), (ARXIV_TOOL, "max_results")]
        {
            let arguments = json!({
                "query": query,
                (limit_key): RESULTS_PER_SOURCE,
            });

            let result = match tools.call(tool_name, arguments).await {
                Ok(result) => result,
                // 許可されていないツールは単にスキップ
                Err(ToolError::UnknownTool(_)) => continue,
                Err(e) => {
                    warn!(tool = tool_name, error = %e, "検索ツールの呼び出しを拒否");
                    attempted += 1;
                    failures.push(format!("{}: {}", tool_name, e));
                    continue;
                }
            };

            attempted += 1;

            if !result.success {
                let detail = result
                    .failure
                    .map(|f| format!("{}: {}", f.code.as_str(), f.detail))
                    .unwrap_or_else(|| "不明な失敗".to_string());
                warn!(tool = tool_name, detail = %detail, "検索ツールが失敗");
                failures.push(format!("{}: {}", tool_name, detail));
                continue;
            }

            succeeded += 1;

            let papers = result.payload.as_array().cloned().unwrap_or_default();
            for paper in papers {
                let title = paper["title"].as_str().unwrap_or("(無題)");
                delta.claims.push(Claim {
                    id: Uuid::new_v4().to_string(),
                    text: format!("関連研究: {}", title),
                    claim_type: "prior_work".to_string(),
                    confidence: 0.5,
                    source_id: paper["url"].as_str().unwrap_or(tool_name).to_string(),
                });
            }
        }

        let found = delta.claims.len();

        if attempted > 0 && succeeded == 0 {
            delta.unrecoverable_error = Some(format!(
                "すべての検索ツールが失敗しました: {}",
                failures.join("; ")
            ));
        }

        StepResult {
            delta,
            tool_calls: tools.take_records(),
            rationale: format!(
                "文献検索完了: {}件の関連研究を収集（成功 {}/{} ツール）",
                found, succeeded, attempted
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::state::{FailureCode, SourceDocument, ToolFailure, WorkflowInput};
    use crate::tool::{ArgKind, ArgSchema, ArgSpec, Tool, ToolRegistry};

    struct FixedSearchTool {
        name: &'static str,
        outcome: Result<serde_json::Value, ToolFailure>,
    }

    #[async_trait]
    impl Tool for FixedSearchTool {
        fn name(&self) -> &'static str {
            self.name
        }

        fn schema(&self) -> ArgSchema {
            ArgSchema::new(vec![
                ArgSpec::required("query", ArgKind::String),
                ArgSpec::optional("limit", ArgKind::Integer),
                ArgSpec::optional("max_results", ArgKind::Integer),
            ])
        }

        async fn invoke(&self, _arguments: &serde_json::Value) -> Result<serde_json::Value, ToolFailure> {
            self.outcome.clone()
        }
    }

    fn state_with_focus(focus: &str) -> WorkflowState {
        WorkflowState::new(WorkflowInput {
            focus: Some(focus.to_string()),
            sources: Vec::new(),
        })
    }

    fn step_tools(registry: ToolRegistry, allowed: Vec<&str>) -> Arc<StepTools> {
        Arc::new(StepTools::new(
            Arc::new(registry),
            allowed.into_iter().map(String::from).collect(),
            8,
            Duration::from_secs(5),
        ))
    }

    #[tokio::test]
    async fn test_collects_claims_from_search_payload() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FixedSearchTool {
            name: SEMANTIC_SCHOLAR_TOOL,
            outcome: Ok(json!([
                {"title": "Paper A", "url": "https://x/a"},
                {"title": "Paper B", "url": "https://x/b"},
            ])),
        }));

        let tools = step_tools(registry, vec![SEMANTIC_SCHOLAR_TOOL]);
        let result = ResearchStep
            .run(state_with_focus("sparse attention"), tools)
            .await;

        assert_eq!(result.delta.claims.len(), 2);
        assert_eq!(result.delta.claims[0].claim_type, "prior_work");
        assert!(result.delta.unrecoverable_error.is_none());
        assert_eq!(result.tool_calls.len(), 1);
    }

    #[tokio::test]
    async fn test_degrades_when_one_tool_fails() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FixedSearchTool {
            name: SEMANTIC_SCHOLAR_TOOL,
            outcome: Err(ToolFailure {
                code: FailureCode::RateLimited,
                detail: "429".to_string(),
            }),
        }));
        registry.register(Arc::new(FixedSearchTool {
            name: ARXIV_TOOL,
            outcome: Ok(json!([{"title": "Paper C", "url": "https://x/c"}])),
        }));

        let tools = step_tools(registry, vec![SEMANTIC_SCHOLAR_TOOL, ARXIV_TOOL]);
        let result = ResearchStep
            .run(state_with_focus("sparse attention"), tools)
            .await;

        assert_eq!(result.delta.claims.len(), 1);
        assert!(result.delta.unrecoverable_error.is_none());
    }

    #[tokio::test]
    async fn test_unrecoverable_when_all_tools_fail() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FixedSearchTool {
            name: ARXIV_TOOL,
            outcome: Err(ToolFailure {
                code: FailureCode::Unreachable,
                detail: "connection refused".to_string(),
            }),
        }));

        let tools = step_tools(registry, vec![ARXIV_TOOL]);
        let result = ResearchStep
            .run(state_with_focus("sparse attention"), tools)
            .await;

        assert!(result.delta.unrecoverable_error.is_some());
    }

    #[tokio::test]
    async fn test_skips_without_query() {
        let state = WorkflowState::new(WorkflowInput {
            focus: None,
            sources: Vec::new(),
        });
        let tools = step_tools(ToolRegistry::new(), vec![]);

        let result = ResearchStep.run(state, tools).await;
        assert!(result.delta.is_empty());
        assert!(result.tool_calls.is_empty());
    }

    #[test]
    fn test_query_falls_back_to_source_titles() {
        let state = WorkflowState::new(WorkflowInput {
            focus: None,
            sources: vec![SourceDocument {
                id: "s1".to_string(),
                title: "Attention Is All You Need".to_string(),
                content: String::new(),
            }],
        });

        assert_eq!(
            ResearchStep::build_query(&state).unwrap(),
            "Attention Is All You Need"
        );
    }
}
