//! パイプライン全体の結合テスト
//!
//! 外部サービスに触れるツール（検索・生成）はモックに差し替え、
//! エンジン・ルーター・ステップ・ツールレイヤーを実物のまま
//! 4ステップの流れを通します。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use kasetsu_flow::config::{Pipeline, PipelineMode, StepRole};
use kasetsu_flow::engine::WorkflowEngine;
use kasetsu_flow::runner::TaskManager;
use kasetsu_flow::state::{
    HypothesisStatus, SourceDocument, StepResult, ToolFailure, WorkflowInput, WorkflowState,
    WorkflowStatus,
};
use kasetsu_flow::step::{StepRegistry, StepUnit};
use kasetsu_flow::tool::{
    ARXIV_TOOL, ArgKind, ArgSchema, ArgSpec, GENERATE_TOOL, NoveltyCheckTool,
    SEMANTIC_SCHOLAR_TOOL, StepTools, TestabilityScoreTool, Tool, ToolLayerConfig, ToolRegistry,
};

/// 固定の検索結果を返すモック
struct MockSearchTool {
    name: &'static str,
}

#[async_trait]
impl Tool for MockSearchTool {
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

    async fn invoke(&self, _arguments: &Value) -> Result<Value, ToolFailure> {
        Ok(json!([
            {"title": "Prior Work on Sparse Attention", "url": "https://example/p1", "citations": 8},
        ]))
    }
}

/// 構造化された仮説テキストを返す生成モック
struct MockGenerateTool;

#[async_trait]
impl Tool for MockGenerateTool {
    fn name(&self) -> &'static str {
        GENERATE_TOOL
    }

    fn schema(&self) -> ArgSchema {
        ArgSchema::new(vec![
            ArgSpec::required("system_prompt", ArgKind::String),
            ArgSpec::required("prompt", ArgKind::String),
            ArgSpec::optional("model", ArgKind::String),
        ])
    }

    async fn invoke(&self, _arguments: &Value) -> Result<Value, ToolFailure> {
        let content = "\
HYPOTHESIS 1: Increasing attention sparsity will decrease inference latency at a measurable rate
RATIONALE: Sources report concentrated attention weights
EXPECTED OUTCOME: Lower latency with comparable quality

HYPOTHESIS 2: Curated data will influence scaling efficiency more than raw volume
RATIONALE: Claims about data quality effects
EXPECTED OUTCOME: Curated subsets match larger raw corpora";
        Ok(json!({"content": content, "model": "mock", "input_tokens": 10, "output_tokens": 20}))
    }
}

fn mock_tool_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(MockSearchTool {
        name: SEMANTIC_SCHOLAR_TOOL,
    }));
    registry.register(Arc::new(MockSearchTool { name: ARXIV_TOOL }));
    registry.register(Arc::new(MockGenerateTool));
    registry.register(Arc::new(NoveltyCheckTool));
    registry.register(Arc::new(TestabilityScoreTool));
    registry
}

fn sample_input() -> WorkflowInput {
    WorkflowInput {
        focus: Some("attention sparsity in large models".to_string()),
        sources: vec![SourceDocument {
            id: "s1".to_string(),
            title: "Sparse Attention Study".to_string(),
            content: "Sparse Attention reduces cost. Sparse Attention preserves quality. \
                      Results show a 40 percent latency reduction in our benchmark."
                .to_string(),
        }],
    }
}

fn agentic_manager() -> TaskManager {
    TaskManager::new(WorkflowEngine::new(
        Pipeline::builtin(PipelineMode::Agentic).unwrap(),
        StepRegistry::builtin(),
        mock_tool_registry(),
        ToolLayerConfig::default(),
    ))
}

#[tokio::test]
async fn test_agentic_pipeline_end_to_end() {
    let state = agentic_manager().run_sync(sample_input()).await.unwrap();

    assert_eq!(state.status, WorkflowStatus::Completed);
    assert!(state.error.is_none());

    // 4ステップが定義順に1回ずつ記録される
    let steps: Vec<&str> = state.log.iter().map(|e| e.step.as_str()).collect();
    assert_eq!(steps, vec!["research", "analyze", "generate", "critique"]);

    // 成果物は批評まで通って検証済みになっている
    assert_eq!(state.artifacts.len(), 2);
    for hypothesis in &state.artifacts {
        assert_eq!(hypothesis.status, HypothesisStatus::Validated);
        assert!(hypothesis.testability_score > 0.0);
        assert!(hypothesis.novelty_score > 0.0);
        assert!(hypothesis.feedback.is_some());
    }

    // 途中工程の蓄積も残っている
    assert!(!state.concepts.is_empty());
    assert!(!state.claims.is_empty());
    assert!(state.tool_results.contains_key("research"));
    assert!(state.tool_results.contains_key("critique"));
}

#[tokio::test]
async fn test_generate_failure_terminates_as_failed() {
    /// 常に失敗する生成モック
    struct FailingGenerateTool;

    #[async_trait]
    impl Tool for FailingGenerateTool {
        fn name(&self) -> &'static str {
            GENERATE_TOOL
        }

        fn schema(&self) -> ArgSchema {
            ArgSchema::new(vec![
                ArgSpec::required("system_prompt", ArgKind::String),
                ArgSpec::required("prompt", ArgKind::String),
                ArgSpec::optional("model", ArgKind::String),
            ])
        }

        async fn invoke(&self, _arguments: &Value) -> Result<Value, ToolFailure> {
            Err(ToolFailure {
                code: kasetsu_flow::state::FailureCode::Unreachable,
                detail: "connection refused".to_string(),
            })
        }
    }

    let mut registry = mock_tool_registry();
    registry.register(Arc::new(FailingGenerateTool));

    let manager = TaskManager::new(WorkflowEngine::new(
        Pipeline::builtin(PipelineMode::Agentic).unwrap(),
        StepRegistry::builtin(),
        registry,
        ToolLayerConfig::default(),
    ));

    let state = manager.run_sync(sample_input()).await.unwrap();

    assert_eq!(state.status, WorkflowStatus::Failed);
    assert!(state.error.as_deref().unwrap().contains("仮説生成"));
    // research / analyze / generate までは記録され、critique には進まない
    let steps: Vec<&str> = state.log.iter().map(|e| e.step.as_str()).collect();
    assert_eq!(steps, vec!["research", "analyze", "generate"]);
}

#[tokio::test]
async fn test_cancellation_before_second_step() {
    /// 実行中にキャンセルを要求してから正常完了するステップ
    struct CancellingStep {
        cancel: kasetsu_flow::engine::CancelHandle,
    }

    #[async_trait]
    impl StepUnit for CancellingStep {
        fn role(&self) -> StepRole {
            StepRole::Research
        }

        async fn run(&self, _state: WorkflowState, _tools: Arc<StepTools>) -> StepResult {
            self.cancel.cancel();
            StepResult::message("調査完了")
        }
    }

    struct NoopStep(StepRole);

    #[async_trait]
    impl StepUnit for NoopStep {
        fn role(&self) -> StepRole {
            self.0
        }

        async fn run(&self, _state: WorkflowState, _tools: Arc<StepTools>) -> StepResult {
            StepResult::message("noop")
        }
    }

    let cancel = kasetsu_flow::engine::CancelHandle::new();
    let mut steps = StepRegistry::new();
    steps.register(Arc::new(CancellingStep {
        cancel: cancel.clone(),
    }));
    steps.register(Arc::new(NoopStep(StepRole::Analyze)));
    steps.register(Arc::new(NoopStep(StepRole::Generate)));
    steps.register(Arc::new(NoopStep(StepRole::Critique)));

    let engine = WorkflowEngine::new(
        Pipeline::builtin(PipelineMode::Agentic).unwrap(),
        steps,
        ToolRegistry::new(),
        ToolLayerConfig::default(),
    );

    let (progress, _rx) =
        tokio::sync::watch::channel(kasetsu_flow::engine::ProgressSnapshot::default());
    let state = engine
        .run(WorkflowInput::default(), cancel, progress)
        .await
        .unwrap();

    // ステップ1の完了は記録され、ステップ2には入らない
    assert_eq!(state.status, WorkflowStatus::Failed);
    assert_eq!(state.error.as_deref(), Some("cancelled"));
    assert_eq!(state.log.len(), 1);
    assert_eq!(state.log[0].step, "research");
}

#[tokio::test]
async fn test_iteration_cap_bounds_cyclic_pipeline() {
    struct NoopStep(StepRole);

    #[async_trait]
    impl StepUnit for NoopStep {
        fn role(&self) -> StepRole {
            self.0
        }

        async fn run(&self, _state: WorkflowState, _tools: Arc<StepTools>) -> StepResult {
            StepResult::message("noop")
        }
    }

    // 2ステップの循環。成果物が生まれないため上限でのみ止まる
    let raw = r#"
[pipeline]
name = "cycle"
entry = "a"
max_iterations = 5
fallback_terminal = true

[[steps]]
name = "a"
role = "analyze"

[[steps]]
name = "b"
role = "generate"

[[routes]]
after = "a"
to = "b"

[[routes]]
after = "b"
to = "a"
"#;

    let mut steps = StepRegistry::new();
    steps.register(Arc::new(NoopStep(StepRole::Analyze)));
    steps.register(Arc::new(NoopStep(StepRole::Generate)));

    let manager = TaskManager::new(WorkflowEngine::new(
        Pipeline::from_toml(raw).unwrap(),
        steps,
        ToolRegistry::new(),
        ToolLayerConfig::default(),
    ));

    let state = manager.run_sync(WorkflowInput::default()).await.unwrap();

    assert_eq!(state.iterations, 5);
    assert_eq!(state.log.len(), 5);
    // 上限まで回っても成果物がなければ失敗として終わる
    assert_eq!(state.status, WorkflowStatus::Failed);
}

#[test]
fn test_load_example_pipeline() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/pipelines/example.toml");
    let pipeline = Pipeline::from_file(path).expect("Failed to load pipeline");

    assert_eq!(pipeline.name, "hypothesis-lab");
    assert_eq!(pipeline.entry, "survey");
    assert_eq!(pipeline.steps.len(), 4);
    assert_eq!(pipeline.routes.len(), 3);
    assert_eq!(pipeline.step("review").unwrap().role, StepRole::Critique);
}

#[test]
fn test_pipeline_roundtrip_with_real_file() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/pipelines/example.toml");
    let original = Pipeline::from_file(path).expect("Failed to load pipeline");

    let toml_string = original.to_toml().expect("Failed to serialize");
    let restored = Pipeline::from_toml(&toml_string).expect("Failed to parse");

    assert_eq!(restored, original);
}
