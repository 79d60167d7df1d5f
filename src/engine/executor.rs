//! ワークフロー実行エンジン
//!
//! # 責務
//!
//! - ルーターの判定に従ってステップを順に実行する
//! - ステップの差分を正準状態へ一元的に適用する
//! - ステップの障害（パニック・タイムアウト）を状態から隔離する
//! - 協調キャンセルとチェックポイント保存
//!
//! # 障害隔離
//!
//! 各ステップは独立タスク（`tokio::spawn`）として、状態のスナップ
//! ショットに対して実行されます。ステップがパニックしても正準状態は
//! 無傷のまま残り、エンジンは欠陥メッセージを記録して終端状態
//! `Failed` を返します。プロセスもエンジンもそのまま使い続けられます。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::config::Pipeline;
use crate::error::EngineError;
use crate::router::{RouteDecision, Router, StopReason};
use crate::state::{Hypothesis, LogEntry, WorkflowInput, WorkflowState, WorkflowStatus};
use crate::step::StepRegistry;
use crate::tool::{StepTools, ToolLayerConfig, ToolRegistry};
use super::checkpoint::CheckpointStore;

/// 協調キャンセルのハンドル
///
/// エンジンはステップ境界でのみこのフラグを確認します。実行中の
/// ステップへの割り込みは行いません。
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    /// 新しいハンドルを生成
    pub fn new() -> Self {
        Self::default()
    }

    /// キャンセルを要求する
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// キャンセルが要求されているか
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// 進捗の読み取り専用スナップショット
///
/// 各差分適用後にエンジンが発行します。ポーリング側はこれだけを
/// 見れば現在の状況を把握できます。
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSnapshot {
    /// 現在のステータス
    pub status: WorkflowStatus,

    /// これまでの実行ログ
    pub log: Vec<LogEntry>,

    /// これまでの成果物
    pub artifacts: Vec<Hypothesis>,
}

impl From<&WorkflowState> for ProgressSnapshot {
    fn from(state: &WorkflowState) -> Self {
        Self {
            status: state.status,
            log: state.log.clone(),
            artifacts: state.artifacts.clone(),
        }
    }
}

impl Default for ProgressSnapshot {
    fn default() -> Self {
        Self {
            status: WorkflowStatus::Running,
            log: Vec::new(),
            artifacts: Vec::new(),
        }
    }
}

/// ワークフロー実行エンジン
///
/// パイプライン定義・ステップ実装・ツールレジストリを束ね、
/// 1回の `run` で入力から終端状態までを実行します。
/// エンジン自体は実行間で状態を持たず、再利用できます。
pub struct WorkflowEngine {
    pipeline: Pipeline,
    router: Router,
    steps: Arc<StepRegistry>,
    tools: Arc<ToolRegistry>,
    tool_config: ToolLayerConfig,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
}

impl WorkflowEngine {
    /// エンジンを構築
    ///
    /// # 引数
    ///
    /// - `pipeline`: 検証済みのパイプライン定義
    /// - `steps`: ロール別のステップ実装
    /// - `tools`: 利用可能なツールのレジストリ
    /// - `tool_config`: ツールレイヤーの構成
    pub fn new(
        pipeline: Pipeline,
        steps: StepRegistry,
        tools: ToolRegistry,
        tool_config: ToolLayerConfig,
    ) -> Self {
        let router = Router::new(&pipeline);
        Self {
            pipeline,
            router,
            steps: Arc::new(steps),
            tools: Arc::new(tools),
            tool_config,
            checkpoints: None,
        }
    }

    /// チェックポイント保存先を設定
    pub fn with_checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = Some(store);
        self
    }

    /// ワークフローを実行し、終端状態を返す
    ///
    /// 戻り値の `Err` は構成とステップ実装の不整合（ロール実装の欠落）
    /// だけです。ステップの失敗・タイムアウト・パニック・キャンセルは
    /// すべて終端状態 `Failed` として `Ok` で返ります。
    ///
    /// # 引数
    ///
    /// - `input`: ワークフロー入力
    /// - `cancel`: 協調キャンセルのハンドル
    /// - `progress`: 進捗スナップショットの発行先
    pub async fn run(
        &self,
        input: WorkflowInput,
        cancel: CancelHandle,
        progress: watch::Sender<ProgressSnapshot>,
    ) -> Result<WorkflowState, EngineError> {
        let mut state = WorkflowState::new(input);
        info!(
            session = %state.session_id,
            pipeline = %self.pipeline.name,
            "ワークフローを開始"
        );

        loop {
            if cancel.is_cancelled() {
                info!(session = %state.session_id, "キャンセル要求を検出");
                state.fail("cancelled");
                break;
            }

            let step_name = match self.router.next(&state) {
                RouteDecision::Terminal(reason) => {
                    self.finish(&mut state, reason);
                    break;
                }
                RouteDecision::Step(name) => name,
            };

            let spec = self
                .pipeline
                .step(&step_name)
                .ok_or_else(|| EngineError::UnknownStep(step_name.clone()))?;
            let unit = self
                .steps
                .get(spec.role)
                .ok_or_else(|| EngineError::UnknownStep(step_name.clone()))?;

            info!(
                session = %state.session_id,
                step = %step_name,
                iteration = state.iterations,
                "ステップを実行"
            );

            let tools = Arc::new(StepTools::new(
                self.tools.clone(),
                spec.tools.clone(),
                spec.tool_budget,
                self.tool_config.call_timeout,
            ));
            let snapshot = state.clone();

            // ステップは独立タスクで実行し、パニックを隔離する
            let mut handle = tokio::spawn(async move { unit.run(snapshot, tools).await });

            match timeout(spec.timeout, &mut handle).await {
                Err(_) => {
                    handle.abort();
                    warn!(step = %step_name, "ステップがタイムアウト");
                    state.fail(format!(
                        "ステップ '{}' が制限時間 {:?} 内に完了しませんでした",
                        step_name, spec.timeout
                    ));
                    break;
                }
                Ok(Err(join_err)) => {
                    let detail = if join_err.is_panic() {
                        panic_message(join_err.into_panic())
                    } else {
                        "ステップタスクが中断されました".to_string()
                    };
                    warn!(step = %step_name, detail = %detail, "ステップが異常終了");
                    state.fail(format!("ステップ '{}' の欠陥: {}", step_name, detail));
                    break;
                }
                Ok(Ok(result)) => {
                    state.apply(&step_name, result);
                    self.checkpoint(&state);
                    progress.send_replace(ProgressSnapshot::from(&state));
                    state.advance_iteration();
                }
            }
        }

        self.checkpoint(&state);
        progress.send_replace(ProgressSnapshot::from(&state));
        info!(
            session = %state.session_id,
            status = ?state.status,
            iterations = state.iterations,
            artifacts = state.artifacts.len(),
            "ワークフローが終了"
        );
        Ok(state)
    }

    /// 強制終端の理由を終端ステータスに反映する
    fn finish(&self, state: &mut WorkflowState, reason: StopReason) {
        match reason {
            StopReason::IterationCap => {
                if state.artifacts.is_empty() {
                    state.fail("反復回数の上限に達しましたが成果物がありません");
                } else {
                    // 上限到達でも成果物があれば成功として扱う
                    state.complete();
                }
            }
            StopReason::Unrecoverable => {
                let reason = state
                    .error
                    .clone()
                    .unwrap_or_else(|| "回復不能エラー".to_string());
                state.fail(reason);
            }
            StopReason::ArtifactsComplete | StopReason::PipelineExhausted => {
                state.complete();
            }
        }
    }

    fn checkpoint(&self, state: &WorkflowState) {
        if let Some(store) = &self.checkpoints {
            if let Err(e) = store.save(state) {
                warn!(session = %state.session_id, error = %e, "チェックポイント保存に失敗");
            }
        }
    }
}

/// パニックのペイロードからメッセージを取り出す
fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "詳細不明のパニック".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::config::{PipelineMode, StepRole};
    use crate::state::StepResult;
    use crate::step::StepUnit;

    /// 何もしないで完了するスタブ
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

    /// 必ずパニックするスタブ
    struct PanickingStep(StepRole);

    #[async_trait]
    impl StepUnit for PanickingStep {
        fn role(&self) -> StepRole {
            self.0
        }

        async fn run(&self, _state: WorkflowState, _tools: Arc<StepTools>) -> StepResult {
            panic!("boom in step");
        }
    }

    fn standard_engine(steps: StepRegistry) -> WorkflowEngine {
        WorkflowEngine::new(
            Pipeline::builtin(PipelineMode::Standard).unwrap(),
            steps,
            ToolRegistry::new(),
            ToolLayerConfig::default(),
        )
    }

    fn noop_registry() -> StepRegistry {
        let mut registry = StepRegistry::new();
        registry.register(Arc::new(NoopStep(StepRole::Analyze)));
        registry.register(Arc::new(NoopStep(StepRole::Generate)));
        registry
    }

    async fn run(engine: &WorkflowEngine, cancel: CancelHandle) -> WorkflowState {
        let (tx, _rx) = watch::channel(ProgressSnapshot::default());
        engine
            .run(WorkflowInput::default(), cancel, tx)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_runs_pipeline_to_completion() {
        let engine = standard_engine(noop_registry());
        let state = run(&engine, CancelHandle::new()).await;

        assert_eq!(state.status, WorkflowStatus::Completed);
        assert_eq!(state.log.len(), 2);
        assert_eq!(state.log[0].step, "analyze");
        assert_eq!(state.log[1].step, "generate");
        assert_eq!(state.iterations, 2);
    }

    #[tokio::test]
    async fn test_pre_cancelled_run_fails_without_steps() {
        let engine = standard_engine(noop_registry());
        let cancel = CancelHandle::new();
        cancel.cancel();

        let state = run(&engine, cancel).await;
        assert_eq!(state.status, WorkflowStatus::Failed);
        assert_eq!(state.error.as_deref(), Some("cancelled"));
        assert!(state.log.is_empty());
    }

    #[tokio::test]
    async fn test_panicking_step_is_isolated_and_engine_reusable() {
        let mut registry = StepRegistry::new();
        registry.register(Arc::new(PanickingStep(StepRole::Analyze)));
        registry.register(Arc::new(NoopStep(StepRole::Generate)));
        let engine = standard_engine(registry);

        let state = run(&engine, CancelHandle::new()).await;
        assert_eq!(state.status, WorkflowStatus::Failed);
        assert!(state.error.as_deref().unwrap().contains("boom in step"));
        // パニックしたステップの差分は一切適用されない
        assert!(state.log.is_empty());

        // 同じエンジンでもう一度実行できる
        let second = run(&engine, CancelHandle::new()).await;
        assert_eq!(second.status, WorkflowStatus::Failed);
    }

    #[tokio::test]
    async fn test_missing_role_implementation_is_an_error() {
        let engine = standard_engine(StepRegistry::new());
        let (tx, _rx) = watch::channel(ProgressSnapshot::default());

        let err = engine
            .run(WorkflowInput::default(), CancelHandle::new(), tx)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownStep(_)));
    }
}
