//! ワークフローの起動面
//!
//! # 責務
//!
//! - 同期実行（完了まで待つ）とバックグラウンド実行の2つの起動方法を提供
//! - バックグラウンド実行に対するタスクID・進捗ポーリング・キャンセル・
//!   合流のハンドル [`WorkflowHandle`] を提供
//!
//! # 使用例
//!
//! ```rust,no_run
//! use kasetsu_flow::config::{Pipeline, PipelineMode};
//! use kasetsu_flow::engine::WorkflowEngine;
//! use kasetsu_flow::runner::TaskManager;
//! use kasetsu_flow::state::WorkflowInput;
//! use kasetsu_flow::step::StepRegistry;
//! use kasetsu_flow::tool::{ToolLayerConfig, builtin_registry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let tool_config = ToolLayerConfig::default();
//!     let manager = TaskManager::new(WorkflowEngine::new(
//!         Pipeline::builtin(PipelineMode::Standard)?,
//!         StepRegistry::builtin(),
//!         builtin_registry(&tool_config),
//!         tool_config,
//!     ));
//!
//!     let handle = manager.spawn(WorkflowInput::default());
//!     println!("task: {}", handle.task_id());
//!     println!("status: {:?}", handle.status().status);
//!
//!     let state = handle.join().await?;
//!     println!("{}", state.to_json()?);
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

use crate::engine::{CancelHandle, ProgressSnapshot, WorkflowEngine};
use crate::error::EngineError;
use crate::state::{WorkflowInput, WorkflowState};

/// ワークフローの起動を管理する
///
/// エンジンを共有所有し、複数の実行を並行して起動できます。
pub struct TaskManager {
    engine: Arc<WorkflowEngine>,
}

impl TaskManager {
    /// マネージャーを生成
    pub fn new(engine: WorkflowEngine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }

    /// ワークフローを同期実行し、終端状態まで待つ
    pub async fn run_sync(&self, input: WorkflowInput) -> Result<WorkflowState, EngineError> {
        let (progress, _rx) = watch::channel(ProgressSnapshot::default());
        self.engine.run(input, CancelHandle::new(), progress).await
    }

    /// ワークフローをバックグラウンドで起動する
    ///
    /// すぐに [`WorkflowHandle`] を返します。進捗は
    /// [`WorkflowHandle::status`] でポーリングできます。
    pub fn spawn(&self, input: WorkflowInput) -> WorkflowHandle {
        let task_id = Uuid::new_v4();
        let cancel = CancelHandle::new();
        let (progress_tx, progress_rx) = watch::channel(ProgressSnapshot::default());

        let engine = self.engine.clone();
        let run_cancel = cancel.clone();
        let join = tokio::spawn(async move { engine.run(input, run_cancel, progress_tx).await });

        info!(task = %task_id, "ワークフローをバックグラウンド起動");

        WorkflowHandle {
            task_id,
            cancel,
            progress: progress_rx,
            join,
        }
    }
}

/// バックグラウンド実行中のワークフローへのハンドル
pub struct WorkflowHandle {
    task_id: Uuid,
    cancel: CancelHandle,
    progress: watch::Receiver<ProgressSnapshot>,
    join: JoinHandle<Result<WorkflowState, EngineError>>,
}

impl WorkflowHandle {
    /// このタスクの識別子
    pub fn task_id(&self) -> Uuid {
        self.task_id
    }

    /// 現在の進捗スナップショットを取得
    ///
    /// ブロックしません。実行が進むたびに新しいスナップショットに
    /// 置き換わります。
    pub fn status(&self) -> ProgressSnapshot {
        self.progress.borrow().clone()
    }

    /// キャンセルを要求する
    ///
    /// 協調キャンセルのため、実行中のステップが終わった境界で
    /// 反映されます。
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// 終端状態まで待って結果を取り出す
    pub async fn join(self) -> Result<WorkflowState, EngineError> {
        self.join
            .await
            .map_err(|e| EngineError::TaskJoin(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::config::{Pipeline, PipelineMode, StepRole};
    use crate::state::{StepResult, WorkflowStatus};
    use crate::step::{StepRegistry, StepUnit};
    use crate::tool::{StepTools, ToolLayerConfig, ToolRegistry};

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

    struct SlowStep(StepRole);

    #[async_trait]
    impl StepUnit for SlowStep {
        fn role(&self) -> StepRole {
            self.0
        }

        async fn run(&self, _state: WorkflowState, _tools: Arc<StepTools>) -> StepResult {
            tokio::time::sleep(Duration::from_millis(50)).await;
            StepResult::message("slow")
        }
    }

    fn manager(steps: StepRegistry) -> TaskManager {
        TaskManager::new(WorkflowEngine::new(
            Pipeline::builtin(PipelineMode::Standard).unwrap(),
            steps,
            ToolRegistry::new(),
            ToolLayerConfig::default(),
        ))
    }

    fn noop_registry() -> StepRegistry {
        let mut registry = StepRegistry::new();
        registry.register(Arc::new(NoopStep(StepRole::Analyze)));
        registry.register(Arc::new(NoopStep(StepRole::Generate)));
        registry
    }

    #[tokio::test]
    async fn test_run_sync_reaches_terminal_state() {
        let state = manager(noop_registry())
            .run_sync(WorkflowInput::default())
            .await
            .unwrap();
        assert_eq!(state.status, WorkflowStatus::Completed);
    }

    #[tokio::test]
    async fn test_spawn_and_join() {
        let handle = manager(noop_registry()).spawn(WorkflowInput::default());
        let task_id = handle.task_id();

        let state = handle.join().await.unwrap();
        assert_eq!(state.status, WorkflowStatus::Completed);
        assert_ne!(task_id, Uuid::nil());
    }

    #[tokio::test]
    async fn test_status_reflects_progress_after_join() {
        let mut registry = StepRegistry::new();
        registry.register(Arc::new(SlowStep(StepRole::Analyze)));
        registry.register(Arc::new(NoopStep(StepRole::Generate)));

        let handle = manager(registry).spawn(WorkflowInput::default());
        let status = handle.status();
        // 起動直後は実行中
        assert_eq!(status.status, WorkflowStatus::Running);

        let state = handle.join().await.unwrap();
        assert_eq!(state.status, WorkflowStatus::Completed);
        assert_eq!(state.log.len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_produces_failed_state() {
        let mut registry = StepRegistry::new();
        registry.register(Arc::new(SlowStep(StepRole::Analyze)));
        registry.register(Arc::new(SlowStep(StepRole::Generate)));

        let handle = manager(registry).spawn(WorkflowInput::default());
        handle.cancel();

        let state = handle.join().await.unwrap();
        assert_eq!(state.status, WorkflowStatus::Failed);
        assert_eq!(state.error.as_deref(), Some("cancelled"));
    }
}
