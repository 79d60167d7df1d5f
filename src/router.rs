//! 決定的ルーター
//!
//! # 責務
//!
//! - パイプライン定義から順序付きルーティング規則を構築する
//! - 現在の状態だけを入力として次のステップ（または終端）を決める
//!
//! # 決定性
//!
//! ルーターは乱数・時刻・外部呼び出しを一切使いません。同じ状態を
//! 与えれば常に同じ判定を返します。規則は定義順に評価され、最初に
//! 一致したものが使われます。
//!
//! # 強制終端
//!
//! 規則の評価より先に、次の順で強制終端を判定します。
//!
//! 1. 反復回数が上限に達した
//! 2. 回復不能エラーが記録されている
//! 3. 成果物が揃った（全仮説が検証済み）
//!
//! 規則に一致しない場合、`fallback_terminal` が有効なら終端、
//! 無効なら構成読み込み時に拒否済みです。

use crate::config::{Pipeline, RouteRule};
use crate::state::{HypothesisStatus, WorkflowState};

/// ルーティング規則の条件部
///
/// 閉じた列挙です。条件の追加はこの型の変更を伴い、外部から任意の
/// 述語を注入することはできません。
#[derive(Debug, Clone, PartialEq, Eq)]
enum RoutePredicate {
    /// まだ1ステップも完了していない
    AtStart,

    /// 指定した名前のステップが直前に完了した
    AfterStep(String),
}

impl RoutePredicate {
    fn matches(&self, state: &WorkflowState) -> bool {
        match self {
            RoutePredicate::AtStart => state.last_completed.is_none(),
            RoutePredicate::AfterStep(name) => {
                state.last_completed.as_deref() == Some(name.as_str())
            }
        }
    }
}

/// 終端判定の理由
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// 反復回数が上限に達した
    IterationCap,

    /// 回復不能エラーが記録されている
    Unrecoverable,

    /// すべての成果物が検証済みになった
    ArtifactsComplete,

    /// 一致する規則がなくパイプラインを抜けた
    PipelineExhausted,
}

/// ルーターの判定結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// 指定した名前のステップを次に実行する
    Step(String),

    /// 実行を終える
    Terminal(StopReason),
}

/// 決定的ルーター
///
/// [`Pipeline`] から構築され、以後は状態を持ちません。
#[derive(Debug, Clone)]
pub struct Router {
    rules: Vec<(RoutePredicate, String)>,
    max_iterations: u32,
}

impl Router {
    /// パイプライン定義から規則表を構築
    ///
    /// エントリステップは先頭の規則（開始条件 → エントリ）として
    /// 組み込まれます。参照整合性は構成読み込み時に検証済みです。
    pub fn new(pipeline: &Pipeline) -> Self {
        let mut rules = vec![(RoutePredicate::AtStart, pipeline.entry.clone())];

        for RouteRule { after, to } in &pipeline.routes {
            rules.push((RoutePredicate::AfterStep(after.clone()), to.clone()));
        }

        Self {
            rules,
            max_iterations: pipeline.max_iterations,
        }
    }

    /// 次のステップ（または終端）を判定
    pub fn next(&self, state: &WorkflowState) -> RouteDecision {
        if state.iterations >= self.max_iterations {
            return RouteDecision::Terminal(StopReason::IterationCap);
        }

        if state.unrecoverable {
            return RouteDecision::Terminal(StopReason::Unrecoverable);
        }

        if !state.artifacts.is_empty()
            && state
                .artifacts
                .iter()
                .all(|h| h.status == HypothesisStatus::Validated)
        {
            return RouteDecision::Terminal(StopReason::ArtifactsComplete);
        }

        for (predicate, target) in &self.rules {
            if predicate.matches(state) {
                return RouteDecision::Step(target.clone());
            }
        }

        RouteDecision::Terminal(StopReason::PipelineExhausted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineMode;
    use crate::state::{Hypothesis, WorkflowInput, WorkflowState};

    fn agentic_router() -> Router {
        Router::new(&Pipeline::builtin(PipelineMode::Agentic).unwrap())
    }

    fn fresh_state() -> WorkflowState {
        WorkflowState::new(WorkflowInput::default())
    }

    fn hypothesis(status: HypothesisStatus) -> Hypothesis {
        Hypothesis {
            id: "h".to_string(),
            statement: "s".to_string(),
            rationale: String::new(),
            expected_outcome: String::new(),
            source_concepts: Vec::new(),
            testability_score: 0.0,
            novelty_score: 0.0,
            status,
            feedback: None,
        }
    }

    #[test]
    fn test_routes_to_entry_at_start() {
        let state = fresh_state();
        assert_eq!(
            agentic_router().next(&state),
            RouteDecision::Step("research".to_string())
        );
    }

    #[test]
    fn test_follows_route_table_in_order() {
        let router = agentic_router();
        let mut state = fresh_state();

        for (done, expected) in [
            ("research", "analyze"),
            ("analyze", "generate"),
            ("generate", "critique"),
        ] {
            state.last_completed = Some(done.to_string());
            assert_eq!(
                router.next(&state),
                RouteDecision::Step(expected.to_string())
            );
        }
    }

    #[test]
    fn test_terminal_after_final_step() {
        let mut state = fresh_state();
        state.last_completed = Some("critique".to_string());
        // critique に出ていくルートはない
        assert_eq!(
            agentic_router().next(&state),
            RouteDecision::Terminal(StopReason::PipelineExhausted)
        );
    }

    #[test]
    fn test_iteration_cap_wins_over_rules() {
        let mut state = fresh_state();
        state.iterations = 10;
        assert_eq!(
            agentic_router().next(&state),
            RouteDecision::Terminal(StopReason::IterationCap)
        );
    }

    #[test]
    fn test_unrecoverable_wins_over_rules() {
        let mut state = fresh_state();
        state.unrecoverable = true;
        state.last_completed = Some("research".to_string());
        assert_eq!(
            agentic_router().next(&state),
            RouteDecision::Terminal(StopReason::Unrecoverable)
        );
    }

    #[test]
    fn test_all_validated_artifacts_terminate() {
        let mut state = fresh_state();
        state.last_completed = Some("generate".to_string());
        state.artifacts = vec![hypothesis(HypothesisStatus::Validated)];
        assert_eq!(
            agentic_router().next(&state),
            RouteDecision::Terminal(StopReason::ArtifactsComplete)
        );
    }

    #[test]
    fn test_pending_artifacts_do_not_terminate() {
        let mut state = fresh_state();
        state.last_completed = Some("generate".to_string());
        state.artifacts = vec![
            hypothesis(HypothesisStatus::Validated),
            hypothesis(HypothesisStatus::Generated),
        ];
        assert_eq!(
            agentic_router().next(&state),
            RouteDecision::Step("critique".to_string())
        );
    }

    #[test]
    fn test_determinism_same_state_same_decision() {
        let router = agentic_router();
        let mut state = fresh_state();
        state.last_completed = Some("analyze".to_string());

        let first = router.next(&state);
        for _ in 0..10 {
            assert_eq!(router.next(&state), first);
        }
    }
}
