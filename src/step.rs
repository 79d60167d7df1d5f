//! ロール別ステップ実装
//!
//! # 責務
//!
//! - ステップの統一インターフェース [`StepUnit`] を提供
//! - ロールから実装を解決する [`StepRegistry`] を提供
//! - 4つの組み込みロール（research / analyze / generate / critique）の実装
//!
//! # アーキテクチャ
//!
//! ステップは正準状態を直接変更できません。状態のスナップショットを
//! 受け取り、差分 [`StateDelta`](crate::state::StateDelta) を
//! [`StepResult`](crate::state::StepResult) として返すだけです。
//! 差分の適用はエンジンが一元的に行います。
//!
//! ツールへのアクセスは [`StepTools`] 経由に限定され、許可リストと
//! 呼び出し予算はツールレイヤー側で強制されます。
//!
//! # モジュール構成
//!
//! - `research` - 文献検索による入力の補強
//! - `analyze` - ソースからの概念・主張抽出（ツール不使用）
//! - `generate` - 仮説の生成とテキストパース
//! - `critique` - 生成済み仮説の採点と検証

pub mod analyze;
pub mod critique;
pub mod generate;
pub mod research;

// 公開APIの再エクスポート
pub use analyze::AnalyzeStep;
pub use critique::CritiqueStep;
pub use generate::GenerateStep;
pub use research::ResearchStep;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::StepRole;
use crate::state::{StepResult, WorkflowState};
use crate::tool::StepTools;

/// ステップの統一インターフェース
///
/// 実装は状態のスナップショットを所有で受け取ります。これにより
/// エンジンはステップを独立タスクとして実行でき、ステップの障害
/// （パニック含む）を正準状態から隔離できます。
///
/// 失敗はパニックではなく、`delta.unrecoverable_error` を設定した
/// [`StepResult`] として表現してください。
#[async_trait]
pub trait StepUnit: Send + Sync {
    /// このステップ実装が担うロール
    fn role(&self) -> StepRole;

    /// ステップを1回実行する
    ///
    /// # 引数
    ///
    /// - `state`: 実行時点の状態のスナップショット
    /// - `tools`: このステップ用に構成されたツール呼び出し面
    async fn run(&self, state: WorkflowState, tools: Arc<StepTools>) -> StepResult;
}

/// ロールからステップ実装を解決するレジストリ
#[derive(Default)]
pub struct StepRegistry {
    units: Vec<Arc<dyn StepUnit>>,
}

impl StepRegistry {
    /// 空のレジストリを生成
    pub fn new() -> Self {
        Self::default()
    }

    /// 4つの組み込みロールを登録したレジストリを生成
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ResearchStep));
        registry.register(Arc::new(AnalyzeStep));
        registry.register(Arc::new(GenerateStep));
        registry.register(Arc::new(CritiqueStep));
        registry
    }

    /// ステップ実装を登録する
    ///
    /// 同じロールが既に登録済みの場合は置き換えます（テストでの
    /// 差し替え用）。
    pub fn register(&mut self, unit: Arc<dyn StepUnit>) {
        self.units.retain(|u| u.role() != unit.role());
        self.units.push(unit);
    }

    /// ロールで実装を引く
    pub fn get(&self, role: StepRole) -> Option<Arc<dyn StepUnit>> {
        self.units.iter().find(|u| u.role() == role).cloned()
    }
}
