//! ツール呼び出しレイヤー
//!
//! # 責務
//!
//! - 登録済みツールの名前解決を行う [`ToolRegistry`]
//! - ステップ単位のスコープ付き呼び出し窓口 [`StepTools`]
//!   - 許可リストと呼び出し予算の強制
//!   - ディスパッチ前のスキーマ検証
//!   - 呼び出しごとのタイムアウト強制
//!   - 呼び出し記録（追記専用）の収集
//!
//! # 契約
//!
//! `invoke(tool_name, arguments) -> ToolResult` が唯一の境界です。
//! 不正な引数・未宣言ツール・予算超過はディスパッチされずに
//! [`ToolError`] として即座に失敗します。ディスパッチ後の失敗
//! （タイムアウト・通信不能・レート制限・不正応答）は `success=false` の
//! [`ToolResult`] として返され、リトライや縮退の判断はステップの選択です。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ToolError;
use crate::state::{FailureCode, ToolCallRecord, ToolResult};
use crate::tool::traits::Tool;

/// ツールレジストリ
///
/// ツール名から実装への解決を行います。パイプライン起動時に構築され、
/// 以後は読み取り専用で共有されます。
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<&'static str, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// 空のレジストリを生成
    pub fn new() -> Self {
        Self::default()
    }

    /// ツールを登録（同名の既存登録は置き換え）
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name(), tool);
    }

    /// 名前でツールを解決
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// 登録済みツール名の一覧（ソート済み）
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.tools.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

/// ステップ単位のツール呼び出し窓口
///
/// エンジンがステップ実行のたびに生成し、ステップの宣言
/// （許可ツール一覧と呼び出し予算）をスコープとして強制します。
/// ステップ内での並行呼び出し（`tokio::join!` 等）に対応するため、
/// すべてのメソッドは `&self` で呼び出せます。
pub struct StepTools {
    registry: Arc<ToolRegistry>,
    allowed: Vec<String>,
    budget: u32,
    used: AtomicU32,
    call_timeout: Duration,
    records: Mutex<Vec<ToolCallRecord>>,
}

impl StepTools {
    /// スコープ付き窓口を生成
    ///
    /// # 引数
    ///
    /// - `registry`: 共有ツールレジストリ
    /// - `allowed`: このステップが宣言した許可ツール一覧
    /// - `budget`: このステップ1回の実行あたりの呼び出し予算
    /// - `call_timeout`: 呼び出しごとのタイムアウト
    pub fn new(
        registry: Arc<ToolRegistry>,
        allowed: Vec<String>,
        budget: u32,
        call_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            allowed,
            budget,
            used: AtomicU32::new(0),
            call_timeout,
            records: Mutex::new(Vec::new()),
        }
    }

    /// ツールを呼び出す
    ///
    /// # 処理フロー
    ///
    /// 1. 許可リストの確認
    /// 2. 予算の確認と消費
    /// 3. レジストリでの名前解決
    /// 4. スキーマ検証（失敗時はディスパッチしない）
    /// 5. タイムアウト付きで実行し、結果を記録
    ///
    /// # 戻り値
    ///
    /// - `Ok(ToolResult)`: ディスパッチされた呼び出しの結果（失敗も含む）
    /// - `Err(ToolError)`: ディスパッチ前に拒否された場合
    pub async fn call(&self, tool_name: &str, arguments: Value) -> Result<ToolResult, ToolError> {
        if !self.allowed.iter().any(|name| name == tool_name) {
            return Err(ToolError::UnknownTool(tool_name.to_string()));
        }

        let used = self.used.fetch_add(1, Ordering::SeqCst);
        if used >= self.budget {
            self.used.fetch_sub(1, Ordering::SeqCst);
            return Err(ToolError::BudgetExhausted {
                used,
                budget: self.budget,
            });
        }

        let tool = self
            .registry
            .get(tool_name)
            .ok_or_else(|| ToolError::UnknownTool(tool_name.to_string()))?;

        tool.schema().validate(tool_name, &arguments)?;

        debug!(tool = tool_name, "ツールを呼び出します");
        let started = Instant::now();
        let result = match tokio::time::timeout(self.call_timeout, tool.invoke(&arguments)).await {
            Ok(Ok(payload)) => ToolResult::ok(payload, started.elapsed()),
            Ok(Err(failure)) => {
                warn!(
                    tool = tool_name,
                    code = failure.code.as_str(),
                    "ツール呼び出しが失敗しました: {}",
                    failure.detail
                );
                ToolResult {
                    success: false,
                    payload: Value::Null,
                    failure: Some(failure),
                    latency: started.elapsed(),
                }
            }
            Err(_) => {
                warn!(tool = tool_name, "ツール呼び出しがタイムアウトしました");
                ToolResult::failed(
                    FailureCode::Timeout,
                    format!(
                        "{}ミリ秒以内に応答がありませんでした",
                        self.call_timeout.as_millis()
                    ),
                    started.elapsed(),
                )
            }
        };

        let record = ToolCallRecord {
            tool: tool_name.to_string(),
            arguments,
            result: result.clone(),
        };
        self.records
            .lock()
            .expect("tool call records lock poisoned")
            .push(record);

        Ok(result)
    }

    /// 残り予算
    pub fn remaining_budget(&self) -> u32 {
        self.budget.saturating_sub(self.used.load(Ordering::SeqCst))
    }

    /// 収集した呼び出し記録を取り出す（ステップ終了時にエンジン/ステップが使用）
    pub fn take_records(&self) -> Vec<ToolCallRecord> {
        std::mem::take(
            &mut *self
                .records
                .lock()
                .expect("tool call records lock poisoned"),
        )
    }
}
