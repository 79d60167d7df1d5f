//! ツールの共通インターフェース定義
//!
//! # 責務
//!
//! - 外部能力（検索・検証・生成）の共通トレイト [`Tool`] を定義
//! - ツールごとの引数スキーマ [`ArgSchema`] とその検証を提供
//!
//! # 契約
//!
//! ツール実装はディスパッチ後の失敗（通信不能・レート制限・不正応答）を
//! `Err(ToolFailure)` として返します。例外的な伝播はしません。
//! タイムアウトの強制と [`ToolResult`](crate::state::ToolResult) への包み込みは
//! 呼び出し側の [`StepTools`](crate::tool::invoker::StepTools) が担当します。

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ToolError;
use crate::state::ToolFailure;

/// 引数の型種別
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// 文字列
    String,
    /// 整数
    Integer,
    /// 数値（整数または浮動小数点）
    Number,
    /// 配列
    Array,
}

impl ArgKind {
    fn matches(&self, value: &Value) -> bool {
        match self {
            ArgKind::String => value.is_string(),
            ArgKind::Integer => value.is_i64() || value.is_u64(),
            ArgKind::Number => value.is_number(),
            ArgKind::Array => value.is_array(),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ArgKind::String => "string",
            ArgKind::Integer => "integer",
            ArgKind::Number => "number",
            ArgKind::Array => "array",
        }
    }
}

/// 1引数の宣言
#[derive(Debug, Clone, Copy)]
pub struct ArgSpec {
    /// 引数名
    pub name: &'static str,

    /// 型種別
    pub kind: ArgKind,

    /// 必須かどうか
    pub required: bool,
}

impl ArgSpec {
    /// 必須引数の宣言を生成
    pub const fn required(name: &'static str, kind: ArgKind) -> Self {
        Self {
            name,
            kind,
            required: true,
        }
    }

    /// 任意引数の宣言を生成
    pub const fn optional(name: &'static str, kind: ArgKind) -> Self {
        Self {
            name,
            kind,
            required: false,
        }
    }
}

/// ツールの引数スキーマ
///
/// ディスパッチ前に引数オブジェクトを検証します。
/// 必須引数の欠落・型不一致・未宣言キーはいずれも拒否されます。
#[derive(Debug, Clone)]
pub struct ArgSchema {
    args: Vec<ArgSpec>,
}

impl ArgSchema {
    /// スキーマを生成
    pub fn new(args: Vec<ArgSpec>) -> Self {
        Self { args }
    }

    /// 引数オブジェクトをスキーマに対して検証
    ///
    /// # 引数
    ///
    /// - `tool`: エラーメッセージに含めるツール名
    /// - `arguments`: 検証対象の引数（JSON オブジェクトであること）
    ///
    /// # 戻り値
    ///
    /// - `Ok(())`: 検証成功
    /// - `Err(ToolError::Validation)`: 検証失敗（ディスパッチされません）
    pub fn validate(&self, tool: &str, arguments: &Value) -> Result<(), ToolError> {
        let Some(object) = arguments.as_object() else {
            return Err(ToolError::Validation {
                tool: tool.to_string(),
                reason: "引数は JSON オブジェクトである必要があります".to_string(),
            });
        };

        for spec in &self.args {
            match object.get(spec.name) {
                Some(value) => {
                    if !spec.kind.matches(value) {
                        return Err(ToolError::Validation {
                            tool: tool.to_string(),
                            reason: format!(
                                "引数 '{}' の型が不正です（期待: {}）",
                                spec.name,
                                spec.kind.label()
                            ),
                        });
                    }
                }
                None if spec.required => {
                    return Err(ToolError::Validation {
                        tool: tool.to_string(),
                        reason: format!("必須引数 '{}' がありません", spec.name),
                    });
                }
                None => {}
            }
        }

        for key in object.keys() {
            if !self.args.iter().any(|spec| spec.name == key) {
                return Err(ToolError::Validation {
                    tool: tool.to_string(),
                    reason: format!("未宣言の引数 '{}' が指定されました", key),
                });
            }
        }

        Ok(())
    }
}

/// 外部能力の共通インターフェース
///
/// このトレイトを実装することで、任意の外部能力（検索 API・統計的検証・
/// 生成モデル呼び出し）を統一された呼び出し/結果契約の背後に置けます。
/// ステップがプロバイダを直接呼ぶことはなく、必ずこの境界を通ります。
///
/// # 実装要件
///
/// - `Send + Sync`: マルチスレッド環境で安全に使用可能
/// - 非同期実行対応（`async_trait` を使用）
/// - 失敗は `Err(ToolFailure)` で返し、パニックさせないこと
#[async_trait]
pub trait Tool: Send + Sync {
    /// ツール名（レジストリのキーになります）
    fn name(&self) -> &'static str;

    /// 宣言済みの引数スキーマ
    fn schema(&self) -> ArgSchema;

    /// 検証済み引数でツール本体を実行
    ///
    /// # 引数
    ///
    /// - `arguments`: スキーマ検証を通過した引数オブジェクト
    ///
    /// # 戻り値
    ///
    /// - `Ok(Value)`: 結果ペイロード
    /// - `Err(ToolFailure)`: 構造化コード付きの失敗
    async fn invoke(&self, arguments: &Value) -> Result<Value, ToolFailure>;
}
