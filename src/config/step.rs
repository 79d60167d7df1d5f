//! ステップ仕様とロール定義
//!
//! # 責務
//!
//! - パイプラインを構成する各ステップの検証済み仕様 [`StepSpec`] を提供
//! - ステップの振る舞い実装を選択するロール [`StepRole`] を提供
//!
//! ロールはステップ「名」とは独立しています。同じロールを異なる名前で
//! 複数回パイプラインに載せることができます。

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use super::dto::StepSpecDto;

/// ツール呼び出し予算のデフォルト値
pub const DEFAULT_TOOL_BUDGET: u32 = 8;

/// ステップタイムアウトのデフォルト値（秒）
pub const DEFAULT_STEP_TIMEOUT_SECS: u64 = 300;

/// ステップのロール
///
/// パイプライン定義の `role` フィールドに対応し、
/// そのステップがどの組み込み実装で動くかを決めます。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepRole {
    /// 文献検索で入力ソースを補強する
    Research,
    /// ソースから概念と主張を抽出する
    Analyze,
    /// 仮説を生成する
    Generate,
    /// 生成された仮説を採点・検証する
    Critique,
}

impl StepRole {
    /// TOML の `role` 文字列からロールを解決
    pub fn parse(role: &str) -> Result<Self, ConfigError> {
        match role {
            "research" => Ok(Self::Research),
            "analyze" => Ok(Self::Analyze),
            "generate" => Ok(Self::Generate),
            "critique" => Ok(Self::Critique),
            other => Err(ConfigError::Validation(format!(
                "未知のロール: '{}'（有効: research, analyze, generate, critique）",
                other
            ))),
        }
    }

    /// TOML に書く文字列表現
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Research => "research",
            Self::Analyze => "analyze",
            Self::Generate => "generate",
            Self::Critique => "critique",
        }
    }
}

/// ステップ仕様（ドメインモデル）
///
/// バリデーション済みの1ステップ分の構成です。
/// タイムアウトはステップ実行全体（ツール呼び出し込み）に適用されます。
#[derive(Debug, Clone, PartialEq)]
pub struct StepSpec {
    /// ステップ名（パイプライン内で一意）
    pub name: String,

    /// ステップのロール
    pub role: StepRole,

    /// このステップに許可するツール名
    pub tools: Vec<String>,

    /// ステップ1回あたりのツール呼び出し予算
    pub tool_budget: u32,

    /// ステップ全体のタイムアウト
    pub timeout: Duration,
}

impl TryFrom<StepSpecDto> for StepSpec {
    type Error = ConfigError;

    fn try_from(dto: StepSpecDto) -> Result<Self, Self::Error> {
        if dto.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "ステップ名が空です".to_string(),
            ));
        }

        let timeout_secs = dto.timeout_secs.unwrap_or(DEFAULT_STEP_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(ConfigError::Validation(format!(
                "ステップ '{}' の timeout_secs は 1 以上が必要です",
                dto.name
            )));
        }

        Ok(Self {
            role: StepRole::parse(&dto.role)?,
            name: dto.name,
            tools: dto.tools.unwrap_or_default(),
            tool_budget: dto.tool_budget.unwrap_or(DEFAULT_TOOL_BUDGET),
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

impl From<&StepSpec> for StepSpecDto {
    fn from(spec: &StepSpec) -> Self {
        Self {
            name: spec.name.clone(),
            role: spec.role.as_str().to_string(),
            tools: if spec.tools.is_empty() {
                None
            } else {
                Some(spec.tools.clone())
            },
            tool_budget: Some(spec.tool_budget),
            timeout_secs: Some(spec.timeout.as_secs()),
        }
    }
}
