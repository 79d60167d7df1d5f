//! パイプライン定義の読み込みと管理を行うモジュール
//!
//! # 責務
//!
//! このモジュールは、ロールパイプラインを TOML 形式で定義し、
//! それを Rust の型として扱うための機能を提供します。
//!
//! ## 主な機能
//!
//! - **TOML パース**: パイプライン定義ファイルを読み込み、
//!   [`Pipeline`] 構造体にデシリアライズ
//! - **整合性検証**: エントリステップの存在、ルートの参照先、
//!   行き止まりステップの検出
//! - **組み込み定義**: standard / agentic の2つのパイプラインを同梱
//!
//! ## 設計思想
//!
//! - **宣言的定義**: 手続き的なコードではなく、TOML による宣言的な定義で
//!   パイプラインを記述可能にする
//! - **決定的ルーティング**: 規則は定義順に評価され、同じ状態からは
//!   常に同じ遷移が選ばれる
//!
//! ## 使用例
//!
//! ```toml
//! [pipeline]
//! name = "agentic"
//! entry = "research"
//! max_iterations = 10
//! fallback_terminal = true
//!
//! [[steps]]
//! name = "research"
//! role = "research"
//! tools = ["arxiv_search", "semantic_scholar_search"]
//! tool_budget = 6
//!
//! [[steps]]
//! name = "analyze"
//! role = "analyze"
//!
//! [[routes]]
//! after = "research"
//! to = "analyze"
//! ```
//!
//! ## 関連モジュール
//!
//! - [`crate::config::step`]: 各ステップの定義
//! - [`crate::router`]: ルーティング規則の評価
//! - [`crate::engine`]: パイプラインの実行エンジン

use std::collections::HashSet;
use std::path::Path;

use crate::error::ConfigError;
use super::dto::{PipelineDto, PipelineMetadataDto, RouteRuleDto};
use super::step::StepSpec;

/// 反復回数上限のデフォルト値
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// 組み込みの standard パイプライン定義
const STANDARD_TOML: &str = r#"
[pipeline]
name = "standard"
description = "ソース解析と仮説生成のみの短縮パイプライン"
entry = "analyze"
max_iterations = 6
fallback_terminal = true

[[steps]]
name = "analyze"
role = "analyze"

[[steps]]
name = "generate"
role = "generate"
tools = ["generate"]
tool_budget = 2
timeout_secs = 180

[[routes]]
after = "analyze"
to = "generate"
"#;

/// 組み込みの agentic パイプライン定義
const AGENTIC_TOML: &str = r#"
[pipeline]
name = "agentic"
description = "文献調査と批評検証を含む4ステップのパイプライン"
entry = "research"
max_iterations = 10
fallback_terminal = true

[[steps]]
name = "research"
role = "research"
tools = ["arxiv_search", "semantic_scholar_search"]
tool_budget = 6
timeout_secs = 120

[[steps]]
name = "analyze"
role = "analyze"

[[steps]]
name = "generate"
role = "generate"
tools = ["generate"]
tool_budget = 2
timeout_secs = 180

[[steps]]
name = "critique"
role = "critique"
tools = ["testability_score", "novelty_check", "semantic_scholar_search"]
tool_budget = 12
timeout_secs = 120

[[routes]]
after = "research"
to = "analyze"

[[routes]]
after = "analyze"
to = "generate"

[[routes]]
after = "generate"
to = "critique"
"#;

/// 組み込みパイプラインの種別
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineMode {
    /// analyze → generate の2ステップ
    Standard,
    /// research → analyze → generate → critique の4ステップ
    Agentic,
}

impl PipelineMode {
    /// CLI 引数等の文字列から種別を解決
    pub fn parse(mode: &str) -> Result<Self, ConfigError> {
        match mode {
            "standard" => Ok(Self::Standard),
            "agentic" => Ok(Self::Agentic),
            other => Err(ConfigError::Validation(format!(
                "未知のパイプライン種別: '{}'（有効: standard, agentic）",
                other
            ))),
        }
    }
}

/// ルーティング規則（ドメインモデル）
///
/// 「ステップ `after` が完了したら次は `to`」を表します。
/// 規則は定義順に評価され、最初に一致したものが使われます。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRule {
    /// 直前に完了したステップ名
    pub after: String,

    /// 次に実行するステップ名
    pub to: String,
}

/// パイプライン定義（ドメインモデル）
///
/// バリデーション済みの状態を保証します。
///
/// ## DTO との違い
///
/// - `PipelineDto`: TOML デシリアライズ専用、バリデーション前の生データ
/// - [`Pipeline`]: バリデーション済み、参照整合性が保証されている
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    /// パイプライン名
    pub name: String,

    /// 説明
    pub description: Option<String>,

    /// 最初に実行するステップ名
    pub entry: String,

    /// 反復回数の上限
    pub max_iterations: u32,

    /// 出ていくルートのないステップを終端として扱うか
    pub fallback_terminal: bool,

    /// ステップ仕様の配列
    pub steps: Vec<StepSpec>,

    /// ルーティング規則の配列（評価順）
    pub routes: Vec<RouteRule>,
}

impl Pipeline {
    /// TOML ファイルからパイプラインを読み込む
    ///
    /// # 処理フロー
    ///
    /// 1. ファイル読み込み
    /// 2. TOML デシリアライズ → `PipelineDto`
    /// 3. バリデーション & 変換 → [`Pipeline`]
    ///
    /// # 引数
    ///
    /// * `path` - TOML ファイルのパス
    ///
    /// # 戻り値
    ///
    /// * `Ok(Pipeline)` - 読み込みに成功した場合
    /// * `Err(ConfigError)` - 読み込み・パース・検証に失敗した場合
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    /// TOML 文字列からパイプラインを読み込む
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let dto: PipelineDto = toml::from_str(raw)?;
        Self::try_from(dto)
    }

    /// 組み込みパイプラインを構築
    ///
    /// 組み込み定義も外部ファイルと同じパース・検証経路を通ります。
    pub fn builtin(mode: PipelineMode) -> Result<Self, ConfigError> {
        match mode {
            PipelineMode::Standard => Self::from_toml(STANDARD_TOML),
            PipelineMode::Agentic => Self::from_toml(AGENTIC_TOML),
        }
    }

    /// パイプラインを TOML 文字列に変換
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        let dto = PipelineDto::from(self);
        Ok(toml::to_string(&dto)?)
    }

    /// 名前でステップ仕様を引く
    pub fn step(&self, name: &str) -> Option<&StepSpec> {
        self.steps.iter().find(|s| s.name == name)
    }
}

/// DTO からドメインモデルへの変換（読み込み方向）
///
/// バリデーションを実施し、不正なデータの場合は [`ConfigError`] を返します。
///
/// # 検証項目
///
/// 1. ステップが1つ以上あり、名前が一意であること
/// 2. エントリステップが存在すること
/// 3. すべてのルートの `after` / `to` が既存ステップを指すこと
/// 4. `fallback_terminal = false` のとき、全ステップに出ていくルートが
///    あること（ないステップは [`ConfigError::RouterDeadlock`]）
impl TryFrom<PipelineDto> for Pipeline {
    type Error = ConfigError;

    fn try_from(dto: PipelineDto) -> Result<Self, Self::Error> {
        if dto.steps.is_empty() {
            return Err(ConfigError::Validation(
                "ステップが1つも定義されていません".to_string(),
            ));
        }

        let steps: Vec<StepSpec> = dto
            .steps
            .into_iter()
            .map(StepSpec::try_from)
            .collect::<Result<_, _>>()?;

        let mut names = HashSet::new();
        for step in &steps {
            if !names.insert(step.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "ステップ名が重複しています: '{}'",
                    step.name
                )));
            }
        }

        if !names.contains(dto.pipeline.entry.as_str()) {
            return Err(ConfigError::Validation(format!(
                "エントリステップ '{}' が定義されていません",
                dto.pipeline.entry
            )));
        }

        let routes: Vec<RouteRule> = dto
            .routes
            .into_iter()
            .map(|r| RouteRule {
                after: r.after,
                to: r.to,
            })
            .collect();

        for route in &routes {
            for endpoint in [&route.after, &route.to] {
                if !names.contains(endpoint.as_str()) {
                    return Err(ConfigError::Validation(format!(
                        "ルートが未定義のステップ '{}' を参照しています",
                        endpoint
                    )));
                }
            }
        }

        let fallback_terminal = dto.pipeline.fallback_terminal.unwrap_or(false);
        if !fallback_terminal {
            // 出ていくルートのないステップは永遠に終端に到達できない
            for step in &steps {
                if !routes.iter().any(|r| r.after == step.name) {
                    return Err(ConfigError::RouterDeadlock {
                        step: step.name.clone(),
                    });
                }
            }
        }

        let max_iterations = dto.pipeline.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS);
        if max_iterations == 0 {
            return Err(ConfigError::Validation(
                "max_iterations は 1 以上が必要です".to_string(),
            ));
        }

        Ok(Self {
            name: dto.pipeline.name,
            description: dto.pipeline.description,
            entry: dto.pipeline.entry,
            max_iterations,
            fallback_terminal,
            steps,
            routes,
        })
    }
}

/// ドメインモデルから DTO への変換（書き込み方向）
///
/// バリデーション済みのドメインモデルから DTO を生成するため、
/// この変換は失敗しません。
impl From<&Pipeline> for PipelineDto {
    fn from(pipeline: &Pipeline) -> Self {
        Self {
            pipeline: PipelineMetadataDto {
                name: pipeline.name.clone(),
                description: pipeline.description.clone(),
                entry: pipeline.entry.clone(),
                max_iterations: Some(pipeline.max_iterations),
                fallback_terminal: Some(pipeline.fallback_terminal),
            },
            steps: pipeline.steps.iter().map(Into::into).collect(),
            routes: pipeline
                .routes
                .iter()
                .map(|r| RouteRuleDto {
                    after: r.after.clone(),
                    to: r.to.clone(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::step::StepRole;

    #[test]
    fn test_builtin_standard() {
        let pipeline = Pipeline::builtin(PipelineMode::Standard).unwrap();
        assert_eq!(pipeline.name, "standard");
        assert_eq!(pipeline.entry, "analyze");
        assert_eq!(pipeline.steps.len(), 2);
        assert_eq!(pipeline.routes.len(), 1);
        assert!(pipeline.fallback_terminal);
    }

    #[test]
    fn test_builtin_agentic() {
        let pipeline = Pipeline::builtin(PipelineMode::Agentic).unwrap();
        assert_eq!(pipeline.entry, "research");
        assert_eq!(pipeline.steps.len(), 4);
        assert_eq!(pipeline.step("critique").unwrap().role, StepRole::Critique);
        assert_eq!(pipeline.step("research").unwrap().tools.len(), 2);
    }

    #[test]
    fn test_from_toml_rejects_unknown_entry() {
        let raw = r#"
[pipeline]
name = "p"
entry = "missing"
fallback_terminal = true

[[steps]]
name = "analyze"
role = "analyze"
"#;
        let err = Pipeline::from_toml(raw).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_from_toml_rejects_duplicate_step_names() {
        let raw = r#"
[pipeline]
name = "p"
entry = "analyze"
fallback_terminal = true

[[steps]]
name = "analyze"
role = "analyze"

[[steps]]
name = "analyze"
role = "generate"
"#;
        let err = Pipeline::from_toml(raw).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_from_toml_rejects_route_to_unknown_step() {
        let raw = r#"
[pipeline]
name = "p"
entry = "analyze"
fallback_terminal = true

[[steps]]
name = "analyze"
role = "analyze"

[[routes]]
after = "analyze"
to = "ghost"
"#;
        let err = Pipeline::from_toml(raw).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_deadlock_without_fallback_terminal() {
        let raw = r#"
[pipeline]
name = "p"
entry = "analyze"

[[steps]]
name = "analyze"
role = "analyze"
"#;
        let err = Pipeline::from_toml(raw).unwrap_err();
        match err {
            ConfigError::RouterDeadlock { step } => assert_eq!(step, "analyze"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_toml_roundtrip() {
        let pipeline = Pipeline::builtin(PipelineMode::Agentic).unwrap();
        let raw = pipeline.to_toml().unwrap();
        let reparsed = Pipeline::from_toml(&raw).unwrap();
        assert_eq!(pipeline, reparsed);
    }

    #[test]
    fn test_zero_max_iterations_rejected() {
        let raw = r#"
[pipeline]
name = "p"
entry = "analyze"
max_iterations = 0
fallback_terminal = true

[[steps]]
name = "analyze"
role = "analyze"
"#;
        let err = Pipeline::from_toml(raw).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }
}
