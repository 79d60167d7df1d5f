//! テキスト生成ツール（LLM CLI サブプロセス）
//!
//! # 責務
//!
//! - Claude Code CLI (`claude` コマンド) をサブプロセスとして呼び出す
//! - [`Tool`] トレイトを実装し、他のツールと同じ呼び出し面に載せる
//! - CLI固有のJSON出力形式を共通ペイロードに変換
//!
//! # CLIツール
//!
//! - **コマンド**: `claude`
//! - **インストール**: `npm install -g @anthropic-ai/claude-code`
//! - **認証方法**:
//!   1. 環境変数 `ANTHROPIC_API_KEY` を設定
//!   2. `claude` を起動して `/login` コマンドを実行
//!
//! # CLI出力形式
//!
//! JSON形式 (`--output-format json`):
//! ```json
//! {
//!   "response": "...",
//!   "metadata": {
//!     "model": "claude-sonnet-4-5",
//!     "tokens": {
//!       "input": 100,
//!       "output": 250
//!     }
//!   }
//! }
//! ```

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::process::Command;

use crate::state::{FailureCode, ToolFailure};
use crate::tool::traits::{ArgKind, ArgSchema, ArgSpec, Tool};

/// 生成ツールの名前
pub const GENERATE_TOOL: &str = "generate";

/// デフォルトのCLIコマンド名
const DEFAULT_COMMAND: &str = "claude";

/// デフォルトのモデル名
const DEFAULT_MODEL: &str = "claude-sonnet-4-5";

/// LLM CLI を呼び出すテキスト生成ツール
///
/// # 引数スキーマ
///
/// - `system_prompt` (string, 必須): システムプロンプト
/// - `prompt` (string, 必須): ユーザー入力
/// - `model` (string, 任意): 既定モデルの上書き
///
/// # ペイロード
///
/// `{content, model, input_tokens, output_tokens}`
///
/// # 失敗の分類
///
/// - コマンド起動失敗・認証エラー → [`FailureCode::Unreachable`]
/// - stderr にレート制限・429 → [`FailureCode::RateLimited`]
/// - JSON出力のパース失敗 → [`FailureCode::InvalidResponse`]
pub struct GenerateTool {
    /// 使用するCLIコマンド名（通常は "claude"）
    command: String,

    /// `model` 引数が省略されたときのモデル名
    model: String,
}

impl GenerateTool {
    /// 新しい生成ツールを生成
    ///
    /// CLIツール（`claude`）が利用可能である必要があります。
    pub fn new() -> Self {
        Self {
            command: DEFAULT_COMMAND.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// カスタムコマンド名とモデル名を指定して生成
    ///
    /// テストやカスタムインストール時に使用します。
    pub fn with_command(command: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            model: model.into(),
        }
    }

    /// CLIコマンドを実行してレスポンスを取得
    async fn execute_cli(&self, prompt: &str, model: &str) -> Result<CliResponse, ToolFailure> {
        let output = Command::new(&self.command)
            .arg("-p")
            .arg(prompt)
            .arg("--output-format")
            .arg("json")
            .arg("--model")
            .arg(model)
            .output()
            .await
            .map_err(|e| ToolFailure {
                code: FailureCode::Unreachable,
                detail: format!("CLIコマンド '{}' の起動に失敗: {}", self.command, e),
            })?;

        // 標準エラー出力をチェック（認証エラー等）
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            // レート制限を検出
            if stderr.contains("rate limit") || stderr.contains("429") {
                return Err(ToolFailure {
                    code: FailureCode::RateLimited,
                    detail: stderr.to_string(),
                });
            }

            // 認証エラーを含むその他の失敗は到達不能として扱う
            return Err(ToolFailure {
                code: FailureCode::Unreachable,
                detail: format!(
                    "Command failed with exit code {}: {}",
                    output.status.code().unwrap_or(-1),
                    stderr
                ),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);

        serde_json::from_str(&stdout).map_err(|e| ToolFailure {
            code: FailureCode::InvalidResponse,
            detail: format!("CLI JSON出力のパースに失敗: {}. 出力: {}", e, stdout),
        })
    }
}

impl Default for GenerateTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for GenerateTool {
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

    async fn invoke(&self, arguments: &Value) -> Result<Value, ToolFailure> {
        let system_prompt = arguments["system_prompt"].as_str().unwrap_or_default();
        let prompt = arguments["prompt"].as_str().unwrap_or_default();
        let model = arguments["model"].as_str().unwrap_or(&self.model);

        // プロンプトを結合（システムプロンプト + ユーザー入力）
        let full_prompt = format!("{}\n\n{}", system_prompt, prompt);

        let cli_response = self.execute_cli(&full_prompt, model).await?;

        Ok(json!({
            "content": cli_response.response,
            "model": cli_response.metadata.model,
            "input_tokens": cli_response.metadata.tokens.input,
            "output_tokens": cli_response.metadata.tokens.output,
        }))
    }
}

/// CLI のJSON出力形式
///
/// `claude -p "..." --output-format json` の出力形式を表現します。
#[derive(Debug, Deserialize)]
struct CliResponse {
    /// LLMが生成したレスポンステキスト
    response: String,

    /// メタデータ（モデル名、トークン情報等）
    metadata: CliMetadata,
}

/// CLI レスポンスのメタデータ
#[derive(Debug, Deserialize)]
struct CliMetadata {
    /// 使用されたモデル名
    model: String,

    /// トークン使用情報
    tokens: CliTokens,
}

/// CLI のトークン情報
#[derive(Debug, Deserialize)]
struct CliTokens {
    /// 入力トークン数
    input: u32,

    /// 出力トークン数
    output: u32,
}
