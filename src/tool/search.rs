//! 学術検索ツール
//!
//! # 責務
//!
//! - Semantic Scholar Graph API を呼び出す [`SemanticScholarTool`]
//! - ArXiv export API を呼び出す [`ArxivSearchTool`]
//!
//! いずれも HTTP の失敗を構造化コードに変換して返します。
//! HTTP 429 は [`FailureCode::RateLimited`] として区別され、
//! 呼び出し側のステップがバックオフやスキップを選択できます。
//!
//! # ArXiv のレスポンスについて
//!
//! ArXiv は Atom XML を返します。使用するのは entry ごとの title / summary /
//! id / published の4フィールドだけなので、XML クレートを追加せず
//! タグ単位の簡易抽出で処理しています。

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::state::{FailureCode, ToolFailure};
use crate::tool::traits::{ArgKind, ArgSchema, ArgSpec, Tool};

/// Semantic Scholar 検索ツールの名前
pub const SEMANTIC_SCHOLAR_TOOL: &str = "semantic_scholar_search";

/// ArXiv 検索ツールの名前
pub const ARXIV_TOOL: &str = "arxiv_search";

/// デフォルトの取得件数
const DEFAULT_LIMIT: u64 = 5;

/// アブストラクトの切り詰め長（文字数）
const ABSTRACT_MAX_CHARS: usize = 500;

/// reqwest のエラーを構造化コードに変換
fn map_transport_error(err: &reqwest::Error) -> ToolFailure {
    let code = if err.is_timeout() {
        FailureCode::Timeout
    } else {
        FailureCode::Unreachable
    };
    ToolFailure {
        code,
        detail: err.to_string(),
    }
}

/// HTTP ステータスを確認し、異常なら構造化コードに変換
fn check_status(status: reqwest::StatusCode) -> Result<(), ToolFailure> {
    if status.as_u16() == 429 {
        return Err(ToolFailure {
            code: FailureCode::RateLimited,
            detail: "HTTP 429 Too Many Requests".to_string(),
        });
    }
    if !status.is_success() {
        return Err(ToolFailure {
            code: FailureCode::Unreachable,
            detail: format!("HTTP {}", status),
        });
    }
    Ok(())
}

/// 文字数で切り詰め（マルチバイト安全）
fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}

/// Semantic Scholar 検索ツール
///
/// 引用数付きの論文メタデータを検索します。
///
/// # 引数スキーマ
///
/// - `query` (string, 必須): 検索クエリ
/// - `limit` (integer, 任意): 最大取得件数（デフォルト 5）
///
/// # ペイロード
///
/// `{title, abstract, authors, year, citations, influential_citations, url}`
/// の配列。
pub struct SemanticScholarTool {
    client: reqwest::Client,
    base_url: String,
}

impl SemanticScholarTool {
    /// デフォルトのエンドポイントでツールを生成
    pub fn new() -> Self {
        Self::with_base_url("https://api.semanticscholar.org/graph/v1/paper/search")
    }

    /// エンドポイントを指定してツールを生成（テスト用）
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

impl Default for SemanticScholarTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for SemanticScholarTool {
    fn name(&self) -> &'static str {
        SEMANTIC_SCHOLAR_TOOL
    }

    fn schema(&self) -> ArgSchema {
        ArgSchema::new(vec![
            ArgSpec::required("query", ArgKind::String),
            ArgSpec::optional("limit", ArgKind::Integer),
        ])
    }

    async fn invoke(&self, arguments: &Value) -> Result<Value, ToolFailure> {
        let query = arguments["query"].as_str().unwrap_or_default();
        let limit = arguments["limit"].as_u64().unwrap_or(DEFAULT_LIMIT);

        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("query", query),
                ("limit", &limit.to_string()),
                (
                    "fields",
                    "title,abstract,authors,year,citationCount,influentialCitationCount,url",
                ),
            ])
            .send()
            .await
            .map_err(|e| map_transport_error(&e))?;

        check_status(response.status())?;

        let body: Value = response.json().await.map_err(|e| ToolFailure {
            code: FailureCode::InvalidResponse,
            detail: format!("JSON のパースに失敗しました: {}", e),
        })?;

        let papers = body["data"].as_array().cloned().unwrap_or_default();
        let results: Vec<Value> = papers
            .iter()
            .map(|paper| {
                let authors: Vec<String> = paper["authors"]
                    .as_array()
                    .map(|list| {
                        list.iter()
                            .filter_map(|a| a["name"].as_str().map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default();
                json!({
                    "title": paper["title"].as_str().unwrap_or_default(),
                    "abstract": truncate_chars(
                        paper["abstract"].as_str().unwrap_or_default(),
                        ABSTRACT_MAX_CHARS,
                    ),
                    "authors": authors,
                    "year": paper["year"],
                    "citations": paper["citationCount"].as_u64().unwrap_or(0),
                    "influential_citations": paper["influentialCitationCount"].as_u64().unwrap_or(0),
                    "url": paper["url"].as_str().unwrap_or_default(),
                })
            })
            .collect();

        Ok(json!(results))
    }
}

/// ArXiv 検索ツール
///
/// # 引数スキーマ
///
/// - `query` (string, 必須): 検索クエリ
/// - `max_results` (integer, 任意): 最大取得件数（デフォルト 5）
///
/// # ペイロード
///
/// `{title, abstract, url, published}` の配列。
pub struct ArxivSearchTool {
    client: reqwest::Client,
    base_url: String,
}

impl ArxivSearchTool {
    /// デフォルトのエンドポイントでツールを生成
    pub fn new() -> Self {
        Self::with_base_url("https://export.arxiv.org/api/query")
    }

    /// エンドポイントを指定してツールを生成（テスト用）
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

impl Default for ArxivSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for ArxivSearchTool {
    fn name(&self) -> &'static str {
        ARXIV_TOOL
    }

    fn schema(&self) -> ArgSchema {
        ArgSchema::new(vec![
            ArgSpec::required("query", ArgKind::String),
            ArgSpec::optional("max_results", ArgKind::Integer),
        ])
    }

    async fn invoke(&self, arguments: &Value) -> Result<Value, ToolFailure> {
        let query = arguments["query"].as_str().unwrap_or_default();
        let max_results = arguments["max_results"].as_u64().unwrap_or(DEFAULT_LIMIT);

        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("search_query", format!("all:{}", query)),
                ("max_results", max_results.to_string()),
            ])
            .send()
            .await
            .map_err(|e| map_transport_error(&e))?;

        check_status(response.status())?;

        let body = response.text().await.map_err(|e| ToolFailure {
            code: FailureCode::InvalidResponse,
            detail: format!("本文の読み込みに失敗しました: {}", e),
        })?;

        Ok(json!(parse_atom_entries(&body)))
    }
}

/// Atom フィードから entry ブロックを抽出し、使用フィールドだけを取り出す
fn parse_atom_entries(body: &str) -> Vec<Value> {
    extract_blocks(body, "entry")
        .iter()
        .map(|entry| {
            json!({
                "title": extract_tag(entry, "title").unwrap_or_default(),
                "abstract": truncate_chars(
                    &extract_tag(entry, "summary").unwrap_or_default(),
                    ABSTRACT_MAX_CHARS,
                ),
                "url": extract_tag(entry, "id").unwrap_or_default(),
                "published": extract_tag(entry, "published").unwrap_or_default(),
            })
        })
        .collect()
}

/// `<tag>...</tag>` のブロックをすべて抽出
fn extract_blocks(text: &str, tag: &str) -> Vec<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let mut blocks = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find(&open) {
        let after_open = &rest[start + open.len()..];
        let Some(end) = after_open.find(&close) else {
            break;
        };
        blocks.push(after_open[..end].to_string());
        rest = &after_open[end + close.len()..];
    }

    blocks
}

/// ブロック内の最初の `<tag>` の内容を取り出す（空白を正規化）
fn extract_tag(block: &str, tag: &str) -> Option<String> {
    let content = extract_blocks(block, tag).into_iter().next()?;
    Some(content.split_whitespace().collect::<Vec<_>>().join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ATOM_SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>ArXiv Query Results</title>
  <entry>
    <id>http://arxiv.org/abs/1234.5678</id>
    <published>2021-06-01T00:00:00Z</published>
    <title>Sparse Attention
      for Long Documents</title>
    <summary>We propose a sparse attention
      mechanism that reduces cost.</summary>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2345.6789</id>
    <published>2022-01-15T00:00:00Z</published>
    <title>Another Paper</title>
    <summary>Second abstract.</summary>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_atom_entries() {
        let entries = parse_atom_entries(ATOM_SAMPLE);
        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries[0]["title"].as_str().unwrap(),
            "Sparse Attention for Long Documents"
        );
        assert_eq!(
            entries[0]["abstract"].as_str().unwrap(),
            "We propose a sparse attention mechanism that reduces cost."
        );
        assert_eq!(
            entries[0]["url"].as_str().unwrap(),
            "http://arxiv.org/abs/1234.5678"
        );
        assert_eq!(entries[1]["title"].as_str().unwrap(), "Another Paper");
    }

    #[test]
    fn test_parse_atom_entries_empty_feed() {
        let entries = parse_atom_entries("<feed><title>empty</title></feed>");
        assert!(entries.is_empty());
    }

    #[test]
    fn test_extract_blocks_unclosed_tag() {
        // 閉じタグのないブロックは無視される
        let blocks = extract_blocks("<entry>incomplete", "entry");
        assert!(blocks.is_empty());
    }

    #[test]
    fn test_truncate_chars_multibyte_safe() {
        assert_eq!(truncate_chars("短いテキスト", 100), "短いテキスト");
        assert_eq!(truncate_chars("あいうえお", 3), "あいう");
    }

    #[test]
    fn test_check_status_rate_limited() {
        let failure = check_status(reqwest::StatusCode::TOO_MANY_REQUESTS).unwrap_err();
        assert_eq!(failure.code, FailureCode::RateLimited);
    }

    #[test]
    fn test_check_status_server_error_is_unreachable() {
        let failure = check_status(reqwest::StatusCode::INTERNAL_SERVER_ERROR).unwrap_err();
        assert_eq!(failure.code, FailureCode::Unreachable);
    }

    #[test]
    fn test_check_status_ok() {
        assert!(check_status(reqwest::StatusCode::OK).is_ok());
    }

    #[test]
    fn test_schemas_declare_query() {
        let tool = SemanticScholarTool::new();
        assert!(
            tool.schema()
                .validate(tool.name(), &serde_json::json!({"query": "x"}))
                .is_ok()
        );

        let tool = ArxivSearchTool::new();
        assert!(
            tool.schema()
                .validate(tool.name(), &serde_json::json!({"query": "x", "max_results": 3}))
                .is_ok()
        );
    }
}
