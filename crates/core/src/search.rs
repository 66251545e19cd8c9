//! Search backends.
//!
//! A backend maps a query to a list of raw hits. The retrieval engine does
//! not distinguish "nothing found" from "backend unreachable", so errors
//! returned here are logged and replaced by an empty list upstream.

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use tracing::debug;

/// A raw snippet returned by a search backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub text: String,
    pub source: Option<String>,
    pub created_at: Option<String>,
}

impl SearchHit {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_created_at(mut self, created_at: impl Into<String>) -> Self {
        self.created_at = Some(created_at.into());
        self
    }
}

#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    async fn search(
        &self,
        query: &str,
        limit: usize,
        sort_hint: Option<&str>,
    ) -> Result<Vec<SearchHit>>;
}

/// Which search tool an MCP server exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchTool {
    /// Curated guides, `semantic_search` with a language argument.
    SemanticSearch,
    /// The knowledge feed, plain `search`.
    Search,
}

impl SearchTool {
    fn tool_name(&self) -> &'static str {
        match self {
            SearchTool::SemanticSearch => "semantic_search",
            SearchTool::Search => "search",
        }
    }
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'static str,
    params: ToolCall<'a>,
    id: u64,
}

#[derive(Serialize)]
struct ToolCall<'a> {
    name: &'a str,
    arguments: Value,
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<ToolResult>,
    error: Option<Value>,
}

#[derive(Deserialize)]
struct ToolResult {
    #[serde(default)]
    content: Vec<ContentItem>,
}

#[derive(Deserialize)]
struct ContentItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

/// JSON-RPC client for an MCP search server (`tools/call`).
pub struct McpSearchClient {
    http: reqwest::Client,
    url: String,
    name: String,
    tool: SearchTool,
    lang: String,
    next_id: AtomicU64,
}

impl McpSearchClient {
    pub fn new(url: impl Into<String>, name: impl Into<String>, tool: SearchTool) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
            name: name.into(),
            tool,
            lang: "ru".to_string(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Client for the curated guides server.
    pub fn guides(url: impl Into<String>) -> Self {
        Self::new(url, "guides", SearchTool::SemanticSearch)
    }

    /// Client for the knowledge feed server.
    pub fn knowledge(url: impl Into<String>) -> Self {
        Self::new(url, "knowledge", SearchTool::Search)
    }

    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    fn arguments(&self, query: &str, limit: usize, sort_hint: Option<&str>) -> Value {
        let mut args = Map::new();
        args.insert("query".into(), json!(query));
        args.insert("limit".into(), json!(limit));
        if self.tool == SearchTool::SemanticSearch {
            args.insert("lang".into(), json!(self.lang));
        }
        if let Some(sort) = sort_hint {
            args.insert("sort".into(), json!(sort));
        }
        Value::Object(args)
    }

    async fn call(&self, arguments: Value) -> Result<ToolResult> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            method: "tools/call",
            params: ToolCall {
                name: self.tool.tool_name(),
                arguments,
            },
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };

        let response = self
            .http
            .post(&self.url)
            .json(&request)
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .with_context(|| format!("{} request failed", self.name))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("{} returned {status}: {body}", self.name);
        }

        let body: RpcResponse = response
            .json()
            .await
            .with_context(|| format!("{} returned malformed JSON-RPC", self.name))?;

        if let Some(error) = body.error {
            return Err(anyhow!("{} error: {error}", self.name));
        }
        body.result
            .with_context(|| format!("{} response had no result", self.name))
    }
}

#[async_trait]
impl SearchBackend for McpSearchClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
        sort_hint: Option<&str>,
    ) -> Result<Vec<SearchHit>> {
        let result = self.call(self.arguments(query, limit, sort_hint)).await?;
        let Some(item) = result.content.iter().find(|c| c.kind == "text") else {
            return Ok(Vec::new());
        };

        let mut hits = parse_hits(&item.text);
        if sort_hint.is_some_and(|s| s.ends_with("desc")) {
            hits.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        }
        debug!(backend = %self.name, query, hits = hits.len(), "Search complete");
        Ok(hits)
    }
}

/// Parses the text payload of a tool result.
///
/// The payload is usually a JSON array of objects, sometimes a single object
/// or a list of strings; anything that is not JSON becomes one hit.
pub fn parse_hits(payload: &str) -> Vec<SearchHit> {
    match serde_json::from_str::<Value>(payload) {
        Ok(Value::Array(items)) => items.iter().filter_map(hit_from_value).collect(),
        Ok(value @ Value::Object(_)) => hit_from_value(&value).into_iter().collect(),
        Ok(_) | Err(_) => {
            if payload.trim().is_empty() {
                Vec::new()
            } else {
                vec![SearchHit::new(payload)]
            }
        }
    }
}

const TEXT_KEYS: &[&str] = &["text", "content", "snippet"];
const SOURCE_KEYS: &[&str] = &[
    "source",
    "guide",
    "guide_title",
    "guide_slug",
    "section",
    "section_title",
    "title",
    "name",
    "url",
];
const DATE_KEYS: &[&str] = &["created_at", "date", "published_at"];

fn first_str(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| obj.get(*k).and_then(Value::as_str))
        .find(|s| !s.trim().is_empty())
        .map(str::to_string)
}

fn hit_from_value(value: &Value) -> Option<SearchHit> {
    match value {
        Value::String(text) => Some(SearchHit::new(text.clone())),
        Value::Object(obj) => {
            let text = first_str(obj, TEXT_KEYS)?;
            Some(SearchHit {
                source: first_str(obj, SOURCE_KEYS),
                created_at: first_str(obj, DATE_KEYS),
                text,
            })
        }
        _ => None,
    }
}
