use crate::error::ToolError;
use crate::tools::{ToolContext, ToolHandler};
use anyhow::Result;
use async_trait::async_trait;
use docchat_realtime_types::tools::Tool;
#[cfg(test)]
use mockall::automock;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;

pub const QUERY_DOCUMENTS_TOOL: &str = "query_documents";
pub const DEFAULT_TOP_K: usize = 3;
pub const DEFAULT_EXCERPT_CHARS: usize = 1000;

const NO_RESULTS: &str = "No relevant passages were found in the uploaded documents.";

/// One ranked hit from the knowledge base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Passage {
    pub text: String,
    #[serde(default)]
    pub source_uri: Option<String>,
    #[serde(default)]
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupRequest {
    pub query: String,
    pub top_k: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RetrieveResponse {
    results: Vec<Passage>,
}

// The lookup is an external collaborator: ingestion, embeddings and ranking all
// live behind it. Sessions only ever see this trait, so tests can swap in
// `MockKnowledgeLookup` instead of a live retrieval service.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KnowledgeLookup: Send + Sync {
    async fn retrieve(&self, request: &LookupRequest) -> Result<Vec<Passage>>;
}

/// Retrieval service reached over HTTP: `POST {base_url}/retrieve`.
pub struct HttpKnowledgeBase {
    client: Client,
    base_url: String,
}

impl HttpKnowledgeBase {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl KnowledgeLookup for HttpKnowledgeBase {
    async fn retrieve(&self, request: &LookupRequest) -> Result<Vec<Passage>> {
        let resp = self
            .client
            .post(format!("{}/retrieve", self.base_url))
            .json(request)
            .send()
            .await?
            .error_for_status()?
            .json::<RetrieveResponse>()
            .await?;
        tracing::debug!("knowledge base returned {} passages", resp.results.len());
        Ok(resp.results)
    }
}

/// The `query_documents` tool: searches the uploaded documents and hands the
/// model the best excerpts as one text blob.
pub struct QueryDocumentsTool {
    lookup: Arc<dyn KnowledgeLookup>,
    top_k: usize,
    excerpt_chars: usize,
}

impl QueryDocumentsTool {
    pub fn new(lookup: Arc<dyn KnowledgeLookup>) -> Self {
        Self {
            lookup,
            top_k: DEFAULT_TOP_K,
            excerpt_chars: DEFAULT_EXCERPT_CHARS,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_excerpt_chars(mut self, excerpt_chars: usize) -> Self {
        self.excerpt_chars = excerpt_chars;
        self
    }
}

#[async_trait]
impl ToolHandler for QueryDocumentsTool {
    fn spec(&self) -> Tool {
        Tool::new(
            QUERY_DOCUMENTS_TOOL,
            "Search the user's uploaded documents and return the most relevant excerpts. \
             Use it whenever the question may be answered by the documents.",
            &json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "What to look up in the documents"
                    }
                },
                "required": ["query"]
            }),
        )
    }

    async fn call(&self, input: Value, context: &ToolContext) -> Result<String, ToolError> {
        let query = input
            .get("query")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|query| !query.is_empty())
            .ok_or_else(|| ToolError::MalformedInput("missing `query` string".to_string()))?;

        let request = LookupRequest {
            query: query.to_string(),
            top_k: self.top_k,
            filter: context.doc_scope.clone(),
        };
        let passages = self
            .lookup
            .retrieve(&request)
            .await
            .map_err(|e| ToolError::Lookup(format!("{e:#}")))?;
        Ok(format_excerpts(&passages, self.top_k, self.excerpt_chars))
    }
}

/// Numbers the first `top_k` passages and cuts each to `excerpt_chars`
/// characters.
pub fn format_excerpts(passages: &[Passage], top_k: usize, excerpt_chars: usize) -> String {
    if passages.is_empty() {
        return NO_RESULTS.to_string();
    }
    passages
        .iter()
        .take(top_k)
        .enumerate()
        .map(|(i, passage)| {
            let source = passage.source_uri.as_deref().unwrap_or("unknown source");
            format!(
                "[{}] {} (score {:.2})\n{}",
                i + 1,
                source,
                passage.score,
                truncate_chars(passage.text.trim(), excerpt_chars)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passage(text: &str, uri: &str, score: f32) -> Passage {
        Passage {
            text: text.to_string(),
            source_uri: Some(uri.to_string()),
            score,
        }
    }

    #[test]
    fn excerpts_are_numbered_and_truncated() {
        let passages = vec![
            passage("Revenue grew 12% year over year.", "s3://docs/q3.pdf", 0.91),
            passage("Operating costs were flat.", "s3://docs/q3.pdf", 0.55),
            passage("Unrelated.", "s3://docs/misc.pdf", 0.10),
        ];
        let blob = format_excerpts(&passages, 2, 7);
        assert_eq!(
            blob,
            "[1] s3://docs/q3.pdf (score 0.91)\nRevenue...\n\n[2] s3://docs/q3.pdf (score 0.55)\nOperati..."
        );
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 4), "héll...");
        assert_eq!(truncate_chars("short", 10), "short");
    }

    #[test]
    fn empty_results_have_a_readable_answer() {
        assert_eq!(format_excerpts(&[], 3, 100), NO_RESULTS);
    }

    #[tokio::test]
    async fn passes_query_and_scope_to_the_lookup() {
        let mut lookup = MockKnowledgeLookup::new();
        lookup
            .expect_retrieve()
            .withf(|request| {
                request.query == "revenue"
                    && request.filter.as_deref() == Some("q3-report")
                    && request.top_k == 2
            })
            .returning(|_| Ok(vec![passage("Revenue grew.", "s3://docs/q3.pdf", 0.9)]))
            .once();

        let tool = QueryDocumentsTool::new(Arc::new(lookup)).with_top_k(2);
        let context = ToolContext {
            doc_scope: Some("q3-report".to_string()),
        };
        let blob = tool.call(json!({"query": "revenue"}), &context).await.unwrap();
        assert!(blob.contains("Revenue grew."));
    }

    #[tokio::test]
    async fn missing_query_never_reaches_the_lookup() {
        let mut lookup = MockKnowledgeLookup::new();
        lookup.expect_retrieve().never();

        let tool = QueryDocumentsTool::new(Arc::new(lookup));
        let err = tool
            .call(json!({"question": "revenue"}), &ToolContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::MalformedInput(_)));
    }
}
