//! Retrieval collaborator: vector search over the document store, consumed
//! read-only, plus the `search_documents` tool built on it.

use std::sync::Arc;

use bcommon::BoxFuture;
use bprovider::{ModelProvider, ToolDefinition, is_zero_embedding};
use btooling::{Tool, ToolError, ToolExecutionContext, ToolFuture};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::ChatError;

pub const DEFAULT_SEARCH_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub score: f32,
    pub content: String,
    pub metadata: Value,
}

pub trait Retriever: Send + Sync {
    fn search<'a>(
        &'a self,
        vector: Vec<f32>,
        limit: usize,
        filter: Option<Value>,
    ) -> BoxFuture<'a, Result<Vec<ScoredChunk>, ChatError>>;
}

/// Vector-search client for a qdrant-style REST endpoint.
#[derive(Debug, Clone)]
pub struct HttpRetriever {
    client: Client,
    base_url: String,
    collection: String,
}

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    result: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    score: f32,
    #[serde(default)]
    payload: Value,
}

impl HttpRetriever {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            collection: collection.into(),
        }
    }

    pub fn from_env(client: Client) -> Self {
        let base_url = std::env::var("BELLHOP_SEARCH_URL")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| "http://localhost:6333".to_string());
        let collection = std::env::var("BELLHOP_SEARCH_COLLECTION")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| "company_knowledge_base".to_string());
        Self::new(client, base_url, collection)
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/collections/{}/points/search",
            self.base_url.trim_end_matches('/'),
            self.collection
        )
    }
}

impl Retriever for HttpRetriever {
    fn search<'a>(
        &'a self,
        vector: Vec<f32>,
        limit: usize,
        filter: Option<Value>,
    ) -> BoxFuture<'a, Result<Vec<ScoredChunk>, ChatError>> {
        Box::pin(async move {
            let mut body = json!({
                "vector": vector,
                "limit": limit,
                "with_payload": true,
            });
            if let (Value::Object(map), Some(filter)) = (&mut body, filter) {
                map.insert("filter".to_string(), filter);
            }

            let response = self
                .client
                .post(self.endpoint())
                .json(&body)
                .send()
                .await
                .map_err(|error| ChatError::retrieval(error.to_string()))?
                .error_for_status()
                .map_err(|error| ChatError::retrieval(error.to_string()))?;

            let envelope: SearchEnvelope = response
                .json()
                .await
                .map_err(|error| ChatError::retrieval(error.to_string()))?;

            Ok(envelope
                .result
                .into_iter()
                .map(|hit| {
                    let content = hit
                        .payload
                        .get("content")
                        .and_then(|value| value.as_str())
                        .map(str::to_string)
                        .unwrap_or_else(|| hit.payload.to_string());
                    let metadata = hit
                        .payload
                        .get("metadata")
                        .cloned()
                        .unwrap_or(Value::Null);

                    ScoredChunk {
                        score: hit.score,
                        content,
                        metadata,
                    }
                })
                .collect())
        })
    }
}

/// Renders retrieved chunks the way the reasoning step consumes them.
pub fn format_chunks(chunks: &[ScoredChunk]) -> String {
    if chunks.is_empty() {
        return String::new();
    }

    let mut output = String::new();
    for (index, chunk) in chunks.iter().enumerate() {
        output.push_str(&format!(
            "Result #{} (similarity {:.2}):\n{}\n",
            index + 1,
            chunk.score,
            chunk.content
        ));
        if !chunk.metadata.is_null() {
            output.push_str(&format!("Metadata: {}\n", chunk.metadata));
        }
    }
    output
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default)]
    department: Option<String>,
}

/// Document search exposed to the reasoning loop: embeds the query, then
/// runs vector search, optionally filtered by department.
pub struct SearchDocumentsTool {
    provider: Arc<dyn ModelProvider>,
    retriever: Arc<dyn Retriever>,
    limit: usize,
}

impl SearchDocumentsTool {
    pub fn new(provider: Arc<dyn ModelProvider>, retriever: Arc<dyn Retriever>) -> Self {
        Self {
            provider,
            retriever,
            limit: DEFAULT_SEARCH_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }
}

impl Tool for SearchDocumentsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "search_documents".to_string(),
            description: "Searches internal documents for information relevant to a query."
                .to_string(),
            input_schema: r#"{"type":"object","properties":{"query":{"type":"string"},"department":{"type":"string"}},"required":["query"]}"#
                .to_string(),
        }
    }

    fn invoke<'a>(
        &'a self,
        args_json: &'a str,
        _context: &'a ToolExecutionContext,
    ) -> ToolFuture<'a, Result<String, ToolError>> {
        Box::pin(async move {
            let args: SearchArgs = serde_json::from_str(args_json).map_err(|error| {
                ToolError::invalid_arguments(format!("invalid search arguments: {error}"))
            })?;

            let vector = self
                .provider
                .embed(args.query.clone())
                .await
                .map_err(|error| ToolError::execution(error.to_string()))?;

            if is_zero_embedding(&vector) {
                return Ok(format!(
                    "No semantic signal could be derived for '{}'.",
                    args.query
                ));
            }

            let filter = args.department.as_ref().map(|department| {
                json!({
                    "must": [{
                        "key": "metadata.department",
                        "match": {"value": department}
                    }]
                })
            });

            let chunks = self
                .retriever
                .search(vector, self.limit, filter)
                .await
                .map_err(|error| ToolError::execution(error.to_string()))?;

            if chunks.is_empty() {
                let scope = args
                    .department
                    .map(|department| format!(" in department '{department}'"))
                    .unwrap_or_default();
                return Ok(format!("No results found for '{}'{scope}.", args.query));
            }

            Ok(format_chunks(&chunks))
        })
    }
}
