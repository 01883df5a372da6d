pub mod rerank;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::Settings;
use crate::docs::types::Document;
use crate::error::{ResearchError, Result};

/// Query in, ranked documents out.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Document>>;
}

/// Tavily web search.
pub struct TavilyRetriever {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    raw_content: Option<String>,
    #[serde(default)]
    score: Option<f64>,
}

impl TavilyRetriever {
    pub fn new(settings: &Settings) -> Result<Self> {
        let api_key = settings
            .tavily_api_key
            .clone()
            .ok_or_else(|| ResearchError::Configuration("TAVILY_API_KEY missing".into()))?;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| ResearchError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: settings.tavily_base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

fn to_document(position: usize, item: TavilyResult) -> Document {
    // Prefer the full page text over the search snippet
    let content = item
        .raw_content
        .filter(|c| !c.is_empty())
        .or(item.content)
        .unwrap_or_default();

    let mut doc = Document::new(item.title, item.url, content);
    doc.score = item.score;
    doc.source = Some("tavily".to_string());
    doc.meta.insert("score".into(), serde_json::json!(item.score));
    doc.meta.insert("position".into(), serde_json::json!(position));
    doc
}

#[async_trait]
impl Retriever for TavilyRetriever {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Document>> {
        let resp = self
            .client
            .post(format!("{}/search", self.base_url))
            .json(&serde_json::json!({
                "api_key": self.api_key,
                "query": query,
                "max_results": limit,
                "include_raw_content": true,
                "include_answer": false,
            }))
            .send()
            .await
            .map_err(|e| ResearchError::ServiceUnavailable(format!("Tavily search failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ResearchError::ServiceUnavailable(format!(
                "Tavily search error: {}",
                status
            )));
        }

        let body: TavilyResponse = resp
            .json()
            .await
            .map_err(|e| ResearchError::Decode(format!("Tavily response: {}", e)))?;

        let docs: Vec<Document> = body
            .results
            .into_iter()
            .take(limit)
            .enumerate()
            .map(|(i, item)| to_document(i, item))
            .collect();

        info!(query, results = docs.len(), "Web search complete");
        for d in &docs {
            debug!("  · {} -> {}", d.display_title(), d.url.as_deref().unwrap_or("-"));
        }
        Ok(docs)
    }
}
