use serde::Deserialize;
use tracing::debug;

use crate::config::Settings;
use crate::docs::types::Document;
use crate::error::{ResearchError, Result};

/// Cross-encoder reordering through the provider's `/rerank` endpoint.
pub struct Reranker {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct RerankResponse {
    #[serde(default)]
    results: Vec<RerankItem>,
}

#[derive(Debug, Deserialize)]
struct RerankItem {
    index: usize,
    #[serde(default)]
    relevance_score: f64,
}

impl Reranker {
    pub fn new(settings: &Settings) -> Result<Self> {
        let api_key = settings.llm_api_key.clone().ok_or_else(|| {
            ResearchError::Configuration("SILICONFLOW_API_KEY missing for rerank".into())
        })?;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| ResearchError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/rerank", settings.llm_base_url.trim_end_matches('/')),
            model: settings.rerank_model.clone(),
            api_key,
        })
    }

    /// Reorder `docs` by descending relevance and record each score.
    pub async fn rerank(&self, query: &str, docs: Vec<Document>) -> Result<Vec<Document>> {
        if docs.is_empty() {
            return Ok(docs);
        }

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "model": self.model,
                "query": query,
                "documents": docs.iter().map(|d| d.content.as_str()).collect::<Vec<_>>(),
                "return_documents": false,
            }))
            .send()
            .await
            .map_err(|e| ResearchError::ServiceUnavailable(format!("rerank failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ResearchError::ServiceUnavailable(format!(
                "rerank returned {}",
                status
            )));
        }

        let body: RerankResponse = resp
            .json()
            .await
            .map_err(|e| ResearchError::Decode(format!("rerank response: {}", e)))?;

        let ordered = apply_scores(docs, body.results);
        debug!(query, count = ordered.len(), "Reranked candidates");
        Ok(ordered)
    }
}

/// Scored documents first (highest score first), unscored ones after in
/// their original order. Unknown or repeated indices are ignored.
fn apply_scores(docs: Vec<Document>, mut scores: Vec<RerankItem>) -> Vec<Document> {
    scores.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));

    let mut slots: Vec<Option<Document>> = docs.into_iter().map(Some).collect();
    let mut ordered = Vec::with_capacity(slots.len());
    for item in scores {
        if let Some(mut doc) = slots.get_mut(item.index).and_then(Option::take) {
            doc.score = Some(item.relevance_score);
            ordered.push(doc);
        }
    }
    ordered.extend(slots.into_iter().flatten());
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn docs() -> Vec<Document> {
        ["alpha", "beta", "gamma"]
            .iter()
            .map(|c| Document::new(None, Some(format!("https://{}.dev", c)), c.to_string()))
            .collect()
    }

    fn item(index: usize, relevance_score: f64) -> RerankItem {
        RerankItem {
            index,
            relevance_score,
        }
    }

    #[test]
    fn test_apply_scores_orders_and_keeps_unscored() {
        let out = apply_scores(docs(), vec![item(2, 0.8), item(0, 0.1), item(9, 1.0), item(2, 0.5)]);
        let order: Vec<&str> = out.iter().map(|d| d.content.as_str()).collect();
        assert_eq!(order, vec!["gamma", "alpha", "beta"]);
        assert_eq!(out[0].score, Some(0.8));
        assert_eq!(out[2].score, None);
    }

    #[tokio::test]
    async fn test_rerank_against_mock() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/rerank"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [
                    {"index": 1, "relevance_score": 0.9},
                    {"index": 0, "relevance_score": 0.2},
                    {"index": 2, "relevance_score": 0.5}
                ]
            })))
            .mount(&server)
            .await;

        let settings = Settings {
            llm_api_key: Some("sk-test".into()),
            llm_base_url: format!("{}/v1", server.uri()),
            ..Settings::default()
        };
        let reranker = Reranker::new(&settings).unwrap();
        let out = reranker.rerank("q", docs()).await.unwrap();
        let order: Vec<&str> = out.iter().map(|d| d.content.as_str()).collect();
        assert_eq!(order, vec!["beta", "gamma", "alpha"]);
    }
}
