use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use super::prompts;
use crate::docs::types::Document;
use crate::error::{ResearchError, Result};
use crate::llm::{ChatModel, ChatRequest, Message, ResponseFormat};

const HTML_WRAP_WIDTH: usize = 120;

/// Rewrites each document's content into clean plain text.
pub struct Cleaner {
    model: Arc<dyn ChatModel>,
    max_input_chars: usize,
}

fn looks_like_html(content: &str) -> bool {
    let head: String = content.chars().take(2000).collect::<String>().to_lowercase();
    ["<html", "<body", "<div", "<p>", "</p>", "<!doctype"]
        .iter()
        .any(|tag| head.contains(tag))
}

/// Strip markup before the model sees it; raw text passes through.
fn prepare(content: &str, max_chars: usize) -> String {
    let text = if looks_like_html(content) {
        html2text::from_read(content.as_bytes(), HTML_WRAP_WIDTH)
            .unwrap_or_else(|_| content.to_string())
    } else {
        content.to_string()
    };
    text.chars().take(max_chars).collect()
}

impl Cleaner {
    pub fn new(model: Arc<dyn ChatModel>, max_input_chars: usize) -> Self {
        Self {
            model,
            max_input_chars,
        }
    }

    pub async fn clean(&self, doc: &Document) -> Result<String> {
        let input = prepare(&doc.content, self.max_input_chars);
        let out = self
            .model
            .complete(ChatRequest {
                stage: "cleaner.clean",
                messages: vec![Message::user(prompts::clean(&input))],
                format: ResponseFormat::Text,
            })
            .await?;

        let out = out.trim();
        if out.is_empty() {
            return Err(ResearchError::Decode("cleaner returned empty text".into()));
        }
        Ok(out.to_string())
    }

    /// Clean every document independently; one failure never stops the rest.
    pub async fn clean_all(&self, docs: &[Document]) -> Vec<Result<String>> {
        let mut outcomes = Vec::with_capacity(docs.len());
        for doc in docs {
            outcomes.push(self.clean(doc).await);
        }
        outcomes
    }
}

/// Fold cleaning outcomes back into their documents.
///
/// Success replaces the content and sets `meta.cleaned`; failure keeps the
/// original content and records `meta.clean_error`. Ids are untouched.
pub fn apply_cleaning(docs: &mut [Document], outcomes: Vec<Result<String>>) {
    let mut cleaned = 0usize;
    let mut failed = 0usize;

    for (doc, outcome) in docs.iter_mut().zip(outcomes) {
        match outcome {
            Ok(text) => {
                doc.content = text;
                doc.meta.insert("cleaned".into(), Value::Bool(true));
                doc.meta.remove("clean_error");
                cleaned += 1;
            }
            Err(e) => {
                warn!(doc_id = %doc.id, error = %e, "Cleaning failed, keeping original content");
                doc.meta.insert("clean_error".into(), Value::String(e.to_string()));
                failed += 1;
            }
        }
    }

    info!(cleaned, failed, "Documents cleaned");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{web_doc, ScriptedModel};

    #[test]
    fn test_prepare_strips_html_and_truncates() {
        let html = "<html><body><p>Hello <b>world</b></p></body></html>";
        let text = prepare(html, 1000);
        assert!(text.contains("Hello"));
        assert!(!text.contains("<p>"));

        assert_eq!(prepare("plain text", 5), "plain");
    }

    #[tokio::test]
    async fn test_failure_keeps_document_and_id() {
        let model = Arc::new(
            ScriptedModel::new()
                .reply("cleaner.clean", "  cleaned one  ")
                .fail("cleaner.clean", ResearchError::ServiceUnavailable("timeout".into()))
                .reply("cleaner.clean", "   "),
        );
        let cleaner = Cleaner::new(model, 1000);
        let mut docs = vec![
            web_doc("A", "https://a.dev", "raw a"),
            web_doc("B", "https://b.dev", "raw b"),
            web_doc("C", "https://c.dev", "raw c"),
        ];
        let ids: Vec<String> = docs.iter().map(|d| d.id.clone()).collect();

        let outcomes = cleaner.clean_all(&docs).await;
        assert_eq!(outcomes.len(), 3);
        apply_cleaning(&mut docs, outcomes);

        assert_eq!(docs.len(), 3);
        assert_eq!(docs.iter().map(|d| d.id.clone()).collect::<Vec<_>>(), ids);

        assert_eq!(docs[0].content, "cleaned one");
        assert!(docs[0].is_cleaned());

        assert_eq!(docs[1].content, "raw b");
        assert!(!docs[1].is_cleaned());
        assert!(docs[1].meta["clean_error"].as_str().unwrap().contains("timeout"));

        assert_eq!(docs[2].content, "raw c");
        assert!(docs[2].meta["clean_error"].as_str().unwrap().contains("empty"));
    }
}
