use std::collections::HashSet;
use std::sync::Arc;

use tracing::info;

use super::citations::render_references;
use super::prompts;
use crate::docs::types::{Document, Workspace};
use crate::error::Result;
use crate::llm::{ChatModel, ChatRequest, Message, ResponseFormat};

/// Stage label of the final answer call.
pub const COMPOSE_STAGE: &str = "writer.compose";

/// Bounded view of the workspace documents handed to the writer.
pub struct ContextWindow<'a> {
    pub text: String,
    pub docs: Vec<&'a Document>,
}

/// Dedupe by URL (id when there is none), keep order, cap the count and
/// truncate each body to `max_chars` characters.
pub fn build_context(docs: &[Document], max_docs: usize, max_chars: usize) -> ContextWindow<'_> {
    let mut seen = HashSet::new();
    let mut used: Vec<&Document> = Vec::new();

    for doc in docs {
        if used.len() >= max_docs {
            break;
        }
        let key = doc.normalized_url().unwrap_or_else(|| doc.id.clone());
        if seen.insert(key) {
            used.push(doc);
        }
    }

    let blocks: Vec<String> = used
        .iter()
        .enumerate()
        .map(|(i, d)| {
            let body = d.content.trim();
            let body = if body.chars().count() > max_chars {
                let head: String = body.chars().take(max_chars).collect();
                format!("{} ...", head.trim_end())
            } else {
                body.to_string()
            };
            format!(
                "[{}] {}\nURL: {}\n{}\n",
                i + 1,
                d.display_title(),
                d.url.as_deref().unwrap_or("(no url)"),
                body
            )
        })
        .collect();

    ContextWindow {
        text: blocks.join("\n"),
        docs: used,
    }
}

/// Composes the final answer. Citations are local: the model writes prose
/// only and the source list is built from document URLs.
pub struct Writer {
    model: Arc<dyn ChatModel>,
    max_docs: usize,
    max_chars_per_doc: usize,
}

impl Writer {
    pub fn new(model: Arc<dyn ChatModel>, max_docs: usize, max_chars_per_doc: usize) -> Self {
        Self {
            model,
            max_docs,
            max_chars_per_doc,
        }
    }

    pub async fn compose(&self, ws: &Workspace) -> Result<String> {
        let window = build_context(&ws.docs, self.max_docs, self.max_chars_per_doc);
        let contexts = if window.text.is_empty() {
            "(none)"
        } else {
            window.text.as_str()
        };

        let body = self
            .model
            .complete(ChatRequest {
                stage: COMPOSE_STAGE,
                messages: vec![Message::user(prompts::write(
                    &ws.question,
                    ws.goal.as_deref().unwrap_or("(not set)"),
                    contexts,
                ))],
                format: ResponseFormat::Text,
            })
            .await?;

        let refs = render_references(&window.docs);
        info!(
            context_docs = window.docs.len(),
            answer_len = body.trim().len(),
            has_sources = !refs.is_empty(),
            "Answer composed"
        );
        Ok(format!("{}{}", body.trim(), refs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResearchError;
    use crate::testing::{web_doc, ScriptedModel};

    #[test]
    fn test_context_dedupes_by_url_and_caps() {
        let docs = vec![
            web_doc("A", "https://a.dev", "alpha"),
            web_doc("A again", "HTTPS://A.dev ", "alpha 2"),
            Document::new(Some("No url".into()), None, "gamma".into()),
            web_doc("B", "https://b.dev", "beta"),
            web_doc("C", "https://c.dev", "delta"),
        ];
        let window = build_context(&docs, 3, 100);
        let titles: Vec<&str> = window.docs.iter().map(|d| d.display_title()).collect();
        assert_eq!(titles, vec!["A", "No url", "B"]);
        assert!(window.text.starts_with("[1] A\nURL: https://a.dev\nalpha\n"));
        assert!(window.text.contains("[2] No url\nURL: (no url)\ngamma"));
    }

    #[test]
    fn test_context_truncates_on_char_boundary() {
        let docs = vec![web_doc("U", "https://u.dev", "ééééé")];
        let window = build_context(&docs, 8, 3);
        assert!(window.text.contains("ééé ..."));
    }

    #[tokio::test]
    async fn test_compose_appends_sources() {
        let model = Arc::new(ScriptedModel::new().reply("writer.compose", "  X is a thing.  "));
        let mut ws = Workspace::new("What is X?");
        ws.add_docs(vec![
            web_doc("X intro", "https://x.dev/intro", "X is..."),
            web_doc("X guide", "https://x.dev/guide", "Guide to X"),
        ]);

        let answer = Writer::new(model.clone(), 8, 1200).compose(&ws).await.unwrap();
        assert_eq!(
            answer,
            "X is a thing.\n\n**Sources:**\n1. [X intro](https://x.dev/intro)\n2. [X guide](https://x.dev/guide)\n"
        );
        let prompt = &model.requests()[0].messages[0].content;
        assert!(prompt.contains("(not set)"));
        assert!(prompt.contains("[2] X guide"));
    }

    #[tokio::test]
    async fn test_compose_without_docs_is_bare_answer() {
        let model = Arc::new(ScriptedModel::new().reply("writer.compose", "I don't know."));
        let ws = Workspace::new("What is X?");
        let answer = Writer::new(model.clone(), 8, 1200).compose(&ws).await.unwrap();
        assert_eq!(answer, "I don't know.");
        assert!(model.requests()[0].messages[0].content.contains("(none)"));
    }

    #[tokio::test]
    async fn test_compose_failure_surfaces() {
        let model = Arc::new(ScriptedModel::new().fail(
            "writer.compose",
            ResearchError::ServiceUnavailable("down".into()),
        ));
        let ws = Workspace::new("q");
        assert!(Writer::new(model, 8, 1200).compose(&ws).await.is_err());
    }
}
