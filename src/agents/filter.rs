use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::prompts;
use crate::docs::types::Document;
use crate::error::Result;
use crate::llm::{complete_json, ChatModel, Message};

const SNIPPET_CHARS: usize = 120;

/// What the model said about which candidates to keep.
#[derive(Debug, Clone, PartialEq)]
pub enum KeepDecision {
    /// Valid in-range indices, deduplicated and ascending.
    Explicit(Vec<usize>),
    /// The model deliberately rejected every candidate.
    ExplicitEmpty,
    /// No usable keep list; the caller falls back to accepting the head of the list.
    Undecodable,
}

impl KeepDecision {
    /// Classify a decoded model response against `len` candidates.
    ///
    /// Accepts `{"keep": [..]}` or a bare array. Non-integer and out-of-range
    /// entries are discarded. Only a literally empty list is an explicit
    /// rejection; a non-empty list with nothing valid left is undecodable.
    pub fn from_json(data: &Value, len: usize) -> Self {
        let list = match data {
            Value::Array(items) => items,
            Value::Object(map) => match map.get("keep") {
                Some(Value::Array(items)) => items,
                _ => return KeepDecision::Undecodable,
            },
            _ => return KeepDecision::Undecodable,
        };

        if list.is_empty() {
            return KeepDecision::ExplicitEmpty;
        }

        let indices: BTreeSet<usize> = list
            .iter()
            .filter_map(Value::as_u64)
            .filter_map(|i| usize::try_from(i).ok())
            .filter(|i| *i < len)
            .collect();

        if indices.is_empty() {
            KeepDecision::Undecodable
        } else {
            KeepDecision::Explicit(indices.into_iter().collect())
        }
    }

    /// Apply the decision to `candidates`, capping at `top_k`.
    pub fn apply(&self, candidates: &[Document], top_k: usize) -> Vec<Document> {
        match self {
            KeepDecision::Explicit(indices) => indices
                .iter()
                .filter_map(|i| candidates.get(*i))
                .take(top_k)
                .cloned()
                .collect(),
            KeepDecision::ExplicitEmpty => Vec::new(),
            KeepDecision::Undecodable => candidates.iter().take(top_k).cloned().collect(),
        }
    }
}

/// Numbered catalog of candidates shown to the model.
fn catalog(docs: &[Document]) -> String {
    docs.iter()
        .enumerate()
        .map(|(i, d)| {
            let snippet: String = if d.content.chars().count() > SNIPPET_CHARS {
                let head: String = d.content.chars().take(SNIPPET_CHARS).collect();
                format!("{}...", head)
            } else {
                d.content.clone()
            };
            format!("[{}] {}\n  {}", i, d.display_title(), snippet)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Asks the model which retrieved candidates are worth keeping.
pub struct DocFilter {
    model: Arc<dyn ChatModel>,
}

impl DocFilter {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    /// Keep a subset of `candidates`, in their original order, at most `top_k`.
    ///
    /// A response that can't be decoded keeps the first `top_k` candidates.
    /// Transport failures are returned to the caller.
    pub async fn select(
        &self,
        query: &str,
        subquery: &str,
        candidates: &[Document],
        top_k: usize,
    ) -> Result<Vec<Document>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let response = complete_json(
            self.model.as_ref(),
            "filter.select",
            vec![Message::user(prompts::filter(
                query,
                subquery,
                &catalog(candidates),
            ))],
            prompts::KEEP_SCHEMA_NAME,
            prompts::keep_schema(),
        )
        .await;

        let decision = match response {
            Ok(data) => KeepDecision::from_json(&data, candidates.len()),
            Err(e) if e.is_decode() => {
                warn!(error = %e, "Filter output undecodable, keeping leading candidates");
                KeepDecision::Undecodable
            }
            Err(e) => return Err(e),
        };

        let kept = decision.apply(candidates, top_k);
        info!(
            subquery,
            candidates = candidates.len(),
            kept = kept.len(),
            decision = ?decision,
            "Documents filtered"
        );
        for d in &kept {
            debug!("  · {} -> {}", d.display_title(), d.url.as_deref().unwrap_or("-"));
        }
        Ok(kept)
    }
}
