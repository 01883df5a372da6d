//! Scripted stand-ins for the model and search services.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::docs::types::Document;
use crate::error::{ResearchError, Result};
use crate::llm::{ChatModel, ChatRequest};
use crate::retrieve::Retriever;

type Reply = Box<dyn Fn(&ChatRequest) -> Result<String> + Send + Sync>;

/// Answers each request from a per-stage queue, falling back to a per-stage
/// default once the queue is drained. Every request is logged.
#[derive(Default)]
pub struct ScriptedModel {
    queued: Mutex<HashMap<&'static str, VecDeque<Result<String>>>>,
    defaults: HashMap<&'static str, Reply>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one reply for `stage`.
    pub fn reply(self, stage: &'static str, text: impl Into<String>) -> Self {
        self.push(stage, Ok(text.into()))
    }

    /// Queue one failure for `stage`.
    pub fn fail(self, stage: &'static str, err: ResearchError) -> Self {
        self.push(stage, Err(err))
    }

    fn push(self, stage: &'static str, reply: Result<String>) -> Self {
        self.queued
            .lock()
            .unwrap()
            .entry(stage)
            .or_default()
            .push_back(reply);
        self
    }

    /// Reply for `stage` whenever its queue is empty.
    pub fn always(
        mut self,
        stage: &'static str,
        f: impl Fn(&ChatRequest) -> Result<String> + Send + Sync + 'static,
    ) -> Self {
        self.defaults.insert(stage, Box::new(f));
        self
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self, stage: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.stage == stage)
            .count()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, request: ChatRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());

        let queued = self
            .queued
            .lock()
            .unwrap()
            .get_mut(request.stage)
            .and_then(VecDeque::pop_front);
        if let Some(reply) = queued {
            return reply;
        }
        match self.defaults.get(request.stage) {
            Some(f) => f(&request),
            None => Err(ResearchError::ServiceUnavailable(format!(
                "ScriptedModel: no reply for stage {}",
                request.stage
            ))),
        }
    }
}

/// Returns canned documents per query and logs every search.
#[derive(Default)]
pub struct ScriptedRetriever {
    results: HashMap<String, Vec<Document>>,
    fallback: Option<Box<dyn Fn(&str) -> Vec<Document> + Send + Sync>>,
    searches: Mutex<Vec<String>>,
}

impl ScriptedRetriever {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, query: &str, docs: Vec<Document>) -> Self {
        self.results.insert(query.to_string(), docs);
        self
    }

    pub fn otherwise(mut self, f: impl Fn(&str) -> Vec<Document> + Send + Sync + 'static) -> Self {
        self.fallback = Some(Box::new(f));
        self
    }

    pub fn searches(&self) -> Vec<String> {
        self.searches.lock().unwrap().clone()
    }
}

#[async_trait]
impl Retriever for ScriptedRetriever {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Document>> {
        self.searches.lock().unwrap().push(query.to_string());
        let docs = match (self.results.get(query), &self.fallback) {
            (Some(docs), _) => docs.clone(),
            (None, Some(f)) => f(query),
            (None, None) => {
                return Err(ResearchError::ServiceUnavailable(format!(
                    "ScriptedRetriever: no results for {}",
                    query
                )))
            }
        };
        Ok(docs.into_iter().take(limit).collect())
    }
}

pub fn web_doc(title: &str, url: &str, content: &str) -> Document {
    let mut doc = Document::new(
        Some(title.to_string()),
        Some(url.to_string()),
        content.to_string(),
    );
    doc.source = Some("tavily".to_string());
    doc
}
