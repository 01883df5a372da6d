use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

fn short_id(prefix: &str) -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_{}", prefix, &hex[..8])
}

/// One unit of evidence: a retrieved page, possibly cleaned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub score: Option<f64>,
    /// Provider tag, e.g. "tavily".
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub meta: Map<String, Value>,
}

impl Document {
    /// Content-addressed id over URL and content (blake3, truncated).
    pub fn new(title: Option<String>, url: Option<String>, content: String) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(url.as_deref().unwrap_or("").as_bytes());
        hasher.update(&[0]);
        hasher.update(content.as_bytes());
        let hex = hasher.finalize().to_hex();

        Self {
            id: format!("doc_{}", &hex.as_str()[..16]),
            title: title.filter(|t| !t.trim().is_empty()),
            url: url.filter(|u| !u.trim().is_empty()),
            content,
            score: None,
            source: None,
            meta: Map::new(),
        }
    }

    /// Trimmed, lowercased URL, or `None` when absent or blank.
    pub fn normalized_url(&self) -> Option<String> {
        self.url
            .as_deref()
            .map(|u| u.trim().to_lowercase())
            .filter(|u| !u.is_empty())
    }

    /// Identity used to recognise the same page across searches.
    ///
    /// URL wins when present, so two hits on one page with different titles
    /// or snippets collapse. Without a URL the title is used, then the id.
    pub fn dedupe_key(&self) -> String {
        if let Some(url) = self.normalized_url() {
            return url;
        }
        match self
            .title
            .as_deref()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
        {
            Some(title) => format!("title:{}", title),
            None => format!("id:{}", self.id),
        }
    }

    /// Title for display: title, then URL, then "untitled".
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .or(self.url.as_deref())
            .unwrap_or("untitled")
    }

    pub fn is_cleaned(&self) -> bool {
        self.meta.get("cleaned").and_then(Value::as_bool).unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubGoal {
    pub id: String,
    pub query: String,
    #[serde(default = "default_status")]
    pub status: String,
}

fn default_status() -> String {
    "pending".to_string()
}

impl SubGoal {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            id: short_id("sub"),
            query: query.into(),
            status: default_status(),
        }
    }
}

/// Where a run currently is. Persisted so a saved workspace can be inspected or resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Created,
    AwaitingAnswers,
    Planning,
    Retrieving,
    Filtering,
    Done,
}

/// The single mutable aggregate for one research session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub id: String,
    pub question: String,
    #[serde(default)]
    pub goal: Option<String>,
    #[serde(default)]
    pub docs: Vec<Document>,
    #[serde(default)]
    pub sub_goals: Vec<SubGoal>,
    #[serde(default)]
    pub stage: Stage,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workspace {
    pub fn new(question: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: short_id("ws"),
            question: question.into(),
            goal: None,
            docs: Vec::new(),
            sub_goals: Vec::new(),
            stage: Stage::Created,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rewritten goal if set, otherwise the original question.
    pub fn goal_or_question(&self) -> &str {
        self.goal
            .as_deref()
            .filter(|g| !g.trim().is_empty())
            .unwrap_or(&self.question)
    }

    pub fn set_goal(&mut self, goal: impl Into<String>) {
        self.goal = Some(goal.into());
    }

    pub fn add_docs(&mut self, docs: impl IntoIterator<Item = Document>) {
        self.docs.extend(docs);
    }

    pub fn add_sub_goals(&mut self, subs: impl IntoIterator<Item = SubGoal>) {
        self.sub_goals.extend(subs);
    }
}

/// Planner output. Only its effects are persisted.
#[derive(Debug, Clone, Default)]
pub struct Decision {
    pub need_more: bool,
    pub sub_goals: Vec<SubGoal>,
}
