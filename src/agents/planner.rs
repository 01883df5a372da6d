use std::sync::Arc;

use tracing::{debug, info};

use super::prompts;
use crate::docs::types::{Decision, SubGoal};
use crate::error::Result;
use crate::llm::{complete_json, ChatModel, Message};

/// Decides whether more evidence is needed and which searches would provide it.
pub struct Planner {
    model: Arc<dyn ChatModel>,
}

impl Planner {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    /// The model's `need_more` is taken as-is; no local override.
    pub async fn decide(&self, goal: &str, doc_count: usize) -> Result<Decision> {
        let data = complete_json(
            self.model.as_ref(),
            "planner.decide",
            vec![Message::user(prompts::plan(goal, doc_count))],
            prompts::PLAN_SCHEMA_NAME,
            prompts::plan_schema(),
        )
        .await?;

        let sub_goals: Vec<SubGoal> = data["sub_goals"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|q| q.as_str())
                    .map(str::trim)
                    .filter(|q| !q.is_empty())
                    .take(prompts::MAX_SUB_GOALS)
                    .map(SubGoal::new)
                    .collect()
            })
            .unwrap_or_default();

        let decision = Decision {
            need_more: data["need_more"].as_bool().unwrap_or(false),
            sub_goals,
        };

        info!(
            need_more = decision.need_more,
            sub_goals = decision.sub_goals.len(),
            doc_count,
            "Plan decided"
        );
        for sg in &decision.sub_goals {
            debug!("  · {}", sg.query);
        }
        Ok(decision)
    }
}
