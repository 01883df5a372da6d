use std::sync::Arc;

use tracing::{info, warn};

use super::prompts;
use crate::error::Result;
use crate::llm::{complete_json, ChatModel, Message};

/// First contact with the user: clarifying questions, then a rewritten goal.
pub struct Intake {
    model: Arc<dyn ChatModel>,
}

impl Intake {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    pub async fn clarify(&self, question: &str, max_questions: usize) -> Result<Vec<String>> {
        let data = complete_json(
            self.model.as_ref(),
            "intake.clarify",
            vec![Message::user(prompts::clarify(question, max_questions))],
            prompts::CLARIFY_SCHEMA_NAME,
            prompts::clarify_schema(),
        )
        .await?;

        let questions: Vec<String> = data["questions"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|q| q.as_str())
                    .map(|q| q.trim().to_string())
                    .filter(|q| !q.is_empty())
                    .take(max_questions)
                    .collect()
            })
            .unwrap_or_default();

        info!(count = questions.len(), "Clarifying questions generated");
        Ok(questions)
    }

    /// Fold the user's answers into a single goal. Falls back to the question
    /// when the model gives nothing usable.
    pub async fn rewrite(&self, question: &str, answers: &[String]) -> Result<String> {
        let joined = answers.join("\n");
        let data = complete_json(
            self.model.as_ref(),
            "intake.rewrite",
            vec![Message::user(prompts::rewrite(question, &joined))],
            prompts::GOAL_SCHEMA_NAME,
            prompts::goal_schema(),
        )
        .await?;

        let goal = match data["goal"].as_str().map(str::trim) {
            Some(g) if !g.is_empty() => g.to_string(),
            _ => {
                warn!("Goal rewrite produced no goal, keeping the original question");
                question.to_string()
            }
        };
        info!(goal = %goal, "Goal rewritten");
        Ok(goal)
    }
}
