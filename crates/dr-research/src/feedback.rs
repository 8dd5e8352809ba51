//! Clarifying questions asked before research starts.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::debug;

use dr_core::{GenerationRequest, ObjectSchema, PropertySchema, Result, Schema, StructuredGenerator};

use crate::prompt::{system_prompt, Language};

pub const FEEDBACK_SCHEMA: &str = "feedback_questions";

#[derive(Debug, Deserialize)]
struct FeedbackQuestions {
    questions: Vec<String>,
}

pub struct FeedbackGenerator {
    generator: Arc<dyn StructuredGenerator>,
    language: Language,
}

impl FeedbackGenerator {
    pub fn new(generator: Arc<dyn StructuredGenerator>, language: Language) -> Self {
        Self {
            generator,
            language,
        }
    }

    /// At most `max_questions` questions that would sharpen `topic`.
    pub async fn generate_feedback(&self, topic: &str, max_questions: usize) -> Result<Vec<String>> {
        if max_questions == 0 {
            return Ok(Vec::new());
        }

        let prompt = match self.language {
            Language::English => format!(
                "Given the following query from the user, ask some follow up questions to clarify the research \
                 direction. Return a maximum of {max_questions} questions, but feel free to return less if the \
                 original query is clear: <query>{topic}</query>"
            ),
            Language::Chinese => format!(
                "根据用户的以下查询，提出若干后续问题以澄清研究方向。最多返回 {max_questions} 个问题，\
                 如原始查询已足够清晰可返回更少： <query>{topic}</query>"
            ),
        };

        let schema = Schema::<FeedbackQuestions>::new(
            FEEDBACK_SCHEMA,
            ObjectSchema::new().add_property(
                "questions",
                PropertySchema::array(
                    format!("Follow up questions to clarify the research direction, max of {max_questions}"),
                    PropertySchema::string_item(),
                ),
                true,
            ),
        );

        let request = GenerationRequest::new(system_prompt(self.language, Utc::now()), prompt);
        let mut questions = self.generator.generate(&request, &schema).await?.questions;
        questions.truncate(max_questions);
        debug!(count = questions.len(), "Generated feedback questions");
        Ok(questions)
    }
}

/// The research topic enriched with the user's answers to feedback questions.
pub fn combine_feedback(topic: &str, answered: &[(String, String)]) -> String {
    if answered.is_empty() {
        return topic.to_string();
    }

    let pairs = answered
        .iter()
        .map(|(question, answer)| format!("Q: {question}\nA: {answer}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!("Initial Query: {topic}\nFollow-up Questions and Answers:\n{pairs}")
}
