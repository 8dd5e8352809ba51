//! Condenses fetched content for one query into learnings and follow-up
//! questions.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use dr_core::{GenerationRequest, ObjectSchema, PropertySchema, Result, Schema, StructuredGenerator};

use crate::planner::SerpQuery;
use crate::prompt::{system_prompt, trim_prompt, Language, MAX_PROMPT_CHARS};

pub const LEARNING_SCHEMA: &str = "serp_learnings";

/// Deadline for one distillation call, separate from any transport timeout.
pub const DEFAULT_DISTILL_TIMEOUT: Duration = Duration::from_secs(60);

/// Per-item content budget, in characters.
pub const DEFAULT_MAX_CONTENT_CHARS: usize = 25_000;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearningSet {
    pub learnings: Vec<String>,
    #[serde(rename = "followUpQuestions")]
    pub follow_up_questions: Vec<String>,
}

pub struct ResultDistiller {
    generator: Arc<dyn StructuredGenerator>,
    language: Language,
    timeout: Duration,
    max_content_chars: usize,
}

impl ResultDistiller {
    pub fn new(generator: Arc<dyn StructuredGenerator>, language: Language) -> Self {
        Self {
            generator,
            language,
            timeout: DEFAULT_DISTILL_TIMEOUT,
            max_content_chars: DEFAULT_MAX_CONTENT_CHARS,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_content_chars(mut self, max_content_chars: usize) -> Self {
        self.max_content_chars = max_content_chars;
        self
    }

    /// Distill `contents` fetched for `query`.
    ///
    /// Each item is trimmed to the content budget and empty items are dropped.
    /// The returned lists are not clamped; the maximums are only instructions
    /// to the generator. A missed deadline surfaces as `Error::Timeout`.
    pub async fn distill(
        &self,
        query: &SerpQuery,
        contents: &[String],
        max_learnings: usize,
        max_follow_ups: usize,
    ) -> Result<LearningSet> {
        let trimmed: Vec<&str> = contents
            .iter()
            .map(|content| trim_prompt(content, self.max_content_chars))
            .filter(|content| !content.is_empty())
            .collect();
        info!(query = %query.query, contents = trimmed.len(), "Distilling search results");

        let prompt = self.build_prompt(&query.query, &trimmed, max_learnings);
        let request = GenerationRequest::new(
            system_prompt(self.language, Utc::now()),
            trim_prompt(&prompt, MAX_PROMPT_CHARS),
        )
        .with_timeout(self.timeout);

        let set = self
            .generator
            .generate(&request, &self.schema(max_learnings, max_follow_ups))
            .await?;

        info!(
            query = %query.query,
            learnings = set.learnings.len(),
            follow_ups = set.follow_up_questions.len(),
            "Created learnings"
        );
        debug!(learnings = ?set.learnings, "Distilled learnings");
        Ok(set)
    }

    fn build_prompt(&self, query: &str, contents: &[&str], max_learnings: usize) -> String {
        let wrapped = contents
            .iter()
            .map(|content| format!("<content>\n{}\n</content>", content))
            .collect::<Vec<_>>()
            .join("\n");

        let instruction = match self.language {
            Language::English => format!(
                "Given the following contents from a SERP search for the query <query>{query}</query>, \
                 generate a list of learnings from the contents. Return a maximum of {max_learnings} learnings, \
                 but feel free to return less if the contents are clear. Make sure each learning is unique and \
                 not similar to each other. The learnings should be concise and to the point, as detailed and \
                 information dense as possible. Make sure to include any entities like people, places, companies, \
                 products, things, etc in the learnings, as well as any exact metrics, numbers, or dates. \
                 The learnings will be used to research the topic further."
            ),
            Language::Chinese => format!(
                "根据以下针对查询 <query>{query}</query> 的搜索结果内容，生成一组研究要点。\
                 最多返回 {max_learnings} 条要点，如内容已足够清晰可返回更少。确保每条要点彼此不同且不重复。\
                 要点应简洁明了，同时尽可能信息密集且具体。务必包含任何相关实体（如人物、地点、公司、产品等），\
                 以及精确的指标、数字或日期。这些要点将用于进一步研究该主题。"
            ),
        };

        format!("{instruction}\n\n<contents>{wrapped}</contents>")
    }

    fn schema(&self, max_learnings: usize, max_follow_ups: usize) -> Schema<LearningSet> {
        let (learnings, follow_ups) = match self.language {
            Language::English => (
                format!("List of learnings, max of {max_learnings}"),
                format!("List of follow-up questions to research the topic further, max of {max_follow_ups}"),
            ),
            Language::Chinese => (
                format!("研究要点列表，最多 {max_learnings} 条"),
                format!("用于进一步研究该主题的后续问题列表，最多 {max_follow_ups} 条"),
            ),
        };

        Schema::new(
            LEARNING_SCHEMA,
            ObjectSchema::new()
                .add_property(
                    "learnings",
                    PropertySchema::array(learnings, PropertySchema::string_item()),
                    true,
                )
                .add_property(
                    "followUpQuestions",
                    PropertySchema::array(follow_ups, PropertySchema::string_item()),
                    true,
                ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dr_core::testing::MockGenerator;
    use dr_core::Error;
    use serde_json::json;

    fn query() -> SerpQuery {
        SerpQuery::new("solid state batteries", "Find commercial timelines")
    }

    #[tokio::test]
    async fn test_distill_wraps_nonempty_contents() {
        let generator = Arc::new(MockGenerator::new(|_, _| {
            Ok(json!({"learnings": ["L1"], "followUpQuestions": ["Q1"]}))
        }));
        let distiller = ResultDistiller::new(generator.clone(), Language::English);

        let contents = vec!["first page".to_string(), String::new(), "second page".to_string()];
        let set = distiller.distill(&query(), &contents, 3, 2).await.unwrap();

        assert_eq!(set.learnings, vec!["L1"]);
        assert_eq!(set.follow_up_questions, vec!["Q1"]);

        let call = &generator.calls_for(LEARNING_SCHEMA)[0];
        assert!(call.prompt.contains("<query>solid state batteries</query>"));
        assert!(call.prompt.contains(
            "<contents><content>\nfirst page\n</content>\n<content>\nsecond page\n</content></contents>"
        ));
        assert!(call.prompt.contains("maximum of 3 learnings"));
    }

    #[tokio::test]
    async fn test_distill_trims_each_content_item() {
        let generator = Arc::new(MockGenerator::new(|_, _| {
            Ok(json!({"learnings": [], "followUpQuestions": []}))
        }));
        let distiller =
            ResultDistiller::new(generator.clone(), Language::English).with_max_content_chars(4);

        let contents = vec!["abcdefgh".to_string()];
        distiller.distill(&query(), &contents, 3, 2).await.unwrap();

        let call = &generator.calls_for(LEARNING_SCHEMA)[0];
        assert!(call.prompt.contains("<content>\nabcd\n</content>"));
        assert!(!call.prompt.contains("abcde"));
    }

    #[tokio::test]
    async fn test_distill_does_not_clamp_generator_output() {
        let generator = Arc::new(MockGenerator::new(|_, _| {
            Ok(json!({
                "learnings": ["a", "b", "c", "d", "e"],
                "followUpQuestions": ["q1", "q2", "q3", "q4"]
            }))
        }));
        let distiller = ResultDistiller::new(generator, Language::English);

        let set = distiller.distill(&query(), &[], 3, 2).await.unwrap();
        assert_eq!(set.learnings.len(), 5);
        assert_eq!(set.follow_up_questions.len(), 4);
    }

    #[tokio::test]
    async fn test_distill_timeout_is_distinguished() {
        let generator = Arc::new(
            MockGenerator::new(|_, _| Ok(json!({"learnings": [], "followUpQuestions": []})))
                .with_delay(Duration::from_millis(500)),
        );
        let distiller = ResultDistiller::new(generator, Language::English)
            .with_timeout(Duration::from_millis(20));

        let err = distiller.distill(&query(), &[], 3, 2).await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_distill_missing_field_is_schema_error() {
        let generator = Arc::new(MockGenerator::new(|_, _| Ok(json!({"learnings": ["x"]}))));
        let distiller = ResultDistiller::new(generator, Language::Chinese);

        let err = distiller.distill(&query(), &[], 3, 2).await.unwrap_err();
        assert!(matches!(err, Error::Schema { .. }));
        assert!(!err.is_timeout());
    }
}
