//! Turns a research topic into a bounded batch of search queries.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use dr_core::{GenerationRequest, ObjectSchema, PropertySchema, Result, Schema, StructuredGenerator};

use crate::prompt::{system_prompt, trim_prompt, Language, MAX_PROMPT_CHARS};

pub const QUERY_SCHEMA: &str = "serp_queries";

/// A search query and the research goal it serves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerpQuery {
    pub query: String,
    #[serde(rename = "researchGoal")]
    pub research_goal: String,
}

impl SerpQuery {
    pub fn new(query: impl Into<String>, research_goal: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            research_goal: research_goal.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct QueryPlan {
    queries: Vec<SerpQuery>,
}

pub struct QueryPlanner {
    generator: Arc<dyn StructuredGenerator>,
    language: Language,
}

impl QueryPlanner {
    pub fn new(generator: Arc<dyn StructuredGenerator>, language: Language) -> Self {
        Self {
            generator,
            language,
        }
    }

    /// Ask for at most `max_count` distinct queries about `topic`, refined by
    /// `learnings` from earlier research when there are any.
    ///
    /// The generator is not trusted to honor the maximum, so the result is
    /// clamped. Generator failures propagate unchanged.
    pub async fn generate_queries(
        &self,
        topic: &str,
        max_count: usize,
        learnings: &[String],
    ) -> Result<Vec<SerpQuery>> {
        if max_count == 0 {
            debug!("Zero breadth requested, no queries planned");
            return Ok(Vec::new());
        }

        let prompt = self.build_prompt(topic, max_count, learnings);
        let request = GenerationRequest::new(
            system_prompt(self.language, Utc::now()),
            trim_prompt(&prompt, MAX_PROMPT_CHARS),
        );

        let plan = self
            .generator
            .generate(&request, &self.schema(max_count))
            .await?;

        let mut queries = plan.queries;
        queries.truncate(max_count);
        info!(count = queries.len(), "Created queries");
        for query in &queries {
            debug!(query = %query.query, goal = %query.research_goal, "Planned query");
        }
        Ok(queries)
    }

    fn build_prompt(&self, topic: &str, max_count: usize, learnings: &[String]) -> String {
        let mut prompt = match self.language {
            Language::English => format!(
                "Given the following prompt from the user, generate a list of SERP queries to research the topic. \
                 Return a maximum of {max_count} queries, but feel free to return less if the original prompt is clear. \
                 Make sure each query is unique and not similar to each other: <prompt>{topic}</prompt>"
            ),
            Language::Chinese => format!(
                "根据用户的以下提示，生成一组用于研究该主题的搜索引擎查询（SERP 查询）。\
                 最多返回 {max_count} 个查询，如果原始提示已经足够清晰，可以少于这个数量。\
                 确保每个查询都是唯一的，且彼此不相似：<prompt>{topic}</prompt>"
            ),
        };

        if !learnings.is_empty() {
            let joined = learnings.join("\n");
            prompt.push_str("\n\n");
            prompt.push_str(&match self.language {
                Language::English => format!(
                    "Here are some learnings from previous research, use them to generate more specific queries: {joined}"
                ),
                Language::Chinese => {
                    format!("以下是先前研究得到的要点，请利用它们生成更具体的查询：{joined}")
                }
            });
        }

        prompt
    }

    fn schema(&self, max_count: usize) -> Schema<QueryPlan> {
        let lang = self.language;
        let item = ObjectSchema::new()
            .add_property(
                "query",
                PropertySchema::string(lang.pick("The SERP query", "用于搜索引擎的查询语句")),
                true,
            )
            .add_property(
                "researchGoal",
                PropertySchema::string(lang.pick(
                    "First talk about the goal of the research that this query is meant to accomplish, \
                     then go deeper into how to advance the research once the results are found, \
                     mention additional research directions. Be as specific as possible, \
                     especially for additional research directions.",
                    "先说明该查询要实现的研究目标，再深入说明拿到结果后如何推进研究，并提出额外的研究方向。\
                     请尽可能具体，尤其是额外的研究方向。",
                )),
                true,
            );

        let description = match lang {
            Language::English => format!("List of SERP queries, max of {max_count}"),
            Language::Chinese => format!("搜索查询列表，最多 {max_count} 个"),
        };

        Schema::new(
            QUERY_SCHEMA,
            ObjectSchema::new().add_property(
                "queries",
                PropertySchema::array(description, PropertySchema::object(item)),
                true,
            ),
        )
    }
}
