//! Final write-ups of a research run.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use dr_core::{GenerationRequest, ObjectSchema, PropertySchema, Result, Schema, StructuredGenerator};

use crate::prompt::{format_learnings, system_prompt, trim_prompt, Language, MAX_PROMPT_CHARS};

pub const REPORT_SCHEMA: &str = "final_report";
pub const ANSWER_SCHEMA: &str = "final_answer";

#[derive(Debug, Deserialize)]
struct FinalReport {
    #[serde(rename = "reportMarkdown")]
    report_markdown: String,
}

#[derive(Debug, Deserialize)]
struct FinalAnswer {
    #[serde(rename = "exactAnswer")]
    exact_answer: String,
}

pub struct Reporter {
    generator: Arc<dyn StructuredGenerator>,
    language: Language,
}

impl Reporter {
    pub fn new(generator: Arc<dyn StructuredGenerator>, language: Language) -> Self {
        Self {
            generator,
            language,
        }
    }

    /// A long-form markdown report covering every learning, followed by a
    /// `Sources` section listing every visited source id.
    pub async fn write_final_report(
        &self,
        topic: &str,
        learnings: &[String],
        visited_urls: &[String],
    ) -> Result<String> {
        let learnings = format_learnings(learnings);
        let prompt = match self.language {
            Language::English => format!(
                "Given the following prompt from the user, write a final report on the topic using the learnings \
                 from research. Make it as as detailed as possible, aim for 3 or more pages, include ALL the \
                 learnings from research:\n\n<prompt>{topic}</prompt>\n\n\
                 Here are all the learnings from previous research:\n\n<learnings>\n{learnings}\n</learnings>"
            ),
            Language::Chinese => format!(
                "根据用户以下提示并使用研究所得要点，撰写最终报告。尽量详尽，目标为三页或以上，包含所有研究要点：\
                 \n\n<prompt>{topic}</prompt>\n\n以下为所有要点：\n\n<learnings>\n{learnings}\n</learnings>"
            ),
        };

        let schema = Schema::<FinalReport>::new(
            REPORT_SCHEMA,
            ObjectSchema::new().add_property(
                "reportMarkdown",
                PropertySchema::string(self.language.pick(
                    "Final report on the topic in Markdown",
                    "以 Markdown 格式撰写的主题最终报告",
                )),
                true,
            ),
        );

        let report = self.generator.generate(&self.request(&prompt), &schema).await?;
        info!(chars = report.report_markdown.len(), sources = visited_urls.len(), "Wrote final report");

        Ok(format!("{}{}", report.report_markdown, sources_section(visited_urls)))
    }

    /// A minimal direct answer in whatever format the topic asks for.
    pub async fn write_final_answer(&self, topic: &str, learnings: &[String]) -> Result<String> {
        let learnings = format_learnings(learnings);
        let prompt = match self.language {
            Language::English => format!(
                "Given the following prompt from the user, write a final answer on the topic using the learnings \
                 from research. Follow the format specified in the prompt. Do not include any extra text beyond \
                 the answer itself. Keep the answer as concise as possible - usually it should be just a few words \
                 or at most a sentence. If the prompt is using LaTeX, answer in LaTeX. If the prompt gives multiple \
                 answer choices, return one of the choices.\n\n<prompt>{topic}</prompt>\n\n\
                 Here are all the learnings from research on the topic that you can use to help answer the prompt:\
                 \n\n<learnings>\n{learnings}\n</learnings>"
            ),
            Language::Chinese => format!(
                "根据用户以下提示并使用研究所得要点，撰写最终答案。严格遵循提示的格式，只返回答案本身，不要额外文字。\
                 尽量简洁（通常几词或最多一句）。如果提示使用 LaTeX，则以 LaTeX 格式回答；如果提示包含多选项，\
                 请返回其中一个选项。\n\n<prompt>{topic}</prompt>\n\n以下为研究要点：\
                 \n\n<learnings>\n{learnings}\n</learnings>"
            ),
        };

        let schema = Schema::<FinalAnswer>::new(
            ANSWER_SCHEMA,
            ObjectSchema::new().add_property(
                "exactAnswer",
                PropertySchema::string(self.language.pick(
                    "The final answer, make it short and concise, just the answer, no other text",
                    "最终答案，应尽量简短，仅返回答案本身，不包含其他文字",
                )),
                true,
            ),
        );

        let answer = self.generator.generate(&self.request(&prompt), &schema).await?;
        Ok(answer.exact_answer)
    }

    fn request(&self, prompt: &str) -> GenerationRequest {
        GenerationRequest::new(
            system_prompt(self.language, Utc::now()),
            trim_prompt(prompt, MAX_PROMPT_CHARS),
        )
    }
}

fn sources_section(visited_urls: &[String]) -> String {
    let lines = visited_urls
        .iter()
        .map(|url| format!("- {url}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!("\n\n## Sources\n\n{lines}")
}
