//! Prompt text shared by every generation call: the researcher preamble,
//! the output language and prompt-size trimming.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Upper bound on the size of any prompt sent to the generator, in characters.
pub const MAX_PROMPT_CHARS: usize = 128_000;

/// Language of prompt text. Affects wording only, never behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    #[default]
    English,
    Chinese,
}

impl Language {
    /// `CN` (any case) selects Chinese; every other value selects English.
    pub fn from_flag(flag: &str) -> Self {
        if flag.trim().eq_ignore_ascii_case("cn") {
            Language::Chinese
        } else {
            Language::English
        }
    }

    pub fn as_flag(&self) -> &'static str {
        match self {
            Language::English => "EN",
            Language::Chinese => "CN",
        }
    }

    /// Pick the variant of a text matching this language.
    pub fn pick<'a>(&self, english: &'a str, chinese: &'a str) -> &'a str {
        match self {
            Language::English => english,
            Language::Chinese => chinese,
        }
    }
}

impl Serialize for Language {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_flag())
    }
}

impl<'de> Deserialize<'de> for Language {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let flag = String::deserialize(deserializer)?;
        Ok(Language::from_flag(&flag))
    }
}

/// The expert-researcher preamble used as the system message for every call.
pub fn system_prompt(language: Language, now: DateTime<Utc>) -> String {
    let today = now.to_rfc3339_opts(SecondsFormat::Millis, true);
    match language {
        Language::English => format!(
            r#"You are an expert researcher. Today is {today}. Follow these instructions when responding:
  - You may be asked to research subjects that are after your knowledge cutoff; assume the user is right when presented with news.
  - The user is a highly experienced analyst. There is no need to simplify; be as detailed as possible and make sure your response is correct.
  - Be highly organized.
  - Suggest solutions the user did not think about.
  - Be proactive and anticipate the user's needs.
  - Treat the user as an expert in all subject matter.
  - Mistakes erode trust, so be accurate and thorough.
  - Provide detailed explanations; the user is comfortable with lots of detail.
  - Value good arguments over authorities; the source alone is not decisive.
  - Consider new technologies and contrarian ideas, not just the conventional wisdom.
  - High levels of speculation or prediction are allowed, but flag them as such."#
        ),
        Language::Chinese => format!(
            r#"你是一位资深研究员。今天的日期是 {today}。回答时请遵循以下要求：
  - 你可能需要研究发生在你知识截止日期之后的事件；当用户提供新闻信息时，默认用户是正确的。
  - 用户是经验丰富的分析师，无需简化内容，请尽可能详尽并确保回答准确。
  - 回答要条理清晰。
  - 提出用户没有想到的解决方案。
  - 主动预判用户的需求。
  - 把用户当作各个领域的专家。
  - 错误会损害信任，因此务必准确、全面。
  - 给出详细的解释，用户能够接受大量细节。
  - 重视论证的质量而非权威，来源本身并不决定结论。
  - 考虑新技术和非主流观点，而不只是传统共识。
  - 可以进行较大胆的推测或预测，但请明确标注为推测。"#
        ),
    }
}

/// Trim `text` to at most `max_chars` characters, on a character boundary.
pub fn trim_prompt(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

/// Wrap each learning in `<learning>` tags, one block per line group.
pub fn format_learnings(learnings: &[String]) -> String {
    learnings
        .iter()
        .map(|learning| format!("<learning>\n{}\n</learning>", learning))
        .collect::<Vec<_>>()
        .join("\n")
}
