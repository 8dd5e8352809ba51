//! dr-research: Recursive research engine for deep-research
//!
//! The pieces of a research run, each driven by a `StructuredGenerator`:
//! - `QueryPlanner`: topic to search queries
//! - `ResultDistiller`: fetched content to learnings and follow-up questions
//! - `ResearchEngine`: the concurrent breadth/depth recursion over both
//! - `Reporter`: learnings to a final report or a short answer
//! - `FeedbackGenerator`: clarifying questions before a run starts

pub mod config;
pub mod distiller;
pub mod engine;
pub mod feedback;
pub mod planner;
pub mod progress;
pub mod prompt;
pub mod reporter;

pub use config::{expand_path, ResearchConfig};
pub use distiller::{LearningSet, ResultDistiller};
pub use engine::{follow_up_topic, ResearchEngine, ResearchRequest, ResearchResult};
pub use feedback::{combine_feedback, FeedbackGenerator};
pub use planner::{QueryPlanner, SerpQuery};
pub use progress::{ProgressCallback, ResearchProgress};
pub use prompt::{system_prompt, trim_prompt, Language};
pub use reporter::Reporter;
