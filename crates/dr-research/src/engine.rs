//! Recursive breadth/depth research.
//!
//! Each call plans up to `breadth` queries and runs them as concurrent
//! branches. A branch fetches content, distills it, and either recurses on
//! its follow-up questions with half the breadth (rounded up) and one less
//! depth, or returns what it has. Depth alone bounds the recursion: breadth
//! stalls at 1 and never reaches zero by halving.
//!
//! One semaphore is shared by every level of the tree. A branch holds a
//! permit only while fetching and distilling, and releases it before
//! recursing, so a parent never waits on a permit its own children need.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use dr_core::{Error, Result, StructuredGenerator};
use dr_sources::{ContentSource, Quota};

use crate::config::ResearchConfig;
use crate::distiller::ResultDistiller;
use crate::planner::{QueryPlanner, SerpQuery};
use crate::progress::{ProgressCallback, ProgressTracker};

/// Learnings requested from each distillation.
pub const LEARNINGS_PER_QUERY: usize = 3;

/// Input to one research run.
#[derive(Debug, Clone, Default)]
pub struct ResearchRequest {
    pub topic: String,
    pub breadth: usize,
    pub depth: usize,
    pub learnings: Vec<String>,
    pub visited_urls: Vec<String>,
}

impl ResearchRequest {
    pub fn new(topic: impl Into<String>, breadth: usize, depth: usize) -> Self {
        Self {
            topic: topic.into(),
            breadth,
            depth,
            ..Default::default()
        }
    }

    pub fn with_learnings(mut self, learnings: Vec<String>) -> Self {
        self.learnings = learnings;
        self
    }

    pub fn with_visited_urls(mut self, visited_urls: Vec<String>) -> Self {
        self.visited_urls = visited_urls;
        self
    }
}

/// Learnings and visited source ids, free of duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchResult {
    pub learnings: Vec<String>,
    pub visited_urls: Vec<String>,
}

impl ResearchResult {
    /// Union of `results`, keeping the first occurrence of each item.
    pub fn merge(results: impl IntoIterator<Item = ResearchResult>) -> Self {
        let mut learnings = Vec::new();
        let mut visited_urls = Vec::new();
        for result in results {
            learnings.extend(result.learnings);
            visited_urls.extend(result.visited_urls);
        }
        Self {
            learnings: dedup(learnings),
            visited_urls: dedup(visited_urls),
        }
    }
}

fn dedup(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(items.len());
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

/// Topic for a recursive call: the branch's research goal and its follow-ups.
pub fn follow_up_topic(research_goal: &str, questions: &[String]) -> String {
    let directions: String = questions.iter().map(|q| format!("\n{q}")).collect();
    format!("Previous research goal: {research_goal}\nFollow-up research directions: {directions}")
        .trim()
        .to_string()
}

pub struct ResearchEngine {
    planner: QueryPlanner,
    distiller: ResultDistiller,
    source: Arc<dyn ContentSource>,
    limiter: Arc<Semaphore>,
    quota: Quota,
    max_depth: usize,
}

impl ResearchEngine {
    pub fn new(
        generator: Arc<dyn StructuredGenerator>,
        source: Arc<dyn ContentSource>,
        config: &ResearchConfig,
    ) -> Self {
        Self {
            planner: QueryPlanner::new(generator.clone(), config.language),
            distiller: ResultDistiller::new(generator, config.language)
                .with_timeout(config.distill_timeout())
                .with_max_content_chars(config.max_content_chars),
            source,
            limiter: Arc::new(Semaphore::new(config.concurrency())),
            quota: config.quota(),
            max_depth: config.max_depth,
        }
    }

    /// Run a research tree for `request`.
    ///
    /// Failed branches contribute nothing and never abort their siblings.
    /// Only a failure to plan the top-level queries is returned as an error.
    pub async fn research(
        &self,
        request: ResearchRequest,
        on_progress: Option<ProgressCallback>,
    ) -> Result<ResearchResult> {
        let mut depth = request.depth;
        if depth > self.max_depth {
            warn!(requested = depth, max = self.max_depth, "Capping research depth");
            depth = self.max_depth;
        }

        info!(breadth = request.breadth, depth, "Starting research");
        self.research_level(
            request.topic,
            request.breadth,
            depth,
            request.learnings,
            request.visited_urls,
            on_progress,
        )
        .await
    }

    fn research_level(
        &self,
        topic: String,
        breadth: usize,
        depth: usize,
        learnings: Vec<String>,
        visited_urls: Vec<String>,
        on_progress: Option<ProgressCallback>,
    ) -> BoxFuture<'_, Result<ResearchResult>> {
        async move {
            let tracker = ProgressTracker::new(depth, breadth, on_progress.clone());

            let queries = self
                .planner
                .generate_queries(&topic, breadth, &learnings)
                .await?;

            tracker.report(|p| {
                p.total_queries = queries.len();
                p.current_query = queries.first().map(|q| q.query.clone());
            });

            let branches = queries.into_iter().map(|query| {
                self.run_branch(
                    query,
                    breadth,
                    depth,
                    &learnings,
                    &visited_urls,
                    &tracker,
                    on_progress.clone(),
                )
            });
            let results = join_all(branches).await;

            Ok(ResearchResult::merge(results))
        }
        .boxed()
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_branch(
        &self,
        query: SerpQuery,
        breadth: usize,
        depth: usize,
        learnings: &[String],
        visited_urls: &[String],
        tracker: &ProgressTracker,
        on_progress: Option<ProgressCallback>,
    ) -> ResearchResult {
        match self
            .explore(&query, breadth, depth, learnings, visited_urls, tracker, on_progress)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                if e.is_timeout() {
                    warn!(query = %query.query, error = %e, "Timeout error running query");
                } else {
                    warn!(query = %query.query, error = %e, "Error running query");
                }
                ResearchResult::default()
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn explore(
        &self,
        query: &SerpQuery,
        breadth: usize,
        depth: usize,
        learnings: &[String],
        visited_urls: &[String],
        tracker: &ProgressTracker,
        on_progress: Option<ProgressCallback>,
    ) -> Result<ResearchResult> {
        let new_breadth = breadth.div_ceil(2);
        let new_depth = depth.saturating_sub(1);

        let permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| Error::Unknown("research limiter closed".to_string()))?;

        let fetched = self.source.fetch(&query.query, self.quota).await;
        debug!(
            query = %query.query,
            contents = fetched.contents.len(),
            sources = fetched.source_ids.len(),
            "Fetched content"
        );

        let distilled = self
            .distiller
            .distill(query, &fetched.contents, LEARNINGS_PER_QUERY, new_breadth)
            .await?;
        drop(permit);

        let all_learnings: Vec<String> = learnings
            .iter()
            .cloned()
            .chain(distilled.learnings)
            .collect();
        let all_urls: Vec<String> = visited_urls
            .iter()
            .cloned()
            .chain(fetched.source_ids)
            .collect();

        if new_depth > 0 {
            info!(breadth = new_breadth, depth = new_depth, "Researching deeper");
            tracker.report(|p| {
                p.current_depth = new_depth;
                p.current_breadth = new_breadth;
                p.completed_queries += 1;
                p.current_query = Some(query.query.clone());
            });

            let next_topic = follow_up_topic(&query.research_goal, &distilled.follow_up_questions);
            self.research_level(
                next_topic,
                new_breadth,
                new_depth,
                all_learnings,
                all_urls,
                on_progress,
            )
            .await
        } else {
            tracker.report(|p| {
                p.current_depth = 0;
                p.completed_queries += 1;
                p.current_query = Some(query.query.clone());
            });
            Ok(ResearchResult {
                learnings: all_learnings,
                visited_urls: all_urls,
            })
        }
    }
}
