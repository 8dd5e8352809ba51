use std::sync::{Arc, Mutex};

use serde::Serialize;

/// Snapshot of one research call's progress.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchProgress {
    pub current_depth: usize,
    pub total_depth: usize,
    pub current_breadth: usize,
    pub total_breadth: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_query: Option<String>,
    pub total_queries: usize,
    pub completed_queries: usize,
}

impl ResearchProgress {
    pub fn new(depth: usize, breadth: usize) -> Self {
        Self {
            current_depth: depth,
            total_depth: depth,
            current_breadth: breadth,
            total_breadth: breadth,
            ..Default::default()
        }
    }
}

/// Observer of progress snapshots. Concurrent branches may interleave calls.
pub type ProgressCallback = Arc<dyn Fn(&ResearchProgress) + Send + Sync>;

/// Progress record of a single call frame, shared by its branches.
///
/// Each update is applied under the lock and the callback sees a copy taken
/// at that moment, so it runs without the lock held.
pub(crate) struct ProgressTracker {
    state: Mutex<ResearchProgress>,
    callback: Option<ProgressCallback>,
}

impl ProgressTracker {
    pub(crate) fn new(depth: usize, breadth: usize, callback: Option<ProgressCallback>) -> Self {
        Self {
            state: Mutex::new(ResearchProgress::new(depth, breadth)),
            callback,
        }
    }

    pub(crate) fn report(&self, update: impl FnOnce(&mut ResearchProgress)) {
        let snapshot = {
            let mut state = match self.state.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            update(&mut state);
            state.clone()
        };

        if let Some(callback) = &self.callback {
            callback(&snapshot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_progress_starts_at_totals() {
        let progress = ResearchProgress::new(2, 4);
        assert_eq!(progress.current_depth, 2);
        assert_eq!(progress.total_depth, 2);
        assert_eq!(progress.current_breadth, 4);
        assert_eq!(progress.total_breadth, 4);
        assert_eq!(progress.completed_queries, 0);
        assert!(progress.current_query.is_none());
    }

    #[test]
    fn test_report_merges_then_notifies() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: ProgressCallback = Arc::new(move |p: &ResearchProgress| {
            sink.lock().unwrap().push(p.clone());
        });

        let tracker = ProgressTracker::new(1, 2, Some(callback));
        tracker.report(|p| p.total_queries = 2);
        tracker.report(|p| p.completed_queries += 1);
        tracker.report(|p| p.completed_queries += 1);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[2].total_queries, 2);
        assert_eq!(seen[2].completed_queries, 2);
    }

    #[test]
    fn test_serializes_camel_case() {
        let mut progress = ResearchProgress::new(1, 1);
        progress.current_query = Some("q".into());
        let value = serde_json::to_value(&progress).unwrap();
        assert_eq!(value["currentQuery"], "q");
        assert_eq!(value["totalDepth"], 1);
    }
}
