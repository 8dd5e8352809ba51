use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dr_research::{ProgressCallback, ResearchProgress};

/// One status line per progress update, on stderr.
pub fn progress_printer() -> ProgressCallback {
    Arc::new(|progress: &ResearchProgress| eprintln!("{}", format_progress(progress)))
}

fn format_progress(progress: &ResearchProgress) -> String {
    let mut line = format!(
        "[depth {}/{} | breadth {}/{} | queries {}/{}]",
        progress.current_depth,
        progress.total_depth,
        progress.current_breadth,
        progress.total_breadth,
        progress.completed_queries,
        progress.total_queries,
    );
    if let Some(query) = &progress.current_query {
        line.push(' ');
        line.push_str(query);
    }
    line
}

/// Write `content` to `dir/file_name`, creating `dir` if needed.
pub fn write_output(dir: &Path, file_name: &str, content: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
    let path = dir.join(file_name);
    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}
