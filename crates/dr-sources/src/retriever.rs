//! Local document retrieval through an external retriever process.
//!
//! The retriever is invoked as `<program> <script> --q <query> --k <count>`
//! from the script's own directory, inheriting the parent environment. It
//! prints a JSON array of `{ "distilled": ..., "file_path": ... }` objects on
//! stdout.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use dr_core::Error;

use crate::{SearchProvider, SourceHit};

/// Configuration for the subprocess retriever
#[derive(Clone, Debug)]
pub struct RetrieverConfig {
    /// Interpreter used to run the script (e.g. "python")
    pub program: String,
    /// Path to the retriever script; its directory becomes the working directory
    pub script: PathBuf,
    /// Optional wall-clock limit for one invocation
    pub timeout: Option<Duration>,
}

impl RetrieverConfig {
    pub fn new(program: impl Into<String>, script: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            script: script.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn working_dir(&self) -> &Path {
        match self.script.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        }
    }

    fn script_arg(&self) -> &std::ffi::OsStr {
        self.script
            .file_name()
            .unwrap_or_else(|| self.script.as_os_str())
    }
}

pub struct SubprocessRetriever {
    config: RetrieverConfig,
}

impl SubprocessRetriever {
    pub fn new(config: RetrieverConfig) -> Self {
        Self { config }
    }
}

#[derive(Debug, Deserialize)]
struct RetrievedDocument {
    #[serde(default)]
    distilled: Option<String>,
    #[serde(default)]
    file_path: Option<String>,
}

/// Parse retriever stdout. Empty or malformed output is zero hits, not an error.
fn parse_output(stdout: &str, limit: usize) -> Vec<SourceHit> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let documents: Vec<RetrievedDocument> = match serde_json::from_str(trimmed) {
        Ok(documents) => documents,
        Err(e) => {
            debug!(error = %e, "Retriever output is not a JSON array of hits");
            return Vec::new();
        }
    };

    documents
        .into_iter()
        .take(limit)
        .filter(|doc| doc.distilled.is_some() || doc.file_path.is_some())
        .map(|doc| {
            SourceHit::new(
                doc.distilled.unwrap_or_default(),
                doc.file_path.unwrap_or_default(),
            )
        })
        .collect()
}

#[async_trait]
impl SearchProvider for SubprocessRetriever {
    fn name(&self) -> &str {
        "retriever"
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SourceHit>, Error> {
        let mut cmd = tokio::process::Command::new(&self.config.program);
        cmd.arg(self.config.script_arg());
        cmd.args(["--q", query, "--k", &limit.to_string()]);
        cmd.current_dir(self.config.working_dir());
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let output = match self.config.timeout {
            Some(deadline) => tokio::time::timeout(deadline, cmd.output())
                .await
                .map_err(|_| {
                    Error::source(
                        "retriever",
                        format!("retriever timed out after {}s", deadline.as_secs()),
                    )
                })?,
            None => cmd.output().await,
        }
        .map_err(|e| {
            Error::source(
                "retriever",
                format!("Failed to run {}: {}", self.config.program, e),
            )
        })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            debug!(stderr = %stderr.trim(), "Retriever stderr");
        }

        if !output.status.success() {
            return Err(Error::source(
                "retriever",
                format!(
                    "exited with status {}: {}",
                    output.status.code().unwrap_or(-1),
                    stderr.trim()
                ),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let hits = parse_output(&stdout, limit);
        if hits.is_empty() && !stdout.trim().is_empty() && stdout.trim() != "[]" {
            warn!(query, "Retriever produced output but no usable hits");
        }
        debug!(query, hits = hits.len(), "Retriever search complete");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_output_handles_empty_and_malformed() {
        assert!(parse_output("", 3).is_empty());
        assert!(parse_output("   \n", 3).is_empty());
        assert!(parse_output("Traceback (most recent call last)", 3).is_empty());
        assert!(parse_output(r#"{"distilled": "not an array"}"#, 3).is_empty());
    }

    #[test]
    fn test_parse_output_maps_optional_fields() {
        let stdout = r#"[
            {"distilled": "Fact one", "file_path": "docs/a.md", "score": 0.9},
            {"file_path": "docs/b.md"},
            {"distilled": "Fact three"},
            {},
            {"distilled": "Over the limit", "file_path": "docs/e.md"}
        ]"#;

        let hits = parse_output(stdout, 4);
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0], SourceHit::new("Fact one", "docs/a.md"));
        assert_eq!(hits[1], SourceHit::new("", "docs/b.md"));
        assert_eq!(hits[2], SourceHit::new("Fact three", ""));
    }

    #[test]
    fn test_working_dir_and_script_arg() {
        let config = RetrieverConfig::new("python", "database/retrieve_distilled.py");
        assert_eq!(config.working_dir(), Path::new("database"));
        assert_eq!(config.script_arg(), "retrieve_distilled.py");

        let bare = RetrieverConfig::new("python", "retrieve.py");
        assert_eq!(bare.working_dir(), Path::new("."));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_search_runs_script_in_its_directory() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("retrieve.sh");
        // Echo the arguments back so the test can check the invocation
        std::fs::write(
            &script,
            "printf '[{\"distilled\": \"%s %s %s %s\", \"file_path\": \"%s\"}]' \"$1\" \"$2\" \"$3\" \"$4\" \"$(pwd)\"\n",
        )
        .unwrap();

        let retriever = SubprocessRetriever::new(RetrieverConfig::new("sh", &script));
        let hits = retriever.search("solid state batteries", 2).await.unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "--q solid state batteries --k 2");
        let reported = std::fs::canonicalize(&hits[0].source_id).unwrap();
        assert_eq!(reported, std::fs::canonicalize(dir.path()).unwrap());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_search_nonzero_exit_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fail.sh");
        std::fs::write(&script, "echo 'index missing' >&2\nexit 3\n").unwrap();

        let retriever = SubprocessRetriever::new(RetrieverConfig::new("sh", &script));
        let err = retriever.search("q", 1).await.unwrap_err();
        assert!(matches!(err, Error::Source { .. }));
        assert!(err.to_string().contains("index missing"));
    }
}
