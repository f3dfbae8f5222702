use merge_engine::{analyze_diff, Change, FileAnalysis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A task handed to the merge run by the surrounding orchestration layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskRequest {
    pub task_id: String,
    pub working_copy: PathBuf,
    /// Base the task's changes are diffed against; the run's target when absent.
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub intent: Option<String>,
}

impl TaskRequest {
    pub fn new(task_id: impl Into<String>, working_copy: impl Into<PathBuf>) -> Self {
        Self {
            task_id: task_id.into(),
            working_copy: working_copy.into(),
            branch: None,
            intent: None,
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn with_intent(mut self, intent: impl Into<String>) -> Self {
        self.intent = Some(intent.into());
        self
    }
}

/// One task's files as collected at the start of a run.
#[derive(Debug, Clone, Default)]
pub struct TaskSnapshot {
    pub task_id: String,
    pub intent: Option<String>,
    /// Path to full content of every changed file that could be read.
    pub files: BTreeMap<String, String>,
    /// Analysis of each file against the baseline, filled in by [`TaskSnapshot::analyze`].
    pub analyses: BTreeMap<String, FileAnalysis>,
}

impl TaskSnapshot {
    pub fn new(task_id: impl Into<String>, intent: Option<String>) -> Self {
        Self {
            task_id: task_id.into(),
            intent,
            ..Default::default()
        }
    }

    pub fn touches(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn content(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    /// Analyse every file against its baseline content. Missing baseline
    /// paths count as empty files.
    pub fn analyze(&mut self, baseline: &BTreeMap<String, String>) {
        self.analyses = self
            .files
            .iter()
            .map(|(path, content)| {
                let before = baseline.get(path).map(String::as_str).unwrap_or("");
                (path.clone(), analyze_diff(path, before, content))
            })
            .collect();
    }

    pub fn changes(&self, path: &str) -> &[Change] {
        self.analyses
            .get(path)
            .map(|a| a.changes.as_slice())
            .unwrap_or(&[])
    }
}
