use chrono::{DateTime, Utc};
use merge_engine::{Conflict, Decision, MergeResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Overall outcome of a merge run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Success,
    NeedsReview,
    Partial,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::NeedsReview => "needs_review",
            RunStatus::Partial => "partial",
            RunStatus::Error => "error",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// AI usage during one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolverStats {
    pub calls_made: u32,
    pub estimated_tokens_used: usize,
}

/// One processed conflict and what was done about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictRecord {
    pub conflict: Conflict,
    pub result: MergeResult,
    /// AI merge scored under the configured confidence threshold.
    #[serde(default)]
    pub low_confidence: bool,
}

/// Decision for one file, with the conflicts behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileOutcome {
    pub file_path: String,
    /// Tasks that changed the file, in task order.
    pub tasks: Vec<String>,
    #[serde(flatten)]
    pub result: MergeResult,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<ConflictRecord>,
}

impl FileOutcome {
    pub fn new(file_path: impl Into<String>, tasks: Vec<String>, result: MergeResult) -> Self {
        Self {
            file_path: file_path.into(),
            tasks,
            result,
            conflicts: Vec::new(),
        }
    }

    pub fn decision(&self) -> Decision {
        self.result.decision
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub tasks: Vec<String>,
    pub target_branch: String,
    pub status: RunStatus,
    #[serde(default)]
    pub dry_run: bool,
    pub files_analyzed: usize,
    pub conflicts_detected: usize,
    pub auto_merged: usize,
    pub ai_merged: usize,
    pub needs_human_review: usize,
    pub failed: usize,
    pub results: Vec<FileOutcome>,
    pub errors: Vec<String>,
    #[serde(default)]
    pub resolver_stats: ResolverStats,
}

impl MergeReport {
    pub fn start(tasks: Vec<String>, target_branch: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            completed_at: None,
            tasks,
            target_branch: target_branch.into(),
            status: RunStatus::Running,
            dry_run: false,
            files_analyzed: 0,
            conflicts_detected: 0,
            auto_merged: 0,
            ai_merged: 0,
            needs_human_review: 0,
            failed: 0,
            results: Vec::new(),
            errors: Vec::new(),
            resolver_stats: ResolverStats::default(),
        }
    }

    /// Append a file outcome and bump its decision counter.
    pub fn record(&mut self, outcome: FileOutcome) {
        match outcome.decision() {
            Decision::AutoMerged => self.auto_merged += 1,
            Decision::AiMerged => self.ai_merged += 1,
            Decision::NeedsHumanReview => self.needs_human_review += 1,
            Decision::Failed => self.failed += 1,
        }
        self.results.push(outcome);
    }

    /// Close the run, deriving the status from the decision counters.
    pub fn finish(&mut self) {
        self.completed_at = Some(Utc::now());
        self.status = if self.failed == 0 && self.needs_human_review == 0 {
            RunStatus::Success
        } else if self.needs_human_review > 0 {
            RunStatus::NeedsReview
        } else {
            RunStatus::Partial
        };
    }

    /// Close the run with a run-level error.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
        self.status = RunStatus::Error;
        self.completed_at = Some(Utc::now());
    }

    pub fn outcome(&self, file_path: &str) -> Option<&FileOutcome> {
        self.results.iter().find(|r| r.file_path == file_path)
    }
}
