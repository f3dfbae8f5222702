use merge_engine::Decision;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

use crate::report::RunStatus;

/// Lifecycle notifications emitted by a merge run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MergeEvent {
    RunStarted {
        run_id: String,
        tasks: Vec<String>,
        target_branch: String,
    },
    FileProcessing {
        file_path: String,
        tasks: Vec<String>,
    },
    FileMerged {
        file_path: String,
        decision: Decision,
    },
    RunCompleted {
        run_id: String,
        status: RunStatus,
        files_analyzed: usize,
    },
    RunError {
        run_id: String,
        error: String,
    },
}

impl MergeEvent {
    pub fn name(&self) -> &'static str {
        match self {
            MergeEvent::RunStarted { .. } => "run_started",
            MergeEvent::FileProcessing { .. } => "file_processing",
            MergeEvent::FileMerged { .. } => "file_merged",
            MergeEvent::RunCompleted { .. } => "run_completed",
            MergeEvent::RunError { .. } => "run_error",
        }
    }
}

/// Receiver of lifecycle events. Emission must not block the run.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: MergeEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: MergeEvent) {}
}

/// Forwards events to an async subscriber.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: UnboundedSender<MergeEvent>,
}

impl ChannelSink {
    pub fn new(tx: UnboundedSender<MergeEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: MergeEvent) {
        // A dropped receiver only means nobody is listening
        let _ = self.tx.send(event);
    }
}

/// Turns events into log records.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: MergeEvent) {
        match &event {
            MergeEvent::RunStarted { run_id, tasks, target_branch } => {
                tracing::info!(run = %run_id, branch = %target_branch, tasks = ?tasks, "Merge started");
            }
            MergeEvent::FileProcessing { file_path, tasks } => {
                tracing::debug!(file = %file_path, tasks = ?tasks, "Processing file");
            }
            MergeEvent::FileMerged { file_path, decision } => {
                tracing::info!(file = %file_path, decision = %decision, "File written");
            }
            MergeEvent::RunCompleted { run_id, status, files_analyzed } => {
                tracing::info!(run = %run_id, status = %status, files = files_analyzed, "Merge completed");
            }
            MergeEvent::RunError { run_id, error } => {
                tracing::error!(run = %run_id, "Merge failed: {}", error);
            }
        }
    }
}

impl<F> EventSink for F
where
    F: Fn(MergeEvent) + Send + Sync,
{
    fn emit(&self, event: MergeEvent) {
        self(event)
    }
}
