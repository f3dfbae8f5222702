use crate::apply::apply_merged;
use agentmerge_core::{
    ConflictRecord, EventSink, FileOutcome, MergeEvent, MergeReport, NoopSink, PathFilter, ReportStore, RunStatus,
    Settings, TaskRequest, TaskSnapshot, VersionControl,
};
use agentmerge_inference::{AiResolver, LanguageModel, ResolverConfig};
use merge_engine::{
    combine_non_conflicting, detect_conflicts, try_auto_merge, AutoMerge, Conflict, Decision, MergeResult,
    MergeStrategy, TaskAnalysis, TaskVersion,
};
use std::collections::{BTreeMap, BTreeSet};
use std::io::ErrorKind;
use std::sync::Arc;

/// Drives a merge run: collects snapshots, merges file by file, applies
/// the results and persists the report.
pub struct MergeOrchestrator {
    settings: Settings,
    vcs: Arc<dyn VersionControl>,
    model: Option<Arc<dyn LanguageModel>>,
    events: Arc<dyn EventSink>,
    filter: PathFilter,
    store: ReportStore,
}

impl MergeOrchestrator {
    pub fn new(settings: Settings, vcs: Arc<dyn VersionControl>) -> Self {
        let filter = PathFilter::new(settings.paths.extra_skip.clone());
        let store = ReportStore::new(settings.merge.storage_path());
        Self {
            settings,
            vcs,
            model: None,
            events: Arc::new(NoopSink),
            filter,
            store,
        }
    }

    /// Model used for conflicts that need AI. Ignored when AI is disabled.
    pub fn with_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &ReportStore {
        &self.store
    }

    /// Merge every task's changes onto `target_branch`.
    ///
    /// Always returns a report. Run-level failures are recorded in it with
    /// status `error`, and the report is persisted either way.
    pub async fn merge(&self, requests: &[TaskRequest], target_branch: &str) -> MergeReport {
        let task_ids: Vec<String> = requests.iter().map(|r| r.task_id.clone()).collect();
        let mut report = MergeReport::start(task_ids, target_branch);
        report.dry_run = self.settings.merge.dry_run;
        let run_id = report.run_id.to_string();

        self.events.emit(MergeEvent::RunStarted {
            run_id: run_id.clone(),
            tasks: report.tasks.clone(),
            target_branch: target_branch.to_string(),
        });

        let mut resolver = match (&self.model, self.settings.ai.enabled) {
            (Some(model), true) => Some(AiResolver::new(model.clone(), ResolverConfig::from(&self.settings.ai))),
            _ => None,
        };

        let outcome = self.run(&mut report, requests, target_branch, resolver.as_mut()).await;
        if let Some(resolver) = &resolver {
            report.resolver_stats = resolver.stats();
        }
        match outcome {
            Ok(()) => report.finish(),
            Err(e) => report.fail(format!("{:#}", e)),
        }

        if let Err(e) = self.store.save(&report).await {
            tracing::error!(error = %e, dir = %self.store.dir().display(), "Failed to save merge report");
            report.fail(format!("Failed to save report: {}", e));
        }

        if report.status == RunStatus::Error {
            self.events.emit(MergeEvent::RunError {
                run_id,
                error: report.errors.join("; "),
            });
        } else {
            self.events.emit(MergeEvent::RunCompleted {
                run_id,
                status: report.status,
                files_analyzed: report.files_analyzed,
            });
        }

        report
    }

    async fn run(
        &self,
        report: &mut MergeReport,
        requests: &[TaskRequest],
        target_branch: &str,
        mut resolver: Option<&mut AiResolver>,
    ) -> anyhow::Result<()> {
        let mut snapshots = Vec::with_capacity(requests.len());
        for request in requests {
            snapshots.push(self.collect_snapshot(request, target_branch).await);
        }

        let files: BTreeSet<String> = snapshots
            .iter()
            .flat_map(|s| s.files.keys().cloned())
            .collect();
        let baseline = self.fetch_baseline(target_branch, &files).await;
        for snapshot in &mut snapshots {
            snapshot.analyze(&baseline);
        }
        report.files_analyzed = files.len();
        tracing::info!(files = files.len(), tasks = snapshots.len(), "Collected task snapshots");

        for file in &files {
            let base = baseline.get(file).map(String::as_str).unwrap_or("");
            let outcome = self.merge_file(file, base, &snapshots, resolver.as_deref_mut()).await;
            tracing::info!(
                file = %file,
                decision = %outcome.decision(),
                conflicts = outcome.conflicts.len(),
                "{}",
                outcome.result.explanation
            );
            report.conflicts_detected += outcome.conflicts.len();
            report.record(outcome);
        }

        if self.settings.merge.dry_run {
            tracing::info!("Dry run, no files written");
        } else {
            let written = apply_merged(&self.settings.merge.root_path, &report.results, self.events.as_ref()).await?;
            tracing::info!(written, "Applied merged files");
        }

        Ok(())
    }

    /// Read the task's changed files from its working copy. Unreadable or
    /// missing files are left out.
    async fn collect_snapshot(&self, request: &TaskRequest, target_branch: &str) -> TaskSnapshot {
        let mut snapshot = TaskSnapshot::new(&request.task_id, request.intent.clone());
        let base = request.branch.as_deref().unwrap_or(target_branch);

        let changed = match self.vcs.changed_files(&request.working_copy, base).await {
            Ok(paths) => paths,
            Err(e) => {
                tracing::warn!(task = %request.task_id, error = %e, "Could not list changed files");
                return snapshot;
            }
        };

        for path in changed.into_iter().filter(|p| self.filter.should_process(p)) {
            match tokio::fs::read_to_string(request.working_copy.join(&path)).await {
                Ok(content) => {
                    snapshot.files.insert(path, content);
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    tracing::debug!(task = %request.task_id, file = %path, "Changed file no longer on disk");
                }
                Err(e) => {
                    tracing::warn!(task = %request.task_id, file = %path, error = %e, "Skipping unreadable file");
                }
            }
        }

        tracing::debug!(task = %request.task_id, files = snapshot.files.len(), "Snapshot collected");
        snapshot
    }

    /// Baseline content of the tracked paths among `wanted`. Paths that
    /// cannot be read are absent and count as empty.
    async fn fetch_baseline(&self, target_branch: &str, wanted: &BTreeSet<String>) -> BTreeMap<String, String> {
        let mut baseline = BTreeMap::new();

        let tracked = match self.vcs.list_files(target_branch).await {
            Ok(paths) => paths,
            Err(e) => {
                tracing::warn!(branch = %target_branch, error = %e, "Could not list baseline files");
                return baseline;
            }
        };

        for path in tracked
            .into_iter()
            .filter(|p| self.filter.should_process(p) && wanted.contains(p))
        {
            match self.vcs.read_file(target_branch, &path).await {
                Ok(content) => {
                    baseline.insert(path, content);
                }
                Err(e) => tracing::warn!(file = %path, error = %e, "Could not read baseline file"),
            }
        }

        baseline
    }

    async fn merge_file(
        &self,
        file: &str,
        base: &str,
        snapshots: &[TaskSnapshot],
        mut resolver: Option<&mut AiResolver>,
    ) -> FileOutcome {
        let touching: Vec<&TaskSnapshot> = snapshots.iter().filter(|s| s.touches(file)).collect();
        let tasks: Vec<String> = touching.iter().map(|s| s.task_id.clone()).collect();

        self.events.emit(MergeEvent::FileProcessing {
            file_path: file.to_string(),
            tasks: tasks.clone(),
        });

        let mut contents: Vec<(&str, &str)> = Vec::with_capacity(touching.len());
        let mut analyses = Vec::with_capacity(touching.len());
        for snapshot in &touching {
            if let (Some(content), Some(analysis)) = (snapshot.content(file), snapshot.analyses.get(file)) {
                contents.push((snapshot.task_id.as_str(), content));
                analyses.push(analysis);
            }
        }

        if let [(task_id, content)] = contents.as_slice() {
            return FileOutcome::new(
                file,
                tasks,
                MergeResult::auto_merged(*content, format!("Single task {} modified file", task_id)),
            );
        }

        let pairs: Vec<TaskAnalysis<'_>> = contents
            .iter()
            .zip(&analyses)
            .map(|((id, _), analysis)| TaskAnalysis::new(id, analysis))
            .collect();
        let conflicts = detect_conflicts(&pairs);

        if conflicts.is_empty() {
            let versions: Vec<TaskVersion<'_>> = contents
                .iter()
                .zip(&analyses)
                .map(|(&(task_id, content), analysis)| TaskVersion {
                    task_id,
                    content,
                    analysis,
                })
                .collect();
            return FileOutcome::new(file, tasks, combine_non_conflicting(file, base, &versions));
        }

        tracing::debug!(file = %file, conflicts = conflicts.len(), "Conflicts detected");

        let mut records = Vec::with_capacity(conflicts.len());
        for conflict in conflicts {
            let result = self
                .resolve(&conflict, base, &contents, snapshots, resolver.as_deref_mut())
                .await;
            let low_confidence = result.decision == Decision::AiMerged
                && result
                    .confidence
                    .is_some_and(|c| c < self.settings.merge.confidence_threshold);
            if low_confidence {
                tracing::warn!(
                    file = %file,
                    location = %conflict.location,
                    confidence = result.confidence,
                    "AI merge below confidence threshold"
                );
            }
            records.push(ConflictRecord {
                conflict,
                result,
                low_confidence,
            });
        }

        aggregate_file(file, tasks, records)
    }

    async fn resolve(
        &self,
        conflict: &Conflict,
        base: &str,
        contents: &[(&str, &str)],
        snapshots: &[TaskSnapshot],
        resolver: Option<&mut AiResolver>,
    ) -> MergeResult {
        let reason = match try_auto_merge(conflict, base, contents) {
            AutoMerge::Merged { content, explanation } => return MergeResult::auto_merged(content, explanation),
            AutoMerge::Declined { reason } => reason,
        };

        match (conflict.strategy, resolver) {
            (MergeStrategy::AiRequired, Some(resolver)) => {
                resolver.resolve_conflict(conflict, base, snapshots).await
            }
            (MergeStrategy::HumanRequired, _) => {
                MergeResult::needs_review(format!("Human review required: {}", conflict.reason))
            }
            _ => {
                tracing::debug!(file = %conflict.file_path, reason = %reason, "Conflict left for review");
                MergeResult::needs_review("No auto-merge strategy and AI disabled")
            }
        }
    }
}

/// Fold per-conflict results into the file's decision.
///
/// When every conflict merged, the file takes the content of the last
/// conflict that produced any; earlier resolutions are not composed with
/// it. One failed conflict fails the file; otherwise any unmerged conflict
/// sends the file to review.
pub fn aggregate_file(file: &str, tasks: Vec<String>, records: Vec<ConflictRecord>) -> FileOutcome {
    let explanation = format!("{} conflicts processed", records.len());
    let all_merged = records.iter().all(|r| r.result.is_merged());

    let mut result = if all_merged {
        let used_ai = records.iter().any(|r| r.result.decision == Decision::AiMerged);
        let content = records
            .iter()
            .rev()
            .find_map(|r| r.result.merged_content.clone())
            .unwrap_or_default();
        if used_ai {
            let confidence = records
                .iter()
                .filter_map(|r| r.result.confidence)
                .fold(1.0_f64, f64::min);
            MergeResult::ai_merged(content, explanation, confidence, 0)
        } else {
            MergeResult::auto_merged(content, explanation)
        }
    } else if let Some(failed) = records.iter().find(|r| r.result.decision == Decision::Failed) {
        let mut result = MergeResult::failed(failed.result.error.clone().unwrap_or_default());
        result.explanation = explanation;
        result
    } else {
        MergeResult::needs_review(explanation)
    };

    result.ai_calls_made = records.iter().map(|r| r.result.ai_calls_made).sum();
    result.tokens_used = records.iter().map(|r| r.result.tokens_used).sum();

    FileOutcome {
        file_path: file.to_string(),
        tasks,
        result,
        conflicts: records,
    }
}
