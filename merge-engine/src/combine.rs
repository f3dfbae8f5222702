//! Combining a multi-task file on which no conflicts were detected.
//!
//! The task with the most changes provides the starting content (the first
//! such task on ties). Import lines and functions that the other tasks added
//! are then layered on with the auto-merge recipes. Other edits made by the
//! non-starting tasks are not carried over.
//!
//! When an added import spans several lines or an added function cannot be
//! isolated, the file is sent to review without merged content.

use std::collections::HashSet;

use crate::automerge::{combine_functions, combine_imports, single_line_imports};
use crate::language::Language;
use crate::types::{FileAnalysis, MergeResult};

/// One task's version of a file along with its analysis against the baseline.
#[derive(Debug, Clone, Copy)]
pub struct TaskVersion<'a> {
    pub task_id: &'a str,
    pub content: &'a str,
    pub analysis: &'a FileAnalysis,
}

/// Index of the task with the most changes; earlier tasks win ties.
pub fn most_changed(versions: &[TaskVersion<'_>]) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;
    for (i, version) in versions.iter().enumerate() {
        let count = version.analysis.changes.len();
        if best.is_none_or(|(_, top)| count > top) {
            best = Some((i, count));
        }
    }
    best.map(|(i, _)| i)
}

/// Merge the versions of a conflict-free file.
pub fn combine_non_conflicting(file_path: &str, base: &str, versions: &[TaskVersion<'_>]) -> MergeResult {
    let Some(winner) = most_changed(versions) else {
        return MergeResult::auto_merged(base.to_string(), "No task versions to combine");
    };
    let others: Vec<&TaskVersion<'_>> = versions
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != winner)
        .map(|(_, v)| v)
        .collect();

    let mut merged = versions[winner].content.to_string();

    // Import lines added by other tasks and missing from the starting content
    let base_lines: HashSet<&str> = base.lines().map(str::trim).collect();
    let mut present: HashSet<String> = merged.lines().map(|l| l.trim().to_string()).collect();
    let mut extra_imports = Vec::new();
    for version in &others {
        let Some(imports) = single_line_imports(version.content) else {
            if version.analysis.imports_added.is_empty() {
                continue;
            }
            return MergeResult::needs_review(format!(
                "Imports added by {} span several lines and cannot be combined",
                version.task_id
            ));
        };
        for line in imports {
            if !base_lines.contains(line) && present.insert(line.to_string()) {
                extra_imports.push(line.to_string());
            }
        }
    }
    if !extra_imports.is_empty() {
        let extra = extra_imports.join("\n");
        match combine_imports(&merged, [merged.as_str(), extra.as_str()]) {
            Some((content, _)) => merged = content,
            None => {
                return MergeResult::needs_review(format!(
                    "Imports of {} span several lines and cannot be combined",
                    versions[winner].task_id
                ));
            }
        }
    }

    let mut names: Vec<&str> = Vec::new();
    for version in &others {
        for name in &version.analysis.functions_added {
            if !names.contains(&name.as_str()) {
                names.push(name);
            }
        }
    }
    if !names.is_empty() {
        let contents: Vec<(&str, &str)> = others.iter().map(|v| (v.task_id, v.content)).collect();
        match combine_functions(&merged, &contents, names.iter().copied(), Language::from_path(file_path)) {
            Ok(content) => merged = content,
            Err(name) => {
                return MergeResult::needs_review(format!(
                    "Could not isolate function {} added by another task",
                    name
                ));
            }
        }
    }

    MergeResult::auto_merged(merged, "No conflicts detected, changes combined")
}
