//! Conflict detection between tasks that edited the same file.
//!
//! Every unordered pair of tasks is compared, and within a pair every change
//! of one task against every change of the other. Overlapping changes are
//! classified through the compatibility table:
//! - compatible entry: no conflict, the pair is mergeable
//! - incompatible entry: conflict with the entry's severity and strategy
//! - no entry: conflict requiring AI at medium severity

use crate::rules::{self, UNKNOWN_COMBINATION};
use crate::types::{Change, Conflict, FileAnalysis, MergeStrategy};

/// One task's analysis of the file under detection.
#[derive(Debug, Clone, Copy)]
pub struct TaskAnalysis<'a> {
    pub task_id: &'a str,
    pub analysis: &'a FileAnalysis,
}

impl<'a> TaskAnalysis<'a> {
    pub fn new(task_id: &'a str, analysis: &'a FileAnalysis) -> Self {
        Self { task_id, analysis }
    }
}

/// Detect conflicts between all pairs of task analyses for one file.
///
/// Fewer than two analyses never produce a conflict.
pub fn detect_conflicts(analyses: &[TaskAnalysis<'_>]) -> Vec<Conflict> {
    let mut conflicts = Vec::new();

    for (i, a) in analyses.iter().enumerate() {
        for b in &analyses[i + 1..] {
            conflicts.extend(find_overlapping_changes(a, b));
        }
    }

    conflicts
}

fn find_overlapping_changes(a: &TaskAnalysis<'_>, b: &TaskAnalysis<'_>) -> Vec<Conflict> {
    let mut conflicts = Vec::new();

    for change_a in &a.analysis.changes {
        for change_b in &b.analysis.changes {
            if !change_a.overlaps(change_b) {
                continue;
            }
            let rule = rules::lookup(change_a.change_type, change_b.change_type)
                .unwrap_or(UNKNOWN_COMBINATION);
            if rule.compatible {
                continue;
            }
            conflicts.push(build_conflict(
                &a.analysis.file_path,
                (a.task_id, change_a),
                (b.task_id, change_b),
                rule,
            ));
        }
    }

    conflicts
}

fn build_conflict(
    file_path: &str,
    (task_a, change_a): (&str, &Change),
    (task_b, change_b): (&str, &Change),
    rule: rules::Rule,
) -> Conflict {
    Conflict {
        file_path: file_path.to_string(),
        location: change_a.location,
        tasks_involved: [task_a.to_string(), task_b.to_string()],
        change_types: [change_a.change_type, change_b.change_type],
        targets: [change_a.target.clone(), change_b.target.clone()],
        severity: rule.severity,
        strategy: rule.strategy,
        reason: rule.reason.to_string(),
        can_auto_merge: rule.strategy == MergeStrategy::Combine,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::analyze_diff;
    use crate::types::{ChangeType, Location, Severity};

    #[test]
    fn test_single_task_never_conflicts() {
        let analysis = analyze_diff("a.js", "", "function f() {}");
        assert!(detect_conflicts(&[TaskAnalysis::new("t1", &analysis)]).is_empty());
        assert!(detect_conflicts(&[]).is_empty());
    }

    #[test]
    fn test_same_function_modified_twice() {
        let base = "function foo() { return 1; }\n";
        let a = analyze_diff("m.js", base, "function foo() { return 2; }\n");
        let b = analyze_diff("m.js", base, "function foo() { return 3; }\n");

        let conflicts = detect_conflicts(&[TaskAnalysis::new("t1", &a), TaskAnalysis::new("t2", &b)]);
        assert_eq!(conflicts.len(), 1);
        let c = &conflicts[0];
        assert_eq!(c.change_types, [ChangeType::FunctionModified, ChangeType::FunctionModified]);
        assert_eq!(c.strategy, MergeStrategy::AiRequired);
        assert_eq!(c.severity, Severity::Medium);
        assert_eq!(c.tasks_involved, ["t1".to_string(), "t2".to_string()]);
        assert_eq!(c.location, Location::Line(1));
        assert!(!c.can_auto_merge);
    }

    #[test]
    fn test_remove_versus_modify() {
        let base = "function keep() { return 0; }\n\n\n\nfunction foo() { return 1; }\n";
        let removed = analyze_diff("m.js", base, "function keep() { return 0; }\n");
        let modified = analyze_diff(
            "m.js",
            base,
            "function keep() { return 0; }\n\n\n\nfunction foo() { return 42; }\n",
        );

        let conflicts = detect_conflicts(&[
            TaskAnalysis::new("remover", &removed),
            TaskAnalysis::new("editor", &modified),
        ]);
        let critical: Vec<&Conflict> = conflicts
            .iter()
            .filter(|c| c.targets[0] == "foo" && c.targets[1] == "foo")
            .collect();
        assert_eq!(critical.len(), 1);
        assert_eq!(critical[0].severity, Severity::Critical);
        assert_eq!(critical[0].strategy, MergeStrategy::HumanRequired);
    }

    #[test]
    fn test_compatible_additions_produce_no_conflict() {
        let a = analyze_diff("m.js", "", "import x from 'x'\n");
        let b = analyze_diff("m.js", "", "import y from 'y'\n");
        assert!(detect_conflicts(&[TaskAnalysis::new("t1", &a), TaskAnalysis::new("t2", &b)]).is_empty());

        let a = analyze_diff("m.js", "", "function bar() { return 1; }\n");
        let b = analyze_diff("m.js", "", "function baz() { return 2; }\n");
        assert!(detect_conflicts(&[TaskAnalysis::new("t1", &a), TaskAnalysis::new("t2", &b)]).is_empty());
    }

    #[test]
    fn test_unknown_pair_escalates_to_ai() {
        // Same line, function added by one task and modified by the other
        let base = "function foo() { return 1; }\n";
        let a = analyze_diff("m.js", base, "function bar() { return 1; }\nfunction foo() { return 1; }\n");
        let b = analyze_diff("m.js", base, "function foo() { return 9; }\n");

        let conflicts = detect_conflicts(&[TaskAnalysis::new("t1", &a), TaskAnalysis::new("t2", &b)]);
        let unknown = conflicts
            .iter()
            .find(|c| c.change_types == [ChangeType::FunctionAdded, ChangeType::FunctionModified])
            .expect("added/modified pair on line 1");
        assert_eq!(unknown.strategy, MergeStrategy::AiRequired);
        assert_eq!(unknown.severity, Severity::Medium);
        assert_eq!(unknown.reason, "Unknown change type combination");
    }

    #[test]
    fn test_every_task_pair_is_compared() {
        let base = "function foo() { return 1; }\n";
        let a = analyze_diff("m.js", base, "function foo() { return 2; }\n");
        let b = analyze_diff("m.js", base, "function foo() { return 3; }\n");
        let c = analyze_diff("m.js", base, "function foo() { return 4; }\n");
        let conflicts = detect_conflicts(&[
            TaskAnalysis::new("t1", &a),
            TaskAnalysis::new("t2", &b),
            TaskAnalysis::new("t3", &c),
        ]);
        assert_eq!(conflicts.len(), 3);
    }
}
