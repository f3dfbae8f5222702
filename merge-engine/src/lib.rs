//! # merge-engine
//!
//! Classifies and combines edits that several tasks made to the same file.
//!
//! ## Approach
//!
//! The engine works on lightweight structure, not syntax trees:
//!
//! 1. **Structural analysis**: imports, functions, classes and variables are
//!    pulled out of each snapshot with statement-shape patterns and diffed by
//!    name (see [`analyzer`]).
//!
//! 2. **Conflict detection**: every pair of tasks is compared change by
//!    change. Overlapping changes go through a compatibility table that either
//!    accepts them or assigns a severity and a resolution strategy
//!    (see [`rules`] and [`detector`]).
//!
//! 3. **Deterministic combination**: conflicts marked "combine" are merged
//!    with fixed recipes: import union and function append (see [`automerge`]).
//!    Files without conflicts are combined the same way (see [`combine`]).
//!
//! Anything that needs judgment is left to the caller, which escalates to a
//! language model or a human.
//!
//! ## Example
//!
//! ```rust
//! use merge_engine::{analyze_diff, detect_conflicts, TaskAnalysis};
//!
//! let base = "function foo() { return 1; }\n";
//! let a = analyze_diff("m.js", base, "function foo() { return 2; }\n");
//! let b = analyze_diff("m.js", base, "function foo() { return 3; }\n");
//!
//! let conflicts = detect_conflicts(&[TaskAnalysis::new("t1", &a), TaskAnalysis::new("t2", &b)]);
//! assert_eq!(conflicts.len(), 1);
//! ```

pub mod analyzer;
pub mod automerge;
pub mod combine;
pub mod detector;
pub mod language;
pub mod rules;
pub mod types;

pub use analyzer::{analyze_diff, extract_elements};
pub use automerge::{try_auto_merge, AutoMerge};
pub use combine::{combine_non_conflicting, TaskVersion};
pub use detector::{detect_conflicts, TaskAnalysis};
pub use language::Language;
pub use types::{
    Change, ChangeType, Conflict, Decision, Element, ElementSet, FileAnalysis, Location, MergeResult,
    MergeStrategy, Severity,
};
