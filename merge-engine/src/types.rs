//! Core types for the merge engine.
//!
//! Code is modelled at the level of named constructs rather than lines:
//! - **Element**: one extracted import, function, class or variable
//! - **Change**: a typed difference between two element sets
//! - **Conflict**: two tasks' changes that touch the same target or location
//!
//! Everything here is a plain value. Nothing is shared across files or runs.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::language::Language;

/// Kind of an extracted element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Import,
    Function,
    Class,
    Variable,
}

/// Line-based position of a change.
///
/// Two changes overlap when their locations are equal, so the variants mirror
/// the coarse buckets the analyzer produces rather than exact spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "line")]
pub enum Location {
    /// The import block as a whole.
    Imports,
    /// A removed class (it no longer has a position in the new text).
    Classes,
    /// 1-based line where the construct starts.
    Line(usize),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Imports => f.write_str("imports"),
            Location::Classes => f.write_str("class"),
            Location::Line(n) => write!(f, "line {}", n),
        }
    }
}

/// One extracted construct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    pub kind: ElementKind,
    /// Absent for imports, which are identified by their statement text.
    pub name: Option<String>,
    /// Snippet used for equality. For functions and classes this is a fixed
    /// window of text starting at the declaration, not the balanced body.
    pub content: String,
    /// Module an import pulls from, when it could be read off the statement.
    pub source: Option<String>,
    pub location: Location,
}

/// All elements extracted from one snapshot of a file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementSet {
    pub imports: Vec<Element>,
    pub functions: Vec<Element>,
    pub classes: Vec<Element>,
    pub variables: Vec<Element>,
}

impl ElementSet {
    pub fn is_empty(&self) -> bool {
        self.imports.is_empty()
            && self.functions.is_empty()
            && self.classes.is_empty()
            && self.variables.is_empty()
    }
}

/// Closed set of change kinds.
///
/// The declaration order is significant: the compatibility table normalises a
/// pair by ordinal so that `(a, b)` and `(b, a)` resolve to the same entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    ImportAdded,
    ImportRemoved,
    ImportModified,
    FunctionAdded,
    FunctionRemoved,
    FunctionModified,
    ClassAdded,
    ClassRemoved,
    ClassModified,
    VariableAdded,
    VariableRemoved,
    VariableModified,
    JsxAdded,
    JsxModified,
    CommentAdded,
    CommentModified,
    StyleAdded,
    StyleModified,
    ConfigModified,
    Unknown,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::ImportAdded => "import_added",
            ChangeType::ImportRemoved => "import_removed",
            ChangeType::ImportModified => "import_modified",
            ChangeType::FunctionAdded => "function_added",
            ChangeType::FunctionRemoved => "function_removed",
            ChangeType::FunctionModified => "function_modified",
            ChangeType::ClassAdded => "class_added",
            ChangeType::ClassRemoved => "class_removed",
            ChangeType::ClassModified => "class_modified",
            ChangeType::VariableAdded => "variable_added",
            ChangeType::VariableRemoved => "variable_removed",
            ChangeType::VariableModified => "variable_modified",
            ChangeType::JsxAdded => "jsx_added",
            ChangeType::JsxModified => "jsx_modified",
            ChangeType::CommentAdded => "comment_added",
            ChangeType::CommentModified => "comment_modified",
            ChangeType::StyleAdded => "style_added",
            ChangeType::StyleModified => "style_modified",
            ChangeType::ConfigModified => "config_modified",
            ChangeType::Unknown => "unknown",
        }
    }

    pub fn is_function(&self) -> bool {
        matches!(
            self,
            ChangeType::FunctionAdded | ChangeType::FunctionRemoved | ChangeType::FunctionModified
        )
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single typed difference between two snapshots of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    pub change_type: ChangeType,
    /// Function/class name, or the full statement text for imports.
    pub target: String,
    pub location: Location,
}

impl Change {
    pub fn new(change_type: ChangeType, target: impl Into<String>, location: Location) -> Self {
        Self {
            change_type,
            target: target.into(),
            location,
        }
    }

    /// Two changes overlap when they name the same target or sit at the same location.
    pub fn overlaps(&self, other: &Change) -> bool {
        self.target == other.target || self.location == other.location
    }
}

/// Result of analysing one task's edit of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAnalysis {
    pub file_path: String,
    pub language: Language,
    pub changes: Vec<Change>,
    /// Targets of every function change (added, modified or removed).
    pub functions_touched: Vec<String>,
    pub functions_added: Vec<String>,
    pub imports_added: Vec<String>,
    /// Absolute difference in line count between the two snapshots.
    pub line_delta: usize,
    /// Inserted plus deleted lines according to a line diff.
    pub lines_changed: usize,
}

impl FileAnalysis {
    pub fn has_change(&self, change_type: ChangeType) -> bool {
        self.changes.iter().any(|c| c.change_type == change_type)
    }
}

/// Escalation weight of a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Auto-mergeable.
    Low,
    /// AI can likely resolve.
    Medium,
    /// AI required, result should be reviewed.
    High,
    /// Human intervention required.
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        })
    }
}

/// Resolution policy assigned to a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Both changes can coexist.
    Combine,
    /// Take the more recent change.
    TakeNewer,
    /// Take the more comprehensive change.
    TakeLarger,
    AiRequired,
    HumanRequired,
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MergeStrategy::Combine => "combine",
            MergeStrategy::TakeNewer => "take_newer",
            MergeStrategy::TakeLarger => "take_larger",
            MergeStrategy::AiRequired => "ai_required",
            MergeStrategy::HumanRequired => "human_required",
        })
    }
}

/// A detected incompatibility between two tasks' changes on one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub file_path: String,
    pub location: Location,
    pub tasks_involved: [String; 2],
    pub change_types: [ChangeType; 2],
    pub targets: [String; 2],
    pub severity: Severity,
    pub strategy: MergeStrategy,
    pub reason: String,
    pub can_auto_merge: bool,
}

impl Conflict {
    pub fn involves(&self, task_id: &str) -> bool {
        self.tasks_involved.iter().any(|t| t == task_id)
    }
}

/// Outcome of resolving one conflict or one whole file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    AutoMerged,
    AiMerged,
    NeedsHumanReview,
    Failed,
}

impl Decision {
    pub fn is_merged(&self) -> bool {
        matches!(self, Decision::AutoMerged | Decision::AiMerged)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Decision::AutoMerged => "auto_merged",
            Decision::AiMerged => "ai_merged",
            Decision::NeedsHumanReview => "needs_human_review",
            Decision::Failed => "failed",
        })
    }
}

/// The result of a merge operation on a conflict or a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeResult {
    pub decision: Decision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_content: Option<String>,
    pub explanation: String,
    /// Only set for AI outcomes, in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub ai_calls_made: u32,
    #[serde(default)]
    pub tokens_used: usize,
    /// Unparseable model output, kept for audit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MergeResult {
    fn bare(decision: Decision, explanation: impl Into<String>) -> Self {
        Self {
            decision,
            merged_content: None,
            explanation: explanation.into(),
            confidence: None,
            ai_calls_made: 0,
            tokens_used: 0,
            raw_response: None,
            error: None,
        }
    }

    pub fn auto_merged(content: impl Into<String>, explanation: impl Into<String>) -> Self {
        Self {
            merged_content: Some(content.into()),
            ..Self::bare(Decision::AutoMerged, explanation)
        }
    }

    pub fn ai_merged(
        content: impl Into<String>,
        explanation: impl Into<String>,
        confidence: f64,
        tokens_used: usize,
    ) -> Self {
        Self {
            merged_content: Some(content.into()),
            confidence: Some(confidence),
            ai_calls_made: 1,
            tokens_used,
            ..Self::bare(Decision::AiMerged, explanation)
        }
    }

    pub fn needs_review(explanation: impl Into<String>) -> Self {
        Self::bare(Decision::NeedsHumanReview, explanation)
    }

    pub fn failed(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            error: Some(error.clone()),
            ..Self::bare(Decision::Failed, error)
        }
    }

    pub fn with_raw_response(mut self, raw: impl Into<String>) -> Self {
        self.raw_response = Some(raw.into());
        self
    }

    pub fn is_merged(&self) -> bool {
        self.decision.is_merged()
    }
}
