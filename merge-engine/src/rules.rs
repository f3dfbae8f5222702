//! Compatibility rules for pairs of change kinds.
//!
//! A rule says whether two changes that overlap (same target or same location)
//! can coexist, and if not, how the resulting conflict should be escalated.
//! The table is a `match` over the unordered pair of [`ChangeType`] variants,
//! so adding a variant forces every lookup site to be reconsidered instead of
//! silently falling through on a mistyped key.

use crate::types::{ChangeType, MergeStrategy, Severity};

/// One entry of the compatibility table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    pub compatible: bool,
    pub strategy: MergeStrategy,
    pub severity: Severity,
    pub reason: &'static str,
}

impl Rule {
    const fn combine(reason: &'static str) -> Self {
        Self {
            compatible: true,
            strategy: MergeStrategy::Combine,
            severity: Severity::Low,
            reason,
        }
    }

    const fn conflict(strategy: MergeStrategy, severity: Severity, reason: &'static str) -> Self {
        Self {
            compatible: false,
            strategy,
            severity,
            reason,
        }
    }
}

/// Rule applied when a pair has no table entry.
pub const UNKNOWN_COMBINATION: Rule = Rule::conflict(
    MergeStrategy::AiRequired,
    Severity::Medium,
    "Unknown change type combination",
);

/// Look up the rule for a pair of change kinds, in either order.
///
/// Returns `None` when the table has no entry for the pair.
pub fn lookup(a: ChangeType, b: ChangeType) -> Option<Rule> {
    use ChangeType::*;

    let (first, second) = if a <= b { (a, b) } else { (b, a) };

    let rule = match (first, second) {
        (ImportAdded, ImportAdded) => Rule::combine("Different imports can coexist"),
        (FunctionAdded, FunctionAdded) => Rule::combine("Different functions can coexist"),
        (ImportAdded, FunctionAdded) => {
            Rule::combine("Function and import additions are independent")
        }
        (FunctionAdded, ClassAdded) => {
            Rule::combine("Class and function additions are independent")
        }
        (FunctionModified, FunctionModified) => Rule::conflict(
            MergeStrategy::AiRequired,
            Severity::Medium,
            "Same function modified by multiple tasks",
        ),
        (ClassModified, ClassModified) => Rule::conflict(
            MergeStrategy::AiRequired,
            Severity::High,
            "Same class modified by multiple tasks",
        ),
        (FunctionRemoved, FunctionModified) => Rule::conflict(
            MergeStrategy::HumanRequired,
            Severity::Critical,
            "Function removed by one task, modified by another",
        ),
        (ImportRemoved, ImportModified) => Rule::conflict(
            MergeStrategy::AiRequired,
            Severity::Medium,
            "Import removed by one task, modified by another",
        ),
        _ => return None,
    };
    Some(rule)
}

/// Compatibility for a pair, falling back to [`UNKNOWN_COMBINATION`].
pub fn compatibility(a: ChangeType, b: ChangeType) -> Rule {
    lookup(a, b).unwrap_or(UNKNOWN_COMBINATION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_symmetric() {
        let all = [
            ChangeType::ImportAdded,
            ChangeType::ImportRemoved,
            ChangeType::ImportModified,
            ChangeType::FunctionAdded,
            ChangeType::FunctionRemoved,
            ChangeType::FunctionModified,
            ChangeType::ClassAdded,
            ChangeType::ClassRemoved,
            ChangeType::ClassModified,
            ChangeType::VariableAdded,
            ChangeType::JsxAdded,
            ChangeType::ConfigModified,
            ChangeType::Unknown,
        ];
        for a in all {
            for b in all {
                assert_eq!(lookup(a, b), lookup(b, a), "{} / {}", a, b);
            }
        }
    }

    #[test]
    fn test_additions_combine() {
        let rule = lookup(ChangeType::FunctionAdded, ChangeType::ImportAdded).unwrap();
        assert!(rule.compatible);
        assert_eq!(rule.strategy, MergeStrategy::Combine);

        let rule = lookup(ChangeType::ClassAdded, ChangeType::FunctionAdded).unwrap();
        assert!(rule.compatible);
    }

    #[test]
    fn test_remove_vs_modify_is_critical() {
        let rule = lookup(ChangeType::FunctionModified, ChangeType::FunctionRemoved).unwrap();
        assert!(!rule.compatible);
        assert_eq!(rule.severity, Severity::Critical);
        assert_eq!(rule.strategy, MergeStrategy::HumanRequired);
    }

    #[test]
    fn test_class_modified_is_high() {
        let rule = lookup(ChangeType::ClassModified, ChangeType::ClassModified).unwrap();
        assert_eq!(rule.severity, Severity::High);
        assert_eq!(rule.strategy, MergeStrategy::AiRequired);
    }

    #[test]
    fn test_unknown_pair_falls_back_to_ai() {
        assert!(lookup(ChangeType::FunctionAdded, ChangeType::FunctionModified).is_none());
        let rule = compatibility(ChangeType::FunctionAdded, ChangeType::FunctionModified);
        assert_eq!(rule, UNKNOWN_COMBINATION);
        assert!(!rule.compatible);
        assert_eq!(rule.strategy, MergeStrategy::AiRequired);
        assert_eq!(rule.severity, Severity::Medium);
    }
}
