//! Deterministic merging for conflicts whose strategy is "combine".
//!
//! Two recipes exist, both pure text transforms:
//! 1. **Import union**: every import statement found in any task's version is
//!    collected, deduplicated and sorted, then written as one block in front of
//!    the first line of code. Re-running the recipe on its own output is a no-op.
//!    Imports spread over several lines are not split apart; the union is
//!    declined instead.
//! 2. **Function append**: for each function named by the conflict, the first
//!    task (in task order) whose version defines it contributes its definition,
//!    appended to the end of the file when the file does not define that name yet.
//!    A definition whose end cannot be found is never appended partially.
//!
//! Anything else is declined so the caller can escalate.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::analyzer::extract_elements;
use crate::language::Language;
use crate::types::{ChangeType, Conflict, MergeStrategy};

static IMPORT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(?:import(?:\s|\{|\*|'|").*|from\s+\S+\s+import\b.*)$"#).unwrap()
});

/// Outcome of an auto-merge attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoMerge {
    Merged { content: String, explanation: String },
    Declined { reason: String },
}

impl AutoMerge {
    fn declined(reason: impl Into<String>) -> Self {
        AutoMerge::Declined { reason: reason.into() }
    }

    pub fn is_merged(&self) -> bool {
        matches!(self, AutoMerge::Merged { .. })
    }
}

/// Attempt to resolve a conflict without AI.
///
/// `task_contents` holds `(task_id, content)` for every task that edited the
/// file, in task order.
pub fn try_auto_merge(conflict: &Conflict, base: &str, task_contents: &[(&str, &str)]) -> AutoMerge {
    if conflict.strategy != MergeStrategy::Combine {
        return AutoMerge::declined("Strategy requires AI resolution");
    }

    let all = |ct: ChangeType| conflict.change_types.iter().all(|c| *c == ct);

    if all(ChangeType::ImportAdded) {
        return match combine_imports(base, task_contents.iter().map(|(_, c)| *c)) {
            Some((content, count)) => AutoMerge::Merged {
                content,
                explanation: format!("Combined {} imports from {} tasks", count, task_contents.len()),
            },
            None => AutoMerge::declined("Multi-line imports cannot be combined automatically"),
        };
    }

    if all(ChangeType::FunctionAdded) {
        let names: BTreeSet<&str> = conflict.targets.iter().map(String::as_str).collect();
        let language = Language::from_path(&conflict.file_path);
        return match combine_functions(base, task_contents, names.iter().copied(), language) {
            Ok(content) => AutoMerge::Merged {
                content,
                explanation: format!("Combined {} function additions", names.len()),
            },
            Err(name) => AutoMerge::declined(format!("Could not isolate the definition of function {}", name)),
        };
    }

    AutoMerge::declined("No auto-merge strategy available for this change combination")
}

/// Does this line start an import statement?
pub fn is_import_line(line: &str) -> bool {
    IMPORT_LINE.is_match(line)
}

/// Import statements of `content`, trimmed, one per line.
///
/// Returns `None` when an import continues onto following lines.
pub fn single_line_imports(content: &str) -> Option<Vec<&str>> {
    let mut imports = Vec::new();
    for line in content.lines().filter(|line| is_import_line(line)) {
        let line = line.trim();
        let opens = line.matches(['{', '(']).count();
        let closes = line.matches(['}', ')']).count();
        if opens != closes || line.ends_with('\\') || line.ends_with(',') {
            return None;
        }
        imports.push(line);
    }
    Some(imports)
}

/// Replace the import block of `base` with the sorted union of all imports
/// found in `contents`.
///
/// Returns the merged text and the number of distinct imports written, or
/// `None` when `base` or any content has an import spanning several lines.
pub fn combine_imports<'a>(base: &str, contents: impl IntoIterator<Item = &'a str>) -> Option<(String, usize)> {
    single_line_imports(base)?;
    let mut imports: BTreeSet<&str> = BTreeSet::new();
    for content in contents {
        imports.extend(single_line_imports(content)?);
    }

    let remaining: Vec<&str> = base.lines().filter(|line| !is_import_line(line)).collect();

    // Insert before the first line that is neither blank nor a comment
    let insert_at = remaining
        .iter()
        .position(|line| {
            let trimmed = line.trim();
            !trimmed.is_empty() && !trimmed.starts_with("//") && !trimmed.starts_with('#')
        })
        .unwrap_or(remaining.len());

    let mut head = remaining[..insert_at].to_vec();
    while head.last().is_some_and(|line| line.trim().is_empty()) {
        head.pop();
    }
    let tail = &remaining[insert_at..];

    let mut lines: Vec<&str> = Vec::with_capacity(head.len() + imports.len() + tail.len() + 1);
    lines.extend(head);
    lines.extend(imports.iter().copied());
    if !tail.is_empty() {
        if !lines.is_empty() {
            lines.push("");
        }
        lines.extend(tail);
    }

    let mut merged = lines.join("\n");
    if !merged.is_empty() && (tail.is_empty() || base.ends_with('\n')) {
        merged.push('\n');
    }
    Some((merged, imports.len()))
}

/// Append function definitions named in `names` that `base` lacks.
///
/// For each name the first task (in order) whose definition can be isolated
/// provides it. Fails with the name of a function no task definition could
/// be isolated for.
pub fn combine_functions<'a>(
    base: &str,
    task_contents: &[(&str, &str)],
    names: impl IntoIterator<Item = &'a str>,
    language: Language,
) -> Result<String, String> {
    let mut merged = base.to_string();

    for name in names {
        if defines_function(&merged, name, language) {
            continue;
        }
        let definition = task_contents
            .iter()
            .find_map(|(_, content)| find_function(content, name, language))
            .ok_or_else(|| name.to_string())?;

        let trimmed_len = merged.trim_end().len();
        merged.truncate(trimmed_len);
        if !merged.is_empty() {
            merged.push_str("\n\n");
        }
        merged.push_str(definition.trim_end());
        merged.push('\n');
    }

    Ok(merged)
}

/// Does `content` declare a function called `name`?
pub fn defines_function(content: &str, name: &str, language: Language) -> bool {
    extract_elements(content, language)
        .functions
        .iter()
        .any(|f| f.name.as_deref() == Some(name))
}

/// Find the full text of a function definition.
///
/// Script functions run from the declaration to the brace closing their
/// body; braces inside strings and comments are skipped. Python functions
/// run until the first non-indented line. Arrow functions are not looked up.
pub fn find_function<'c>(content: &'c str, name: &str, language: Language) -> Option<&'c str> {
    let name = regex::escape(name);
    match language {
        Language::Python => {
            let re = Regex::new(&format!(
                r"(?m)^(?:async\s+)?def\s+{}\s*\([^)]*\)[^\n]*:[^\n]*\n?(?:[ \t]+[^\n]*\n?|[ \t]*\n)*",
                name
            ))
            .ok()?;
            re.find(content).map(|m| m.as_str())
        }
        lang if lang.is_script() => {
            let re = Regex::new(&format!(
                r"(?:export\s+)?(?:async\s+)?function(?:\s*\*\s*|\s+){}\s*\([^)]*\)[^{{;]*\{{",
                name
            ))
            .ok()?;
            let header = re.find(content)?;
            let end = block_end(content, header.end() - 1)?;
            Some(&content[header.start()..end])
        }
        _ => None,
    }
}

/// Offset just past the `}` matching the `{` at `open`.
///
/// Returns `None` when the block is not closed, or a string or block comment
/// inside it is not terminated.
fn block_end(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut i = open;

    while i < bytes.len() {
        match bytes[i] {
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                i = text[i..].find('\n').map_or(bytes.len(), |n| i + n);
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = text[i + 2..].find("*/").map(|n| i + 2 + n + 2)?;
                continue;
            }
            quote @ (b'"' | b'\'' | b'`') => {
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    if bytes[i] == b'\\' {
                        i += 1;
                    } else if bytes[i] == b'\n' && quote != b'`' {
                        return None;
                    }
                    i += 1;
                }
                if i >= bytes.len() {
                    return None;
                }
            }
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
        i += 1;
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::analyze_diff;
    use crate::types::{Location, Severity};

    fn conflict(path: &str, types: [ChangeType; 2], targets: [&str; 2], strategy: MergeStrategy) -> Conflict {
        Conflict {
            file_path: path.to_string(),
            location: Location::Imports,
            tasks_involved: ["t1".to_string(), "t2".to_string()],
            change_types: types,
            targets: [targets[0].to_string(), targets[1].to_string()],
            severity: Severity::Low,
            strategy,
            reason: "test".to_string(),
            can_auto_merge: strategy == MergeStrategy::Combine,
        }
    }

    #[test]
    fn test_non_combine_strategy_is_declined() {
        let c = conflict(
            "a.js",
            [ChangeType::FunctionModified, ChangeType::FunctionModified],
            ["foo", "foo"],
            MergeStrategy::AiRequired,
        );
        let result = try_auto_merge(&c, "", &[("t1", "x"), ("t2", "y")]);
        assert_eq!(
            result,
            AutoMerge::Declined {
                reason: "Strategy requires AI resolution".to_string()
            }
        );
    }

    #[test]
    fn test_import_union_sorted_and_deduplicated() {
        let base = "import a from 'a';\n\nconst x = 1;\n";
        let t1 = "import a from 'a';\nimport c from 'c';\n\nconst x = 1;\n";
        let t2 = "import b from 'b';\nimport a from 'a';\n\nconst x = 1;\n";
        let (merged, count) = combine_imports(base, [t1, t2]).unwrap();
        assert_eq!(count, 3);
        assert_eq!(
            merged,
            "import a from 'a';\nimport b from 'b';\nimport c from 'c';\n\nconst x = 1;\n"
        );
    }

    #[test]
    fn test_import_union_is_idempotent() {
        let t1 = "# header\nimport os\n\nprint('hi')\n";
        let t2 = "# header\nimport sys\n\nprint('hi')\n";
        let (once, _) = combine_imports(t1, [t1, t2]).unwrap();
        let (twice, _) = combine_imports(&once, [once.as_str(), once.as_str()]).unwrap();
        assert_eq!(once, "# header\nimport os\nimport sys\n\nprint('hi')\n");
        assert_eq!(once, twice);
        let rerun = analyze_diff("m.py", &once, &twice);
        assert!(!rerun.has_change(ChangeType::ImportAdded));
    }

    #[test]
    fn test_import_union_on_empty_base() {
        let (merged, count) = combine_imports("", ["import y from 'y';\n", "import x from 'x';\n"]).unwrap();
        assert_eq!(count, 2);
        assert_eq!(merged, "import x from 'x';\nimport y from 'y';\n");
    }

    #[test]
    fn test_import_conflict_dispatches_to_union() {
        let c = conflict(
            "a.js",
            [ChangeType::ImportAdded, ChangeType::ImportAdded],
            ["import x from 'x'", "import y from 'y'"],
            MergeStrategy::Combine,
        );
        let result = try_auto_merge(&c, "", &[("t1", "import x from 'x';\n"), ("t2", "import y from 'y';\n")]);
        match result {
            AutoMerge::Merged { content, explanation } => {
                assert_eq!(content, "import x from 'x';\nimport y from 'y';\n");
                assert_eq!(explanation, "Combined 2 imports from 2 tasks");
            }
            other => panic!("expected merge, got {:?}", other),
        }
    }

    #[test]
    fn test_function_append() {
        let c = conflict(
            "a.js",
            [ChangeType::FunctionAdded, ChangeType::FunctionAdded],
            ["bar", "baz"],
            MergeStrategy::Combine,
        );
        let base = "const x = 1;\n";
        let t1 = "const x = 1;\n\nfunction bar() {\n  return 1;\n}\n";
        let t2 = "const x = 1;\n\nexport function baz(a) {\n  return a;\n}\n";
        let result = try_auto_merge(&c, base, &[("t1", t1), ("t2", t2)]);
        let AutoMerge::Merged { content, .. } = result else {
            panic!("expected merge");
        };
        assert_eq!(
            content,
            "const x = 1;\n\nfunction bar() {\n  return 1;\n}\n\nexport function baz(a) {\n  return a;\n}\n"
        );
    }

    #[test]
    fn test_first_definition_wins() {
        let t1 = "function dup() { return 1; }";
        let t2 = "function dup() { return 2; }";
        let merged = combine_functions("", &[("t1", t1), ("t2", t2)], ["dup"], Language::JavaScript).unwrap();
        assert_eq!(merged, "function dup() { return 1; }\n");
    }

    #[test]
    fn test_python_function_lookup() {
        let src = "import os\n\ndef helper(x):\n    y = x + 1\n\n    return y\n\nprint(helper(1))\n";
        let found = find_function(src, "helper", Language::Python).unwrap();
        assert_eq!(found.trim_end(), "def helper(x):\n    y = x + 1\n\n    return y");
        assert!(defines_function(src, "helper", Language::Python));
        assert!(!defines_function(src, "help", Language::Python));
    }

    #[test]
    fn test_mixed_change_types_declined() {
        let c = conflict(
            "a.js",
            [ChangeType::ImportAdded, ChangeType::FunctionAdded],
            ["import x from 'x'", "bar"],
            MergeStrategy::Combine,
        );
        assert!(!try_auto_merge(&c, "", &[("t1", ""), ("t2", "")]).is_merged());
    }

    #[test]
    fn test_nested_function_body_is_copied_whole() {
        let src = "function baz(x) {\n  if (x) {\n    return 2;\n  }\n  return 3;\n}\n\nconst after = 1;\n";
        let found = find_function(src, "baz", Language::TypeScript).unwrap();
        assert_eq!(found, "function baz(x) {\n  if (x) {\n    return 2;\n  }\n  return 3;\n}");
    }

    #[test]
    fn test_braces_in_strings_and_comments_are_skipped() {
        let src = "function fmt(a) {\n  // closing } here\n  /* { */\n  return `${a}}` + '{' + \"}\";\n}\nfunction next() {}\n";
        let found = find_function(src, "fmt", Language::JavaScript).unwrap();
        assert!(found.ends_with("+ \"}\";\n}"));
        assert!(!found.contains("next"));
    }

    #[test]
    fn test_unclosed_function_is_not_found() {
        let src = "function broken() {\n  if (x) {\n    return 1;\n}\n";
        assert_eq!(find_function(src, "broken", Language::JavaScript), None);
        assert_eq!(
            combine_functions("", &[("t1", src)], ["broken"], Language::JavaScript),
            Err("broken".to_string())
        );
    }

    #[test]
    fn test_unisolatable_function_declines_auto_merge() {
        let c = conflict(
            "a.js",
            [ChangeType::FunctionAdded, ChangeType::FunctionAdded],
            ["bar", "handler"],
            MergeStrategy::Combine,
        );
        let t1 = "function bar() {\n  return 1;\n}\n";
        let t2 = "const handler = (e) => {\n  go(e);\n};\n";
        let result = try_auto_merge(&c, "", &[("t1", t1), ("t2", t2)]);
        assert_eq!(
            result,
            AutoMerge::Declined {
                reason: "Could not isolate the definition of function handler".to_string()
            }
        );
    }

    #[test]
    fn test_multi_line_imports_decline_union() {
        let t1 = "import {\n  a,\n  b,\n} from './ab';\nimport c from 'c';\n";
        let t2 = "import y from 'y';\n";
        assert_eq!(single_line_imports(t1), None);
        assert_eq!(single_line_imports(t2), Some(vec!["import y from 'y';"]));
        assert_eq!(combine_imports("", [t1, t2]), None);

        let c = conflict(
            "a.ts",
            [ChangeType::ImportAdded, ChangeType::ImportAdded],
            ["import c from 'c'", "import y from 'y'"],
            MergeStrategy::Combine,
        );
        assert!(!try_auto_merge(&c, "", &[("t1", t1), ("t2", t2)]).is_merged());
    }

    #[test]
    fn test_python_parenthesized_import_is_multi_line() {
        assert_eq!(single_line_imports("from os import (\n    path,\n)\n"), None);
        assert_eq!(single_line_imports("from os import (path)\nimport sys\n"), Some(vec!["from os import (path)", "import sys"]));
    }
}
