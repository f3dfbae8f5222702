//! Lightweight structural analysis.
//!
//! Extracts imports, functions, classes and variables from a text snapshot with
//! statement-shape patterns, then diffs two snapshots element by element.
//!
//! This is not a parser. Function and class bodies are captured as fixed-size
//! windows of text starting at the declaration, with no awareness of balanced
//! delimiters. A window can therefore run past the end of its construct and
//! pick up the next one, which makes an untouched function look modified when
//! code is added right after it. That risk is accepted; callers that need
//! exact bodies must not rely on these snippets.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use similar::{ChangeTag, TextDiff};

use crate::language::Language;
use crate::types::{Change, ChangeType, Element, ElementKind, ElementSet, FileAnalysis, Location};

/// Characters captured for a function snippet.
pub const FUNCTION_WINDOW: usize = 500;
/// Characters captured for a class snippet.
pub const CLASS_WINDOW: usize = 1000;

static JS_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?m)^(?:import\s+(?:(?:\{[^}]*\}|\*\s+as\s+\w+|\w+)(?:\s*,\s*)?)+\s+from\s+['"][^'"]+['"]|import\s+['"][^'"]+['"])"#,
    )
    .unwrap()
});

static JS_FUNCTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:(?:export\s+)?(?:async\s+)?function\s+(\w+)|(?:const|let|var)\s+(\w+)\s*=\s*(?:async\s+)?(?:\([^)]*\)|[^=])\s*=>|(\w+)\s*:\s*(?:async\s+)?(?:function|\([^)]*\)\s*=>))",
    )
    .unwrap()
});

static JS_CLASS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:export\s+)?class\s+(\w+)(?:\s+extends\s+\w+)?").unwrap());

static JS_VARIABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:export\s+)?(?:const|let|var)\s+(\w+)\s*=").unwrap());

static IMPORT_SOURCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"from\s+['"]([^'"]+)['"]"#).unwrap());

static PY_IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(?:from\s+\S+\s+import\s+.+|import\s+.+)$").unwrap());

static PY_FUNCTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(?:async\s+)?def\s+(\w+)\s*\(").unwrap());

static PY_CLASS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^class\s+(\w+)(?:\([^)]*\))?:").unwrap());

/// Analyse the element-level differences between two versions of a file.
pub fn analyze_diff(file_path: &str, before: &str, after: &str) -> FileAnalysis {
    let language = Language::from_path(file_path);

    let before_elements = extract_elements(before, language);
    let after_elements = extract_elements(after, language);
    let changes = compute_changes(&before_elements, &after_elements);

    let targets_of = |pred: &dyn Fn(ChangeType) -> bool| -> Vec<String> {
        changes
            .iter()
            .filter(|c| pred(c.change_type))
            .map(|c| c.target.clone())
            .collect()
    };
    let functions_touched = targets_of(&|ct: ChangeType| ct.is_function());
    let functions_added = targets_of(&|ct: ChangeType| ct == ChangeType::FunctionAdded);
    let imports_added = targets_of(&|ct: ChangeType| ct == ChangeType::ImportAdded);

    FileAnalysis {
        file_path: file_path.to_string(),
        language,
        functions_touched,
        functions_added,
        imports_added,
        line_delta: line_count(after).abs_diff(line_count(before)),
        lines_changed: count_changed_lines(before, after),
        changes,
    }
}

/// Extract semantic elements from a snapshot.
///
/// Languages without an extractor return an empty set.
pub fn extract_elements(content: &str, language: Language) -> ElementSet {
    let mut elements = ElementSet::default();
    if content.is_empty() {
        return elements;
    }

    if language.is_script() {
        elements.imports = JS_IMPORT
            .find_iter(content)
            .map(|m| import_element(m.as_str(), m.start(), content))
            .collect();

        elements.functions = JS_FUNCTION
            .captures_iter(content)
            .filter_map(|caps| {
                let start = caps.get(0)?.start();
                let name = caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3))?;
                Some(named_element(ElementKind::Function, name.as_str(), content, start, FUNCTION_WINDOW))
            })
            .collect();

        elements.classes = capture_named(&JS_CLASS, ElementKind::Class, content, CLASS_WINDOW);

        elements.variables = JS_VARIABLE
            .captures_iter(content)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let name = caps.get(1)?;
                Some(Element {
                    kind: ElementKind::Variable,
                    name: Some(name.as_str().to_string()),
                    content: whole.as_str().trim().to_string(),
                    source: None,
                    location: Location::Line(line_of(content, whole.start())),
                })
            })
            .collect();
    } else if language == Language::Python {
        elements.imports = PY_IMPORT
            .find_iter(content)
            .map(|m| import_element(m.as_str(), m.start(), content))
            .collect();
        elements.functions = capture_named(&PY_FUNCTION, ElementKind::Function, content, FUNCTION_WINDOW);
        elements.classes = capture_named(&PY_CLASS, ElementKind::Class, content, CLASS_WINDOW);
    }

    elements
}

/// Compute element-level changes between two element sets.
///
/// Output is grouped by kind: imports (added, then removed), functions
/// (added/modified, then removed), classes (added/modified, then removed).
pub fn compute_changes(before: &ElementSet, after: &ElementSet) -> Vec<Change> {
    let mut changes = Vec::new();

    // Imports are compared as sets of statement text
    let before_imports: HashSet<&str> = before.imports.iter().map(|i| i.content.as_str()).collect();
    let after_imports: HashSet<&str> = after.imports.iter().map(|i| i.content.as_str()).collect();

    let mut seen = HashSet::new();
    for imp in &after.imports {
        if !before_imports.contains(imp.content.as_str()) && seen.insert(imp.content.as_str()) {
            changes.push(Change::new(ChangeType::ImportAdded, &imp.content, Location::Imports));
        }
    }
    let mut seen = HashSet::new();
    for imp in &before.imports {
        if !after_imports.contains(imp.content.as_str()) && seen.insert(imp.content.as_str()) {
            changes.push(Change::new(ChangeType::ImportRemoved, &imp.content, Location::Imports));
        }
    }

    diff_named(
        &before.functions,
        &after.functions,
        [ChangeType::FunctionAdded, ChangeType::FunctionModified, ChangeType::FunctionRemoved],
        |removed| removed.location,
        &mut changes,
    );
    diff_named(
        &before.classes,
        &after.classes,
        [ChangeType::ClassAdded, ChangeType::ClassModified, ChangeType::ClassRemoved],
        |_| Location::Classes,
        &mut changes,
    );

    changes
}

/// Diff two lists of named elements keyed by name.
fn diff_named(
    before: &[Element],
    after: &[Element],
    [added, modified, removed]: [ChangeType; 3],
    removed_location: impl Fn(&Element) -> Location,
    changes: &mut Vec<Change>,
) {
    let before_by_name = index_by_name(before);
    let after_by_name = index_by_name(after);
    let before_lookup: HashMap<&str, &Element> = before_by_name.iter().copied().collect();
    let after_lookup: HashMap<&str, &Element> = after_by_name.iter().copied().collect();

    for (name, element) in &after_by_name {
        match before_lookup.get(name) {
            None => changes.push(Change::new(added, *name, element.location)),
            // Byte-for-byte snippet comparison, no semantic equivalence
            Some(old) if old.content != element.content => {
                changes.push(Change::new(modified, *name, element.location))
            }
            Some(_) => {}
        }
    }

    for (name, element) in &before_by_name {
        if !after_lookup.contains_key(name) {
            changes.push(Change::new(removed, *name, removed_location(*element)));
        }
    }
}

/// Index elements by name, keeping first-seen order and the last definition.
fn index_by_name(elements: &[Element]) -> Vec<(&str, &Element)> {
    let mut order: Vec<&str> = Vec::new();
    let mut latest: HashMap<&str, &Element> = HashMap::new();
    for element in elements {
        if let Some(name) = element.name.as_deref() {
            if latest.insert(name, element).is_none() {
                order.push(name);
            }
        }
    }
    order
        .into_iter()
        .filter_map(|name| latest.get(name).map(|e| (name, *e)))
        .collect()
}

fn capture_named(re: &Regex, kind: ElementKind, content: &str, window: usize) -> Vec<Element> {
    re.captures_iter(content)
        .filter_map(|caps| {
            let start = caps.get(0)?.start();
            let name = caps.get(1)?;
            Some(named_element(kind, name.as_str(), content, start, window))
        })
        .collect()
}

fn named_element(kind: ElementKind, name: &str, content: &str, start: usize, window: usize) -> Element {
    Element {
        kind,
        name: Some(name.to_string()),
        content: text_window(content, start, window),
        source: None,
        location: Location::Line(line_of(content, start)),
    }
}

fn import_element(statement: &str, start: usize, content: &str) -> Element {
    let statement = statement.trim();
    Element {
        kind: ElementKind::Import,
        name: None,
        content: statement.to_string(),
        source: IMPORT_SOURCE
            .captures(statement)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string()),
        location: Location::Line(line_of(content, start)),
    }
}

/// Up to `window` characters starting at byte offset `start`.
fn text_window(content: &str, start: usize, window: usize) -> String {
    content[start..].chars().take(window).collect()
}

/// 1-based line number of a byte offset.
fn line_of(content: &str, offset: usize) -> usize {
    content[..offset].matches('\n').count() + 1
}

/// Number of `\n`-separated segments; an empty text counts as one line.
fn line_count(text: &str) -> usize {
    text.split('\n').count()
}

fn count_changed_lines(before: &str, after: &str) -> usize {
    TextDiff::from_lines(before, after)
        .iter_all_changes()
        .filter(|c| c.tag() != ChangeTag::Equal)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn types(changes: &[Change]) -> Vec<ChangeType> {
        changes.iter().map(|c| c.change_type).collect()
    }

    #[test]
    fn test_extract_js_elements() {
        let src = "import React from 'react';\nimport { a, b } from \"./util\";\nimport './side-effect.css';\n\nexport function render(x) {\n  return x;\n}\n\nconst add = (a, b) => a + b;\n\nexport class Widget extends Base {\n}\n";
        let elements = extract_elements(src, Language::JavaScript);

        let imports: Vec<&str> = elements.imports.iter().map(|i| i.content.as_str()).collect();
        assert_eq!(
            imports,
            vec![
                "import React from 'react'",
                "import { a, b } from \"./util\"",
                "import './side-effect.css'",
            ]
        );
        assert_eq!(elements.imports[0].source.as_deref(), Some("react"));

        let functions: Vec<&str> = elements.functions.iter().filter_map(|f| f.name.as_deref()).collect();
        assert_eq!(functions, vec!["render", "add"]);
        assert_eq!(elements.functions[0].location, Location::Line(5));

        assert_eq!(elements.classes.len(), 1);
        assert_eq!(elements.classes[0].name.as_deref(), Some("Widget"));
        assert!(elements.variables.iter().any(|v| v.name.as_deref() == Some("add")));
    }

    #[test]
    fn test_extract_python_elements() {
        let src = "import os\nfrom typing import List\n\nclass Repo(Base):\n    pass\n\nasync def fetch(url):\n    return url\n\ndef main():\n    pass\n";
        let elements = extract_elements(src, Language::Python);
        assert_eq!(elements.imports.len(), 2);
        assert_eq!(elements.imports[1].content, "from typing import List");
        let functions: Vec<&str> = elements.functions.iter().filter_map(|f| f.name.as_deref()).collect();
        assert_eq!(functions, vec!["fetch", "main"]);
        assert_eq!(elements.classes[0].name.as_deref(), Some("Repo"));
        assert_eq!(elements.classes[0].location, Location::Line(4));
    }

    #[test]
    fn test_text_language_has_no_elements() {
        let elements = extract_elements("import x from 'x'\nfunction f() {}", Language::Text);
        assert!(elements.is_empty());
        let analysis = analyze_diff("notes.txt", "a\n", "a\nb\nc\n");
        assert!(analysis.changes.is_empty());
        assert_eq!(analysis.line_delta, 2);
    }

    #[test]
    fn test_import_added_and_removed() {
        let before = "import a from 'a'\nimport b from 'b'\n";
        let after = "import a from 'a'\nimport c from 'c'\n";
        let analysis = analyze_diff("m.js", before, after);
        assert_eq!(types(&analysis.changes), vec![ChangeType::ImportAdded, ChangeType::ImportRemoved]);
        assert_eq!(analysis.changes[0].target, "import c from 'c'");
        assert_eq!(analysis.changes[1].target, "import b from 'b'");
        assert_eq!(analysis.imports_added, vec!["import c from 'c'"]);
    }

    #[test]
    fn test_function_modified_only_when_snippet_differs() {
        let before = "function foo() { return 1; }\n";
        let same = analyze_diff("m.js", before, before);
        assert!(same.changes.is_empty());

        let after = "function foo() { return 2; }\n";
        let analysis = analyze_diff("m.js", before, after);
        assert_eq!(types(&analysis.changes), vec![ChangeType::FunctionModified]);
        assert_eq!(analysis.functions_touched, vec!["foo"]);
        assert!(analysis.functions_added.is_empty());
    }

    #[test]
    fn test_change_grouping_order() {
        let before = "import a from 'a'\nfunction gone() {}\nclass Old {}\n";
        let after = "import b from 'b'\nfunction fresh() {}\nclass New {}\n";
        let analysis = analyze_diff("m.ts", before, after);
        assert_eq!(
            types(&analysis.changes),
            vec![
                ChangeType::ImportAdded,
                ChangeType::ImportRemoved,
                ChangeType::FunctionAdded,
                ChangeType::FunctionRemoved,
                ChangeType::ClassAdded,
                ChangeType::ClassRemoved,
            ]
        );
        // Removed classes have no position in the new text
        assert_eq!(analysis.changes[5].location, Location::Classes);
        assert_eq!(analysis.changes[3].location, Location::Line(2));
    }

    #[test]
    fn test_fixed_window_picks_up_trailing_code() {
        // The snippet for `foo` spans into the appended function, so foo is
        // reported as modified even though its body is untouched.
        let before = "function foo() {\n  return 1;\n}\n";
        let after = "function foo() {\n  return 1;\n}\n\nfunction bar() {\n  return 2;\n}\n";
        let analysis = analyze_diff("m.js", before, after);
        assert!(analysis.has_change(ChangeType::FunctionAdded));
        assert!(analysis.has_change(ChangeType::FunctionModified));
    }

    #[test]
    fn test_duplicate_imports_reported_once() {
        let after = "import x from 'x'\nimport x from 'x'\n";
        let analysis = analyze_diff("m.js", "", after);
        assert_eq!(analysis.changes.len(), 1);
    }

    #[test]
    fn test_window_respects_char_boundaries() {
        let body = "é".repeat(FUNCTION_WINDOW * 2);
        let src = format!("function f() {{ return '{}'; }}", body);
        let elements = extract_elements(&src, Language::JavaScript);
        assert_eq!(elements.functions[0].content.chars().count(), FUNCTION_WINDOW);
    }

    #[test]
    fn test_lines_changed_counts_inserts_and_deletes() {
        let analysis = analyze_diff("a.md", "one\ntwo\nthree\n", "one\n2\nthree\nfour\n");
        assert_eq!(analysis.lines_changed, 3);
        assert_eq!(analysis.line_delta, 1);
    }
}
