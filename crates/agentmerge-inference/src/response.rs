use std::sync::LazyLock;

use regex::Regex;

static CODE_BLOCK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)```(?:\w+)?\n(.*?)```").unwrap());
static ANY_FENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)```.*```").unwrap());
static ERROR_WORDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(error|failed|cannot|unable)").unwrap());

/// Responses longer than this (in characters) are taken to include an explanation.
const EXPLANATION_LENGTH: usize = 500;

/// Body of the first fenced code block, trimmed.
pub fn extract_code_block(response: &str) -> Option<String> {
    CODE_BLOCK
        .captures(response)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// Heuristic confidence in `[0, 1]` from the shape of a response.
pub fn assess_confidence(response: &str) -> f64 {
    let mut confidence: f64 = 0.5;
    if ANY_FENCE.is_match(response) {
        confidence += 0.3;
    }
    if !ERROR_WORDS.is_match(response) {
        confidence += 0.15;
    }
    if response.chars().count() > EXPLANATION_LENGTH {
        confidence += 0.05;
    }
    confidence.min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_block_wins() {
        let response = "Here:\n```js\nconst a = 1;\n```\nand\n```\nsecond\n```";
        assert_eq!(extract_code_block(response).as_deref(), Some("const a = 1;"));
    }

    #[test]
    fn test_no_block() {
        assert_eq!(extract_code_block("I cannot merge this."), None);
        assert_eq!(extract_code_block("```unterminated\nfoo"), None);
    }

    #[test]
    fn test_confidence_levels() {
        let clean = "```\nok\n```";
        assert!((assess_confidence(clean) - 0.95).abs() < 1e-9);

        let with_error = "```\nthrow new Error()\n```";
        assert!((assess_confidence(with_error) - 0.8).abs() < 1e-9);

        let long = format!("```\n{}\n```", "x".repeat(600));
        assert!((assess_confidence(&long) - 1.0).abs() < 1e-9);

        assert!((assess_confidence("unable to help") - 0.5).abs() < 1e-9);
    }
}
