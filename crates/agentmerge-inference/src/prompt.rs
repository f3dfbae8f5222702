use agentmerge_core::TaskSnapshot;
use merge_engine::Conflict;
use std::fmt::Write;

const PREAMBLE: &str = "You are a code merge specialist. Your task is to merge conflicting changes \
from multiple development tasks into a single coherent result.";

const INSTRUCTIONS: &str = "## Instructions
1. Analyze the intent of each task's changes
2. Preserve the functionality from ALL tasks where possible
3. Resolve any syntactic conflicts
4. Ensure the merged code is valid and follows best practices
5. If changes are incompatible, prioritize based on the apparent importance

## Output
Provide ONLY the merged code in a code block. No explanations outside the code block.

```
// Your merged code here
```";

/// Context describing one conflict: where it is, the baseline, and the
/// involved tasks' intents, change kinds and full versions of the file.
pub fn build_context(conflict: &Conflict, base: &str, snapshots: &[TaskSnapshot]) -> String {
    let mut context = String::new();
    // Writing to a String cannot fail
    let _ = write!(
        context,
        "## Conflict Location\nFile: {}\nLocation: {}\nSeverity: {}\n\n",
        conflict.file_path, conflict.location, conflict.severity
    );
    let _ = write!(context, "## Original Code (baseline)\n```\n{}\n```\n\n", base);

    context.push_str("## Task Changes\n");
    for snapshot in snapshots.iter().filter(|s| conflict.involves(&s.task_id)) {
        let changes: Vec<&str> = snapshot
            .changes(&conflict.file_path)
            .iter()
            .map(|c| c.change_type.as_str())
            .collect();
        let _ = write!(
            context,
            "### {}\nIntent: {}\nChanges: {}\n```\n{}\n```\n\n",
            snapshot.task_id,
            snapshot.intent.as_deref().unwrap_or("Not specified"),
            changes.join(", "),
            snapshot.content(&conflict.file_path).unwrap_or(""),
        );
    }

    context
}

/// Wrap a context in the fixed merge instructions.
pub fn build_merge_prompt(context: &str) -> String {
    format!("{}\n\n{}\n\n{}", PREAMBLE, context, INSTRUCTIONS)
}

/// Rough token count: characters divided by `chars_per_token`, rounded up.
pub fn estimate_tokens(text: &str, chars_per_token: usize) -> usize {
    text.chars().count().div_ceil(chars_per_token.max(1))
}
