use agentmerge_core::{EventSink, FileOutcome, MergeEvent};
use std::path::{Component, Path, PathBuf};
use tokio::fs;

/// Write the merged content of every merged file under `root`.
///
/// Files are written one by one; a failure stops the loop and leaves earlier
/// writes in place. Returns the number of files written.
pub async fn apply_merged(root: &Path, results: &[FileOutcome], events: &dyn EventSink) -> anyhow::Result<usize> {
    let mut written = 0;

    for outcome in results {
        if !outcome.result.is_merged() {
            continue;
        }
        let Some(content) = outcome.result.merged_content.as_deref() else {
            continue;
        };

        let full_path = resolve_inside(root, &outcome.file_path)?;
        if let Some(dir) = full_path.parent() {
            fs::create_dir_all(dir).await?;
        }
        // tmp + rename so a crash never leaves a half-written source file
        let file_name = full_path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = full_path.with_file_name(format!(".{}.agentmerge.tmp", file_name));
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &full_path).await?;

        written += 1;
        tracing::debug!(file = %outcome.file_path, "Wrote merged file");
        events.emit(MergeEvent::FileMerged {
            file_path: outcome.file_path.clone(),
            decision: outcome.decision(),
        });
    }

    Ok(written)
}

/// Join a repository-relative path onto `root`, refusing anything that
/// could land outside it.
fn resolve_inside(root: &Path, relative: &str) -> anyhow::Result<PathBuf> {
    let path = Path::new(relative);
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if relative.is_empty() || escapes {
        anyhow::bail!("Refusing to write outside the repository: {}", relative);
    }
    Ok(root.join(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentmerge_core::NoopSink;
    use merge_engine::MergeResult;

    #[tokio::test]
    async fn test_writes_only_merged_files() {
        let dir = tempfile::tempdir().unwrap();
        let results = vec![
            FileOutcome::new("src/a.js", vec!["t1".into()], MergeResult::auto_merged("a\n", "ok")),
            FileOutcome::new("src/b.js", vec!["t1".into()], MergeResult::needs_review("conflict")),
        ];

        let written = apply_merged(dir.path(), &results, &NoopSink).await.unwrap();
        assert_eq!(written, 1);
        assert_eq!(std::fs::read_to_string(dir.path().join("src/a.js")).unwrap(), "a\n");
        assert!(!dir.path().join("src/b.js").exists());
        assert!(!dir.path().join("src/.a.js.agentmerge.tmp").exists());
    }

    #[tokio::test]
    async fn test_rejects_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        for bad in ["../evil.js", "/etc/passwd", "a/../../b.js"] {
            let results = vec![FileOutcome::new(bad, vec![], MergeResult::auto_merged("x", "ok"))];
            assert!(apply_merged(dir.path(), &results, &NoopSink).await.is_err(), "{}", bad);
        }
    }
}
