use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Read access to the version-control system.
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Every tracked path at `reference`.
    async fn list_files(&self, reference: &str) -> Result<Vec<String>>;

    /// Content of `path` at `reference`.
    async fn read_file(&self, reference: &str, path: &str) -> Result<String>;

    /// Paths changed in `working_copy` relative to `base`.
    async fn changed_files(&self, working_copy: &Path, base: &str) -> Result<Vec<String>>;
}

/// [`VersionControl`] backed by the `git` executable.
#[derive(Debug, Clone)]
pub struct GitCli {
    root: PathBuf,
    binary: String,
}

impl GitCli {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            binary: "git".into(),
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    async fn run(&self, cwd: &Path, args: &[&str]) -> Result<String> {
        let command = format!("{} {}", self.binary, args.join(" "));
        tracing::trace!(cwd = %cwd.display(), "{}", command);

        let output = Command::new(&self.binary)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::Vcs {
                command: command.clone(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(Error::Vcs {
                command,
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        String::from_utf8(output.stdout).map_err(|_| Error::Vcs {
            command,
            message: "output is not valid UTF-8".into(),
        })
    }
}

#[async_trait]
impl VersionControl for GitCli {
    async fn list_files(&self, reference: &str) -> Result<Vec<String>> {
        let out = self
            .run(&self.root, &["ls-tree", "-r", "--name-only", reference])
            .await?;
        Ok(split_paths(&out))
    }

    async fn read_file(&self, reference: &str, path: &str) -> Result<String> {
        let spec = format!("{}:{}", reference, path);
        self.run(&self.root, &["show", &spec]).await
    }

    async fn changed_files(&self, working_copy: &Path, base: &str) -> Result<Vec<String>> {
        let range = format!("{}...HEAD", base);
        let out = self.run(working_copy, &["diff", "--name-only", &range]).await?;
        Ok(split_paths(&out))
    }
}

fn split_paths(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_paths_ignores_blank_lines() {
        assert_eq!(split_paths("a.js\n\nsrc/b.py\n"), vec!["a.js", "src/b.py"]);
        assert!(split_paths("").is_empty());
    }

    #[tokio::test]
    async fn test_missing_binary_is_a_vcs_error() {
        let dir = tempfile::tempdir().unwrap();
        let git = GitCli::new(dir.path()).with_binary("definitely-not-a-git-binary");
        match git.list_files("main").await {
            Err(Error::Vcs { command, .. }) => {
                assert!(command.starts_with("definitely-not-a-git-binary ls-tree"));
            }
            other => panic!("expected vcs error, got {:?}", other),
        }
    }
}
