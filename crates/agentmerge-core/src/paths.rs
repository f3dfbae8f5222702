//! Path exclusion policy shared by baseline and snapshot collection.

use std::path::{Component, Path};

/// Directories whose contents are never merged.
const SKIP_DIRS: &[&str] = &[".git", "node_modules", "dist", "build"];
/// Lockfiles and other generated files, matched by file name.
const SKIP_FILES: &[&str] = &["package-lock.json", "yarn.lock"];

#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    extra: Vec<String>,
}

impl PathFilter {
    /// `extra` entries exclude any path containing them as a substring.
    pub fn new(extra: impl IntoIterator<Item = String>) -> Self {
        Self {
            extra: extra.into_iter().filter(|s| !s.is_empty()).collect(),
        }
    }

    pub fn should_process(&self, path: &str) -> bool {
        !self.is_skipped(path)
    }

    pub fn is_skipped(&self, path: &str) -> bool {
        let p = Path::new(path);
        let components: Vec<&str> = p
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => s.to_str(),
                _ => None,
            })
            .collect();
        let Some((file_name, dirs)) = components.split_last() else {
            return true;
        };

        if dirs.iter().any(|d| SKIP_DIRS.contains(d)) || *file_name == ".git" {
            return true;
        }
        if SKIP_FILES.contains(file_name) || file_name.ends_with(".log") || file_name.contains(".min.") {
            return true;
        }
        self.extra.iter().any(|pattern| path.contains(pattern.as_str()))
    }
}
