//! Language detection from file extensions.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Languages the analyzer knows about.
///
/// Only the script languages and Python have element extractors. The rest are
/// recognised so reports can name them, but yield empty element sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    JavaScript,
    TypeScript,
    Python,
    Css,
    Scss,
    Json,
    Markdown,
    Yaml,
    Text,
}

impl Language {
    /// Infer language from a file extension (without the dot, any case).
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "js" | "jsx" => Language::JavaScript,
            "ts" | "tsx" => Language::TypeScript,
            "py" => Language::Python,
            "css" => Language::Css,
            "scss" => Language::Scss,
            "json" => Language::Json,
            "md" => Language::Markdown,
            "yaml" | "yml" => Language::Yaml,
            _ => Language::Text,
        }
    }

    pub fn from_path(path: &str) -> Self {
        Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(Language::from_extension)
            .unwrap_or(Language::Text)
    }

    /// JavaScript-family languages share one set of extraction patterns.
    pub fn is_script(&self) -> bool {
        matches!(self, Language::JavaScript | Language::TypeScript)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Python => "python",
            Language::Css => "css",
            Language::Scss => "scss",
            Language::Json => "json",
            Language::Markdown => "markdown",
            Language::Yaml => "yaml",
            Language::Text => "text",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
