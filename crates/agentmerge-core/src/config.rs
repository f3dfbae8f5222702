use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub merge: MergeSettings,
    #[serde(default)]
    pub ai: AiSettings,
    #[serde(default)]
    pub paths: PathSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeSettings {
    /// Repository root; merged files are written relative to it.
    #[serde(default = "default_root_path")]
    pub root_path: PathBuf,
    #[serde(default = "default_target_branch")]
    pub target_branch: String,
    #[serde(default)]
    pub dry_run: bool,
    /// Report directory, relative to `root_path` unless absolute.
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
}

impl Default for MergeSettings {
    fn default() -> Self {
        Self {
            root_path: default_root_path(),
            target_branch: default_target_branch(),
            dry_run: false,
            storage_dir: default_storage_dir(),
            confidence_threshold: default_confidence_threshold(),
        }
    }
}

impl MergeSettings {
    pub fn storage_path(&self) -> PathBuf {
        if self.storage_dir.is_absolute() {
            self.storage_dir.clone()
        } else {
            self.root_path.join(&self.storage_dir)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelBackend {
    Claude,
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_backend")]
    pub backend: ModelBackend,
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
    #[serde(default = "default_claude_binary")]
    pub claude_binary: String,
    #[serde(default)]
    pub http_url: Option<String>,
    #[serde(default = "default_http_model")]
    pub http_model: String,
    #[serde(default = "default_max_response_tokens")]
    pub max_response_tokens: u32,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: default_backend(),
            max_context_tokens: default_max_context_tokens(),
            chars_per_token: default_chars_per_token(),
            timeout_secs: default_timeout_secs(),
            max_output_bytes: default_max_output_bytes(),
            claude_binary: default_claude_binary(),
            http_url: None,
            http_model: default_http_model(),
            max_response_tokens: default_max_response_tokens(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathSettings {
    /// Extra path substrings excluded on top of the built-in skip list.
    #[serde(default)]
    pub extra_skip: Vec<String>,
}

fn default_root_path() -> PathBuf {
    PathBuf::from(".")
}
fn default_target_branch() -> String {
    "main".into()
}
fn default_storage_dir() -> PathBuf {
    PathBuf::from(".agentmerge/merge")
}
fn default_confidence_threshold() -> f64 {
    0.7
}
fn default_true() -> bool {
    true
}
fn default_backend() -> ModelBackend {
    ModelBackend::Claude
}
fn default_max_context_tokens() -> usize {
    4000
}
fn default_chars_per_token() -> usize {
    4
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_max_output_bytes() -> usize {
    10 * 1024 * 1024
}
fn default_claude_binary() -> String {
    "claude".into()
}
fn default_http_model() -> String {
    "gpt-4o-mini".into()
}
fn default_max_response_tokens() -> u32 {
    2048
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.merge.confidence_threshold) {
            return Err(Error::Config(format!(
                "merge.confidence_threshold must be within [0, 1], got {}",
                self.merge.confidence_threshold
            )));
        }
        if self.ai.chars_per_token == 0 {
            return Err(Error::Config("ai.chars_per_token must be positive".into()));
        }
        if self.ai.enabled && self.ai.backend == ModelBackend::Http && self.ai.http_url.is_none() {
            return Err(Error::Config("ai.backend is http but ai.http_url is not set".into()));
        }
        Ok(())
    }
}
