use crate::report::MergeReport;
use crate::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;

pub const LATEST_REPORT: &str = "merge-report-latest.json";
const REPORT_PREFIX: &str = "merge-report-";

/// Directory holding persisted merge reports.
#[derive(Debug, Clone)]
pub struct ReportStore {
    dir: PathBuf,
}

impl ReportStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn latest_path(&self) -> PathBuf {
        self.dir.join(LATEST_REPORT)
    }

    /// Persist the report as a timestamped file and as the latest report.
    /// Returns the timestamped path.
    pub async fn save(&self, report: &MergeReport) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).await?;
        let content = serde_json::to_string_pretty(report)?;

        let stamp = report.completed_at.unwrap_or_else(Utc::now);
        let path = self.dir.join(report_file_name(stamp));
        write_atomic(&path, &content).await?;
        write_atomic(&self.latest_path(), &content).await?;

        tracing::debug!(path = %path.display(), "Saved merge report");
        Ok(path)
    }

    pub async fn load(&self, path: &Path) -> Result<MergeReport> {
        let content = fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    pub async fn load_latest(&self) -> Result<Option<MergeReport>> {
        let path = self.latest_path();
        if !fs::try_exists(&path).await? {
            return Ok(None);
        }
        self.load(&path).await.map(Some)
    }

    /// Timestamped report files, oldest first.
    pub async fn list(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        if !fs::try_exists(&self.dir).await? {
            return Ok(paths);
        }
        let mut dir = fs::read_dir(&self.dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(REPORT_PREFIX) && name.ends_with(".json") && name != LATEST_REPORT {
                paths.push(entry.path());
            }
        }
        // ISO timestamps sort chronologically as text
        paths.sort();
        Ok(paths)
    }
}

/// `merge-report-2026-01-02T03-04-05-678Z.json`
pub fn report_file_name(at: DateTime<Utc>) -> String {
    let stamp = at
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    format!("{}{}.json", REPORT_PREFIX, stamp)
}

/// Write via a hidden tmp file and rename so readers never see a partial file.
async fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));
    fs::write(&tmp, content).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}
