use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MANIFEST_FILE_PREFIX: &str = "manifest-";
pub const MANIFEST_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestStatus {
    Pending,
    Success,
    Failed,
}

impl ManifestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupStrategy {
    Cli,
    Inline,
}

impl BackupStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cli => "cli",
            Self::Inline => "inline",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PackageKind {
    ArchiveDownload,
    Clone,
}

impl PackageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ArchiveDownload => "archive-download",
            Self::Clone => "clone",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub kind: PackageKind,
    pub path: String,
    pub source: String,
}

/// One record per upgrade attempt. Fields are appended as steps complete and
/// the whole document is rewritten to disk after each one, so a crash
/// mid-upgrade still leaves enough state for recovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub id: String,
    pub repo: String,
    #[serde(rename = "ref")]
    pub reference: String,
    pub version_label: String,
    pub release_url: Option<String>,
    pub status: ManifestStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub preserve: Vec<String>,
    pub app_snapshot: Option<String>,
    pub app_snapshot_sha256: Option<String>,
    pub db_backup: Option<String>,
    pub db_backup_strategy: Option<BackupStrategy>,
    pub package: Option<PackageRecord>,
    pub error: Option<String>,
}

impl Manifest {
    pub fn begin(
        id: impl Into<String>,
        repo: impl Into<String>,
        reference: impl Into<String>,
        version_label: impl Into<String>,
        release_url: Option<String>,
        preserve: Vec<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            version: MANIFEST_FORMAT_VERSION,
            id: id.into(),
            repo: repo.into(),
            reference: reference.into(),
            version_label: version_label.into(),
            release_url,
            status: ManifestStatus::Pending,
            started_at,
            completed_at: None,
            preserve,
            app_snapshot: None,
            app_snapshot_sha256: None,
            db_backup: None,
            db_backup_strategy: None,
            package: None,
            error: None,
        }
    }

    /// Status only ever moves pending -> success|failed; a terminal manifest
    /// is never rewritten to another status.
    pub fn mark_success(&mut self, completed_at: DateTime<Utc>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = ManifestStatus::Success;
        self.completed_at = Some(completed_at);
    }

    pub fn mark_failed(&mut self, error: impl Into<String>, completed_at: DateTime<Utc>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = ManifestStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(completed_at);
    }
}

pub fn new_manifest_id(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d_%H%M%S").to_string()
}
