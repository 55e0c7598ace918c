use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::manifest::{Manifest, ManifestStatus, MANIFEST_FILE_PREFIX};

/// Centralizes the naming scheme inside the backup directory: manifests,
/// application snapshots, database dumps, scratch dirs, and the lock file all
/// live side by side under one root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupLayout {
    backup_dir: PathBuf,
}

impl BackupLayout {
    pub fn new(backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            backup_dir: backup_dir.into(),
        }
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    pub fn manifest_path(&self, id: &str) -> PathBuf {
        self.backup_dir
            .join(format!("{MANIFEST_FILE_PREFIX}{id}.json"))
    }

    pub fn app_snapshot_path(&self, id: &str) -> PathBuf {
        self.backup_dir.join(format!("app-{id}.tar.gz"))
    }

    pub fn db_backup_path(&self, id: &str) -> PathBuf {
        self.backup_dir.join(format!("db-{id}.sql"))
    }

    pub fn work_dir(&self, id: &str) -> PathBuf {
        self.backup_dir.join(format!("work-{id}"))
    }

    pub fn lock_path(&self) -> PathBuf {
        self.backup_dir.join("uplift.lock")
    }

    pub fn current_release_path(&self) -> PathBuf {
        self.backup_dir.join("current-release.json")
    }

    pub fn ensure_base_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.backup_dir)
            .with_context(|| format!("failed to create {}", self.backup_dir.display()))
    }
}

pub fn write_manifest(layout: &BackupLayout, manifest: &Manifest) -> Result<PathBuf> {
    let path = layout.manifest_path(&manifest.id);
    let content =
        serde_json::to_string_pretty(manifest).context("failed serializing upgrade manifest")?;
    fs::write(&path, content)
        .with_context(|| format!("failed to write upgrade manifest: {}", path.display()))?;
    Ok(path)
}

pub fn read_manifest(layout: &BackupLayout, id: &str) -> Result<Option<Manifest>> {
    let path = layout.manifest_path(id);
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read upgrade manifest: {}", path.display()));
        }
    };

    let manifest = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse upgrade manifest: {}", path.display()))?;
    Ok(Some(manifest))
}

/// Every manifest in the backup directory, newest id first.
pub fn list_manifests(layout: &BackupLayout) -> Result<Vec<Manifest>> {
    let dir = layout.backup_dir();
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut manifests = Vec::new();
    for entry in fs::read_dir(dir)
        .with_context(|| format!("failed to read backup directory: {}", dir.display()))?
    {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }

        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        if !name.starts_with(MANIFEST_FILE_PREFIX) || !name.ends_with(".json") {
            continue;
        }

        let path = entry.path();
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read upgrade manifest: {}", path.display()))?;
        let manifest: Manifest = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse upgrade manifest: {}", path.display()))?;
        manifests.push(manifest);
    }

    manifests.sort_by(|a, b| b.id.cmp(&a.id));
    Ok(manifests)
}

pub fn latest_successful_manifest(layout: &BackupLayout) -> Result<Option<Manifest>> {
    let manifests = list_manifests(layout)?;
    Ok(manifests
        .into_iter()
        .find(|manifest| manifest.status == ManifestStatus::Success))
}
