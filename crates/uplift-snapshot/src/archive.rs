use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use uplift_core::{run_checked, CommandRunner, PreserveSet};

use crate::tree::{install_tree, purge_tree};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotFormat {
    TarGz,
    Zip,
}

impl SnapshotFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|value| value.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            return Ok(Self::TarGz);
        }
        if name.ends_with(".zip") {
            return Ok(Self::Zip);
        }
        Err(anyhow!(
            "unsupported snapshot format: {}",
            path.display()
        ))
    }
}

/// Archive the application tree minus preserved paths, with relative paths,
/// permission bits, symlink entries, and directory entries for empty dirs.
pub fn create_snapshot(
    app_root: &Path,
    preserve: &PreserveSet,
    archive_path: &Path,
) -> Result<()> {
    if let Some(parent) = archive_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let file = File::create(archive_path)
        .with_context(|| format!("failed to create snapshot archive: {}", archive_path.display()))?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);

    append_tree(&mut builder, app_root, app_root, preserve)?;

    let encoder = builder
        .into_inner()
        .with_context(|| format!("failed writing snapshot archive: {}", archive_path.display()))?;
    encoder.finish().with_context(|| {
        format!("failed finalizing snapshot archive: {}", archive_path.display())
    })?;
    Ok(())
}

fn append_tree<W: Write>(
    builder: &mut tar::Builder<W>,
    root: &Path,
    dir: &Path,
    preserve: &PreserveSet,
) -> Result<()> {
    let mut entries = Vec::new();
    for entry in
        fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?
    {
        entries.push(entry.with_context(|| format!("failed reading entry in {}", dir.display()))?);
    }
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        let rel = path
            .strip_prefix(root)
            .with_context(|| format!("failed to relativize {}", path.display()))?;
        if preserve.contains(rel) {
            continue;
        }

        let metadata = fs::symlink_metadata(&path)
            .with_context(|| format!("failed to stat {}", path.display()))?;
        if metadata.is_dir() {
            builder
                .append_dir(rel, &path)
                .with_context(|| format!("failed to archive directory {}", path.display()))?;
            append_tree(builder, root, &path, preserve)?;
        } else {
            builder
                .append_path_with_name(&path, rel)
                .with_context(|| format!("failed to archive {}", path.display()))?;
        }
    }
    Ok(())
}

/// Purge the application tree, extract the snapshot into a temporary
/// directory next to the archive, and install the extracted tree with an
/// empty preserve set: snapshot contents already exclude preserved paths and
/// must not be filtered twice.
pub fn restore_snapshot(
    archive_path: &Path,
    app_root: &Path,
    preserve: &PreserveSet,
    runner: &dyn CommandRunner,
) -> Result<()> {
    let format = SnapshotFormat::from_path(archive_path)?;
    if !archive_path.exists() {
        return Err(anyhow!(
            "snapshot archive not found: {}",
            archive_path.display()
        ));
    }

    purge_tree(app_root, preserve)?;

    let staging = restore_staging_dir(archive_path);
    fs::create_dir_all(&staging)
        .with_context(|| format!("failed to create {}", staging.display()))?;

    let result = match format {
        SnapshotFormat::TarGz => extract_tar_gz(archive_path, &staging),
        SnapshotFormat::Zip => extract_zip(archive_path, &staging, runner),
    }
    .and_then(|_| install_tree(&staging, app_root, &PreserveSet::empty()));

    let _ = fs::remove_dir_all(&staging);
    result
}

fn restore_staging_dir(archive_path: &Path) -> PathBuf {
    let parent = archive_path.parent().unwrap_or_else(|| Path::new("."));
    parent.join(format!(
        "restore-{}-{}",
        std::process::id(),
        unix_timestamp()
    ))
}

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|value| value.as_secs())
        .unwrap_or(0)
}

pub(crate) fn extract_tar_gz(archive_path: &Path, dst: &Path) -> Result<()> {
    let file = File::open(archive_path)
        .with_context(|| format!("failed to open snapshot archive: {}", archive_path.display()))?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    archive.set_preserve_permissions(true);
    archive.unpack(dst).with_context(|| {
        format!(
            "failed to extract snapshot archive {} to {}",
            archive_path.display(),
            dst.display()
        )
    })
}

pub(crate) fn extract_zip(
    archive_path: &Path,
    dst: &Path,
    runner: &dyn CommandRunner,
) -> Result<()> {
    let mut unzip_command = Command::new("unzip");
    unzip_command.arg("-q").arg(archive_path).arg("-d").arg(dst);
    if run_checked(
        runner,
        &mut unzip_command,
        "failed to extract zip snapshot with unzip",
    )
    .is_ok()
    {
        return Ok(());
    }

    run_checked(
        runner,
        Command::new("tar")
            .arg("-xf")
            .arg(archive_path)
            .arg("-C")
            .arg(dst),
        "failed to extract zip snapshot with tar fallback",
    )
    .map(|_| ())
}
