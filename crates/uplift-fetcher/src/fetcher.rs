use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use flate2::read::GzDecoder;
use reqwest::blocking::Client as HttpClient;
use uplift_core::{run_checked, CommandRunner, PackageKind};

use crate::resolver::{RepoSlug, USER_AGENT};

const ARCHIVE_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// The fetched new version: an extracted directory inside the scratch dir
/// plus provenance. Transient; the scratch dir is deleted when the operation
/// finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleasePackage {
    pub kind: PackageKind,
    pub path: PathBuf,
    pub source: String,
}

pub fn fetch_release(
    repo: &str,
    reference: &str,
    scratch: &Path,
    runner: &dyn CommandRunner,
) -> Result<ReleasePackage> {
    fs::create_dir_all(scratch)
        .with_context(|| format!("failed to create {}", scratch.display()))?;

    match RepoSlug::parse(repo) {
        Some(slug) => fetch_archive(&slug, reference, scratch),
        None => fetch_clone(repo, reference, scratch, runner),
    }
}

fn fetch_archive(slug: &RepoSlug, reference: &str, scratch: &Path) -> Result<ReleasePackage> {
    let url = slug.archive_url(reference);
    let archive_path = scratch.join("release.tar.gz");
    download_archive(&url, &archive_path)?;

    let extract_dir = scratch.join("package");
    extract_release_archive(&archive_path, &extract_dir)?;
    let root = single_root_dir(&extract_dir)?;

    Ok(ReleasePackage {
        kind: PackageKind::ArchiveDownload,
        path: root,
        source: url,
    })
}

fn download_archive(url: &str, out_path: &Path) -> Result<()> {
    let http = HttpClient::builder()
        .timeout(ARCHIVE_DOWNLOAD_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
        .context("failed to build HTTP client")?;

    let response = http
        .get(url)
        .send()
        .with_context(|| format!("release download failed: {url}"))?;
    if !response.status().is_success() {
        bail!(
            "release download failed: {url} returned {}",
            response.status()
        );
    }

    let bytes = response
        .bytes()
        .with_context(|| format!("release download failed while reading body: {url}"))?;
    if bytes.is_empty() {
        bail!("release download failed: {url} produced an empty archive");
    }

    fs::write(out_path, &bytes)
        .with_context(|| format!("failed to write release archive: {}", out_path.display()))
}

pub(crate) fn extract_release_archive(archive_path: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst).with_context(|| format!("failed to create {}", dst.display()))?;
    let file = File::open(archive_path)
        .with_context(|| format!("failed to open release archive: {}", archive_path.display()))?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    archive.set_preserve_permissions(true);
    archive.unpack(dst).with_context(|| {
        format!(
            "failed to extract release archive {} to {}",
            archive_path.display(),
            dst.display()
        )
    })
}

/// Hosted archives wrap all content in one `repo-ref` directory; anything
/// else indicates a corrupt or foreign download.
pub(crate) fn single_root_dir(extract_dir: &Path) -> Result<PathBuf> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(extract_dir)
        .with_context(|| format!("failed to read {}", extract_dir.display()))?
    {
        let entry = entry
            .with_context(|| format!("failed reading entry in {}", extract_dir.display()))?;
        entries.push(entry.path());
    }

    if entries.len() == 1 && entries[0].is_dir() {
        return Ok(entries.remove(0));
    }
    bail!(
        "release archive layout unexpected: expected a single top-level directory in {}",
        extract_dir.display()
    );
}

fn fetch_clone(
    repo: &str,
    reference: &str,
    scratch: &Path,
    runner: &dyn CommandRunner,
) -> Result<ReleasePackage> {
    let dest = scratch.join("clone");
    let mut command = build_clone_command(repo, reference, &dest);
    run_checked(
        runner,
        &mut command,
        &format!("git clone failed for '{repo}'"),
    )?;

    let git_dir = dest.join(".git");
    if git_dir.exists() {
        fs::remove_dir_all(&git_dir)
            .with_context(|| format!("failed to remove {}", git_dir.display()))?;
    }

    Ok(ReleasePackage {
        kind: PackageKind::Clone,
        path: dest,
        source: format!("{repo}#{reference}"),
    })
}

pub(crate) fn build_clone_command(repo: &str, reference: &str, dest: &Path) -> Command {
    let mut command = Command::new("git");
    command.arg("clone").arg("--depth").arg("1");
    if !reference.is_empty() {
        command.arg("--branch").arg(reference);
    }
    command.arg("--").arg(repo).arg(dest);
    command
}
