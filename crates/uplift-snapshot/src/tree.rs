use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use uplift_core::PreserveSet;

/// Delete everything under the application root that is not preserved.
/// Directories that shelter a preserved path deeper down are recursed into;
/// everything else is removed wholesale.
pub fn purge_tree(app_root: &Path, preserve: &PreserveSet) -> Result<()> {
    purge_dir(app_root, app_root, preserve)
}

fn purge_dir(root: &Path, dir: &Path, preserve: &PreserveSet) -> Result<()> {
    for entry in
        fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?
    {
        let entry = entry.with_context(|| format!("failed reading entry in {}", dir.display()))?;
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
            if preserve.shelters(rel) {
                purge_dir(root, &path, preserve)?;
            } else {
                fs::remove_dir_all(&path)
                    .with_context(|| format!("failed to remove {}", path.display()))?;
            }
        } else {
            fs::remove_file(&path)
                .with_context(|| format!("failed to remove {}", path.display()))?;
        }
    }
    Ok(())
}

/// Copy a source tree into the application root, skipping preserved paths.
/// Source permission bits propagate through `fs::copy`; symlinks are
/// re-created rather than followed.
pub fn install_tree(source_root: &Path, app_root: &Path, preserve: &PreserveSet) -> Result<()> {
    install_dir(source_root, source_root, app_root, preserve)
}

fn install_dir(
    source_root: &Path,
    dir: &Path,
    app_root: &Path,
    preserve: &PreserveSet,
) -> Result<()> {
    for entry in
        fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?
    {
        let entry = entry.with_context(|| format!("failed reading entry in {}", dir.display()))?;
        let path = entry.path();
        let rel = path
            .strip_prefix(source_root)
            .with_context(|| format!("failed to relativize {}", path.display()))?;
        if preserve.contains(rel) {
            continue;
        }

        let dst = app_root.join(rel);
        let metadata = fs::symlink_metadata(&path)
            .with_context(|| format!("failed to stat {}", path.display()))?;

        if metadata.is_dir() {
            fs::create_dir_all(&dst)
                .with_context(|| format!("failed to create {}", dst.display()))?;
            install_dir(source_root, &path, app_root, preserve)?;
            continue;
        }

        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        #[cfg(unix)]
        if metadata.file_type().is_symlink() {
            let target = fs::read_link(&path)
                .with_context(|| format!("failed to read symlink {}", path.display()))?;
            if dst.exists() || fs::symlink_metadata(&dst).is_ok() {
                fs::remove_file(&dst)
                    .with_context(|| format!("failed to replace {}", dst.display()))?;
            }
            std::os::unix::fs::symlink(&target, &dst).with_context(|| {
                format!(
                    "failed to create symlink {} -> {}",
                    dst.display(),
                    target.display()
                )
            })?;
            continue;
        }

        fs::copy(&path, &dst).with_context(|| {
            format!("failed to copy {} to {}", path.display(), dst.display())
        })?;
    }
    Ok(())
}
