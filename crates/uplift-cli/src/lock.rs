use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use uplift_core::BackupLayout;

/// Advisory lock held for the duration of an upgrade or downgrade. The lock
/// file lives in the backup directory (always preserved, so a purge cannot
/// delete it) and is released on every exit path when the guard drops.
#[derive(Debug)]
pub struct EngineLock {
    path: PathBuf,
}

impl EngineLock {
    pub fn acquire(layout: &BackupLayout) -> Result<Self> {
        let path = layout.lock_path();
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                let holder = fs::read_to_string(&path)
                    .ok()
                    .map(|raw| raw.trim().to_string())
                    .filter(|pid| !pid.is_empty());
                let detail = holder
                    .map(|pid| format!(" (held by pid {pid})"))
                    .unwrap_or_default();
                return Err(anyhow!(
                    "another upgrade or downgrade is already running{detail}: {}",
                    path.display()
                ));
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to claim lock file: {}", path.display()));
            }
        };

        file.write_all(format!("{}\n", std::process::id()).as_bytes())
            .with_context(|| format!("failed to write lock file: {}", path.display()))?;
        Ok(Self { path })
    }
}

impl Drop for EngineLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
