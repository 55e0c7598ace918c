use std::path::Path;
use std::process::Command;

use anyhow::{bail, Result};
use uplift_core::{command_available, run_checked, BackupStrategy, CommandRunner};

use crate::config::DbConfig;
use crate::inline::{inline_backup, inline_restore};

pub const DUMP_COMMAND: &str = "pg_dump";
pub const RESTORE_COMMAND: &str = "psql";

/// Subprocess strategy when both external commands resolve, in-process
/// fallback otherwise. The chosen strategy is recorded on the manifest so a
/// later restore uses the matching code path.
pub fn detect_strategy(runner: &dyn CommandRunner) -> BackupStrategy {
    if command_available(runner, DUMP_COMMAND) && command_available(runner, RESTORE_COMMAND) {
        BackupStrategy::Cli
    } else {
        BackupStrategy::Inline
    }
}

pub fn backup_database(
    config: &DbConfig,
    runner: &dyn CommandRunner,
    out_path: &Path,
    strategy: BackupStrategy,
) -> Result<()> {
    match strategy {
        BackupStrategy::Cli => {
            run_checked(
                runner,
                &mut build_dump_command(config, out_path),
                &format!("database dump failed for {}", config.describe()),
            )?;
            Ok(())
        }
        BackupStrategy::Inline => inline_backup(config, out_path),
    }
}

pub fn restore_database(
    config: &DbConfig,
    runner: &dyn CommandRunner,
    backup_path: &Path,
    strategy: BackupStrategy,
) -> Result<()> {
    if !backup_path.exists() {
        bail!(
            "database backup file not found: {}",
            backup_path.display()
        );
    }

    match strategy {
        BackupStrategy::Cli => {
            run_checked(
                runner,
                &mut build_restore_command(config, backup_path),
                &format!("database restore failed for {}", config.describe()),
            )?;
            Ok(())
        }
        BackupStrategy::Inline => inline_restore(config, backup_path),
    }
}

pub(crate) fn build_dump_command(config: &DbConfig, out_path: &Path) -> Command {
    let mut command = Command::new(DUMP_COMMAND);
    command
        .arg("--no-owner")
        .arg("--no-privileges")
        .arg("--clean")
        .arg("--if-exists")
        .arg("-h")
        .arg(&config.host)
        .arg("-p")
        .arg(config.port.to_string())
        .arg("-U")
        .arg(&config.user)
        .arg("-f")
        .arg(out_path)
        .arg(&config.name);
    command.env("PGPASSWORD", &config.password);
    command
}

pub(crate) fn build_restore_command(config: &DbConfig, backup_path: &Path) -> Command {
    let mut command = Command::new(RESTORE_COMMAND);
    command
        .arg("-v")
        .arg("ON_ERROR_STOP=1")
        .arg("-h")
        .arg(&config.host)
        .arg("-p")
        .arg(config.port.to_string())
        .arg("-U")
        .arg(&config.user)
        .arg("-d")
        .arg(&config.name)
        .arg("-f")
        .arg(backup_path);
    command.env("PGPASSWORD", &config.password);
    command
}
