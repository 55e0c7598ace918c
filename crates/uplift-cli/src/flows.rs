use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uplift_core::{
    latest_successful_manifest, list_manifests, new_manifest_id, read_manifest, sha256_hex_file,
    write_manifest, BackupLayout, BackupStrategy, CommandRunner, Manifest, PackageRecord,
    SystemRunner, MANIFEST_FORMAT_VERSION,
};
use uplift_db::{backup_database, detect_strategy, restore_database};
use uplift_fetcher::{fetch_release, resolve_target, ReleasePackage, ResolvedTarget};
use uplift_snapshot::{create_snapshot, install_tree, purge_tree, restore_snapshot};

use crate::config::EngineConfig;
use crate::lock::EngineLock;
use crate::render::{
    current_output_style, eprint_status, print_section, print_status, with_spinner, OutputStyle,
};

#[derive(Debug, Clone)]
pub struct UpgradeRequest {
    pub repo: String,
    pub reference: Option<String>,
    pub latest_release: bool,
}

#[derive(Debug, Clone)]
pub struct DowngradeRequest {
    pub backup_id: Option<String>,
    pub restore_db: bool,
}

/// The externally-effectful steps, injectable so failure paths are testable
/// without a network or a database. `db_backup` writes the dump and reports
/// which strategy produced it.
pub(crate) struct UpgradeHooks<'a> {
    pub fetch: &'a dyn Fn(&str, &str, &Path) -> Result<ReleasePackage>,
    pub db_backup: &'a dyn Fn(&Path) -> Result<BackupStrategy>,
    pub db_restore: &'a dyn Fn(&Path, BackupStrategy) -> Result<()>,
}

pub fn run_upgrade_command(config: &EngineConfig, request: &UpgradeRequest) -> Result<()> {
    let runner = SystemRunner;
    let db_config = config.db_config()?;

    let fetch = |repo: &str, reference: &str, scratch: &Path| -> Result<ReleasePackage> {
        fetch_release(repo, reference, scratch, &runner)
    };
    let db_backup = |out_path: &Path| -> Result<BackupStrategy> {
        let strategy = detect_strategy(&runner);
        backup_database(&db_config, &runner, out_path, strategy)?;
        Ok(strategy)
    };
    let db_restore = |backup_path: &Path, strategy: BackupStrategy| -> Result<()> {
        restore_database(&db_config, &runner, backup_path, strategy)
    };

    run_upgrade_with_hooks(
        config,
        request,
        &runner,
        &UpgradeHooks {
            fetch: &fetch,
            db_backup: &db_backup,
            db_restore: &db_restore,
        },
    )
}

pub(crate) fn run_upgrade_with_hooks(
    config: &EngineConfig,
    request: &UpgradeRequest,
    runner: &dyn CommandRunner,
    hooks: &UpgradeHooks<'_>,
) -> Result<()> {
    let style = current_output_style();
    let layout = config.layout();
    layout.ensure_base_dirs()?;
    let _lock = EngineLock::acquire(&layout)?;

    let target = resolve_target(
        &request.repo,
        request.reference.as_deref(),
        request.latest_release,
        config.github_token.as_deref(),
    )?;

    print_section(style, "upgrade");
    print_status(
        style,
        "step",
        &format!("upgrading {} to {}", request.repo, target.label),
    );

    let started_at = Utc::now();
    let id = new_manifest_id(started_at);
    let mut manifest = Manifest::begin(
        &id,
        &request.repo,
        &target.reference,
        &target.label,
        target.url.clone(),
        config.preserve.entries().to_vec(),
        started_at,
    );
    write_manifest(&layout, &manifest)?;

    let scratch = layout.work_dir(&id);
    let outcome = run_upgrade_steps(config, &layout, &mut manifest, &target, &scratch, hooks, style);

    // cleanup, not gated on outcome
    let _ = fs::remove_dir_all(&scratch);

    match outcome {
        Ok(()) => {
            manifest.mark_success(Utc::now());
            write_manifest(&layout, &manifest)?;
            write_current_release(&layout, &manifest)?;
            print_status(
                style,
                "ok",
                &format!("upgraded to {} (backup id {})", target.label, manifest.id),
            );
            Ok(())
        }
        Err(err) => {
            manifest.mark_failed(format!("{err:#}"), Utc::now());
            if let Err(persist_err) = write_manifest(&layout, &manifest) {
                eprint_status(
                    style,
                    "warn",
                    &format!("failed to persist failure manifest: {persist_err:#}"),
                );
            }
            attempt_recovery(config, &layout, &manifest, runner, hooks, style);
            Err(err)
        }
    }
}

fn run_upgrade_steps(
    config: &EngineConfig,
    layout: &BackupLayout,
    manifest: &mut Manifest,
    target: &ResolvedTarget,
    scratch: &Path,
    hooks: &UpgradeHooks<'_>,
    style: OutputStyle,
) -> Result<()> {
    print_status(style, "step", "archiving current application tree");
    let snapshot_path = layout.app_snapshot_path(&manifest.id);
    with_spinner(style, "snapshot", || {
        create_snapshot(&config.app_root, &config.preserve, &snapshot_path)
    })?;
    manifest.app_snapshot = Some(snapshot_path.display().to_string());
    manifest.app_snapshot_sha256 = Some(sha256_hex_file(&snapshot_path)?);
    write_manifest(layout, manifest)?;

    print_status(style, "step", "backing up database");
    let db_path = layout.db_backup_path(&manifest.id);
    let strategy = with_spinner(style, "db backup", || (hooks.db_backup)(&db_path))?;
    manifest.db_backup = Some(db_path.display().to_string());
    manifest.db_backup_strategy = Some(strategy);
    write_manifest(layout, manifest)?;

    print_status(
        style,
        "step",
        &format!("fetching {} {}", manifest.repo, target.reference),
    );
    let package = with_spinner(style, "fetch", || {
        (hooks.fetch)(&manifest.repo, &target.reference, scratch)
    })?;
    manifest.package = Some(PackageRecord {
        kind: package.kind,
        path: package.path.display().to_string(),
        source: package.source.clone(),
    });
    write_manifest(layout, manifest)?;

    print_status(style, "step", "installing new release");
    purge_tree(&config.app_root, &config.preserve)?;
    install_tree(&package.path, &config.app_root, &config.preserve)?;
    Ok(())
}

/// Best-effort restoration from whatever the manifest already records.
/// Failures here are reported but never mask the original upgrade error;
/// the operator is pointed at the backup directory for manual recovery.
fn attempt_recovery(
    config: &EngineConfig,
    layout: &BackupLayout,
    manifest: &Manifest,
    runner: &dyn CommandRunner,
    hooks: &UpgradeHooks<'_>,
    style: OutputStyle,
) {
    eprint_status(style, "warn", "upgrade failed; attempting automatic restore");

    if let Some(snapshot) = manifest.app_snapshot.as_deref() {
        match restore_snapshot(Path::new(snapshot), &config.app_root, &config.preserve, runner) {
            Ok(()) => {
                eprint_status(
                    style,
                    "ok",
                    &format!("application tree restored from {snapshot}"),
                );
            }
            Err(err) => {
                eprint_status(
                    style,
                    "err",
                    &format!(
                        "application restore failed: {err:#}; recover manually from {}",
                        layout.backup_dir().display()
                    ),
                );
            }
        }
    }

    if let Some(db_backup) = manifest.db_backup.as_deref() {
        let strategy = manifest.db_backup_strategy.unwrap_or(BackupStrategy::Cli);
        match (hooks.db_restore)(Path::new(db_backup), strategy) {
            Ok(()) => eprint_status(style, "ok", &format!("database restored from {db_backup}")),
            Err(err) => {
                eprint_status(
                    style,
                    "err",
                    &format!(
                        "database restore failed: {err:#}; recover manually from {}",
                        layout.backup_dir().display()
                    ),
                );
            }
        }
    }
}

pub fn run_downgrade_command(config: &EngineConfig, request: &DowngradeRequest) -> Result<()> {
    let runner = SystemRunner;
    let db_restore = |backup_path: &Path, strategy: BackupStrategy| -> Result<()> {
        let db_config = config.db_config()?;
        restore_database(&db_config, &runner, backup_path, strategy)
    };
    run_downgrade_with_hooks(config, request, &runner, &db_restore)
}

pub(crate) fn run_downgrade_with_hooks(
    config: &EngineConfig,
    request: &DowngradeRequest,
    runner: &dyn CommandRunner,
    db_restore: &dyn Fn(&Path, BackupStrategy) -> Result<()>,
) -> Result<()> {
    let style = current_output_style();
    let layout = config.layout();
    layout.ensure_base_dirs()?;
    let _lock = EngineLock::acquire(&layout)?;

    let manifest = locate_backup(&layout, request.backup_id.as_deref())?;
    let snapshot = manifest.app_snapshot.as_deref().ok_or_else(|| {
        anyhow!(
            "backup {} has no application snapshot to restore",
            manifest.id
        )
    })?;

    print_section(style, "downgrade");
    print_status(
        style,
        "step",
        &format!("restoring application tree from backup {}", manifest.id),
    );
    with_spinner(style, "restore", || {
        restore_snapshot(Path::new(snapshot), &config.app_root, &config.preserve, runner)
    })?;

    if request.restore_db {
        let db_backup = manifest.db_backup.as_deref().ok_or_else(|| {
            anyhow!("backup {} has no database dump to restore", manifest.id)
        })?;
        let strategy = manifest.db_backup_strategy.unwrap_or(BackupStrategy::Cli);
        print_status(style, "step", "restoring database");
        with_spinner(style, "db restore", || db_restore(Path::new(db_backup), strategy))?;
    } else {
        print_status(
            style,
            "step",
            "database restore skipped (pass --restore-db to include it)",
        );
    }

    print_status(
        style,
        "ok",
        &format!("downgraded to backup {}", manifest.id),
    );
    Ok(())
}

fn locate_backup(layout: &BackupLayout, backup_id: Option<&str>) -> Result<Manifest> {
    match backup_id {
        Some(id) => read_manifest(layout, id)?
            .ok_or_else(|| anyhow!("unable to locate backup metadata for '{id}'")),
        None => latest_successful_manifest(layout)?.ok_or_else(|| {
            anyhow!("unable to locate backup metadata: no successful upgrade recorded")
        }),
    }
}

pub fn run_list_backups_command(config: &EngineConfig) -> Result<()> {
    let layout = config.layout();
    let manifests = list_manifests(&layout)?;
    if manifests.is_empty() {
        println!("no backups found");
        return Ok(());
    }

    for line in format_backup_table_lines(&manifests) {
        println!("{line}");
    }
    Ok(())
}

pub(crate) fn format_backup_table_lines(manifests: &[Manifest]) -> Vec<String> {
    let mut lines = vec![format!(
        "{:<17}  {:<8}  {:<20}  {}",
        "ID", "STATUS", "REF", "STARTED AT"
    )];
    for manifest in manifests {
        lines.push(format!(
            "{:<17}  {:<8}  {:<20}  {}",
            manifest.id,
            manifest.status.as_str(),
            manifest.reference,
            manifest.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
    }
    lines
}

#[derive(Debug, Serialize)]
struct CurrentRelease<'a> {
    version: u32,
    id: &'a str,
    repo: &'a str,
    #[serde(rename = "ref")]
    reference: &'a str,
    label: &'a str,
    url: &'a Option<String>,
    installed_at: DateTime<Utc>,
}

fn write_current_release(layout: &BackupLayout, manifest: &Manifest) -> Result<()> {
    let record = CurrentRelease {
        version: MANIFEST_FORMAT_VERSION,
        id: &manifest.id,
        repo: &manifest.repo,
        reference: &manifest.reference,
        label: &manifest.version_label,
        url: &manifest.release_url,
        installed_at: manifest.completed_at.unwrap_or(manifest.started_at),
    };
    let path = layout.current_release_path();
    let content =
        serde_json::to_string_pretty(&record).context("failed serializing release metadata")?;
    fs::write(&path, content)
        .with_context(|| format!("failed to write release metadata: {}", path.display()))
}
