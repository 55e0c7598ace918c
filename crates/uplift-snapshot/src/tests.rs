use super::*;

use std::cell::RefCell;
use std::fs;
use std::path::Path;
use std::process::Command;

use uplift_core::{CommandOutput, CommandRunner, PreserveSet};

use crate::archive::extract_tar_gz;

fn write_file(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("must create parent dirs");
    }
    fs::write(&path, content).expect("must write file");
}

fn read_file(root: &Path, rel: &str) -> String {
    fs::read_to_string(root.join(rel)).expect("file must exist")
}

fn sample_app_tree(root: &Path) {
    write_file(root, "index.html", "v1 index");
    write_file(root, "lib/util.js", "v1 util");
    write_file(root, "uploads/avatars/1.png", "user avatar");
    write_file(root, "storage/report.pdf", "user report");
    fs::create_dir_all(root.join("cache")).expect("must create empty dir");
}

struct RecordingRunner {
    programs: RefCell<Vec<String>>,
    success: bool,
}

impl RecordingRunner {
    fn new(success: bool) -> Self {
        Self {
            programs: RefCell::new(Vec::new()),
            success,
        }
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, command: &mut Command) -> anyhow::Result<CommandOutput> {
        self.programs
            .borrow_mut()
            .push(command.get_program().to_string_lossy().into_owned());
        Ok(CommandOutput {
            success: self.success,
            code: Some(if self.success { 0 } else { 1 }),
            stdout: String::new(),
            stderr: String::new(),
        })
    }
}

#[test]
fn snapshot_format_dispatches_on_extension() {
    assert_eq!(
        SnapshotFormat::from_path(Path::new("app-1.tar.gz")).expect("tar.gz must parse"),
        SnapshotFormat::TarGz
    );
    assert_eq!(
        SnapshotFormat::from_path(Path::new("app-1.tgz")).expect("tgz must parse"),
        SnapshotFormat::TarGz
    );
    assert_eq!(
        SnapshotFormat::from_path(Path::new("app-1.zip")).expect("zip must parse"),
        SnapshotFormat::Zip
    );

    let err = SnapshotFormat::from_path(Path::new("app-1.rar"))
        .expect_err("unknown extension must fail");
    assert!(err.to_string().contains("unsupported snapshot format"));
}

#[test]
fn purge_removes_everything_but_preserved() {
    let dir = tempfile::tempdir().expect("must create tempdir");
    sample_app_tree(dir.path());
    let preserve = PreserveSet::new(["uploads", "storage"]);

    purge_tree(dir.path(), &preserve).expect("purge must succeed");

    assert!(!dir.path().join("index.html").exists());
    assert!(!dir.path().join("lib").exists());
    assert!(!dir.path().join("cache").exists());
    assert_eq!(read_file(dir.path(), "uploads/avatars/1.png"), "user avatar");
    assert_eq!(read_file(dir.path(), "storage/report.pdf"), "user report");
}

#[test]
fn purge_recurses_into_sheltering_directory() {
    let dir = tempfile::tempdir().expect("must create tempdir");
    write_file(dir.path(), "config/app.toml", "keep me");
    write_file(dir.path(), "config/cache.tmp", "drop me");
    let preserve = PreserveSet::new(["config/app.toml"]);

    purge_tree(dir.path(), &preserve).expect("purge must succeed");

    assert_eq!(read_file(dir.path(), "config/app.toml"), "keep me");
    assert!(!dir.path().join("config/cache.tmp").exists());
}

#[test]
fn install_skips_preserved_paths_and_copies_the_rest() {
    let src = tempfile::tempdir().expect("must create tempdir");
    let dst = tempfile::tempdir().expect("must create tempdir");
    write_file(src.path(), "index.html", "v2 index");
    write_file(src.path(), "uploads/shipped.png", "release asset");
    write_file(dst.path(), "uploads/mine.png", "local upload");

    let preserve = PreserveSet::new(["uploads"]);
    install_tree(src.path(), dst.path(), &preserve).expect("install must succeed");

    assert_eq!(read_file(dst.path(), "index.html"), "v2 index");
    assert!(!dst.path().join("uploads/shipped.png").exists());
    assert_eq!(read_file(dst.path(), "uploads/mine.png"), "local upload");
}

#[test]
fn purge_then_install_leaves_preserved_bytes_identical() {
    let app = tempfile::tempdir().expect("must create tempdir");
    let release = tempfile::tempdir().expect("must create tempdir");
    sample_app_tree(app.path());
    write_file(release.path(), "index.html", "v2 index");
    write_file(release.path(), "lib/util.js", "v2 util");

    let preserve = PreserveSet::new(["uploads", "storage"]);
    purge_tree(app.path(), &preserve).expect("purge must succeed");
    install_tree(release.path(), app.path(), &preserve).expect("install must succeed");

    assert_eq!(read_file(app.path(), "index.html"), "v2 index");
    assert_eq!(read_file(app.path(), "lib/util.js"), "v2 util");
    assert_eq!(read_file(app.path(), "uploads/avatars/1.png"), "user avatar");
    assert_eq!(read_file(app.path(), "storage/report.pdf"), "user report");
}

#[test]
fn snapshot_excludes_preserved_paths_and_keeps_empty_dirs() {
    let app = tempfile::tempdir().expect("must create tempdir");
    let backup = tempfile::tempdir().expect("must create tempdir");
    sample_app_tree(app.path());

    let archive = backup.path().join("app-20240101_000000.tar.gz");
    let preserve = PreserveSet::new(["uploads", "storage"]);
    create_snapshot(app.path(), &preserve, &archive).expect("snapshot must succeed");

    let unpacked = backup.path().join("unpacked");
    extract_tar_gz(&archive, &unpacked).expect("extraction must succeed");

    assert_eq!(read_file(&unpacked, "index.html"), "v1 index");
    assert_eq!(read_file(&unpacked, "lib/util.js"), "v1 util");
    assert!(unpacked.join("cache").is_dir());
    assert!(!unpacked.join("uploads").exists());
    assert!(!unpacked.join("storage").exists());
}

#[test]
fn snapshot_restore_round_trip_reproduces_tree_minus_preserved() {
    let app = tempfile::tempdir().expect("must create tempdir");
    let backup = tempfile::tempdir().expect("must create tempdir");
    sample_app_tree(app.path());

    let archive = backup.path().join("app-20240101_000000.tar.gz");
    let preserve = PreserveSet::new(["uploads", "storage"]);
    create_snapshot(app.path(), &preserve, &archive).expect("snapshot must succeed");

    write_file(app.path(), "index.html", "broken upgrade");
    fs::remove_dir_all(app.path().join("lib")).expect("must remove lib");
    write_file(app.path(), "stray.txt", "leftover");
    write_file(app.path(), "uploads/avatars/1.png", "replaced avatar");

    let runner = RecordingRunner::new(true);
    restore_snapshot(&archive, app.path(), &preserve, &runner).expect("restore must succeed");

    assert_eq!(read_file(app.path(), "index.html"), "v1 index");
    assert_eq!(read_file(app.path(), "lib/util.js"), "v1 util");
    assert!(!app.path().join("stray.txt").exists());
    assert!(app.path().join("cache").is_dir());
    // restore never touches preserved paths, whatever they hold now
    assert_eq!(
        read_file(app.path(), "uploads/avatars/1.png"),
        "replaced avatar"
    );
    assert!(runner.programs.borrow().is_empty());
}

#[test]
fn restore_rejects_unknown_archive_extension() {
    let app = tempfile::tempdir().expect("must create tempdir");
    let runner = RecordingRunner::new(true);
    let err = restore_snapshot(
        Path::new("/backups/app-1.rar"),
        app.path(),
        &PreserveSet::empty(),
        &runner,
    )
    .expect_err("unknown format must fail");
    assert!(err.to_string().contains("unsupported snapshot format"));
}

#[test]
fn restore_fails_when_archive_is_missing() {
    let app = tempfile::tempdir().expect("must create tempdir");
    let backup = tempfile::tempdir().expect("must create tempdir");
    let runner = RecordingRunner::new(true);
    let err = restore_snapshot(
        &backup.path().join("app-19990101_000000.tar.gz"),
        app.path(),
        &PreserveSet::empty(),
        &runner,
    )
    .expect_err("missing archive must fail");
    assert!(err.to_string().contains("snapshot archive not found"));
}

#[test]
fn zip_restore_goes_through_the_external_extractor() {
    let app = tempfile::tempdir().expect("must create tempdir");
    let backup = tempfile::tempdir().expect("must create tempdir");
    let archive = backup.path().join("app-20240101_000000.zip");
    fs::write(&archive, b"PK\x03\x04").expect("must write stub archive");

    let runner = RecordingRunner::new(true);
    restore_snapshot(&archive, app.path(), &PreserveSet::empty(), &runner)
        .expect("restore must succeed");
    assert_eq!(runner.programs.borrow().as_slice(), ["unzip"]);
}

#[test]
fn zip_restore_falls_back_to_tar_when_unzip_fails() {
    let app = tempfile::tempdir().expect("must create tempdir");
    let backup = tempfile::tempdir().expect("must create tempdir");
    let archive = backup.path().join("app-20240101_000000.zip");
    fs::write(&archive, b"PK\x03\x04").expect("must write stub archive");

    let runner = RecordingRunner::new(false);
    let err = restore_snapshot(&archive, app.path(), &PreserveSet::empty(), &runner)
        .expect_err("both extractors failing must fail");
    assert_eq!(runner.programs.borrow().as_slice(), ["unzip", "tar"]);
    assert!(err.to_string().contains("tar fallback"));
}

#[cfg(unix)]
#[test]
fn install_propagates_permission_bits() {
    use std::os::unix::fs::PermissionsExt;

    let src = tempfile::tempdir().expect("must create tempdir");
    let dst = tempfile::tempdir().expect("must create tempdir");
    write_file(src.path(), "bin/run.sh", "#!/bin/sh\n");
    let script = src.path().join("bin/run.sh");
    let mut permissions = fs::metadata(&script).expect("must stat script").permissions();
    permissions.set_mode(0o755);
    fs::set_permissions(&script, permissions).expect("must chmod script");

    install_tree(src.path(), dst.path(), &PreserveSet::empty()).expect("install must succeed");

    let installed = fs::metadata(dst.path().join("bin/run.sh")).expect("must stat installed");
    assert_eq!(installed.permissions().mode() & 0o777, 0o755);
}

#[cfg(unix)]
#[test]
fn snapshot_round_trip_preserves_permission_bits() {
    use std::os::unix::fs::PermissionsExt;

    let app = tempfile::tempdir().expect("must create tempdir");
    let backup = tempfile::tempdir().expect("must create tempdir");
    write_file(app.path(), "bin/run.sh", "#!/bin/sh\n");
    let script = app.path().join("bin/run.sh");
    let mut permissions = fs::metadata(&script).expect("must stat script").permissions();
    permissions.set_mode(0o755);
    fs::set_permissions(&script, permissions).expect("must chmod script");

    let archive = backup.path().join("app-20240101_000000.tar.gz");
    create_snapshot(app.path(), &PreserveSet::empty(), &archive).expect("snapshot must succeed");

    let unpacked = backup.path().join("unpacked");
    extract_tar_gz(&archive, &unpacked).expect("extraction must succeed");
    let restored = fs::metadata(unpacked.join("bin/run.sh")).expect("must stat restored");
    assert_eq!(restored.permissions().mode() & 0o777, 0o755);
}
