mod digest;
mod manifest;
mod preserve;
mod runner;
mod store;

pub use digest::sha256_hex_file;
pub use manifest::{
    new_manifest_id, BackupStrategy, Manifest, ManifestStatus, PackageKind, PackageRecord,
    MANIFEST_FILE_PREFIX, MANIFEST_FORMAT_VERSION,
};
pub use preserve::PreserveSet;
pub use runner::{command_available, run_checked, CommandOutput, CommandRunner, SystemRunner};
pub use store::{
    latest_successful_manifest, list_manifests, read_manifest, write_manifest, BackupLayout,
};
