mod archive;
mod tree;

pub use archive::{create_snapshot, restore_snapshot, SnapshotFormat};
pub use tree::{install_tree, purge_tree};

#[cfg(test)]
mod tests;
