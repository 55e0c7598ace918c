mod backup;
mod config;
mod inline;

pub use backup::{
    backup_database, detect_strategy, restore_database, DUMP_COMMAND, RESTORE_COMMAND,
};
pub use config::{DbConfig, DEFAULT_DB_PORT};
pub use inline::{inline_backup, inline_restore};

#[cfg(test)]
mod tests;
