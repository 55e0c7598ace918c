use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use uplift_core::{BackupLayout, PreserveSet};
use uplift_db::{DbConfig, DEFAULT_DB_PORT};

pub const CONFIG_FILE_NAME: &str = "uplift.toml";
const DEFAULT_BACKUP_DIR: &str = "backups";
const DEFAULT_PRESERVE_DIRS: [&str; 2] = ["uploads", "storage"];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub settings: SettingsSection,
    #[serde(default)]
    pub database: DatabaseSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsSection {
    pub backup_dir: Option<String>,
    #[serde(default)]
    pub preserve: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub name: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

/// Everything the engine consumes from its environment, resolved once at the
/// CLI boundary: flags override `uplift.toml` in the application root, and
/// `DB_*`/`GITHUB_TOKEN` environment variables override the file.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub app_root: PathBuf,
    pub backup_dir: PathBuf,
    pub preserve: PreserveSet,
    pub github_token: Option<String>,
    database: DatabaseSection,
}

impl EngineConfig {
    pub fn resolve(
        app_root: PathBuf,
        backup_dir_flag: Option<PathBuf>,
        preserve_csv: Option<&str>,
    ) -> Result<Self> {
        let file = load_config_file(&app_root.join(CONFIG_FILE_NAME))?;

        let backup_dir = backup_dir_flag
            .or_else(|| file.settings.backup_dir.as_ref().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BACKUP_DIR));
        let backup_dir = if backup_dir.is_absolute() {
            backup_dir
        } else {
            app_root.join(backup_dir)
        };

        // The engine's own config artifact, the backup directory, and the
        // conventional upload/storage dirs are preserved regardless of
        // caller-supplied additions.
        let mut preserve_entries = vec![CONFIG_FILE_NAME.to_string()];
        if let Ok(rel) = backup_dir.strip_prefix(&app_root) {
            preserve_entries.push(rel.to_string_lossy().into_owned());
        }
        preserve_entries.extend(DEFAULT_PRESERVE_DIRS.iter().map(|dir| dir.to_string()));
        preserve_entries.extend(file.settings.preserve.iter().cloned());
        if let Some(csv) = preserve_csv {
            preserve_entries.extend(csv.split(',').map(|entry| entry.trim().to_string()));
        }
        let preserve = PreserveSet::new(preserve_entries);

        let mut database = file.database;
        apply_database_overrides(&mut database, |name| env::var(name).ok())?;
        let github_token = env::var("GITHUB_TOKEN")
            .ok()
            .filter(|token| !token.trim().is_empty());

        Ok(Self {
            app_root,
            backup_dir,
            preserve,
            github_token,
            database,
        })
    }

    pub fn layout(&self) -> BackupLayout {
        BackupLayout::new(&self.backup_dir)
    }

    /// Validated lazily: only upgrade and `downgrade --restore-db` need the
    /// database at all.
    pub fn db_config(&self) -> Result<DbConfig> {
        let Some(name) = non_empty(self.database.name.as_deref()) else {
            bail!("database name is not configured; set DB_NAME or [database].name in {CONFIG_FILE_NAME}");
        };
        let Some(user) = non_empty(self.database.user.as_deref()) else {
            bail!("database user is not configured; set DB_USER or [database].user in {CONFIG_FILE_NAME}");
        };

        Ok(DbConfig::new(
            non_empty(self.database.host.as_deref()).unwrap_or_else(|| "localhost".to_string()),
            self.database.port.unwrap_or(DEFAULT_DB_PORT),
            name,
            user,
            self.database.password.clone().unwrap_or_default(),
        ))
    }

    #[cfg(test)]
    pub(crate) fn with_database_section(mut self, database: DatabaseSection) -> Self {
        self.database = database;
        self
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(ConfigFile::default()),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read config file: {}", path.display()));
        }
    };
    toml::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

pub(crate) fn apply_database_overrides(
    database: &mut DatabaseSection,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if let Some(host) = lookup("DB_HOST").filter(|value| !value.is_empty()) {
        database.host = Some(host);
    }
    if let Some(name) = lookup("DB_NAME").filter(|value| !value.is_empty()) {
        database.name = Some(name);
    }
    if let Some(user) = lookup("DB_USER").filter(|value| !value.is_empty()) {
        database.user = Some(user);
    }
    if let Some(password) = lookup("DB_PASSWORD") {
        database.password = Some(password);
    }
    if let Some(port) = lookup("DB_PORT").filter(|value| !value.is_empty()) {
        database.port = Some(
            port.parse()
                .context("DB_PORT must be a port number")?,
        );
    }
    Ok(())
}
