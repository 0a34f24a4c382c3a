use std::path::PathBuf;

use chrono::{DateTime, Local};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::archive;
use super::format::BackupFormat;
use crate::core::error::{CraftError, CraftResult};
use crate::core::install::archive::blocking;
use crate::core::paths;

const PARTIAL_SUFFIX: &str = ".partial";

/// One archive in `<root>/.craftctl.backups`.
#[derive(Debug, Clone)]
pub struct Backup {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub format: BackupFormat,
    /// When the archive was last written.
    pub created: DateTime<Local>,
}

/// Named snapshots of an installation root.
#[derive(Debug, Clone)]
pub struct BackupStore {
    root: PathBuf,
}

impl BackupStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn dir(&self) -> PathBuf {
        paths::backups_dir(&self.root)
    }

    /// Every backup, newest first.
    pub async fn list(&self) -> CraftResult<Vec<Backup>> {
        let dir = self.dir();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CraftError::io(&dir, e)),
        };

        let mut backups = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CraftError::io(&dir, e))?
        {
            let path = entry.path();
            let Some((name, format)) = entry
                .file_name()
                .to_str()
                .and_then(BackupFormat::split_file_name)
                .map(|(name, format)| (name.to_string(), format))
            else {
                continue;
            };

            let metadata = entry
                .metadata()
                .await
                .map_err(|e| CraftError::io(&path, e))?;
            if !metadata.is_file() {
                continue;
            }
            let created = metadata
                .modified()
                .map(DateTime::<Local>::from)
                .unwrap_or_else(|_| Local::now());

            backups.push(Backup {
                name,
                path,
                size: metadata.len(),
                format,
                created,
            });
        }

        backups.sort_by(|a, b| b.created.cmp(&a.created).then_with(|| a.name.cmp(&b.name)));
        Ok(backups)
    }

    pub async fn find(&self, name: &str) -> CraftResult<Backup> {
        self.list()
            .await?
            .into_iter()
            .find(|b| b.name == name)
            .ok_or_else(|| CraftError::BackupNotFound(name.to_string()))
    }

    /// Archive the installation as `name`. Names are unique across formats.
    #[instrument(skip(self))]
    pub async fn create(&self, name: &str, format: BackupFormat) -> CraftResult<Backup> {
        validate_name(name)?;
        if self.list().await?.iter().any(|b| b.name == name) {
            return Err(CraftError::BackupExists(name.to_string()));
        }

        let dir = self.dir();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| CraftError::io(&dir, e))?;

        let dest = dir.join(format.file_name(name));
        let partial = dir.join(format!("{}{PARTIAL_SUFFIX}", format.file_name(name)));

        let root = self.root.clone();
        let target = partial.clone();
        let written = blocking(move || archive::write(&root, &target, format)).await;
        let files = match written {
            Ok(files) => files,
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                    warn!("Could not remove {:?}: {}", partial, cleanup);
                }
                return Err(e);
            }
        };
        tokio::fs::rename(&partial, &dest)
            .await
            .map_err(|e| CraftError::io(&dest, e))?;

        info!("Backed up {} files into {:?}", files, dest);
        self.find(name).await
    }

    /// Replace the installation's contents with backup `name`.
    #[instrument(skip(self))]
    pub async fn restore(&self, name: &str) -> CraftResult<Backup> {
        let backup = self.find(name).await?;
        let staging = self.dir().join(format!(".restore-{}", Uuid::new_v4()));

        let archive_path = backup.path.clone();
        let format = backup.format;
        let root = self.root.clone();
        blocking(move || archive::restore(&archive_path, format, &staging, &root)).await?;

        info!("Restored backup {} into {:?}", name, self.root);
        Ok(backup)
    }

    pub async fn delete(&self, name: &str) -> CraftResult<Backup> {
        let backup = self.find(name).await?;
        tokio::fs::remove_file(&backup.path)
            .await
            .map_err(|e| CraftError::io(&backup.path, e))?;
        Ok(backup)
    }
}

/// Timestamp name used when the user gives none.
pub fn default_name() -> String {
    Local::now().format("%Y-%m-%d_%H-%M-%S").to_string()
}

fn validate_name(name: &str) -> CraftResult<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(CraftError::InvalidArgument(format!(
            "invalid backup name '{name}'"
        )))
    }
}
