use std::path::Path;

use serde_json::Value;
use tracing::{debug, info};

use super::migrate::{self, LATEST_CONFIG_VERSION};
use super::model::Config;
use crate::core::error::{CraftError, CraftResult};
use crate::core::paths;

impl Config {
    /// Load the config of the installation rooted at `root`.
    ///
    /// Older documents are migrated one version at a time; every successful
    /// step is written back before the next one runs.
    pub async fn load(root: &Path) -> CraftResult<Self> {
        let path = paths::config_path(root);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CraftError::NotInitialized { path });
            }
            Err(e) => return Err(CraftError::io(&path, e)),
        };

        let corrupt = |reason: String| CraftError::CorruptConfig {
            path: path.clone(),
            reason,
        };

        let mut doc: Value = serde_json::from_str(&raw).map_err(|e| corrupt(e.to_string()))?;

        while let Some(next) = migrate::migrate_step(doc.clone()).map_err(corrupt)? {
            let version = migrate::document_version(&next).map_err(corrupt)?;
            write_document(&path, &next).await?;
            info!("Migrated {:?} to configVersion {}", path, version);
            doc = next;
        }

        let mut config: Config =
            serde_json::from_value(doc).map_err(|e| corrupt(e.to_string()))?;
        config.validate().map_err(corrupt)?;
        config.path = path;

        debug!("Loaded config {:?}", config.path);
        Ok(config)
    }

    /// Load the active installation, or a stored profile when `profile` is set.
    pub async fn load_profile(root: &Path, profile: Option<&str>) -> CraftResult<Self> {
        match profile {
            None => Self::load(root).await,
            Some(name) => {
                let profile_root = paths::profile_root(root, name);
                if !paths::config_path(&profile_root).exists() {
                    return Err(CraftError::ProfileNotFound(name.to_string()));
                }
                Self::load(&profile_root).await
            }
        }
    }

    /// Create and persist a fresh config. Fails if one already exists.
    pub async fn create(root: &Path, profile_name: &str) -> CraftResult<Self> {
        let path = paths::config_path(root);
        if path.exists() {
            return Err(CraftError::InvalidArgument(format!(
                "{:?} is already initialized",
                root
            )));
        }

        tokio::fs::create_dir_all(root)
            .await
            .map_err(|e| CraftError::io(root, e))?;

        let config = Self::new(root, profile_name);
        config.save().await?;
        info!("Initialized config at {:?}", config.path);
        Ok(config)
    }

    /// Persist the config verbatim, replacing the whole file.
    pub async fn save(&self) -> CraftResult<()> {
        debug_assert_eq!(self.config_version, LATEST_CONFIG_VERSION);
        let value = serde_json::to_value(self)?;
        write_document(&self.path, &value).await
    }
}

async fn write_document(path: &Path, doc: &Value) -> CraftResult<()> {
    let json = serde_json::to_string_pretty(doc)?;
    tokio::fs::write(path, json)
        .await
        .map_err(|e| CraftError::io(path, e))
}
