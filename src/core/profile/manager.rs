use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::core::config::Config;
use crate::core::error::{CraftError, CraftResult};
use crate::core::install::runner::remove_path;
use crate::core::paths::{self, PROFILES_DIR, TOOL_DIRS};

/// Named installations stored beside the active one.
///
/// The active profile's files live directly in `root`; every other profile
/// lives in `<root>/.craftctl.profiles/<name>`.
pub struct ProfileManager {
    root: PathBuf,
}

impl ProfileManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn profiles_dir(&self) -> PathBuf {
        self.root.join(PROFILES_DIR)
    }

    fn stored(&self, name: &str) -> PathBuf {
        paths::profile_root(&self.root, name)
    }

    /// Name of the profile currently occupying the root.
    pub async fn active(&self) -> CraftResult<String> {
        Ok(Config::load(&self.root).await?.profile_name)
    }

    /// Stored (inactive) profiles, sorted.
    pub async fn list(&self) -> CraftResult<Vec<String>> {
        let dir = self.profiles_dir();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CraftError::io(&dir, e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CraftError::io(&dir, e))?
        {
            let path = entry.path();
            if path.is_dir() && paths::config_path(&path).exists() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Create an empty, initialized profile next to the active one.
    pub async fn create(&self, name: &str) -> CraftResult<Config> {
        validate_name(name)?;
        if self.active().await? == name {
            return Err(CraftError::ProfileInUse(name.to_string()));
        }
        let target = self.stored(name);
        if paths::config_path(&target).exists() {
            return Err(CraftError::ProfileExists(name.to_string()));
        }

        let config = Config::create(&target, name).await?;
        info!("Created profile '{}'", name);
        Ok(config)
    }

    pub async fn delete(&self, name: &str) -> CraftResult<()> {
        validate_name(name)?;
        let target = self.stored(name);
        if !target.is_dir() {
            return Err(CraftError::ProfileNotFound(name.to_string()));
        }
        if self.active().await? == name {
            return Err(CraftError::ProfileInUse(name.to_string()));
        }

        remove_path(&target).await?;
        info!("Deleted profile '{}'", name);
        Ok(())
    }

    /// Swap the active installation with the stored profile `name`.
    pub async fn switch(&self, name: &str) -> CraftResult<()> {
        validate_name(name)?;
        let current = self.active().await?;
        if current == name {
            return Err(CraftError::ProfileInUse(name.to_string()));
        }

        let incoming = self.stored(name);
        if !paths::config_path(&incoming).exists() {
            return Err(CraftError::ProfileNotFound(name.to_string()));
        }
        let outgoing = self.stored(&current);
        if paths::config_path(&outgoing).exists() {
            return Err(CraftError::ProfileExists(current));
        }

        tokio::fs::create_dir_all(&outgoing)
            .await
            .map_err(|e| CraftError::io(&outgoing, e))?;

        move_children(&self.root, &outgoing, &TOOL_DIRS).await?;
        move_children(&incoming, &self.root, &[]).await?;
        remove_path(&incoming).await?;

        info!("Switched from profile '{}' to '{}'", current, name);
        Ok(())
    }
}

fn validate_name(name: &str) -> CraftResult<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && name != "."
        && name != "..";
    if valid {
        Ok(())
    } else {
        Err(CraftError::InvalidArgument(format!(
            "invalid profile name '{name}'"
        )))
    }
}

/// Rename every entry of `from` into `to`, skipping `except`.
async fn move_children(from: &Path, to: &Path, except: &[&str]) -> CraftResult<()> {
    let mut entries = tokio::fs::read_dir(from)
        .await
        .map_err(|e| CraftError::io(from, e))?;

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| CraftError::io(from, e))?
    {
        let name = entry.file_name();
        if except.iter().any(|skip| name == *skip) {
            continue;
        }
        let dest = to.join(&name);
        tokio::fs::rename(entry.path(), &dest)
            .await
            .map_err(|e| CraftError::io(&dest, e))?;
        debug!("Moved {:?} -> {:?}", entry.path(), dest);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn create_list_switch_delete() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        Config::create(root, "default").await.unwrap();
        std::fs::write(root.join("server.properties"), "motd=default").unwrap();

        let manager = ProfileManager::new(root);
        manager.create("creative").await.unwrap();
        assert_eq!(manager.list().await.unwrap(), vec!["creative".to_string()]);

        manager.switch("creative").await.unwrap();
        assert_eq!(manager.active().await.unwrap(), "creative");
        assert!(!root.join("server.properties").exists());
        assert!(root
            .join(PROFILES_DIR)
            .join("default/server.properties")
            .exists());
        assert_eq!(manager.list().await.unwrap(), vec!["default".to_string()]);

        assert!(matches!(
            manager.delete("creative").await.unwrap_err(),
            CraftError::ProfileNotFound(_)
        ));
        manager.delete("default").await.unwrap();
        assert!(manager.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn active_profile_cannot_be_created_or_used_again() {
        let dir = tempdir().unwrap();
        Config::create(dir.path(), "default").await.unwrap();
        let manager = ProfileManager::new(dir.path());

        assert!(matches!(
            manager.create("default").await.unwrap_err(),
            CraftError::ProfileInUse(_)
        ));
        assert!(matches!(
            manager.switch("default").await.unwrap_err(),
            CraftError::ProfileInUse(_)
        ));
        assert!(matches!(
            manager.switch("missing").await.unwrap_err(),
            CraftError::ProfileNotFound(_)
        ));
        assert!(manager.create("../escape").await.is_err());
    }
}
