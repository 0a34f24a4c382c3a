use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::migrate::LATEST_CONFIG_VERSION;

pub const README_TEXT: &str = "This file is used to store the configuration for the craftctl tool. Do not modify this file unless you know what you are doing.";

/// Canonical jar name after any install.
pub const DEFAULT_JAR_FILE: &str = "server.jar";
pub const DEFAULT_RAM_MB: u32 = 2048;
pub const DEFAULT_JAVA_VERSION: u32 = 21;

/// One server installation, persisted as `.craftctl.json` in its root.
///
/// The root directory is not serialized; it is the directory the document
/// was loaded from, and every relative path in the document resolves
/// against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(skip)]
    pub(super) path: PathBuf,

    #[serde(rename = "__README", default = "readme_text")]
    pub readme: String,
    pub config_version: u32,
    pub jar_file: String,
    pub java_version: u32,
    pub profile_name: String,
    pub modpack_slug: Option<String>,
    pub modpack_version: Option<String>,
    pub extra_flags: Vec<String>,
    pub extra_args: Vec<String>,
    #[serde(rename = "ramMB")]
    pub ram_mb: u32,
}

fn readme_text() -> String {
    README_TEXT.to_string()
}

impl Config {
    /// Fresh latest-version config for an installation rooted at `root`.
    pub fn new(root: &Path, profile_name: &str) -> Self {
        Self {
            path: crate::core::paths::config_path(root),
            readme: readme_text(),
            config_version: LATEST_CONFIG_VERSION,
            jar_file: DEFAULT_JAR_FILE.to_string(),
            java_version: DEFAULT_JAVA_VERSION,
            profile_name: profile_name.to_string(),
            modpack_slug: None,
            modpack_version: None,
            extra_flags: Vec::new(),
            extra_args: Vec::new(),
            ram_mb: DEFAULT_RAM_MB,
        }
    }

    /// Path of the backing document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Installation root (the directory holding the document).
    pub fn root(&self) -> PathBuf {
        self.path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Absolute location of the authoritative jar.
    pub fn jar_path(&self) -> PathBuf {
        self.root().join(&self.jar_file)
    }

    /// Directory the jar lives in; installation scripts resolve against it.
    pub fn jar_dir(&self) -> PathBuf {
        self.jar_path()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root())
    }

    pub fn mods_dir(&self) -> PathBuf {
        self.jar_dir().join("mods")
    }

    pub fn is_modpack(&self) -> bool {
        self.modpack_slug.is_some() && self.modpack_version.is_some()
    }

    /// Link the installation to a modpack version.
    pub fn set_modpack(&mut self, slug: &str, version_id: &str) {
        self.modpack_slug = Some(slug.to_string());
        self.modpack_version = Some(version_id.to_string());
    }

    /// Semantic checks that serde cannot express.
    pub fn validate(&self) -> Result<(), String> {
        if self.config_version != LATEST_CONFIG_VERSION {
            return Err(format!(
                "configVersion {} is not the latest ({})",
                self.config_version, LATEST_CONFIG_VERSION
            ));
        }
        if self.jar_file.trim().is_empty() {
            return Err("jarFile must not be empty".into());
        }
        if self.ram_mb == 0 {
            return Err("ramMB must be greater than zero".into());
        }
        if self.java_version == 0 {
            return Err("javaVersion must be greater than zero".into());
        }
        if self.modpack_slug.is_some() != self.modpack_version.is_some() {
            return Err("modpackSlug and modpackVersion must be set together".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_config_is_valid() {
        let config = Config::new(Path::new("/srv/mc"), "default");
        assert!(config.validate().is_ok());
        assert_eq!(config.jar_path(), PathBuf::from("/srv/mc/server.jar"));
        assert_eq!(config.root(), PathBuf::from("/srv/mc"));
    }

    #[test]
    fn serializes_with_document_field_names() {
        let config = Config::new(Path::new("/srv/mc"), "default");
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["ramMB"], 2048);
        assert_eq!(value["configVersion"], LATEST_CONFIG_VERSION);
        assert_eq!(value["jarFile"], "server.jar");
        assert!(value["modpackSlug"].is_null());
    }

    #[test]
    fn half_linked_modpack_is_rejected() {
        let mut config = Config::new(Path::new("."), "default");
        config.modpack_slug = Some("fabulously-optimized".into());
        assert!(config.validate().is_err());

        config.set_modpack("fabulously-optimized", "abc123");
        assert!(config.validate().is_ok());
        assert!(config.is_modpack());
    }
}
