use std::path::{Path, PathBuf};

const HOME_DIR_NAME: &str = ".craftctl";
const HOME_ENV: &str = "CRAFTCTL_HOME";

/// Name of the per-installation config document.
pub const CONFIG_FILE: &str = ".craftctl.json";
/// Directory (inside an installation root) holding inactive profiles.
pub const PROFILES_DIR: &str = ".craftctl.profiles";
/// Directory (inside an installation root) holding backup archives.
pub const BACKUPS_DIR: &str = ".craftctl.backups";
/// Session state of a server started with `start --detached`.
pub const DETACHED_DIR: &str = ".craftctl.detached";
/// Entries of an installation root that belong to craftctl itself.
pub const TOOL_DIRS: [&str; 3] = [PROFILES_DIR, BACKUPS_DIR, DETACHED_DIR];

/// Locations of the tool's global data, shared by every installation.
#[derive(Debug, Clone)]
pub struct DataPaths {
    home: PathBuf,
}

impl DataPaths {
    pub fn new(home: PathBuf) -> Self {
        Self { home }
    }

    /// `$CRAFTCTL_HOME`, else `~/.craftctl`, else `./.craftctl`.
    pub fn resolve() -> Self {
        if let Some(home) = std::env::var_os(HOME_ENV) {
            return Self::new(PathBuf::from(home));
        }

        let home = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(HOME_DIR_NAME);
        Self::new(home)
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.home.join("cache")
    }

    pub fn java_dir(&self) -> PathBuf {
        self.home.join("java")
    }
}

/// Path of the config document inside an installation root.
pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

/// Root directory of a stored (inactive) profile.
pub fn profile_root(root: &Path, name: &str) -> PathBuf {
    root.join(PROFILES_DIR).join(name)
}

pub fn backups_dir(root: &Path) -> PathBuf {
    root.join(BACKUPS_DIR)
}

pub fn detached_dir(root: &Path) -> PathBuf {
    root.join(DETACHED_DIR)
}
