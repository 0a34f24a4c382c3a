use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Archive flavour of a backup, encoded in its file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackupFormat {
    #[serde(rename = "zip")]
    Zip,
    #[serde(rename = "tar")]
    Tar,
    #[serde(rename = "tar.gz")]
    TarGz,
    #[serde(rename = "tar.xz")]
    TarXz,
}

impl BackupFormat {
    /// Longest extensions first so `a.tar.gz` is never read as `a.tar` + `.gz`.
    const BY_EXTENSION: [BackupFormat; 4] = [
        BackupFormat::TarGz,
        BackupFormat::TarXz,
        BackupFormat::Tar,
        BackupFormat::Zip,
    ];

    pub fn extension(self) -> &'static str {
        match self {
            BackupFormat::Zip => "zip",
            BackupFormat::Tar => "tar",
            BackupFormat::TarGz => "tar.gz",
            BackupFormat::TarXz => "tar.xz",
        }
    }

    pub fn file_name(self, name: &str) -> String {
        format!("{name}.{}", self.extension())
    }

    /// Split `world.tar.gz` into `("world", TarGz)`.
    pub fn split_file_name(file_name: &str) -> Option<(&str, BackupFormat)> {
        Self::BY_EXTENSION.into_iter().find_map(|format| {
            file_name
                .strip_suffix(format.extension())
                .and_then(|stem| stem.strip_suffix('.'))
                .filter(|stem| !stem.is_empty())
                .map(|stem| (stem, format))
        })
    }
}

impl fmt::Display for BackupFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for BackupFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "zip" => Ok(BackupFormat::Zip),
            "tar" => Ok(BackupFormat::Tar),
            "tar.gz" | "tgz" => Ok(BackupFormat::TarGz),
            "tar.xz" | "txz" => Ok(BackupFormat::TarXz),
            other => Err(format!(
                "unknown backup format '{other}' (expected zip, tar, tar.gz or tar.xz)"
            )),
        }
    }
}
