// ─── Modpack Manifest ───
// `modrinth.index.json` inside an `.mrpack` archive.

use std::path::{Component, Path, PathBuf};

use serde::Deserialize;

use crate::core::api::mcjars::ServerType;
use crate::core::error::{CraftError, CraftResult};
use crate::core::install::archive;

pub const INDEX_ENTRY: &str = "modrinth.index.json";
pub const OVERRIDES_DIR: &str = "overrides";
pub const SERVER_OVERRIDES_DIR: &str = "server-overrides";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvSupport {
    Required,
    Optional,
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileEnv {
    pub server: EnvSupport,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ManifestHashes {
    pub sha1: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestFile {
    pub path: String,
    pub downloads: Vec<String>,
    pub env: Option<FileEnv>,
    #[serde(default)]
    pub file_size: u64,
    #[serde(default)]
    pub hashes: ManifestHashes,
}

impl ManifestFile {
    /// Files without an `env` block are installed everywhere.
    pub fn wanted_on_server(&self) -> bool {
        !matches!(
            self.env,
            Some(FileEnv {
                server: EnvSupport::Unsupported
            })
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ManifestDependencies {
    pub minecraft: String,
    #[serde(rename = "fabric-loader")]
    pub fabric_loader: Option<String>,
    #[serde(rename = "quilt-loader")]
    pub quilt_loader: Option<String>,
    pub forge: Option<String>,
    pub neoforge: Option<String>,
}

impl ManifestDependencies {
    /// Server type the pack needs and the loader version it declares.
    pub fn loader(&self) -> (ServerType, Option<&str>) {
        if let Some(v) = &self.fabric_loader {
            (ServerType::Fabric, Some(v.as_str()))
        } else if let Some(v) = &self.quilt_loader {
            (ServerType::Quilt, Some(v.as_str()))
        } else if let Some(v) = &self.forge {
            (ServerType::Forge, Some(v.as_str()))
        } else if let Some(v) = &self.neoforge {
            (ServerType::NeoForge, Some(v.as_str()))
        } else {
            (ServerType::Vanilla, None)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModpackManifest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version_id: String,
    pub files: Vec<ManifestFile>,
    pub dependencies: ManifestDependencies,
}

impl ModpackManifest {
    /// Decode and check an index document. `source` names it in errors.
    pub fn parse(bytes: &[u8], source: &str) -> CraftResult<Self> {
        let manifest: Self =
            serde_json::from_slice(bytes).map_err(|e| CraftError::malformed(source, e))?;

        for file in &manifest.files {
            if !is_contained(&file.path) {
                return Err(CraftError::malformed(
                    source,
                    format!("file path '{}' escapes the installation root", file.path),
                ));
            }
            if file.downloads.is_empty() {
                return Err(CraftError::malformed(
                    source,
                    format!("file '{}' has no download", file.path),
                ));
            }
        }

        Ok(manifest)
    }

    /// Read the index out of an `.mrpack` archive.
    pub async fn from_archive(archive_path: &Path) -> CraftResult<Self> {
        let path = archive_path.to_path_buf();
        let bytes = archive::blocking(move || archive::read_entry(&path, INDEX_ENTRY)).await?;
        Self::parse(&bytes, &archive_path.display().to_string())
    }

    pub fn server_files(&self) -> impl Iterator<Item = &ManifestFile> {
        self.files.iter().filter(|f| f.wanted_on_server())
    }
}

/// Relative paths of every override file in the archive, both override layers.
pub async fn override_paths(archive_path: &Path) -> CraftResult<Vec<PathBuf>> {
    let path = archive_path.to_path_buf();
    archive::blocking(move || {
        let mut paths = archive::list_files(&path, OVERRIDES_DIR)?;
        paths.extend(archive::list_files(&path, SERVER_OVERRIDES_DIR)?);
        Ok(paths)
    })
    .await
}

/// Lay `overrides/` then `server-overrides/` over `root`.
pub async fn extract_overrides(archive_path: &Path, root: &Path) -> CraftResult<usize> {
    let path = archive_path.to_path_buf();
    let root = root.to_path_buf();
    archive::blocking(move || {
        let common = archive::extract_zip(&path, OVERRIDES_DIR, &root)?;
        let server = archive::extract_zip(&path, SERVER_OVERRIDES_DIR, &root)?;
        Ok(common + server)
    })
    .await
}

fn is_contained(relative: &str) -> bool {
    let path = Path::new(relative);
    !relative.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manifest_json(files: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "formatVersion": 1,
            "game": "minecraft",
            "versionId": "5.0.0",
            "name": "Test Pack",
            "files": files,
            "dependencies": {"minecraft": "1.21.1", "fabric-loader": "0.16.10"}
        }))
        .unwrap()
    }

    #[test]
    fn parses_and_filters_server_files() {
        let bytes = manifest_json(json!([
            {"path": "mods/a.jar", "downloads": ["https://cdn.test/a.jar"], "fileSize": 3,
             "hashes": {"sha1": "aa"}, "env": {"client": "required", "server": "required"}},
            {"path": "mods/shader.jar", "downloads": ["https://cdn.test/s.jar"], "fileSize": 3,
             "env": {"client": "required", "server": "unsupported"}},
            {"path": "mods/b.jar", "downloads": ["https://cdn.test/b.jar"]}
        ]));

        let manifest = ModpackManifest::parse(&bytes, "test").unwrap();
        let paths: Vec<_> = manifest.server_files().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["mods/a.jar", "mods/b.jar"]);
        assert_eq!(
            manifest.dependencies.loader(),
            (ServerType::Fabric, Some("0.16.10"))
        );
    }

    #[test]
    fn escaping_paths_are_malformed() {
        for bad in ["../outside.jar", "/etc/passwd"] {
            let bytes = manifest_json(json!([
                {"path": bad, "downloads": ["https://cdn.test/a.jar"]}
            ]));
            let err = ModpackManifest::parse(&bytes, "test").unwrap_err();
            assert!(matches!(err, CraftError::MalformedResponse { .. }));
        }
    }

    #[test]
    fn no_loader_means_vanilla() {
        let deps: ManifestDependencies =
            serde_json::from_value(json!({"minecraft": "1.21.1"})).unwrap();
        assert_eq!(deps.loader(), (ServerType::Vanilla, None));
    }
}
