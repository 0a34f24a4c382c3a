// ─── Jar Identity ───
// jar (or nested loader jar) → SHA-512 → build index lookup → identity,
// memoized in the cache as `jar_<hash>`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use tokio::io::AsyncReadExt;
use tracing::{debug, info, instrument, warn};

use crate::core::api::mcjars::{derive_jar_version, BuildIndex, BuildMatch, ServerType};
use crate::core::cache::Cache;
use crate::core::error::{CraftError, CraftResult};

/// How long a resolved identity is trusted.
pub const IDENTITY_TTL: Duration = Duration::from_secs(6 * 60 * 60);

const UNKNOWN: &str = "unknown";
const HASH_CHUNK: usize = 64 * 1024;

/// Loader library trees whose generated jar identifies the installation.
const NESTED_LOADER_DIRS: [&str; 2] = [
    "libraries/net/minecraftforge/forge",
    "libraries/net/neoforged/neoforge",
];
const NESTED_JAR_SUFFIXES: [&str; 2] = ["-server.jar", "-universal.jar"];

/// What the installed jar is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JarIdentity {
    #[serde(rename = "type")]
    pub server_type: ServerType,
    pub minecraft_version: String,
    pub jar_version: String,
    #[serde(default)]
    pub build_id: Option<u64>,
    #[serde(default)]
    pub latest_build_id: Option<u64>,
}

impl JarIdentity {
    pub fn unknown() -> Self {
        Self {
            server_type: ServerType::Unknown,
            minecraft_version: UNKNOWN.to_string(),
            jar_version: UNKNOWN.to_string(),
            build_id: None,
            latest_build_id: None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.server_type == ServerType::Unknown
    }

    pub fn from_match(found: &BuildMatch) -> Self {
        let build = &found.build;
        Self {
            server_type: build.server_type,
            minecraft_version: build.minecraft_label(),
            jar_version: derive_jar_version(build.build_number, build.project_version_id.as_deref()),
            build_id: Some(build.id),
            latest_build_id: Some(found.latest.id),
        }
    }

    /// `Some(true)` when the installed build is the newest of its line.
    pub fn is_latest_build(&self) -> Option<bool> {
        match (self.build_id, self.latest_build_id) {
            (Some(build), Some(latest)) => Some(build == latest),
            _ => None,
        }
    }
}

/// File whose hash identifies the installation behind `jar_path`.
///
/// A Forge/NeoForge generated server or universal jar wins over the
/// top-level jar. `None` when there is nothing to hash.
pub fn locate_hash_target(jar_path: &Path) -> Option<PathBuf> {
    let base = jar_path.parent().unwrap_or_else(|| Path::new("."));

    for loader_dir in NESTED_LOADER_DIRS {
        if let Some(nested) = find_nested_jar(&base.join(loader_dir)) {
            return Some(nested);
        }
    }

    if jar_path.is_file() {
        Some(jar_path.to_path_buf())
    } else {
        None
    }
}

/// `<loader_dir>/<version>/<name>-server.jar` or `-universal.jar`.
fn find_nested_jar(loader_dir: &Path) -> Option<PathBuf> {
    let mut versions: Vec<PathBuf> = std::fs::read_dir(loader_dir)
        .ok()?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    versions.sort();

    for version_dir in versions.iter().rev() {
        let Ok(entries) = std::fs::read_dir(version_dir) else {
            continue;
        };
        let mut candidates: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .map(|name| NESTED_JAR_SUFFIXES.iter().any(|s| name.ends_with(s)))
                    .unwrap_or(false)
            })
            .collect();
        candidates.sort();
        if let Some(found) = candidates.into_iter().next() {
            return Some(found);
        }
    }
    None
}

/// Hex SHA-512 of a file, streamed in chunks.
pub async fn sha512_file(path: &Path) -> CraftResult<String> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| CraftError::io(path, e))?;
    let mut hasher = Sha512::new();
    let mut buf = vec![0u8; HASH_CHUNK];

    loop {
        let read = file.read(&mut buf).await.map_err(|e| CraftError::io(path, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

pub fn cache_key(hash: &str) -> String {
    format!("jar_{hash}")
}

/// Identify the jar at `jar_path`.
///
/// Never fails: anything that goes wrong degrades to [`JarIdentity::unknown`],
/// and only successful lookups are cached.
#[instrument(skip(cache, index))]
pub async fn resolve(jar_path: &Path, cache: &Cache, index: &dyn BuildIndex) -> JarIdentity {
    let Some(target) = locate_hash_target(jar_path) else {
        debug!("No jar to identify at {:?}", jar_path);
        return JarIdentity::unknown();
    };

    let hash = match sha512_file(&target).await {
        Ok(hash) => hash,
        Err(e) => {
            warn!("Could not hash {:?}: {}", target, e);
            return JarIdentity::unknown();
        }
    };
    let key = cache_key(&hash);

    match cache.get_as::<JarIdentity>(&key).await {
        Ok(Some(identity)) => {
            debug!("Identity cache hit for {:?}", target);
            return identity;
        }
        Ok(None) => {}
        Err(e) => debug!("Identity cache unreadable: {}", e),
    }

    let found = match index.lookup_hash(&hash).await {
        Ok(Some(found)) => found,
        Ok(None) => {
            debug!("Build index does not know {:?}", target);
            return JarIdentity::unknown();
        }
        Err(e) => {
            warn!("Build lookup failed for {:?}: {}", target, e);
            return JarIdentity::unknown();
        }
    };

    let identity = JarIdentity::from_match(&found);
    if let Err(e) = cache.set_as(&key, &identity, Some(IDENTITY_TTL)).await {
        warn!("Could not cache identity of {:?}: {}", target, e);
    }

    info!(
        "Identified {:?} as {} {} ({})",
        target, identity.server_type, identity.minecraft_version, identity.jar_version
    );
    identity
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn nested_forge_jar_wins_over_top_level() {
        let dir = tempdir().unwrap();
        let jar = dir.path().join("server.jar");
        std::fs::write(&jar, b"wrapper").unwrap();

        let nested_dir = dir
            .path()
            .join("libraries/net/minecraftforge/forge/1.20.1-47.3.0");
        std::fs::create_dir_all(&nested_dir).unwrap();
        std::fs::write(nested_dir.join("forge-1.20.1-47.3.0-server.jar"), b"x").unwrap();
        std::fs::write(nested_dir.join("unix_args.txt"), b"x").unwrap();

        let target = locate_hash_target(&jar).unwrap();
        assert!(target.ends_with("forge-1.20.1-47.3.0-server.jar"));
    }

    #[test]
    fn nested_neoforge_jar_found_without_top_level_jar() {
        let dir = tempdir().unwrap();
        let nested_dir = dir.path().join("libraries/net/neoforged/neoforge/21.1.77");
        std::fs::create_dir_all(&nested_dir).unwrap();
        std::fs::write(nested_dir.join("neoforge-21.1.77-universal.jar"), b"x").unwrap();

        let target = locate_hash_target(&dir.path().join("server.jar")).unwrap();
        assert!(target.ends_with("neoforge-21.1.77-universal.jar"));
    }

    #[test]
    fn nothing_to_hash() {
        let dir = tempdir().unwrap();
        assert!(locate_hash_target(&dir.path().join("server.jar")).is_none());
    }

    #[tokio::test]
    async fn sha512_of_known_input() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("abc");
        std::fs::write(&path, b"abc").unwrap();
        let hash = sha512_file(&path).await.unwrap();
        assert!(hash.starts_with("ddaf35a193617aba"));
        assert_eq!(hash.len(), 128);
    }

    #[test]
    fn unknown_identity_serializes_with_lowercase_fields() {
        let value = serde_json::to_value(JarIdentity::unknown()).unwrap();
        assert_eq!(value["minecraftVersion"], "unknown");
        assert_eq!(value["jarVersion"], "unknown");
        assert!(JarIdentity::unknown().is_latest_build().is_none());
    }
}
