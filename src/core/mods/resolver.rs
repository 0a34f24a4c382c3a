// ─── Mod Resolver ───
// Installed mod jars → SHA-1 → registry metadata, memoized as `mods_<sha1>`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::api::modrinth::{ModRegistry, VersionFilter};
use crate::core::cache::Cache;
use crate::core::downloader::client::sha1_file;
use crate::core::error::{CraftError, CraftResult};

pub const MOD_CACHE_TTL: Duration = Duration::from_secs(30 * 60);
const LOOKUP_CONCURRENCY: usize = 8;

/// Registry metadata of one installed mod file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModInfo {
    pub project_id: String,
    pub slug: String,
    pub title: String,
    pub version_id: String,
    pub version: String,
    pub license: Option<String>,
    /// Version number of the newest compatible release, when one exists.
    pub latest_version_available: Option<String>,
    pub latest_version_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModRecord {
    pub file_name: String,
    pub path: PathBuf,
    pub sha1: String,
    pub info: Option<ModInfo>,
}

impl ModRecord {
    pub fn is_outdated(&self) -> bool {
        match &self.info {
            Some(info) => matches!(
                &info.latest_version_id,
                Some(latest) if *latest != info.version_id
            ),
            None => false,
        }
    }

    pub fn project_id(&self) -> Option<&str> {
        self.info.as_ref().map(|i| i.project_id.as_str())
    }

    /// True when `query` names this mod by file name, project id, slug or title.
    pub fn matches(&self, query: &str) -> bool {
        if self.file_name == query {
            return true;
        }
        match &self.info {
            Some(info) => {
                info.project_id == query
                    || info.slug.eq_ignore_ascii_case(query)
                    || info.title.eq_ignore_ascii_case(query)
            }
            None => false,
        }
    }
}

pub fn cache_key(sha1: &str) -> String {
    format!("mods_{sha1}")
}

/// `*.jar` files directly inside `mods_dir`, sorted by name.
pub async fn mod_files(mods_dir: &Path) -> CraftResult<Vec<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(mods_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(CraftError::io(mods_dir, e)),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| CraftError::io(mods_dir, e))?
    {
        let path = entry.path();
        let is_jar = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("jar"))
            .unwrap_or(false);
        if is_jar && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Look up registry metadata for one file hash. Misses and failures yield `None`.
pub async fn resolve_info(
    sha1: &str,
    cache: &Cache,
    registry: &dyn ModRegistry,
    filter: &VersionFilter,
) -> Option<ModInfo> {
    let key = cache_key(sha1);
    match cache.get_as::<ModInfo>(&key).await {
        Ok(Some(info)) => return Some(info),
        Ok(None) => {}
        Err(e) => debug!("Mod cache unreadable: {}", e),
    }

    match lookup(sha1, registry, filter).await {
        Ok(Some(info)) => {
            if let Err(e) = cache.set_as(&key, &info, Some(MOD_CACHE_TTL)).await {
                warn!("Could not cache mod info for {}: {}", sha1, e);
            }
            Some(info)
        }
        Ok(None) => None,
        Err(e) => {
            warn!("Mod lookup failed for {}: {}", sha1, e);
            None
        }
    }
}

async fn lookup(
    sha1: &str,
    registry: &dyn ModRegistry,
    filter: &VersionFilter,
) -> CraftResult<Option<ModInfo>> {
    let Some(version) = registry.version_from_hash(sha1).await? else {
        return Ok(None);
    };
    let project = registry.project(&version.project_id).await?;
    let latest = registry.latest_compatible(&project.id, filter).await?;

    Ok(Some(ModInfo {
        project_id: project.id,
        slug: project.slug,
        title: project.title,
        version_id: version.id,
        version: version.version_number,
        license: project.license.map(|l| l.id),
        latest_version_available: latest.as_ref().map(|v| v.version_number.clone()),
        latest_version_id: latest.map(|v| v.id),
    }))
}

async fn resolve_file(
    path: PathBuf,
    cache: &Cache,
    registry: &dyn ModRegistry,
    filter: &VersionFilter,
) -> CraftResult<ModRecord> {
    let sha1 = sha1_file(&path).await?;
    let info = resolve_info(&sha1, cache, registry, filter).await;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(ModRecord {
        file_name,
        path,
        sha1,
        info,
    })
}

/// Hash and resolve every mod in `mods_dir`.
pub async fn scan(
    mods_dir: &Path,
    cache: &Cache,
    registry: &dyn ModRegistry,
    filter: &VersionFilter,
) -> CraftResult<Vec<ModRecord>> {
    let files = mod_files(mods_dir).await?;
    info!("Resolving {} mods in {:?}", files.len(), mods_dir);

    let records: Vec<CraftResult<ModRecord>> = stream::iter(files)
        .map(|path| resolve_file(path, cache, registry, filter))
        .buffered(LOOKUP_CONCURRENCY)
        .collect()
        .await;

    records.into_iter().collect()
}
