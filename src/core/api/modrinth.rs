// ─── Mod Registry ───
// Projects, versions, hash lookups and search against the Modrinth v2 API.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::send_json;
use crate::core::error::{CraftError, CraftResult};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct License {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Project {
    pub id: String,
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub project_type: String,
    #[serde(default)]
    pub server_side: String,
    pub license: Option<License>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FileHashes {
    pub sha1: String,
    #[serde(default)]
    pub sha512: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct VersionFile {
    pub url: String,
    pub filename: String,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub size: u64,
    pub hashes: FileHashes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyType {
    Required,
    Optional,
    Incompatible,
    Embedded,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Dependency {
    pub project_id: Option<String>,
    pub version_id: Option<String>,
    pub dependency_type: DependencyType,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Version {
    pub id: String,
    pub project_id: String,
    #[serde(default)]
    pub name: String,
    pub version_number: String,
    #[serde(default)]
    pub game_versions: Vec<String>,
    #[serde(default)]
    pub loaders: Vec<String>,
    #[serde(default)]
    pub files: Vec<VersionFile>,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
}

impl Version {
    /// The file flagged primary, or the first one.
    pub fn primary_file(&self) -> Option<&VersionFile> {
        self.files
            .iter()
            .find(|f| f.primary)
            .or_else(|| self.files.first())
    }

    pub fn required_dependencies(&self) -> impl Iterator<Item = &Dependency> {
        self.dependencies
            .iter()
            .filter(|d| d.dependency_type == DependencyType::Required)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SearchHit {
    pub project_id: String,
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub downloads: u64,
    #[serde(default)]
    pub author: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: Vec<SearchHit>,
}

/// Compatibility filter for version listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionFilter {
    pub loaders: Vec<String>,
    pub game_versions: Vec<String>,
}

impl VersionFilter {
    pub fn new(loader: impl Into<String>, game_version: impl Into<String>) -> Self {
        Self {
            loaders: vec![loader.into()],
            game_versions: vec![game_version.into()],
        }
    }

    pub fn matches(&self, version: &Version) -> bool {
        let loader_ok = self.loaders.is_empty()
            || version.loaders.iter().any(|l| self.loaders.contains(l));
        let game_ok = self.game_versions.is_empty()
            || version
                .game_versions
                .iter()
                .any(|g| self.game_versions.contains(g));
        loader_ok && game_ok
    }
}

/// Remote mod and modpack registry.
#[async_trait]
pub trait ModRegistry: Send + Sync {
    /// Project by id or slug.
    async fn project(&self, id: &str) -> CraftResult<Project>;

    /// Versions of a project matching `filter`, newest first.
    async fn project_versions(&self, id: &str, filter: &VersionFilter) -> CraftResult<Vec<Version>>;

    async fn version(&self, id: &str) -> CraftResult<Version>;

    /// Version owning a file with this SHA-1, if the registry knows it.
    async fn version_from_hash(&self, sha1: &str) -> CraftResult<Option<Version>>;

    async fn search(&self, query: &str, facets: &[Vec<String>]) -> CraftResult<Vec<SearchHit>>;

    /// Newest version of a project compatible with `filter`.
    async fn latest_compatible(
        &self,
        id: &str,
        filter: &VersionFilter,
    ) -> CraftResult<Option<Version>> {
        let versions = self.project_versions(id, filter).await?;
        Ok(versions.into_iter().find(|v| filter.matches(v)))
    }
}

pub struct ModrinthClient {
    base_url: String,
    client: Client,
}

impl ModrinthClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v2{}", self.base_url, path)
    }
}

fn json_list(values: &[String]) -> CraftResult<String> {
    Ok(serde_json::to_string(values)?)
}

#[async_trait]
impl ModRegistry for ModrinthClient {
    async fn project(&self, id: &str) -> CraftResult<Project> {
        let url = self.url(&format!("/project/{id}"));
        debug!("GET {}", url);
        send_json(self.client.get(&url), &url).await
    }

    async fn project_versions(&self, id: &str, filter: &VersionFilter) -> CraftResult<Vec<Version>> {
        let url = self.url(&format!("/project/{id}/version"));
        let mut query = Vec::new();
        if !filter.loaders.is_empty() {
            query.push(("loaders", json_list(&filter.loaders)?));
        }
        if !filter.game_versions.is_empty() {
            query.push(("game_versions", json_list(&filter.game_versions)?));
        }
        debug!("GET {} {:?}", url, query);
        send_json(self.client.get(&url).query(&query), &url).await
    }

    async fn version(&self, id: &str) -> CraftResult<Version> {
        let url = self.url(&format!("/version/{id}"));
        debug!("GET {}", url);
        send_json(self.client.get(&url), &url).await
    }

    async fn version_from_hash(&self, sha1: &str) -> CraftResult<Option<Version>> {
        let url = self.url(&format!("/version_file/{sha1}"));
        let request = self.client.get(&url).query(&[("algorithm", "sha1")]);
        match send_json(request, &url).await {
            Ok(version) => Ok(Some(version)),
            Err(CraftError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn search(&self, query: &str, facets: &[Vec<String>]) -> CraftResult<Vec<SearchHit>> {
        let url = self.url("/search");
        let facets = serde_json::to_string(facets)?;
        let request = self
            .client
            .get(&url)
            .query(&[("query", query), ("facets", facets.as_str()), ("limit", "20")]);
        let response: SearchResponse = send_json(request, &url).await?;
        Ok(response.hits)
    }
}
