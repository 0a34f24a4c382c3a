// ─── Build Index ───
// Server types, Minecraft versions and builds (with installation scripts)
// from the mcjars versions API, plus the hash → build lookup.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use super::send_json;
use crate::core::error::{CraftError, CraftResult};
use crate::core::install::step::InstallScript;

const BUILD_FIELDS: &str = "id,type,buildNumber,name,versionId,projectVersionId,installation";

/// Server software families known to the build index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ServerType {
    Vanilla,
    Paper,
    Pufferfish,
    Spigot,
    Folia,
    Purpur,
    Leaves,
    Waterfall,
    Velocity,
    Bungeecord,
    Fabric,
    LegacyFabric,
    Quilt,
    Forge,
    NeoForge,
    Mohist,
    Arclight,
    Sponge,
    Unknown,
}

impl ServerType {
    pub const ALL: [ServerType; 18] = [
        ServerType::Vanilla,
        ServerType::Paper,
        ServerType::Pufferfish,
        ServerType::Spigot,
        ServerType::Folia,
        ServerType::Purpur,
        ServerType::Leaves,
        ServerType::Waterfall,
        ServerType::Velocity,
        ServerType::Bungeecord,
        ServerType::Fabric,
        ServerType::LegacyFabric,
        ServerType::Quilt,
        ServerType::Forge,
        ServerType::NeoForge,
        ServerType::Mohist,
        ServerType::Arclight,
        ServerType::Sponge,
    ];

    /// Identifier used in API paths (`PAPER`, `NEOFORGE`, ...).
    pub fn api_id(&self) -> &'static str {
        match self {
            ServerType::Vanilla => "VANILLA",
            ServerType::Paper => "PAPER",
            ServerType::Pufferfish => "PUFFERFISH",
            ServerType::Spigot => "SPIGOT",
            ServerType::Folia => "FOLIA",
            ServerType::Purpur => "PURPUR",
            ServerType::Leaves => "LEAVES",
            ServerType::Waterfall => "WATERFALL",
            ServerType::Velocity => "VELOCITY",
            ServerType::Bungeecord => "BUNGEECORD",
            ServerType::Fabric => "FABRIC",
            ServerType::LegacyFabric => "LEGACY_FABRIC",
            ServerType::Quilt => "QUILT",
            ServerType::Forge => "FORGE",
            ServerType::NeoForge => "NEOFORGE",
            ServerType::Mohist => "MOHIST",
            ServerType::Arclight => "ARCLIGHT",
            ServerType::Sponge => "SPONGE",
            ServerType::Unknown => "UNKNOWN",
        }
    }

    /// Loader name used by the mod registry (`paper`, `neoforge`, ...).
    pub fn loader_name(&self) -> String {
        self.api_id().to_lowercase().replace('_', "-")
    }

    pub fn is_known(&self) -> bool {
        *self != ServerType::Unknown
    }
}

impl fmt::Display for ServerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.loader_name())
    }
}

impl FromStr for ServerType {
    type Err = CraftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_uppercase().replace('-', "_");
        ServerType::ALL
            .iter()
            .copied()
            .find(|t| t.api_id() == wanted)
            .ok_or_else(|| CraftError::InvalidArgument(format!("unknown server type '{s}'")))
    }
}

impl From<String> for ServerType {
    fn from(value: String) -> Self {
        value.parse().unwrap_or(ServerType::Unknown)
    }
}

impl From<ServerType> for String {
    fn from(value: ServerType) -> Self {
        value.api_id().to_string()
    }
}

/// One published build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Build {
    pub id: u64,
    #[serde(rename = "type")]
    pub server_type: ServerType,
    #[serde(default)]
    pub build_number: u64,
    #[serde(default)]
    pub name: String,
    pub version_id: Option<String>,
    pub project_version_id: Option<String>,
    #[serde(default)]
    pub installation: InstallScript,
}

impl Build {
    /// Label of the jar itself: project version when present, else the build number.
    pub fn jar_version_label(&self) -> String {
        self.project_version_id
            .clone()
            .unwrap_or_else(|| self.build_number.to_string())
    }

    /// Minecraft version this build targets.
    pub fn minecraft_label(&self) -> String {
        self.version_id
            .clone()
            .or_else(|| self.project_version_id.clone())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// A Minecraft version available for a server type.
#[derive(Debug, Clone, PartialEq)]
pub struct MinecraftVersion {
    pub version: String,
    pub java: u32,
    pub latest: Build,
}

/// Result of a hash lookup: the matching build and the newest build of its line.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BuildMatch {
    pub build: Build,
    pub latest: Build,
}

/// Cheap up-to-date comparison data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatestSummary {
    pub latest_jar: String,
    pub latest_mc: String,
}

/// Jar version label of a build as shown to the user.
///
/// First builds are better known by their project version string.
pub fn derive_jar_version(build_number: u64, project_version: Option<&str>) -> String {
    match (build_number, project_version) {
        (1, Some(project_version)) => project_version.to_string(),
        _ => build_number.to_string(),
    }
}

/// Read-only queries against the remote build index.
#[async_trait]
pub trait BuildIndex: Send + Sync {
    /// Server types the index knows about.
    async fn list_types(&self) -> CraftResult<Vec<ServerType>>;

    /// Minecraft versions of a type, in index order (oldest first).
    async fn list_minecraft_versions(
        &self,
        server_type: ServerType,
    ) -> CraftResult<Vec<MinecraftVersion>>;

    /// Builds of a type for one Minecraft version, newest first.
    async fn list_builds(
        &self,
        server_type: ServerType,
        minecraft_version: &str,
    ) -> CraftResult<Vec<Build>>;

    /// Build whose jar has the given SHA-512, if the index knows it.
    async fn lookup_hash(&self, sha512: &str) -> CraftResult<Option<BuildMatch>>;

    /// Latest jar label for `minecraft_version` and the newest Minecraft version.
    async fn latest_summary(
        &self,
        server_type: ServerType,
        minecraft_version: &str,
    ) -> CraftResult<LatestSummary> {
        if !server_type.is_known() {
            return Ok(LatestSummary {
                latest_jar: "unknown".into(),
                latest_mc: "unknown".into(),
            });
        }

        let versions = self.list_minecraft_versions(server_type).await?;
        let latest_jar = versions
            .iter()
            .find(|v| v.version == minecraft_version)
            .map(|v| {
                derive_jar_version(v.latest.build_number, v.latest.project_version_id.as_deref())
            })
            .unwrap_or_else(|| "unknown".to_string());
        let latest_mc = versions
            .last()
            .map(|v| v.latest.minecraft_label())
            .unwrap_or_else(|| "unknown".to_string());

        Ok(LatestSummary {
            latest_jar,
            latest_mc,
        })
    }
}

/// HTTP client for the mcjars versions API.
pub struct McjarsClient {
    base_url: String,
    client: Client,
}

impl McjarsClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> CraftResult<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);
        let body: Value = send_json(self.client.get(&url), &url).await?;
        decode_envelope(&url, body)
    }
}

/// Unwrap the `{ "success": bool, ... }` envelope every endpoint returns.
pub fn decode_envelope<T: DeserializeOwned>(endpoint: &str, body: Value) -> CraftResult<T> {
    match body.get("success").and_then(Value::as_bool) {
        Some(true) => serde_json::from_value(body).map_err(|e| CraftError::malformed(endpoint, e)),
        Some(false) => {
            let errors = body
                .get("errors")
                .map(Value::to_string)
                .unwrap_or_default();
            Err(CraftError::NotFound(format!("{endpoint} {errors}")))
        }
        None => Err(CraftError::malformed(endpoint, "missing success flag")),
    }
}

#[derive(Deserialize)]
struct TypesResponse {
    types: Map<String, Value>,
}

#[derive(Deserialize)]
struct VersionsResponse {
    builds: Map<String, Value>,
}

#[derive(Deserialize)]
struct VersionEntry {
    java: u32,
    latest: Build,
}

#[derive(Deserialize)]
struct BuildsResponse {
    builds: Vec<Build>,
}

/// Flatten `{ "category": { "PAPER": {...}, ... }, ... }` into known types.
fn parse_types(endpoint: &str, types: Map<String, Value>) -> CraftResult<Vec<ServerType>> {
    let mut out = Vec::new();
    for (_, group) in types {
        let group = group
            .as_object()
            .ok_or_else(|| CraftError::malformed(endpoint, "type group is not an object"))?;
        for key in group.keys() {
            let server_type = ServerType::from(key.clone());
            if server_type.is_known() && !out.contains(&server_type) {
                out.push(server_type);
            }
        }
    }
    Ok(out)
}

fn parse_versions(endpoint: &str, builds: Map<String, Value>) -> CraftResult<Vec<MinecraftVersion>> {
    builds
        .into_iter()
        .map(|(version, entry)| {
            let entry: VersionEntry =
                serde_json::from_value(entry).map_err(|e| CraftError::malformed(endpoint, e))?;
            Ok(MinecraftVersion {
                version,
                java: entry.java,
                latest: entry.latest,
            })
        })
        .collect()
}

#[async_trait]
impl BuildIndex for McjarsClient {
    async fn list_types(&self) -> CraftResult<Vec<ServerType>> {
        let path = "/api/v2/types";
        let response: TypesResponse = self.get(path).await?;
        parse_types(path, response.types)
    }

    async fn list_minecraft_versions(
        &self,
        server_type: ServerType,
    ) -> CraftResult<Vec<MinecraftVersion>> {
        let path = format!("/api/v2/builds/{}?fields={}", server_type.api_id(), BUILD_FIELDS);
        let response: VersionsResponse = self.get(&path).await?;
        parse_versions(&path, response.builds)
    }

    async fn list_builds(
        &self,
        server_type: ServerType,
        minecraft_version: &str,
    ) -> CraftResult<Vec<Build>> {
        let path = format!(
            "/api/v2/builds/{}/{}?fields={}",
            server_type.api_id(),
            minecraft_version,
            BUILD_FIELDS
        );
        let response: BuildsResponse = self.get(&path).await?;
        info!(
            "Found {} {} builds for {}",
            response.builds.len(),
            server_type,
            minecraft_version
        );
        Ok(response.builds)
    }

    async fn lookup_hash(&self, sha512: &str) -> CraftResult<Option<BuildMatch>> {
        let url = format!("{}/api/v2/build?fields={}", self.base_url, BUILD_FIELDS);
        let request = self
            .client
            .post(&url)
            .json(&json!({ "hash": { "sha512": sha512 } }));

        let body: Value = match send_json(request, &url).await {
            Ok(body) => body,
            Err(CraftError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        match decode_envelope::<BuildMatch>(&url, body) {
            Ok(found) => Ok(Some(found)),
            Err(CraftError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
