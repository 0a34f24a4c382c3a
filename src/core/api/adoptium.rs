// ─── Java Runtime Index ───
// Adoptium v3: available feature releases and per-platform packages.

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::send_json;
use crate::core::error::{CraftError, CraftResult};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AvailableReleases {
    pub available_releases: Vec<u32>,
    #[serde(default)]
    pub available_lts_releases: Vec<u32>,
    pub most_recent_lts: u32,
}

/// A packaged runtime archive for one platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimePackage {
    pub major: u32,
    pub version: String,
    pub name: String,
    pub link: String,
    pub checksum: String,
    pub size: u64,
}

impl RuntimePackage {
    pub fn is_zip(&self) -> bool {
        self.name.ends_with(".zip")
    }
}

#[derive(Deserialize)]
struct AdoptiumRelease {
    binary: AdoptiumBinary,
    version: AdoptiumVersion,
}

#[derive(Deserialize)]
struct AdoptiumBinary {
    package: AdoptiumPackage,
}

#[derive(Deserialize)]
struct AdoptiumPackage {
    name: String,
    link: String,
    checksum: String,
    #[serde(default)]
    size: u64,
}

#[derive(Deserialize)]
struct AdoptiumVersion {
    openjdk_version: String,
}

pub fn platform_arch() -> String {
    match std::env::consts::ARCH {
        "x86_64" => "x64".to_string(),
        "aarch64" => "aarch64".to_string(),
        "x86" => "x32".to_string(),
        other => other.to_string(),
    }
}

pub fn platform_os() -> &'static str {
    match std::env::consts::OS {
        "windows" => "windows",
        "macos" => "mac",
        _ => "linux",
    }
}

pub struct AdoptiumClient {
    base_url: String,
    client: Client,
}

impl AdoptiumClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    pub async fn available_releases(&self) -> CraftResult<AvailableReleases> {
        let url = format!("{}/v3/info/available_releases", self.base_url);
        debug!("GET {}", url);
        send_json(self.client.get(&url), &url).await
    }

    /// Latest hotspot package for `major` on this platform, preferring a JRE.
    pub async fn latest_package(&self, major: u32) -> CraftResult<RuntimePackage> {
        let mut last_error = None;

        for image_type in ["jre", "jdk"] {
            let url = format!("{}/v3/assets/latest/{}/hotspot", self.base_url, major);
            let request = self.client.get(&url).query(&[
                ("os", platform_os().to_string()),
                ("architecture", platform_arch()),
                ("image_type", image_type.to_string()),
            ]);

            match send_json::<Vec<AdoptiumRelease>>(request, &url).await {
                Ok(releases) => {
                    if let Some(release) = releases.into_iter().next() {
                        return Ok(into_package(major, release));
                    }
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(last_error.unwrap_or(CraftError::JavaNotFound(major)))
    }
}

fn into_package(major: u32, release: AdoptiumRelease) -> RuntimePackage {
    let package = release.binary.package;
    RuntimePackage {
        major,
        version: release.version.openjdk_version,
        name: package.name,
        link: package.link,
        checksum: package.checksum,
        size: package.size,
    }
}
