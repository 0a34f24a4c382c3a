// ─── Remote APIs ───
// Typed clients for the external services. Every response is decoded into
// a closed shape here; anything else becomes `MalformedResponse`.

pub mod adoptium;
pub mod mcjars;
pub mod modrinth;
pub mod mojang;

use serde::de::DeserializeOwned;

use crate::core::error::{CraftError, CraftResult};

pub use mcjars::{BuildIndex, McjarsClient, ServerType};
pub use modrinth::{ModRegistry, ModrinthClient};

const MCJARS_DEFAULT: &str = "https://versions.mcjars.app";
const MODRINTH_DEFAULT: &str = "https://api.modrinth.com";
const ADOPTIUM_DEFAULT: &str = "https://api.adoptium.net";
const MOJANG_API_DEFAULT: &str = "https://api.mojang.com";
const MOJANG_SESSION_DEFAULT: &str = "https://sessionserver.mojang.com";

/// Base URLs of the external services.
#[derive(Debug, Clone)]
pub struct ApiEndpoints {
    pub mcjars: String,
    pub modrinth: String,
    pub adoptium: String,
    pub mojang_api: String,
    pub mojang_session: String,
}

impl Default for ApiEndpoints {
    fn default() -> Self {
        Self {
            mcjars: MCJARS_DEFAULT.to_string(),
            modrinth: MODRINTH_DEFAULT.to_string(),
            adoptium: ADOPTIUM_DEFAULT.to_string(),
            mojang_api: MOJANG_API_DEFAULT.to_string(),
            mojang_session: MOJANG_SESSION_DEFAULT.to_string(),
        }
    }
}

impl ApiEndpoints {
    /// Defaults, overridden by `MCJARS_URL`, `MODRINTH_API_URL` and `ADOPTIUM_API_URL`.
    pub fn from_env() -> Self {
        let mut endpoints = Self::default();
        if let Ok(url) = std::env::var("MCJARS_URL") {
            endpoints.mcjars = url;
        }
        if let Ok(url) = std::env::var("MODRINTH_API_URL") {
            endpoints.modrinth = url;
        }
        if let Ok(url) = std::env::var("ADOPTIUM_API_URL") {
            endpoints.adoptium = url;
        }
        endpoints
    }
}

/// Send a request and decode its JSON body, mapping 404 to `NotFound`.
pub(crate) async fn send_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
    endpoint: &str,
) -> CraftResult<T> {
    let response = request.send().await?;
    let status = response.status();

    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(CraftError::NotFound(endpoint.to_string()));
    }
    if !status.is_success() {
        return Err(CraftError::DownloadFailed {
            url: endpoint.to_string(),
            status: status.as_u16(),
        });
    }

    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| CraftError::malformed(endpoint, e))
}
