// ─── Player Profiles ───

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::core::error::{CraftError, CraftResult};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlayerProfile {
    /// Undashed UUID as returned by the API.
    pub id: String,
    pub name: String,
}

impl PlayerProfile {
    pub fn dashed_id(&self) -> String {
        format_uuid(&self.id)
    }
}

/// Insert dashes into a 32-digit UUID (`8-4-4-4-12`); other input is returned as is.
pub fn format_uuid(raw: &str) -> String {
    let compact: String = raw.chars().filter(|c| *c != '-').collect();
    if compact.len() != 32 || !compact.chars().all(|c| c.is_ascii_hexdigit()) {
        return raw.to_string();
    }
    format!(
        "{}-{}-{}-{}-{}",
        &compact[0..8],
        &compact[8..12],
        &compact[12..16],
        &compact[16..20],
        &compact[20..32]
    )
}

/// True when `input` looks like a UUID (dashed or not) rather than a player name.
pub fn is_uuid(input: &str) -> bool {
    let compact: String = input.chars().filter(|c| *c != '-').collect();
    compact.len() == 32 && compact.chars().all(|c| c.is_ascii_hexdigit())
}

pub struct MojangClient {
    api_url: String,
    session_url: String,
    client: Client,
}

impl MojangClient {
    pub fn new(client: Client, api_url: impl Into<String>, session_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            session_url: session_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Profile for a player name or UUID.
    pub async fn profile(&self, name_or_uuid: &str) -> CraftResult<PlayerProfile> {
        let url = if is_uuid(name_or_uuid) {
            let compact = name_or_uuid.replace('-', "");
            format!("{}/session/minecraft/profile/{}", self.session_url, compact)
        } else {
            format!("{}/users/profiles/minecraft/{}", self.api_url, name_or_uuid)
        };
        debug!("GET {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        // The profile endpoints answer 204 for unknown players
        if status == reqwest::StatusCode::NO_CONTENT || status == reqwest::StatusCode::NOT_FOUND {
            return Err(CraftError::NotFound(format!("player {name_or_uuid}")));
        }
        if !status.is_success() {
            return Err(CraftError::DownloadFailed {
                url,
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| CraftError::malformed(&url, e))
    }
}
