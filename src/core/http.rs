use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_ENCODING};
use reqwest::Client;

use crate::core::error::CraftResult;

const APP_USER_AGENT: &str = concat!("craftctl/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);
/// Whole-request limit, downloads included.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

/// One client for every remote service and download of an invocation.
///
/// Mojang and Modrinth reject requests without a descriptive user agent.
pub fn build_http_client() -> CraftResult<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json, */*"));

    let client = Client::builder()
        .user_agent(APP_USER_AGENT)
        .default_headers(headers)
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .build()?;
    Ok(client)
}
