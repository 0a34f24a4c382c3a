// ─── Server Query ───
// Status of a running server over the network: Server List Ping (TCP) and the
// optional full query (UDP).

pub mod full;
pub mod ping;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

pub use full::{full_stat, FullStat};
pub use ping::{status, ServerStatus};

pub const DEFAULT_PORT: u16 = 25565;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
}

impl ServerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `127.0.0.1` on the port `server.properties` under `root` declares for
    /// `key` (`server-port` or `query.port`), else the default port.
    pub fn local(root: &Path, key: &str) -> Self {
        let port = std::fs::read_to_string(root.join("server.properties"))
            .ok()
            .and_then(|properties| property(&properties, key).and_then(|value| value.parse().ok()))
            .unwrap_or(DEFAULT_PORT);
        Self::new("127.0.0.1", port)
    }
}

impl FromStr for ServerAddress {
    type Err = String;

    /// `host`, `host:port`, `[v6]` or `[v6]:port`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| format!("unclosed '[' in address '{s}'"))?;
            (host, tail.strip_prefix(':'))
        } else if s.matches(':').count() > 1 {
            (s, None)
        } else {
            match s.split_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (s, None),
            }
        };

        if host.is_empty() {
            return Err(format!("missing host in address '{s}'"));
        }
        let port = match port {
            Some(port) => port
                .parse()
                .map_err(|_| format!("invalid port '{port}' in address '{s}'"))?,
            None => DEFAULT_PORT,
        };
        Ok(Self::new(host, port))
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

fn property<'a>(properties: &'a str, key: &str) -> Option<&'a str> {
    properties
        .lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .find(|(k, _)| k.trim() == key)
        .map(|(_, v)| v.trim())
        .filter(|v| !v.is_empty())
}
