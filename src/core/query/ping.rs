// ─── Server List Ping ───
// Modern handshake/status exchange (1.7+), falling back to the legacy
// `0xFE 0x01` ping answered by 1.6 and older servers.

use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use super::ServerAddress;
use crate::core::error::{CraftError, CraftResult};

/// Protocol number sent in the handshake when the client version is unknown.
const ANY_PROTOCOL: i32 = -1;
const STATE_STATUS: i32 = 1;
/// Largest status document accepted from a server.
const MAX_STATUS_LEN: usize = 1 << 20;

/// What a server reports about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerStatus {
    /// `None` for servers too old to report one.
    pub version: Option<String>,
    pub protocol: Option<i32>,
    pub online: u32,
    pub max: u32,
    pub sample: Vec<String>,
    /// Message of the day with formatting codes removed.
    pub motd: String,
    pub latency: Duration,
}

#[derive(Debug, Deserialize)]
struct StatusDocument {
    version: Option<VersionDocument>,
    players: Option<PlayersDocument>,
    #[serde(default)]
    description: Value,
}

#[derive(Debug, Deserialize)]
struct VersionDocument {
    name: String,
    protocol: i32,
}

#[derive(Debug, Deserialize)]
struct PlayersDocument {
    max: u32,
    online: u32,
    #[serde(default)]
    sample: Vec<SamplePlayer>,
}

#[derive(Debug, Deserialize)]
struct SamplePlayer {
    name: String,
}

/// Ping `address`, trying the modern protocol first.
pub async fn status(address: &ServerAddress, timeout: Duration) -> CraftResult<ServerStatus> {
    match with_timeout(address, timeout, modern_status(address)).await {
        Ok(status) => Ok(status),
        Err(modern) => {
            debug!("Modern ping of {} failed ({}), trying legacy", address, modern);
            with_timeout(address, timeout, legacy_status(address)).await
        }
    }
}

async fn with_timeout<T>(
    address: &ServerAddress,
    timeout: Duration,
    attempt: impl std::future::Future<Output = CraftResult<T>>,
) -> CraftResult<T> {
    tokio::time::timeout(timeout, attempt)
        .await
        .map_err(|_| CraftError::Timeout(format!("no answer from {address} within {timeout:?}")))?
}

async fn connect(address: &ServerAddress) -> CraftResult<TcpStream> {
    TcpStream::connect((address.host.as_str(), address.port))
        .await
        .map_err(|e| CraftError::io(address.to_string(), e))
}

async fn modern_status(address: &ServerAddress) -> CraftResult<ServerStatus> {
    let mut stream = connect(address).await?;
    let started = Instant::now();

    let mut handshake = Vec::new();
    write_varint(&mut handshake, 0x00);
    write_varint(&mut handshake, ANY_PROTOCOL);
    write_string(&mut handshake, &address.host);
    handshake.extend_from_slice(&address.port.to_be_bytes());
    write_varint(&mut handshake, STATE_STATUS);

    let mut request = frame(&handshake);
    request.extend(frame(&[0x00]));
    stream
        .write_all(&request)
        .await
        .map_err(|e| CraftError::io(address.to_string(), e))?;

    let endpoint = address.to_string();
    let _length = read_varint(&mut stream, &endpoint).await?;
    let packet_id = read_varint(&mut stream, &endpoint).await?;
    if packet_id != 0x00 {
        return Err(CraftError::malformed(
            endpoint,
            format!("unexpected packet id {packet_id:#04x}"),
        ));
    }
    let json_len = read_varint(&mut stream, &endpoint).await?;
    let json_len = usize::try_from(json_len)
        .ok()
        .filter(|len| *len <= MAX_STATUS_LEN)
        .ok_or_else(|| CraftError::malformed(&endpoint, format!("status length {json_len}")))?;

    let mut body = vec![0u8; json_len];
    stream
        .read_exact(&mut body)
        .await
        .map_err(|e| CraftError::io(&endpoint, e))?;
    let latency = started.elapsed();

    let document: StatusDocument = serde_json::from_slice(&body)
        .map_err(|e| CraftError::malformed(&endpoint, e))?;
    let players = document.players;
    Ok(ServerStatus {
        version: document.version.as_ref().map(|v| v.name.clone()),
        protocol: document.version.as_ref().map(|v| v.protocol),
        online: players.as_ref().map_or(0, |p| p.online),
        max: players.as_ref().map_or(0, |p| p.max),
        sample: players
            .map(|p| p.sample.into_iter().map(|s| s.name).collect())
            .unwrap_or_default(),
        motd: strip_formatting(&flatten_text(&document.description)),
        latency,
    })
}

async fn legacy_status(address: &ServerAddress) -> CraftResult<ServerStatus> {
    let mut stream = connect(address).await?;
    let endpoint = address.to_string();
    let started = Instant::now();

    stream
        .write_all(&[0xFE, 0x01])
        .await
        .map_err(|e| CraftError::io(&endpoint, e))?;

    let mut header = [0u8; 3];
    stream
        .read_exact(&mut header)
        .await
        .map_err(|e| CraftError::io(&endpoint, e))?;
    if header[0] != 0xFF {
        return Err(CraftError::malformed(
            endpoint,
            format!("unexpected legacy packet {:#04x}", header[0]),
        ));
    }
    let chars = usize::from(u16::from_be_bytes([header[1], header[2]]));
    let mut raw = vec![0u8; chars * 2];
    stream
        .read_exact(&mut raw)
        .await
        .map_err(|e| CraftError::io(&endpoint, e))?;

    let units: Vec<u16> = raw
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    let text = String::from_utf16_lossy(&units);
    let mut status =
        parse_legacy(&text).ok_or_else(|| CraftError::malformed(&endpoint, "legacy status"))?;
    status.latency = started.elapsed();
    Ok(status)
}

/// `§1\0<protocol>\0<version>\0<motd>\0<online>\0<max>` (1.4 - 1.6) or
/// `<motd>§<online>§<max>` (beta 1.8 - 1.3).
fn parse_legacy(text: &str) -> Option<ServerStatus> {
    if let Some(rest) = text.strip_prefix("§1\0") {
        let fields: Vec<&str> = rest.split('\0').collect();
        let [protocol, version, motd, online, max] = fields.as_slice() else {
            return None;
        };
        return Some(ServerStatus {
            version: Some(version.to_string()),
            protocol: protocol.parse().ok(),
            online: online.parse().ok()?,
            max: max.parse().ok()?,
            sample: Vec::new(),
            motd: strip_formatting(motd),
            latency: Duration::ZERO,
        });
    }

    let mut fields = text.rsplitn(3, '§');
    let max = fields.next()?.parse().ok()?;
    let online = fields.next()?.parse().ok()?;
    let motd = fields.next()?;
    Some(ServerStatus {
        version: None,
        protocol: None,
        online,
        max,
        sample: Vec::new(),
        motd: strip_formatting(motd),
        latency: Duration::ZERO,
    })
}

/// Plain text of a chat component: a string, an object with `text` and
/// `extra`, or an array of components.
fn flatten_text(component: &Value) -> String {
    match component {
        Value::String(text) => text.clone(),
        Value::Array(parts) => parts.iter().map(flatten_text).collect(),
        Value::Object(map) => {
            let mut text = map
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            if let Some(Value::Array(extra)) = map.get("extra") {
                text.extend(extra.iter().map(flatten_text));
            }
            text
        }
        _ => String::new(),
    }
}

/// Drop `§x` colour and style codes.
fn strip_formatting(text: &str) -> String {
    let mut plain = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '§' {
            chars.next();
        } else {
            plain.push(c);
        }
    }
    plain
}

// ── Wire helpers ────────────────────────────────────

fn write_varint(buf: &mut Vec<u8>, value: i32) {
    let mut value = value as u32;
    loop {
        if value & !0x7F == 0 {
            buf.push(value as u8);
            return;
        }
        buf.push((value & 0x7F) as u8 | 0x80);
        value >>= 7;
    }
}

fn write_string(buf: &mut Vec<u8>, text: &str) {
    write_varint(buf, text.len() as i32);
    buf.extend_from_slice(text.as_bytes());
}

/// Length-prefix a packet body.
fn frame(body: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(body.len() + 5);
    write_varint(&mut packet, body.len() as i32);
    packet.extend_from_slice(body);
    packet
}

async fn read_varint<R: AsyncRead + Unpin>(reader: &mut R, endpoint: &str) -> CraftResult<i32> {
    let mut value: u32 = 0;
    for position in 0..5 {
        let byte = reader
            .read_u8()
            .await
            .map_err(|e| CraftError::io(endpoint, e))?;
        value |= u32::from(byte & 0x7F) << (7 * position);
        if byte & 0x80 == 0 {
            return Ok(value as i32);
        }
    }
    Err(CraftError::malformed(endpoint, "varint longer than 5 bytes"))
}
