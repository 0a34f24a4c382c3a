// ─── Full Query ───
// GameSpy4 UDP query, answered when `enable-query=true`.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::net::UdpSocket;

use super::ServerAddress;
use crate::core::error::{CraftError, CraftResult};

const MAGIC: [u8; 2] = [0xFE, 0xFD];
const TYPE_HANDSHAKE: u8 = 0x09;
const TYPE_STAT: u8 = 0x00;
const SESSION_MASK: i32 = 0x0F0F_0F0F;
/// `splitnum\0\x80\0` after the response header.
const KV_PADDING: usize = 11;
/// `\x01player_\0\0` before the player list.
const PLAYER_PADDING: usize = 10;
const MAX_DATAGRAM: usize = 64 * 1024;

/// Key/value section and player list of a full stat response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FullStat {
    pub fields: BTreeMap<String, String>,
    pub players: Vec<String>,
}

impl FullStat {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

/// Handshake for a challenge token, then request the full stat.
pub async fn full_stat(address: &ServerAddress, timeout: Duration) -> CraftResult<FullStat> {
    tokio::time::timeout(timeout, exchange(address))
        .await
        .map_err(|_| {
            CraftError::Timeout(format!("no query answer from {address} within {timeout:?}"))
        })?
}

async fn exchange(address: &ServerAddress) -> CraftResult<FullStat> {
    let endpoint = address.to_string();
    let target = tokio::net::lookup_host((address.host.as_str(), address.port))
        .await
        .map_err(|e| CraftError::io(&endpoint, e))?
        .next()
        .ok_or_else(|| CraftError::NotFound(format!("address of {endpoint}")))?;
    let local = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
    let socket = UdpSocket::bind(local)
        .await
        .map_err(|e| CraftError::io(&endpoint, e))?;
    socket
        .connect(target)
        .await
        .map_err(|e| CraftError::io(&endpoint, e))?;

    let session = session_id();
    let mut buf = vec![0u8; MAX_DATAGRAM];

    socket
        .send(&request(TYPE_HANDSHAKE, session, &[]))
        .await
        .map_err(|e| CraftError::io(&endpoint, e))?;
    let len = socket
        .recv(&mut buf)
        .await
        .map_err(|e| CraftError::io(&endpoint, e))?;
    let token = parse_challenge(&buf[..len], session)
        .ok_or_else(|| CraftError::malformed(&endpoint, "query handshake"))?;

    let mut payload = token.to_be_bytes().to_vec();
    payload.extend_from_slice(&[0, 0, 0, 0]);
    socket
        .send(&request(TYPE_STAT, session, &payload))
        .await
        .map_err(|e| CraftError::io(&endpoint, e))?;
    let len = socket
        .recv(&mut buf)
        .await
        .map_err(|e| CraftError::io(&endpoint, e))?;

    parse_full_stat(&buf[..len], session)
        .ok_or_else(|| CraftError::malformed(&endpoint, "query full stat"))
}

fn session_id() -> i32 {
    let (high, _) = uuid::Uuid::new_v4().as_u64_pair();
    (high as i32) & SESSION_MASK
}

fn request(kind: u8, session: i32, payload: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(7 + payload.len());
    packet.extend_from_slice(&MAGIC);
    packet.push(kind);
    packet.extend_from_slice(&session.to_be_bytes());
    packet.extend_from_slice(payload);
    packet
}

/// Strip the `type, session id` header after checking both.
fn body(packet: &[u8], kind: u8, session: i32) -> Option<&[u8]> {
    if packet.len() < 5 {
        return None;
    }
    let (header, body) = packet.split_at(5);
    (header[0] == kind && header[1..] == session.to_be_bytes()).then_some(body)
}

/// NUL-terminated strings read off a datagram.
struct CStrings<'a> {
    rest: &'a [u8],
}

impl<'a> CStrings<'a> {
    fn next(&mut self) -> Option<&'a [u8]> {
        let end = self.rest.iter().position(|b| *b == 0)?;
        let (text, tail) = self.rest.split_at(end);
        self.rest = &tail[1..];
        Some(text)
    }

    fn skip(&mut self, n: usize) -> Option<()> {
        self.rest = self.rest.get(n..)?;
        Some(())
    }
}

fn parse_challenge(packet: &[u8], session: i32) -> Option<i32> {
    let digits = CStrings {
        rest: body(packet, TYPE_HANDSHAKE, session)?,
    }
    .next()?;
    std::str::from_utf8(digits).ok()?.trim().parse().ok()
}

fn parse_full_stat(packet: &[u8], session: i32) -> Option<FullStat> {
    let mut strings = CStrings {
        rest: body(packet, TYPE_STAT, session)?,
    };
    strings.skip(KV_PADDING)?;

    let mut stat = FullStat::default();
    loop {
        let key = strings.next()?;
        if key.is_empty() {
            break;
        }
        let value = strings.next()?;
        stat.fields.insert(latin1(key), latin1(value));
    }

    strings.skip(PLAYER_PADDING)?;
    while let Some(name) = strings.next() {
        if name.is_empty() {
            break;
        }
        stat.players.push(latin1(name));
    }
    Some(stat)
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|b| char::from(*b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stat_packet(session: i32, fields: &[(&str, &str)], players: &[&str]) -> Vec<u8> {
        let mut packet = vec![TYPE_STAT];
        packet.extend_from_slice(&session.to_be_bytes());
        packet.extend_from_slice(b"splitnum\0\x80\0");
        for (key, value) in fields {
            packet.extend_from_slice(key.as_bytes());
            packet.push(0);
            packet.extend_from_slice(value.as_bytes());
            packet.push(0);
        }
        packet.push(0);
        packet.extend_from_slice(b"\x01player_\0\0");
        for player in players {
            packet.extend_from_slice(player.as_bytes());
            packet.push(0);
        }
        packet.push(0);
        packet
    }

    #[test]
    fn challenge_token_is_read_from_ascii() {
        let mut packet = vec![TYPE_HANDSHAKE];
        packet.extend_from_slice(&7_i32.to_be_bytes());
        packet.extend_from_slice(b"9513307\0");
        assert_eq!(parse_challenge(&packet, 7), Some(9_513_307));
        assert_eq!(parse_challenge(&packet, 8), None);
    }

    #[test]
    fn full_stat_fields_and_players() {
        let packet = stat_packet(
            3,
            &[("hostname", "A Minecraft Server"), ("numplayers", "2"), ("version", "1.21.1")],
            &["Notch", "jeb_"],
        );
        let stat = parse_full_stat(&packet, 3).unwrap();
        assert_eq!(stat.get("hostname"), Some("A Minecraft Server"));
        assert_eq!(stat.get("version"), Some("1.21.1"));
        assert_eq!(stat.players, vec!["Notch", "jeb_"]);
    }

    #[test]
    fn truncated_stat_is_rejected() {
        let packet = stat_packet(3, &[("hostname", "x")], &[]);
        assert!(parse_full_stat(&packet[..12], 3).is_none());
    }

    #[tokio::test]
    async fn full_stat_over_udp() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();

        tokio::spawn(async move {
            let mut buf = [0u8; 1500];
            let (len, peer) = server.recv_from(&mut buf).await.unwrap();
            assert_eq!(len, 7);
            assert_eq!(&buf[..3], &[0xFE, 0xFD, TYPE_HANDSHAKE]);
            let session = i32::from_be_bytes(buf[3..7].try_into().unwrap());

            let mut challenge = vec![TYPE_HANDSHAKE];
            challenge.extend_from_slice(&session.to_be_bytes());
            challenge.extend_from_slice(b"-1234\0");
            server.send_to(&challenge, peer).await.unwrap();

            let (len, peer) = server.recv_from(&mut buf).await.unwrap();
            assert_eq!(len, 15);
            assert_eq!(&buf[7..11], &(-1234_i32).to_be_bytes());
            let reply = stat_packet(session, &[("hostname", "Local")], &["Alex"]);
            server.send_to(&reply, peer).await.unwrap();
        });

        let address = ServerAddress::new("127.0.0.1", port);
        let stat = full_stat(&address, Duration::from_secs(5)).await.unwrap();
        assert_eq!(stat.get("hostname"), Some("Local"));
        assert_eq!(stat.players, vec!["Alex"]);
    }

    #[test]
    fn session_ids_fit_the_mask() {
        for _ in 0..16 {
            assert_eq!(session_id() & !SESSION_MASK, 0);
        }
    }
}
