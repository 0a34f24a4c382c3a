// ─── Cache Store ───
// Flat on-disk key/value store with optional per-entry expiry.
// One JSON file per key: `{ "data": <value>, "expires": <unix ms | null> }`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::core::error::{CraftError, CraftResult};

const ENTRY_EXTENSION: &str = "json";

#[derive(Debug, Serialize, Deserialize)]
struct CacheRecord {
    data: Value,
    expires: Option<i64>,
}

impl CacheRecord {
    fn is_expired(&self, now_ms: i64) -> bool {
        matches!(self.expires, Some(expires) if now_ms >= expires)
    }
}

/// Memoization layer over network lookups and file hashing.
///
/// Expired entries are removed lazily, on the `get` that finds them.
/// `keys` and `size` report every stored file, expired or not.
#[derive(Debug, Clone)]
pub struct Cache {
    dir: PathBuf,
}

impl Cache {
    /// Open (and create if needed) a cache rooted at `dir`.
    pub async fn open(dir: impl Into<PathBuf>) -> CraftResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| CraftError::io(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", encode_key(key), ENTRY_EXTENSION))
    }

    /// Value stored under `key`, or `None` when missing, expired or unreadable.
    pub async fn get(&self, key: &str) -> CraftResult<Option<Value>> {
        let path = self.entry_path(key);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CraftError::io(&path, e)),
        };

        let record = match serde_json::from_slice::<CacheRecord>(&raw) {
            Ok(record) => record,
            Err(e) => {
                debug!("Dropping unreadable cache entry {:?}: {}", path, e);
                self.delete(key).await?;
                return Ok(None);
            }
        };

        if record.is_expired(Utc::now().timestamp_millis()) {
            debug!("Cache entry {} expired", key);
            self.delete(key).await?;
            return Ok(None);
        }

        Ok(Some(record.data))
    }

    /// Typed `get`. An entry that no longer matches `T` is deleted.
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> CraftResult<Option<T>> {
        let Some(value) = self.get(key).await? else {
            return Ok(None);
        };

        match serde_json::from_value(value) {
            Ok(typed) => Ok(Some(typed)),
            Err(e) => {
                debug!("Cache entry {} has an outdated shape: {}", key, e);
                self.delete(key).await?;
                Ok(None)
            }
        }
    }

    /// Store `value` under `key`, overwriting any previous entry.
    pub async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> CraftResult<()> {
        let expires = ttl.map(|ttl| {
            Utc::now()
                .timestamp_millis()
                .saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX))
        });
        let record = CacheRecord {
            data: value,
            expires,
        };

        let path = self.entry_path(key);
        let payload = serde_json::to_vec(&record)?;
        tokio::fs::write(&path, payload)
            .await
            .map_err(|e| CraftError::io(&path, e))
    }

    pub async fn set_as<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> CraftResult<()> {
        self.set(key, serde_json::to_value(value)?, ttl).await
    }

    /// Remove `key`. Missing keys are not an error.
    pub async fn delete(&self, key: &str) -> CraftResult<()> {
        let path = self.entry_path(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CraftError::io(&path, e)),
        }
    }

    /// Every stored key, sorted. Expired entries are included.
    pub async fn keys(&self) -> CraftResult<Vec<String>> {
        let mut keys: Vec<String> = self
            .entries()
            .await?
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        keys.sort();
        Ok(keys)
    }

    /// Total bytes used by all stored entries.
    pub async fn size(&self) -> CraftResult<u64> {
        Ok(self.entries().await?.into_iter().map(|(_, len)| len).sum())
    }

    /// Remove every entry, returning how many were deleted.
    pub async fn clear(&self) -> CraftResult<usize> {
        let entries = self.entries().await?;
        for (key, _) in &entries {
            self.delete(key).await?;
        }
        Ok(entries.len())
    }

    async fn entries(&self) -> CraftResult<Vec<(String, u64)>> {
        let mut out = Vec::new();
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(CraftError::io(&self.dir, e)),
        };

        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| CraftError::io(&self.dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            let Some(key) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(decode_key)
            else {
                debug!("Ignoring foreign file in cache dir: {:?}", path);
                continue;
            };
            let len = entry
                .metadata()
                .await
                .map_err(|e| CraftError::io(&path, e))?
                .len();
            out.push((key, len));
        }

        Ok(out)
    }
}

/// File stem for `key`. Bytes outside `[A-Za-z0-9._-]`, and a leading dot,
/// become `%XX`, so distinct keys never share a file.
fn encode_key(key: &str) -> String {
    let mut stem = String::with_capacity(key.len());
    for (i, byte) in key.bytes().enumerate() {
        let plain = byte.is_ascii_alphanumeric()
            || matches!(byte, b'_' | b'-')
            || (byte == b'.' && i > 0);
        if plain {
            stem.push(char::from(byte));
        } else {
            stem.push_str(&format!("%{byte:02X}"));
        }
    }
    stem
}

/// Inverse of [`encode_key`]; `None` for stems it could not have produced.
fn decode_key(stem: &str) -> Option<String> {
    let mut bytes = Vec::with_capacity(stem.len());
    let mut rest = stem.as_bytes();
    while let Some((&first, tail)) = rest.split_first() {
        if first == b'%' {
            let escaped = hex::decode(tail.get(..2)?).ok()?;
            bytes.extend(escaped);
            rest = &tail[2..];
        } else {
            bytes.push(first);
            rest = tail;
        }
    }

    let key = String::from_utf8(bytes).ok()?;
    (encode_key(&key) == stem).then_some(key)
}
