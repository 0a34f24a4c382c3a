use std::path::PathBuf;
use thiserror::Error;

/// Central error type for the whole tool.
/// Every module returns `Result<T, CraftError>`.
#[derive(Debug, Error)]
pub enum CraftError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download failed for {url}: HTTP {status}")]
    DownloadFailed { url: String, status: u16 },

    #[error("Malformed response from {endpoint}: {reason}")]
    MalformedResponse { endpoint: String, reason: String },

    // ── Integrity ───────────────────────────────────────
    #[error("SHA-1 mismatch for {path:?}: expected {expected}, got {actual}")]
    Sha1Mismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    // ── JSON ────────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Config ──────────────────────────────────────────
    #[error("No config found at {path:?}, initialize the server with `craftctl init`")]
    NotInitialized { path: PathBuf },

    #[error("Invalid config at {path:?}: {reason}")]
    CorruptConfig { path: PathBuf, reason: String },

    // ── Profiles ────────────────────────────────────────
    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    #[error("Profile already exists: {0}")]
    ProfileExists(String),

    #[error("Profile is currently in use: {0}")]
    ProfileInUse(String),

    // ── Backups ─────────────────────────────────────────
    #[error("Backup not found: {0}")]
    BackupNotFound(String),

    #[error("Backup already exists: {0}")]
    BackupExists(String),

    // ── Server process ──────────────────────────────────
    #[error("Server is running in the background (pid {0}), stop it first")]
    ServerRunning(u32),

    #[error("Server is not running, start it with `craftctl start --detached`")]
    ServerNotRunning,

    #[error("Timed out: {0}")]
    Timeout(String),

    // ── Lookups ─────────────────────────────────────────
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unsupported loader or game version: {source}")]
    UnsupportedModpack { source: Box<CraftError> },

    // ── Java ────────────────────────────────────────────
    #[error("Java not found for major version {0}")]
    JavaNotFound(u32),

    #[error("Java execution failed: {0}")]
    JavaExecution(String),

    // ── Archive ─────────────────────────────────────────
    #[error("Zip extraction error: {0}")]
    Zip(#[from] zip::result::ZipError),

    // ── Generic ─────────────────────────────────────────
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the crate.
pub type CraftResult<T> = Result<T, CraftError>;

impl From<std::io::Error> for CraftError {
    fn from(source: std::io::Error) -> Self {
        CraftError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

impl CraftError {
    /// Attach a path to an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CraftError::Io {
            path: path.into(),
            source,
        }
    }

    /// Build a `MalformedResponse` from any displayable reason.
    pub fn malformed(endpoint: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        CraftError::MalformedResponse {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }

    /// True when the underlying cause is a missing file or directory.
    pub fn is_not_found(&self) -> bool {
        match self {
            CraftError::Io { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            CraftError::Zip(zip::result::ZipError::Io(source)) => {
                source.kind() == std::io::ErrorKind::NotFound
            }
            CraftError::NotFound(_) => true,
            _ => false,
        }
    }
}

// ── Recoverable failures ────────────────────────────
// Fatal failures travel as `Err(CraftError)`. The tolerant phases return
// their tolerated failures inside `Ok(..)` as `RecoverableFailure`s.

/// A failure that was tolerated by one of the catch-and-continue phases.
#[derive(Debug)]
pub struct RecoverableFailure {
    /// What was being attempted (a path, a dependency id).
    pub context: String,
    pub error: CraftError,
}

impl RecoverableFailure {
    /// Record the failure and log it as a warning.
    pub fn new(context: impl Into<String>, error: CraftError) -> Self {
        let failure = Self {
            context: context.into(),
            error,
        };
        tracing::warn!("{}: {}", failure.context, failure.error);
        failure
    }
}

impl std::fmt::Display for RecoverableFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.context, self.error)
    }
}
