// ─── Detached Server ───
// `start --detached` runs the server in its own process group. Its stdin is a
// FIFO and its output is appended to a log, both under
// `<root>/.craftctl.detached/` next to a `session.json` naming the pid.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sysinfo::{Pid, ProcessStatus, System};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::core::config::Config;
use crate::core::error::{CraftError, CraftResult};
use crate::core::install::runner::remove_path;
use crate::core::java::InstalledRuntime;
use crate::core::paths;

const SESSION_FILE: &str = "session.json";
const STDIN_FIFO: &str = "stdin";
const CONSOLE_LOG: &str = "console.log";

/// Time `stop` waits for a clean shutdown before killing the server.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(60);
const POLL_INTERVAL: Duration = Duration::from_millis(250);
const STOP_POLL: Duration = Duration::from_secs(1);
const LIVENESS_INTERVAL: Duration = Duration::from_secs(2);
/// Bytes of earlier output replayed on attach.
const ATTACH_BACKLOG: u64 = 8 * 1024;

/// What `start --detached` records about the process it spawned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub pid: u32,
    pub java: PathBuf,
    pub started: DateTime<Utc>,
}

/// A live detached server as seen by the OS.
#[derive(Debug, Clone)]
pub struct ProcessInfo {
    pub pid: u32,
    /// Resident memory in bytes.
    pub memory: u64,
    pub started: DateTime<Utc>,
}

impl ProcessInfo {
    pub fn uptime(&self) -> chrono::Duration {
        Utc::now() - self.started
    }
}

/// The detached server of one installation root.
#[derive(Debug, Clone)]
pub struct Detached {
    dir: PathBuf,
}

impl Detached {
    pub fn new(root: &Path) -> Self {
        Self {
            dir: paths::detached_dir(root),
        }
    }

    fn session_path(&self) -> PathBuf {
        self.dir.join(SESSION_FILE)
    }

    fn fifo_path(&self) -> PathBuf {
        self.dir.join(STDIN_FIFO)
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir.join(CONSOLE_LOG)
    }

    pub async fn session(&self) -> CraftResult<Option<Session>> {
        let path = self.session_path();
        match tokio::fs::read(&path).await {
            Ok(raw) => Ok(serde_json::from_slice(&raw).ok()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CraftError::io(&path, e)),
        }
    }

    async fn save_session(&self, session: &Session) -> CraftResult<()> {
        let path = self.session_path();
        let payload = serde_json::to_vec_pretty(session)?;
        tokio::fs::write(&path, payload)
            .await
            .map_err(|e| CraftError::io(&path, e))
    }

    /// Forget the session and its stdin pipe. The console log is kept.
    async fn clear(&self) -> CraftResult<()> {
        remove_path(&self.session_path()).await?;
        remove_path(&self.fifo_path()).await
    }

    /// The live process of the recorded session. A session whose process
    /// is gone is cleared.
    pub async fn running(&self) -> CraftResult<Option<ProcessInfo>> {
        let Some(session) = self.session().await? else {
            return Ok(None);
        };
        match inspect(&session) {
            Some(info) => Ok(Some(info)),
            None => {
                debug!("Detached session pid {} is gone", session.pid);
                self.clear().await?;
                Ok(None)
            }
        }
    }

    /// Refuse to proceed while a detached server is running.
    pub async fn ensure_stopped(&self) -> CraftResult<()> {
        match self.running().await? {
            Some(info) => Err(CraftError::ServerRunning(info.pid)),
            None => Ok(()),
        }
    }

    /// Spawn the server in the background and record its session.
    #[cfg(unix)]
    pub async fn start(&self, config: &Config, java: &InstalledRuntime) -> CraftResult<Session> {
        use std::process::Stdio;

        self.ensure_stopped().await?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| CraftError::io(&self.dir, e))?;

        let fifo = self.fifo_path();
        remove_path(&fifo).await?;
        make_fifo(&fifo)?;
        // Read-write so the server never sees EOF between attached clients
        let stdin = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&fifo)
            .map_err(|e| CraftError::io(&fifo, e))?;

        let log = self.log_path();
        let stdout = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log)
            .map_err(|e| CraftError::io(&log, e))?;
        let stderr = stdout.try_clone().map_err(|e| CraftError::io(&log, e))?;

        let mut cmd = super::task::build_command(config, java);
        cmd.stdin(Stdio::from(stdin))
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .process_group(0);
        debug!("Command: {:?}", cmd);

        let child = cmd
            .spawn()
            .map_err(|e| CraftError::JavaExecution(e.to_string()))?;
        let pid = child
            .id()
            .ok_or_else(|| CraftError::JavaExecution("server exited immediately".into()))?;

        let session = Session {
            pid,
            java: java.binary.clone(),
            started: Utc::now(),
        };
        self.save_session(&session).await?;
        info!("Started detached server with pid {}", pid);
        Ok(session)
    }

    #[cfg(not(unix))]
    pub async fn start(&self, _config: &Config, _java: &InstalledRuntime) -> CraftResult<Session> {
        Err(unsupported())
    }

    /// Write one console command to the server's stdin.
    #[cfg(unix)]
    pub async fn send(&self, line: &str) -> CraftResult<()> {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;

        let fifo = self.fifo_path();
        let mut pipe = std::fs::OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&fifo)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => CraftError::ServerNotRunning,
                _ => CraftError::io(&fifo, e),
            })?;
        pipe.write_all(format!("{line}\n").as_bytes())
            .map_err(|e| CraftError::io(&fifo, e))
    }

    #[cfg(not(unix))]
    pub async fn send(&self, _line: &str) -> CraftResult<()> {
        Err(unsupported())
    }

    /// Send `stop`, wait up to [`STOP_TIMEOUT`], then kill.
    pub async fn stop(&self) -> CraftResult<ProcessInfo> {
        let Some(session) = self.session().await? else {
            return Err(CraftError::ServerNotRunning);
        };
        let Some(info) = inspect(&session) else {
            self.clear().await?;
            return Err(CraftError::ServerNotRunning);
        };

        info!("Stopping detached server {}", info.pid);
        if let Err(e) = self.send("stop").await {
            warn!("Could not send stop command: {}", e);
        }

        let stopped = tokio::time::timeout(STOP_TIMEOUT, async {
            while inspect(&session).is_some() {
                tokio::time::sleep(STOP_POLL).await;
            }
        })
        .await;
        if stopped.is_err() {
            warn!("Server did not stop within {:?}, killing it", STOP_TIMEOUT);
            kill(session.pid);
        }

        self.clear().await?;
        Ok(info)
    }

    /// Follow the console and forward stdin lines until Ctrl-C, end of
    /// input or server exit.
    pub async fn attach(&self) -> CraftResult<()> {
        let Some(session) = self.session().await? else {
            return Err(CraftError::ServerNotRunning);
        };
        if inspect(&session).is_none() {
            self.clear().await?;
            return Err(CraftError::ServerNotRunning);
        }

        let mut tail = ConsoleTail::open(&self.log_path(), ATTACH_BACKLOG).await?;
        let mut input = BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = tokio::io::stdout();
        let mut output_tick = tokio::time::interval(POLL_INTERVAL);
        let mut liveness_tick = tokio::time::interval(LIVENESS_INTERVAL);

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => return Ok(()),
                line = input.next_line() => match line? {
                    Some(line) => self.send(&line).await?,
                    None => return Ok(()),
                },
                _ = output_tick.tick() => {
                    let chunk = tail.read_new().await?;
                    if !chunk.is_empty() {
                        stdout.write_all(&chunk).await?;
                        stdout.flush().await?;
                    }
                }
                _ = liveness_tick.tick() => {
                    if inspect(&session).is_none() {
                        let chunk = tail.read_new().await?;
                        stdout.write_all(&chunk).await?;
                        stdout.flush().await?;
                        self.clear().await?;
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// Incremental reader over an append-only log.
pub struct ConsoleTail {
    path: PathBuf,
    file: tokio::fs::File,
}

impl ConsoleTail {
    /// Open `path` positioned `backlog` bytes before its end.
    pub async fn open(path: &Path, backlog: u64) -> CraftResult<Self> {
        let mut file = tokio::fs::File::open(path)
            .await
            .map_err(|e| CraftError::io(path, e))?;
        let len = file
            .metadata()
            .await
            .map_err(|e| CraftError::io(path, e))?
            .len();
        file.seek(SeekFrom::Start(len.saturating_sub(backlog)))
            .await
            .map_err(|e| CraftError::io(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Bytes appended since the last read.
    pub async fn read_new(&mut self) -> CraftResult<Vec<u8>> {
        let mut chunk = Vec::new();
        self.file
            .read_to_end(&mut chunk)
            .await
            .map_err(|e| CraftError::io(&self.path, e))?;
        Ok(chunk)
    }
}

/// The session's process, if it is still a live Java process.
fn inspect(session: &Session) -> Option<ProcessInfo> {
    let system = System::new_all();
    let process = system.process(Pid::from_u32(session.pid))?;
    if matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead) {
        return None;
    }

    let is_server = process.exe().is_some_and(|exe| exe == session.java)
        || process.name().to_string_lossy().contains("java");
    if !is_server {
        return None;
    }

    let started = i64::try_from(process.start_time())
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or(session.started);
    Some(ProcessInfo {
        pid: session.pid,
        memory: process.memory(),
        started,
    })
}

fn kill(pid: u32) {
    let system = System::new_all();
    match system.process(Pid::from_u32(pid)) {
        Some(process) => {
            if !process.kill() {
                warn!("Could not kill server process {}", pid);
            }
        }
        None => debug!("Server process {} already gone", pid),
    }
}

#[cfg(unix)]
fn make_fifo(path: &Path) -> CraftResult<()> {
    use std::os::unix::ffi::OsStrExt;

    let c_path = std::ffi::CString::new(path.as_os_str().as_bytes())
        .map_err(|_| CraftError::InvalidArgument(format!("path {:?} contains NUL", path)))?;
    // SAFETY: `c_path` is a valid NUL-terminated string for the duration of the call.
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) };
    if rc == 0 {
        Ok(())
    } else {
        Err(CraftError::io(path, std::io::Error::last_os_error()))
    }
}

#[cfg(not(unix))]
fn unsupported() -> CraftError {
    CraftError::InvalidArgument("detached mode needs a unix host".into())
}
