// ─── Launch Task ───
// Runs the server in the foreground and forwards Ctrl-C to it.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::core::config::Config;
use crate::core::downloader::Downloader;
use crate::core::error::{CraftError, CraftResult};
use crate::core::java::InstalledRuntime;

/// Time the server gets to stop after an interrupt before it is killed.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

const EULA_FILE: &str = "eula.txt";
const FORGE_WRAPPER_URL: &str = "https://s3.mcjars.app/forge/ForgeServerJAR.jar";
const NEOFORGE_WRAPPER_URL: &str = "https://s3.mcjars.app/neoforge/NeoForgeServerJAR.jar";

pub fn eula_accepted(root: &Path) -> bool {
    std::fs::read_to_string(root.join(EULA_FILE))
        .map(|content| content.lines().any(|line| line.trim() == "eula=true"))
        .unwrap_or(false)
}

pub async fn accept_eula(root: &Path) -> CraftResult<()> {
    let path = root.join(EULA_FILE);
    tokio::fs::write(&path, "eula=true\n")
        .await
        .map_err(|e| CraftError::io(&path, e))
}

/// Wrapper jar that boots a Forge/NeoForge library tree, if `jar_dir` has one.
pub fn loader_wrapper_url(jar_dir: &Path) -> Option<&'static str> {
    if jar_dir.join("libraries/net/minecraftforge/forge").is_dir() {
        Some(FORGE_WRAPPER_URL)
    } else if jar_dir.join("libraries/net/neoforged/neoforge").is_dir() {
        Some(NEOFORGE_WRAPPER_URL)
    } else {
        None
    }
}

/// Make sure the configured jar exists, fetching a loader wrapper if needed.
pub async fn ensure_server_jar(config: &Config, downloader: &Downloader) -> CraftResult<()> {
    let jar = config.jar_path();
    if jar.is_file() {
        return Ok(());
    }

    match loader_wrapper_url(&config.jar_dir()) {
        Some(url) => {
            info!("Fetching loader wrapper jar into {:?}", jar);
            downloader.download_file(url, &jar, None).await
        }
        None => Err(CraftError::NotFound(format!("server jar {:?}", jar))),
    }
}

/// JVM and server arguments, in order.
pub fn launch_args(config: &Config) -> Vec<String> {
    let mut args = config.extra_flags.clone();
    args.push(format!("-Xmx{}M", config.ram_mb));
    args.push("-jar".to_string());
    args.push(config.jar_file.clone());
    args.push("nogui".to_string());
    args.extend(config.extra_args.iter().cloned());
    args
}

pub fn build_command(config: &Config, java: &InstalledRuntime) -> Command {
    let mut cmd = Command::new(&java.binary);
    cmd.args(launch_args(config))
        .current_dir(config.root())
        .env("JAVA_HOME", &java.home)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    cmd
}

/// Run the server until it exits. Ctrl-C is forwarded, then the server is
/// killed if it is still running after [`SHUTDOWN_GRACE`].
pub async fn run_server(config: &Config, java: &InstalledRuntime) -> CraftResult<ExitStatus> {
    let mut cmd = build_command(config, java);
    info!("Starting server with Java {}: {:?}", java.major, java.binary);
    debug!("Command: {:?}", cmd);

    let mut child = cmd
        .spawn()
        .map_err(|e| CraftError::JavaExecution(e.to_string()))?;

    tokio::select! {
        status = child.wait() => status.map_err(|e| CraftError::JavaExecution(e.to_string())),
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received, stopping server");
            forward_interrupt(&child);
            shutdown(child).await
        }
    }
}

async fn shutdown(mut child: Child) -> CraftResult<ExitStatus> {
    match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
        Ok(status) => status.map_err(|e| CraftError::JavaExecution(e.to_string())),
        Err(_) => {
            warn!("Server did not stop within {:?}, killing it", SHUTDOWN_GRACE);
            child
                .start_kill()
                .map_err(|e| CraftError::JavaExecution(e.to_string()))?;
            child
                .wait()
                .await
                .map_err(|e| CraftError::JavaExecution(e.to_string()))
        }
    }
}

#[cfg(unix)]
fn forward_interrupt(child: &Child) {
    if let Some(pid) = child.id() {
        // SAFETY: plain signal delivery to a pid we spawned.
        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGINT) };
        if rc != 0 {
            warn!("Could not forward SIGINT to {}", pid);
        }
    }
}

#[cfg(not(unix))]
fn forward_interrupt(_child: &Child) {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn args_place_flags_before_jar_and_args_after() {
        let mut config = Config::new(Path::new("/srv/mc"), "default");
        config.ram_mb = 4096;
        config.extra_flags = vec!["-XX:+UseG1GC".into()];
        config.extra_args = vec!["--port".into(), "25566".into()];

        assert_eq!(
            launch_args(&config),
            vec!["-XX:+UseG1GC", "-Xmx4096M", "-jar", "server.jar", "nogui", "--port", "25566"]
        );
    }

    #[tokio::test]
    async fn eula_round_trip() {
        let dir = tempdir().unwrap();
        assert!(!eula_accepted(dir.path()));
        accept_eula(dir.path()).await.unwrap();
        assert!(eula_accepted(dir.path()));
    }

    #[test]
    fn wrapper_follows_library_tree() {
        let dir = tempdir().unwrap();
        assert!(loader_wrapper_url(dir.path()).is_none());
        std::fs::create_dir_all(dir.path().join("libraries/net/neoforged/neoforge")).unwrap();
        assert_eq!(loader_wrapper_url(dir.path()), Some(NEOFORGE_WRAPPER_URL));
    }
}
