#![cfg(unix)]

use std::path::Path;
use std::time::Duration;

use craftctl_lib::core::config::Config;
use craftctl_lib::core::error::CraftError;
use craftctl_lib::core::java::InstalledRuntime;
use craftctl_lib::core::launch::Detached;
use tempfile::tempdir;

/// Stand-in console: echoes each command and exits on `stop`.
const CONSOLE: &str =
    r#"while read line; do echo "got $line"; [ "$line" = stop ] && exit 0; done"#;

/// A copy of `/bin/sh` installed as `bin/java`, so the process looks like a
/// Java runtime to the OS.
fn fake_runtime(home: &Path) -> InstalledRuntime {
    std::fs::create_dir_all(home.join("bin")).unwrap();
    let binary = home.join("bin").join("java");
    std::fs::copy("/bin/sh", &binary).unwrap();
    InstalledRuntime {
        major: 21,
        home: home.to_path_buf(),
        binary,
    }
}

async fn wait_for_log(detached: &Detached, needle: &str) -> String {
    for _ in 0..100 {
        let log = std::fs::read_to_string(detached.log_path()).unwrap_or_default();
        if log.contains(needle) {
            return log;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("{needle:?} never reached the console log");
}

#[tokio::test]
async fn detached_server_takes_commands_and_stops() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("server");
    let mut config = Config::create(&root, "default").await.unwrap();
    // `sh -c CONSOLE java <jvm args...>`
    config.extra_flags = vec!["-c".into(), CONSOLE.into(), "java".into()];
    let java = fake_runtime(&dir.path().join("runtime"));

    let detached = Detached::new(&root);
    let session = detached.start(&config, &java).await.unwrap();

    let info = detached.running().await.unwrap().expect("server is running");
    assert_eq!(info.pid, session.pid);
    assert!(matches!(
        detached.start(&config, &java).await.unwrap_err(),
        CraftError::ServerRunning(pid) if pid == session.pid
    ));
    assert!(matches!(
        detached.ensure_stopped().await.unwrap_err(),
        CraftError::ServerRunning(_)
    ));

    detached.send("say hello").await.unwrap();
    wait_for_log(&detached, "got say hello").await;

    let stopped = detached.stop().await.unwrap();
    assert_eq!(stopped.pid, session.pid);
    assert!(detached.session().await.unwrap().is_none());
    assert!(detached.running().await.unwrap().is_none());

    let log = wait_for_log(&detached, "got stop").await;
    assert!(log.find("got say hello") < log.find("got stop"));
}

#[tokio::test]
async fn send_without_a_server_is_refused() {
    let dir = tempdir().unwrap();
    let detached = Detached::new(dir.path());
    assert!(matches!(
        detached.send("list").await.unwrap_err(),
        CraftError::ServerNotRunning
    ));
}
