use craftctl_lib::core::backup::{BackupFormat, BackupStore};
use craftctl_lib::core::config::Config;
use craftctl_lib::core::error::CraftError;
use tempfile::tempdir;

fn seed_installation(root: &std::path::Path) {
    std::fs::create_dir_all(root.join("world/region")).unwrap();
    std::fs::create_dir_all(root.join("plugins/empty")).unwrap();
    std::fs::write(root.join("world/region/r.0.0.mca"), b"region bytes").unwrap();
    std::fs::write(root.join("server.properties"), "motd=before").unwrap();
    std::fs::create_dir_all(root.join(".craftctl.profiles/creative")).unwrap();
    std::fs::write(root.join(".craftctl.profiles/creative/marker"), "profile").unwrap();
}

#[tokio::test]
async fn every_format_restores_the_snapshot() {
    for format in [
        BackupFormat::Zip,
        BackupFormat::Tar,
        BackupFormat::TarGz,
        BackupFormat::TarXz,
    ] {
        let dir = tempdir().unwrap();
        let root = dir.path();
        Config::create(root, "default").await.unwrap();
        seed_installation(root);

        let store = BackupStore::new(root);
        let backup = store.create("before-update", format).await.unwrap();
        assert_eq!(backup.format, format);
        assert!(backup.size > 0);
        assert!(backup
            .path
            .to_string_lossy()
            .ends_with(&format!("before-update.{}", format.extension())));

        std::fs::write(root.join("server.properties"), "motd=after").unwrap();
        std::fs::write(root.join("added-later.txt"), "new").unwrap();
        std::fs::remove_dir_all(root.join("world")).unwrap();

        store.restore("before-update").await.unwrap();

        assert_eq!(
            std::fs::read_to_string(root.join("server.properties")).unwrap(),
            "motd=before",
            "{format}"
        );
        assert_eq!(
            std::fs::read(root.join("world/region/r.0.0.mca")).unwrap(),
            b"region bytes"
        );
        assert!(root.join("plugins/empty").is_dir(), "{format}");
        assert!(!root.join("added-later.txt").exists(), "{format}");
        assert!(root.join(".craftctl.profiles/creative/marker").exists());
        assert!(Config::load(root).await.is_ok());
        assert_eq!(store.list().await.unwrap().len(), 1, "{format}");
    }
}

#[tokio::test]
async fn backups_are_not_nested_into_later_backups() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    seed_installation(root);
    let store = BackupStore::new(root);

    let first = store.create("first", BackupFormat::Tar).await.unwrap();
    let second = store.create("second", BackupFormat::Tar).await.unwrap();

    let entries: Vec<String> = tar::Archive::new(std::fs::File::open(&second.path).unwrap())
        .entries()
        .unwrap()
        .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
        .collect();
    assert!(entries.iter().all(|p| !p.starts_with(".craftctl")));
    assert!(entries.iter().any(|p| p == "server.properties"));
    assert!(first.path.exists());
}

#[tokio::test]
async fn duplicate_names_are_refused_across_formats() {
    let dir = tempdir().unwrap();
    seed_installation(dir.path());
    let store = BackupStore::new(dir.path());

    store.create("nightly", BackupFormat::Zip).await.unwrap();
    let err = store
        .create("nightly", BackupFormat::TarGz)
        .await
        .unwrap_err();
    assert!(matches!(err, CraftError::BackupExists(name) if name == "nightly"));
}

#[tokio::test]
async fn delete_removes_only_the_named_archive() {
    let dir = tempdir().unwrap();
    seed_installation(dir.path());
    let store = BackupStore::new(dir.path());

    store.create("a", BackupFormat::Zip).await.unwrap();
    store.create("b", BackupFormat::TarXz).await.unwrap();
    let deleted = store.delete("a").await.unwrap();

    assert!(!deleted.path.exists());
    let left: Vec<_> = store
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|b| b.name)
        .collect();
    assert_eq!(left, vec!["b"]);
    assert!(matches!(
        store.restore("a").await.unwrap_err(),
        CraftError::BackupNotFound(_)
    ));
}
