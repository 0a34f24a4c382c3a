mod common;

use common::{build, download, zip_bytes, FakeBuildIndex, FakeRegistry, FakeTransport};
use craftctl_lib::core::api::mcjars::ServerType;
use craftctl_lib::core::api::modrinth::{FileHashes, Version, VersionFile};
use craftctl_lib::core::config::Config;
use craftctl_lib::core::downloader::client::sha1_hex;
use craftctl_lib::core::error::CraftError;
use craftctl_lib::core::modpack::{ModpackInstaller, ModpackPhase};
use serde_json::json;
use tempfile::tempdir;

/// Publish an `.mrpack` as the primary file of `version_id`.
fn publish_pack(
    transport: &FakeTransport,
    registry: &FakeRegistry,
    version_id: &str,
    index: serde_json::Value,
    overrides: &[(&str, &str)],
) {
    let index = serde_json::to_string(&index).unwrap();
    let mut entries = vec![("modrinth.index.json", index.as_str())];
    entries.extend_from_slice(overrides);
    let archive = zip_bytes(&entries);

    let url = format!("https://cdn.test/packs/{version_id}.mrpack");
    transport.serve(&url, archive.clone());
    registry.add_version(Version {
        id: version_id.to_string(),
        project_id: "pack".into(),
        name: version_id.to_string(),
        version_number: version_id.to_string(),
        game_versions: vec!["1.21.1".into()],
        loaders: vec!["fabric".into()],
        files: vec![VersionFile {
            url,
            filename: format!("{version_id}.mrpack"),
            primary: true,
            size: archive.len() as u64,
            hashes: FileHashes {
                sha1: sha1_hex(&archive),
                sha512: String::new(),
            },
        }],
        dependencies: Vec::new(),
    });
}

fn pack_index(files: serde_json::Value) -> serde_json::Value {
    json!({
        "formatVersion": 1,
        "game": "minecraft",
        "versionId": "2.0.0",
        "name": "Test Pack",
        "files": files,
        "dependencies": {"minecraft": "1.21.1", "fabric-loader": "0.16.10"}
    })
}

fn leftover_archives(root: &std::path::Path) -> usize {
    std::fs::read_dir(root)
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().ends_with(".mrpack"))
        .count()
}

#[tokio::test]
async fn stale_files_removed_even_when_target_is_unsupported() {
    let dir = tempdir().unwrap();
    let mut config = Config::create(dir.path(), "default").await.unwrap();
    std::fs::create_dir_all(dir.path().join("mods")).unwrap();
    std::fs::create_dir_all(dir.path().join("config")).unwrap();
    std::fs::write(dir.path().join("mods/old.jar"), b"old mod").unwrap();
    std::fs::write(dir.path().join("config/old.yml"), b"a: 1").unwrap();
    std::fs::write(dir.path().join("config/keep.yml"), b"b: 2").unwrap();

    let transport = FakeTransport::new();
    let registry = FakeRegistry::new();
    publish_pack(
        &transport,
        &registry,
        "v1",
        pack_index(json!([{
            "path": "mods/old.jar",
            "downloads": ["https://cdn.test/old.jar"],
            "hashes": {"sha1": "00"}
        }])),
        &[("overrides/config/old.yml", "a: 1")],
    );
    publish_pack(&transport, &registry, "v2", pack_index(json!([])), &[]);
    // No fabric builds for 1.21.1
    let index = FakeBuildIndex::new();

    let mut installer =
        ModpackInstaller::new(registry.as_ref(), index.as_ref(), common::downloader(&transport));
    let err = installer
        .install("test-pack", Some("v1"), "v2", &mut config)
        .await
        .unwrap_err();

    assert!(matches!(err, CraftError::UnsupportedModpack { .. }));
    assert!(!dir.path().join("mods/old.jar").exists());
    assert!(!dir.path().join("config/old.yml").exists());
    assert!(dir.path().join("config/keep.yml").exists());
    assert_eq!(leftover_archives(dir.path()), 0);

    let reloaded = Config::load(dir.path()).await.unwrap();
    assert_eq!(reloaded.modpack_version, None);
}

#[tokio::test]
async fn unreadable_previous_version_does_not_block_install() {
    let dir = tempdir().unwrap();
    let mut config = Config::create(dir.path(), "default").await.unwrap();

    let transport = FakeTransport::new();
    transport.serve("https://cdn.test/fabric.jar", b"fabric".to_vec());
    let registry = FakeRegistry::new();
    publish_pack(&transport, &registry, "v2", pack_index(json!([])), &[]);

    let index = FakeBuildIndex::new();
    let mut fabric = build(5, ServerType::Fabric, 1, Some("0.16.10"));
    fabric.installation = vec![vec![download("server.jar", "https://cdn.test/fabric.jar")]];
    index.add_builds(ServerType::Fabric, "1.21.1", vec![fabric]);

    let mut installer =
        ModpackInstaller::new(registry.as_ref(), index.as_ref(), common::downloader(&transport));
    let outcome = installer
        .install("test-pack", Some("gone"), "v2", &mut config)
        .await
        .unwrap();

    assert_eq!(outcome.stale_failures.len(), 1);
    assert_eq!(installer.phase(), ModpackPhase::Done);
}

#[tokio::test]
async fn installs_server_files_overrides_and_links_config() {
    let dir = tempdir().unwrap();
    let mut config = Config::create(dir.path(), "default").await.unwrap();

    let transport = FakeTransport::new();
    transport.serve("https://cdn.test/fabric-new.jar", b"fabric 0.16.10".to_vec());
    transport.serve("https://cdn.test/fabric-old.jar", b"fabric 0.15.0".to_vec());
    transport.serve("https://cdn.test/lithium.jar", b"lithium".to_vec());
    transport.serve("https://cdn.test/sodium.jar", b"sodium".to_vec());

    let registry = FakeRegistry::new();
    publish_pack(
        &transport,
        &registry,
        "v2",
        pack_index(json!([
            {
                "path": "mods/lithium.jar",
                "downloads": ["https://cdn.test/lithium.jar"],
                "hashes": {"sha1": sha1_hex(b"lithium")},
                "env": {"client": "required", "server": "required"}
            },
            {
                "path": "mods/sodium.jar",
                "downloads": ["https://cdn.test/sodium.jar"],
                "env": {"client": "required", "server": "unsupported"}
            }
        ])),
        &[
            ("overrides/config/pack.toml", "shared"),
            ("server-overrides/server.properties", "motd=pack"),
        ],
    );

    let index = FakeBuildIndex::new();
    let mut newest = build(9, ServerType::Fabric, 2, Some("0.16.11"));
    newest.installation = vec![vec![download("server.jar", "https://cdn.test/fabric-old.jar")]];
    let mut declared = build(8, ServerType::Fabric, 1, Some("0.16.10"));
    declared.installation = vec![vec![download("server.jar", "https://cdn.test/fabric-new.jar")]];
    index.add_builds(ServerType::Fabric, "1.21.1", vec![newest, declared]);

    let mut installer =
        ModpackInstaller::new(registry.as_ref(), index.as_ref(), common::downloader(&transport));
    let outcome = installer
        .install("test-pack", None, "v2", &mut config)
        .await
        .unwrap();

    assert_eq!(outcome.build.id, 8);
    assert_eq!(outcome.files_downloaded, 1);
    let read = |rel: &str| std::fs::read_to_string(dir.path().join(rel)).unwrap();
    assert_eq!(read("server.jar"), "fabric 0.16.10");
    assert_eq!(read("mods/lithium.jar"), "lithium");
    assert!(!dir.path().join("mods/sodium.jar").exists());
    assert_eq!(read("config/pack.toml"), "shared");
    assert_eq!(read("server.properties"), "motd=pack");
    assert_eq!(leftover_archives(dir.path()), 0);

    let reloaded = Config::load(dir.path()).await.unwrap();
    assert_eq!(reloaded.modpack_slug.as_deref(), Some("test-pack"));
    assert_eq!(reloaded.modpack_version.as_deref(), Some("v2"));
}

#[tokio::test]
async fn one_failed_file_fails_install_after_the_rest_settle() {
    let dir = tempdir().unwrap();
    let mut config = Config::create(dir.path(), "default").await.unwrap();

    let transport = FakeTransport::new();
    transport.serve("https://cdn.test/fabric.jar", b"fabric".to_vec());
    let mut files = Vec::new();
    for n in 0..12 {
        let url = format!("https://cdn.test/mod{n}.jar");
        transport.serve(&url, format!("mod {n}").into_bytes());
        files.push(json!({"path": format!("mods/mod{n}.jar"), "downloads": [url]}));
    }
    files.push(json!({"path": "mods/gone.jar", "downloads": ["https://cdn.test/gone.jar"]}));

    let registry = FakeRegistry::new();
    publish_pack(&transport, &registry, "v2", pack_index(json!(files)), &[]);
    let index = FakeBuildIndex::new();
    let mut fabric = build(5, ServerType::Fabric, 1, Some("0.16.10"));
    fabric.installation = vec![vec![download("server.jar", "https://cdn.test/fabric.jar")]];
    index.add_builds(ServerType::Fabric, "1.21.1", vec![fabric]);

    let mut installer =
        ModpackInstaller::new(registry.as_ref(), index.as_ref(), common::downloader(&transport));
    let err = installer
        .install("test-pack", None, "v2", &mut config)
        .await
        .unwrap_err();

    assert!(matches!(err, CraftError::UnsupportedModpack { .. }));
    for n in 0..12 {
        assert!(dir.path().join(format!("mods/mod{n}.jar")).exists());
    }
    assert_eq!(leftover_archives(dir.path()), 0);
}
