#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use craftctl_lib::core::api::mcjars::{
    Build, BuildIndex, BuildMatch, MinecraftVersion, ServerType,
};
use craftctl_lib::core::api::modrinth::{
    Dependency, DependencyType, FileHashes, ModRegistry, Project, SearchHit, Version, VersionFile,
    VersionFilter,
};
use craftctl_lib::core::downloader::client::sha1_hex;
use craftctl_lib::core::downloader::{Downloader, Transport};
use craftctl_lib::core::error::{CraftError, CraftResult};
use craftctl_lib::core::install::InstallationStep;

// ── Transport ───────────────────────────────────────

/// In-memory transport. Unknown URLs answer 404.
#[derive(Default)]
pub struct FakeTransport {
    bodies: Mutex<HashMap<String, Vec<u8>>>,
    delays: Mutex<HashMap<String, Duration>>,
    fetched: Mutex<Vec<String>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(&self, url: &str, body: impl Into<Vec<u8>>) {
        self.bodies.lock().unwrap().insert(url.to_string(), body.into());
    }

    pub fn delay(&self, url: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(url.to_string(), delay);
    }

    /// URLs in the order their fetches completed.
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn fetch(&self, url: &str) -> CraftResult<Vec<u8>> {
        let delay = self.delays.lock().unwrap().get(url).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.fetched.lock().unwrap().push(url.to_string());

        self.bodies
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| CraftError::DownloadFailed {
                url: url.to_string(),
                status: 404,
            })
    }
}

pub fn downloader(transport: &Arc<FakeTransport>) -> Downloader {
    Downloader::new(transport.clone())
}

// ── Build index ─────────────────────────────────────

#[derive(Default)]
pub struct FakeBuildIndex {
    pub builds: Mutex<HashMap<(ServerType, String), Vec<Build>>>,
    pub matches: Mutex<HashMap<String, BuildMatch>>,
    pub fail_lookups: Mutex<bool>,
    pub lookups: AtomicUsize,
    pub build_queries: AtomicUsize,
}

impl FakeBuildIndex {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_builds(&self, server_type: ServerType, minecraft: &str, builds: Vec<Build>) {
        self.builds
            .lock()
            .unwrap()
            .insert((server_type, minecraft.to_string()), builds);
    }

    pub fn add_match(&self, sha512: &str, found: BuildMatch) {
        self.matches.lock().unwrap().insert(sha512.to_string(), found);
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BuildIndex for FakeBuildIndex {
    async fn list_types(&self) -> CraftResult<Vec<ServerType>> {
        let mut types: Vec<ServerType> =
            self.builds.lock().unwrap().keys().map(|(t, _)| *t).collect();
        types.dedup();
        Ok(types)
    }

    async fn list_minecraft_versions(
        &self,
        server_type: ServerType,
    ) -> CraftResult<Vec<MinecraftVersion>> {
        let builds = self.builds.lock().unwrap();
        let mut versions: Vec<MinecraftVersion> = builds
            .iter()
            .filter(|((t, _), list)| *t == server_type && !list.is_empty())
            .map(|((_, mc), list)| MinecraftVersion {
                version: mc.clone(),
                java: 21,
                latest: list[0].clone(),
            })
            .collect();
        versions.sort_by(|a, b| a.version.cmp(&b.version));
        Ok(versions)
    }

    async fn list_builds(
        &self,
        server_type: ServerType,
        minecraft_version: &str,
    ) -> CraftResult<Vec<Build>> {
        self.build_queries.fetch_add(1, Ordering::SeqCst);
        self.builds
            .lock()
            .unwrap()
            .get(&(server_type, minecraft_version.to_string()))
            .cloned()
            .ok_or_else(|| CraftError::NotFound(format!("{server_type} {minecraft_version}")))
    }

    async fn lookup_hash(&self, sha512: &str) -> CraftResult<Option<BuildMatch>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if *self.fail_lookups.lock().unwrap() {
            return Err(CraftError::DownloadFailed {
                url: "/api/v2/build".into(),
                status: 503,
            });
        }
        Ok(self.matches.lock().unwrap().get(sha512).cloned())
    }
}

pub fn build(
    id: u64,
    server_type: ServerType,
    build_number: u64,
    project_version: Option<&str>,
) -> Build {
    Build {
        id,
        server_type,
        build_number,
        name: format!("build {id}"),
        version_id: Some("1.21.1".to_string()),
        project_version_id: project_version.map(str::to_string),
        installation: Vec::new(),
    }
}

// ── Registry ────────────────────────────────────────

#[derive(Default)]
pub struct FakeRegistry {
    pub projects: Mutex<HashMap<String, Project>>,
    pub versions: Mutex<Vec<Version>>,
    pub hashes: Mutex<HashMap<String, String>>,
    pub version_requests: Mutex<Vec<String>>,
}

impl FakeRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_project(&self, id: &str, project_type: &str) {
        self.projects.lock().unwrap().insert(
            id.to_string(),
            Project {
                id: id.to_string(),
                slug: id.to_string(),
                title: id.to_string(),
                project_type: project_type.to_string(),
                server_side: "required".to_string(),
                license: None,
            },
        );
    }

    /// Register a version (newest last) and index its files by SHA-1.
    pub fn add_version(&self, version: Version) {
        let mut hashes = self.hashes.lock().unwrap();
        for file in &version.files {
            hashes.insert(file.hashes.sha1.clone(), version.id.clone());
        }
        self.versions.lock().unwrap().push(version);
    }
}

#[async_trait]
impl ModRegistry for FakeRegistry {
    async fn project(&self, id: &str) -> CraftResult<Project> {
        self.projects
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| CraftError::NotFound(format!("project {id}")))
    }

    async fn project_versions(&self, id: &str, filter: &VersionFilter) -> CraftResult<Vec<Version>> {
        let mut versions: Vec<Version> = self
            .versions
            .lock()
            .unwrap()
            .iter()
            .filter(|v| v.project_id == id && filter.matches(v))
            .cloned()
            .collect();
        versions.reverse();
        Ok(versions)
    }

    async fn version(&self, id: &str) -> CraftResult<Version> {
        self.version_requests.lock().unwrap().push(id.to_string());
        self.versions
            .lock()
            .unwrap()
            .iter()
            .find(|v| v.id == id)
            .cloned()
            .ok_or_else(|| CraftError::NotFound(format!("version {id}")))
    }

    async fn version_from_hash(&self, sha1: &str) -> CraftResult<Option<Version>> {
        let id = self.hashes.lock().unwrap().get(sha1).cloned();
        match id {
            Some(id) => self.version(&id).await.map(Some),
            None => Ok(None),
        }
    }

    async fn search(&self, query: &str, _facets: &[Vec<String>]) -> CraftResult<Vec<SearchHit>> {
        Ok(self
            .projects
            .lock()
            .unwrap()
            .values()
            .filter(|p| p.title.contains(query))
            .map(|p| SearchHit {
                project_id: p.id.clone(),
                slug: p.slug.clone(),
                title: p.title.clone(),
                description: String::new(),
                downloads: 0,
                author: "tester".into(),
            })
            .collect())
    }
}

/// A fabric 1.21.1 version with one primary file served by `transport`.
pub fn mod_version(
    transport: &FakeTransport,
    project_id: &str,
    version_id: &str,
    body: &[u8],
    required: &[&str],
) -> Version {
    let url = format!("https://cdn.test/{project_id}/{version_id}.jar");
    transport.serve(&url, body.to_vec());
    Version {
        id: version_id.to_string(),
        project_id: project_id.to_string(),
        name: version_id.to_string(),
        version_number: version_id.to_string(),
        game_versions: vec!["1.21.1".into()],
        loaders: vec!["fabric".into()],
        files: vec![VersionFile {
            url,
            filename: format!("{project_id}-{version_id}.jar"),
            primary: true,
            size: body.len() as u64,
            hashes: FileHashes {
                sha1: sha1_hex(body),
                sha512: String::new(),
            },
        }],
        dependencies: required
            .iter()
            .map(|id| Dependency {
                project_id: Some(id.to_string()),
                version_id: None,
                dependency_type: DependencyType::Required,
            })
            .collect(),
    }
}

// ── Archives ────────────────────────────────────────

pub fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        for (name, body) in entries {
            writer
                .start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }
    cursor.into_inner()
}

pub fn download(file: &str, url: &str) -> InstallationStep {
    InstallationStep::Download {
        file: file.to_string(),
        url: url.to_string(),
        size: 0,
    }
}

pub fn unzip(file: &str, location: &str) -> InstallationStep {
    InstallationStep::Unzip {
        file: file.to_string(),
        location: location.to_string(),
    }
}

pub fn remove(location: &str) -> InstallationStep {
    InstallationStep::Remove {
        location: location.to_string(),
    }
}
