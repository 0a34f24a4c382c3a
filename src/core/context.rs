// ─── App Context ───
// Everything a command needs, built once per invocation and passed down
// explicitly. The installation root is a value here, never the process cwd.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::Client;
use tracing::debug;

use crate::core::api::adoptium::AdoptiumClient;
use crate::core::api::mojang::MojangClient;
use crate::core::api::{ApiEndpoints, BuildIndex, McjarsClient, ModRegistry, ModrinthClient};
use crate::core::cache::Cache;
use crate::core::config::Config;
use crate::core::downloader::{Downloader, HttpTransport, Transport};
use crate::core::error::CraftResult;
use crate::core::http::build_http_client;
use crate::core::install::Installer;
use crate::core::jar::{self, JarIdentity};
use crate::core::java::JavaManager;
use crate::core::paths::DataPaths;
use crate::core::profile::ProfileManager;

pub struct AppContext {
    pub paths: DataPaths,
    /// Installation root the command operates on.
    pub root: PathBuf,
    pub cache: Cache,
    pub http: Client,
    pub endpoints: ApiEndpoints,
    pub downloader: Downloader,
    pub build_index: Arc<dyn BuildIndex>,
    pub registry: Arc<dyn ModRegistry>,
}

impl AppContext {
    /// Production wiring: real HTTP clients, endpoints from the environment.
    pub async fn new(root: impl Into<PathBuf>, paths: DataPaths) -> CraftResult<Self> {
        let http = build_http_client()?;
        let endpoints = ApiEndpoints::from_env();
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(http.clone()));
        let build_index: Arc<dyn BuildIndex> =
            Arc::new(McjarsClient::new(http.clone(), endpoints.mcjars.clone()));
        let registry: Arc<dyn ModRegistry> =
            Arc::new(ModrinthClient::new(http.clone(), endpoints.modrinth.clone()));

        Self::with_services(root, paths, http, endpoints, transport, build_index, registry).await
    }

    /// Wiring with caller-provided services; tests pass in fakes.
    pub async fn with_services(
        root: impl Into<PathBuf>,
        paths: DataPaths,
        http: Client,
        endpoints: ApiEndpoints,
        transport: Arc<dyn Transport>,
        build_index: Arc<dyn BuildIndex>,
        registry: Arc<dyn ModRegistry>,
    ) -> CraftResult<Self> {
        let root = root.into();
        let cache = Cache::open(paths.cache_dir()).await?;
        debug!("Context: root={:?} home={:?}", root, paths.home());

        Ok(Self {
            paths,
            root,
            cache,
            http,
            endpoints,
            downloader: Downloader::new(transport),
            build_index,
            registry,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn load_config(&self, profile: Option<&str>) -> CraftResult<Config> {
        Config::load_profile(&self.root, profile).await
    }

    pub fn installer(&self) -> Installer {
        Installer::new(self.downloader.clone())
    }

    pub fn profiles(&self) -> ProfileManager {
        ProfileManager::new(&self.root)
    }

    pub fn java(&self) -> JavaManager {
        JavaManager::new(
            self.paths.java_dir(),
            AdoptiumClient::new(self.http.clone(), self.endpoints.adoptium.clone()),
            self.downloader.clone(),
        )
    }

    pub fn mojang(&self) -> MojangClient {
        MojangClient::new(
            self.http.clone(),
            self.endpoints.mojang_api.clone(),
            self.endpoints.mojang_session.clone(),
        )
    }

    /// Identity of the jar `config` points at.
    pub async fn identify(&self, config: &Config) -> JarIdentity {
        jar::resolve(&config.jar_path(), &self.cache, self.build_index.as_ref()).await
    }
}
