// ─── Modpack Installer ───
// Idle → ResolvingManifest → RemovingStale → Installing → DownloadingOverrides → Done
//
// Stale removal only warns. Everything after it is terminal and surfaces as
// `UnsupportedModpack`.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::manifest::{self, ManifestFile, ModpackManifest};
use crate::core::api::mcjars::{Build, BuildIndex};
use crate::core::api::modrinth::ModRegistry;
use crate::core::config::Config;
use crate::core::downloader::{DownloadEntry, Downloader};
use crate::core::error::{CraftError, CraftResult, RecoverableFailure};
use crate::core::install::runner::{remove_path, resolve};
use crate::core::install::{InstallOutcome, Installer};

/// Manifest files in flight at once.
pub const FILE_BATCH_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModpackPhase {
    Idle,
    ResolvingManifest,
    RemovingStale,
    Installing,
    DownloadingOverrides,
    Done,
}

impl fmt::Display for ModpackPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ModpackPhase::Idle => "idle",
            ModpackPhase::ResolvingManifest => "resolving manifest",
            ModpackPhase::RemovingStale => "removing stale files",
            ModpackPhase::Installing => "installing",
            ModpackPhase::DownloadingOverrides => "downloading files and overrides",
            ModpackPhase::Done => "done",
        };
        f.write_str(label)
    }
}

#[derive(Debug)]
pub struct ModpackOutcome {
    pub build: Build,
    pub install: InstallOutcome,
    /// Stale paths that could not be removed.
    pub stale_failures: Vec<RecoverableFailure>,
    pub files_downloaded: usize,
}

pub struct ModpackInstaller<'a> {
    registry: &'a dyn ModRegistry,
    index: &'a dyn BuildIndex,
    downloader: Downloader,
    phase: ModpackPhase,
}

impl<'a> ModpackInstaller<'a> {
    pub fn new(
        registry: &'a dyn ModRegistry,
        index: &'a dyn BuildIndex,
        downloader: Downloader,
    ) -> Self {
        Self {
            registry,
            index,
            downloader,
            phase: ModpackPhase::Idle,
        }
    }

    pub fn phase(&self) -> ModpackPhase {
        self.phase
    }

    fn enter(&mut self, phase: ModpackPhase) {
        info!("Modpack: {} → {}", self.phase, phase);
        self.phase = phase;
    }

    /// Install `target_version` of `slug`, replacing `previous_version` if given.
    ///
    /// On success the config is linked to the new modpack version and saved.
    #[instrument(skip(self, config))]
    pub async fn install(
        &mut self,
        slug: &str,
        previous_version: Option<&str>,
        target_version: &str,
        config: &mut Config,
    ) -> CraftResult<ModpackOutcome> {
        let root = config.jar_dir();
        self.enter(ModpackPhase::ResolvingManifest);

        let mut stale_failures = Vec::new();
        if let Some(previous) = previous_version {
            self.enter(ModpackPhase::RemovingStale);
            stale_failures = self.remove_stale(previous, &root).await;
        }

        let archive = temp_archive_path(&root);
        let result = self.install_target(target_version, &archive, config).await;
        discard_archive(&archive).await;

        let (build, install, files_downloaded) =
            result.map_err(|e| CraftError::UnsupportedModpack {
                source: Box::new(e),
            })?;

        config.set_modpack(slug, target_version);
        config.save().await?;
        self.enter(ModpackPhase::Done);

        Ok(ModpackOutcome {
            build,
            install,
            stale_failures,
            files_downloaded,
        })
    }

    // ── Phase a: stale removal ──────────────────────────

    /// Delete everything the previous version put down. Never fails.
    async fn remove_stale(&self, previous: &str, root: &Path) -> Vec<RecoverableFailure> {
        let archive = temp_archive_path(root);
        let mut failures = Vec::new();

        match self.stale_paths(previous, &archive).await {
            Ok(paths) => {
                for relative in paths {
                    let outcome = match resolve(root, &relative) {
                        Ok(target) => remove_path(&target).await,
                        Err(e) => Err(e),
                    };
                    if let Err(e) = outcome {
                        failures.push(RecoverableFailure::new(format!("remove {relative}"), e));
                    }
                }
            }
            Err(e) => {
                failures.push(RecoverableFailure::new(
                    format!("read previous modpack version {previous}"),
                    e,
                ));
            }
        }

        discard_archive(&archive).await;
        failures
    }

    async fn stale_paths(&self, previous: &str, archive: &Path) -> CraftResult<Vec<String>> {
        let previous_manifest = self.fetch_manifest(previous, archive).await?;

        let mut paths: Vec<String> = previous_manifest
            .files
            .iter()
            .map(|f| f.path.clone())
            .collect();
        paths.extend(
            manifest::override_paths(archive)
                .await?
                .into_iter()
                .map(|p| p.to_string_lossy().replace('\\', "/")),
        );
        Ok(paths)
    }

    // ── Phase b: target install ─────────────────────────

    async fn install_target(
        &mut self,
        target_version: &str,
        archive: &Path,
        config: &mut Config,
    ) -> CraftResult<(Build, InstallOutcome, usize)> {
        let target = self.fetch_manifest(target_version, archive).await?;

        let (server_type, loader_version) = target.dependencies.loader();
        let minecraft = &target.dependencies.minecraft;
        let builds = self.index.list_builds(server_type, minecraft).await?;
        let build = select_build(builds, loader_version).ok_or_else(|| {
            CraftError::NotFound(format!("{server_type} build for Minecraft {minecraft}"))
        })?;

        self.enter(ModpackPhase::Installing);
        info!(
            "Installing {} {} ({}) for modpack {}",
            server_type,
            minecraft,
            build.jar_version_label(),
            target.name
        );
        let install = Installer::new(self.downloader.clone())
            .run(&build.installation, config)
            .await?;

        self.enter(ModpackPhase::DownloadingOverrides);
        let root = config.jar_dir();
        let files_downloaded = self.download_files(&target, &root).await?;
        let overrides = manifest::extract_overrides(archive, &root).await?;
        info!(
            "Downloaded {} modpack files, applied {} overrides",
            files_downloaded, overrides
        );

        Ok((build, install, files_downloaded))
    }

    async fn download_files(&self, manifest: &ModpackManifest, root: &Path) -> CraftResult<usize> {
        let files: Vec<_> = manifest.server_files().collect();
        let skipped = manifest.files.len() - files.len();
        if skipped > 0 {
            info!("Skipping {} client-only files", skipped);
        }

        let entries = files
            .iter()
            .map(|file| download_entry(file, root))
            .collect::<CraftResult<Vec<_>>>()?;
        let count = entries.len();

        let failed = self
            .downloader
            .clone()
            .with_concurrency(FILE_BATCH_SIZE)
            .download_batch(entries)
            .await;
        if let Some((entry, e)) = failed.into_iter().next() {
            warn!("Modpack file {} failed: {}", entry.url, e);
            return Err(e);
        }

        Ok(count)
    }

    /// Download a version's `.mrpack` to `archive` and read its index.
    async fn fetch_manifest(&self, version_id: &str, archive: &Path) -> CraftResult<ModpackManifest> {
        let version = self.registry.version(version_id).await?;
        let file = version
            .primary_file()
            .ok_or_else(|| CraftError::NotFound(format!("files of modpack version {version_id}")))?;

        self.downloader
            .download_file(&file.url, archive, Some(&file.hashes.sha1))
            .await?;
        ModpackManifest::from_archive(archive).await
    }
}

fn download_entry(file: &ManifestFile, root: &Path) -> CraftResult<DownloadEntry> {
    let dest = resolve(root, &file.path)?;
    let url = file
        .downloads
        .first()
        .ok_or_else(|| CraftError::NotFound(format!("download for {}", file.path)))?;
    Ok(DownloadEntry {
        url: url.clone(),
        dest,
        sha1: file.hashes.sha1.clone(),
    })
}

/// The build whose jar version label is `loader_version`, else the newest one.
pub fn select_build(builds: Vec<Build>, loader_version: Option<&str>) -> Option<Build> {
    if let Some(wanted) = loader_version {
        if let Some(exact) = builds
            .iter()
            .find(|b| b.jar_version_label() == wanted)
        {
            return Some(exact.clone());
        }
    }
    builds.into_iter().next()
}

fn temp_archive_path(root: &Path) -> PathBuf {
    root.join(format!(".craftctl-{}.mrpack", Uuid::new_v4()))
}

async fn discard_archive(archive: &Path) {
    if let Err(e) = remove_path(archive).await {
        warn!("Could not remove temporary archive {:?}: {}", archive, e);
    }
}
