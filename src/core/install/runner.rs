// ─── Segment Runner ───
// Executes installation scripts: segments strictly in order, downloads of a
// segment all settled before its unzip/remove steps, those run together.

use std::path::{Component, Path, PathBuf};

use futures_util::future::join_all;
use tracing::{debug, info, instrument};

use super::archive;
use super::step::{InstallationStep, Segment};
use crate::core::config::model::DEFAULT_JAR_FILE;
use crate::core::config::Config;
use crate::core::downloader::Downloader;
use crate::core::error::{CraftError, CraftResult, RecoverableFailure};

/// What a successful run tolerated along the way.
#[derive(Debug, Default)]
pub struct InstallOutcome {
    /// Unzip/remove steps that failed without aborting their segment.
    pub recovered: Vec<RecoverableFailure>,
}

impl InstallOutcome {
    pub fn is_clean(&self) -> bool {
        self.recovered.is_empty()
    }
}

pub struct Installer {
    downloader: Downloader,
}

impl Installer {
    pub fn new(downloader: Downloader) -> Self {
        Self { downloader }
    }

    /// Materialize a build for `config` and point the config at its jar.
    ///
    /// Steps resolve against the directory holding the configured jar. On
    /// success the jar becomes `server.jar` in that directory and the config
    /// is saved. A failed run leaves earlier segments in place.
    #[instrument(skip_all, fields(segments = script.len()))]
    pub async fn run(&self, script: &[Segment], config: &mut Config) -> CraftResult<InstallOutcome> {
        let jar_dir = config.jar_dir();
        let outcome = self.run_in(script, &jar_dir).await?;

        let canonical = Path::new(&config.jar_file)
            .parent()
            .map(|parent| parent.join(DEFAULT_JAR_FILE))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_JAR_FILE));
        config.jar_file = canonical.to_string_lossy().replace('\\', "/");
        config.save().await?;

        info!(
            "Installed {} segments into {:?} ({} tolerated failures)",
            script.len(),
            jar_dir,
            outcome.recovered.len()
        );
        Ok(outcome)
    }

    /// Execute `script` against `root` without touching any config.
    pub async fn run_in(&self, script: &[Segment], root: &Path) -> CraftResult<InstallOutcome> {
        let mut outcome = InstallOutcome::default();
        for (index, segment) in script.iter().enumerate() {
            debug!("Segment {}/{}: {} steps", index + 1, script.len(), segment.len());
            self.run_segment(segment, root, &mut outcome).await?;
        }
        Ok(outcome)
    }

    async fn run_segment(
        &self,
        segment: &[InstallationStep],
        root: &Path,
        outcome: &mut InstallOutcome,
    ) -> CraftResult<()> {
        let (downloads, others): (Vec<_>, Vec<_>) =
            segment.iter().partition(|step| step.is_download());

        // ── Downloads: all in flight, all settled ──
        let download_results = join_all(downloads.iter().map(|step| self.apply(step, root))).await;

        // ── Unzip / remove: run even when a sibling download failed ──
        let other_results = join_all(others.iter().map(|step| self.apply(step, root))).await;
        for (step, result) in others.iter().zip(other_results) {
            if let Err(e) = result {
                outcome
                    .recovered
                    .push(RecoverableFailure::new(describe(step), e));
            }
        }

        match download_results.into_iter().find_map(Result::err) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn apply(&self, step: &InstallationStep, root: &Path) -> CraftResult<()> {
        match step {
            InstallationStep::Download { file, url, .. } => {
                let dest = resolve(root, file)?;
                self.downloader.download_file(url, &dest, None).await
            }
            InstallationStep::Unzip { file, location } => {
                let archive_path = resolve(root, file)?;
                let target = resolve(root, location)?;
                let written = archive::blocking(move || {
                    archive::extract_zip(&archive_path, "", &target)
                })
                .await?;
                debug!("Unzipped {} into {} ({} files)", file, location, written);
                Ok(())
            }
            InstallationStep::Remove { location } => {
                let target = resolve(root, location)?;
                remove_path(&target).await
            }
        }
    }
}

fn describe(step: &InstallationStep) -> String {
    match step {
        InstallationStep::Download { file, .. } => format!("download {file}"),
        InstallationStep::Unzip { file, location } => format!("unzip {file} -> {location}"),
        InstallationStep::Remove { location } => format!("remove {location}"),
    }
}

/// Join a script-relative path onto `root`, refusing anything that escapes it.
pub fn resolve(root: &Path, relative: &str) -> CraftResult<PathBuf> {
    let mut out = root.to_path_buf();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => {
                return Err(CraftError::InvalidArgument(format!(
                    "path '{relative}' escapes the installation root"
                )))
            }
        }
    }
    Ok(out)
}

/// Delete a file or directory tree. A missing path is not an error.
pub async fn remove_path(target: &Path) -> CraftResult<()> {
    let metadata = match tokio::fs::symlink_metadata(target).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(CraftError::io(target, e)),
    };

    let result = if metadata.is_dir() {
        tokio::fs::remove_dir_all(target).await
    } else {
        tokio::fs::remove_file(target).await
    };

    match result {
        Ok(()) => {
            debug!("Removed {:?}", target);
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CraftError::io(target, e)),
    }
}
