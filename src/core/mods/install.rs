// ─── Mod Installer ───
// Install, uninstall and update mods in `<root>/mods`. Dependencies are
// resolved one at a time; their failures are recorded, not fatal.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::resolver::ModRecord;
use crate::core::api::modrinth::{Dependency, ModRegistry, Version, VersionFilter};
use crate::core::downloader::Downloader;
use crate::core::error::{CraftError, CraftResult, RecoverableFailure};
use crate::core::install::runner::remove_path;

/// Result of `ModInstaller::install`.
#[derive(Debug, Default)]
pub struct ModInstallReport {
    /// File names written to the mods directory, requested mod first.
    pub installed: Vec<String>,
    /// Dependencies that were already present.
    pub already_present: Vec<String>,
    pub failures: Vec<RecoverableFailure>,
}

pub struct ModInstaller<'a> {
    registry: &'a dyn ModRegistry,
    downloader: Downloader,
    filter: VersionFilter,
    mods_dir: PathBuf,
}

impl<'a> ModInstaller<'a> {
    pub fn new(
        registry: &'a dyn ModRegistry,
        downloader: Downloader,
        filter: VersionFilter,
        mods_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            registry,
            downloader,
            filter,
            mods_dir: mods_dir.into(),
        }
    }

    /// Install the newest compatible version of `project` and its required
    /// dependencies. `installed` is the current content of the mods directory.
    pub async fn install(&self, project: &str, installed: &[ModRecord]) -> CraftResult<ModInstallReport> {
        let version = self
            .registry
            .latest_compatible(project, &self.filter)
            .await?
            .ok_or_else(|| {
                CraftError::NotFound(format!(
                    "version of {project} for {:?} {:?}",
                    self.filter.loaders, self.filter.game_versions
                ))
            })?;

        let mut present: HashSet<String> = installed
            .iter()
            .filter_map(|r| r.project_id().map(str::to_string))
            .collect();
        if present.contains(&version.project_id) {
            return Err(CraftError::InvalidArgument(format!(
                "{project} is already installed"
            )));
        }

        let mut report = ModInstallReport::default();
        let file_name = self.download_version(&version).await?;
        report.installed.push(file_name);
        present.insert(version.project_id.clone());

        let mut queue: VecDeque<Dependency> = version.required_dependencies().cloned().collect();
        while let Some(dependency) = queue.pop_front() {
            let label = dependency_label(&dependency);
            if let Some(id) = &dependency.project_id {
                if present.contains(id) {
                    report.already_present.push(label);
                    continue;
                }
            }

            let version = match self.resolve_dependency(&dependency).await {
                Ok(version) => version,
                Err(e) => {
                    report
                        .failures
                        .push(RecoverableFailure::new(format!("dependency {label}"), e));
                    continue;
                }
            };
            if present.contains(&version.project_id) {
                report.already_present.push(label);
                continue;
            }

            match self.download_version(&version).await {
                Ok(file_name) => {
                    debug!("Installed dependency {} as {}", label, file_name);
                    present.insert(version.project_id.clone());
                    report.installed.push(file_name);
                    queue.extend(version.required_dependencies().cloned());
                }
                Err(e) => report
                    .failures
                    .push(RecoverableFailure::new(format!("dependency {label}"), e)),
            }
        }

        info!(
            "Installed {} files for {} ({} dependency failures)",
            report.installed.len(),
            project,
            report.failures.len()
        );
        Ok(report)
    }

    async fn resolve_dependency(&self, dependency: &Dependency) -> CraftResult<Version> {
        match (&dependency.version_id, &dependency.project_id) {
            (Some(version_id), _) => self.registry.version(version_id).await,
            (None, Some(project_id)) => self
                .registry
                .latest_compatible(project_id, &self.filter)
                .await?
                .ok_or_else(|| CraftError::NotFound(format!("compatible version of {project_id}"))),
            (None, None) => Err(CraftError::InvalidArgument(
                "dependency without project or version".into(),
            )),
        }
    }

    /// Download the primary file of `version` into the mods directory.
    async fn download_version(&self, version: &Version) -> CraftResult<String> {
        let file = version
            .primary_file()
            .ok_or_else(|| CraftError::NotFound(format!("files of version {}", version.id)))?;
        let dest = mod_path(&self.mods_dir, &file.filename)?;
        self.downloader
            .download_file(&file.url, &dest, Some(&file.hashes.sha1))
            .await?;
        Ok(file.filename.clone())
    }

    /// Replace every outdated mod with its newest compatible file.
    pub async fn update(&self, records: &[ModRecord]) -> CraftResult<Vec<(String, String)>> {
        let mut updated = Vec::new();

        for record in records.iter().filter(|r| r.is_outdated()) {
            let Some(latest_id) = record.info.as_ref().and_then(|i| i.latest_version_id.as_deref())
            else {
                continue;
            };
            let version = self.registry.version(latest_id).await?;
            let new_file = self.download_version(&version).await?;
            if new_file != record.file_name {
                remove_path(&record.path).await?;
            }
            info!("Updated {} -> {}", record.file_name, new_file);
            updated.push((record.file_name.clone(), new_file));
        }

        Ok(updated)
    }
}

/// Delete every installed mod matching `query`. Returns the removed file names.
pub async fn uninstall(query: &str, records: &[ModRecord]) -> CraftResult<Vec<String>> {
    let matching: Vec<&ModRecord> = records.iter().filter(|r| r.matches(query)).collect();
    if matching.is_empty() {
        return Err(CraftError::NotFound(format!("installed mod {query}")));
    }

    let mut removed = Vec::new();
    for record in matching {
        remove_path(&record.path).await?;
        info!("Removed {}", record.file_name);
        removed.push(record.file_name.clone());
    }
    Ok(removed)
}

/// Facets for a server-side mod search.
pub fn search_facets(loader: &str, minecraft_version: &str) -> Vec<Vec<String>> {
    vec![
        vec!["project_type:mod".to_string()],
        vec![
            "server_side:required".to_string(),
            "server_side:optional".to_string(),
        ],
        vec![format!("categories:{loader}")],
        vec![format!("versions:{minecraft_version}")],
    ]
}

fn dependency_label(dependency: &Dependency) -> String {
    dependency
        .project_id
        .clone()
        .or_else(|| dependency.version_id.clone())
        .unwrap_or_else(|| "unknown".to_string())
}

fn mod_path(mods_dir: &Path, file_name: &str) -> CraftResult<PathBuf> {
    let name = Path::new(file_name);
    if name.file_name().map(|n| n == name.as_os_str()) != Some(true) {
        return Err(CraftError::InvalidArgument(format!(
            "mod file name '{file_name}' is not a plain file name"
        )));
    }
    Ok(mods_dir.join(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn facets_cover_server_side_and_version() {
        let facets = search_facets("fabric", "1.21.1");
        assert_eq!(facets.len(), 4);
        assert_eq!(facets[2], vec!["categories:fabric".to_string()]);
        assert_eq!(facets[3], vec!["versions:1.21.1".to_string()]);
    }

    #[test]
    fn mod_path_rejects_nested_names() {
        let dir = Path::new("/srv/mc/mods");
        assert_eq!(mod_path(dir, "a.jar").unwrap(), dir.join("a.jar"));
        assert!(mod_path(dir, "../a.jar").is_err());
        assert!(mod_path(dir, "sub/a.jar").is_err());
    }
}
