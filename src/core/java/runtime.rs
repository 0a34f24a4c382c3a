// ─── Java Runtimes ───
// Managed Temurin runtimes under `<home>/java/<major>`.

use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use crate::core::api::adoptium::{AdoptiumClient, AvailableReleases, RuntimePackage};
use crate::core::downloader::Downloader;
use crate::core::error::{CraftError, CraftResult};
use crate::core::install::archive;
use crate::core::install::runner::remove_path;

/// One runtime present on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledRuntime {
    pub major: u32,
    /// Value for `JAVA_HOME`.
    pub home: PathBuf,
    pub binary: PathBuf,
}

pub struct JavaManager {
    root: PathBuf,
    adoptium: AdoptiumClient,
    downloader: Downloader,
}

impl JavaManager {
    pub fn new(root: impl Into<PathBuf>, adoptium: AdoptiumClient, downloader: Downloader) -> Self {
        Self {
            root: root.into(),
            adoptium,
            downloader,
        }
    }

    pub fn runtime_dir(&self, major: u32) -> PathBuf {
        self.root.join(major.to_string())
    }

    /// Runtimes with a usable `java` binary, ascending by major.
    pub async fn installed(&self) -> CraftResult<Vec<InstalledRuntime>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CraftError::io(&self.root, e)),
        };

        let mut runtimes = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CraftError::io(&self.root, e))?
        {
            let Some(major) = entry.file_name().to_str().and_then(|n| n.parse::<u32>().ok())
            else {
                continue;
            };
            if let Some(runtime) = inspect_runtime(major, &entry.path()) {
                runtimes.push(runtime);
            }
        }

        runtimes.sort_by_key(|r| r.major);
        Ok(runtimes)
    }

    pub fn find(&self, major: u32) -> Option<InstalledRuntime> {
        inspect_runtime(major, &self.runtime_dir(major))
    }

    /// The runtime for `major`, downloading it first when missing.
    pub async fn ensure(&self, major: u32) -> CraftResult<InstalledRuntime> {
        match self.find(major) {
            Some(runtime) => Ok(runtime),
            None => self.install(major).await,
        }
    }

    /// Download and unpack the latest runtime for `major`, replacing any existing one.
    #[instrument(skip(self))]
    pub async fn install(&self, major: u32) -> CraftResult<InstalledRuntime> {
        let package = self.adoptium.latest_package(major).await?;
        info!("Installing Java {} ({})", major, package.version);

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| CraftError::io(&self.root, e))?;
        let archive_path = self.root.join(&package.name);
        let runtime_dir = self.runtime_dir(major);

        let result = self.unpack(&package, &archive_path, &runtime_dir).await;
        if let Err(e) = remove_path(&archive_path).await {
            warn!("Could not remove {:?}: {}", archive_path, e);
        }
        result?;

        ensure_executable(&locate_java_binary(&runtime_dir))?;
        inspect_runtime(major, &runtime_dir).ok_or(CraftError::JavaNotFound(major))
    }

    async fn unpack(
        &self,
        package: &RuntimePackage,
        archive_path: &Path,
        runtime_dir: &Path,
    ) -> CraftResult<()> {
        self.downloader
            .download_file(&package.link, archive_path, None)
            .await?;
        verify_sha256(archive_path, &package.checksum).await?;

        remove_path(runtime_dir).await?;
        if package.is_zip() {
            let zip_path = archive_path.to_path_buf();
            let target = runtime_dir.to_path_buf();
            archive::blocking(move || extract_zip_stripped(&zip_path, &target)).await?;
        } else {
            let tar_path = archive_path.to_path_buf();
            let target = runtime_dir.to_path_buf();
            archive::blocking(move || extract_tar_stripped(&tar_path, &target)).await?;
        }
        debug!("Unpacked {:?} into {:?}", archive_path, runtime_dir);
        Ok(())
    }

    pub async fn delete(&self, major: u32) -> CraftResult<()> {
        if self.find(major).is_none() {
            return Err(CraftError::JavaNotFound(major));
        }
        remove_path(&self.runtime_dir(major)).await?;
        info!("Deleted Java {}", major);
        Ok(())
    }

    pub async fn available(&self) -> CraftResult<AvailableReleases> {
        self.adoptium.available_releases().await
    }
}

fn inspect_runtime(major: u32, runtime_dir: &Path) -> Option<InstalledRuntime> {
    let binary = locate_java_binary(runtime_dir);
    if !binary.is_file() {
        return None;
    }
    let home = binary.parent()?.parent()?.to_path_buf();
    Some(InstalledRuntime {
        major,
        home,
        binary,
    })
}

fn java_exe() -> &'static str {
    if cfg!(windows) {
        "java.exe"
    } else {
        "java"
    }
}

pub fn locate_java_binary(runtime_root: &Path) -> PathBuf {
    let primary = runtime_root.join("bin").join(java_exe());
    if primary.exists() {
        return primary;
    }

    let mac_layout = runtime_root
        .join("Contents")
        .join("Home")
        .join("bin")
        .join(java_exe());
    if mac_layout.exists() {
        return mac_layout;
    }

    primary
}

fn ensure_executable(java_bin: &Path) -> CraftResult<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if java_bin.exists() {
            let mut perms = std::fs::metadata(java_bin)
                .map_err(|e| CraftError::io(java_bin, e))?
                .permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(java_bin, perms).map_err(|e| CraftError::io(java_bin, e))?;
        }
    }
    #[cfg(not(unix))]
    let _ = java_bin;
    Ok(())
}

async fn verify_sha256(path: &Path, expected: &str) -> CraftResult<()> {
    if expected.is_empty() {
        return Ok(());
    }
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| CraftError::io(path, e))?;
    let actual = hex::encode(Sha256::digest(&bytes));
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(CraftError::JavaExecution(format!(
            "checksum mismatch for {:?}: expected {expected}, got {actual}",
            path
        )))
    }
}

/// Extract a zip whose entries sit under one top-level directory, dropping it.
fn extract_zip_stripped(zip_path: &Path, runtime_root: &Path) -> CraftResult<()> {
    let zip_file = std::fs::File::open(zip_path).map_err(|e| CraftError::io(zip_path, e))?;
    let mut zip = zip::ZipArchive::new(zip_file)?;
    std::fs::create_dir_all(runtime_root).map_err(|e| CraftError::io(runtime_root, e))?;

    for index in 0..zip.len() {
        let mut zipped = zip.by_index(index)?;
        let Some(enclosed_name) = zipped.enclosed_name() else {
            return Err(CraftError::Other("Invalid zip entry path".into()));
        };

        let mut rel_path = PathBuf::new();
        for component in enclosed_name.components().skip(1) {
            if let Component::Normal(part) = component {
                rel_path.push(part);
            }
        }
        if rel_path.as_os_str().is_empty() {
            continue;
        }

        let out_path = runtime_root.join(rel_path);
        if zipped.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|e| CraftError::io(&out_path, e))?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CraftError::io(parent, e))?;
        }
        let mut out = std::fs::File::create(&out_path).map_err(|e| CraftError::io(&out_path, e))?;
        std::io::copy(&mut zipped, &mut out).map_err(|e| CraftError::io(&out_path, e))?;
    }

    Ok(())
}

/// Unpack a `.tar.gz` into `runtime_root`, dropping the top-level directory.
fn extract_tar_stripped(archive_path: &Path, runtime_root: &Path) -> CraftResult<()> {
    let file = std::fs::File::open(archive_path).map_err(|e| CraftError::io(archive_path, e))?;
    let mut tarball = tar::Archive::new(GzDecoder::new(file));
    std::fs::create_dir_all(runtime_root).map_err(|e| CraftError::io(runtime_root, e))?;

    let entries = tarball
        .entries()
        .map_err(|e| CraftError::io(archive_path, e))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| CraftError::io(archive_path, e))?;
        let entry_path = entry
            .path()
            .map_err(|e| CraftError::io(archive_path, e))?
            .into_owned();

        let mut rel_path = PathBuf::new();
        let parts = entry_path
            .components()
            .filter(|c| !matches!(c, Component::CurDir))
            .skip(1);
        for component in parts {
            match component {
                Component::Normal(part) => rel_path.push(part),
                _ => {
                    return Err(CraftError::Other(format!(
                        "Invalid tar entry path {:?}",
                        entry_path
                    )))
                }
            }
        }
        if rel_path.as_os_str().is_empty() {
            continue;
        }

        let out_path = runtime_root.join(rel_path);
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CraftError::io(parent, e))?;
        }
        entry
            .unpack(&out_path)
            .map_err(|e| CraftError::io(&out_path, e))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::downloader::HttpTransport;
    use std::io::Write;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn manager(root: &Path) -> JavaManager {
        let client = reqwest::Client::new();
        JavaManager::new(
            root,
            AdoptiumClient::new(client.clone(), "http://127.0.0.1:9"),
            Downloader::new(Arc::new(HttpTransport::new(client))),
        )
    }

    fn fake_runtime(root: &Path, major: u32) {
        let bin = root.join(major.to_string()).join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        std::fs::write(bin.join(java_exe()), b"#!/bin/sh").unwrap();
    }

    #[tokio::test]
    async fn installed_lists_runtimes_with_binaries() {
        let dir = tempdir().unwrap();
        fake_runtime(dir.path(), 21);
        fake_runtime(dir.path(), 17);
        std::fs::create_dir_all(dir.path().join("8")).unwrap();
        std::fs::create_dir_all(dir.path().join("notes")).unwrap();

        let runtimes = manager(dir.path()).installed().await.unwrap();
        let majors: Vec<_> = runtimes.iter().map(|r| r.major).collect();
        assert_eq!(majors, vec![17, 21]);
        assert_eq!(runtimes[1].home, dir.path().join("21"));
    }

    #[tokio::test]
    async fn delete_missing_runtime_fails() {
        let dir = tempdir().unwrap();
        let err = manager(dir.path()).delete(11).await.unwrap_err();
        assert!(matches!(err, CraftError::JavaNotFound(11)));
    }

    #[test]
    fn zip_top_level_dir_is_flattened() {
        let dir = tempdir().unwrap();
        let zip_path = dir.path().join("jdk.zip");
        {
            let file = std::fs::File::create(&zip_path).unwrap();
            let mut writer = zip::ZipWriter::new(file);
            let options = zip::write::SimpleFileOptions::default();
            writer.start_file("jdk-21.0.4+7-jre/bin/java", options).unwrap();
            writer.write_all(b"bin").unwrap();
            writer.start_file("jdk-21.0.4+7-jre/release", options).unwrap();
            writer.write_all(b"JAVA_VERSION=21").unwrap();
            writer.finish().unwrap();
        }

        let target = dir.path().join("21");
        extract_zip_stripped(&zip_path, &target).unwrap();
        assert!(target.join("bin/java").exists());
        assert!(target.join("release").exists());
    }

    #[test]
    fn tar_gz_top_level_dir_is_flattened() {
        let dir = tempdir().unwrap();
        let tar_path = dir.path().join("jdk.tar.gz");
        {
            let file = std::fs::File::create(&tar_path).unwrap();
            let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
            let mut builder = tar::Builder::new(encoder);
            for (name, body) in [
                ("jdk-21.0.4+7-jre/bin/java", "bin"),
                ("jdk-21.0.4+7-jre/lib/modules", "modules"),
                ("jdk-21.0.4+7-jre/release", "JAVA_VERSION=21"),
            ] {
                let mut header = tar::Header::new_gnu();
                header.set_size(body.len() as u64);
                header.set_mode(0o755);
                header.set_cksum();
                builder.append_data(&mut header, name, body.as_bytes()).unwrap();
            }
            builder.into_inner().unwrap().finish().unwrap();
        }

        let target = dir.path().join("21");
        extract_tar_stripped(&tar_path, &target).unwrap();
        assert_eq!(std::fs::read_to_string(target.join("bin/java")).unwrap(), "bin");
        assert!(target.join("lib/modules").exists());
        assert!(target.join("release").exists());
        assert!(!target.join("jdk-21.0.4+7-jre").exists());
    }

    #[test]
    fn corrupt_tar_gz_is_an_error() {
        let dir = tempdir().unwrap();
        let tar_path = dir.path().join("jdk.tar.gz");
        std::fs::write(&tar_path, b"not gzip").unwrap();
        assert!(extract_tar_stripped(&tar_path, &dir.path().join("21")).is_err());
    }
}
