// ─── Backup Archives ───
// Synchronous writers and readers for the four backup formats. Async callers
// go through `install::archive::blocking`.

use std::fs::{File, Metadata};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::debug;
use walkdir::WalkDir;
use xz2::read::XzDecoder;
use xz2::write::XzEncoder;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::format::BackupFormat;
use crate::core::error::{CraftError, CraftResult};
use crate::core::paths::{CONFIG_FILE, TOOL_DIRS};

const XZ_LEVEL: u32 = 6;

/// A file or directory of the installation, relative to its root.
#[derive(Debug, Clone)]
struct Entry {
    relative: PathBuf,
    absolute: PathBuf,
    is_dir: bool,
}

impl Entry {
    /// Forward-slash name used inside zip archives.
    fn zip_name(&self) -> String {
        self.relative.to_string_lossy().replace('\\', "/")
    }
}

fn is_tool_dir(name: &std::ffi::OsStr) -> bool {
    TOOL_DIRS.iter().any(|dir| name == *dir)
}

/// Everything under `root` except craftctl's own directories. Symlinks and
/// special files are skipped.
fn collect(root: &Path) -> CraftResult<Vec<Entry>> {
    let walker = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() != 1 || !is_tool_dir(entry.file_name()));

    let mut entries = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            CraftError::io(path, e.into())
        })?;
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };

        let file_type = entry.file_type();
        if !file_type.is_dir() && !file_type.is_file() {
            debug!("Skipping special file {:?}", entry.path());
            continue;
        }
        entries.push(Entry {
            relative: relative.to_path_buf(),
            absolute: entry.path().to_path_buf(),
            is_dir: file_type.is_dir(),
        });
    }
    Ok(entries)
}

/// Archive `root` into `dest`. Returns the number of files stored.
pub fn write(root: &Path, dest: &Path, format: BackupFormat) -> CraftResult<usize> {
    let entries = collect(root)?;
    let files = entries.iter().filter(|e| !e.is_dir).count();
    let out = File::create(dest).map_err(|e| CraftError::io(dest, e))?;

    match format {
        BackupFormat::Zip => write_zip(&entries, out)?,
        BackupFormat::Tar => {
            write_tar(&entries, out)?
                .sync_all()
                .map_err(|e| CraftError::io(dest, e))?;
        }
        BackupFormat::TarGz => {
            let encoder = write_tar(&entries, GzEncoder::new(out, Compression::default()))?;
            encoder.finish().map_err(|e| CraftError::io(dest, e))?;
        }
        BackupFormat::TarXz => {
            let encoder = write_tar(&entries, XzEncoder::new(out, XZ_LEVEL))?;
            encoder.finish().map_err(|e| CraftError::io(dest, e))?;
        }
    }

    debug!("Wrote {} files into {:?}", files, dest);
    Ok(files)
}

fn write_zip(entries: &[Entry], out: File) -> CraftResult<()> {
    let mut zip = ZipWriter::new(out);

    for entry in entries {
        let metadata = std::fs::metadata(&entry.absolute)
            .map_err(|e| CraftError::io(&entry.absolute, e))?;
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(unix_mode(&metadata))
            .large_file(metadata.len() >= u64::from(u32::MAX));

        if entry.is_dir {
            zip.add_directory(format!("{}/", entry.zip_name()), options)?;
            continue;
        }

        zip.start_file(entry.zip_name(), options)?;
        let mut file =
            File::open(&entry.absolute).map_err(|e| CraftError::io(&entry.absolute, e))?;
        std::io::copy(&mut file, &mut zip).map_err(|e| CraftError::io(&entry.absolute, e))?;
    }

    zip.finish()?;
    Ok(())
}

fn write_tar<W: Write>(entries: &[Entry], out: W) -> CraftResult<W> {
    let mut builder = tar::Builder::new(out);
    builder.follow_symlinks(false);

    for entry in entries {
        let added = if entry.is_dir {
            builder.append_dir(&entry.relative, &entry.absolute)
        } else {
            builder.append_path_with_name(&entry.absolute, &entry.relative)
        };
        added.map_err(|e| CraftError::io(&entry.absolute, e))?;
    }

    builder
        .into_inner()
        .map_err(|e| CraftError::io(PathBuf::new(), e))
}

#[cfg(unix)]
fn unix_mode(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn unix_mode(metadata: &Metadata) -> u32 {
    if metadata.is_dir() {
        0o755
    } else {
        0o644
    }
}

/// Unpack `archive` into `staging`, then replace the contents of `root` with it.
///
/// craftctl's own directories survive; the config is only replaced when the
/// archive carries one.
pub fn restore(archive: &Path, format: BackupFormat, staging: &Path, root: &Path) -> CraftResult<()> {
    std::fs::create_dir_all(staging).map_err(|e| CraftError::io(staging, e))?;
    let unpacked = unpack(archive, format, staging);
    let swapped = unpacked.and_then(|()| swap_in(staging, root));

    if let Err(e) = remove_entry(staging) {
        debug!("Could not remove staging dir {:?}: {}", staging, e);
    }
    swapped
}

fn unpack(archive: &Path, format: BackupFormat, target: &Path) -> CraftResult<()> {
    let file = File::open(archive).map_err(|e| CraftError::io(archive, e))?;
    match format {
        BackupFormat::Zip => {
            zip::ZipArchive::new(file)?.extract(target)?;
            Ok(())
        }
        BackupFormat::Tar => unpack_tar(file, archive, target),
        BackupFormat::TarGz => unpack_tar(GzDecoder::new(file), archive, target),
        BackupFormat::TarXz => unpack_tar(XzDecoder::new(file), archive, target),
    }
}

fn unpack_tar<R: Read>(reader: R, archive: &Path, target: &Path) -> CraftResult<()> {
    let mut tarball = tar::Archive::new(reader);
    tarball.set_preserve_permissions(true);
    tarball
        .unpack(target)
        .map_err(|e| CraftError::io(archive, e))
}

fn swap_in(staging: &Path, root: &Path) -> CraftResult<()> {
    let carries_config = staging.join(CONFIG_FILE).exists();

    for entry in std::fs::read_dir(root).map_err(|e| CraftError::io(root, e))? {
        let entry = entry.map_err(|e| CraftError::io(root, e))?;
        let name = entry.file_name();
        if is_tool_dir(&name) || (name == CONFIG_FILE && !carries_config) {
            continue;
        }
        remove_entry(&entry.path())?;
    }

    for entry in std::fs::read_dir(staging).map_err(|e| CraftError::io(staging, e))? {
        let entry = entry.map_err(|e| CraftError::io(staging, e))?;
        if is_tool_dir(&entry.file_name()) {
            continue;
        }
        let dest = root.join(entry.file_name());
        std::fs::rename(entry.path(), &dest).map_err(|e| CraftError::io(&dest, e))?;
    }
    Ok(())
}

fn remove_entry(path: &Path) -> CraftResult<()> {
    let metadata = std::fs::symlink_metadata(path).map_err(|e| CraftError::io(path, e))?;
    let removed = if metadata.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    removed.map_err(|e| CraftError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn collect_skips_tool_dirs_only_at_the_top() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join(".craftctl.backups")).unwrap();
        std::fs::write(root.join(".craftctl.backups/old.zip"), "zip").unwrap();
        std::fs::create_dir_all(root.join(".craftctl.profiles/creative")).unwrap();
        std::fs::create_dir_all(root.join("world/.craftctl.backups")).unwrap();
        std::fs::write(root.join("server.properties"), "motd=hi").unwrap();

        let names: Vec<_> = collect(root)
            .unwrap()
            .into_iter()
            .map(|e| e.zip_name())
            .collect();
        assert_eq!(
            names,
            vec!["server.properties", "world", "world/.craftctl.backups"]
        );
    }

    #[test]
    fn failed_unpack_leaves_root_untouched() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("root");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("server.properties"), "motd=live").unwrap();
        let archive = dir.path().join("broken.tar.gz");
        std::fs::write(&archive, "not gzip").unwrap();

        let staging = dir.path().join("staging");
        assert!(restore(&archive, BackupFormat::TarGz, &staging, &root).is_err());
        assert_eq!(
            std::fs::read_to_string(root.join("server.properties")).unwrap(),
            "motd=live"
        );
        assert!(!staging.exists());
    }
}
