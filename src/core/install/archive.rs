// ─── Zip Extraction ───
// Synchronous zip helpers; async callers go through `spawn_blocking`.

use std::io::Read;
use std::path::{Component, Path, PathBuf};

use crate::core::error::{CraftError, CraftResult};

/// Upper bound on buffers preallocated from sizes an archive declares.
const MAX_PREALLOC: usize = 8 << 20;

fn capacity_hint(declared: u64) -> usize {
    usize::try_from(declared).unwrap_or(usize::MAX).min(MAX_PREALLOC)
}

fn open(archive_path: &Path) -> CraftResult<zip::ZipArchive<std::fs::File>> {
    let file = std::fs::File::open(archive_path).map_err(|e| CraftError::io(archive_path, e))?;
    Ok(zip::ZipArchive::new(file)?)
}

/// Strip `prefix` (a directory inside the archive) from an entry name.
///
/// Returns `None` for entries outside the prefix, for the prefix itself,
/// and for names that would escape the target.
fn relative_to_prefix(enclosed: &Path, prefix: &str) -> Option<PathBuf> {
    let mut rel = PathBuf::new();
    let mut components = enclosed.components();

    for wanted in Path::new(prefix).components() {
        if components.next() != Some(wanted) {
            return None;
        }
    }

    for component in components {
        match component {
            Component::Normal(part) => rel.push(part),
            _ => return None,
        }
    }

    if rel.as_os_str().is_empty() {
        None
    } else {
        Some(rel)
    }
}

/// Extract the entries under `prefix` (or all entries when empty) into `target`,
/// overwriting existing files. Returns the number of files written.
pub fn extract_zip(archive_path: &Path, prefix: &str, target: &Path) -> CraftResult<usize> {
    let mut archive = open(archive_path)?;
    std::fs::create_dir_all(target).map_err(|e| CraftError::io(target, e))?;

    let mut written = 0;
    for index in 0..archive.len() {
        let mut zipped = archive.by_index(index)?;

        // Entries with absolute or `..` names are skipped
        let Some(enclosed) = zipped.enclosed_name() else {
            continue;
        };
        let Some(rel_path) = relative_to_prefix(&enclosed, prefix) else {
            continue;
        };

        let out_path = target.join(rel_path);
        if zipped.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|e| CraftError::io(&out_path, e))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CraftError::io(parent, e))?;
        }

        let mut out = std::fs::File::create(&out_path).map_err(|e| CraftError::io(&out_path, e))?;
        std::io::copy(&mut zipped, &mut out).map_err(|e| CraftError::io(&out_path, e))?;
        written += 1;
    }

    Ok(written)
}

/// Relative paths of the files stored under `prefix`.
pub fn list_files(archive_path: &Path, prefix: &str) -> CraftResult<Vec<PathBuf>> {
    let mut archive = open(archive_path)?;
    let mut files = Vec::new();

    for index in 0..archive.len() {
        let zipped = archive.by_index(index)?;
        if zipped.is_dir() {
            continue;
        }
        if let Some(rel) = zipped
            .enclosed_name()
            .and_then(|enclosed| relative_to_prefix(&enclosed, prefix))
        {
            files.push(rel);
        }
    }

    Ok(files)
}

/// Contents of a single named entry.
pub fn read_entry(archive_path: &Path, name: &str) -> CraftResult<Vec<u8>> {
    let mut archive = open(archive_path)?;
    let mut entry = archive.by_name(name)?;
    let mut buf = Vec::with_capacity(capacity_hint(entry.size()));
    entry
        .read_to_end(&mut buf)
        .map_err(|e| CraftError::io(archive_path, e))?;
    Ok(buf)
}

/// Run a blocking archive operation off the async runtime.
pub async fn blocking<T, F>(job: F) -> CraftResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> CraftResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| CraftError::Other(format!("archive task failed: {e}")))?
}
