//! Archive extraction.
//!
//! Aozora Bunko distributes each work as a zip file holding one `.txt`
//! (plus the odd image). An ingest pass gets its own [`ExtractionArena`], a
//! temporary directory that is removed when the arena is dropped, so files
//! from different archives never mix.
//!
//! Remote archives are downloaded with a single GET; there is no retry.

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use walkdir::WalkDir;

use crate::error::{PipelineError, PipelineResult};

/// Metadata folder added by the macOS archiver. Never extracted or cleared.
pub const MACOS_METADATA_DIR: &str = "__MACOSX";

/// Temporary working directory scoped to one extraction + cleanse pass.
pub struct ExtractionArena {
    dir: TempDir,
}

impl ExtractionArena {
    pub fn new() -> PipelineResult<Self> {
        let dir = tempfile::Builder::new().prefix("litc-").tempdir()?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Where archives are unpacked.
    pub fn extract_dir(&self) -> PathBuf {
        self.dir.path().join("extracted")
    }

    /// Where downloaded archives are stored.
    pub fn download_dir(&self) -> PathBuf {
        self.dir.path().join("download")
    }
}

pub fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Turn an archive source (local path or URL) into a local file path,
/// downloading into the arena when needed.
pub async fn resolve_source(source: &str, arena: &ExtractionArena) -> PipelineResult<PathBuf> {
    if is_remote(source) {
        return fetch_archive(source, &arena.download_dir()).await;
    }

    let path = PathBuf::from(source);
    if !path.is_file() {
        return Err(PipelineError::ArchiveNotFound(path));
    }
    Ok(path)
}

/// Download an archive into `dest_dir`, named after the last URL segment.
pub async fn fetch_archive(url: &str, dest_dir: &Path) -> PipelineResult<PathBuf> {
    let fetch_err = |reason: String| PipelineError::Fetch {
        url: url.to_string(),
        reason,
    };

    tracing::info!(url, "downloading archive");
    let resp = reqwest::get(url).await.map_err(|e| fetch_err(e.to_string()))?;
    if !resp.status().is_success() {
        return Err(fetch_err(format!("HTTP {}", resp.status())));
    }
    let bytes = resp.bytes().await.map_err(|e| fetch_err(e.to_string()))?;

    let file_name = archive_file_name(url);
    std::fs::create_dir_all(dest_dir)?;
    let path = dest_dir.join(file_name);
    std::fs::write(&path, &bytes)?;
    tracing::debug!(path = %path.display(), bytes = bytes.len(), "archive saved");
    Ok(path)
}

fn archive_file_name(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    without_query
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("archive.zip")
        .to_string()
}

/// Delete everything inside `dir` except the macOS metadata folder.
///
/// A missing directory counts as already clear.
pub fn clear_dir(dir: &Path) -> PipelineResult<()> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_name() == MACOS_METADATA_DIR {
            continue;
        }
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            clear_dir(&path)?;
            // Keeps directories that still hold a metadata folder.
            if std::fs::read_dir(&path)?.next().is_none() {
                std::fs::remove_dir(&path)?;
            }
        } else {
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Unpack a zip archive into `dest`, returning the files written.
///
/// Entries that would escape `dest`, metadata folders, and entries larger
/// than `max_entry_bytes` are skipped with a warning.
pub fn extract_zip(archive: &Path, dest: &Path, max_entry_bytes: u64) -> PipelineResult<Vec<PathBuf>> {
    if !archive.is_file() {
        return Err(PipelineError::ArchiveNotFound(archive.to_path_buf()));
    }
    let corrupt = |reason: String| PipelineError::CorruptArchive {
        path: archive.to_path_buf(),
        reason,
    };

    let file = File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| corrupt(e.to_string()))?;
    std::fs::create_dir_all(dest)?;

    let mut written = Vec::new();
    for i in 0..zip.len() {
        let entry = zip.by_index(i).map_err(|e| corrupt(e.to_string()))?;
        let name = entry.name().to_string();

        let Some(relative) = entry.enclosed_name() else {
            tracing::warn!(entry = %name, "skipping zip entry outside the archive root");
            continue;
        };
        if relative
            .components()
            .any(|c| c.as_os_str() == MACOS_METADATA_DIR)
        {
            continue;
        }

        let out_path = dest.join(&relative);
        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)?;
            continue;
        }

        let mut buf = Vec::new();
        entry
            .take(max_entry_bytes.saturating_add(1))
            .read_to_end(&mut buf)
            .map_err(|e| corrupt(format!("{}: {}", name, e)))?;
        if buf.len() as u64 > max_entry_bytes {
            tracing::warn!(
                entry = %name,
                limit = max_entry_bytes,
                "skipping zip entry over size limit"
            );
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&out_path, &buf)?;
        written.push(out_path);
    }

    tracing::info!(
        archive = %archive.display(),
        files = written.len(),
        "archive extracted"
    );
    Ok(written)
}

/// Recursively list text files under `root` matching the include globs and
/// none of the exclude globs, in sorted order.
pub fn find_texts(root: &Path, include_globs: &[String], exclude_globs: &[String]) -> Result<Vec<PathBuf>> {
    let include_set = build_globset(include_globs)?;

    let mut excludes = vec![format!("**/{}/**", MACOS_METADATA_DIR)];
    excludes.extend(exclude_globs.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    let mut paths = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }
        paths.push(path.to_path_buf());
    }

    paths.sort();
    Ok(paths)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
