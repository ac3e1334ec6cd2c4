//! Unpacks validated package archives into per-(course, language, package)
//! directories under the content root.
//!
//! Extraction goes to a staging directory next to the target and is renamed
//! into place only once every entry has been written, so a failed run never
//! leaves a half-populated package directory behind.

use crate::archive::{self, ArchiveError};
use crate::config::DEFAULT_MAX_UNPACKED_BYTES;
use crate::models::Language;
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use tempfile::TempDir;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("archive not found at {0}")]
    MissingSource(PathBuf),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("archive entry escapes the package directory: {0}")]
    UnsafeEntry(String),
    #[error("archive expands beyond {limit} bytes")]
    TooLarge { limit: u64 },
    #[error("filesystem error during extraction: {0}")]
    Io(#[from] io::Error),
}

/// The identity a package directory name is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageIdentity {
    pub course_id: i64,
    pub language: Language,
    pub package_id: i64,
}

impl PackageIdentity {
    pub fn dir_name(&self) -> String {
        format!("scorm_{}_{}_{}", self.course_id, self.language.code(), self.package_id)
    }
}

#[derive(Debug, Clone)]
pub struct ExtractionEngine {
    content_root: PathBuf,
    max_unpacked_bytes: u64,
}

impl ExtractionEngine {
    pub fn new(content_root: impl Into<PathBuf>) -> Self {
        Self {
            content_root: content_root.into(),
            max_unpacked_bytes: DEFAULT_MAX_UNPACKED_BYTES,
        }
    }

    /// Caps the total bytes written for a single package.
    pub fn with_max_unpacked_bytes(mut self, limit: u64) -> Self {
        self.max_unpacked_bytes = limit;
        self
    }

    pub fn content_root(&self) -> &Path {
        &self.content_root
    }

    pub fn target_dir(&self, id: &PackageIdentity) -> PathBuf {
        self.content_root.join(id.dir_name())
    }

    /// Extracts `archive_path` for `id` and returns the absolute output directory.
    ///
    /// Safe to call again for the same identity: the previous directory is
    /// replaced wholesale, not merged into.
    pub fn extract(&self, archive_path: &Path, id: &PackageIdentity) -> Result<PathBuf, ExtractError> {
        fs::create_dir_all(&self.content_root)?;
        let root = fs::canonicalize(&self.content_root)?;

        let file = fs::File::open(archive_path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ExtractError::MissingSource(archive_path.to_path_buf()),
            _ => ExtractError::Io(e),
        })?;
        let mut zip = archive::open(io::BufReader::new(file))?;

        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&root)?;
        let files = unpack_into(&mut zip, staging.path(), self.max_unpacked_bytes)?;

        let target = root.join(id.dir_name());
        swap_into_place(staging, &target)?;

        tracing::info!(
            course_id = id.course_id,
            language = %id.language,
            package_id = id.package_id,
            files,
            dir = %target.display(),
            "package extracted"
        );
        Ok(target)
    }

    /// Removes a package directory previously produced by [`extract`](Self::extract).
    /// Paths outside the content root are refused.
    pub fn remove(&self, dir: &Path) -> Result<(), ExtractError> {
        let root = match fs::canonicalize(&self.content_root) {
            Ok(r) => r,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let dir = match fs::canonicalize(dir) {
            Ok(d) => d,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if !dir.starts_with(&root) || dir == root {
            return Err(ExtractError::UnsafeEntry(dir.display().to_string()));
        }
        fs::remove_dir_all(&dir)?;
        Ok(())
    }
}

fn unpack_into<R: io::Read + io::Seek>(
    zip: &mut zip::ZipArchive<R>,
    dest: &Path,
    limit: u64,
) -> Result<usize, ExtractError> {
    let mut files = 0;
    let mut written: u64 = 0;
    for i in 0..zip.len() {
        let mut entry = zip
            .by_index(i)
            .map_err(|e| ArchiveError::Corrupt(e.to_string()))?;
        let rel = entry
            .enclosed_name()
            .map(Path::to_path_buf)
            .ok_or_else(|| ExtractError::UnsafeEntry(entry.name().to_string()))?;
        let outpath = dest.join(rel);

        if entry.is_dir() {
            fs::create_dir_all(&outpath)?;
            continue;
        }
        if let Some(parent) = outpath.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut outfile = fs::File::create(&outpath)?;
        // header sizes are not trusted; count what actually decompresses
        let remaining = limit - written;
        let copied = io::copy(&mut io::Read::take(&mut entry, remaining.saturating_add(1)), &mut outfile)?;
        if copied > remaining {
            return Err(ExtractError::TooLarge { limit });
        }
        written += copied;
        files += 1;
    }
    Ok(files)
}

fn swap_into_place(staging: TempDir, target: &Path) -> Result<(), ExtractError> {
    let retired = if target.exists() {
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let aside = target.with_file_name(format!(".retired-{}-{}", name, Uuid::new_v4()));
        fs::rename(target, &aside)?;
        Some(aside)
    } else {
        None
    };

    if let Err(e) = fs::rename(staging.path(), target) {
        if let Some(aside) = &retired {
            if let Err(restore) = fs::rename(aside, target) {
                tracing::error!(error = %restore, dir = %target.display(), "failed to restore previous package directory");
            }
        }
        return Err(e.into());
    }
    // staging now lives at `target`; dropping the handle is a no-op
    drop(staging);

    if let Some(aside) = retired {
        if let Err(e) = fs::remove_dir_all(&aside) {
            tracing::warn!(error = %e, dir = %aside.display(), "failed to remove retired package directory");
        }
    }
    Ok(())
}
