//! Archive naming and compression

use chrono::Utc;
use rand::Rng;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

use crate::error::{Result, TransferError};

/// Extension of archives produced by the planner
pub const ARCHIVE_EXTENSION: &str = "zip";

/// Reserved name for one archive: the final file and its staging folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveName {
    /// Folder the sources are linked into before compression
    pub staging_folder: PathBuf,
    /// Final archive file
    pub archive_path: PathBuf,
}

/// Whether `path` already is an archive and must not be archived again
#[must_use]
pub fn is_archive(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(ARCHIVE_EXTENSION))
}

/// Reserve a name whose archive file and staging folder are both unused
///
/// Candidates are `<base>_<timestamp>_<random>`. A candidate is committed by
/// creating its staging folder, so two callers never receive the same name.
/// After `attempts` collisions a millisecond timestamp name is used.
///
/// # Errors
/// Returns a staging error if the folder cannot be created
pub fn allocate_archive_name(dir: &Path, base: &str, attempts: u32) -> Result<ArchiveName> {
    let base = sanitize(base);
    let mut rng = rand::thread_rng();
    fs::create_dir_all(dir)?;

    for _ in 0..attempts {
        let stamp = Utc::now().format("%Y%m%d-%H%M%S");
        let candidate = format!("{base}_{stamp}_{:04}", rng.gen_range(0..10_000));
        let name = archive_name(dir, &candidate);
        if !name.archive_path.exists() {
            match fs::create_dir(&name.staging_folder) {
                Ok(()) => return Ok(name),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e.into()),
            }
        }
        log::trace!("archive name {candidate} taken, retrying");
    }

    let fallback = format!("{base}_{}", Utc::now().timestamp_millis());
    log::warn!("Archive name probing exhausted, falling back to {fallback}");
    let name = archive_name(dir, &fallback);
    fs::create_dir_all(&name.staging_folder).map_err(|e| {
        TransferError::staging(format!(
            "cannot create {}: {e}",
            name.staging_folder.display()
        ))
    })?;
    Ok(name)
}

fn archive_name(dir: &Path, stem: &str) -> ArchiveName {
    ArchiveName {
        staging_folder: dir.join(stem),
        archive_path: dir.join(format!("{stem}.{ARCHIVE_EXTENSION}")),
    }
}

fn sanitize(base: &str) -> String {
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "transfer".to_string()
    } else {
        cleaned
    }
}

/// Compress the contents of `folder` into a zip file at `archive_path`
///
/// Entry names are relative to `folder`. A partially written archive is
/// removed on failure.
///
/// # Errors
/// Returns an archive error if any entry cannot be read or written
pub fn compress_folder(folder: &Path, archive_path: &Path) -> Result<()> {
    let result = write_zip(folder, archive_path);
    if result.is_err() {
        let _ = fs::remove_file(archive_path);
    }
    result
}

fn write_zip(folder: &Path, archive_path: &Path) -> Result<()> {
    let file = File::create(archive_path).map_err(|e| {
        TransferError::archive(format!("cannot create {}: {e}", archive_path.display()))
    })?;
    let mut writer = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in WalkDir::new(folder).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(folder)
            .map_err(|e| TransferError::archive(e.to_string()))?;
        let entry_name = rel.to_string_lossy().replace('\\', "/");

        if entry.file_type().is_dir() {
            writer.add_directory(entry_name, options)?;
        } else if entry.file_type().is_file() {
            let mut source = File::open(entry.path()).map_err(|e| {
                TransferError::archive(format!("cannot open {}: {e}", entry.path().display()))
            })?;
            writer.start_file(entry_name, options)?;
            io::copy(&mut source, &mut writer).map_err(|e| {
                TransferError::archive(format!("cannot add {}: {e}", entry.path().display()))
            })?;
        }
    }

    writer.finish()?;
    Ok(())
}
