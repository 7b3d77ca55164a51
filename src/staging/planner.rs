//! Staging decisions and execution
//!
//! The decision ([`decide`]) only inspects the sources; execution
//! ([`StagingPlan::execute`]) reserves names and does all blocking I/O, and
//! is meant for `spawn_blocking`.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::types::session::{PayloadDescriptor, SendOptions};

use super::archive::{allocate_archive_name, compress_folder, is_archive};
use super::link::link_sources_into;

/// Shape a send payload takes on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanKind {
    /// Send the single source unchanged
    AsIs,
    /// Compress all sources into one archive
    Archive,
    /// Link all sources into a batch folder
    BatchFolder,
}

/// Decide how to ship `sources`
///
/// Rules, first match wins:
/// 1. a single source that already is an archive is sent as-is
/// 2. a forced archive, or several sources without an explicit no-archive
///    preference, is archived
/// 3. several sources with archiving disabled become a batch folder
/// 4. anything else is sent as-is
#[must_use]
pub fn decide(sources: &[PathBuf], options: SendOptions) -> PlanKind {
    if let [single] = sources
        && is_archive(single)
    {
        return PlanKind::AsIs;
    }
    match (options.force_archive, sources.len()) {
        (Some(true), _) => PlanKind::Archive,
        (None, n) if n > 1 => PlanKind::Archive,
        (Some(false), n) if n > 1 => PlanKind::BatchFolder,
        _ => PlanKind::AsIs,
    }
}

/// Drop sources that no longer exist on disk
#[must_use]
pub fn existing_sources(sources: &[PathBuf]) -> Vec<PathBuf> {
    sources
        .iter()
        .filter(|p| {
            let exists = p.exists();
            if !exists {
                log::debug!("Source vanished before staging: {}", p.display());
            }
            exists
        })
        .cloned()
        .collect()
}

/// Base name used for archive candidates
#[must_use]
pub fn archive_base_name(sources: &[PathBuf]) -> String {
    match sources {
        [single] => single
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "transfer".to_string()),
        _ => "bundle".to_string(),
    }
}

/// Staging work for one send
#[derive(Debug, Clone)]
pub enum StagingPlan {
    /// Reserve an archive name in `dir`, link into its staging folder,
    /// compress, drop the folder
    Archive {
        /// Sources to archive
        sources: Vec<PathBuf>,
        /// Directory holding archives
        dir: PathBuf,
        /// Base of the archive file name
        base: String,
        /// Random name candidates tried before the timestamp fallback
        attempts: u32,
    },
    /// Link into a batch folder that lives as long as the session
    BatchFolder {
        /// Sources to link
        sources: Vec<PathBuf>,
        /// Batch folder path
        folder: PathBuf,
    },
}

impl StagingPlan {
    /// Perform the staging I/O and describe the resulting payload
    ///
    /// Originals are never modified. On failure nothing staged is left behind.
    ///
    /// # Errors
    /// Returns a staging or archive error carrying the underlying OS error
    pub fn execute(self) -> Result<PayloadDescriptor> {
        match self {
            Self::Archive {
                sources,
                dir,
                base,
                attempts,
            } => {
                let name = allocate_archive_name(&dir, &base, attempts)?;
                let staged = link_sources_into(&sources, &name.staging_folder)
                    .and_then(|()| compress_folder(&name.staging_folder, &name.archive_path));
                remove_dir_quietly(&name.staging_folder);
                staged?;
                log::debug!("Staged archive {}", name.archive_path.display());
                Ok(PayloadDescriptor::Archive {
                    path: name.archive_path,
                })
            }
            Self::BatchFolder { sources, folder } => {
                if folder.exists() {
                    log::debug!("Replacing stale batch folder {}", folder.display());
                    remove_dir_quietly(&folder);
                }
                if let Err(e) = link_sources_into(&sources, &folder) {
                    remove_dir_quietly(&folder);
                    return Err(e);
                }
                Ok(PayloadDescriptor::BatchFolder { path: folder })
            }
        }
    }
}

/// Remove a staging directory, logging instead of failing
pub fn remove_dir_quietly(path: &Path) {
    if let Err(e) = fs::remove_dir_all(path)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        log::warn!("Failed to remove staging folder {}: {e}", path.display());
    }
}

/// Remove a staged file, logging instead of failing
pub fn remove_file_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        log::warn!("Failed to remove staged file {}: {e}", path.display());
    }
}
