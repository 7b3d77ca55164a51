//! Recursive hard-link staging with copy fallback
//!
//! Sources are mirrored into a staging folder without touching the originals.
//! Files are hard-linked when possible and copied when linking fails (for
//! example across devices).

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{Result, TransferError};

/// Mirror every source into `dest`, each under its own file name
///
/// Name clashes between sources are resolved with `-2`, `-3`, ... suffixes.
///
/// # Errors
/// Returns a staging error carrying the underlying OS error if any entry
/// can be neither linked nor copied
pub fn link_sources_into(sources: &[PathBuf], dest: &Path) -> Result<()> {
    fs::create_dir_all(dest).map_err(|e| {
        TransferError::staging(format!("cannot create {}: {e}", dest.display()))
    })?;

    let mut names = HashSet::new();
    for source in sources {
        let wanted = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "item".to_string());
        let target = dest.join(unique_name(&wanted, &mut names));

        if source.is_dir() {
            link_tree(source, &target)?;
        } else {
            link_or_copy(source, &target)?;
        }
    }
    Ok(())
}

/// Mirror a directory tree
fn link_tree(root: &Path, target: &Path) -> Result<()> {
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| TransferError::staging(e.to_string()))?;
        let out = target.join(rel);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&out).map_err(|e| {
                TransferError::staging(format!("cannot create {}: {e}", out.display()))
            })?;
        } else if entry.file_type().is_file() {
            link_or_copy(entry.path(), &out)?;
        } else {
            log::debug!("Skipping non-regular entry {}", entry.path().display());
        }
    }
    Ok(())
}

/// Hard-link `src` to `dst`, copying on failure
fn link_or_copy(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            TransferError::staging(format!("cannot create {}: {e}", parent.display()))
        })?;
    }
    if let Err(link_err) = fs::hard_link(src, dst) {
        log::trace!(
            "hard link {} failed ({link_err}), copying instead",
            src.display()
        );
        fs::copy(src, dst).map_err(|e| {
            TransferError::staging(format!("cannot copy {}: {e}", src.display()))
        })?;
    }
    Ok(())
}

fn unique_name(wanted: &str, names: &mut HashSet<String>) -> String {
    if names.insert(wanted.to_string()) {
        return wanted.to_string();
    }

    let path = Path::new(wanted);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| wanted.to_string());
    let ext = path.extension().map(|e| e.to_string_lossy().into_owned());

    let mut idx = 2usize;
    loop {
        let candidate = match &ext {
            Some(ext) => format!("{stem}-{idx}.{ext}"),
            None => format!("{stem}-{idx}"),
        };
        if names.insert(candidate.clone()) {
            return candidate;
        }
        idx += 1;
    }
}
