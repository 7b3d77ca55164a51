//! Payload staging for send sessions
//!
//! Decides whether a send is archived, linked into a batch folder, or sent
//! as-is, and prepares the result on disk without mutating the originals.
//!
//! - `planner` - decision rules and staging execution
//! - `archive` - collision-free archive names and zip compression
//! - `link` - recursive hard-link mirroring with copy fallback
//! - `suffix` - pool of 3-digit batch suffixes

mod archive;
mod link;
mod planner;
mod suffix;

pub use archive::{ARCHIVE_EXTENSION, ArchiveName, allocate_archive_name, compress_folder, is_archive};
pub use link::link_sources_into;
pub use planner::{
    PlanKind, StagingPlan, archive_base_name, decide, existing_sources, remove_dir_quietly,
    remove_file_quietly,
};
pub use suffix::SuffixPool;
