//! Integration tests for payload staging
//!
//! Exercises the planner rules and staged output on a real filesystem

use kodegen_p2p_transfer::staging::{
    PlanKind, StagingPlan, SuffixPool, decide, existing_sources, link_sources_into,
};
use kodegen_p2p_transfer::{PayloadDescriptor, SendOptions};
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::PathBuf;

fn write(dir: &std::path::Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, name).unwrap();
    path
}

#[test]
fn test_decide_rules() {
    let tmp = tempfile::tempdir().unwrap();
    let a = write(tmp.path(), "a.txt");
    let b = write(tmp.path(), "b.txt");
    let zip = write(tmp.path(), "bundle.zip");

    let two = vec![a.clone(), b.clone()];
    assert_eq!(decide(&two, SendOptions::default()), PlanKind::Archive);
    assert_eq!(decide(&two, SendOptions::archive()), PlanKind::Archive);
    assert_eq!(decide(&two, SendOptions::no_archive()), PlanKind::BatchFolder);

    assert_eq!(decide(&[a.clone()], SendOptions::default()), PlanKind::AsIs);
    assert_eq!(decide(&[a], SendOptions::archive()), PlanKind::Archive);

    // Never re-archive an archive
    assert_eq!(decide(&[zip.clone()], SendOptions::archive()), PlanKind::AsIs);
    assert_eq!(decide(&[zip], SendOptions::default()), PlanKind::AsIs);
}

#[test]
fn test_missing_sources_are_dropped() {
    let tmp = tempfile::tempdir().unwrap();
    let a = write(tmp.path(), "a.txt");
    let gone = tmp.path().join("gone.txt");
    assert_eq!(existing_sources(&[a.clone(), gone]), vec![a]);
}

#[test]
fn test_archive_plan_removes_staging_folder() {
    let tmp = tempfile::tempdir().unwrap();
    let a = write(tmp.path(), "a.txt");
    let b = write(tmp.path(), "b.txt");
    let archives = tmp.path().join("archives");

    let payload = StagingPlan::Archive {
        sources: vec![a.clone(), b],
        dir: archives.clone(),
        base: "bundle".to_string(),
        attempts: 16,
    }
    .execute()
    .unwrap();

    let PayloadDescriptor::Archive { path } = payload else {
        panic!("expected an archive payload, got {payload:?}");
    };
    assert!(path.is_file());
    assert!(path.file_name().unwrap().to_string_lossy().starts_with("bundle_"));
    // Only the archive is left; the staging folder is gone
    let entries: Vec<_> = fs::read_dir(&archives).unwrap().collect();
    assert_eq!(entries.len(), 1);
    // Originals untouched
    assert_eq!(fs::read_to_string(&a).unwrap(), "a.txt");

    let archive = zip::ZipArchive::new(fs::File::open(&path).unwrap()).unwrap();
    let mut names: Vec<&str> = archive.file_names().collect();
    names.sort_unstable();
    assert_eq!(names, vec!["a.txt", "b.txt"]);
}

#[test]
fn test_batch_folder_hard_links_sources() {
    let tmp = tempfile::tempdir().unwrap();
    let a = write(tmp.path(), "a.txt");
    let nested = tmp.path().join("dir");
    fs::create_dir_all(nested.join("inner")).unwrap();
    fs::write(nested.join("inner/c.txt"), "c").unwrap();

    let folder = tmp.path().join("batches/batch_001");
    let payload = StagingPlan::BatchFolder {
        sources: vec![a.clone(), nested],
        folder: folder.clone(),
    }
    .execute()
    .unwrap();

    assert_eq!(payload, PayloadDescriptor::BatchFolder { path: folder.clone() });
    assert!(folder.join("dir/inner/c.txt").is_file());
    let linked = fs::metadata(folder.join("a.txt")).unwrap();
    let original = fs::metadata(&a).unwrap();
    assert_eq!(linked.ino(), original.ino());
}

#[test]
fn test_clashing_names_are_deduplicated() {
    let tmp = tempfile::tempdir().unwrap();
    let first = tmp.path().join("one");
    let second = tmp.path().join("two");
    fs::create_dir_all(&first).unwrap();
    fs::create_dir_all(&second).unwrap();
    let x1 = write(&first, "x.txt");
    let x2 = write(&second, "x.txt");

    let dest = tmp.path().join("dest");
    link_sources_into(&[x1, x2], &dest).unwrap();
    assert!(dest.join("x.txt").is_file());
    assert!(dest.join("x-2.txt").is_file());
}

#[test]
fn test_failed_batch_leaves_nothing_behind() {
    let tmp = tempfile::tempdir().unwrap();
    let folder = tmp.path().join("batch_002");
    let result = StagingPlan::BatchFolder {
        sources: vec![tmp.path().join("missing.txt")],
        folder: folder.clone(),
    }
    .execute();
    assert!(result.is_err());
    assert!(!folder.exists());
}

#[test]
fn test_suffix_pool_uniqueness_and_reuse() {
    let mut pool = SuffixPool::new(3);
    let mut seen = std::collections::HashSet::new();
    for _ in 0..3 {
        assert!(seen.insert(pool.allocate()));
    }
    // Exhausted pool falls back to a timestamp suffix
    let fallback = pool.allocate();
    assert!(fallback.starts_with('t'));

    let released = seen.iter().next().unwrap().clone();
    assert!(pool.release(&released));
    assert!(!pool.release(&released));
    assert_eq!(pool.allocate(), released);
}
