#![cfg(unix)]

use stash_watcher_core::permissions::{PermissionNormalizer, DIR_MODE, FILE_MODE};
use std::fs::{self, Permissions};
use std::os::unix::fs::{symlink, MetadataExt, PermissionsExt};
use std::path::Path;
use tempfile::tempdir;

fn mode(path: &Path) -> u32 {
    fs::symlink_metadata(path).unwrap().mode() & 0o7777
}

/// A normalizer targeting whoever owns the temp dir, so chown is a no-op
/// that succeeds without privileges.
fn own_normalizer(root: &Path) -> PermissionNormalizer {
    let meta = fs::metadata(root).unwrap();
    PermissionNormalizer::new(meta.uid(), meta.gid())
}

#[test]
fn files_and_dirs_get_target_modes() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("torrents");
    let sub = root.join("show");
    fs::create_dir_all(&sub).unwrap();
    let file = sub.join("ep1.mkv");
    fs::write(&file, b"x").unwrap();
    fs::set_permissions(&file, Permissions::from_mode(0o600)).unwrap();
    fs::set_permissions(&sub, Permissions::from_mode(0o700)).unwrap();

    let report = own_normalizer(tmp.path()).normalize(&[&root]);

    assert_eq!(report.errors, 0);
    assert!(report.fixed >= 2);
    assert_eq!(mode(&file), FILE_MODE);
    assert_eq!(mode(&sub), DIR_MODE);
    assert_eq!(mode(&root), DIR_MODE);
}

#[test]
fn second_pass_changes_nothing() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("provision");
    fs::create_dir_all(root.join("a/b")).unwrap();
    fs::write(root.join("a/b/f.txt"), b"x").unwrap();
    let normalizer = own_normalizer(tmp.path());

    normalizer.normalize(&[&root]);
    let again = normalizer.normalize(&[&root]);

    assert_eq!(again.fixed, 0);
    assert_eq!(again.errors, 0);
}

#[test]
fn symlinks_are_left_alone() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("root");
    fs::create_dir_all(&root).unwrap();
    let outside = tmp.path().join("outside.txt");
    fs::write(&outside, b"x").unwrap();
    fs::set_permissions(&outside, Permissions::from_mode(0o600)).unwrap();
    symlink(&outside, root.join("link")).unwrap();

    let normalizer = own_normalizer(tmp.path());
    normalizer.normalize(&[&root]);
    normalizer.normalize_one(&root.join("link"));

    assert_eq!(mode(&outside), 0o600);
}

#[test]
fn missing_root_is_skipped() {
    let tmp = tempdir().unwrap();
    let report = own_normalizer(tmp.path()).normalize(&[tmp.path().join("nope")]);
    assert_eq!(report.fixed, 0);
    assert_eq!(report.errors, 0);
}

#[test]
fn single_path_fix_ignores_missing_files() {
    let tmp = tempdir().unwrap();
    let normalizer = own_normalizer(tmp.path());
    normalizer.normalize_one(&tmp.path().join("gone.mp4"));

    let file = tmp.path().join("new.mp4");
    fs::write(&file, b"x").unwrap();
    fs::set_permissions(&file, Permissions::from_mode(0o644)).unwrap();
    normalizer.normalize_one(&file);
    assert_eq!(mode(&file), FILE_MODE);
}

/// Builds a directory chain whose full path is longer than PATH_MAX by
/// moving each level under a new parent. Every path used while building it
/// stays short, but walking it from the top cannot stat the deepest entries.
fn chain_deeper_than_path_max(base: &Path) -> std::path::PathBuf {
    let name = |i: usize| format!("{i:03}{}", "d".repeat(200));
    let mut top = base.join(name(0));
    fs::create_dir(&top).unwrap();
    fs::write(top.join("leaf.txt"), b"x").unwrap();
    for i in 1..30 {
        let parent = base.join(name(i));
        fs::create_dir(&parent).unwrap();
        fs::rename(&top, parent.join(name(i - 1))).unwrap();
        top = parent;
    }
    top
}

#[test]
fn entry_errors_are_counted_and_the_walk_continues() {
    let tmp = tempdir().unwrap();
    let deep_base = tmp.path().join("deep");
    fs::create_dir(&deep_base).unwrap();
    let deep = chain_deeper_than_path_max(&deep_base);

    let ok_root = tmp.path().join("ok");
    fs::create_dir(&ok_root).unwrap();
    let file = ok_root.join("after.mkv");
    fs::write(&file, b"x").unwrap();
    fs::set_permissions(&file, Permissions::from_mode(0o600)).unwrap();

    let report = own_normalizer(tmp.path()).normalize(&[&deep, &ok_root]);

    assert!(report.errors > 0, "{report:?}");
    assert!(report.fixed > 0);
    assert_eq!(mode(&deep), DIR_MODE);
    assert_eq!(mode(&file), FILE_MODE);
}
