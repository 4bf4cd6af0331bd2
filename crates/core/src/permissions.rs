//! Forces ownership and mode bits on the shared download/provisioning trees
//! so every container running as the target user can read and write them.

use serde::Serialize;
use std::fs::{self, Metadata, Permissions};
use std::io;
use std::os::unix::fs::{chown, MetadataExt, PermissionsExt};
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// rwxrwsr-x: setgid so new entries inherit the group.
pub const DIR_MODE: u32 = 0o2775;
/// rw-rw-r--
pub const FILE_MODE: u32 = 0o0664;

/// Only this many per-entry errors per pass are logged at warn level.
const VERBOSE_ERRORS: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NormalizeReport {
    /// Number of chown/chmod calls issued.
    pub fixed: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionNormalizer {
    uid: u32,
    gid: u32,
}

impl PermissionNormalizer {
    pub fn new(uid: u32, gid: u32) -> Self {
        Self { uid, gid }
    }

    /// Walks every root and fixes whatever differs from the target owner and
    /// mode. Symlinks are never touched or followed; missing roots are skipped.
    pub fn normalize<P: AsRef<Path>>(&self, roots: &[P]) -> NormalizeReport {
        let mut report = NormalizeReport::default();
        for root in roots {
            let root = root.as_ref();
            if fs::symlink_metadata(root).is_err() {
                debug!("permission root {:?} does not exist, skipping", root);
                continue;
            }
            for entry in WalkDir::new(root).follow_links(false) {
                let entry = match entry {
                    Ok(e) => e,
                    Err(e) => {
                        report.errors += 1;
                        log_entry_error(report.errors, e.path().unwrap_or(root), &e);
                        continue;
                    }
                };
                if entry.file_type().is_symlink() {
                    continue;
                }
                let result = entry
                    .metadata()
                    .map_err(io::Error::from)
                    .and_then(|meta| self.fix(entry.path(), &meta));
                match result {
                    Ok(n) => report.fixed += n,
                    Err(e) => {
                        report.errors += 1;
                        log_entry_error(report.errors, entry.path(), &e);
                    }
                }
            }
        }

        if report.fixed > 0 || report.errors > 0 {
            info!(
                "permission pass done: {} fixes applied, {} errors",
                report.fixed, report.errors
            );
        } else {
            info!("permission pass done: all permissions OK");
        }
        report
    }

    /// Single-path fixup for freshly observed files. Errors are swallowed:
    /// the periodic full pass repairs anything missed here.
    pub fn normalize_one(&self, path: &Path) {
        let meta = match fs::symlink_metadata(path) {
            Ok(m) => m,
            Err(_) => return,
        };
        if meta.file_type().is_symlink() {
            return;
        }
        if let Err(e) = self.fix(path, &meta) {
            debug!("could not fix permissions on {:?}: {}", path, e);
        }
    }

    /// Returns how many calls were needed to bring `path` in line.
    fn fix(&self, path: &Path, meta: &Metadata) -> io::Result<usize> {
        let mut fixed = 0;
        if meta.uid() != self.uid || meta.gid() != self.gid {
            chown(path, Some(self.uid), Some(self.gid))?;
            fixed += 1;
        }
        let target = if meta.is_dir() { DIR_MODE } else { FILE_MODE };
        if meta.mode() & 0o7777 != target {
            fs::set_permissions(path, Permissions::from_mode(target))?;
            fixed += 1;
        }
        Ok(fixed)
    }
}

fn log_entry_error(count: usize, path: &Path, err: &dyn std::fmt::Display) {
    if count <= VERBOSE_ERRORS {
        warn!("permission fix failed on {:?}: {}", path, err);
    } else {
        debug!("permission fix failed on {:?}: {}", path, err);
    }
}
