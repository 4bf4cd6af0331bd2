//! On-disk layout the watcher relies on: the staging folders under the data
//! root and the library roots it watches.

use providers::LibraryServer;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Created under the data root at startup if absent.
pub const DATA_SUBDIRS: &[&str] = &[
    "torrents-stash/.downloading",
    "torrents-stash/.torrents",
    "torrents-stash/tv-whisparr",
    "torrents-stash/whisparr",
];

pub fn ensure_data_root(root: &Path) -> io::Result<()> {
    for sub in DATA_SUBDIRS {
        fs::create_dir_all(root.join(sub))?;
    }
    Ok(())
}

/// Library roots that hold video or image content, in server order.
pub async fn watch_directories(server: &dyn LibraryServer) -> anyhow::Result<Vec<PathBuf>> {
    let roots = server.library_roots().await?;
    Ok(roots
        .into_iter()
        .filter(|r| r.includes_media())
        .map(|r| PathBuf::from(r.path))
        .collect())
}

/// Creates missing watch directories. Failures are only logged here; the
/// watcher refuses to subscribe to a directory that still does not exist.
pub fn ensure_watch_dirs(dirs: &[PathBuf]) {
    for dir in dirs {
        if dir.exists() {
            continue;
        }
        match fs::create_dir_all(dir) {
            Ok(()) => info!("created watch directory {:?}", dir),
            Err(e) => error!("error creating directory {:?}: {}", dir, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_root_subdirs_are_created_idempotently() {
        let dir = tempfile::tempdir().unwrap();
        ensure_data_root(dir.path()).unwrap();
        ensure_data_root(dir.path()).unwrap();
        for sub in DATA_SUBDIRS {
            assert!(dir.path().join(sub).is_dir(), "{sub} missing");
        }
    }

    #[test]
    fn missing_watch_dirs_are_created() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        ensure_watch_dirs(&[nested.clone()]);
        assert!(nested.is_dir());
    }
}
