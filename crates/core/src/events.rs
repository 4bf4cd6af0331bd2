//! Filesystem events and what the watcher does with each kind.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsEventKind {
    Created,
    Moved,
    Modified,
    Deleted,
    Opened,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    pub kind: FsEventKind,
    pub path: PathBuf,
    /// New location for moves, when the backend reports it.
    pub dest_path: Option<PathBuf>,
    pub is_dir: bool,
}

impl FsEvent {
    pub fn new(kind: FsEventKind, path: impl Into<PathBuf>, is_dir: bool) -> Self {
        Self {
            kind,
            path: path.into(),
            dest_path: None,
            is_dir,
        }
    }

    pub fn moved(from: impl Into<PathBuf>, to: impl Into<PathBuf>, is_dir: bool) -> Self {
        Self {
            kind: FsEventKind::Moved,
            path: from.into(),
            dest_path: Some(to.into()),
            is_dir,
        }
    }

    /// The path the watcher acts on: where the entry lives now.
    pub fn target(&self) -> &Path {
        self.dest_path.as_deref().unwrap_or(&self.path)
    }
}

/// What a dispatched event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    FixedAndRescanned,
    Rescanned,
    Ignored,
}

/// Side effects available to the dispatcher.
#[async_trait::async_trait]
pub trait EventSink: Send + Sync {
    /// Best-effort permission fixup of a single path.
    fn normalize_one(&self, path: &Path);

    async fn rescan(&self, paths: Vec<PathBuf>) -> anyhow::Result<()>;
}

/// Handles one event. New or moved files get their permissions (and their
/// directory's) fixed before the rescan; modified files are only rescanned.
/// Directory events and deletes, opens and closes do nothing.
pub async fn dispatch(event: &FsEvent, sink: &dyn EventSink) -> anyhow::Result<Dispatched> {
    if event.is_dir {
        return Ok(Dispatched::Ignored);
    }
    let path = event.target();
    match event.kind {
        FsEventKind::Created | FsEventKind::Moved => {
            tracing::info!("file {:?}: {:?}", event.kind, path);
            sink.normalize_one(path);
            if let Some(parent) = path.parent() {
                sink.normalize_one(parent);
            }
            sink.rescan(vec![path.to_path_buf()]).await?;
            Ok(Dispatched::FixedAndRescanned)
        }
        FsEventKind::Modified => {
            tracing::info!("file modified: {:?}", path);
            sink.rescan(vec![path.to_path_buf()]).await?;
            Ok(Dispatched::Rescanned)
        }
        _ => Ok(Dispatched::Ignored),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, PartialEq, Eq)]
    enum Call {
        Normalize(PathBuf),
        Rescan(Vec<PathBuf>),
    }

    #[derive(Default)]
    struct RecordingSink {
        calls: Mutex<Vec<Call>>,
        fail_rescan: bool,
    }

    #[async_trait::async_trait]
    impl EventSink for RecordingSink {
        fn normalize_one(&self, path: &Path) {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Normalize(path.to_path_buf()));
        }

        async fn rescan(&self, paths: Vec<PathBuf>) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(Call::Rescan(paths));
            if self.fail_rescan {
                anyhow::bail!("server down");
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn created_file_fixes_file_and_parent_then_rescans() {
        let sink = RecordingSink::default();
        let ev = FsEvent::new(FsEventKind::Created, "/lib/movies/foo.mp4", false);
        let out = dispatch(&ev, &sink).await.unwrap();
        assert_eq!(out, Dispatched::FixedAndRescanned);
        assert_eq!(
            *sink.calls.lock().unwrap(),
            vec![
                Call::Normalize(PathBuf::from("/lib/movies/foo.mp4")),
                Call::Normalize(PathBuf::from("/lib/movies")),
                Call::Rescan(vec![PathBuf::from("/lib/movies/foo.mp4")]),
            ]
        );
    }

    #[tokio::test]
    async fn moved_file_acts_on_destination() {
        let sink = RecordingSink::default();
        let ev = FsEvent::moved("/dl/.downloading/a.mkv", "/lib/tv/a.mkv", false);
        dispatch(&ev, &sink).await.unwrap();
        assert_eq!(
            *sink.calls.lock().unwrap(),
            vec![
                Call::Normalize(PathBuf::from("/lib/tv/a.mkv")),
                Call::Normalize(PathBuf::from("/lib/tv")),
                Call::Rescan(vec![PathBuf::from("/lib/tv/a.mkv")]),
            ]
        );
    }

    #[tokio::test]
    async fn modified_file_only_rescans() {
        let sink = RecordingSink::default();
        let ev = FsEvent::new(FsEventKind::Modified, "/lib/a.mp4", false);
        assert_eq!(dispatch(&ev, &sink).await.unwrap(), Dispatched::Rescanned);
        assert_eq!(
            *sink.calls.lock().unwrap(),
            vec![Call::Rescan(vec![PathBuf::from("/lib/a.mp4")])]
        );
    }

    #[tokio::test]
    async fn deletes_opens_and_closes_do_nothing() {
        let sink = RecordingSink::default();
        for kind in [FsEventKind::Deleted, FsEventKind::Opened, FsEventKind::Closed] {
            let ev = FsEvent::new(kind, "/lib/a.mp4", false);
            assert_eq!(dispatch(&ev, &sink).await.unwrap(), Dispatched::Ignored);
        }
        assert!(sink.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn directory_events_are_ignored() {
        let sink = RecordingSink::default();
        for kind in [FsEventKind::Created, FsEventKind::Moved, FsEventKind::Modified] {
            let ev = FsEvent::new(kind, "/lib/new-dir", true);
            assert_eq!(dispatch(&ev, &sink).await.unwrap(), Dispatched::Ignored);
        }
        assert!(sink.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rescan_failure_is_returned() {
        let sink = RecordingSink {
            fail_rescan: true,
            ..Default::default()
        };
        let ev = FsEvent::new(FsEventKind::Modified, "/lib/a.mp4", false);
        assert!(dispatch(&ev, &sink).await.is_err());
    }
}
