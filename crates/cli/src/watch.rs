use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use notify::event::{AccessKind, CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use stash_watcher_core::config::{WatchBackend, WatchConfig};
use stash_watcher_core::events::{self, EventSink, FsEvent, FsEventKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// A running watcher. Events keep flowing until [`WatchHandle::stop`].
pub struct WatchHandle {
    watcher: Box<dyn Watcher + Send>,
    stop_tx: watch::Sender<bool>,
    consumer: JoinHandle<()>,
}

impl WatchHandle {
    /// Lets the event being handled finish, discards the rest of the queue
    /// and shuts the backend down.
    pub async fn stop(self) {
        self.stop_tx.send_replace(true);
        if let Err(e) = self.consumer.await {
            error!("watch consumer ended abnormally: {}", e);
        }
        drop(self.watcher);
    }
}

/// Subscribes recursively to every directory in `dirs` and dispatches their
/// events, one at a time, to `sink`. Every directory must already exist.
pub fn spawn_watcher(
    dirs: &[PathBuf],
    cfg: &WatchConfig,
    sink: Arc<dyn EventSink>,
) -> Result<WatchHandle> {
    for dir in dirs {
        if !dir.is_dir() {
            bail!("watch directory {:?} does not exist", dir);
        }
    }
    let ignore = build_ignore_set(&cfg.ignore)?;
    let (tx, mut rx) = mpsc::channel::<FsEvent>(cfg.channel_capacity.max(1));

    let handler = move |res: notify::Result<Event>| match res {
        Ok(event) => {
            for ev in to_fs_events(&event) {
                if is_ignored(&ev, &ignore) {
                    debug!("ignoring event on {:?}", ev.target());
                    continue;
                }
                // Runs on the backend thread; a full channel blocks it.
                if tx.blocking_send(ev).is_err() {
                    return;
                }
            }
        }
        Err(e) => error!("watch error: {}", e),
    };

    let notify_cfg =
        notify::Config::default().with_poll_interval(Duration::from_secs(cfg.poll_interval_secs));
    let mut watcher: Box<dyn Watcher + Send> = match cfg.backend {
        WatchBackend::Poll => Box::new(PollWatcher::new(handler, notify_cfg)?),
        WatchBackend::Native => Box::new(RecommendedWatcher::new(handler, notify_cfg)?),
    };
    for dir in dirs {
        watcher
            .watch(dir, RecursiveMode::Recursive)
            .with_context(|| format!("watching {:?}", dir))?;
        info!("watching {:?}", dir);
    }

    let (stop_tx, mut stop_rx) = watch::channel(false);
    let consumer = tokio::spawn(async move {
        loop {
            let ev = tokio::select! {
                biased;
                _ = stop_rx.wait_for(|stopped| *stopped) => break,
                ev = rx.recv() => match ev {
                    Some(ev) => ev,
                    None => break,
                },
            };
            match events::dispatch(&ev, sink.as_ref()).await {
                Ok(outcome) => debug!("{:?} {:?}: {:?}", ev.kind, ev.target(), outcome),
                Err(e) => error!("error handling {:?} on {:?}: {:#}", ev.kind, ev.target(), e),
            }
            if *stop_rx.borrow() {
                break;
            }
        }
        debug!("watch consumer stopped");
    });

    Ok(WatchHandle {
        watcher,
        stop_tx,
        consumer,
    })
}

pub fn build_ignore_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("bad ignore pattern {:?}", pat))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

/// Matches where the entry lives now, so a move out of an ignored staging
/// folder into a watched root still gets through.
fn is_ignored(ev: &FsEvent, ignore: &GlobSet) -> bool {
    ignore.is_match(ev.target())
}

/// Maps one backend event onto the watcher's event kinds. Renames reported
/// as a pair become a single move to the second path.
pub fn to_fs_events(event: &Event) -> Vec<FsEvent> {
    let each = |kind: FsEventKind, folder: Option<bool>| -> Vec<FsEvent> {
        event
            .paths
            .iter()
            .map(|p| FsEvent::new(kind, p, folder.unwrap_or_else(|| is_dir(p))))
            .collect()
    };
    match &event.kind {
        EventKind::Create(kind) => each(FsEventKind::Created, folder_hint_create(kind)),
        EventKind::Remove(kind) => each(
            FsEventKind::Deleted,
            Some(matches!(kind, RemoveKind::Folder)),
        ),
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::Both if event.paths.len() >= 2 => {
                let from = &event.paths[0];
                let to = &event.paths[event.paths.len() - 1];
                vec![FsEvent::moved(from, to, is_dir(to))]
            }
            RenameMode::From => each(FsEventKind::Deleted, Some(false)),
            _ => event
                .paths
                .iter()
                .map(|p| {
                    if p.exists() {
                        FsEvent::new(FsEventKind::Moved, p, is_dir(p))
                    } else {
                        FsEvent::new(FsEventKind::Deleted, p, false)
                    }
                })
                .collect(),
        },
        EventKind::Modify(_) => each(FsEventKind::Modified, None),
        EventKind::Access(AccessKind::Open(_)) => each(FsEventKind::Opened, None),
        EventKind::Access(AccessKind::Close(_)) => each(FsEventKind::Closed, None),
        _ => Vec::new(),
    }
}

fn folder_hint_create(kind: &CreateKind) -> Option<bool> {
    match kind {
        CreateKind::Folder => Some(true),
        CreateKind::File => Some(false),
        _ => None,
    }
}

fn is_dir(path: &Path) -> bool {
    path.is_dir()
}
