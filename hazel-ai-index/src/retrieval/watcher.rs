//! Filesystem watching with per-file debouncing.
//!
//! Raw notify events are collapsed into a small [`WatchEvent`] union, then
//! pushed over a bounded channel into an async listener that indexes files
//! concurrently. Rapid saves of the same file are collapsed by a per-file
//! cooldown; deletions always go through, since dropping one would leave
//! stale points behind.

use crate::config::IndexConfig;
use crate::retrieval::indexer::Indexer;
use anyhow::{Context, Result};
use futures::StreamExt;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Created,
    Modified,
    Deleted,
    Moved,
}

/// A change to a single path. `dest` is only set for [`WatchEventKind::Moved`].
#[derive(Debug, Clone, PartialEq)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub path: PathBuf,
    pub dest: Option<PathBuf>,
}

impl WatchEvent {
    fn simple(kind: WatchEventKind, path: PathBuf) -> Self {
        Self {
            kind,
            path,
            dest: None,
        }
    }
}

/// Flatten a notify event into zero or more watch events. Access events
/// and metadata-only noise are dropped here, before the channel.
pub(crate) fn map_event(event: Event) -> Vec<WatchEvent> {
    match event.kind {
        EventKind::Create(_) => event
            .paths
            .into_iter()
            .map(|p| WatchEvent::simple(WatchEventKind::Created, p))
            .collect(),
        EventKind::Remove(_) => event
            .paths
            .into_iter()
            .map(|p| WatchEvent::simple(WatchEventKind::Deleted, p))
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            if let [src, dest] = &event.paths[..] {
                vec![WatchEvent {
                    kind: WatchEventKind::Moved,
                    path: src.clone(),
                    dest: Some(dest.clone()),
                }]
            } else {
                // Malformed rename pair; treat each path as modified.
                event
                    .paths
                    .into_iter()
                    .map(|p| WatchEvent::simple(WatchEventKind::Modified, p))
                    .collect()
            }
        }
        // Unpaired rename halves: the old name is gone, the new one is new.
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => event
            .paths
            .into_iter()
            .map(|p| WatchEvent::simple(WatchEventKind::Deleted, p))
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event
            .paths
            .into_iter()
            .map(|p| WatchEvent::simple(WatchEventKind::Created, p))
            .collect(),
        EventKind::Modify(ModifyKind::Metadata(_)) | EventKind::Access(_) => Vec::new(),
        EventKind::Modify(_) => event
            .paths
            .into_iter()
            .map(|p| WatchEvent::simple(WatchEventKind::Modified, p))
            .collect(),
        EventKind::Any | EventKind::Other => Vec::new(),
    }
}

/// Per-file cooldown. A path is admitted when it has no recorded dispatch
/// within the window; admission records the new timestamp.
#[derive(Debug)]
pub struct Debouncer {
    cooldown: Duration,
    last_dispatch: Mutex<HashMap<PathBuf, Instant>>,
}

impl Debouncer {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_dispatch: Mutex::new(HashMap::new()),
        }
    }

    pub fn admit(&self, path: &Path) -> bool {
        let now = Instant::now();
        let mut last = self.last_dispatch.lock().unwrap_or_else(|e| e.into_inner());
        // Expired entries carry no information; evict them so the map
        // tracks only paths still inside their window.
        last.retain(|_, prev| now.duration_since(*prev) < self.cooldown);
        match last.get(path) {
            Some(_) => false,
            None => {
                last.insert(path.to_path_buf(), now);
                true
            }
        }
    }

    /// Clear a path's cooldown so a recreate after delete indexes at once.
    pub fn forget(&self, path: &Path) {
        self.last_dispatch
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(path);
    }
}

/// Keeps the watch alive; dropping or [`stop`](Self::stop)ping it ends it.
pub struct WatchHandle {
    watcher: RecommendedWatcher,
    listener: tokio::task::JoinHandle<()>,
}

impl WatchHandle {
    /// Stop watching and wait for in-flight index work to finish.
    pub async fn stop(self) {
        drop(self.watcher);
        let _ = self.listener.await;
    }
}

/// Watch the indexer's root recursively and apply changes as they happen.
pub async fn start_watching(indexer: Arc<Indexer>, config: &IndexConfig) -> Result<WatchHandle> {
    indexer.ensure_schema().await?;

    let (tx, rx) = mpsc::channel::<WatchEvent>(256);
    let mut watcher = RecommendedWatcher::new(
        move |result: notify::Result<Event>| match result {
            Ok(event) => {
                for watch_event in map_event(event) {
                    // Send fails only when the listener is gone; the
                    // watcher is about to be dropped with it.
                    if tx.blocking_send(watch_event).is_err() {
                        return;
                    }
                }
            }
            Err(e) => warn!(error = %e, "filesystem watch error"),
        },
        notify::Config::default(),
    )
    .context("creating filesystem watcher")?;
    watcher
        .watch(indexer.root(), RecursiveMode::Recursive)
        .with_context(|| format!("watching {}", indexer.root().display()))?;
    info!(root = %indexer.root().display(), "watching for changes");

    let debouncer = Arc::new(Debouncer::new(config.cooldown()));
    let max_concurrent = config.max_concurrent_files.max(1);
    let listener = tokio::spawn(listen(rx, indexer, debouncer, max_concurrent));

    Ok(WatchHandle { watcher, listener })
}

/// Drain the event channel, indexing up to `max_concurrent` files at a
/// time. Per-file locks in the indexer keep concurrent events for the
/// same path serialized.
async fn listen(
    rx: mpsc::Receiver<WatchEvent>,
    indexer: Arc<Indexer>,
    debouncer: Arc<Debouncer>,
    max_concurrent: usize,
) {
    ReceiverStream::new(rx)
        .for_each_concurrent(max_concurrent, |event| {
            let indexer = Arc::clone(&indexer);
            let debouncer = Arc::clone(&debouncer);
            async move {
                if let Err(e) = dispatch(&indexer, &debouncer, &event).await {
                    // One bad file must not stop the watch.
                    error!(?event, error = %e, "failed to apply change");
                }
            }
        })
        .await;
    debug!("watch listener drained");
}

async fn dispatch(indexer: &Indexer, debouncer: &Debouncer, event: &WatchEvent) -> Result<()> {
    match event.kind {
        WatchEventKind::Created | WatchEventKind::Modified => {
            if !indexer.is_eligible(&event.path) {
                return Ok(());
            }
            if !debouncer.admit(&event.path) {
                debug!(path = %event.path.display(), "dropped within cooldown");
                return Ok(());
            }
            indexer.index_file(&event.path).await?;
        }
        WatchEventKind::Deleted => {
            if !indexer.is_eligible(&event.path) {
                return Ok(());
            }
            debouncer.forget(&event.path);
            indexer.remove_file(&event.path).await?;
        }
        WatchEventKind::Moved => {
            if indexer.is_eligible(&event.path) {
                debouncer.forget(&event.path);
                if let Err(e) = indexer.remove_file(&event.path).await {
                    warn!(path = %event.path.display(), error = %e, "failed to remove moved-away file");
                }
            }
            if let Some(dest) = &event.dest {
                if indexer.is_eligible(dest) && debouncer.admit(dest) {
                    indexer.index_file(dest).await?;
                }
            }
        }
    }
    Ok(())
}
