//! Recursive workspace watcher.
//!
//! Watches the workspace subtree via `notify`, registering each non-hidden
//! directory individually so hidden trees (including the git metadata
//! directory) are pruned at the source. Classified events fan out to
//! bounded subscriber channels; a subscriber that cannot keep up loses
//! events rather than stalling the loop. Consumers must tolerate loss:
//! the commit pipeline re-stages the whole tree, and remote watchers can
//! resync with Stat.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::task::{Context, Poll};

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

use crate::constants::SUBSCRIBER_BUFFER;

/// The portable classification of a raw filesystem notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
    Renamed,
}

/// A change to one workspace-relative path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Workspace-relative, `/`-rooted.
    pub path: String,
    pub kind: ChangeKind,
}

struct WatchShared {
    root: PathBuf,
    os_watcher: Mutex<Option<RecommendedWatcher>>,
    subscribers: RwLock<HashMap<u64, mpsc::Sender<ChangeEvent>>>,
    next_id: AtomicU64,
}

/// Watches the workspace subtree and broadcasts change events.
pub struct WorkspaceWatcher {
    shared: Arc<WatchShared>,
}

impl WorkspaceWatcher {
    /// Walk the root, register every non-hidden directory with the OS
    /// watcher, and start the event loop.
    pub fn new(root: impl Into<PathBuf>) -> notify::Result<Self> {
        let root = root.into();

        let (raw_tx, raw_rx) = std_mpsc::channel::<notify::Result<Event>>();
        let mut os_watcher = RecommendedWatcher::new(
            move |result: notify::Result<Event>| {
                let _ = raw_tx.send(result);
            },
            notify::Config::default(),
        )?;

        watch_tree(&mut os_watcher, &root, true)?;

        let shared = Arc::new(WatchShared {
            root,
            os_watcher: Mutex::new(Some(os_watcher)),
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        });

        // Dedicated event loop; exits when the OS watcher is dropped and the
        // raw channel closes.
        let loop_shared = Arc::clone(&shared);
        std::thread::spawn(move || {
            for result in raw_rx {
                match result {
                    Ok(event) => handle_event(&loop_shared, event),
                    Err(err) => {
                        tracing::warn!(error = %err, "filesystem watcher error");
                    }
                }
            }
        });

        Ok(Self { shared })
    }

    pub fn root(&self) -> &Path {
        &self.shared.root
    }

    /// Register a subscriber. The subscription unsubscribes itself on drop.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        self.shared.subscribers.write().insert(id, tx);
        Subscription {
            id,
            rx,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Number of live subscribers (test hook).
    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.read().len()
    }

    /// Stop the OS watcher and disconnect every subscriber. Subsequent
    /// calls are no-ops.
    pub fn close(&self) {
        drop(self.shared.os_watcher.lock().take());
        self.shared.subscribers.write().clear();
    }
}

/// A live change-event subscription.
///
/// The channel closes when the watcher closes; dropping the subscription
/// removes it from the subscriber set, which closes the channel exactly
/// once.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<ChangeEvent>,
    shared: Arc<WatchShared>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.rx.recv().await
    }

    pub fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<ChangeEvent>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.shared.subscribers.write().remove(&self.id);
    }
}

fn hidden(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

/// Register `dir` and every non-hidden directory below it. Unreadable
/// subtrees are skipped, matching the best-effort contract of the stream.
fn watch_tree(watcher: &mut RecommendedWatcher, dir: &Path, is_root: bool) -> notify::Result<()> {
    if !is_root && hidden(dir) {
        return Ok(());
    }

    watcher.watch(dir, RecursiveMode::NonRecursive)?;

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Ok(()),
    };
    for entry in entries.flatten() {
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            watch_tree(watcher, &entry.path(), false)?;
        }
    }
    Ok(())
}

fn classify(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Created),
        EventKind::Modify(ModifyKind::Name(_)) => Some(ChangeKind::Renamed),
        EventKind::Modify(_) => Some(ChangeKind::Modified),
        EventKind::Remove(_) => Some(ChangeKind::Deleted),
        _ => None,
    }
}

fn handle_event(shared: &Arc<WatchShared>, event: Event) {
    let Some(kind) = classify(&event.kind) else {
        return;
    };

    for path in &event.paths {
        let Ok(rel) = path.strip_prefix(&shared.root) else {
            continue;
        };
        let wire_path = format!("/{}", rel.display());

        // New non-hidden directories join the watch set so events keep
        // flowing below them.
        if kind == ChangeKind::Created && !hidden(path) && path.is_dir() {
            if let Some(watcher) = shared.os_watcher.lock().as_mut() {
                if let Err(err) = watcher.watch(path, RecursiveMode::NonRecursive) {
                    tracing::warn!(path = %path.display(), error = %err, "failed to watch new directory");
                }
            }
        }

        broadcast(
            shared,
            ChangeEvent {
                path: wire_path,
                kind,
            },
        );
    }
}

fn broadcast(shared: &Arc<WatchShared>, event: ChangeEvent) {
    let subscribers = shared.subscribers.read();
    for tx in subscribers.values() {
        match tx.try_send(event.clone()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                // Slow subscribers catch up via Stat.
                tracing::debug!(path = %event.path, "dropped change event for slow subscriber");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn recv_event(sub: &mut Subscription) -> ChangeEvent {
        tokio::time::timeout(Duration::from_secs(3), sub.recv())
            .await
            .expect("timed out waiting for change event")
            .expect("watcher closed unexpectedly")
    }

    #[tokio::test]
    async fn delivers_create_event_with_wire_path() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let watcher = WorkspaceWatcher::new(&root).unwrap();
        let mut sub = watcher.subscribe();

        std::fs::write(root.join("a.txt"), b"hello").unwrap();

        let event = recv_event(&mut sub).await;
        assert_eq!(event.path, "/a.txt");
        assert_eq!(event.kind, ChangeKind::Created);

        watcher.close();
    }

    #[tokio::test]
    async fn new_subdirectory_is_watched() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let watcher = WorkspaceWatcher::new(&root).unwrap();
        let mut sub = watcher.subscribe();

        std::fs::create_dir(root.join("sub")).unwrap();
        let event = recv_event(&mut sub).await;
        assert_eq!(event.path, "/sub");

        // Give the event loop a beat to register the new directory, then
        // create inside it.
        tokio::time::sleep(Duration::from_millis(200)).await;
        std::fs::write(root.join("sub/inner.txt"), b"x").unwrap();

        loop {
            let event = recv_event(&mut sub).await;
            if event.path == "/sub/inner.txt" {
                break;
            }
        }

        watcher.close();
    }

    #[tokio::test]
    async fn unsubscribe_on_drop_removes_from_set() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = WorkspaceWatcher::new(dir.path()).unwrap();

        let sub = watcher.subscribe();
        let sub2 = watcher.subscribe();
        assert_eq!(watcher.subscriber_count(), 2);

        drop(sub);
        assert_eq!(watcher.subscriber_count(), 1);
        drop(sub2);
        assert_eq!(watcher.subscriber_count(), 0);

        watcher.close();
    }

    #[tokio::test]
    async fn close_disconnects_subscribers() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = WorkspaceWatcher::new(dir.path()).unwrap();
        let mut sub = watcher.subscribe();

        watcher.close();
        watcher.close(); // idempotent

        assert!(sub.recv().await.is_none());
    }
}
