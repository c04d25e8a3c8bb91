//! Snapshot persistence: atomic JSON file plus a debounced background writer.
//!
//! DESIGN
//! ======
//! State mutations never touch the disk. Callers hand the current snapshot
//! to [`PersistHandle::mark_dirty`]; a background task waits for
//! `debounce` of quiet and writes only the latest one. Shutting the handle
//! down flushes anything still unsaved.
//!
//! ERROR HANDLING
//! ==============
//! A failed write is logged and the snapshot stays pending, so the next
//! change or the shutdown flush tries again. Writes go to a temp file that
//! is renamed over the target, so a crash never leaves a torn snapshot.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use canvas::registry::{Widget, WidgetId};
use canvas::viewport::Viewport;
use progress::Checklist;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::ClientError;

pub const SNAPSHOT_VERSION: u32 = 1;

/// Everything needed to restore a workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub widgets: Vec<Widget>,
    pub viewport: Viewport,
    #[serde(default)]
    pub checklists: BTreeMap<WidgetId, Checklist>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            widgets: Vec::new(),
            viewport: Viewport::default(),
            checklists: BTreeMap::new(),
        }
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(std::ffi::OsStr::to_os_string).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `snapshot` to `path` via a temp file and rename.
///
/// # Errors
///
/// Returns [`ClientError::Json`] if serialization fails and
/// [`ClientError::Persist`] for any I/O failure.
pub async fn save_snapshot(path: &Path, snapshot: &Snapshot) -> Result<(), ClientError> {
    let json = serde_json::to_vec_pretty(snapshot)?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = temp_path(path);
    tokio::fs::write(&tmp, &json).await?;
    tokio::fs::rename(&tmp, path).await?;
    debug!(path = %path.display(), bytes = json.len(), "snapshot saved");
    Ok(())
}

/// Read a snapshot. A missing file is `Ok(None)`.
///
/// # Errors
///
/// Returns [`ClientError::Persist`] for I/O failures or a snapshot written
/// by a newer version, and [`ClientError::Json`] for a corrupt file.
pub async fn load_snapshot(path: &Path) -> Result<Option<Snapshot>, ClientError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
    if snapshot.version > SNAPSHOT_VERSION {
        return Err(ClientError::Persist(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("snapshot version {} is newer than {SNAPSHOT_VERSION}", snapshot.version),
        )));
    }
    Ok(Some(snapshot))
}

// =============================================================================
// BACKGROUND WRITER
// =============================================================================

#[derive(Debug, Default)]
struct Pending {
    generation: u64,
    snapshot: Option<Arc<Snapshot>>,
}

/// Handle to the debounced writer.
pub struct PersistHandle {
    tx: watch::Sender<Pending>,
    join: JoinHandle<()>,
}

impl PersistHandle {
    /// Queue `snapshot` as the state to persist. Never blocks, never does I/O.
    pub fn mark_dirty(&self, snapshot: Snapshot) {
        self.tx.send_modify(|pending| {
            pending.generation += 1;
            pending.snapshot = Some(Arc::new(snapshot));
        });
    }

    /// Stop the writer after flushing any unsaved snapshot.
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.join.await {
            error!(error = %e, "persist worker panicked");
        }
    }
}

/// Spawn the debounced writer for `path`.
#[must_use]
pub fn spawn_persist_worker(path: PathBuf, debounce: Duration) -> PersistHandle {
    let (tx, rx) = watch::channel(Pending::default());
    info!(path = %path.display(), ?debounce, "snapshot persistence configured");
    let join = tokio::spawn(run_worker(path, debounce, rx));
    PersistHandle { tx, join }
}

async fn run_worker(path: PathBuf, debounce: Duration, mut rx: watch::Receiver<Pending>) {
    let mut saved_generation = 0u64;
    loop {
        let mut closed = rx.changed().await.is_err();

        // PHASE: DEBOUNCE
        // Keep waiting while changes keep arriving inside the window.
        while !closed {
            match tokio::time::timeout(debounce, rx.changed()).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => closed = true,
                Err(_) => break,
            }
        }

        // PHASE: WRITE LATEST
        let (generation, snapshot) = {
            let pending = rx.borrow_and_update();
            (pending.generation, pending.snapshot.clone())
        };
        if generation > saved_generation
            && let Some(snapshot) = snapshot
        {
            match save_snapshot(&path, &snapshot).await {
                Ok(()) => saved_generation = generation,
                Err(e) => error!(error = %e, path = %path.display(), generation, "snapshot save failed"),
            }
        }

        if closed {
            break;
        }
    }
}

#[cfg(test)]
#[path = "persist_test.rs"]
mod persist_test;
