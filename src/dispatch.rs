//! Fire-and-forget dispatch of note-content-changed events.
//!
//! The CRUD write path must commit and return regardless of indexing
//! outcome, so re-indexing runs on a separate tokio task fed by an unbounded
//! channel. [`Dispatcher::notify`] never blocks and never reports the
//! indexing result; failures after retry exhaustion are visible only in
//! logs.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, warn};

use crate::indexer::Indexer;
use crate::models::NoteChange;
use crate::store::ChunkStore;

/// Handle for enqueueing note-change events toward the indexing worker.
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<NoteChange>,
    worker: JoinHandle<()>,
}

impl Dispatcher {
    /// Spawn the indexing worker and return its dispatcher.
    ///
    /// Events are processed one at a time in arrival order; two rapid edits
    /// of the same note resolve to the later edit's generation because each
    /// run replaces the whole generation.
    pub fn spawn<S: ChunkStore + 'static>(indexer: Arc<Indexer<S>>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<NoteChange>();

        let worker = tokio::spawn(async move {
            while let Some(change) = rx.recv().await {
                if let Err(e) = indexer.reindex(&change).await {
                    error!(
                        note_id = %change.note_id,
                        error = %e,
                        "re-index failed; note unsearchable until its next change"
                    );
                }
            }
        });

        Self { tx, worker }
    }

    /// Enqueue a change. Never blocks, never fails the caller.
    pub fn notify(&self, change: NoteChange) {
        if self.tx.send(change).is_err() {
            warn!("indexing worker is gone; dropping note-changed event");
        }
    }

    /// Close the channel and wait for queued work to drain. Used at
    /// shutdown; regular callers just drop the dispatcher.
    pub async fn shutdown(self) {
        let Dispatcher { tx, worker } = self;
        drop(tx);
        let _ = worker.await;
    }
}
