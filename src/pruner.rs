use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::db::Database;

/// Removes unviable sources from the catalog.
///
/// Deletes run on spawned tasks so a failing fetch can report back without
/// waiting on storage. Delete errors are logged and dropped.
pub struct SourcePruner {
    db: Arc<Database>,
    pending: Mutex<Vec<JoinHandle<()>>>,
    attempts: AtomicUsize,
}

impl SourcePruner {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            pending: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
        }
    }

    /// Schedules deletion of `source_id` and returns immediately.
    pub fn prune(&self, source_id: i64) {
        self.attempts.fetch_add(1, Ordering::Relaxed);

        let db = self.db.clone();
        let handle = tokio::spawn(async move {
            match db.delete_source(source_id).await {
                Ok(true) => info!("Deleted source {} after failed viability check", source_id),
                Ok(false) => info!("Source {} was already gone", source_id),
                Err(e) => warn!("Failed to delete source {}: {}", source_id, e),
            }
        });

        if let Ok(mut pending) = self.pending.lock() {
            pending.retain(|h| !h.is_finished());
            pending.push(handle);
        }
    }

    /// Number of deletions scheduled since creation.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Waits for every scheduled deletion to finish.
    pub async fn settle(&self) {
        let handles = match self.pending.lock() {
            Ok(mut pending) => std::mem::take(&mut *pending),
            Err(_) => return,
        };

        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Prune task did not complete: {}", e);
            }
        }
    }
}
