use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::db::Snapshot;
use crate::persist::BackupStore;

const RETRY_LIMIT: u32 = 3;
const RETRY_BASE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
struct BackupJob {
    snapshot: Snapshot,
    note: Option<String>,
}

/// Handle to the process's one remote-push task. Pushes are serialized in
/// mutation order through a watch channel: at most one request is in
/// flight, and states queued up behind it are coalesced latest-wins,
/// never reordered.
#[derive(Clone)]
pub struct BackupWriter {
    tx: Option<Arc<watch::Sender<Option<BackupJob>>>>,
}

impl BackupWriter {
    /// A writer with no backing channel. `push` is a no-op; the local
    /// store still functions.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn spawn<S: BackupStore>(store: S) -> Self {
        let (tx, mut rx) = watch::channel(None::<BackupJob>);
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let job = rx.borrow_and_update().as_ref().cloned();
                if let Some(job) = job {
                    push_with_retry(&store, job).await;
                }
            }
        });
        Self { tx: Some(Arc::new(tx)) }
    }

    pub fn push(&self, snapshot: Snapshot, note: Option<String>) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(Some(BackupJob { snapshot, note }));
        }
    }
}

async fn push_with_retry<S: BackupStore>(store: &S, job: BackupJob) {
    for attempt in 0..RETRY_LIMIT {
        if attempt > 0 {
            let jitter = rand::rng().random_range(0..=RETRY_BASE.as_millis() as u64);
            tokio::time::sleep(RETRY_BASE * 2u32.pow(attempt - 1) + Duration::from_millis(jitter))
                .await;
        }
        match store.put(&job.snapshot, job.note.as_deref()).await {
            Ok(()) => {
                debug!("backup push ok");
                return;
            }
            Err(e) => warn!(attempt, error = %e, "backup push failed"),
        }
    }
    warn!("backup push dropped after {RETRY_LIMIT} attempts");
}
