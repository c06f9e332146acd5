pub mod local;
pub mod telegram;
pub mod writer;

use tracing::{debug, info, warn};

use crate::AppState;
use crate::db::Snapshot;
use self::local::LocalStore;

/// Marker line that identifies a backup payload inside the otherwise
/// general-purpose message stream of the backup channel.
pub const BACKUP_TAG: &str = "###PALAVER_DB_BACKUP###";

/// The narrow capability the core depends on for off-box backup. Whether
/// the backing store is a real database or a scavenged messaging API is
/// invisible from here.
pub trait BackupStore: Send + Sync + 'static {
    /// Push one condensed snapshot, with an optional activity note line.
    fn put(
        &self,
        snapshot: &Snapshot,
        note: Option<&str>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Fetch the most recent marked payload, if one can be found.
    fn get_latest(&self) -> impl Future<Output = Result<Option<Snapshot>, StoreError>> + Send;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("backup channel error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected backup channel reply: {0}")]
    BadReply(String),
}

/// Render a backup payload: optional note line, the sentinel, then the
/// snapshot JSON. Every push is a valid recovery point.
pub fn encode_payload(snapshot: &Snapshot, note: Option<&str>) -> Result<String, StoreError> {
    let body = serde_json::to_string(snapshot)?;
    Ok(match note {
        Some(note) => format!("{note}\n{BACKUP_TAG}\n{body}"),
        None => format!("{BACKUP_TAG}\n{body}"),
    })
}

/// Recognize a marked payload and parse the JSON after the sentinel.
/// Anything malformed is simply not a payload.
pub fn decode_payload(text: &str) -> Option<Snapshot> {
    let (_, tail) = text.split_once(BACKUP_TAG)?;
    serde_json::from_str(tail.trim()).ok()
}

/// Dual-write after a durable mutation: overwrite the local snapshot while
/// the state lock is still held (so file writes land in mutation order),
/// then hand the condensed snapshot to the single-flight backup writer.
/// Neither store's failure surfaces to the triggering client.
pub fn persist(app: &AppState, snapshot: Snapshot, note: Option<String>) {
    if let Err(e) = app.local.save(&snapshot) {
        warn!(error = %e, "local snapshot write failed");
    }
    app.backup.push(snapshot.condensed(), note);
}

/// Startup reconciliation between the two stores: start from the local
/// snapshot, then let a retrievable marked remote payload overwrite it.
/// Every failure degrades to the next-best source; the server always
/// reaches a servable state.
pub async fn recover<S: BackupStore>(local: &LocalStore, remote: Option<&S>) -> Snapshot {
    let mut snapshot = match local.load() {
        Ok(Some(snapshot)) => {
            info!(path = %local.path().display(), "loaded local snapshot");
            snapshot
        }
        Ok(None) => Snapshot::default(),
        Err(e) => {
            warn!(error = %e, "local snapshot unreadable, starting empty");
            Snapshot::default()
        }
    };

    if let Some(remote) = remote {
        match remote.get_latest().await {
            Ok(Some(remote_snapshot)) => {
                info!("restored from remote backup");
                snapshot = remote_snapshot;
            }
            Ok(None) => debug!("no marked payload on the backup channel"),
            Err(e) => warn!(error = %e, "remote recovery failed, keeping local state"),
        }
    }

    snapshot
}
