use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::db::Snapshot;
use crate::persist::StoreError;

/// Whole-file JSON snapshot store. Every save overwrites the file with the
/// complete state; load is only used at startup.
#[derive(Debug, Clone)]
pub struct LocalStore {
    path: PathBuf,
}

impl LocalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let body = serde_json::to_vec_pretty(snapshot)?;
        fs::write(&self.path, body)?;
        Ok(())
    }

    /// `Ok(None)` when no snapshot has ever been written.
    pub fn load(&self) -> Result<Option<Snapshot>, StoreError> {
        let body = match fs::read(&self.path) {
            Ok(body) => body,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&body)?))
    }
}
