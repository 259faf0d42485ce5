// src/core/state/persistence.rs

//! The lock-metadata store: persists `tc_session` rows across TC restarts so
//! a crash doesn't silently forget who held Config.
//!
//! An in-memory `DashMap`, serialized to JSON and written via a
//! temp-file-then-rename so a crash mid-write never leaves a torn file, read
//! back once at startup.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::errors::TcError;
use crate::core::lock::{ConfigId, OperationClass, SessionId};

/// One row of the `tc_session` table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionRow {
    pub session_id: SessionId,
    pub op_class: OperationClassTag,
    pub config_id: ConfigId,
    pub acquired_at: u64,
}

/// A serializable mirror of `OperationClass` (the lock module's enum isn't
/// `Serialize` to keep it a pure in-memory concern; the store keeps its own
/// tag so persistence format stability doesn't couple to LM internals).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationClassTag {
    Read,
    Config,
    Global,
}

impl From<OperationClass> for OperationClassTag {
    fn from(c: OperationClass) -> Self {
        match c {
            OperationClass::Read => OperationClassTag::Read,
            OperationClass::Config => OperationClassTag::Config,
            OperationClass::Global => OperationClassTag::Global,
        }
    }
}

#[derive(Serialize, Deserialize, Default)]
struct StoreFile {
    rows: HashMap<SessionId, SessionRow>,
}

/// The embedded key-value file backing `tc_session`, keyed by `session_id`.
#[derive(Debug)]
pub struct SessionStore {
    path: PathBuf,
    rows: Arc<DashMap<SessionId, SessionRow>>,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            rows: Arc::new(DashMap::new()),
        }
    }

    /// Writes `row` synchronously, before the LM's in-memory acquire/release
    /// is considered committed.
    pub fn put(&self, row: SessionRow) -> Result<(), TcError> {
        self.rows.insert(row.session_id, row);
        self.flush()
    }

    pub fn remove(&self, session_id: SessionId) -> Result<(), TcError> {
        self.rows.remove(&session_id);
        self.flush()
    }

    fn flush(&self) -> Result<(), TcError> {
        let file = StoreFile {
            rows: self.rows.iter().map(|r| (*r.key(), *r.value())).collect(),
        };
        let json = serde_json::to_vec_pretty(&file)
            .map_err(|e| TcError::DbUpdate(format!("serialize session store: {e}")))?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| TcError::DbAccess(format!("create session store dir: {e}")))?;
        }

        let tmp_path = tmp_path_for(&self.path);
        std::fs::write(&tmp_path, &json)
            .map_err(|e| TcError::DbUpdate(format!("write session store temp file: {e}")))?;
        std::fs::rename(&tmp_path, &self.path)
            .map_err(|e| TcError::DbUpdate(format!("rename session store into place: {e}")))?;
        Ok(())
    }

    /// Reads back the persisted rows at startup. Missing file is not an
    /// error — a fresh TC has nothing to recover. Any row found is logged as
    /// stale and returned for the caller to force-release, but the TC never
    /// attempts to resume the in-flight operation itself.
    pub fn load(&self) -> Result<Vec<SessionRow>, TcError> {
        let contents = match std::fs::read(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("no lock-metadata store found at {:?}; starting fresh", self.path);
                return Ok(Vec::new());
            }
            Err(e) => return Err(TcError::DbAccess(format!("read session store: {e}"))),
        };
        let file: StoreFile = serde_json::from_slice(&contents)
            .map_err(|e| TcError::DbAccess(format!("parse session store: {e}")))?;

        for row in file.rows.values() {
            warn!(
                session_id = row.session_id,
                config_id = row.config_id,
                "stale tc_session row found at startup; releasing without resuming the in-flight operation"
            );
            self.rows.insert(row.session_id, *row);
        }
        Ok(file.rows.into_values().collect())
    }

    pub fn clear(&self, session_id: SessionId) {
        self.rows.remove(&session_id);
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.to_path_buf();
    let file_name = tmp
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "tc_session".to_string());
    tmp.set_file_name(format!("{file_name}.tmp"));
    tmp
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tc_session.json");
        let store = SessionStore::new(&path);
        store
            .put(SessionRow {
                session_id: 7,
                op_class: OperationClassTag::Config,
                config_id: 42,
                acquired_at: 1000,
            })
            .unwrap();

        let reloaded = SessionStore::new(&path);
        let rows = reloaded.load().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].session_id, 7);
        assert_eq!(rows[0].config_id, 42);
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("absent.json"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn remove_drops_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tc_session.json");
        let store = SessionStore::new(&path);
        store
            .put(SessionRow {
                session_id: 1,
                op_class: OperationClassTag::Read,
                config_id: 0,
                acquired_at: 1,
            })
            .unwrap();
        store.remove(1).unwrap();
        let reloaded = SessionStore::new(&path);
        assert!(reloaded.load().unwrap().is_empty());
    }
}
