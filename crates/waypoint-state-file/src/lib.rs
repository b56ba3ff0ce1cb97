//! Filesystem-backed task state store for the Waypoint platform
//!
//! Persists each task as one JSON document in a spool directory, so state
//! survives restarts without requiring an external service. Suitable for
//! single-host deployments; multi-host setups need a shared backend.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tracing::debug;

use waypoint_core::{FlowError, StateStore, TaskId, TaskState};


const TASK_EXTENSION: &str = "task";

/// A task state store spooling one `<task-id>.task` file per task.
///
/// Writes go through a uniquely named temporary file and a rename, so a
/// reader never observes a half-written document. Concurrent writers
/// follow last-write-wins semantics. Task identifiers are validated before
/// this store is ever reached, so file names are never attacker-chosen.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    /// Open a store in the given spool directory, creating it if needed
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, FlowError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| store_error("create spool directory", &dir, e))?;
        Ok(Self { dir })
    }

    fn task_path(&self, task_id: &TaskId) -> PathBuf {
        self.dir.join(format!("{}.{}", task_id, TASK_EXTENSION))
    }

    /// Remove every task file untouched for longer than
    /// `idle_timeout_secs`, returning how many were removed. Intended to
    /// run on a periodic out-of-band task, not inside the request path.
    pub async fn sweep_expired(&self, idle_timeout_secs: u64) -> Result<usize, FlowError> {
        let cutoff = SystemTime::now() - Duration::from_secs(idle_timeout_secs);
        let mut removed = 0;

        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| store_error("read spool directory", &self.dir, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| store_error("read spool directory", &self.dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(TASK_EXTENSION) {
                continue;
            }
            let modified = match entry.metadata().await.and_then(|m| m.modified()) {
                Ok(modified) => modified,
                // Racing deletion loses nothing; skip the entry.
                Err(_) => continue,
            };
            if modified < cutoff && tokio::fs::remove_file(&path).await.is_ok() {
                removed += 1;
            }
        }

        if removed > 0 {
            debug!(removed, dir = %self.dir.display(), "swept expired task files");
        }
        Ok(removed)
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn get_state(&self, task_id: &TaskId) -> Result<TaskState, FlowError> {
        let path = self.task_path(task_id);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(FlowError::NotFound),
            Err(e) => return Err(store_error("read task file", &path, e)),
        };
        Ok(serde_json::from_slice(&raw)?)
    }

    async fn put_state(&self, task_id: &TaskId, state: &TaskState) -> Result<(), FlowError> {
        let raw = serde_json::to_vec(state)?;
        let path = self.task_path(task_id);
        let staging = self
            .dir
            .join(format!(".{}.{}", uuid::Uuid::new_v4().simple(), TASK_EXTENSION));

        tokio::fs::write(&staging, &raw)
            .await
            .map_err(|e| store_error("write task file", &staging, e))?;
        tokio::fs::rename(&staging, &path)
            .await
            .map_err(|e| store_error("publish task file", &path, e))
    }

    async fn delete_state(&self, task_id: &TaskId) -> Result<(), FlowError> {
        let path = self.task_path(task_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(store_error("delete task file", &path, e)),
        }
    }
}

fn store_error(action: &str, path: &Path, err: io::Error) -> FlowError {
    FlowError::StateStore(format!("{} {}: {}", action, path.display(), err))
}
