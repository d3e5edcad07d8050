//! Durable state persistence
//!
//! The session's state blob is written by a dedicated task fed through an
//! unbounded channel, so callers never wait on disk I/O and snapshots land in
//! the order they were emitted.

use metrics::{counter, histogram};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::client::DurableState;

/// Sending half of the state channel held by the session
pub type StateSender = mpsc::UnboundedSender<DurableState>;

/// Errors that can occur when loading or saving the state file
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("State file not found: {0}")]
    Missing(PathBuf),

    #[error("Failed to access state file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("State file {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// JSON file holding the last emitted session state
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the state file. Absence is an error, not an empty state.
    pub async fn load(&self) -> Result<DurableState, StoreError> {
        let raw = tokio::fs::read(&self.path).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                StoreError::Missing(self.path.clone())
            } else {
                StoreError::Io {
                    path: self.path.clone(),
                    source: e,
                }
            }
        })?;

        let value = serde_json::from_slice(&raw).map_err(|e| StoreError::Parse {
            path: self.path.clone(),
            source: e,
        })?;

        Ok(DurableState(value))
    }

    /// Replace the state file with `state`.
    ///
    /// The document is written to a sibling temp file, synced, then renamed
    /// over the target, so the file always holds one complete snapshot.
    pub async fn save(&self, state: &DurableState) -> Result<(), StoreError> {
        let bytes = to_pretty_json(state)?;
        let temp_path = self.temp_path();

        let io_err = |source| StoreError::Io {
            path: temp_path.clone(),
            source,
        };

        let mut file = tokio::fs::File::create(&temp_path).await.map_err(io_err)?;
        file.write_all(&bytes).await.map_err(io_err)?;
        file.sync_all().await.map_err(io_err)?;
        drop(file);

        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|source| StoreError::Io {
                path: self.path.clone(),
                source,
            })?;

        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "state.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

/// Serialize with four-space indentation
fn to_pretty_json(state: &DurableState) -> Result<Vec<u8>, StoreError> {
    use serde::Serialize;

    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    state.serialize(&mut serializer)?;
    Ok(out)
}

/// Spawn the task that persists every snapshot sent on the returned channel.
///
/// The task exits once every sender is dropped and the queue is drained;
/// awaiting the handle then guarantees the last snapshot reached the store.
pub fn spawn_state_writer(store: StateStore) -> (StateSender, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<DurableState>();

    let handle = tokio::spawn(async move {
        while let Some(state) = rx.recv().await {
            let start = Instant::now();
            match store.save(&state).await {
                Ok(()) => {
                    counter!("bankgate_state_writes_total", "outcome" => "ok").increment(1);
                    histogram!("bankgate_state_write_duration_seconds").record(start.elapsed());
                    debug!("Persisted session state to {:?}", store.path());
                }
                Err(e) => {
                    counter!("bankgate_state_writes_total", "outcome" => "error").increment(1);
                    error!("Failed to persist session state: {}", e);
                }
            }
        }
        info!("State writer stopped");
    });

    (tx, handle)
}
