//! Shared application state injected into every Axum handler.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use ifm_core::archive::LocalUploadStore;
use ifm_core::{CommandRecognizer, InferenceService};

use crate::config::Config;
use crate::db::sqlite::SqliteStore;

/// Inference service wired to the external recognizer and local uploads.
pub type Inference = InferenceService<CommandRecognizer, LocalUploadStore>;

/// State shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// Persistent analysis-entry store.
    pub store: Arc<SqliteStore>,
    /// Managed uploads that archive documents are registered with.
    pub uploads: Arc<LocalUploadStore>,
    /// Orchestrator-backed inference runtime.
    pub inference: Inference,
    /// One lock per analysis entry held across load, modify and save.
    entry_locks: Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl AppState {
    /// Wire the inference runtime to `uploads` and the configured recognizer.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(config: Config, store: SqliteStore) -> Self {
        let uploads = Arc::new(LocalUploadStore::new(config.upload_root.clone()));
        let recognizer = Arc::new(
            CommandRecognizer::new(config.recognizer_program.clone())
                .with_args(config.recognizer_args.clone()),
        );
        let inference = InferenceService::new(&config.core_config(), recognizer, Arc::clone(&uploads));
        Self {
            config: Arc::new(config),
            store: Arc::new(store),
            uploads,
            inference,
            entry_locks: Arc::default(),
        }
    }

    /// Serialize read-modify-write cycles on one analysis entry.
    ///
    /// Locks nobody holds or waits on are dropped from the table on the way.
    pub async fn lock_entry(&self, id: Uuid) -> OwnedMutexGuard<()> {
        let entry = {
            let mut locks = self.entry_locks.lock().await;
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(id).or_default())
        };
        entry.lock_owned().await
    }
}
