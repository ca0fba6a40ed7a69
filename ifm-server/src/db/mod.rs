//! Database abstraction layer.
//!
//! [`AnalysisStore`] defines the interface for persisting analysis entries.
//! The default implementation is [`sqlite::SqliteStore`].  To swap to another
//! database, implement [`AnalysisStore`] for the new type and change the
//! concrete type in [`crate::state::AppState`].
//!
//! All trait methods use `impl Future` in their signatures so no extra
//! `async-trait` crate is required.

pub mod sqlite;

use std::future::Future;

use chrono::{DateTime, Utc};
use ifm_types::TwoStepAnalysis;
use uuid::Uuid;

/// A single row in the `analyses` table.
#[derive(Debug, Clone)]
pub struct AnalysisRecord {
    pub id: Uuid,
    /// Upload the entry belongs to.
    pub upload_id: String,
    /// User that created the entry; inference runs act on their behalf.
    pub user_id: String,
    pub analysis: TwoStepAnalysis,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AnalysisRecord {
    pub fn new(upload_id: String, user_id: String, analysis: TwoStepAnalysis) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            upload_id,
            user_id,
            analysis,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Trait for persisting analysis entries.
pub trait AnalysisStore: Send + Sync + 'static {
    /// Persist a new entry.
    fn insert(&self, record: &AnalysisRecord) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    /// Retrieve a single entry by id.
    fn get(&self, id: Uuid) -> impl Future<Output = Result<Option<AnalysisRecord>, sqlx::Error>> + Send;

    /// List entries, optionally restricted to one upload, oldest first.
    fn list(
        &self,
        upload_id: Option<&str>,
    ) -> impl Future<Output = Result<Vec<AnalysisRecord>, sqlx::Error>> + Send;

    /// Replace the stored document and bump `updated_at`.
    ///
    /// Returns `false` when no entry with `record.id` exists.
    fn update(&self, record: &mut AnalysisRecord) -> impl Future<Output = Result<bool, sqlx::Error>> + Send;
}
