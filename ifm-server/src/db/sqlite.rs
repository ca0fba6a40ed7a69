//! SQLite implementation of [`AnalysisStore`].
//!
//! Migrations are embedded at compile time via `sqlx::migrate!` (resolved
//! relative to the crate root) and run by [`SqliteStore::connect`].  The
//! runtime-checked `sqlx::query` form is used so no `DATABASE_URL` is needed
//! at build time.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{AnalysisRecord, AnalysisStore};

type AnalysisRow = (String, String, String, String, String, String);

/// SQLite-backed analysis store.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the SQLite database at `url` and run pending migrations.
    ///
    /// `url` should be a sqlx-compatible SQLite URL, e.g.
    /// `"sqlite://ifm.db?mode=rwc"`.
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let pool = SqlitePool::connect(url).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }
}

fn decode_err(e: impl std::error::Error + Send + Sync + 'static) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(e))
}

fn decode_row(row: AnalysisRow) -> Result<AnalysisRecord, sqlx::Error> {
    let (id, upload_id, user_id, analysis, created_at, updated_at) = row;
    Ok(AnalysisRecord {
        id: id.parse::<Uuid>().map_err(decode_err)?,
        upload_id,
        user_id,
        analysis: serde_json::from_str(&analysis).map_err(decode_err)?,
        created_at: created_at.parse::<DateTime<Utc>>().map_err(decode_err)?,
        updated_at: updated_at.parse::<DateTime<Utc>>().map_err(decode_err)?,
    })
}

fn encode_analysis(record: &AnalysisRecord) -> Result<String, sqlx::Error> {
    serde_json::to_string(&record.analysis).map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

impl AnalysisStore for SqliteStore {
    async fn insert(&self, record: &AnalysisRecord) -> Result<(), sqlx::Error> {
        let analysis = encode_analysis(record)?;
        sqlx::query(
            "INSERT INTO analyses (id, upload_id, user_id, analysis, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(record.id.to_string())
        .bind(&record.upload_id)
        .bind(&record.user_id)
        .bind(&analysis)
        .bind(record.created_at.to_rfc3339())
        .bind(record.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<AnalysisRecord>, sqlx::Error> {
        let row: Option<AnalysisRow> = sqlx::query_as(
            "SELECT id, upload_id, user_id, analysis, created_at, updated_at \
             FROM analyses WHERE id = ?1",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(decode_row).transpose()
    }

    async fn list(&self, upload_id: Option<&str>) -> Result<Vec<AnalysisRecord>, sqlx::Error> {
        let rows: Vec<AnalysisRow> = match upload_id {
            Some(upload_id) => {
                sqlx::query_as(
                    "SELECT id, upload_id, user_id, analysis, created_at, updated_at \
                     FROM analyses WHERE upload_id = ?1 ORDER BY created_at",
                )
                .bind(upload_id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT id, upload_id, user_id, analysis, created_at, updated_at \
                     FROM analyses ORDER BY created_at",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.into_iter().map(decode_row).collect()
    }

    async fn update(&self, record: &mut AnalysisRecord) -> Result<bool, sqlx::Error> {
        record.updated_at = Utc::now();
        let analysis = encode_analysis(record)?;
        let result = sqlx::query(
            "UPDATE analyses SET analysis = ?1, updated_at = ?2 WHERE id = ?3",
        )
        .bind(&analysis)
        .bind(record.updated_at.to_rfc3339())
        .bind(record.id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ifm_types::TwoStepAnalysis;

    async fn store(dir: &tempfile::TempDir) -> SqliteStore {
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
        SqliteStore::connect(&url).await.unwrap()
    }

    #[tokio::test]
    async fn insert_then_get_returns_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        let analysis = TwoStepAnalysis {
            name: Some("batch 7".into()),
            ..TwoStepAnalysis::default()
        };
        let record = AnalysisRecord::new("u1".into(), "alice".into(), analysis.clone());
        store.insert(&record).await.unwrap();

        let loaded = store.get(record.id).await.unwrap().unwrap();
        assert_eq!(loaded.upload_id, "u1");
        assert_eq!(loaded.user_id, "alice");
        assert_eq!(loaded.analysis, analysis);
        assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_filters_by_upload() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        for upload in ["u1", "u2", "u1"] {
            let record = AnalysisRecord::new(upload.into(), "alice".into(), TwoStepAnalysis::default());
            store.insert(&record).await.unwrap();
        }
        assert_eq!(store.list(None).await.unwrap().len(), 3);
        assert_eq!(store.list(Some("u1")).await.unwrap().len(), 2);
        assert!(store.list(Some("u3")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_replaces_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        let mut record = AnalysisRecord::new("u1".into(), "alice".into(), TwoStepAnalysis::default());
        store.insert(&record).await.unwrap();

        record.analysis.trigger_run_workflow = true;
        assert!(store.update(&mut record).await.unwrap());
        let loaded = store.get(record.id).await.unwrap().unwrap();
        assert!(loaded.analysis.trigger_run_workflow);

        let mut missing = AnalysisRecord::new("u1".into(), "alice".into(), TwoStepAnalysis::default());
        assert!(!store.update(&mut missing).await.unwrap());
    }
}
