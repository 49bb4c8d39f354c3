//! SQLite-backed metadata store.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{MetadataRow, VersionRow};
use crate::record::{MetadataRecord, VersionEntry};
use crate::store::MetadataStore;
use async_trait::async_trait;
use exn::ResultExt;
use sqlx::SqlitePool;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::Sqlite;
use tracing::instrument;

/// Metadata store over the `apk_metadata` table.
///
/// Each operation checks one connection out of the pool and hands it back
/// when the connection guard drops, whichever way the operation exits.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}
impl From<&Database> for SqliteStore {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}
impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn acquire(&self) -> Result<PoolConnection<Sqlite>> {
        self.pool.acquire().await.or_raise(|| ErrorKind::StoreUnavailable)
    }

    fn is_unique_violation(err: &sqlx::Error) -> bool {
        err.as_database_error().is_some_and(|db| db.is_unique_violation())
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    #[instrument(level = "debug", skip(self))]
    async fn fetch(&self, id: &str) -> Result<Option<MetadataRecord>> {
        let mut conn = self.acquire().await?;
        let row: Option<MetadataRow> = sqlx::query_as(include_str!("../../queries/fetch_metadata.sql"))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .or_raise(|| ErrorKind::StoreUnavailable)?;
        row.map(|r| r.try_into()).transpose()
    }

    #[instrument(level = "debug", skip(self, record), fields(id = %record.id, version = record.version))]
    async fn insert(&self, record: &MetadataRecord) -> Result<()> {
        let row = MetadataRow::try_from(record)?;
        let mut conn = self.acquire().await?;
        let result = sqlx::query(include_str!("../../queries/insert_metadata.sql"))
            .bind(&row.id)
            .bind(row.version)
            .bind(&row.manifest_url)
            .bind(&row.manifest_hash)
            .bind(&row.library_version)
            .execute(&mut *conn)
            .await;
        if let Err(err) = &result
            && Self::is_unique_violation(err)
        {
            exn::bail!(ErrorKind::Conflict(row.id));
        }
        result.or_raise(|| ErrorKind::StoreUnavailable)?;
        Ok(())
    }

    #[instrument(level = "debug", skip(self, record), fields(id = %record.id, version = record.version))]
    async fn update(&self, record: &MetadataRecord) -> Result<()> {
        let row = MetadataRow::try_from(record)?;
        let mut conn = self.acquire().await?;
        let result = sqlx::query(include_str!("../../queries/update_metadata.sql"))
            .bind(row.version)
            .bind(&row.manifest_hash)
            .bind(&row.library_version)
            .bind(&row.id)
            .bind(row.version)
            .execute(&mut *conn)
            .await
            .or_raise(|| ErrorKind::StoreUnavailable)?;
        if result.rows_affected() > 0 {
            return Ok(());
        }
        // Nothing matched: either the row is missing or the version guard
        // rejected it. Same connection, so still one logical operation.
        let existing: Option<i64> = sqlx::query_scalar(include_str!("../../queries/fetch_version.sql"))
            .bind(&row.id)
            .fetch_optional(&mut *conn)
            .await
            .or_raise(|| ErrorKind::StoreUnavailable)?;
        match existing {
            None => exn::bail!(ErrorKind::NotFound(row.id)),
            Some(_) => exn::bail!(ErrorKind::VersionRegression(row.id)),
        }
    }

    #[instrument(level = "debug", skip(self))]
    async fn list_all(&self) -> Result<Vec<VersionEntry>> {
        let mut conn = self.acquire().await?;
        let rows: Vec<VersionRow> = sqlx::query_as(include_str!("../../queries/list_versions.sql"))
            .fetch_all(&mut *conn)
            .await
            .or_raise(|| ErrorKind::StoreUnavailable)?;
        rows.into_iter().map(|r| r.try_into()).collect()
    }
}
