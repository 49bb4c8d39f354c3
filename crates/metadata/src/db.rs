//! Database connection and pool management.

use exn::ResultExt;
use sqlx::SqliteConnection;
use sqlx::pool::PoolConnectionMetadata;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::str::FromStr;
use tracing::instrument;

use crate::error::{ErrorKind, Result};

/// Embedded migrations that are run automatically on connect.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
// Each store operation checks out its own connection, so this is the cap on
// concurrent store calls, not a per-request reservation.
const MAX_CONNECTIONS: u32 = 5;

/// Database connection pool for build metadata.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    async fn new(options: SqliteConnectOptions, max: Option<u32>) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            // Apply the query-based PRAGMAs to EVERY connection the pool
            // opens, not only the first one.
            .after_connect(|conn, meta| Box::pin(async move { Self::apply_pragmas(conn, meta).await }))
            .max_connections(max.unwrap_or(MAX_CONNECTIONS))
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::StoreUnavailable)?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Open the database described by a `storeConnection` setting.
    ///
    /// Accepts `:memory:`, an `sqlite:` URL (with any query parameters sqlx
    /// understands), or a plain file path.
    pub async fn open(connection: &str) -> Result<Self> {
        match connection {
            ":memory:" | "sqlite::memory:" => Self::connect_in_memory().await,
            url if url.starts_with("sqlite:") => {
                let options = SqliteConnectOptions::from_str(url)
                    .or_raise(|| ErrorKind::StoreUnavailable)?
                    .create_if_missing(true);
                Self::new(Self::tune(options), None).await
            },
            path => Self::connect(path).await,
        }
    }

    /// Connect to the metadata database at the given path.
    ///
    /// Creates the database file if it doesn't exist and runs migrations.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new().filename(path.as_ref()).create_if_missing(true);
        Self::new(Self::tune(options), None).await
    }

    /// Connect to an in-memory database (useful for testing).
    ///
    /// Note:
    /// - In-memory databases are destroyed when the connection closes.
    /// - Do NOT apply `#[cfg(test)]` so that other crates can also use this in their tests.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new().filename(":memory:");
        // Parallel connections to `:memory:` would each see their own empty
        // database, so the pool is limited to one connection.
        Self::new(Self::tune(options), Some(1)).await
    }

    /// Connection options shared between file and in-memory databases.
    fn tune(options: SqliteConnectOptions) -> SqliteConnectOptions {
        options
            // WAL for concurrent readers alongside the single writer.
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            // Build bursts for many manifests at once can briefly contend
            // for the write lock.
            .busy_timeout(std::time::Duration::from_millis(1500))
    }

    /// Apply additional PRAGMA settings that aren't exposed via SqliteConnectOptions.
    async fn apply_pragmas(conn: &mut SqliteConnection, _meta: PoolConnectionMetadata) -> sqlx::Result<()> {
        sqlx::query(
            r#"
                PRAGMA wal_autocheckpoint = 800;
                PRAGMA cache_size = -4096;
                PRAGMA temp_store = MEMORY;
            "#,
        )
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument("performing database migrations", skip(self))]
    async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await.or_raise(|| ErrorKind::Migration)
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection pool.
    ///
    /// Waits for checked-out connections to be returned, then closes them.
    pub async fn close(&self) {
        // Let SQLite update query planner statistics
        _ = sqlx::query("PRAGMA optimize").execute(&self.pool).await;
        self.pool.close().await;
    }
}
