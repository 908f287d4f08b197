//! Database connection helpers.
//!
//! [`Database`] owns the Diesel connection pool for the PostgreSQL server.
//! The pool can be closed and reopened at runtime, which restores need in
//! order to release every connection before `pg_restore` drops the tables.

use std::sync::{PoisonError, RwLock};

use diesel::connection::SimpleConnection;
use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::{Connection, RunQueryDsl};
use log::{error, info};

use crate::repository::errors::{RepositoryError, RepositoryResult};

pub type DbPool = Pool<ConnectionManager<PgConnection>>;
pub type DbConnection = PooledConnection<ConnectionManager<PgConnection>>;

#[derive(Debug, Clone, Copy)]
/// Sizing applied when the pool is (re)built.
pub struct PoolOptions {
    pub min_idle: u32,
    pub max_size: u32,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            min_idle: 5,
            max_size: 20,
        }
    }
}

/// Handle to the image database with a closable connection pool.
#[derive(Debug)]
pub struct Database {
    url: String,
    options: PoolOptions,
    pool: RwLock<Option<DbPool>>,
}

impl Database {
    /// Creates a handle without connecting.
    pub fn new(url: impl Into<String>, options: PoolOptions) -> Self {
        Self {
            url: url.into(),
            options,
            pool: RwLock::new(None),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_connected(&self) -> bool {
        self.pool
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Builds the connection pool after making sure the `vector` extension
    /// exists. Does nothing when the pool is already open.
    ///
    /// The pool is built without holding the lock, so concurrent callers of
    /// [`Self::get_connection`] fail fast while the server is unreachable.
    pub fn connect(&self) -> RepositoryResult<()> {
        if self.is_connected() {
            return Ok(());
        }

        ensure_vector_extension(&self.url)?;

        info!("Creating database connection pool...");
        let pool = establish_connection_pool(&self.url, self.options)?;

        let mut guard = self.pool.write().unwrap_or_else(PoisonError::into_inner);
        if guard.is_some() {
            info!("Another caller opened the pool first; discarding the new one.");
            return Ok(());
        }
        *guard = Some(pool);
        info!("Database connection pool created successfully.");
        Ok(())
    }

    /// Drops the pool. Connections return an error until [`Self::connect`]
    /// is called again.
    pub fn close(&self) {
        let pool = self
            .pool
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if pool.is_some() {
            info!("Closing database connection pool...");
            drop(pool);
            info!("Database connection pool closed.");
        }
    }

    /// Retrieve a connection from the pool.
    pub fn get_connection(&self) -> RepositoryResult<DbConnection> {
        let pool = self
            .pool
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(pool) = pool else {
            return Err(RepositoryError::ConnectionError(
                "database pool is closed".to_string(),
            ));
        };
        pool.get().map_err(|e| {
            error!("Failed to get connection from pool: {e}");
            RepositoryError::from(e)
        })
    }

    /// Creates the embeddings table and its cosine HNSW index.
    pub fn create_schema(&self, embedding_dim: usize) -> RepositoryResult<()> {
        info!("Ensuring table 'image_embeddings' and indexes exist...");
        let mut conn = self.get_connection()?;
        conn.transaction(|conn| conn.batch_execute(&schema_sql(embedding_dim)))?;
        info!("Table and cosine index are ready.");
        Ok(())
    }

    /// Number of rows currently indexed.
    pub fn count_embeddings(&self) -> RepositoryResult<i64> {
        use crate::schema::image_embeddings;
        use diesel::QueryDsl;

        let mut conn = self.get_connection()?;
        let total = image_embeddings::table
            .count()
            .get_result::<i64>(&mut conn)?;
        Ok(total)
    }
}

/// Uses a single short-lived connection to create the `vector` extension.
pub fn ensure_vector_extension(database_url: &str) -> RepositoryResult<()> {
    let mut conn = PgConnection::establish(database_url)
        .map_err(|e| RepositoryError::ConnectionError(e.to_string()))?;
    info!("Ensuring pgvector extension exists...");
    conn.batch_execute("CREATE EXTENSION IF NOT EXISTS vector;")?;
    info!("pgvector extension is enabled.");
    Ok(())
}

/// Create a Diesel connection pool for the given database URL.
pub fn establish_connection_pool(
    database_url: &str,
    options: PoolOptions,
) -> RepositoryResult<DbPool> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = Pool::builder()
        .min_idle(Some(options.min_idle))
        .max_size(options.max_size)
        .build(manager)?;
    Ok(pool)
}

fn schema_sql(embedding_dim: usize) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS image_embeddings (
            id SERIAL PRIMARY KEY,
            filename VARCHAR(255) NOT NULL,
            filepath VARCHAR(4096) NOT NULL UNIQUE,
            embedding vector({embedding_dim}) NOT NULL
        );
        DROP INDEX IF EXISTS embedding_hnsw_idx;
        CREATE INDEX IF NOT EXISTS embedding_cosine_idx
            ON image_embeddings USING hnsw (embedding vector_cosine_ops);"
    )
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use super::*;

    #[test]
    fn schema_sql_uses_requested_dimension() {
        let sql = schema_sql(768);
        assert!(sql.contains("embedding vector(768) NOT NULL"));
        assert!(sql.contains("DROP INDEX IF EXISTS embedding_hnsw_idx"));
        assert!(sql.contains("vector_cosine_ops"));
    }

    #[test]
    fn closed_database_refuses_connections() {
        let db = Database::new("postgres://nobody@localhost/none", PoolOptions::default());
        assert!(!db.is_connected());
        match db.get_connection() {
            Err(RepositoryError::ConnectionError(msg)) => {
                assert_eq!(msg, "database pool is closed")
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("closed pool returned a connection"),
        }
        db.close();
        assert!(!db.is_connected());
    }

    #[test]
    fn pending_connect_does_not_block_connection_requests() {
        // Accepts TCP connections but never speaks the protocol.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let db = Arc::new(Database::new(
            format!("postgres://nobody@127.0.0.1:{port}/none?connect_timeout=3"),
            PoolOptions::default(),
        ));

        let connecting = {
            let db = db.clone();
            thread::spawn(move || db.connect())
        };
        thread::sleep(Duration::from_millis(300));

        let started = Instant::now();
        assert!(matches!(
            db.get_connection(),
            Err(RepositoryError::ConnectionError(_))
        ));
        assert!(started.elapsed() < Duration::from_secs(1));

        assert!(connecting.join().unwrap().is_err());
        assert!(!db.is_connected());
        drop(listener);
    }
}
