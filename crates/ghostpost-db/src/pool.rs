//! Connection pooling for the GhostPost database.
//!
//! Wraps `sqlmodel_pool::Pool<DbConn>` and encapsulates URL parsing plus
//! per-connection initialization (PRAGMAs + idempotent schema).

use std::path::Path;
use std::sync::Arc;

use asupersync::{Cx, Outcome};
use sqlmodel_core::Error as SqlError;
use sqlmodel_pool::{Pool, PoolConfig, PooledConnection};

use crate::error::{DbError, DbResult};
use crate::{DbConn, schema};

/// Pool configuration, derived from `Config::database_url` plus tunables.
#[derive(Debug, Clone)]
pub struct DbPoolConfig {
    /// `sqlite:///path/to/db.sqlite` or `sqlite:///:memory:`.
    pub database_url: String,
    pub min_connections: usize,
    pub max_connections: usize,
    pub acquire_timeout_ms: u64,
}

impl Default for DbPoolConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:///ghostpost.db".to_string(),
            min_connections: 1,
            max_connections: 8,
            acquire_timeout_ms: 30_000,
        }
    }
}

impl DbPoolConfig {
    /// Extract the filesystem path (or `:memory:`) from the database URL.
    pub fn sqlite_path(&self) -> DbResult<String> {
        let url = self.database_url.trim();
        let path = url
            .strip_prefix("sqlite:///")
            .or_else(|| url.strip_prefix("sqlite://"))
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url);
        if path.is_empty() {
            return Err(DbError::invalid(
                "database_url",
                format!("cannot derive sqlite path from '{url}'"),
            ));
        }
        Ok(path.to_string())
    }
}

/// A configured `SQLite` connection pool with schema initialization.
#[derive(Clone)]
pub struct DbPool {
    pool: Arc<Pool<DbConn>>,
    sqlite_path: String,
    init_sql: Arc<String>,
}

impl DbPool {
    /// Create a new pool (no connections are opened until first acquire).
    pub fn new(config: &DbPoolConfig) -> DbResult<Self> {
        let sqlite_path = config.sqlite_path()?;
        let init_sql = Arc::new(schema::init_schema_sql());

        let pool_config = PoolConfig::new(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout_ms)
            .test_on_checkout(true)
            .test_on_return(false);

        Ok(Self {
            pool: Arc::new(Pool::new(pool_config)),
            sqlite_path,
            init_sql,
        })
    }

    #[must_use]
    pub fn sqlite_path(&self) -> &str {
        &self.sqlite_path
    }

    /// Acquire a pooled connection, creating and initializing a new one
    /// if needed. Every fresh connection gets PRAGMAs plus the idempotent
    /// schema, so callers never race table creation.
    pub async fn acquire(&self, cx: &Cx) -> Outcome<PooledConnection<DbConn>, SqlError> {
        let sqlite_path = self.sqlite_path.clone();
        let init_sql = Arc::clone(&self.init_sql);

        self.pool
            .acquire(cx, || {
                let sqlite_path = sqlite_path.clone();
                let init_sql = Arc::clone(&init_sql);
                async move {
                    let conn = if sqlite_path == ":memory:" {
                        match DbConn::open_memory() {
                            Ok(c) => c,
                            Err(e) => return Outcome::Err(e),
                        }
                    } else {
                        if let Err(e) = ensure_parent_dir_exists(&sqlite_path) {
                            return Outcome::Err(e);
                        }
                        match DbConn::open_file(&sqlite_path) {
                            Ok(c) => c,
                            Err(e) => return Outcome::Err(e),
                        }
                    };

                    if let Err(e) = conn.execute_raw(&init_sql) {
                        tracing::warn!(path = %sqlite_path, error = %e, "connection init failed");
                        return Outcome::Err(e);
                    }

                    Outcome::Ok(conn)
                }
            })
            .await
    }
}

fn ensure_parent_dir_exists(sqlite_path: &str) -> Result<(), SqlError> {
    if let Some(parent) = Path::new(sqlite_path).parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent)
            .map_err(|e| SqlError::Custom(format!("cannot create db directory: {e}")))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_parsing_variants() {
        let cfg = DbPoolConfig {
            database_url: "sqlite:///tmp/gp.db".to_string(),
            ..Default::default()
        };
        assert_eq!(cfg.sqlite_path().unwrap(), "tmp/gp.db");

        let cfg = DbPoolConfig {
            database_url: "sqlite:///:memory:".to_string(),
            ..Default::default()
        };
        assert_eq!(cfg.sqlite_path().unwrap(), ":memory:");

        let cfg = DbPoolConfig {
            database_url: "ghostpost.db".to_string(),
            ..Default::default()
        };
        assert_eq!(cfg.sqlite_path().unwrap(), "ghostpost.db");
    }

    #[test]
    fn empty_url_is_rejected() {
        let cfg = DbPoolConfig {
            database_url: "sqlite:".to_string(),
            ..Default::default()
        };
        assert!(cfg.sqlite_path().is_err());
    }

    #[test]
    fn acquire_initializes_schema() {
        use asupersync::runtime::RuntimeBuilder;
        use sqlmodel_core::Connection;

        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("pool_test.db");
        let pool = DbPool::new(&DbPoolConfig {
            database_url: format!("sqlite:///{}", db_path.display()),
            ..Default::default()
        })
        .expect("create pool");

        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("build runtime");
        let cx = asupersync::Cx::for_testing();
        rt.block_on(async {
            let conn = match pool.acquire(&cx).await {
                Outcome::Ok(c) => c,
                other => panic!("acquire failed: {other:?}"),
            };
            // Schema must exist on a fresh connection.
            let rows = match conn
                .query(
                    &cx,
                    "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'threads'",
                    &[],
                )
                .await
            {
                Outcome::Ok(rows) => rows,
                other => panic!("query failed: {other:?}"),
            };
            assert_eq!(rows.len(), 1, "threads table should exist");
        });
    }
}
