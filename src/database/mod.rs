/*
 *  Copyright 2026 Pgsentinel Contributors
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Database connection management.
//!
//! An async connection pool over SQLite using `deadpool-diesel`. The store
//! holds scheduled tasks, executions, the durable work queue, the connection
//! registry and the analysis-result history.

use deadpool_diesel::sqlite::{Manager, Pool, Runtime};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tracing::info;

use crate::error::ValidationError;

pub mod schema;

/// Embedded migrations, compiled into the binary.
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Shared handle to the SQLite store.
#[derive(Clone)]
pub struct Database {
    pool: Pool,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

impl Database {
    /// Creates a connection pool for the given SQLite location.
    ///
    /// Accepts a file path, `:memory:`, or a `sqlite://` URL. SQLite has
    /// limited concurrent write support even with WAL mode, so the pool
    /// holds a single connection; writers queue behind it instead of
    /// failing with "database is locked".
    pub fn new(connection_string: &str) -> Result<Self, ValidationError> {
        let url = Self::build_sqlite_url(connection_string);
        let manager = Manager::new(url, Runtime::Tokio1);
        let pool = Pool::builder(manager)
            .max_size(1)
            .build()
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))?;

        info!("SQLite connection pool initialized (size: 1)");
        Ok(Self { pool })
    }

    /// Returns a clone of the connection pool.
    pub fn pool(&self) -> Pool {
        self.pool.clone()
    }

    /// Strips a `sqlite://` prefix if present.
    fn build_sqlite_url(connection_string: &str) -> String {
        if let Some(path) = connection_string.strip_prefix("sqlite://") {
            path.to_string()
        } else {
            connection_string.to_string()
        }
    }

    /// Sets concurrency pragmas and runs pending migrations.
    pub async fn run_migrations(&self) -> Result<(), ValidationError> {
        let conn = self
            .pool
            .get()
            .await
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))?;

        conn.interact(|conn| {
            use diesel::prelude::*;

            // WAL mode allows concurrent reads during writes;
            // busy_timeout makes SQLite wait instead of failing on locks.
            diesel::sql_query("PRAGMA journal_mode=WAL;")
                .execute(conn)
                .map_err(|e| ValidationError::Migration(e.to_string()))?;
            diesel::sql_query("PRAGMA busy_timeout=30000;")
                .execute(conn)
                .map_err(|e| ValidationError::Migration(e.to_string()))?;

            conn.run_pending_migrations(MIGRATIONS)
                .map_err(|e| ValidationError::Migration(e.to_string()))?;
            Ok::<(), ValidationError>(())
        })
        .await
        .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??;

        info!("Database migrations complete");
        Ok(())
    }
}
