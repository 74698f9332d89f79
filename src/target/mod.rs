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

//! Target database seam.
//!
//! Workers talk to the PostgreSQL instances under analysis through
//! [`TargetClient`], obtained from a [`TargetConnector`] with credentials
//! from the secret store. The production implementation runs on
//! `tokio-postgres`; tests substitute canned clients.
//!
//! Methods that depend on the `pg_stat_statements` extension return
//! `Option`: `None` means the extension is unavailable and callers fall
//! back to basic server information.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio_postgres::types::Type;
use tokio_postgres::{NoTls, Row};
use tracing::{debug, warn};

use crate::error::TargetError;
use crate::secrets::ConnectionSecret;

/// Outcome of a dynamic SQL statement.
#[derive(Debug, Clone, PartialEq)]
pub enum CustomSqlOutcome {
    /// A SELECT/WITH statement with its column names and JSON-shaped rows.
    Rows { columns: Vec<String>, rows: Vec<Value> },
    /// A DML/DDL statement with its affected-row count.
    Command { rows_affected: u64 },
}

/// A live session against one target database.
#[async_trait]
pub trait TargetClient: Send + Sync {
    /// Server version number, e.g. "16.3", or "unknown".
    async fn server_version(&self) -> Result<String, TargetError>;

    /// Slow-statement digest from `pg_stat_statements`, one line per
    /// statement. `None` when the extension is unavailable; an empty
    /// string when it is available but has nothing over the threshold.
    async fn recent_activity(
        &self,
        min_total_exec_ms: f64,
        limit: i64,
    ) -> Result<Option<String>, TargetError>;

    /// One-line server summary (version, database, server time).
    async fn server_summary(&self) -> Result<String, TargetError>;

    /// Settings from `pg_settings` restricted to the given categories,
    /// keyed by setting name with value/unit/category/description detail.
    async fn settings(&self, categories: &[&str]) -> Result<Value, TargetError>;

    /// Statement statistics rows from `pg_stat_statements`, or `None`
    /// when the extension is unavailable.
    async fn statement_stats(
        &self,
        min_total_exec_ms: f64,
        limit: i64,
    ) -> Result<Option<Vec<Value>>, TargetError>;

    /// Runs one operator-supplied statement under a statement timeout.
    async fn execute_sql(&self, sql: &str, timeout: Duration)
        -> Result<CustomSqlOutcome, TargetError>;

    /// Lists user tables as `schema.table`, up to `limit`.
    async fn list_tables(&self, limit: i64) -> Result<Vec<String>, TargetError>;

    /// Size, statistics and (optionally) column/index detail for one table.
    async fn analyze_table(&self, table: &str, detailed: bool) -> Result<Value, TargetError>;
}

/// Opens sessions against target databases.
#[async_trait]
pub trait TargetConnector: Send + Sync {
    async fn connect(&self, secret: &ConnectionSecret)
        -> Result<Box<dyn TargetClient>, TargetError>;
}

/// tokio-postgres backed connector.
pub struct PgTargetConnector {
    connect_timeout: Duration,
}

impl PgTargetConnector {
    pub fn new() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl Default for PgTargetConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TargetConnector for PgTargetConnector {
    async fn connect(
        &self,
        secret: &ConnectionSecret,
    ) -> Result<Box<dyn TargetClient>, TargetError> {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&secret.host)
            .port(secret.port)
            .dbname(&secret.database)
            .user(&secret.username)
            .password(&secret.password)
            .connect_timeout(self.connect_timeout);

        // ssl_mode in the secret is advisory; sessions are plain TCP.
        let (client, connection) = config.connect(NoTls).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!("Target connection closed with error: {}", e);
            }
        });

        Ok(Box::new(PgTargetClient { client }))
    }
}

/// One tokio-postgres session.
pub struct PgTargetClient {
    client: tokio_postgres::Client,
}

#[async_trait]
impl TargetClient for PgTargetClient {
    async fn server_version(&self) -> Result<String, TargetError> {
        let row = self.client.query_one("SELECT version()", &[]).await?;
        let version_string: String = row.get(0);
        // "PostgreSQL 16.3 on x86_64..." -> "16.3"
        Ok(version_string
            .split_whitespace()
            .nth(1)
            .unwrap_or("unknown")
            .to_string())
    }

    async fn recent_activity(
        &self,
        min_total_exec_ms: f64,
        limit: i64,
    ) -> Result<Option<String>, TargetError> {
        let result = self
            .client
            .query(
                "SELECT query, calls, total_exec_time, mean_exec_time \
                 FROM pg_stat_statements \
                 WHERE total_exec_time > $1 \
                 ORDER BY total_exec_time DESC \
                 LIMIT $2",
                &[&min_total_exec_ms, &limit],
            )
            .await;

        match result {
            Ok(rows) => {
                let lines: Vec<String> = rows
                    .iter()
                    .map(|row| {
                        let query: String = row.get("query");
                        let calls: i64 = row.get("calls");
                        let total_ms: f64 = row.get("total_exec_time");
                        format!("QUERY: {} | CALLS: {} | TIME: {:.0}ms", query, calls, total_ms)
                    })
                    .collect();
                Ok(Some(lines.join("\n")))
            }
            Err(e) => {
                debug!("pg_stat_statements unavailable: {}", e);
                Ok(None)
            }
        }
    }

    async fn server_summary(&self) -> Result<String, TargetError> {
        let row = self
            .client
            .query_one("SELECT version(), now()::text, current_database()", &[])
            .await?;
        let version: String = row.get(0);
        let now: String = row.get(1);
        let database: String = row.get(2);
        Ok(format!(
            "PostgreSQL Info: {} | Database: {} | Time: {}",
            version, database, now
        ))
    }

    async fn settings(&self, categories: &[&str]) -> Result<Value, TargetError> {
        let categories: Vec<String> = categories.iter().map(|c| c.to_string()).collect();
        let rows = self
            .client
            .query(
                "SELECT name, setting, unit, category, short_desc \
                 FROM pg_settings \
                 WHERE category = ANY($1) \
                 ORDER BY category, name",
                &[&categories],
            )
            .await?;

        let mut settings = Map::new();
        for row in rows {
            let name: String = row.get("name");
            let setting: String = row.get("setting");
            let unit: Option<String> = row.get("unit");
            let category: String = row.get("category");
            let description: Option<String> = row.get("short_desc");
            settings.insert(
                name,
                json!({
                    "value": setting,
                    "unit": unit,
                    "category": category,
                    "description": description,
                }),
            );
        }
        Ok(Value::Object(settings))
    }

    async fn statement_stats(
        &self,
        min_total_exec_ms: f64,
        limit: i64,
    ) -> Result<Option<Vec<Value>>, TargetError> {
        let result = self
            .client
            .query(
                "SELECT query, calls, total_exec_time, mean_exec_time, rows \
                 FROM pg_stat_statements \
                 WHERE total_exec_time > $1 \
                 ORDER BY total_exec_time DESC \
                 LIMIT $2",
                &[&min_total_exec_ms, &limit],
            )
            .await;

        match result {
            Ok(rows) => Ok(Some(rows.iter().map(row_to_json).collect())),
            Err(e) => {
                debug!("pg_stat_statements unavailable: {}", e);
                Ok(None)
            }
        }
    }

    async fn execute_sql(
        &self,
        sql: &str,
        timeout: Duration,
    ) -> Result<CustomSqlOutcome, TargetError> {
        self.client
            .batch_execute(&format!("SET statement_timeout = {}", timeout.as_millis()))
            .await?;

        let upper = sql.trim_start().to_uppercase();
        let is_select = upper.starts_with("SELECT") || upper.starts_with("WITH");

        if is_select {
            let statement = self.client.prepare(sql).await?;
            let columns: Vec<String> = statement
                .columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect();
            let rows = self.client.query(&statement, &[]).await?;
            Ok(CustomSqlOutcome::Rows {
                columns,
                rows: rows.iter().map(row_to_json).collect(),
            })
        } else {
            let rows_affected = self.client.execute(sql, &[]).await?;
            Ok(CustomSqlOutcome::Command { rows_affected })
        }
    }

    async fn list_tables(&self, limit: i64) -> Result<Vec<String>, TargetError> {
        let rows = self
            .client
            .query(
                "SELECT schemaname, tablename \
                 FROM pg_tables \
                 WHERE schemaname NOT IN ('information_schema', 'pg_catalog') \
                 ORDER BY schemaname, tablename \
                 LIMIT $1",
                &[&limit],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let schema: String = row.get("schemaname");
                let table: String = row.get("tablename");
                format!("{}.{}", schema, table)
            })
            .collect())
    }

    async fn analyze_table(&self, table: &str, detailed: bool) -> Result<Value, TargetError> {
        let (schema, bare_table) = match table.split_once('.') {
            Some((schema, bare)) => (schema.to_string(), bare.to_string()),
            None => ("public".to_string(), table.to_string()),
        };

        let info = self
            .client
            .query_opt(
                "SELECT tableowner, hasindexes, hastriggers \
                 FROM pg_tables \
                 WHERE schemaname = $1 AND tablename = $2",
                &[&schema, &bare_table],
            )
            .await?;

        let info = match info {
            Some(row) => row,
            None => return Ok(json!({ "table": table, "error": "table not found" })),
        };
        let owner: String = info.get("tableowner");
        let has_indexes: bool = info.get("hasindexes");
        let has_triggers: bool = info.get("hastriggers");

        let qualified = format!("{}.{}", schema, bare_table);
        let sizes = self
            .client
            .query_one(
                "SELECT pg_size_pretty(pg_total_relation_size($1::regclass)) AS total_size, \
                        pg_size_pretty(pg_relation_size($1::regclass)) AS table_size, \
                        pg_size_pretty(pg_total_relation_size($1::regclass) - pg_relation_size($1::regclass)) AS indexes_size",
                &[&qualified],
            )
            .await?;
        let total_size: String = sizes.get("total_size");
        let table_size: String = sizes.get("table_size");
        let indexes_size: String = sizes.get("indexes_size");

        let stats = self
            .client
            .query_opt(
                "SELECT n_live_tup, n_dead_tup, last_vacuum, last_analyze \
                 FROM pg_stat_user_tables \
                 WHERE schemaname = $1 AND relname = $2",
                &[&schema, &bare_table],
            )
            .await?;
        let (estimated_rows, dead_rows, last_vacuum, last_analyze) = match &stats {
            Some(row) => {
                let live: i64 = row.get("n_live_tup");
                let dead: i64 = row.get("n_dead_tup");
                let vacuum: Option<chrono::DateTime<chrono::Utc>> = row.get("last_vacuum");
                let analyze: Option<chrono::DateTime<chrono::Utc>> = row.get("last_analyze");
                (
                    live,
                    dead,
                    vacuum.map(|t| t.to_rfc3339()),
                    analyze.map(|t| t.to_rfc3339()),
                )
            }
            None => (0, 0, None, None),
        };

        let mut analysis = json!({
            "table": table,
            "schema": schema,
            "owner": owner,
            "total_size": total_size,
            "table_size": table_size,
            "indexes_size": indexes_size,
            "estimated_rows": estimated_rows,
            "dead_rows": dead_rows,
            "has_indexes": has_indexes,
            "has_triggers": has_triggers,
            "last_vacuum": last_vacuum,
            "last_analyze": last_analyze,
        });

        if detailed {
            let columns = self
                .client
                .query(
                    "SELECT column_name, data_type, is_nullable, column_default, \
                            character_maximum_length, numeric_precision, numeric_scale \
                     FROM information_schema.columns \
                     WHERE table_schema = $1 AND table_name = $2 \
                     ORDER BY ordinal_position",
                    &[&schema, &bare_table],
                )
                .await?;
            let indexes = self
                .client
                .query(
                    "SELECT indexname, indexdef \
                     FROM pg_indexes \
                     WHERE schemaname = $1 AND tablename = $2",
                    &[&schema, &bare_table],
                )
                .await?;
            analysis["columns"] = Value::Array(columns.iter().map(row_to_json).collect());
            analysis["indexes"] = Value::Array(indexes.iter().map(row_to_json).collect());
        }

        Ok(analysis)
    }
}

/// Shapes one row into a JSON object keyed by column name. Types without
/// a direct JSON mapping fall back to their text representation or null.
fn row_to_json(row: &Row) -> Value {
    let mut object = Map::new();
    for (idx, column) in row.columns().iter().enumerate() {
        object.insert(column.name().to_string(), column_value(row, idx));
    }
    Value::Object(object)
}

fn column_value(row: &Row, idx: usize) -> Value {
    let ty = row.columns()[idx].type_();
    if *ty == Type::BOOL {
        opt_value(row.try_get::<_, Option<bool>>(idx).ok().flatten())
    } else if *ty == Type::INT2 {
        opt_value(row.try_get::<_, Option<i16>>(idx).ok().flatten())
    } else if *ty == Type::INT4 {
        opt_value(row.try_get::<_, Option<i32>>(idx).ok().flatten())
    } else if *ty == Type::INT8 {
        opt_value(row.try_get::<_, Option<i64>>(idx).ok().flatten())
    } else if *ty == Type::FLOAT4 {
        opt_value(
            row.try_get::<_, Option<f32>>(idx)
                .ok()
                .flatten()
                .map(|v| v as f64),
        )
    } else if *ty == Type::FLOAT8 {
        opt_value(row.try_get::<_, Option<f64>>(idx).ok().flatten())
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        row.try_get::<_, Option<Value>>(idx)
            .ok()
            .flatten()
            .unwrap_or(Value::Null)
    } else if *ty == Type::TIMESTAMPTZ {
        row.try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)
            .ok()
            .flatten()
            .map(|t| Value::String(t.to_rfc3339()))
            .unwrap_or(Value::Null)
    } else if *ty == Type::TIMESTAMP {
        row.try_get::<_, Option<chrono::NaiveDateTime>>(idx)
            .ok()
            .flatten()
            .map(|t| Value::String(t.to_string()))
            .unwrap_or(Value::Null)
    } else {
        row.try_get::<_, Option<String>>(idx)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null)
    }
}

fn opt_value<T: Into<Value>>(value: Option<T>) -> Value {
    value.map(Into::into).unwrap_or(Value::Null)
}
