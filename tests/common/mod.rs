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

//! Shared test fixtures: a temp SQLite store and canned collaborators.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tempfile::TempDir;

use pgsentinel::analysis::AnalysisBackend;
use pgsentinel::dal::DAL;
use pgsentinel::error::{AnalysisError, TargetError};
use pgsentinel::models::{Connection, NewConnection, TaskQueueItem, TaskType};
use pgsentinel::queue::TaskQueue;
use pgsentinel::secrets::{ConnectionSecret, SecretStore, StaticSecretStore};
use pgsentinel::target::{CustomSqlOutcome, TargetClient, TargetConnector};
use pgsentinel::worker::TaskWorker;
use pgsentinel::{Database, SchedulerConfig, TaskScheduler};

pub struct TestHarness {
    // Held so the database file outlives the harness.
    _dir: TempDir,
    pub database: Database,
    pub dal: DAL,
    pub queue: TaskQueue,
    pub config: SchedulerConfig,
}

/// Installs a subscriber driven by RUST_LOG for manual debugging runs.
/// Repeated calls are fine.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

/// Creates a migrated temp store with millisecond-scale cadences.
pub async fn harness() -> TestHarness {
    init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("pgsentinel.db");
    let database = Database::new(path.to_str().expect("utf8 path")).expect("database");
    database.run_migrations().await.expect("migrations");

    let config = SchedulerConfig::builder()
        .scheduler_poll_interval(Duration::from_millis(20))
        .scheduler_error_backoff(Duration::from_millis(20))
        .worker_count(2)
        .queue_pop_timeout(Duration::from_millis(50))
        .queue_poll_interval(Duration::from_millis(5))
        .retry_backoff_base(Duration::from_millis(5))
        .retry_backoff_cap(Duration::from_millis(20))
        .worker_error_pause(Duration::from_millis(5))
        .build();

    let dal = DAL::new(database.clone());
    let queue = TaskQueue::new(database.clone()).with_poll_interval(config.queue_poll_interval());

    TestHarness {
        _dir: dir,
        database,
        dal,
        queue,
        config,
    }
}

pub fn scheduler(h: &TestHarness) -> TaskScheduler {
    TaskScheduler::new(h.dal.clone(), h.queue.clone(), h.config.clone())
}

pub fn worker(
    h: &TestHarness,
    secrets: Arc<dyn SecretStore>,
    backend: Arc<dyn AnalysisBackend>,
) -> TaskWorker {
    TaskWorker::new(
        "worker-test",
        h.dal.clone(),
        h.queue.clone(),
        secrets,
        backend,
        Arc::new(MockTargetConnector),
        h.config.clone(),
    )
}

/// Registers a target database using the conventional default secret path.
pub async fn register_connection(dal: &DAL) -> Connection {
    dal.connection()
        .create(NewConnection {
            name: "primary".to_string(),
            secret_path: None,
            created_at: Utc::now().naive_utc(),
        })
        .await
        .expect("connection")
}

pub fn test_secret() -> ConnectionSecret {
    ConnectionSecret {
        host: "db1.internal".to_string(),
        port: 5432,
        database: "app".to_string(),
        username: "reviewer".to_string(),
        password: "s3cr3t".to_string(),
        ssl_mode: "prefer".to_string(),
    }
}

/// A secret store that can resolve exactly this connection.
pub fn secret_store_for(connection: &Connection) -> Arc<StaticSecretStore> {
    Arc::new(StaticSecretStore::new().with_secret(connection.resolved_secret_path(), test_secret()))
}

/// A minimal wire item as a manual trigger would produce it.
pub fn queue_item(execution_id: i64, task_type: &str, connection_id: i64) -> TaskQueueItem {
    TaskQueueItem {
        execution_id,
        task_type: task_type.to_string(),
        connection_id,
        scheduled_task_id: None,
        parameters: json!({}),
        priority: 10,
        retry_count: 0,
        max_retries: 3,
    }
}

/// Analysis backend that fails its first N calls with a 503, then answers
/// with a fixed verdict.
pub struct MockAnalysisBackend {
    failures_remaining: AtomicUsize,
    pub calls: AtomicUsize,
}

impl MockAnalysisBackend {
    pub fn healthy() -> Self {
        Self::failing(0)
    }

    pub fn failing(times: usize) -> Self {
        Self {
            failures_remaining: AtomicUsize::new(times),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always_failing() -> Self {
        Self::failing(usize::MAX)
    }
}

#[async_trait]
impl AnalysisBackend for MockAnalysisBackend {
    async fn analyze(&self, task_type: TaskType, payload: Value) -> Result<Value, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            if remaining != usize::MAX {
                self.failures_remaining.fetch_sub(1, Ordering::SeqCst);
            }
            return Err(AnalysisError::Status(503));
        }
        Ok(json!({
            "overall_score": 85,
            "issues": [],
            "analyzed": task_type.as_str(),
            "environment": payload.get("environment").cloned().unwrap_or(Value::Null),
        }))
    }
}

/// Target connector handing out canned sessions.
pub struct MockTargetConnector;

#[async_trait]
impl TargetConnector for MockTargetConnector {
    async fn connect(
        &self,
        _secret: &ConnectionSecret,
    ) -> Result<Box<dyn TargetClient>, TargetError> {
        Ok(Box::new(MockTargetClient))
    }
}

/// Canned target session: a healthy server with pg_stat_statements.
pub struct MockTargetClient;

#[async_trait]
impl TargetClient for MockTargetClient {
    async fn server_version(&self) -> Result<String, TargetError> {
        Ok("16.3".to_string())
    }

    async fn recent_activity(
        &self,
        _min_total_exec_ms: f64,
        _limit: i64,
    ) -> Result<Option<String>, TargetError> {
        Ok(Some(
            "QUERY: SELECT * FROM orders | CALLS: 42 | TIME: 1500ms".to_string(),
        ))
    }

    async fn server_summary(&self) -> Result<String, TargetError> {
        Ok("PostgreSQL Info: PostgreSQL 16.3 | Database: app | Time: now".to_string())
    }

    async fn settings(&self, categories: &[&str]) -> Result<Value, TargetError> {
        let mut settings = serde_json::Map::new();
        if categories.contains(&"Resource Usage / Memory") {
            settings.insert(
                "shared_buffers".to_string(),
                json!({
                    "value": "16384",
                    "unit": "8kB",
                    "category": "Resource Usage / Memory",
                    "description": "Sets the number of shared memory buffers used by the server.",
                }),
            );
        }
        Ok(Value::Object(settings))
    }

    async fn statement_stats(
        &self,
        _min_total_exec_ms: f64,
        _limit: i64,
    ) -> Result<Option<Vec<Value>>, TargetError> {
        Ok(Some(vec![json!({
            "query": "SELECT * FROM orders",
            "calls": 42,
            "total_exec_time": 1500.0,
            "mean_exec_time": 35.7,
            "rows": 420,
        })]))
    }

    async fn execute_sql(
        &self,
        sql: &str,
        _timeout: Duration,
    ) -> Result<CustomSqlOutcome, TargetError> {
        let upper = sql.trim_start().to_uppercase();
        if upper.starts_with("SELECT") || upper.starts_with("WITH") {
            Ok(CustomSqlOutcome::Rows {
                columns: vec!["value".to_string()],
                rows: vec![json!({"value": 1})],
            })
        } else {
            Ok(CustomSqlOutcome::Command { rows_affected: 3 })
        }
    }

    async fn list_tables(&self, _limit: i64) -> Result<Vec<String>, TargetError> {
        Ok(vec!["public.orders".to_string(), "public.users".to_string()])
    }

    async fn analyze_table(&self, table: &str, detailed: bool) -> Result<Value, TargetError> {
        let mut analysis = json!({
            "table": table,
            "schema": "public",
            "owner": "app",
            "total_size": "16 MB",
            "table_size": "12 MB",
            "indexes_size": "4 MB",
            "estimated_rows": 1000,
            "dead_rows": 10,
            "has_indexes": true,
            "has_triggers": false,
            "last_vacuum": null,
            "last_analyze": null,
        });
        if detailed {
            analysis["columns"] = json!([{"column_name": "id", "data_type": "bigint"}]);
            analysis["indexes"] = json!([{"indexname": "pk", "indexdef": "CREATE UNIQUE INDEX ..."}]);
        }
        Ok(analysis)
    }
}
