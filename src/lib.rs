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

//! # Pgsentinel
//!
//! A library for scheduling and executing recurring analysis tasks
//! against a fleet of PostgreSQL databases.
//!
//! Tasks carry a cron schedule and a task type (log analysis, config
//! check, query analysis, custom SQL, table analysis). A scheduler loop
//! fires due tasks into a durable work queue; a pool of workers claims
//! items, connects to the target database with credentials from a secret
//! store, runs the analysis (delegating log and config verdicts to an
//! external analysis backend), and records the outcome on the execution
//! row. Transient failures are retried with a linear backoff under a
//! per-item budget.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use pgsentinel::{
//!     Database, HttpAnalysisBackend, PgTargetConnector, SchedulerConfig,
//!     SchedulerManager, TaskDefinition, TaskType, VaultSecretStore,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let database = Database::new("pgsentinel.db")?;
//! let manager = SchedulerManager::new(
//!     database,
//!     SchedulerConfig::from_env(),
//!     Arc::new(VaultSecretStore::from_env()?),
//!     Arc::new(HttpAnalysisBackend::new(
//!         "http://localhost:8000",
//!         Duration::from_secs(300),
//!     )?),
//!     Arc::new(PgTargetConnector::new()),
//! );
//! manager.initialize().await?;
//! manager.start().await;
//!
//! let task = manager
//!     .scheduler()
//!     .create_task(TaskDefinition::new(
//!         "nightly-config-review",
//!         TaskType::ConfigCheck,
//!         1,
//!         "0 2 * * *",
//!     ))
//!     .await?;
//! println!("created task {}", task.id);
//!
//! manager.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod config;
pub mod cron;
pub mod dal;
pub mod database;
pub mod error;
pub mod manager;
pub mod models;
pub mod queue;
pub mod scheduler;
pub mod secrets;
pub mod target;
pub mod worker;

pub use analysis::{AnalysisBackend, HttpAnalysisBackend};
pub use config::{SchedulerConfig, SchedulerConfigBuilder};
pub use dal::DAL;
pub use database::Database;
pub use error::{
    AnalysisError, ManagerError, QueueError, SchedulerError, SecretStoreError, TargetError,
    ValidationError, WorkerError,
};
pub use manager::{SchedulerManager, SchedulerStatus};
pub use models::{
    Connection, NewConnection, ScheduledTask, TaskDefinition, TaskExecution, TaskParameters,
    TaskQueueItem, TaskStatus, TaskType, TaskUpdate, CRON_PRIORITY, MANUAL_PRIORITY,
};
pub use queue::TaskQueue;
pub use scheduler::TaskScheduler;
pub use secrets::{ConnectionSecret, SecretStore, StaticSecretStore, VaultSecretStore};
pub use target::{CustomSqlOutcome, PgTargetConnector, TargetClient, TargetConnector};
pub use worker::TaskWorker;
