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

//! Error types for pgsentinel.
//!
//! Each subsystem gets its own `thiserror` enum; [`WorkerError`] is the
//! aggregate a task execution can fail with and carries the retryability
//! classification the worker uses to decide between re-queueing an item
//! and marking its execution failed.

use thiserror::Error;

/// Errors from validation and store access.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Cron expression could not be parsed.
    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },

    /// Connection pool error.
    #[error("Connection pool error: {0}")]
    ConnectionPool(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    /// Migration run failed.
    #[error("Migration error: {0}")]
    Migration(String),

    /// Referenced scheduled task does not exist.
    #[error("Scheduled task {0} not found")]
    TaskNotFound(i64),

    /// Task exists but is deactivated.
    #[error("Scheduled task {0} is not active")]
    TaskInactive(i64),

    /// Stored text column does not map to a known task type.
    #[error("Unknown task type: {0}")]
    UnknownTaskType(String),

    /// Stored text column does not map to a known execution status.
    #[error("Unknown task status: {0}")]
    UnknownTaskStatus(String),

    /// JSON (de)serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the durable work queue.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Connection pool error: {0}")]
    ConnectionPool(String),

    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Payload serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the secret store client.
#[derive(Debug, Error)]
pub enum SecretStoreError {
    /// No token was configured for the store.
    #[error("Secret store token is not configured")]
    MissingToken,

    /// The store rejected our token.
    #[error("Secret store authentication failed")]
    Unauthorized,

    /// Transport-level failure.
    #[error("Secret store request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The store answered with a body we could not interpret.
    #[error("Malformed secret store response: {0}")]
    Malformed(String),
}

/// Errors from the analysis backend client.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Analysis request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with a non-success status.
    #[error("Analysis backend returned status {0}")]
    Status(u16),

    #[error("Malformed analysis response: {0}")]
    Malformed(String),
}

/// Errors from the target database seam.
#[derive(Debug, Error)]
pub enum TargetError {
    #[error("Target database error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("Timed out connecting to target database")]
    ConnectTimeout,
}

/// Aggregate error a single task execution can fail with.
///
/// The variants partition into configuration errors (retrying cannot help)
/// and transient errors (the item is re-queued while retry budget remains).
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Secret(#[from] SecretStoreError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Target(#[from] TargetError),

    /// No connection row with this id exists in the registry.
    #[error("Connection {0} is not registered")]
    ConnectionNotFound(i64),

    /// The secret store had no credentials at the resolved path.
    #[error("No credentials available for connection {0}")]
    CredentialsUnavailable(i64),

    /// Task parameters are missing a field this task type requires.
    #[error("Required parameter '{0}' is missing or empty")]
    MissingParameter(&'static str),

    /// Queue item carried a task type this worker does not implement.
    #[error("Task type '{0}' is not implemented")]
    UnknownTaskType(String),
}

impl WorkerError {
    /// Whether re-queueing the item could plausibly succeed later.
    ///
    /// Store access, secret store, analysis backend and target database
    /// failures are treated as transient. Configuration problems (bad
    /// parameters, unknown task types, missing registry rows) are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            // Own-store access can fail transiently (pool exhaustion,
            // "database is locked"); the rest of the validation bucket
            // is configuration and cannot heal on retry.
            WorkerError::Validation(e) => matches!(
                e,
                ValidationError::ConnectionPool(_) | ValidationError::Database(_)
            ),
            WorkerError::ConnectionNotFound(_) => false,
            WorkerError::MissingParameter(_) => false,
            WorkerError::UnknownTaskType(_) => false,
            WorkerError::Queue(_) => true,
            WorkerError::Secret(_) => true,
            WorkerError::Analysis(_) => true,
            WorkerError::Target(_) => true,
            WorkerError::CredentialsUnavailable(_) => true,
        }
    }
}

/// Errors from scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Errors from manager lifecycle operations.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// Startup precondition failed; the manager refuses to run.
    #[error("Startup failed: {0}")]
    Startup(String),

    #[error(transparent)]
    SecretStore(#[from] SecretStoreError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}
