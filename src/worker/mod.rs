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

//! Task worker.
//!
//! Each [`TaskWorker`] loops on a blocking queue pop and processes one
//! item at a time: mark the execution running, resolve credentials,
//! connect to the target, dispatch by task type, then report. A transient
//! failure re-queues the item with an incremented retry count after a
//! linear backoff; a configuration failure or an exhausted budget marks
//! the execution failed. Item-level errors never terminate the loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::analysis::AnalysisBackend;
use crate::config::SchedulerConfig;
use crate::dal::DAL;
use crate::error::WorkerError;
use crate::models::queue_item::TaskQueueItem;
use crate::models::scheduled_task::TaskParameters;
use crate::queue::TaskQueue;
use crate::secrets::SecretStore;
use crate::target::TargetConnector;

pub mod handlers;

use handlers::TargetInfo;

/// One worker loop over the shared queue.
pub struct TaskWorker {
    worker_id: String,
    dal: DAL,
    queue: TaskQueue,
    secrets: Arc<dyn SecretStore>,
    analysis: Arc<dyn AnalysisBackend>,
    connector: Arc<dyn TargetConnector>,
    config: SchedulerConfig,
}

impl TaskWorker {
    pub fn new(
        worker_id: impl Into<String>,
        dal: DAL,
        queue: TaskQueue,
        secrets: Arc<dyn SecretStore>,
        analysis: Arc<dyn AnalysisBackend>,
        connector: Arc<dyn TargetConnector>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            dal,
            queue,
            secrets,
            analysis,
            connector,
            config,
        }
    }

    /// Runs until `running` is cleared. One blocking pop per iteration;
    /// a pop timeout just re-checks the flag.
    pub async fn run(&self, running: Arc<AtomicBool>) {
        info!(worker = %self.worker_id, "Worker loop started");
        while running.load(Ordering::Relaxed) {
            match self.queue.blocking_pop(self.config.queue_pop_timeout()).await {
                Ok(Some(item)) => {
                    let execution_id = item.execution_id;
                    if let Err(e) = self.process_item(item).await {
                        // Store-level failure while reporting; the handler
                        // outcome itself is settled inside process_item.
                        error!(
                            worker = %self.worker_id,
                            execution_id,
                            "Failed to record execution outcome: {}", e
                        );
                    }
                }
                Ok(None) => continue,
                Err(e) => {
                    error!(worker = %self.worker_id, "Queue error: {}", e);
                    if running.load(Ordering::Relaxed) {
                        tokio::time::sleep(self.config.worker_error_pause()).await;
                    }
                }
            }
        }
        info!(worker = %self.worker_id, "Worker loop stopped");
    }

    /// Processes one claimed item end to end.
    ///
    /// Returns `Err` only for store-level failures while recording the
    /// outcome; handler errors are absorbed into the retry/fail decision.
    pub async fn process_item(&self, item: TaskQueueItem) -> Result<(), WorkerError> {
        debug!(
            worker = %self.worker_id,
            execution_id = item.execution_id,
            task_type = %item.task_type,
            retry_count = item.retry_count,
            "Processing queue item"
        );
        self.dal.task_execution().mark_running(item.execution_id).await?;

        match self.execute_item(&item).await {
            Ok(result) => {
                self.dal
                    .task_execution()
                    .mark_completed(item.execution_id, &result)
                    .await?;
                // History write is best-effort; the execution row already
                // holds the authoritative result.
                if let Err(e) = self
                    .dal
                    .analysis_result()
                    .record(item.connection_id, &item.task_type, &result)
                    .await
                {
                    warn!(
                        execution_id = item.execution_id,
                        "Failed to record analysis history: {}", e
                    );
                }
                info!(
                    worker = %self.worker_id,
                    execution_id = item.execution_id,
                    task_type = %item.task_type,
                    "Task completed"
                );
                Ok(())
            }
            Err(e) if e.is_retryable() && item.has_retry_budget() => {
                self.retry_item(item, &e).await
            }
            Err(e) => {
                warn!(
                    worker = %self.worker_id,
                    execution_id = item.execution_id,
                    task_type = %item.task_type,
                    retry_count = item.retry_count,
                    "Task failed permanently: {}", e
                );
                self.dal
                    .task_execution()
                    .mark_failed(item.execution_id, &e.to_string())
                    .await?;
                Ok(())
            }
        }
    }

    /// Resolves collaborators and runs the handler for one item.
    async fn execute_item(&self, item: &TaskQueueItem) -> Result<Value, WorkerError> {
        let task_type = item
            .task_type()
            .map_err(|_| WorkerError::UnknownTaskType(item.task_type.clone()))?;

        let connection = self
            .dal
            .connection()
            .get_by_id(item.connection_id)
            .await?
            .ok_or(WorkerError::ConnectionNotFound(item.connection_id))?;

        let secret_path = connection.resolved_secret_path();
        let secret = self
            .secrets
            .get_secret(&secret_path)
            .await?
            .ok_or(WorkerError::CredentialsUnavailable(item.connection_id))?;

        let params: TaskParameters =
            serde_json::from_value(item.parameters.clone()).map_err(crate::error::ValidationError::from)?;

        let client = self.connector.connect(&secret).await?;
        let target = TargetInfo {
            connection_id: item.connection_id,
            host: secret.host.clone(),
            database: secret.database.clone(),
        };

        handlers::dispatch(
            task_type,
            client.as_ref(),
            self.analysis.as_ref(),
            &target,
            &params,
        )
        .await
    }

    /// Re-queues an item after its backoff delay with the retry count
    /// incremented. The execution row stays running until a later attempt
    /// settles it.
    async fn retry_item(&self, mut item: TaskQueueItem, cause: &WorkerError) -> Result<(), WorkerError> {
        item.retry_count += 1;
        let delay = self.config.retry_backoff(item.retry_count);
        warn!(
            worker = %self.worker_id,
            execution_id = item.execution_id,
            task_type = %item.task_type,
            retry_count = item.retry_count,
            max_retries = item.max_retries,
            delay_ms = delay.as_millis() as u64,
            "Retrying after transient error: {}", cause
        );
        tokio::time::sleep(delay).await;
        self.queue.push(&item).await?;
        Ok(())
    }
}
