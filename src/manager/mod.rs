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

//! Lifecycle management.
//!
//! [`SchedulerManager`] wires the store, queue, scheduler and workers
//! together, owns their shared running flag, and exposes an on-demand
//! status surface. Startup is fail-closed: migrations and the secret
//! store ping must both succeed before any loop is spawned.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::analysis::AnalysisBackend;
use crate::config::SchedulerConfig;
use crate::dal::DAL;
use crate::database::Database;
use crate::error::ManagerError;
use crate::models::queue_item::TaskQueueItem;
use crate::models::task_execution::TaskExecution;
use crate::queue::TaskQueue;
use crate::scheduler::TaskScheduler;
use crate::secrets::SecretStore;
use crate::target::TargetConnector;
use crate::worker::TaskWorker;

/// Point-in-time view of the subsystem, computed on demand.
#[derive(Debug)]
pub struct SchedulerStatus {
    pub running: bool,
    pub queue_length: i64,
    /// Head-of-queue sample, bounded by the configured sample size.
    pub pending_items: Vec<TaskQueueItem>,
    pub running_executions: Vec<TaskExecution>,
}

/// Owns the scheduler loop and the worker pool.
pub struct SchedulerManager {
    database: Database,
    dal: DAL,
    queue: TaskQueue,
    scheduler: Arc<TaskScheduler>,
    workers: Vec<Arc<TaskWorker>>,
    secrets: Arc<dyn SecretStore>,
    config: SchedulerConfig,
    running: Arc<AtomicBool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl SchedulerManager {
    /// Wires the subsystem together without touching the store or the
    /// network; [`initialize`](Self::initialize) does that.
    pub fn new(
        database: Database,
        config: SchedulerConfig,
        secrets: Arc<dyn SecretStore>,
        analysis: Arc<dyn AnalysisBackend>,
        connector: Arc<dyn TargetConnector>,
    ) -> Self {
        let dal = DAL::new(database.clone());
        let queue =
            TaskQueue::new(database.clone()).with_poll_interval(config.queue_poll_interval());
        let scheduler = Arc::new(TaskScheduler::new(
            dal.clone(),
            queue.clone(),
            config.clone(),
        ));

        let workers = (1..=config.worker_count())
            .map(|i| {
                Arc::new(TaskWorker::new(
                    format!("worker-{}", i),
                    dal.clone(),
                    queue.clone(),
                    Arc::clone(&secrets),
                    Arc::clone(&analysis),
                    Arc::clone(&connector),
                    config.clone(),
                ))
            })
            .collect();

        Self {
            database,
            dal,
            queue,
            scheduler,
            workers,
            secrets,
            config,
            running: Arc::new(AtomicBool::new(false)),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// The scheduler service, for task CRUD and manual triggers.
    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    /// Runs migrations and verifies the secret store is reachable.
    /// Any failure aborts startup; nothing is spawned.
    pub async fn initialize(&self) -> Result<(), ManagerError> {
        self.database
            .run_migrations()
            .await
            .map_err(|e| ManagerError::Startup(e.to_string()))?;
        self.secrets.ping().await?;
        info!("Scheduler manager initialized");
        Ok(())
    }

    /// Spawns the scheduler loop and the worker pool. Idempotent: calling
    /// it while running does nothing.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut handles = self.handles.lock().await;
        let scheduler = Arc::clone(&self.scheduler);
        let flag = Arc::clone(&self.running);
        handles.push(tokio::spawn(async move {
            scheduler.run(flag).await;
        }));

        for worker in &self.workers {
            let worker = Arc::clone(worker);
            let flag = Arc::clone(&self.running);
            handles.push(tokio::spawn(async move {
                worker.run(flag).await;
            }));
        }

        info!(workers = self.workers.len(), "Scheduler manager started");
    }

    /// Stops all loops: clears the running flag, aborts the tasks, and
    /// awaits them with cancellation errors suppressed. Safe to call
    /// repeatedly; later calls are no-ops.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);

        let mut handles = self.handles.lock().await;
        if handles.is_empty() {
            return;
        }
        for handle in handles.drain(..) {
            handle.abort();
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!("Loop terminated abnormally: {}", e);
                }
            }
        }
        info!("Scheduler manager stopped");
    }

    /// Whether loops are currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Computes the current status from the store and queue.
    pub async fn status(&self) -> Result<SchedulerStatus, ManagerError> {
        let queue_length = self.queue.len().await?;
        let pending_items = self.queue.peek(0, self.config.status_sample_size()).await?;
        let running_executions = self.dal.task_execution().list_running().await?;

        Ok(SchedulerStatus {
            running: self.is_running(),
            queue_length,
            pending_items,
            running_executions,
        })
    }
}
