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

//! Task scheduler.
//!
//! [`TaskScheduler`] owns the scheduled-task CRUD surface and the cron
//! firing cycle. A cycle reads the due tasks, and for each one creates a
//! pending execution, pushes a queue item carrying a parameter snapshot,
//! and advances the task's schedule times. Per-task failures are logged
//! and isolated so one bad task cannot starve the rest of the cycle.
//!
//! `run_cycle` and `queue_task_now` take an explicit `now` so callers
//! (and tests) control the clock; the [`TaskScheduler::run`] loop feeds
//! them wall-clock time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use crate::config::SchedulerConfig;
use crate::cron;
use crate::dal::DAL;
use crate::error::{SchedulerError, ValidationError};
use crate::models::queue_item::{TaskQueueItem, CRON_PRIORITY, MANUAL_PRIORITY};
use crate::models::scheduled_task::{
    NewScheduledTask, ScheduledTask, ScheduledTaskChangeset, TaskDefinition, TaskStatus,
    TaskUpdate,
};
use crate::models::task_execution::NewTaskExecution;
use crate::queue::TaskQueue;

/// Scheduler service: task CRUD, the firing cycle, and the polling loop.
pub struct TaskScheduler {
    dal: DAL,
    queue: TaskQueue,
    config: SchedulerConfig,
}

impl TaskScheduler {
    pub fn new(dal: DAL, queue: TaskQueue, config: SchedulerConfig) -> Self {
        Self { dal, queue, config }
    }

    /// Validates and stores a new scheduled task with its first
    /// `next_run_at` computed from the current time.
    pub async fn create_task(&self, definition: TaskDefinition) -> Result<ScheduledTask, SchedulerError> {
        cron::validate(&definition.cron_schedule)?;
        let next_run = cron::next_occurrence(&definition.cron_schedule, Utc::now())?;
        let now = Utc::now().naive_utc();

        let new_task = NewScheduledTask {
            name: definition.name,
            task_type: definition.task_type.as_str().to_string(),
            connection_id: definition.connection_id,
            cron_schedule: definition.cron_schedule,
            is_active: definition.is_active,
            next_run_at: Some(next_run.naive_utc()),
            task_params: serde_json::to_string(&definition.task_params)
                .map_err(ValidationError::from)?,
            description: definition.description,
            created_at: now,
            updated_at: now,
        };

        let task = self.dal.scheduled_task().create(new_task).await?;
        info!(task_id = task.id, name = %task.name, "Scheduled task created");
        Ok(task)
    }

    /// Applies a partial update. A changed cron expression is validated
    /// first and `next_run_at` recomputed; on validation failure nothing
    /// is written.
    pub async fn update_task(&self, id: i64, update: TaskUpdate) -> Result<ScheduledTask, SchedulerError> {
        // Existence check up front so callers get TaskNotFound, not a
        // bare zero-row update.
        self.dal.scheduled_task().get_by_id(id).await?;

        let next_run_at = match &update.cron_schedule {
            Some(expression) => Some(cron::next_occurrence(expression, Utc::now())?.naive_utc()),
            None => None,
        };

        let changeset = ScheduledTaskChangeset {
            name: update.name,
            cron_schedule: update.cron_schedule,
            next_run_at,
            task_params: match update.task_params {
                Some(params) => {
                    Some(serde_json::to_string(&params).map_err(ValidationError::from)?)
                }
                None => None,
            },
            description: update.description,
            is_active: update.is_active,
            updated_at: Utc::now().naive_utc(),
        };

        let task = self.dal.scheduled_task().update(id, changeset).await?;
        info!(task_id = task.id, "Scheduled task updated");
        Ok(task)
    }

    /// Deletes a task: cancels its pending executions, purges its queued
    /// items, then removes the row. Running executions are left to finish.
    pub async fn delete_task(&self, id: i64) -> Result<(), SchedulerError> {
        self.dal.scheduled_task().get_by_id(id).await?;

        let cancelled = self.dal.task_execution().cancel_pending_for_task(id).await?;
        let purged = self.queue.remove_for_task(id).await?;
        self.dal.scheduled_task().delete(id).await?;

        info!(
            task_id = id,
            cancelled_executions = cancelled,
            purged_queue_items = purged,
            "Scheduled task deleted"
        );
        Ok(())
    }

    pub async fn get_task(&self, id: i64) -> Result<ScheduledTask, SchedulerError> {
        Ok(self.dal.scheduled_task().get_by_id(id).await?)
    }

    pub async fn list_tasks(&self, active_only: bool) -> Result<Vec<ScheduledTask>, SchedulerError> {
        Ok(self.dal.scheduled_task().list(active_only).await?)
    }

    /// Triggers one immediate execution of an active task, bypassing its
    /// schedule. Schedule times are not touched. Returns the execution id.
    pub async fn queue_task_now(&self, id: i64, now: DateTime<Utc>) -> Result<i64, SchedulerError> {
        let task = self.dal.scheduled_task().get_by_id(id).await?;
        if !task.is_active {
            return Err(ValidationError::TaskInactive(id).into());
        }

        let execution_id = self.enqueue_execution(&task, now, MANUAL_PRIORITY).await?;
        info!(task_id = id, execution_id, "Task queued manually");
        Ok(execution_id)
    }

    /// Runs one firing cycle at the given instant. Returns how many tasks
    /// were scheduled; per-task failures are logged and skipped.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<usize, SchedulerError> {
        let due = self.dal.scheduled_task().get_due_tasks(now.naive_utc()).await?;
        if due.is_empty() {
            return Ok(0);
        }
        debug!(due_count = due.len(), "Found due tasks");

        let mut scheduled = 0;
        for task in due {
            match self.fire_task(&task, now).await {
                Ok(execution_id) => {
                    info!(
                        task_id = task.id,
                        name = %task.name,
                        execution_id,
                        "Task scheduled for execution"
                    );
                    scheduled += 1;
                }
                Err(e) => {
                    error!(task_id = task.id, name = %task.name, "Failed to schedule task: {}", e);
                }
            }
        }
        Ok(scheduled)
    }

    /// Fires one due task: enqueue an execution, then advance the
    /// schedule so the same instant cannot fire twice.
    async fn fire_task(&self, task: &ScheduledTask, now: DateTime<Utc>) -> Result<i64, SchedulerError> {
        let execution_id = self.enqueue_execution(task, now, CRON_PRIORITY).await?;

        let next_run = cron::next_occurrence(&task.cron_schedule, now)?;
        self.dal
            .scheduled_task()
            .update_schedule_times(task.id, now.naive_utc(), next_run.naive_utc())
            .await?;

        Ok(execution_id)
    }

    /// Creates a pending execution snapshotting the task's parameters and
    /// pushes the queue item referencing it.
    async fn enqueue_execution(
        &self,
        task: &ScheduledTask,
        now: DateTime<Utc>,
        priority: i32,
    ) -> Result<i64, SchedulerError> {
        let params = task.params_value()?;

        let execution = self
            .dal
            .task_execution()
            .create(NewTaskExecution {
                scheduled_task_id: Some(task.id),
                task_type: task.task_type.clone(),
                connection_id: task.connection_id,
                status: TaskStatus::Pending.as_str().to_string(),
                parameters: serde_json::to_string(&params).map_err(ValidationError::from)?,
                started_at: now.naive_utc(),
            })
            .await?;

        let item = TaskQueueItem {
            execution_id: execution.id,
            task_type: task.task_type.clone(),
            connection_id: task.connection_id,
            scheduled_task_id: Some(task.id),
            parameters: params,
            priority,
            retry_count: 0,
            max_retries: 3,
        };
        self.queue.push(&item).await?;

        Ok(execution.id)
    }

    /// Runs cycles until `running` is cleared, sleeping the poll interval
    /// between cycles and backing off after a failed cycle.
    pub async fn run(&self, running: Arc<AtomicBool>) {
        info!("Scheduler loop started");
        while running.load(Ordering::Relaxed) {
            match self.run_cycle(Utc::now()).await {
                Ok(scheduled) => {
                    if scheduled > 0 {
                        debug!(scheduled, "Scheduler cycle complete");
                    }
                    tokio::time::sleep(self.config.scheduler_poll_interval()).await;
                }
                Err(e) => {
                    error!("Scheduler cycle failed: {}", e);
                    tokio::time::sleep(self.config.scheduler_error_backoff()).await;
                }
            }
        }
        info!("Scheduler loop stopped");
    }
}
