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

//! DAL for task executions.
//!
//! Terminal statuses are immutable: the completed/failed/cancelled
//! transitions all filter on non-terminal current status, so a late write
//! against a finished execution is a no-op.

use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;

use crate::dal::DAL;
use crate::database::schema::task_executions;
use crate::error::ValidationError;
use crate::models::scheduled_task::TaskStatus;
use crate::models::task_execution::{NewTaskExecution, TaskExecution};

const NON_TERMINAL: [&str; 2] = ["pending", "running"];

/// Operations on the `task_executions` table.
pub struct TaskExecutionDAL<'a> {
    pub(crate) dal: &'a DAL,
}

impl<'a> TaskExecutionDAL<'a> {
    /// Inserts a new execution row and returns it.
    pub async fn create(
        &self,
        new_execution: NewTaskExecution,
    ) -> Result<TaskExecution, ValidationError> {
        let conn = self
            .dal
            .database
            .pool()
            .get()
            .await
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))?;

        let execution: TaskExecution = conn
            .interact(move |conn| {
                diesel::insert_into(task_executions::table)
                    .values(&new_execution)
                    .get_result(conn)
            })
            .await
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??;

        Ok(execution)
    }

    /// Retrieves an execution by id.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<TaskExecution>, ValidationError> {
        let conn = self
            .dal
            .database
            .pool()
            .get()
            .await
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))?;

        let execution = conn
            .interact(move |conn| task_executions::table.find(id).first(conn).optional())
            .await
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??;

        Ok(execution)
    }

    /// Marks an execution running and refreshes its start time.
    pub async fn mark_running(&self, id: i64) -> Result<(), ValidationError> {
        let now = Utc::now().naive_utc();
        let conn = self
            .dal
            .database
            .pool()
            .get()
            .await
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))?;

        conn.interact(move |conn| {
            diesel::update(
                task_executions::table
                    .find(id)
                    .filter(task_executions::status.eq_any(NON_TERMINAL.as_slice())),
            )
            .set((
                task_executions::status.eq(TaskStatus::Running.as_str()),
                task_executions::started_at.eq(now),
            ))
            .execute(conn)
        })
        .await
        .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??;

        Ok(())
    }

    /// Marks an execution completed with its result document.
    pub async fn mark_completed(
        &self,
        id: i64,
        result: &serde_json::Value,
    ) -> Result<(), ValidationError> {
        let now = Utc::now().naive_utc();
        let result_text = serde_json::to_string(result)?;
        let conn = self
            .dal
            .database
            .pool()
            .get()
            .await
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))?;

        conn.interact(move |conn| {
            diesel::update(
                task_executions::table
                    .find(id)
                    .filter(task_executions::status.eq_any(NON_TERMINAL.as_slice())),
            )
            .set((
                task_executions::status.eq(TaskStatus::Completed.as_str()),
                task_executions::completed_at.eq(now),
                task_executions::result.eq(result_text),
            ))
            .execute(conn)
        })
        .await
        .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??;

        Ok(())
    }

    /// Marks an execution failed with a diagnostic message.
    pub async fn mark_failed(&self, id: i64, error_message: &str) -> Result<(), ValidationError> {
        let now = Utc::now().naive_utc();
        let message = error_message.to_string();
        let conn = self
            .dal
            .database
            .pool()
            .get()
            .await
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))?;

        conn.interact(move |conn| {
            diesel::update(
                task_executions::table
                    .find(id)
                    .filter(task_executions::status.eq_any(NON_TERMINAL.as_slice())),
            )
            .set((
                task_executions::status.eq(TaskStatus::Failed.as_str()),
                task_executions::completed_at.eq(now),
                task_executions::error_message.eq(message),
            ))
            .execute(conn)
        })
        .await
        .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??;

        Ok(())
    }

    /// Cancels all still-pending executions of a task. Running executions
    /// belong to their worker and are left alone. Returns the number of
    /// rows cancelled.
    pub async fn cancel_pending_for_task(&self, task_id: i64) -> Result<usize, ValidationError> {
        let now = Utc::now().naive_utc();
        let conn = self
            .dal
            .database
            .pool()
            .get()
            .await
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))?;

        let cancelled = conn
            .interact(move |conn| {
                diesel::update(
                    task_executions::table
                        .filter(task_executions::scheduled_task_id.eq(task_id))
                        .filter(task_executions::status.eq(TaskStatus::Pending.as_str())),
                )
                .set((
                    task_executions::status.eq(TaskStatus::Cancelled.as_str()),
                    task_executions::completed_at.eq(now),
                ))
                .execute(conn)
            })
            .await
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??;

        Ok(cancelled)
    }

    /// Lists executions currently marked running.
    pub async fn list_running(&self) -> Result<Vec<TaskExecution>, ValidationError> {
        let conn = self
            .dal
            .database
            .pool()
            .get()
            .await
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))?;

        let executions = conn
            .interact(move |conn| {
                task_executions::table
                    .filter(task_executions::status.eq(TaskStatus::Running.as_str()))
                    .order(task_executions::started_at.asc())
                    .load(conn)
            })
            .await
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??;

        Ok(executions)
    }

    /// Lists pending executions created before `cutoff`. Supports operator
    /// reconciliation of executions orphaned by a crash between push and
    /// claim; nothing in this crate acts on them automatically.
    pub async fn list_pending_older_than(
        &self,
        cutoff: NaiveDateTime,
    ) -> Result<Vec<TaskExecution>, ValidationError> {
        let conn = self
            .dal
            .database
            .pool()
            .get()
            .await
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))?;

        let executions = conn
            .interact(move |conn| {
                task_executions::table
                    .filter(task_executions::status.eq(TaskStatus::Pending.as_str()))
                    .filter(task_executions::started_at.lt(cutoff))
                    .order(task_executions::started_at.asc())
                    .load(conn)
            })
            .await
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??;

        Ok(executions)
    }

    /// Lists all executions of one scheduled task, newest first.
    pub async fn list_for_task(&self, task_id: i64) -> Result<Vec<TaskExecution>, ValidationError> {
        let conn = self
            .dal
            .database
            .pool()
            .get()
            .await
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))?;

        let executions = conn
            .interact(move |conn| {
                task_executions::table
                    .filter(task_executions::scheduled_task_id.eq(task_id))
                    .order(task_executions::started_at.desc())
                    .load(conn)
            })
            .await
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??;

        Ok(executions)
    }
}
