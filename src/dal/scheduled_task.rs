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

//! DAL for scheduled tasks.

use chrono::NaiveDateTime;
use diesel::prelude::*;

use crate::dal::DAL;
use crate::database::schema::scheduled_tasks;
use crate::error::ValidationError;
use crate::models::scheduled_task::{NewScheduledTask, ScheduledTask, ScheduledTaskChangeset};

/// Operations on the `scheduled_tasks` table.
pub struct ScheduledTaskDAL<'a> {
    pub(crate) dal: &'a DAL,
}

impl<'a> ScheduledTaskDAL<'a> {
    /// Inserts a new scheduled task and returns the stored row.
    pub async fn create(&self, new_task: NewScheduledTask) -> Result<ScheduledTask, ValidationError> {
        let conn = self
            .dal
            .database
            .pool()
            .get()
            .await
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))?;

        let task: ScheduledTask = conn
            .interact(move |conn| {
                diesel::insert_into(scheduled_tasks::table)
                    .values(&new_task)
                    .get_result(conn)
            })
            .await
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??;

        Ok(task)
    }

    /// Retrieves a task by id.
    pub async fn get_by_id(&self, id: i64) -> Result<ScheduledTask, ValidationError> {
        let conn = self
            .dal
            .database
            .pool()
            .get()
            .await
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))?;

        let task: Option<ScheduledTask> = conn
            .interact(move |conn| scheduled_tasks::table.find(id).first(conn).optional())
            .await
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??;

        task.ok_or(ValidationError::TaskNotFound(id))
    }

    /// Lists tasks, newest first, optionally filtered to active ones.
    pub async fn list(&self, active_only: bool) -> Result<Vec<ScheduledTask>, ValidationError> {
        let conn = self
            .dal
            .database
            .pool()
            .get()
            .await
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))?;

        let tasks = conn
            .interact(move |conn| {
                let query = scheduled_tasks::table
                    .order(scheduled_tasks::created_at.desc())
                    .into_boxed();
                let query = if active_only {
                    query.filter(scheduled_tasks::is_active.eq(true))
                } else {
                    query
                };
                query.load(conn)
            })
            .await
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??;

        Ok(tasks)
    }

    /// Retrieves active tasks whose `next_run_at` has arrived, ordered by
    /// due time ascending.
    pub async fn get_due_tasks(
        &self,
        now: NaiveDateTime,
    ) -> Result<Vec<ScheduledTask>, ValidationError> {
        let conn = self
            .dal
            .database
            .pool()
            .get()
            .await
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))?;

        let tasks = conn
            .interact(move |conn| {
                scheduled_tasks::table
                    .filter(scheduled_tasks::is_active.eq(true))
                    .filter(scheduled_tasks::next_run_at.le(now))
                    .order(scheduled_tasks::next_run_at.asc())
                    .load(conn)
            })
            .await
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??;

        Ok(tasks)
    }

    /// Applies a partial update and returns the stored row.
    pub async fn update(
        &self,
        id: i64,
        changeset: ScheduledTaskChangeset,
    ) -> Result<ScheduledTask, ValidationError> {
        let conn = self
            .dal
            .database
            .pool()
            .get()
            .await
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))?;

        let task: ScheduledTask = conn
            .interact(move |conn| {
                diesel::update(scheduled_tasks::table.find(id))
                    .set(&changeset)
                    .get_result(conn)
            })
            .await
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??;

        Ok(task)
    }

    /// Records a firing: sets `last_run_at` and the freshly computed
    /// `next_run_at` in one write.
    pub async fn update_schedule_times(
        &self,
        id: i64,
        last_run: NaiveDateTime,
        next_run: NaiveDateTime,
    ) -> Result<(), ValidationError> {
        let conn = self
            .dal
            .database
            .pool()
            .get()
            .await
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))?;

        conn.interact(move |conn| {
            diesel::update(scheduled_tasks::table.find(id))
                .set((
                    scheduled_tasks::last_run_at.eq(last_run),
                    scheduled_tasks::next_run_at.eq(next_run),
                    scheduled_tasks::updated_at.eq(last_run),
                ))
                .execute(conn)
        })
        .await
        .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??;

        Ok(())
    }

    /// Deletes a task row.
    pub async fn delete(&self, id: i64) -> Result<(), ValidationError> {
        let conn = self
            .dal
            .database
            .pool()
            .get()
            .await
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))?;

        conn.interact(move |conn| diesel::delete(scheduled_tasks::table.find(id)).execute(conn))
            .await
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??;

        Ok(())
    }
}
