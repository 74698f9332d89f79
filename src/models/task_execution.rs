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

//! Task execution model.
//!
//! One row per firing of a task (or manual trigger). The row is created
//! in `pending` before the queue item referencing it is pushed, and a
//! single worker owns all subsequent transitions.

use chrono::NaiveDateTime;
use diesel::prelude::*;

use crate::database::schema::task_executions;
use crate::error::ValidationError;
use crate::models::scheduled_task::{TaskStatus, TaskType};

/// A persisted task execution row.
#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = task_executions)]
pub struct TaskExecution {
    pub id: i64,
    /// Absent for executions whose task was deleted, and kept nullable so
    /// history survives task deletion.
    pub scheduled_task_id: Option<i64>,
    pub task_type: String,
    pub connection_id: i64,
    pub status: String,
    /// JSON snapshot of the task parameters at enqueue time.
    pub parameters: String,
    pub started_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
    pub result: Option<String>,
    pub error_message: Option<String>,
}

impl TaskExecution {
    pub fn status(&self) -> Result<TaskStatus, ValidationError> {
        self.status.parse()
    }

    pub fn task_type(&self) -> Result<TaskType, ValidationError> {
        self.task_type.parse()
    }

    /// Parses the stored result JSON, if any.
    pub fn result_value(&self) -> Result<Option<serde_json::Value>, ValidationError> {
        match &self.result {
            Some(text) => Ok(Some(serde_json::from_str(text)?)),
            None => Ok(None),
        }
    }
}

/// Insertable form of a task execution.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = task_executions)]
pub struct NewTaskExecution {
    pub scheduled_task_id: Option<i64>,
    pub task_type: String,
    pub connection_id: i64,
    pub status: String,
    pub parameters: String,
    pub started_at: NaiveDateTime,
}
