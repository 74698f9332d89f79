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

//! Scheduled task model and the task type / status / parameter vocabulary.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::database::schema::scheduled_tasks;
use crate::error::ValidationError;

/// The closed set of analysis task types this crate can execute.
///
/// Stored and transmitted as snake_case text; parsed back at the DAL
/// boundary and at worker dispatch. A string outside this set fails the
/// execution immediately rather than round-tripping through retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    LogAnalysis,
    ConfigCheck,
    QueryAnalysis,
    CustomSql,
    TableAnalysis,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::LogAnalysis => "log_analysis",
            TaskType::ConfigCheck => "config_check",
            TaskType::QueryAnalysis => "query_analysis",
            TaskType::CustomSql => "custom_sql",
            TaskType::TableAnalysis => "table_analysis",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "log_analysis" => Ok(TaskType::LogAnalysis),
            "config_check" => Ok(TaskType::ConfigCheck),
            "query_analysis" => Ok(TaskType::QueryAnalysis),
            "custom_sql" => Ok(TaskType::CustomSql),
            "table_analysis" => Ok(TaskType::TableAnalysis),
            other => Err(ValidationError::UnknownTaskType(other.to_string())),
        }
    }
}

/// Lifecycle status of a task execution.
///
/// `Completed`, `Failed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            other => Err(ValidationError::UnknownTaskStatus(other.to_string())),
        }
    }
}

/// Parameters attached to a scheduled task and snapshotted into each
/// execution. All fields have defaults so sparse JSON objects from
/// operators deserialize cleanly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskParameters {
    pub environment: String,
    pub log_level: Option<String>,
    pub log_source: Option<String>,
    pub time_range_hours: i64,
    pub config_sections: Option<Vec<String>>,
    pub check_performance: bool,
    pub check_security: bool,
    pub custom_sql: Option<String>,
    pub target_tables: Option<Vec<String>>,
    /// Statement timeout for custom SQL, in seconds.
    pub query_timeout: u64,
    pub output_format: String,
    pub detailed_analysis: bool,
}

impl Default for TaskParameters {
    fn default() -> Self {
        Self {
            environment: "production".to_string(),
            log_level: None,
            log_source: None,
            time_range_hours: 24,
            config_sections: None,
            check_performance: true,
            check_security: true,
            custom_sql: None,
            target_tables: None,
            query_timeout: 300,
            output_format: "json".to_string(),
            detailed_analysis: false,
        }
    }
}

/// A persisted scheduled task row.
#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = scheduled_tasks)]
pub struct ScheduledTask {
    pub id: i64,
    pub name: String,
    pub task_type: String,
    pub connection_id: i64,
    pub cron_schedule: String,
    pub is_active: bool,
    pub last_run_at: Option<NaiveDateTime>,
    pub next_run_at: Option<NaiveDateTime>,
    pub task_params: String,
    pub description: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl ScheduledTask {
    /// Parses the stored task type string.
    pub fn task_type(&self) -> Result<TaskType, ValidationError> {
        self.task_type.parse()
    }

    /// Parses the stored parameter JSON. An empty column reads as `{}`.
    pub fn params_value(&self) -> Result<serde_json::Value, ValidationError> {
        if self.task_params.trim().is_empty() {
            return Ok(serde_json::Value::Object(Default::default()));
        }
        Ok(serde_json::from_str(&self.task_params)?)
    }
}

/// Insertable form of a scheduled task.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = scheduled_tasks)]
pub struct NewScheduledTask {
    pub name: String,
    pub task_type: String,
    pub connection_id: i64,
    pub cron_schedule: String,
    pub is_active: bool,
    pub next_run_at: Option<NaiveDateTime>,
    pub task_params: String,
    pub description: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Request to create a scheduled task, before validation.
#[derive(Debug, Clone)]
pub struct TaskDefinition {
    pub name: String,
    pub task_type: TaskType,
    pub connection_id: i64,
    pub cron_schedule: String,
    pub task_params: TaskParameters,
    pub description: Option<String>,
    pub is_active: bool,
}

impl TaskDefinition {
    pub fn new(
        name: impl Into<String>,
        task_type: TaskType,
        connection_id: i64,
        cron_schedule: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            task_type,
            connection_id,
            cron_schedule: cron_schedule.into(),
            task_params: TaskParameters::default(),
            description: None,
            is_active: true,
        }
    }

    pub fn with_params(mut self, params: TaskParameters) -> Self {
        self.task_params = params;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// Partial update for a scheduled task; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub name: Option<String>,
    pub cron_schedule: Option<String>,
    pub task_params: Option<TaskParameters>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

/// Diesel changeset backing [`TaskUpdate`]; `updated_at` is always set.
#[derive(Debug, AsChangeset)]
#[diesel(table_name = scheduled_tasks)]
pub struct ScheduledTaskChangeset {
    pub name: Option<String>,
    pub cron_schedule: Option<String>,
    pub next_run_at: Option<NaiveDateTime>,
    pub task_params: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
    pub updated_at: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_type_round_trips_through_text() {
        for (ty, s) in [
            (TaskType::LogAnalysis, "log_analysis"),
            (TaskType::ConfigCheck, "config_check"),
            (TaskType::QueryAnalysis, "query_analysis"),
            (TaskType::CustomSql, "custom_sql"),
            (TaskType::TableAnalysis, "table_analysis"),
        ] {
            assert_eq!(ty.as_str(), s);
            assert_eq!(s.parse::<TaskType>().unwrap(), ty);
        }
        assert!("vacuum_everything".parse::<TaskType>().is_err());
    }

    #[test]
    fn terminal_statuses() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
    }

    #[test]
    fn sparse_parameter_objects_deserialize_with_defaults() {
        let params: TaskParameters =
            serde_json::from_str(r#"{"custom_sql": "SELECT 1"}"#).unwrap();
        assert_eq!(params.custom_sql.as_deref(), Some("SELECT 1"));
        assert_eq!(params.environment, "production");
        assert_eq!(params.time_range_hours, 24);
        assert_eq!(params.query_timeout, 300);
        assert!(params.check_performance);
        assert!(!params.detailed_analysis);
    }
}
