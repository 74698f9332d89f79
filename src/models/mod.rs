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

//! Data models for the scheduling subsystem.

pub mod connection;
pub mod queue_item;
pub mod scheduled_task;
pub mod task_execution;

pub use connection::{Connection, NewConnection};
pub use queue_item::{TaskQueueItem, CRON_PRIORITY, MANUAL_PRIORITY};
pub use scheduled_task::{
    NewScheduledTask, ScheduledTask, ScheduledTaskChangeset, TaskDefinition, TaskParameters,
    TaskStatus, TaskType, TaskUpdate,
};
pub use task_execution::{NewTaskExecution, TaskExecution};
