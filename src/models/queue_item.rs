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

//! Work queue wire format.
//!
//! Items are serialized as JSON objects into the durable queue. Fields
//! beyond the required four default when absent so older payloads keep
//! deserializing. `task_type` stays a string on the wire and is parsed
//! at dispatch; `priority` is advisory metadata and does not affect
//! dispatch order.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::models::scheduled_task::TaskType;

/// Priority recorded on items enqueued by the scheduler loop.
pub const CRON_PRIORITY: i32 = 1;
/// Priority recorded on items enqueued by a manual trigger.
pub const MANUAL_PRIORITY: i32 = 10;

const DEFAULT_MAX_RETRIES: u32 = 3;

/// One unit of work in the durable queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskQueueItem {
    /// The pre-created execution row this item drives.
    pub execution_id: i64,
    pub task_type: String,
    pub connection_id: i64,
    #[serde(default)]
    pub scheduled_task_id: Option<i64>,
    /// Parameter snapshot taken at enqueue time.
    #[serde(default = "empty_object")]
    pub parameters: serde_json::Value,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl TaskQueueItem {
    /// Parses the wire task type against the closed set.
    pub fn task_type(&self) -> Result<TaskType, ValidationError> {
        self.task_type.parse()
    }

    /// Whether another retry fits in this item's budget.
    pub fn has_retry_budget(&self) -> bool {
        self.retry_count < self.max_retries
    }
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}
