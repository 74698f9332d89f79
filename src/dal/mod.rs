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

//! Data Access Layer.
//!
//! The [`DAL`] facade hands out per-entity accessors. All database work
//! happens inside `conn.interact(...)` closures on the pooled SQLite
//! connection; status and type enums cross this boundary as text.

use crate::database::Database;

mod analysis_result;
mod connection;
mod scheduled_task;
mod task_execution;

pub use analysis_result::{AnalysisResultDAL, AnalysisResultRow};
pub use connection::ConnectionDAL;
pub use scheduled_task::ScheduledTaskDAL;
pub use task_execution::TaskExecutionDAL;

/// Facade over the per-entity data access objects.
#[derive(Debug, Clone)]
pub struct DAL {
    pub(crate) database: Database,
}

impl DAL {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    /// Scheduled task operations.
    pub fn scheduled_task(&self) -> ScheduledTaskDAL {
        ScheduledTaskDAL { dal: self }
    }

    /// Task execution operations.
    pub fn task_execution(&self) -> TaskExecutionDAL {
        TaskExecutionDAL { dal: self }
    }

    /// Connection registry operations.
    pub fn connection(&self) -> ConnectionDAL {
        ConnectionDAL { dal: self }
    }

    /// Analysis result history operations.
    pub fn analysis_result(&self) -> AnalysisResultDAL {
        AnalysisResultDAL { dal: self }
    }
}
