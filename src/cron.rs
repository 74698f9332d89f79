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

//! Cron expression handling.
//!
//! Schedules are standard 5-field cron expressions evaluated in UTC.
//! Validation and next-occurrence computation both go through [`parse`]
//! so a task row can never hold an expression the scheduler cannot
//! evaluate later.

use chrono::{DateTime, Utc};
use croner::Cron;

use crate::error::ValidationError;

/// Parses a 5-field cron expression.
pub fn parse(expression: &str) -> Result<Cron, ValidationError> {
    Cron::new(expression)
        .parse()
        .map_err(|e| ValidationError::InvalidCron {
            expression: expression.to_string(),
            reason: e.to_string(),
        })
}

/// Validates a cron expression without keeping the parsed form.
pub fn validate(expression: &str) -> Result<(), ValidationError> {
    parse(expression).map(|_| ())
}

/// Computes the next occurrence strictly after `after`, in UTC.
pub fn next_occurrence(
    expression: &str,
    after: DateTime<Utc>,
) -> Result<DateTime<Utc>, ValidationError> {
    let cron = parse(expression)?;
    cron.find_next_occurrence(&after, false)
        .map_err(|e| ValidationError::InvalidCron {
            expression: expression.to_string(),
            reason: e.to_string(),
        })
}
