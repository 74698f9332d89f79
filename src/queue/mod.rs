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

//! Durable work queue.
//!
//! A FIFO list backed by the `queue_items` table; rowid order is dispatch
//! order. SQLite has no notification mechanism, so [`TaskQueue::blocking_pop`]
//! polls at a configurable interval up to its timeout. Claiming an item
//! removes it inside a transaction, so two workers can never pop the same
//! row. The `priority` field inside items is advisory metadata only.

use std::time::Duration;

use chrono::Utc;
use diesel::prelude::*;
use tokio::time::Instant;
use tracing::warn;

use crate::database::schema::queue_items;
use crate::database::Database;
use crate::error::QueueError;
use crate::models::queue_item::TaskQueueItem;

/// Handle to the durable task queue.
#[derive(Debug, Clone)]
pub struct TaskQueue {
    database: Database,
    poll_interval: Duration,
}

impl TaskQueue {
    pub fn new(database: Database) -> Self {
        Self {
            database,
            poll_interval: Duration::from_millis(250),
        }
    }

    /// Overrides the interval between polls inside a blocking pop.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Appends an item to the tail of the queue.
    pub async fn push(&self, item: &TaskQueueItem) -> Result<(), QueueError> {
        let payload = serde_json::to_string(item)?;
        let now = Utc::now().naive_utc();
        let conn = self
            .database
            .pool()
            .get()
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))?;

        conn.interact(move |conn| {
            diesel::insert_into(queue_items::table)
                .values((
                    queue_items::payload.eq(payload),
                    queue_items::enqueued_at.eq(now),
                ))
                .execute(conn)
        })
        .await
        .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        Ok(())
    }

    /// Removes and returns the head item, or `None` when the queue is empty.
    ///
    /// A payload that fails to deserialize is dropped with a warning; its
    /// execution row stays `pending` and is recoverable through the
    /// pending-execution scan.
    pub async fn try_pop(&self) -> Result<Option<TaskQueueItem>, QueueError> {
        let conn = self
            .database
            .pool()
            .get()
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))?;

        let head: Option<(i64, String)> = conn
            .interact(move |conn| {
                conn.transaction::<_, diesel::result::Error, _>(|conn| {
                    let head = queue_items::table
                        .select((queue_items::id, queue_items::payload))
                        .order(queue_items::id.asc())
                        .first::<(i64, String)>(conn)
                        .optional()?;
                    if let Some((id, _)) = &head {
                        diesel::delete(queue_items::table.find(*id)).execute(conn)?;
                    }
                    Ok(head)
                })
            })
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        match head {
            Some((id, payload)) => match serde_json::from_str(&payload) {
                Ok(item) => Ok(Some(item)),
                Err(e) => {
                    warn!(queue_item_id = id, "Dropping malformed queue payload: {}", e);
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    /// Removes and returns the head item, waiting up to `timeout` for one
    /// to appear. Returns `None` on timeout.
    pub async fn blocking_pop(
        &self,
        timeout: Duration,
    ) -> Result<Option<TaskQueueItem>, QueueError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(item) = self.try_pop().await? {
                return Ok(Some(item));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let remaining = deadline - now;
            tokio::time::sleep(remaining.min(self.poll_interval)).await;
        }
    }

    /// Number of items currently queued.
    pub async fn len(&self) -> Result<i64, QueueError> {
        let conn = self
            .database
            .pool()
            .get()
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))?;

        let count = conn
            .interact(move |conn| queue_items::table.count().get_result(conn))
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        Ok(count)
    }

    /// Reads a window of queued items without removing them, head first.
    /// Malformed payloads are skipped.
    pub async fn peek(&self, offset: i64, count: i64) -> Result<Vec<TaskQueueItem>, QueueError> {
        let conn = self
            .database
            .pool()
            .get()
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))?;

        let payloads: Vec<String> = conn
            .interact(move |conn| {
                queue_items::table
                    .select(queue_items::payload)
                    .order(queue_items::id.asc())
                    .offset(offset)
                    .limit(count)
                    .load(conn)
            })
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        Ok(payloads
            .iter()
            .filter_map(|p| serde_json::from_str(p).ok())
            .collect())
    }

    /// Removes all queued items belonging to one scheduled task, leaving
    /// everything else in place and in order. Returns the number removed.
    pub async fn remove_for_task(&self, task_id: i64) -> Result<usize, QueueError> {
        let conn = self
            .database
            .pool()
            .get()
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))?;

        let removed = conn
            .interact(move |conn| {
                conn.transaction::<_, diesel::result::Error, _>(|conn| {
                    let rows: Vec<(i64, String)> = queue_items::table
                        .select((queue_items::id, queue_items::payload))
                        .order(queue_items::id.asc())
                        .load(conn)?;
                    let doomed: Vec<i64> = rows
                        .iter()
                        .filter(|(_, payload)| {
                            serde_json::from_str::<TaskQueueItem>(payload)
                                .map(|item| item.scheduled_task_id == Some(task_id))
                                .unwrap_or(false)
                        })
                        .map(|(id, _)| *id)
                        .collect();
                    let removed = doomed.len();
                    if !doomed.is_empty() {
                        diesel::delete(queue_items::table.filter(queue_items::id.eq_any(doomed)))
                            .execute(conn)?;
                    }
                    Ok(removed)
                })
            })
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        Ok(removed)
    }
}
