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

//! Worker behavior: dispatch, completion reporting, retry policy.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use pgsentinel::models::{NewTaskExecution, TaskStatus};
use pgsentinel::secrets::StaticSecretStore;

use common::MockAnalysisBackend;

/// Creates the pending execution row backing a hand-built queue item.
async fn pending_execution(dal: &pgsentinel::DAL, task_type: &str, connection_id: i64) -> i64 {
    dal.task_execution()
        .create(NewTaskExecution {
            scheduled_task_id: None,
            task_type: task_type.to_string(),
            connection_id,
            status: TaskStatus::Pending.as_str().to_string(),
            parameters: "{}".to_string(),
            started_at: Utc::now().naive_utc(),
        })
        .await
        .expect("execution")
        .id
}

#[tokio::test]
async fn config_check_completes_and_records_history() {
    let h = common::harness().await;
    let connection = common::register_connection(&h.dal).await;
    let backend = Arc::new(MockAnalysisBackend::healthy());
    let worker = common::worker(&h, common::secret_store_for(&connection), backend.clone());

    let execution_id = pending_execution(&h.dal, "config_check", connection.id).await;
    worker
        .process_item(common::queue_item(execution_id, "config_check", connection.id))
        .await
        .unwrap();

    let execution = h
        .dal
        .task_execution()
        .get_by_id(execution_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(execution.status().unwrap(), TaskStatus::Completed);
    assert!(execution.completed_at.is_some());

    // The stored verdict carries the full setting detail alongside.
    let result = execution.result_value().unwrap().unwrap();
    assert_eq!(result["overall_score"], 85);
    assert!(result["config_details"]["shared_buffers"].is_object());

    // One analysis invocation, one history row.
    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    let history = h
        .dal
        .analysis_result()
        .list_recent(connection.id, 10)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].analysis_type, "config_check");
}

#[tokio::test]
async fn custom_sql_reports_select_shape_without_touching_the_backend() {
    let h = common::harness().await;
    let connection = common::register_connection(&h.dal).await;
    let backend = Arc::new(MockAnalysisBackend::healthy());
    let worker = common::worker(&h, common::secret_store_for(&connection), backend.clone());

    let execution_id = pending_execution(&h.dal, "custom_sql", connection.id).await;
    let mut item = common::queue_item(execution_id, "custom_sql", connection.id);
    item.parameters = json!({"custom_sql": "SELECT 1 AS value"});

    worker.process_item(item).await.unwrap();

    let execution = h
        .dal
        .task_execution()
        .get_by_id(execution_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(execution.status().unwrap(), TaskStatus::Completed);
    let result = execution.result_value().unwrap().unwrap();
    assert_eq!(result["query_type"], "SELECT");
    assert_eq!(result["rows_returned"], 1);
    assert_eq!(result["columns"], json!(["value"]));
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_custom_sql_fails_without_retry() {
    let h = common::harness().await;
    let connection = common::register_connection(&h.dal).await;
    let worker = common::worker(
        &h,
        common::secret_store_for(&connection),
        Arc::new(MockAnalysisBackend::healthy()),
    );

    let execution_id = pending_execution(&h.dal, "custom_sql", connection.id).await;
    worker
        .process_item(common::queue_item(execution_id, "custom_sql", connection.id))
        .await
        .unwrap();

    let execution = h
        .dal
        .task_execution()
        .get_by_id(execution_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(execution.status().unwrap(), TaskStatus::Failed);
    assert!(execution
        .error_message
        .as_deref()
        .unwrap_or_default()
        .contains("custom_sql"));
    assert_eq!(h.queue.len().await.unwrap(), 0);
}

#[tokio::test]
async fn unknown_task_type_fails_immediately() {
    let h = common::harness().await;
    let connection = common::register_connection(&h.dal).await;
    let worker = common::worker(
        &h,
        common::secret_store_for(&connection),
        Arc::new(MockAnalysisBackend::healthy()),
    );

    let execution_id = pending_execution(&h.dal, "legacy_check", connection.id).await;
    worker
        .process_item(common::queue_item(execution_id, "legacy_check", connection.id))
        .await
        .unwrap();

    let execution = h
        .dal
        .task_execution()
        .get_by_id(execution_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(execution.status().unwrap(), TaskStatus::Failed);
    assert!(execution
        .error_message
        .as_deref()
        .unwrap_or_default()
        .contains("not implemented"));
    assert_eq!(h.queue.len().await.unwrap(), 0);
}

#[tokio::test]
async fn transient_failures_requeue_with_incremented_retry_count() {
    let h = common::harness().await;
    let connection = common::register_connection(&h.dal).await;
    let worker = common::worker(
        &h,
        common::secret_store_for(&connection),
        Arc::new(MockAnalysisBackend::always_failing()),
    );

    let execution_id = pending_execution(&h.dal, "log_analysis", connection.id).await;
    worker
        .process_item(common::queue_item(execution_id, "log_analysis", connection.id))
        .await
        .unwrap();

    // First failure: re-queued with retry_count 1 and everything else intact.
    let queued = h.queue.peek(0, 10).await.unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].retry_count, 1);
    assert_eq!(queued[0].execution_id, execution_id);
    assert_eq!(queued[0].max_retries, 3);

    // Drive the item through its remaining budget.
    for expected_retry in 2..=3u32 {
        let item = h.queue.try_pop().await.unwrap().unwrap();
        worker.process_item(item).await.unwrap();
        let queued = h.queue.peek(0, 10).await.unwrap();
        assert_eq!(queued[0].retry_count, expected_retry);
    }

    // Budget exhausted: fourth attempt fails the execution for good.
    let item = h.queue.try_pop().await.unwrap().unwrap();
    worker.process_item(item).await.unwrap();

    let execution = h
        .dal
        .task_execution()
        .get_by_id(execution_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(execution.status().unwrap(), TaskStatus::Failed);
    assert_eq!(h.queue.len().await.unwrap(), 0);

    // Exactly one execution row ever existed for this item.
    assert!(h
        .dal
        .task_execution()
        .get_by_id(execution_id + 1)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn retry_then_success_completes_the_original_execution() {
    let h = common::harness().await;
    let connection = common::register_connection(&h.dal).await;
    let backend = Arc::new(MockAnalysisBackend::failing(2));
    let worker = common::worker(&h, common::secret_store_for(&connection), backend.clone());

    let execution_id = pending_execution(&h.dal, "log_analysis", connection.id).await;
    let mut item = common::queue_item(execution_id, "log_analysis", connection.id);
    for _ in 0..3 {
        worker.process_item(item).await.unwrap();
        match h.queue.try_pop().await.unwrap() {
            Some(requeued) => item = requeued,
            None => break,
        }
    }

    let execution = h
        .dal
        .task_execution()
        .get_by_id(execution_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(execution.status().unwrap(), TaskStatus::Completed);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    assert_eq!(h.queue.len().await.unwrap(), 0);
}

#[tokio::test]
async fn missing_credentials_are_treated_as_transient() {
    let h = common::harness().await;
    let connection = common::register_connection(&h.dal).await;
    // A reachable store that simply has nothing at the resolved path.
    let empty_store = Arc::new(StaticSecretStore::new());
    let worker = common::worker(&h, empty_store, Arc::new(MockAnalysisBackend::healthy()));

    let execution_id = pending_execution(&h.dal, "config_check", connection.id).await;
    worker
        .process_item(common::queue_item(execution_id, "config_check", connection.id))
        .await
        .unwrap();

    let queued = h.queue.peek(0, 10).await.unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].retry_count, 1);

    // The execution is still owned by the item and not yet settled.
    let execution = h
        .dal
        .task_execution()
        .get_by_id(execution_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(execution.status().unwrap(), TaskStatus::Running);
}

#[tokio::test]
async fn unregistered_connection_fails_without_retry() {
    let h = common::harness().await;
    let connection = common::register_connection(&h.dal).await;
    let worker = common::worker(
        &h,
        common::secret_store_for(&connection),
        Arc::new(MockAnalysisBackend::healthy()),
    );

    let missing_connection_id = connection.id + 100;
    let execution_id = pending_execution(&h.dal, "config_check", missing_connection_id).await;
    worker
        .process_item(common::queue_item(
            execution_id,
            "config_check",
            missing_connection_id,
        ))
        .await
        .unwrap();

    let execution = h
        .dal
        .task_execution()
        .get_by_id(execution_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(execution.status().unwrap(), TaskStatus::Failed);
    assert_eq!(h.queue.len().await.unwrap(), 0);
}

#[tokio::test]
async fn table_analysis_covers_requested_tables() {
    let h = common::harness().await;
    let connection = common::register_connection(&h.dal).await;
    let worker = common::worker(
        &h,
        common::secret_store_for(&connection),
        Arc::new(MockAnalysisBackend::healthy()),
    );

    let execution_id = pending_execution(&h.dal, "table_analysis", connection.id).await;
    let mut item = common::queue_item(execution_id, "table_analysis", connection.id);
    item.parameters = json!({"target_tables": ["public.orders"], "detailed_analysis": true});

    worker.process_item(item).await.unwrap();

    let execution = h
        .dal
        .task_execution()
        .get_by_id(execution_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(execution.status().unwrap(), TaskStatus::Completed);
    let result = execution.result_value().unwrap().unwrap();
    assert_eq!(result["analyzed_tables_count"], 1);
    assert_eq!(result["tables"][0]["table"], "public.orders");
    assert!(result["tables"][0]["columns"].is_array());
    assert_eq!(result["detailed_analysis"], true);
}
