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

//! Manager lifecycle: fail-closed startup, end-to-end dispatch, shutdown.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serial_test::serial;

use pgsentinel::error::SecretStoreError;
use pgsentinel::models::{TaskDefinition, TaskStatus, TaskType};
use pgsentinel::secrets::{ConnectionSecret, SecretStore};
use pgsentinel::{Database, SchedulerConfig, SchedulerManager};

use common::{MockAnalysisBackend, MockTargetConnector};

fn fast_config() -> SchedulerConfig {
    SchedulerConfig::builder()
        .scheduler_poll_interval(Duration::from_millis(20))
        .scheduler_error_backoff(Duration::from_millis(20))
        .worker_count(2)
        .queue_pop_timeout(Duration::from_millis(50))
        .queue_poll_interval(Duration::from_millis(5))
        .retry_backoff_base(Duration::from_millis(5))
        .retry_backoff_cap(Duration::from_millis(20))
        .worker_error_pause(Duration::from_millis(5))
        .build()
}

async fn manager_with(
    secrets: Arc<dyn SecretStore>,
) -> (tempfile::TempDir, SchedulerManager, pgsentinel::DAL) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("pgsentinel.db");
    let database = Database::new(path.to_str().expect("utf8 path")).expect("database");
    let dal = pgsentinel::DAL::new(database.clone());
    let manager = SchedulerManager::new(
        database,
        fast_config(),
        secrets,
        Arc::new(MockAnalysisBackend::healthy()),
        Arc::new(MockTargetConnector),
    );
    (dir, manager, dal)
}

/// A secret store whose ping always fails.
struct UnreachableSecretStore;

#[async_trait]
impl SecretStore for UnreachableSecretStore {
    async fn ping(&self) -> Result<(), SecretStoreError> {
        Err(SecretStoreError::Unauthorized)
    }

    async fn get_secret(
        &self,
        _path: &str,
    ) -> Result<Option<ConnectionSecret>, SecretStoreError> {
        Err(SecretStoreError::Unauthorized)
    }
}

#[tokio::test]
#[serial]
async fn initialize_fails_closed_when_secret_store_is_unreachable() {
    let (_dir, manager, _dal) = manager_with(Arc::new(UnreachableSecretStore)).await;
    assert!(manager.initialize().await.is_err());
    assert!(!manager.is_running());
}

#[tokio::test]
#[serial]
async fn end_to_end_manual_trigger_completes_under_running_manager() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("pgsentinel.db");
    let database = Database::new(path.to_str().expect("utf8 path")).expect("database");
    let dal = pgsentinel::DAL::new(database.clone());

    // Migrations must run before we can register the connection, so
    // initialize first, then seed, then start.
    let manager = SchedulerManager::new(
        database,
        fast_config(),
        Arc::new(
            pgsentinel::StaticSecretStore::new()
                .with_secret("database/connections/1", common::test_secret()),
        ),
        Arc::new(MockAnalysisBackend::healthy()),
        Arc::new(MockTargetConnector),
    );
    manager.initialize().await.unwrap();
    let connection = common::register_connection(&dal).await;
    assert_eq!(connection.id, 1);

    manager.start().await;
    assert!(manager.is_running());

    // Far-future schedule; only the manual trigger should fire.
    let task = manager
        .scheduler()
        .create_task(TaskDefinition::new(
            "on-demand",
            TaskType::ConfigCheck,
            connection.id,
            "0 2 1 1 *",
        ))
        .await
        .unwrap();
    let execution_id = manager
        .scheduler()
        .queue_task_now(task.id, Utc::now())
        .await
        .unwrap();

    // Wait for a worker to claim and settle the execution.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let execution = dal
            .task_execution()
            .get_by_id(execution_id)
            .await
            .unwrap()
            .unwrap();
        if execution.status().unwrap().is_terminal() {
            assert_eq!(execution.status().unwrap(), TaskStatus::Completed);
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "execution did not settle in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let status = manager.status().await.unwrap();
    assert!(status.running);
    assert_eq!(status.queue_length, 0);
    assert!(status.pending_items.is_empty());

    manager.stop().await;
    assert!(!manager.is_running());
}

#[tokio::test]
#[serial]
async fn stop_is_idempotent_and_safe_before_start() {
    let (_dir, manager, _dal) = manager_with(Arc::new(pgsentinel::StaticSecretStore::new())).await;
    manager.initialize().await.unwrap();

    // Stop before start is a no-op.
    manager.stop().await;
    assert!(!manager.is_running());

    manager.start().await;
    assert!(manager.is_running());
    // Second start while running is a no-op.
    manager.start().await;

    manager.stop().await;
    manager.stop().await;
    assert!(!manager.is_running());
}

#[tokio::test]
#[serial]
async fn status_reports_queue_sample_when_no_workers_consume() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("pgsentinel.db");
    let database = Database::new(path.to_str().expect("utf8 path")).expect("database");

    let config = SchedulerConfig::builder().worker_count(0).build();
    let manager = SchedulerManager::new(
        database,
        config,
        Arc::new(pgsentinel::StaticSecretStore::new()),
        Arc::new(MockAnalysisBackend::healthy()),
        Arc::new(MockTargetConnector),
    );
    manager.initialize().await.unwrap();

    let task = manager
        .scheduler()
        .create_task(TaskDefinition::new(
            "queued-only",
            TaskType::QueryAnalysis,
            1,
            "0 2 1 1 *",
        ))
        .await
        .unwrap();
    manager
        .scheduler()
        .queue_task_now(task.id, Utc::now())
        .await
        .unwrap();
    manager
        .scheduler()
        .queue_task_now(task.id, Utc::now())
        .await
        .unwrap();

    let status = manager.status().await.unwrap();
    assert!(!status.running);
    assert_eq!(status.queue_length, 2);
    assert_eq!(status.pending_items.len(), 2);
    assert_eq!(status.pending_items[0].scheduled_task_id, Some(task.id));
    assert!(status.running_executions.is_empty());
}
