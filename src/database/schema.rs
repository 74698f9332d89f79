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

//! Diesel schema definitions.
//!
//! Ids are SQLite rowids; timestamps are naive UTC. Enum-ish columns
//! (`task_type`, `status`) are stored as text and converted at the DAL
//! boundary.

diesel::table! {
    scheduled_tasks (id) {
        id -> BigInt,
        name -> Text,
        task_type -> Text,
        connection_id -> BigInt,
        cron_schedule -> Text,
        is_active -> Bool,
        last_run_at -> Nullable<Timestamp>,
        next_run_at -> Nullable<Timestamp>,
        task_params -> Text,
        description -> Nullable<Text>,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    task_executions (id) {
        id -> BigInt,
        scheduled_task_id -> Nullable<BigInt>,
        task_type -> Text,
        connection_id -> BigInt,
        status -> Text,
        parameters -> Text,
        started_at -> Timestamp,
        completed_at -> Nullable<Timestamp>,
        result -> Nullable<Text>,
        error_message -> Nullable<Text>,
    }
}

diesel::table! {
    queue_items (id) {
        id -> BigInt,
        payload -> Text,
        enqueued_at -> Timestamp,
    }
}

diesel::table! {
    connections (id) {
        id -> BigInt,
        name -> Text,
        secret_path -> Nullable<Text>,
        created_at -> Timestamp,
    }
}

diesel::table! {
    analysis_results (id) {
        id -> BigInt,
        connection_id -> BigInt,
        analysis_type -> Text,
        result -> Text,
        created_at -> Timestamp,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    scheduled_tasks,
    task_executions,
    queue_items,
    connections,
    analysis_results,
);
