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

//! Task handlers, one per task type.
//!
//! Each handler turns a live target session plus the execution's parameter
//! snapshot into a result document. Log analysis and config checks also
//! consult the analysis backend; the other three types are local to the
//! target database.

use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::{json, Value};
use tracing::warn;

use crate::analysis::AnalysisBackend;
use crate::error::WorkerError;
use crate::models::scheduled_task::{TaskParameters, TaskType};
use crate::target::{CustomSqlOutcome, TargetClient};

/// pg_settings categories included in a config check.
const CONFIG_CATEGORIES: &[&str] = &[
    "Resource Usage / Memory",
    "Resource Usage / Disk",
    "Write Ahead Log",
    "Query Planning",
];

/// Slow-query thresholds and limits for the statement-digest queries.
const LOG_MIN_TOTAL_MS: f64 = 1000.0;
const LOG_STATEMENT_LIMIT: i64 = 100;
const QUERY_MIN_TOTAL_MS: f64 = 100.0;
const QUERY_STATEMENT_LIMIT: i64 = 20;

const TABLE_DISCOVERY_LIMIT: i64 = 50;

/// Identity of the target being analyzed, for result documents.
pub struct TargetInfo {
    pub connection_id: i64,
    pub host: String,
    pub database: String,
}

/// Routes one execution to its handler.
pub async fn dispatch(
    task_type: TaskType,
    client: &dyn TargetClient,
    backend: &dyn AnalysisBackend,
    target: &TargetInfo,
    params: &TaskParameters,
) -> Result<Value, WorkerError> {
    match task_type {
        TaskType::LogAnalysis => log_analysis(client, backend, target, params).await,
        TaskType::ConfigCheck => config_check(client, backend, target, params).await,
        TaskType::QueryAnalysis => query_analysis(client, target).await,
        TaskType::CustomSql => custom_sql(client, target, params).await,
        TaskType::TableAnalysis => table_analysis(client, target, params).await,
    }
}

async fn server_version_or_unknown(client: &dyn TargetClient) -> String {
    match client.server_version().await {
        Ok(version) => version,
        Err(e) => {
            warn!("Could not determine server version: {}", e);
            "unknown".to_string()
        }
    }
}

/// Gathers a slow-statement digest (falling back to basic server info when
/// pg_stat_statements is absent) and submits it for analysis.
async fn log_analysis(
    client: &dyn TargetClient,
    backend: &dyn AnalysisBackend,
    target: &TargetInfo,
    params: &TaskParameters,
) -> Result<Value, WorkerError> {
    let logs = match client
        .recent_activity(LOG_MIN_TOTAL_MS, LOG_STATEMENT_LIMIT)
        .await?
    {
        Some(digest) if !digest.trim().is_empty() => digest,
        _ => match client.server_summary().await {
            Ok(summary) => summary,
            Err(e) => {
                warn!("Could not gather server summary: {}", e);
                format!("Connection info: {}/{}", target.host, target.database)
            }
        },
    };
    let logs = if logs.trim().is_empty() {
        "No log data available".to_string()
    } else {
        logs
    };

    let version = server_version_or_unknown(client).await;
    let payload = json!({
        "logs": logs,
        "server_info": {
            "version": version,
            "host": target.host,
            "database": target.database,
        },
        "environment": params.environment,
    });

    Ok(backend.analyze(TaskType::LogAnalysis, payload).await?)
}

/// Reads the memory/disk/WAL/planner settings and submits them for
/// analysis; the verdict is enriched with the full setting detail.
async fn config_check(
    client: &dyn TargetClient,
    backend: &dyn AnalysisBackend,
    target: &TargetInfo,
    params: &TaskParameters,
) -> Result<Value, WorkerError> {
    let config_details = client.settings(CONFIG_CATEGORIES).await?;

    // The backend sees plain name -> value; the stored result keeps
    // the full detail alongside the verdict.
    let mut flat = serde_json::Map::new();
    if let Some(details) = config_details.as_object() {
        for (name, detail) in details {
            flat.insert(
                name.clone(),
                detail.get("value").cloned().unwrap_or(Value::Null),
            );
        }
    }

    let version = server_version_or_unknown(client).await;
    let payload = json!({
        "config": flat,
        "server_info": {
            "version": version,
            "host": target.host,
            "database": target.database,
        },
        "environment": params.environment,
    });

    let mut verdict = backend.analyze(TaskType::ConfigCheck, payload).await?;
    match verdict.as_object_mut() {
        Some(object) => {
            object.insert("config_details".to_string(), config_details);
            Ok(verdict)
        }
        None => Ok(json!({ "verdict": verdict, "config_details": config_details })),
    }
}

/// Summarizes the most expensive statements; degrades to a note when
/// pg_stat_statements is unavailable.
async fn query_analysis(
    client: &dyn TargetClient,
    target: &TargetInfo,
) -> Result<Value, WorkerError> {
    match client
        .statement_stats(QUERY_MIN_TOTAL_MS, QUERY_STATEMENT_LIMIT)
        .await?
    {
        Some(queries) => Ok(json!({
            "message": "Query analysis completed",
            "connection_id": target.connection_id,
            "timestamp": Utc::now().to_rfc3339(),
            "analyzed_queries": queries.len(),
            "queries": queries,
        })),
        None => Ok(json!({
            "message": "pg_stat_statements unavailable, reporting basic information only",
            "connection_id": target.connection_id,
            "timestamp": Utc::now().to_rfc3339(),
            "note": "Install the pg_stat_statements extension for full query analysis",
        })),
    }
}

/// Runs one operator-supplied statement under the configured timeout.
async fn custom_sql(
    client: &dyn TargetClient,
    target: &TargetInfo,
    params: &TaskParameters,
) -> Result<Value, WorkerError> {
    let sql = params
        .custom_sql
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .ok_or(WorkerError::MissingParameter("custom_sql"))?;
    let timeout = Duration::from_secs(params.query_timeout);

    let started = Instant::now();
    let outcome = client.execute_sql(sql, timeout).await?;
    let execution_time = started.elapsed().as_secs_f64();

    let mut object = serde_json::Map::new();
    object.insert(
        "message".to_string(),
        json!("Custom SQL statement executed successfully"),
    );
    object.insert("connection_id".to_string(), json!(target.connection_id));
    object.insert("timestamp".to_string(), json!(Utc::now().to_rfc3339()));
    object.insert("sql".to_string(), json!(sql));
    object.insert(
        "execution_time_seconds".to_string(),
        json!(execution_time),
    );

    match outcome {
        CustomSqlOutcome::Rows { columns, rows } => {
            object.insert("query_type".to_string(), json!("SELECT"));
            object.insert("rows_returned".to_string(), json!(rows.len()));
            object.insert("columns".to_string(), json!(columns));
            object.insert("data".to_string(), Value::Array(rows));
        }
        CustomSqlOutcome::Command { rows_affected } => {
            object.insert("query_type".to_string(), json!("DML/DDL"));
            object.insert("rows_affected".to_string(), json!(rows_affected));
            object.insert("operation".to_string(), json!("completed"));
        }
    }

    Ok(Value::Object(object))
}

/// Analyzes the requested tables, or up to 50 auto-discovered user tables.
/// Per-table failures are recorded in place rather than failing the run.
async fn table_analysis(
    client: &dyn TargetClient,
    target: &TargetInfo,
    params: &TaskParameters,
) -> Result<Value, WorkerError> {
    let tables = match &params.target_tables {
        Some(tables) if !tables.is_empty() => tables.clone(),
        _ => client.list_tables(TABLE_DISCOVERY_LIMIT).await?,
    };

    let mut analyses = Vec::with_capacity(tables.len());
    for table in &tables {
        let analysis = match client.analyze_table(table, params.detailed_analysis).await {
            Ok(analysis) => analysis,
            Err(e) => json!({ "table": table, "error": e.to_string() }),
        };
        analyses.push(analysis);
    }

    Ok(json!({
        "message": "Table analysis completed",
        "connection_id": target.connection_id,
        "timestamp": Utc::now().to_rfc3339(),
        "analyzed_tables_count": analyses.len(),
        "tables": analyses,
        "detailed_analysis": params.detailed_analysis,
    }))
}
