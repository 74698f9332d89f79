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

//! DAL for the denormalized analysis result history.
//!
//! Workers write here best-effort after completing an execution; the
//! authoritative result lives on the execution row.

use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;

use crate::dal::DAL;
use crate::database::schema::analysis_results;
use crate::error::ValidationError;

/// A stored analysis result row.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = analysis_results)]
pub struct AnalysisResultRow {
    pub id: i64,
    pub connection_id: i64,
    pub analysis_type: String,
    pub result: String,
    pub created_at: NaiveDateTime,
}

/// Operations on the `analysis_results` table.
pub struct AnalysisResultDAL<'a> {
    pub(crate) dal: &'a DAL,
}

impl<'a> AnalysisResultDAL<'a> {
    /// Appends one result document for a connection.
    pub async fn record(
        &self,
        connection_id: i64,
        analysis_type: &str,
        result: &serde_json::Value,
    ) -> Result<(), ValidationError> {
        let analysis_type = analysis_type.to_string();
        let result_text = serde_json::to_string(result)?;
        let now = Utc::now().naive_utc();
        let conn = self
            .dal
            .database
            .pool()
            .get()
            .await
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))?;

        conn.interact(move |conn| {
            diesel::insert_into(analysis_results::table)
                .values((
                    analysis_results::connection_id.eq(connection_id),
                    analysis_results::analysis_type.eq(analysis_type),
                    analysis_results::result.eq(result_text),
                    analysis_results::created_at.eq(now),
                ))
                .execute(conn)
        })
        .await
        .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??;

        Ok(())
    }

    /// Most recent results for a connection, newest first.
    pub async fn list_recent(
        &self,
        connection_id: i64,
        limit: i64,
    ) -> Result<Vec<AnalysisResultRow>, ValidationError> {
        let conn = self
            .dal
            .database
            .pool()
            .get()
            .await
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))?;

        let rows = conn
            .interact(move |conn| {
                analysis_results::table
                    .filter(analysis_results::connection_id.eq(connection_id))
                    .order(analysis_results::created_at.desc())
                    .limit(limit)
                    .load(conn)
            })
            .await
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??;

        Ok(rows)
    }
}
