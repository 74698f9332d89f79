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

//! Connection registry model.
//!
//! Rows name a target database and where its credentials live; the
//! credentials themselves stay in the secret store.

use chrono::NaiveDateTime;
use diesel::prelude::*;

use crate::database::schema::connections;

/// A registered target database.
#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = connections)]
pub struct Connection {
    pub id: i64,
    pub name: String,
    /// Secret store path; `None` means the conventional default path
    /// `database/connections/{id}`.
    pub secret_path: Option<String>,
    pub created_at: NaiveDateTime,
}

impl Connection {
    /// The secret store path credentials are read from.
    pub fn resolved_secret_path(&self) -> String {
        match &self.secret_path {
            Some(path) => path.clone(),
            None => format!("database/connections/{}", self.id),
        }
    }
}

/// Insertable form of a connection registry row.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = connections)]
pub struct NewConnection {
    pub name: String,
    pub secret_path: Option<String>,
    pub created_at: NaiveDateTime,
}
