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

//! DAL for the connection registry.

use diesel::prelude::*;

use crate::dal::DAL;
use crate::database::schema::connections;
use crate::error::ValidationError;
use crate::models::connection::{Connection, NewConnection};

/// Operations on the `connections` table.
pub struct ConnectionDAL<'a> {
    pub(crate) dal: &'a DAL,
}

impl<'a> ConnectionDAL<'a> {
    /// Registers a target database and returns the stored row.
    pub async fn create(&self, new_connection: NewConnection) -> Result<Connection, ValidationError> {
        let conn = self
            .dal
            .database
            .pool()
            .get()
            .await
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))?;

        let connection: Connection = conn
            .interact(move |conn| {
                diesel::insert_into(connections::table)
                    .values(&new_connection)
                    .get_result(conn)
            })
            .await
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??;

        Ok(connection)
    }

    /// Retrieves a registry row by id.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Connection>, ValidationError> {
        let conn = self
            .dal
            .database
            .pool()
            .get()
            .await
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))?;

        let connection = conn
            .interact(move |conn| connections::table.find(id).first(conn).optional())
            .await
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))??;

        Ok(connection)
    }
}
