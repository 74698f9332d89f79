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

//! Analysis backend seam.
//!
//! Log-analysis and config-check tasks hand their evidence payload to an
//! external analysis service and store whatever verdict document comes
//! back. The service is opaque to this crate; failures are transient from
//! the worker's point of view.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::AnalysisError;
use crate::models::scheduled_task::TaskType;

/// Produces a verdict document for an evidence payload.
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    async fn analyze(&self, task_type: TaskType, payload: Value) -> Result<Value, AnalysisError>;
}

/// HTTP client for the analysis service.
pub struct HttpAnalysisBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAnalysisBackend {
    /// Creates a client for the service at `base_url`. The timeout bounds
    /// one full analysis round trip; the service may take minutes on large
    /// payloads, so the default deployment uses 300 seconds.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AnalysisError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl AnalysisBackend for HttpAnalysisBackend {
    async fn analyze(&self, task_type: TaskType, payload: Value) -> Result<Value, AnalysisError> {
        let endpoint = match task_type {
            TaskType::ConfigCheck => "config",
            _ => "logs",
        };
        let url = format!("{}/api/v1/{}/analyze", self.base_url, endpoint);
        debug!(url = %url, task_type = %task_type, "Submitting analysis request");

        let response = self.client.post(&url).json(&payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AnalysisError::Status(status.as_u16()));
        }

        response
            .json()
            .await
            .map_err(|e| AnalysisError::Malformed(e.to_string()))
    }
}
