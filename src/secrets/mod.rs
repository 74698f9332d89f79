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

//! Secret store seam.
//!
//! Workers resolve target database credentials through [`SecretStore`].
//! The production implementation is a Vault KV v2 client; tests substitute
//! an in-memory map. Credentials are read-only from this crate's point of
//! view.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SecretStoreError;

/// Credentials for one target database, as stored in the secret store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionSecret {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    #[serde(default = "default_ssl_mode")]
    pub ssl_mode: String,
}

fn default_port() -> u16 {
    5432
}

fn default_ssl_mode() -> String {
    "prefer".to_string()
}

/// Read access to stored connection credentials.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Verifies the store is reachable and our credentials are accepted.
    /// Called once at manager startup; failure aborts startup.
    async fn ping(&self) -> Result<(), SecretStoreError>;

    /// Reads the secret at `path`. `Ok(None)` means the path holds nothing.
    async fn get_secret(&self, path: &str)
        -> Result<Option<ConnectionSecret>, SecretStoreError>;
}

/// Vault KV v2 client over HTTP.
pub struct VaultSecretStore {
    client: reqwest::Client,
    address: String,
    token: String,
}

impl VaultSecretStore {
    /// Creates a client for the given Vault address and token.
    pub fn new(address: impl Into<String>, token: impl Into<String>) -> Result<Self, SecretStoreError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            address: address.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    /// Creates a client from `VAULT_ADDR` (default `http://localhost:8200`)
    /// and `VAULT_TOKEN` (required).
    pub fn from_env() -> Result<Self, SecretStoreError> {
        dotenvy::dotenv().ok();
        let address =
            std::env::var("VAULT_ADDR").unwrap_or_else(|_| "http://localhost:8200".to_string());
        let token = std::env::var("VAULT_TOKEN").map_err(|_| SecretStoreError::MissingToken)?;
        Self::new(address, token)
    }
}

#[async_trait]
impl SecretStore for VaultSecretStore {
    async fn ping(&self) -> Result<(), SecretStoreError> {
        let url = format!("{}/v1/auth/token/lookup-self", self.address);
        let response = self
            .client
            .get(&url)
            .header("X-Vault-Token", &self.token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SecretStoreError::Unauthorized);
        }
        Ok(())
    }

    async fn get_secret(
        &self,
        path: &str,
    ) -> Result<Option<ConnectionSecret>, SecretStoreError> {
        debug!(path = %path, "Reading secret");
        let url = format!("{}/v1/secret/data/{}", self.address, path);
        let response = self
            .client
            .get(&url)
            .header("X-Vault-Token", &self.token)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if response.status() == reqwest::StatusCode::FORBIDDEN {
            return Err(SecretStoreError::Unauthorized);
        }

        let body: serde_json::Value = response
            .error_for_status()?
            .json()
            .await
            .map_err(|e| SecretStoreError::Malformed(e.to_string()))?;

        // KV v2 nests the payload under data.data.
        let data = body
            .get("data")
            .and_then(|d| d.get("data"))
            .cloned()
            .ok_or_else(|| SecretStoreError::Malformed("missing data.data".to_string()))?;

        let secret = serde_json::from_value(data)
            .map_err(|e| SecretStoreError::Malformed(e.to_string()))?;
        Ok(Some(secret))
    }
}

/// In-memory store for tests and local development.
#[derive(Debug, Default)]
pub struct StaticSecretStore {
    secrets: HashMap<String, ConnectionSecret>,
}

impl StaticSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, path: impl Into<String>, secret: ConnectionSecret) -> Self {
        self.secrets.insert(path.into(), secret);
        self
    }
}

#[async_trait]
impl SecretStore for StaticSecretStore {
    async fn ping(&self) -> Result<(), SecretStoreError> {
        Ok(())
    }

    async fn get_secret(
        &self,
        path: &str,
    ) -> Result<Option<ConnectionSecret>, SecretStoreError> {
        Ok(self.secrets.get(path).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_defaults_apply() {
        let secret: ConnectionSecret = serde_json::from_str(
            r#"{"host":"db1","database":"app","username":"reviewer","password":"s3cr3t"}"#,
        )
        .unwrap();
        assert_eq!(secret.port, 5432);
        assert_eq!(secret.ssl_mode, "prefer");
    }

    #[tokio::test]
    async fn static_store_resolves_known_paths_only() {
        let secret = ConnectionSecret {
            host: "db1".into(),
            port: 5432,
            database: "app".into(),
            username: "reviewer".into(),
            password: "s3cr3t".into(),
            ssl_mode: "prefer".into(),
        };
        let store = StaticSecretStore::new().with_secret("database/connections/1", secret);
        assert!(store
            .get_secret("database/connections/1")
            .await
            .unwrap()
            .is_some());
        assert!(store
            .get_secret("database/connections/2")
            .await
            .unwrap()
            .is_none());
    }
}
