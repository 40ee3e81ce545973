// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP client for the daemon API.

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// Client errors, carrying the daemon's error taxonomy when available.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("cannot reach daemon: {0}")]
    Unreachable(String),

    #[error("{kind}: {message}")]
    Api { kind: String, message: String },

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ClientError {
    /// Usage-class errors (validation) exit 2; everything else exits 1.
    pub fn is_usage(&self) -> bool {
        matches!(self, ClientError::Api { kind, .. } if kind == "InvalidInput")
    }
}

/// Thin wrapper over reqwest with the daemon's JSON error envelope.
pub struct DaemonClient {
    base: String,
    http: reqwest::Client,
}

impl DaemonClient {
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let response = self
            .http
            .get(format!("{}{}", self.base, path))
            .send()
            .await
            .map_err(|e| ClientError::Unreachable(e.to_string()))?;
        Self::decode(response).await
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<&Value>,
    ) -> Result<T, ClientError> {
        let mut request = self.http.post(format!("{}{}", self.base, path));
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .map_err(|e| ClientError::Unreachable(e.to_string()))?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
        let status = response.status();
        let raw = response
            .bytes()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))?;

        if status.is_success() {
            return serde_json::from_slice(&raw).map_err(|e| ClientError::Decode(e.to_string()));
        }

        // Error envelope: {"error":{"kind","message"}}
        match serde_json::from_slice::<Value>(&raw) {
            Ok(value) => Err(ClientError::Api {
                kind: value["error"]["kind"]
                    .as_str()
                    .unwrap_or("Unknown")
                    .to_string(),
                message: value["error"]["message"]
                    .as_str()
                    .unwrap_or("request failed")
                    .to_string(),
            }),
            Err(_) => Err(ClientError::Api {
                kind: "Unknown".to_string(),
                message: format!("HTTP {status}"),
            }),
        }
    }
}
