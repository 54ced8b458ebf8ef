// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP client for the Neptune control plane.

use std::future::Future;
use std::pin::Pin;
use std::sync::Once;
use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ApiSettings;
use crate::deploy::{DeploymentStatus, StatusSource};

pub const CLI_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const VERSION_HEADER: &str = "X-Neptune-CLI-Version";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

static CRYPTO_INIT: Once = Once::new();

/// Install the ring provider for rustls once per process.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The request never produced a response (refused, reset, timed out).
    #[error("request failed: {0}")]
    Transport(String),
    #[error("not found")]
    NotFound,
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Worth retrying: no response at all, or a 5xx from the gateway.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status >= 500,
            Self::NotFound | Self::Decode(_) => false,
        }
    }
}

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    code: &'a str,
    redirect_uri: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningStatus {
    #[serde(default)]
    pub current: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_ip: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceStatus {
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectResponse {
    pub name: String,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub provisioning_state: Option<String>,
    #[serde(default)]
    pub running_status: RunningStatus,
    #[serde(default)]
    pub resources: Vec<ResourceStatus>,
}

impl ProjectResponse {
    pub fn deployment_status(&self) -> DeploymentStatus {
        DeploymentStatus::parse(self.running_status.current.as_deref())
    }

    /// Public URL once the service has an address.
    pub fn url(&self) -> Option<String> {
        self.running_status.public_ip.as_deref().filter(|ip| !ip.is_empty()).map(|ip| {
            if ip.starts_with("http://") || ip.starts_with("https://") {
                ip.to_owned()
            } else {
                format!("http://{ip}")
            }
        })
    }
}

#[derive(Debug, Deserialize)]
struct LogsResponse {
    #[serde(default)]
    logs: Vec<String>,
}

/// Authenticated client bound to one base URL.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    settings: ApiSettings,
}

impl ApiClient {
    pub fn new(settings: ApiSettings) -> anyhow::Result<Self> {
        ensure_crypto();
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { http, settings })
    }

    pub fn settings(&self) -> &ApiSettings {
        &self.settings
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.settings.base_url)
    }

    fn apply_auth(&self, req: RequestBuilder) -> RequestBuilder {
        let req = req.header(VERSION_HEADER, CLI_VERSION);
        match self.settings.access_token {
            Some(ref token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response, ApiError> {
        let resp = self.apply_auth(req).send().await.map_err(|e| ApiError::Transport(e.to_string()))?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Status { status: status.as_u16(), body });
        }
        Ok(resp)
    }

    async fn json<T: DeserializeOwned>(resp: Response) -> Result<T, ApiError> {
        resp.json().await.map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Trade an authorization code for an access token.
    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<String, ApiError> {
        let req = self.http.post(self.url("/auth/token")).json(&TokenRequest { code, redirect_uri });
        let token: TokenResponse = Self::json(self.send(req).await?).await?;
        if token.access_token.is_empty() {
            return Err(ApiError::Decode("empty access_token".to_owned()));
        }
        debug!(token_type = ?token.token_type, "authorization code exchanged");
        Ok(token.access_token)
    }

    /// Tell the server the current token is no longer in use.
    pub async fn logout(&self) -> Result<(), ApiError> {
        self.send(self.http.post(self.url("/auth/logout"))).await?;
        Ok(())
    }

    /// The authenticated user, as returned by the server.
    pub async fn current_user(&self) -> Result<serde_json::Value, ApiError> {
        Self::json(self.send(self.http.get(self.url("/users/me"))).await?).await
    }

    pub async fn get_project(&self, name: &str) -> Result<ProjectResponse, ApiError> {
        let req = self.http.get(self.url(&format!("/project/{name}")));
        Self::json(self.send(req).await?).await
    }

    pub async fn get_logs(&self, name: &str) -> Result<Vec<String>, ApiError> {
        let req = self.http.get(self.url(&format!("/project/{name}/logs")));
        let logs: LogsResponse = Self::json(self.send(req).await?).await?;
        Ok(logs.logs)
    }
}

impl StatusSource for ApiClient {
    fn status<'a>(
        &'a self,
        project: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<DeploymentStatus, ApiError>> + Send + 'a>> {
        Box::pin(async move { Ok(self.get_project(project).await?.deployment_status()) })
    }

    fn logs<'a>(
        &'a self,
        project: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, ApiError>> + Send + 'a>> {
        Box::pin(self.get_logs(project))
    }
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod tests;
