// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: a mock control plane, a scripted browser,
//! and assertion helpers.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::api::{ensure_crypto, VERSION_HEADER};
use crate::auth::browser::Browser;

/// Assert that an expression is `Err` and its message contains a substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}

/// Plain HTTP client for poking local servers in tests.
pub fn http_client() -> anyhow::Result<reqwest::Client> {
    ensure_crypto();
    Ok(reqwest::Client::builder().timeout(Duration::from_secs(10)).build()?)
}

/// Assert nothing accepts connections on `addr` any more.
pub async fn assert_port_closed(addr: SocketAddr) {
    let connected = tokio::net::TcpStream::connect(addr).await.is_ok();
    assert!(!connected, "listener on {addr} still accepts connections");
}

/// Canned control-plane behavior.
#[derive(Debug, Clone)]
pub struct MockApiConfig {
    pub project: String,
    /// `running_status.current` per poll; the last one repeats. A numeric
    /// entry answers with that HTTP status instead.
    pub statuses: Vec<String>,
    pub logs: Vec<String>,
    /// The only authorization code the token endpoint accepts.
    pub auth_code: String,
    /// Token issued on exchange, and the only bearer accepted afterwards.
    pub access_token: String,
    pub public_ip: Option<String>,
}

impl Default for MockApiConfig {
    fn default() -> Self {
        Self {
            project: "demo".to_owned(),
            statuses: vec!["running".to_owned()],
            logs: vec!["listening on :8000".to_owned()],
            auth_code: "good-code".to_owned(),
            access_token: "tok-from-mock".to_owned(),
            public_ip: Some("203.0.113.7".to_owned()),
        }
    }
}

/// Request counters and captured headers.
#[derive(Debug, Default)]
pub struct MockRecord {
    pub token_exchanges: AtomicU32,
    pub logouts: AtomicU32,
    pub project_calls: AtomicU32,
    pub log_calls: AtomicU32,
    pub redirect_uris: Mutex<Vec<String>>,
    pub authorizations: Mutex<Vec<Option<String>>>,
    pub versions: Mutex<Vec<Option<String>>>,
}

impl MockRecord {
    pub fn count(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }
}

struct MockState {
    config: MockApiConfig,
    statuses: Mutex<VecDeque<String>>,
    record: Arc<MockRecord>,
}

impl MockState {
    fn observe(&self, headers: &HeaderMap) -> bool {
        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_owned);
        let auth = header("authorization");
        self.record.versions.lock().push(header(VERSION_HEADER));
        self.record.authorizations.lock().push(auth.clone());
        auth.as_deref() == Some(format!("Bearer {}", self.config.access_token).as_str())
    }

    fn next_status(&self) -> String {
        let mut statuses = self.statuses.lock();
        if statuses.len() > 1 {
            statuses.pop_front().unwrap_or_default()
        } else {
            statuses.front().cloned().unwrap_or_default()
        }
    }
}

/// In-process Neptune API on `127.0.0.1:<ephemeral>`, served under `/v1`.
pub struct MockApi {
    addr: SocketAddr,
    record: Arc<MockRecord>,
    shutdown: CancellationToken,
}

impl MockApi {
    pub async fn start(config: MockApiConfig) -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let record = Arc::new(MockRecord::default());
        let state = Arc::new(MockState {
            statuses: Mutex::new(config.statuses.iter().cloned().collect()),
            config,
            record: Arc::clone(&record),
        });

        let router = Router::new()
            .route("/v1/auth/token", post(mock_token))
            .route("/v1/auth/logout", post(mock_logout))
            .route("/v1/users/me", get(mock_me))
            .route("/v1/project/{name}", get(mock_project))
            .route("/v1/project/{name}/logs", get(mock_logs))
            .with_state(state);

        let shutdown = CancellationToken::new();
        let sd = shutdown.clone();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).with_graceful_shutdown(sd.cancelled_owned()).await;
        });
        Ok(Self { addr, record, shutdown })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    pub fn record(&self) -> &MockRecord {
        &self.record
    }

    pub fn token_exchanges(&self) -> u32 {
        MockRecord::count(&self.record.token_exchanges)
    }

    pub fn logouts(&self) -> u32 {
        MockRecord::count(&self.record.logouts)
    }

    pub fn project_calls(&self) -> u32 {
        MockRecord::count(&self.record.project_calls)
    }

    pub fn log_calls(&self) -> u32 {
        MockRecord::count(&self.record.log_calls)
    }
}

impl Drop for MockApi {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn mock_token(
    State(s): State<Arc<MockState>>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    s.record.token_exchanges.fetch_add(1, Ordering::SeqCst);
    if let Some(uri) = body.get("redirect_uri").and_then(|v| v.as_str()) {
        s.record.redirect_uris.lock().push(uri.to_owned());
    }
    if body.get("code").and_then(|v| v.as_str()) == Some(s.config.auth_code.as_str()) {
        Json(json!({ "access_token": s.config.access_token, "token_type": "bearer" })).into_response()
    } else {
        (StatusCode::BAD_REQUEST, Json(json!({ "error": "invalid_grant" }))).into_response()
    }
}

async fn mock_logout(State(s): State<Arc<MockState>>, headers: HeaderMap) -> StatusCode {
    s.observe(&headers);
    s.record.logouts.fetch_add(1, Ordering::SeqCst);
    StatusCode::NO_CONTENT
}

async fn mock_me(State(s): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if !s.observe(&headers) {
        return (StatusCode::UNAUTHORIZED, "invalid token").into_response();
    }
    Json(json!({ "id": "user-1", "name": "Test User" })).into_response()
}

async fn mock_project(
    State(s): State<Arc<MockState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Response {
    s.record.project_calls.fetch_add(1, Ordering::SeqCst);
    if !s.observe(&headers) {
        return (StatusCode::UNAUTHORIZED, "invalid token").into_response();
    }
    if name != s.config.project {
        return (StatusCode::NOT_FOUND, "no such project").into_response();
    }
    let current = s.next_status();
    if let Ok(code) = current.parse::<u16>() {
        let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (status, "mock failure").into_response();
    }
    Json(json!({
        "name": s.config.project,
        "kind": "backend",
        "provisioning_state": "Ready",
        "running_status": { "current": current, "public_ip": s.config.public_ip },
        "resources": [{ "kind": "Database", "name": "db", "status": "Available" }],
    }))
    .into_response()
}

async fn mock_logs(
    State(s): State<Arc<MockState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Response {
    s.record.log_calls.fetch_add(1, Ordering::SeqCst);
    if !s.observe(&headers) {
        return (StatusCode::UNAUTHORIZED, "invalid token").into_response();
    }
    if name != s.config.project {
        return (StatusCode::NOT_FOUND, "no such project").into_response();
    }
    Json(json!({ "logs": s.config.logs })).into_response()
}

/// What the scripted browser does with the authorization URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redirect {
    /// Redirect back with the configured code and the real state.
    Approve,
    /// Redirect back with `error=access_denied`.
    Deny,
    /// Redirect back with a valid code but someone else's state.
    ForgeState,
    /// Never redirect.
    Ignore,
    /// Fail to launch.
    Unavailable,
}

/// A [`Browser`] that follows the authorization URL straight to the
/// redirect URI, as a provider would after the user clicks "allow".
#[derive(Debug, Clone)]
pub struct FakeBrowser {
    redirect: Redirect,
    code: String,
    opened: Arc<Mutex<Vec<String>>>,
}

impl FakeBrowser {
    pub fn new(redirect: Redirect, code: &str) -> Self {
        Self { redirect, code: code.to_owned(), opened: Arc::new(Mutex::new(Vec::new())) }
    }

    /// Shared handle to the URLs this browser was asked to open.
    pub fn opened(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.opened)
    }
}

impl Browser for FakeBrowser {
    fn open(&self, url: &str) -> anyhow::Result<()> {
        self.opened.lock().push(url.to_owned());
        if self.redirect == Redirect::Unavailable {
            anyhow::bail!("no display");
        }

        let parsed = reqwest::Url::parse(url)?;
        let param = |key: &str| {
            parsed.query_pairs().find(|(k, _)| k == key).map(|(_, v)| v.into_owned())
        };
        let redirect_uri =
            param("redirect_uri").ok_or_else(|| anyhow::anyhow!("no redirect_uri in {url}"))?;
        let state = param("state").unwrap_or_default();

        let pairs: Vec<(&str, String)> = match self.redirect {
            Redirect::Approve => vec![("code", self.code.clone()), ("state", state)],
            Redirect::Deny => vec![("error", "access_denied".to_owned()), ("state", state)],
            Redirect::ForgeState => vec![("code", self.code.clone()), ("state", "forged".to_owned())],
            Redirect::Ignore | Redirect::Unavailable => return Ok(()),
        };
        let mut target = reqwest::Url::parse(&redirect_uri)?;
        target.query_pairs_mut().extend_pairs(pairs);

        let client = http_client()?;
        tokio::spawn(async move {
            let _ = client.get(target).send().await;
        });
        Ok(())
    }
}
