// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Loopback listener that receives exactly one OAuth redirect.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::state::constant_time_eq;
use crate::error::{CALLBACK_CANCELLED, CALLBACK_STATE_MISMATCH, CALLBACK_TIMEOUT};

pub const CALLBACK_PATH: &str = "/callback";

/// How long an in-flight confirmation page may take to drain after the
/// result is known.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// What the redirect carried. `error` is set on every failure path,
/// including the listener's own timeout and cancellation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackResult {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

impl CallbackResult {
    pub fn failed(reason: &str) -> Self {
        Self { code: None, state: None, error: Some(reason.to_owned()) }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

struct CallbackShared {
    expected_state: String,
    tx: Mutex<Option<oneshot::Sender<CallbackResult>>>,
}

/// A bound, not yet serving, loopback socket.
///
/// Binding happens before the authorization URL is built so the redirect
/// URI can carry the real port.
pub struct CallbackListener {
    listener: TcpListener,
    addr: SocketAddr,
}

impl CallbackListener {
    /// Bind `127.0.0.1:<port>`. Port 0 picks a free port.
    pub async fn bind(port: u16) -> std::io::Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port)).await?;
        let addr = listener.local_addr()?;
        debug!(%addr, "callback listener bound");
        Ok(Self { listener, addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn redirect_uri(&self) -> String {
        format!("http://{}{CALLBACK_PATH}", self.addr)
    }

    /// Serve until one redirect arrives, `timeout` elapses, or `cancel` fires.
    ///
    /// The socket is closed before this returns, on every path. Requests to
    /// other paths get 404 and do not consume the listener; a second hit on
    /// the callback path after the first gets 410.
    pub async fn start(
        self,
        expected_state: &str,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> CallbackResult {
        let Self { listener, addr } = self;
        let (tx, rx) = oneshot::channel();
        let shared = Arc::new(CallbackShared {
            expected_state: expected_state.to_owned(),
            tx: Mutex::new(Some(tx)),
        });
        let router = Router::new().route(CALLBACK_PATH, get(handle_callback)).with_state(shared);

        let done = CancellationToken::new();
        // Stops the server if this future is dropped mid-wait.
        let _stop_on_drop = done.clone().drop_guard();
        let mut server = tokio::spawn({
            let done = done.clone();
            async move {
                axum::serve(listener, router).with_graceful_shutdown(done.cancelled_owned()).await
            }
        });

        info!(%addr, timeout_secs = timeout.as_secs(), "waiting for login callback");
        let result = tokio::select! {
            received = rx => received.unwrap_or_else(|_| CallbackResult::failed(CALLBACK_CANCELLED)),
            _ = tokio::time::sleep(timeout) => {
                warn!(timeout_secs = timeout.as_secs(), "login callback timed out");
                CallbackResult::failed(CALLBACK_TIMEOUT)
            }
            _ = cancel.cancelled() => {
                debug!("login callback cancelled");
                CallbackResult::failed(CALLBACK_CANCELLED)
            }
        };

        done.cancel();
        match tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => warn!(err = %e, "callback server error"),
            Ok(Err(e)) => warn!(err = %e, "callback server task failed"),
            Err(_) => {
                debug!("callback server did not drain in time, aborting");
                server.abort();
                let _ = server.await;
            }
        }
        debug!(%addr, error = ?result.error, "callback listener closed");
        result
    }
}

async fn handle_callback(
    State(shared): State<Arc<CallbackShared>>,
    Query(query): Query<CallbackQuery>,
) -> (StatusCode, Html<String>) {
    let Some(tx) = shared.tx.lock().take() else {
        return (
            StatusCode::GONE,
            Html(page("Already handled", "This login link was already used. You can close this tab.")),
        );
    };

    let result = classify(&shared.expected_state, query);
    let response = match result.error.as_deref() {
        None => (
            StatusCode::OK,
            Html(page("Logged in", "You can close this tab and return to the terminal.")),
        ),
        Some(reason) => (
            StatusCode::BAD_REQUEST,
            Html(page("Login failed", &format!("Reason: {}. Return to the terminal.", escape(reason)))),
        ),
    };
    let _ = tx.send(result);
    response
}

/// Turn raw redirect parameters into a result.
///
/// A state mismatch wins over everything else, then a provider error.
pub(crate) fn classify(expected_state: &str, query: CallbackQuery) -> CallbackResult {
    let state_ok = query
        .state
        .as_deref()
        .is_some_and(|s| constant_time_eq(s.as_bytes(), expected_state.as_bytes()));
    if !state_ok {
        warn!("login callback state mismatch");
        return CallbackResult {
            code: None,
            state: query.state,
            error: Some(CALLBACK_STATE_MISMATCH.to_owned()),
        };
    }
    if let Some(error) = query.error {
        debug!(error = %error, description = ?query.error_description, "provider returned an error");
        return CallbackResult { code: None, state: query.state, error: Some(error) };
    }
    CallbackResult { code: query.code, state: query.state, error: None }
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>Neptune: {title}</title></head>\
         <body style=\"font-family: sans-serif; text-align: center; padding-top: 4em\">\
         <h1>{title}</h1><p>{body}</p></body></html>\n"
    )
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
#[path = "callback_tests.rs"]
mod tests;
