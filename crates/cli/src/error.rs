// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy for login, credential storage, and deployment polling.
//!
//! Every variant carries a stable machine code (`as_str`) that is surfaced
//! in JSON output, plus a remediation hint for the human renderer.

use std::fmt;
use std::path::PathBuf;

/// Callback outcome labels produced by the loopback listener.
pub const CALLBACK_STATE_MISMATCH: &str = "state_mismatch";
pub const CALLBACK_TIMEOUT: &str = "timeout";
pub const CALLBACK_CANCELLED: &str = "cancelled";
pub const CALLBACK_ACCESS_DENIED: &str = "access_denied";
pub const CALLBACK_MISSING_CODE: &str = "missing_code";

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("login callback did not match this login attempt")]
    StateMismatch,
    #[error("timed out waiting for the browser to complete login")]
    Timeout,
    #[error("login was denied ({0})")]
    Denied(String),
    #[error("token exchange failed: {0}")]
    ExchangeFailed(String),
    #[error("login was cancelled")]
    Cancelled,
    #[error("cannot listen for the login callback: {0}")]
    Listener(String),
    #[error("invalid API base URL {0}")]
    InvalidBaseUrl(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl AuthError {
    /// Map a failed callback label onto the error the user sees.
    pub fn from_callback(reason: &str) -> Self {
        match reason {
            CALLBACK_STATE_MISMATCH => Self::StateMismatch,
            CALLBACK_TIMEOUT => Self::Timeout,
            CALLBACK_CANCELLED => Self::Cancelled,
            other => Self::Denied(other.to_owned()),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StateMismatch => "STATE_MISMATCH",
            Self::Timeout => "TIMEOUT",
            Self::Denied(_) => "DENIED",
            Self::ExchangeFailed(_) => "EXCHANGE_FAILED",
            Self::Cancelled => "CANCELLED",
            Self::Listener(_) => "LISTENER",
            Self::InvalidBaseUrl(_) => "INVALID_CONFIG",
            Self::Storage(e) => e.as_str(),
        }
    }

    pub fn hint(&self) -> String {
        match self {
            Self::StateMismatch => {
                "Run `neptune login` again and finish login in the browser tab it opens.".to_owned()
            }
            Self::Timeout => {
                "Run `neptune login` again, or pass `--timeout` for more time.".to_owned()
            }
            Self::Denied(_) => "Approve the request in the browser to log in.".to_owned(),
            Self::ExchangeFailed(_) => {
                "Check the API URL and your network, then run `neptune login` again.".to_owned()
            }
            Self::Cancelled => "Run `neptune login` to try again.".to_owned(),
            Self::Listener(_) => {
                "Free the port or pass `--callback-port 0` to pick one automatically.".to_owned()
            }
            Self::InvalidBaseUrl(_) => {
                "Set --api-url or NEPTUNE_API_BASE_URL to an http(s) URL.".to_owned()
            }
            Self::Storage(e) => e.hint(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("cannot write credentials to {}: {source}", .path.display())]
    Unwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("credential record {} is unreadable: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },
}

impl StorageError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unwritable { .. } => "UNWRITABLE",
            Self::Corrupt { .. } => "CORRUPT",
        }
    }

    pub fn hint(&self) -> String {
        match self {
            Self::Unwritable { path, .. } => format!(
                "Check permissions on {}, or point NEPTUNE_CONFIG_DIR at a writable directory.",
                path.parent().unwrap_or(path).display()
            ),
            Self::Corrupt { path, .. } => {
                format!("Delete {} and run `neptune login` again.", path.display())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PollError {
    #[error("project '{0}' not found")]
    ProjectNotFound(String),
    #[error("cannot reach the Neptune API: {0}")]
    Connectivity(String),
    #[error("Neptune API still unreachable after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },
}

impl PollError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProjectNotFound(_) => "PROJECT_NOT_FOUND",
            Self::Connectivity(_) => "CONNECTIVITY",
            Self::MaxRetriesExceeded { .. } => "MAX_RETRIES_EXCEEDED",
        }
    }

    pub fn hint(&self) -> String {
        match self {
            Self::ProjectNotFound(_) => {
                "Deploy the project first, or pass --project-name to pick another.".to_owned()
            }
            Self::Connectivity(_) | Self::MaxRetriesExceeded { .. } => {
                "Check your network and `neptune login` state, then run `neptune wait` again."
                    .to_owned()
            }
        }
    }
}

/// Stable code for failures that are not one of the typed errors above.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliCode {
    NotLoggedIn,
    InvalidConfig,
    ApiError,
    DeploymentError,
    DeploymentStopped,
    WaitTimeout,
    Interrupted,
}

impl CliCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotLoggedIn => "NOT_LOGGED_IN",
            Self::InvalidConfig => "INVALID_CONFIG",
            Self::ApiError => "API_ERROR",
            Self::DeploymentError => "DEPLOYMENT_ERROR",
            Self::DeploymentStopped => "DEPLOYMENT_STOPPED",
            Self::WaitTimeout => "WAIT_TIMEOUT",
            Self::Interrupted => "INTERRUPTED",
        }
    }
}

impl fmt::Display for CliCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
