// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deployment lifecycle states and the source they are polled from.

pub mod waiter;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize, Serializer};

use crate::api::ApiError;

pub use waiter::DeploymentWaiter;

/// Lifecycle state reported by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeploymentStatus {
    Pending,
    Starting,
    Running,
    Stopping,
    Stopped,
    Error,
    Unknown,
}

impl DeploymentStatus {
    /// Map a server status string. Absent or unrecognized values are `Unknown`.
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::Unknown;
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" | "provisioning" | "queued" => Self::Pending,
            "starting" | "deploying" | "building" => Self::Starting,
            "running" | "ready" | "healthy" => Self::Running,
            "stopping" => Self::Stopping,
            "stopped" => Self::Stopped,
            "error" | "failed" | "crashed" => Self::Error,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Starting => "Starting",
            Self::Running => "Running",
            Self::Stopping => "Stopping",
            Self::Stopped => "Stopped",
            Self::Error => "Error",
            Self::Unknown => "Unknown",
        }
    }

    /// Polling stops at these.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Running | Self::Stopped | Self::Error)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Error)
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one wait. Exactly one of `terminal`, `timed_out`, `cancelled`
/// is true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollOutcome {
    pub final_status: DeploymentStatus,
    pub terminal: bool,
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
    pub timed_out: bool,
    pub cancelled: bool,
    /// Status requests issued, including failed ones.
    pub polls: u32,
    /// Recent log lines, fetched only when the final status is a failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logs: Option<Vec<String>>,
}

fn as_millis<S: Serializer>(elapsed: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
}

/// Where deployment status and logs come from.
pub trait StatusSource: Send + Sync {
    fn status<'a>(
        &'a self,
        project: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<DeploymentStatus, ApiError>> + Send + 'a>>;

    fn logs<'a>(
        &'a self,
        project: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, ApiError>> + Send + 'a>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[yare::parameterized(
        running = { Some("running"), DeploymentStatus::Running },
        running_caps = { Some("Running"), DeploymentStatus::Running },
        ready = { Some("ready"), DeploymentStatus::Running },
        pending = { Some("pending"), DeploymentStatus::Pending },
        provisioning = { Some("provisioning"), DeploymentStatus::Pending },
        starting = { Some("starting"), DeploymentStatus::Starting },
        deploying = { Some("deploying"), DeploymentStatus::Starting },
        stopping = { Some("stopping"), DeploymentStatus::Stopping },
        stopped = { Some("stopped"), DeploymentStatus::Stopped },
        error = { Some("error"), DeploymentStatus::Error },
        failed = { Some("failed"), DeploymentStatus::Error },
        unrecognized = { Some("hibernating"), DeploymentStatus::Unknown },
        absent = { None, DeploymentStatus::Unknown },
    )]
    fn parse_status(raw: Option<&str>, expected: DeploymentStatus) {
        assert_eq!(DeploymentStatus::parse(raw), expected);
    }

    #[yare::parameterized(
        pending = { DeploymentStatus::Pending, false, false },
        starting = { DeploymentStatus::Starting, false, false },
        running = { DeploymentStatus::Running, true, false },
        stopping = { DeploymentStatus::Stopping, false, false },
        stopped = { DeploymentStatus::Stopped, true, false },
        error = { DeploymentStatus::Error, true, true },
        unknown = { DeploymentStatus::Unknown, false, false },
    )]
    fn terminal_states(status: DeploymentStatus, terminal: bool, failure: bool) {
        assert_eq!(status.is_terminal(), terminal);
        assert_eq!(status.is_failure(), failure);
    }

    #[test]
    fn outcome_serializes_elapsed_as_millis() -> anyhow::Result<()> {
        let outcome = PollOutcome {
            final_status: DeploymentStatus::Running,
            terminal: true,
            elapsed: Duration::from_millis(2500),
            timed_out: false,
            cancelled: false,
            polls: 2,
            logs: None,
        };
        let json = serde_json::to_value(&outcome)?;
        assert_eq!(json["elapsed_ms"], 2500);
        assert_eq!(json["final_status"], "Running");
        assert!(json.get("logs").is_none());
        Ok(())
    }
}
