// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `neptune wait`: block until a deployment settles.
//!
//! Exit codes: 0 running, 1 error or stopped, 3 timed out, 4 API
//! unreachable, 130 interrupted.

use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::config::{resolve_project_name, Config};
use crate::deploy::waiter::{DEFAULT_MAX_WAIT, DEFAULT_POLL_INTERVAL};
use crate::deploy::{DeploymentStatus, DeploymentWaiter, PollOutcome};
use crate::error::{CliCode, PollError};

use super::{
    authed_client, Reporter, EXIT_FAILURE, EXIT_INTERRUPTED, EXIT_INVALID_CONFIG, EXIT_OK,
    EXIT_UNREACHABLE, EXIT_WAIT_TIMEOUT,
};

#[derive(Debug, clap::Args)]
pub struct WaitArgs {
    /// Project to watch; defaults to the one in the working directory.
    #[arg(long)]
    pub project_name: Option<String>,

    /// Give up after this many seconds.
    #[arg(long, default_value_t = DEFAULT_MAX_WAIT.as_secs())]
    pub timeout: u64,

    /// Seconds between status checks.
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL.as_secs_f64())]
    pub poll_interval: f64,
}

impl WaitArgs {
    pub fn validate(&self) -> anyhow::Result<()> {
        match Duration::try_from_secs_f64(self.poll_interval) {
            Ok(interval) if !interval.is_zero() => Ok(()),
            _ => anyhow::bail!("--poll-interval must be a positive number of seconds, got {}", self.poll_interval),
        }
    }

    /// The validated interval; falls back to the default for values
    /// `validate` rejects.
    pub fn poll_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.poll_interval)
            .ok()
            .filter(|interval| !interval.is_zero())
            .unwrap_or(DEFAULT_POLL_INTERVAL)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

pub async fn run(config: &Config, args: &WaitArgs, out: &Reporter, cancel: CancellationToken) -> i32 {
    let project = match resolve_project_name(args.project_name.as_deref(), &config.working_directory) {
        Ok(name) => name,
        Err(e) => {
            return out.fail(CliCode::InvalidConfig.as_str(), &format!("{e:#}"), "", None, EXIT_INVALID_CONFIG)
        }
    };
    let api = match authed_client(config, out) {
        Ok(api) => api,
        Err(code) => return code,
    };

    if !out.is_json() {
        eprintln!("Waiting for '{project}' to settle (timeout {}s)...", args.timeout);
    }
    let waiter = DeploymentWaiter::new(&api).with_cancel(cancel);
    match waiter.wait(&project, args.poll_interval(), args.max_wait()).await {
        Ok(outcome) => report_outcome(out, &project, args.project_name.is_some(), outcome),
        Err(e) => report_error(out, &project, &e),
    }
}

fn report_outcome(out: &Reporter, project: &str, explicit_project: bool, outcome: PollOutcome) -> i32 {
    let mut fields = serde_json::to_value(&outcome).unwrap_or_else(|_| json!({}));
    if let Some(obj) = fields.as_object_mut() {
        obj.insert("project".to_owned(), json!(project));
    }

    if outcome.cancelled {
        return out.fail_with(
            CliCode::Interrupted.as_str(),
            "wait interrupted",
            "",
            Some("neptune wait"),
            fields,
            EXIT_INTERRUPTED,
        );
    }
    if outcome.timed_out {
        let next = retry_command(outcome.elapsed, explicit_project.then_some(project));
        return out.fail_with(
            CliCode::WaitTimeout.as_str(),
            &format!(
                "'{project}' is still {} after {}s",
                outcome.final_status,
                outcome.elapsed.as_secs()
            ),
            "The deployment may still finish; wait longer or check `neptune status`.",
            Some(next.as_str()),
            fields,
            EXIT_WAIT_TIMEOUT,
        );
    }

    match outcome.final_status {
        DeploymentStatus::Running => {
            out.line(&format!("'{project}' is running."));
            out.success(fields, Some("neptune status"));
            EXIT_OK
        }
        DeploymentStatus::Error => {
            if !out.is_json() {
                for line in outcome.logs.iter().flatten() {
                    eprintln!("  {line}");
                }
            }
            out.fail_with(
                CliCode::DeploymentError.as_str(),
                &format!("'{project}' failed to deploy"),
                "Inspect the logs above, fix the issue, and deploy again.",
                Some("neptune logs"),
                fields,
                EXIT_FAILURE,
            )
        }
        other => {
            if !out.is_json() {
                out.warn(&format!("'{project}' is {other}; run `neptune deploy` to start it again."));
                return EXIT_FAILURE;
            }
            out.fail_with(
                CliCode::DeploymentStopped.as_str(),
                &format!("'{project}' is {other}"),
                "Run `neptune deploy` to start it again.",
                Some("neptune deploy"),
                fields,
                EXIT_FAILURE,
            )
        }
    }
}

/// The command to keep waiting with twice the budget that just ran out.
pub(crate) fn retry_command(elapsed: Duration, project: Option<&str>) -> String {
    let timeout = elapsed.as_secs().max(1).saturating_mul(2);
    match project {
        Some(project) => format!("neptune wait --timeout {timeout} --project-name {project}"),
        None => format!("neptune wait --timeout {timeout}"),
    }
}

fn report_error(out: &Reporter, project: &str, err: &PollError) -> i32 {
    let exit = match err {
        PollError::ProjectNotFound(_) => EXIT_FAILURE,
        PollError::Connectivity(_) | PollError::MaxRetriesExceeded { .. } => EXIT_UNREACHABLE,
    };
    let next = match err {
        PollError::ProjectNotFound(_) => "neptune deploy",
        _ => "neptune wait",
    };
    out.fail_with(
        err.as_str(),
        &err.to_string(),
        &err.hint(),
        Some(next),
        json!({ "project": project }),
        exit,
    )
}

#[cfg(test)]
#[path = "wait_tests.rs"]
mod tests;
