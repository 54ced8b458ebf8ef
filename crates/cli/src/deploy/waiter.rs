// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Poll a deployment until it settles, the budget runs out, or the caller
//! cancels.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::ApiError;
use crate::deploy::{DeploymentStatus, PollOutcome, StatusSource};
use crate::error::PollError;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(300);
/// Consecutive transient failures tolerated before giving up.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Upper bound on the log fetch that follows an `Error` status.
pub const LOG_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

pub struct DeploymentWaiter<'a> {
    source: &'a dyn StatusSource,
    max_retries: u32,
    cancel: CancellationToken,
}

impl<'a> DeploymentWaiter<'a> {
    pub fn new(source: &'a dyn StatusSource) -> Self {
        Self { source, max_retries: DEFAULT_MAX_RETRIES, cancel: CancellationToken::new() }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Poll `project` until it reaches a terminal state or `max_wait` elapses.
    ///
    /// The first poll is immediate. Each sleep is `poll_interval`, clipped to
    /// the time left, and the deadline is checked again after it, so no poll
    /// is issued past `max_wait`. A 1s interval with a 5s budget therefore
    /// polls at 0, 1, 2, 3, 4 and reports a timeout at 5s.
    ///
    /// An in-flight poll is abandoned when the deadline passes or the caller
    /// cancels. A `max_wait` too large to represent means no deadline.
    pub async fn wait(
        &self,
        project: &str,
        poll_interval: Duration,
        max_wait: Duration,
    ) -> Result<PollOutcome, PollError> {
        let started = Instant::now();
        let deadline = started.checked_add(max_wait);
        let mut last = DeploymentStatus::Unknown;
        let mut polls: u32 = 0;
        let mut failures: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                return Ok(self.stopped(last, started, polls, Stop::Cancelled));
            }

            polls += 1;
            let polled = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!(project, "wait cancelled during poll");
                    return Ok(self.stopped(last, started, polls, Stop::Cancelled));
                }
                result = self.source.status(project) => result,
                _ = sleep_until(deadline) => {
                    return Ok(self.stopped(last, started, polls, Stop::TimedOut));
                }
            };
            match polled {
                Ok(status) => {
                    failures = 0;
                    if status != last {
                        info!(project, status = %status, polls, "deployment status");
                    } else {
                        debug!(project, status = %status, polls, "deployment status unchanged");
                    }
                    last = status;

                    if status.is_terminal() {
                        let logs = if status.is_failure() { self.fetch_logs(project).await } else { None };
                        return Ok(PollOutcome {
                            final_status: status,
                            terminal: true,
                            elapsed: started.elapsed(),
                            timed_out: false,
                            cancelled: false,
                            polls,
                            logs,
                        });
                    }
                }
                Err(ApiError::NotFound) => return Err(PollError::ProjectNotFound(project.to_owned())),
                Err(e) if e.is_transient() => {
                    failures += 1;
                    if failures > self.max_retries {
                        return Err(PollError::MaxRetriesExceeded {
                            attempts: failures,
                            last_error: e.to_string(),
                        });
                    }
                    warn!(project, attempt = failures, err = %e, "status poll failed, retrying");
                }
                Err(e) => return Err(PollError::Connectivity(e.to_string())),
            }

            let now = Instant::now();
            let pause = match deadline {
                Some(deadline) if now >= deadline => {
                    return Ok(self.stopped(last, started, polls, Stop::TimedOut));
                }
                Some(deadline) => poll_interval.min(deadline - now),
                None => poll_interval,
            };
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!(project, "wait cancelled");
                    return Ok(self.stopped(last, started, polls, Stop::Cancelled));
                }
                _ = tokio::time::sleep(pause) => {}
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Ok(self.stopped(last, started, polls, Stop::TimedOut));
            }
        }
    }

    async fn fetch_logs(&self, project: &str) -> Option<Vec<String>> {
        let fetched = tokio::select! {
            _ = self.cancel.cancelled() => return None,
            fetched = tokio::time::timeout(LOG_FETCH_TIMEOUT, self.source.logs(project)) => fetched,
        };
        match fetched {
            Ok(Ok(lines)) => Some(lines),
            Ok(Err(e)) => {
                warn!(project, err = %e, "failed to fetch deployment logs");
                None
            }
            Err(_) => {
                warn!(project, "timed out fetching deployment logs");
                None
            }
        }
    }

    fn stopped(
        &self,
        last: DeploymentStatus,
        started: Instant,
        polls: u32,
        why: Stop,
    ) -> PollOutcome {
        let elapsed = started.elapsed();
        if matches!(why, Stop::TimedOut) {
            warn!(status = %last, elapsed_secs = elapsed.as_secs(), "deployment did not settle in time");
        }
        PollOutcome {
            final_status: last,
            terminal: false,
            elapsed,
            timed_out: matches!(why, Stop::TimedOut),
            cancelled: matches!(why, Stop::Cancelled),
            polls,
            logs: None,
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

enum Stop {
    TimedOut,
    Cancelled,
}

#[cfg(test)]
#[path = "waiter_tests.rs"]
mod tests;
