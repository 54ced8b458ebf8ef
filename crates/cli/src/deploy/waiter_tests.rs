// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use super::*;

/// Replays scripted status results; the last one repeats forever.
struct ScriptedSource {
    script: Mutex<VecDeque<Result<DeploymentStatus, ApiError>>>,
    logs: Result<Vec<String>, ApiError>,
    status_calls: AtomicU32,
    log_calls: AtomicU32,
}

impl ScriptedSource {
    fn new(script: Vec<Result<DeploymentStatus, ApiError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            logs: Ok(vec!["panic: port already in use".to_owned()]),
            status_calls: AtomicU32::new(0),
            log_calls: AtomicU32::new(0),
        }
    }

    fn statuses(statuses: &[DeploymentStatus]) -> Self {
        Self::new(statuses.iter().copied().map(Ok).collect())
    }

    fn with_logs(mut self, logs: Result<Vec<String>, ApiError>) -> Self {
        self.logs = logs;
        self
    }

    fn next(&self) -> Result<DeploymentStatus, ApiError> {
        let mut script = self.script.lock();
        if script.len() > 1 {
            script.pop_front().unwrap_or(Ok(DeploymentStatus::Unknown))
        } else {
            script.front().cloned().unwrap_or(Ok(DeploymentStatus::Unknown))
        }
    }
}

impl StatusSource for ScriptedSource {
    fn status<'a>(
        &'a self,
        _project: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<DeploymentStatus, ApiError>> + Send + 'a>> {
        self.status_calls.fetch_add(1, Ordering::Relaxed);
        let next = self.next();
        Box::pin(async move { next })
    }

    fn logs<'a>(
        &'a self,
        _project: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, ApiError>> + Send + 'a>> {
        self.log_calls.fetch_add(1, Ordering::Relaxed);
        let logs = self.logs.clone();
        Box::pin(async move { logs })
    }
}

fn refused() -> ApiError {
    ApiError::Transport("connection refused".to_owned())
}

const SECOND: Duration = Duration::from_secs(1);

#[tokio::test(start_paused = true)]
async fn never_settling_times_out_after_budget() -> anyhow::Result<()> {
    let source = ScriptedSource::statuses(&[DeploymentStatus::Starting]);
    let outcome = DeploymentWaiter::new(&source).wait("demo", SECOND, 5 * SECOND).await?;

    assert!(outcome.timed_out);
    assert!(!outcome.terminal);
    assert!(!outcome.cancelled);
    assert_eq!(outcome.final_status, DeploymentStatus::Starting);
    assert_eq!(outcome.polls, 5);
    assert_eq!(source.status_calls.load(Ordering::Relaxed), 5);
    assert_eq!(outcome.elapsed, 5 * SECOND);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn sleep_is_clipped_to_remaining_budget() -> anyhow::Result<()> {
    let source = ScriptedSource::statuses(&[DeploymentStatus::Pending]);
    let outcome = DeploymentWaiter::new(&source).wait("demo", 2 * SECOND, 3 * SECOND).await?;

    // Polls at 0s and 2s, then a 1s sleep to the deadline.
    assert!(outcome.timed_out);
    assert_eq!(outcome.polls, 2);
    assert_eq!(outcome.elapsed, 3 * SECOND);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn zero_budget_polls_once() -> anyhow::Result<()> {
    let source = ScriptedSource::statuses(&[DeploymentStatus::Pending]);
    let outcome = DeploymentWaiter::new(&source).wait("demo", SECOND, Duration::ZERO).await?;

    assert!(outcome.timed_out);
    assert_eq!(outcome.polls, 1);
    assert_eq!(outcome.elapsed, Duration::ZERO);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn already_running_returns_without_sleeping() -> anyhow::Result<()> {
    let source = ScriptedSource::statuses(&[DeploymentStatus::Running]);
    let outcome = DeploymentWaiter::new(&source).wait("demo", 10 * SECOND, 60 * SECOND).await?;

    assert!(outcome.terminal);
    assert!(!outcome.timed_out);
    assert_eq!(outcome.final_status, DeploymentStatus::Running);
    assert_eq!(outcome.polls, 1);
    assert_eq!(outcome.elapsed, Duration::ZERO);
    assert_eq!(outcome.logs, None);
    assert_eq!(source.log_calls.load(Ordering::Relaxed), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn reaches_running_after_transitions() -> anyhow::Result<()> {
    let source = ScriptedSource::statuses(&[
        DeploymentStatus::Pending,
        DeploymentStatus::Starting,
        DeploymentStatus::Running,
    ]);
    let outcome = DeploymentWaiter::new(&source).wait("demo", 2 * SECOND, 60 * SECOND).await?;

    assert_eq!(outcome.final_status, DeploymentStatus::Running);
    assert_eq!(outcome.polls, 3);
    assert_eq!(outcome.elapsed, 4 * SECOND);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn error_fetches_logs_once_and_stops() -> anyhow::Result<()> {
    let source = ScriptedSource::statuses(&[DeploymentStatus::Starting, DeploymentStatus::Error]);
    let outcome = DeploymentWaiter::new(&source).wait("demo", SECOND, 60 * SECOND).await?;

    assert!(outcome.terminal);
    assert_eq!(outcome.final_status, DeploymentStatus::Error);
    assert_eq!(outcome.logs, Some(vec!["panic: port already in use".to_owned()]));
    assert_eq!(source.log_calls.load(Ordering::Relaxed), 1);
    assert_eq!(source.status_calls.load(Ordering::Relaxed), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn stopped_is_terminal_without_logs() -> anyhow::Result<()> {
    let source = ScriptedSource::statuses(&[DeploymentStatus::Stopping, DeploymentStatus::Stopped]);
    let outcome = DeploymentWaiter::new(&source).wait("demo", SECOND, 60 * SECOND).await?;

    assert!(outcome.terminal);
    assert_eq!(outcome.final_status, DeploymentStatus::Stopped);
    assert_eq!(outcome.logs, None);
    assert_eq!(source.log_calls.load(Ordering::Relaxed), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn failed_log_fetch_still_reports_error() -> anyhow::Result<()> {
    let source = ScriptedSource::statuses(&[DeploymentStatus::Error]).with_logs(Err(refused()));
    let outcome = DeploymentWaiter::new(&source).wait("demo", SECOND, 60 * SECOND).await?;

    assert_eq!(outcome.final_status, DeploymentStatus::Error);
    assert_eq!(outcome.logs, None);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried() -> anyhow::Result<()> {
    let source = ScriptedSource::new(vec![
        Err(refused()),
        Err(refused()),
        Err(refused()),
        Ok(DeploymentStatus::Running),
    ]);
    let outcome = DeploymentWaiter::new(&source).wait("demo", SECOND, 60 * SECOND).await?;

    assert_eq!(outcome.final_status, DeploymentStatus::Running);
    assert_eq!(outcome.polls, 4);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn success_resets_retry_budget() -> anyhow::Result<()> {
    let source = ScriptedSource::new(vec![
        Err(refused()),
        Err(refused()),
        Err(refused()),
        Ok(DeploymentStatus::Starting),
        Err(refused()),
        Err(refused()),
        Err(refused()),
        Ok(DeploymentStatus::Running),
    ]);
    let outcome = DeploymentWaiter::new(&source).wait("demo", SECOND, 60 * SECOND).await?;

    assert_eq!(outcome.final_status, DeploymentStatus::Running);
    assert_eq!(outcome.polls, 8);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn persistent_transport_failure_exhausts_retries() {
    let source = ScriptedSource::new(vec![Err(refused())]);
    let err = DeploymentWaiter::new(&source).wait("demo", SECOND, 60 * SECOND).await.err();

    assert_eq!(
        err,
        Some(PollError::MaxRetriesExceeded {
            attempts: 4,
            last_error: "request failed: connection refused".to_owned(),
        })
    );
    assert_eq!(source.status_calls.load(Ordering::Relaxed), 4);
}

#[tokio::test(start_paused = true)]
async fn server_errors_count_as_transient() -> anyhow::Result<()> {
    let source = ScriptedSource::new(vec![
        Err(ApiError::Status { status: 503, body: "upstream".to_owned() }),
        Ok(DeploymentStatus::Running),
    ]);
    let outcome = DeploymentWaiter::new(&source).wait("demo", SECOND, 60 * SECOND).await?;
    assert_eq!(outcome.polls, 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn client_error_fails_immediately() {
    let source = ScriptedSource::new(vec![Err(ApiError::Status {
        status: 401,
        body: "unauthorized".to_owned(),
    })]);
    let err = DeploymentWaiter::new(&source).wait("demo", SECOND, 60 * SECOND).await.err();

    assert!(matches!(err, Some(PollError::Connectivity(ref msg)) if msg.contains("401")), "{err:?}");
    assert_eq!(source.status_calls.load(Ordering::Relaxed), 1);
}

#[tokio::test(start_paused = true)]
async fn missing_project_is_not_found() {
    let source = ScriptedSource::new(vec![Err(ApiError::NotFound)]);
    let err = DeploymentWaiter::new(&source).wait("ghost", SECOND, 60 * SECOND).await.err();
    assert_eq!(err, Some(PollError::ProjectNotFound("ghost".to_owned())));
}

#[tokio::test(start_paused = true)]
async fn cancel_between_polls() -> anyhow::Result<()> {
    let source = ScriptedSource::statuses(&[DeploymentStatus::Starting]);
    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(2500)).await;
        canceller.cancel();
    });

    let outcome = DeploymentWaiter::new(&source)
        .with_cancel(cancel)
        .wait("demo", SECOND, 60 * SECOND)
        .await?;

    assert!(outcome.cancelled);
    assert!(!outcome.timed_out);
    assert!(!outcome.terminal);
    assert_eq!(outcome.polls, 3);
    assert_eq!(outcome.final_status, DeploymentStatus::Starting);
    assert_eq!(outcome.elapsed, Duration::from_millis(2500));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn cancelled_before_start_issues_no_poll() -> anyhow::Result<()> {
    let source = ScriptedSource::statuses(&[DeploymentStatus::Running]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = DeploymentWaiter::new(&source).with_cancel(cancel).wait("demo", SECOND, SECOND).await?;
    assert!(outcome.cancelled);
    assert_eq!(outcome.polls, 0);
    assert_eq!(source.status_calls.load(Ordering::Relaxed), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn concurrent_waits_are_independent() -> anyhow::Result<()> {
    let fast = ScriptedSource::statuses(&[DeploymentStatus::Starting, DeploymentStatus::Running]);
    let slow = ScriptedSource::statuses(&[DeploymentStatus::Pending]);

    let fast_waiter = DeploymentWaiter::new(&fast);
    let slow_waiter = DeploymentWaiter::new(&slow);
    let (a, b) = tokio::join!(
        fast_waiter.wait("fast", SECOND, 10 * SECOND),
        slow_waiter.wait("slow", SECOND, 3 * SECOND),
    );

    let (a, b) = (a?, b?);
    assert_eq!(a.final_status, DeploymentStatus::Running);
    assert_eq!(a.polls, 2);
    assert!(b.timed_out);
    assert_eq!(b.polls, 3);
    Ok(())
}

/// Accepts every request and never answers.
struct HungSource {
    status: Option<DeploymentStatus>,
}

impl StatusSource for HungSource {
    fn status<'a>(
        &'a self,
        _project: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<DeploymentStatus, ApiError>> + Send + 'a>> {
        match self.status {
            Some(status) => Box::pin(async move { Ok(status) }),
            None => Box::pin(std::future::pending::<Result<DeploymentStatus, ApiError>>()),
        }
    }

    fn logs<'a>(
        &'a self,
        _project: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, ApiError>> + Send + 'a>> {
        Box::pin(std::future::pending::<Result<Vec<String>, ApiError>>())
    }
}

#[tokio::test(start_paused = true)]
async fn unanswered_poll_stops_at_deadline() -> anyhow::Result<()> {
    let source = HungSource { status: None };
    let outcome = DeploymentWaiter::new(&source).wait("demo", SECOND, 5 * SECOND).await?;

    assert!(outcome.timed_out);
    assert!(!outcome.terminal);
    assert_eq!(outcome.final_status, DeploymentStatus::Unknown);
    assert_eq!(outcome.polls, 1);
    assert_eq!(outcome.elapsed, 5 * SECOND);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn unanswered_poll_is_cancellable() -> anyhow::Result<()> {
    let source = HungSource { status: None };
    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(2 * SECOND).await;
        canceller.cancel();
    });

    let outcome = DeploymentWaiter::new(&source)
        .with_cancel(cancel)
        .wait("demo", SECOND, Duration::from_secs(u64::MAX))
        .await?;

    assert!(outcome.cancelled);
    assert!(!outcome.timed_out);
    assert_eq!(outcome.elapsed, 2 * SECOND);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn unanswered_log_fetch_is_bounded() -> anyhow::Result<()> {
    let source = HungSource { status: Some(DeploymentStatus::Error) };
    let outcome = DeploymentWaiter::new(&source).wait("demo", SECOND, 60 * SECOND).await?;

    assert!(outcome.terminal);
    assert_eq!(outcome.final_status, DeploymentStatus::Error);
    assert_eq!(outcome.logs, None);
    assert_eq!(outcome.elapsed, LOG_FETCH_TIMEOUT);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn unrepresentable_budget_means_no_deadline() -> anyhow::Result<()> {
    let source = ScriptedSource::statuses(&[
        DeploymentStatus::Pending,
        DeploymentStatus::Starting,
        DeploymentStatus::Running,
    ]);
    let outcome = DeploymentWaiter::new(&source)
        .wait("demo", SECOND, Duration::from_secs(u64::MAX))
        .await?;

    assert!(outcome.terminal);
    assert_eq!(outcome.final_status, DeploymentStatus::Running);
    assert_eq!(outcome.polls, 3);
    assert_eq!(outcome.elapsed, 2 * SECOND);
    Ok(())
}
