// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI subcommands: `login`, `logout`, `status`, `logs`, `wait`.
//!
//! Each returns a process exit code. In JSON mode every command prints
//! exactly one object on stdout; human output and warnings go to stderr.

pub mod login;
pub mod logout;
pub mod logs;
pub mod status;
pub mod wait;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::api::ApiClient;
use crate::config::{ApiSettings, Commands, Config, OutputMode};
use crate::error::CliCode;

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_INVALID_CONFIG: i32 = 2;
pub const EXIT_WAIT_TIMEOUT: i32 = 3;
pub const EXIT_UNREACHABLE: i32 = 4;
pub const EXIT_INTERRUPTED: i32 = 130;

/// Dispatch a parsed command line.
pub async fn run(config: Config) -> i32 {
    let out = match config.output_mode() {
        Ok(mode) => Reporter::new(mode),
        Err(e) => {
            eprintln!("error: {e}");
            return EXIT_INVALID_CONFIG;
        }
    };
    match config.command {
        Commands::Login(ref args) => login::run(&config, args, &out, spawn_signal_handler()).await,
        Commands::Logout => logout::run(&config, &out).await,
        Commands::Status(ref args) => status::run(&config, args, &out).await,
        Commands::Logs(ref args) => logs::run(&config, args, &out).await,
        Commands::Wait(ref args) => wait::run(&config, args, &out, spawn_signal_handler()).await,
    }
}

/// Cancel the returned token on SIGINT or SIGTERM.
///
/// Only long-running commands install this; the rest keep the default
/// signal disposition.
pub fn spawn_signal_handler() -> CancellationToken {
    let shutdown = CancellationToken::new();
    let sd = shutdown.clone();
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = signal(SignalKind::terminate()).ok();
            let mut sigint = signal(SignalKind::interrupt()).ok();
            tokio::select! {
                _ = async {
                    if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
                } => info!("received SIGTERM"),
                _ = async {
                    if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
                } => info!("received SIGINT"),
            }
        }
        #[cfg(not(unix))]
        {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("received Ctrl-C");
            }
        }
        sd.cancel();
    });
    shutdown
}

/// Build an authenticated client, or report why there is none.
pub(crate) fn authed_client(config: &Config, out: &Reporter) -> Result<ApiClient, i32> {
    let settings: ApiSettings = match config.api_settings() {
        Ok(settings) => settings,
        Err(e) => {
            let next = Some("neptune login");
            return Err(out.fail(e.as_str(), &e.to_string(), &e.hint(), next, EXIT_FAILURE));
        }
    };
    if settings.access_token.is_none() {
        return Err(out.fail(
            CliCode::NotLoggedIn.as_str(),
            "not logged in",
            "Run `neptune login`, or set NEPTUNE_ACCESS_TOKEN.",
            Some("neptune login"),
            EXIT_FAILURE,
        ));
    }
    ApiClient::new(settings).map_err(|e| {
        out.fail(CliCode::InvalidConfig.as_str(), &format!("{e:#}"), "", None, EXIT_INVALID_CONFIG)
    })
}

/// Renders results for humans or as one JSON object per command.
#[derive(Debug, Clone, Copy)]
pub struct Reporter {
    mode: OutputMode,
}

impl Reporter {
    pub fn new(mode: OutputMode) -> Self {
        Self { mode }
    }

    pub fn is_json(&self) -> bool {
        self.mode == OutputMode::Json
    }

    /// Human-readable line on stdout. Suppressed in JSON mode.
    pub fn line(&self, msg: &str) {
        if !self.is_json() {
            println!("{msg}");
        }
    }

    /// Warning on stderr. Suppressed in JSON mode.
    pub fn warn(&self, msg: &str) {
        if !self.is_json() {
            eprintln!("warning: {msg}");
        }
    }

    /// Emit the success object. `fields` must be a JSON object.
    pub fn success(&self, mut fields: Value, next_action: Option<&str>) {
        if !self.is_json() {
            return;
        }
        if let Some(obj) = fields.as_object_mut() {
            obj.insert("ok".to_owned(), Value::Bool(true));
            obj.insert("next_action_command".to_owned(), json!(next_action));
        }
        println!("{fields}");
    }

    /// Report a failure and hand back `exit_code`.
    pub fn fail(
        &self,
        code: &str,
        message: &str,
        hint: &str,
        next_action: Option<&str>,
        exit_code: i32,
    ) -> i32 {
        self.fail_with(code, message, hint, next_action, json!({}), exit_code)
    }

    /// [`Reporter::fail`] with extra fields merged into the JSON object.
    pub fn fail_with(
        &self,
        code: &str,
        message: &str,
        hint: &str,
        next_action: Option<&str>,
        mut extra: Value,
        exit_code: i32,
    ) -> i32 {
        if self.is_json() {
            if let Some(obj) = extra.as_object_mut() {
                obj.insert("ok".to_owned(), Value::Bool(false));
                obj.insert("error".to_owned(), json!(message));
                obj.insert("code".to_owned(), json!(code));
                obj.insert("hint".to_owned(), json!(hint));
                obj.insert("next_action_command".to_owned(), json!(next_action));
            }
            println!("{extra}");
        } else {
            eprintln!("error: {message}");
            if !hint.is_empty() {
                eprintln!("hint: {hint}");
            }
        }
        exit_code
    }
}
