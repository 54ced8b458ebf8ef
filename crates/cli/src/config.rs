// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::command::login::LoginArgs;
use crate::command::logs::LogsArgs;
use crate::command::status::StatusArgs;
use crate::command::wait::WaitArgs;
use crate::credential::{self, Credential, CredentialStore};
use crate::error::StorageError;

pub const PRODUCTION_BASE_URL: &str = "https://neptune.shuttle.dev/v1";
pub const LOCAL_BASE_URL: &str = "http://localhost:8000/v1";

/// Project manifest read when no project name is given.
pub const PROJECT_MANIFEST: &str = "neptune.json";
/// Project name written by `neptune deploy`, relative to the working directory.
pub const PROJECT_NAME_FILE: &str = ".neptune/project_name";

/// How command results are rendered on stdout.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    #[default]
    Normal,
    Json,
}

impl std::fmt::Display for OutputMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => f.write_str("normal"),
            Self::Json => f.write_str("json"),
        }
    }
}

impl std::str::FromStr for OutputMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "normal" | "text" => Ok(Self::Normal),
            "json" => Ok(Self::Json),
            other => anyhow::bail!("invalid output mode: {other} (expected normal or json)"),
        }
    }
}

/// Deploy and watch projects on Neptune.
#[derive(Debug, Parser)]
#[command(name = "neptune", version, about)]
pub struct Config {
    /// API base URL.
    #[arg(long, global = true, env = "NEPTUNE_API_BASE_URL")]
    pub api_url: Option<String>,

    /// Access token; overrides the saved credential.
    #[arg(long, global = true, env = "NEPTUNE_ACCESS_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Directory holding credentials.json.
    #[arg(long, global = true, env = "NEPTUNE_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    /// Output mode (normal, json).
    #[arg(long, global = true, env = "NEPTUNE_OUTPUT_MODE", default_value = "normal")]
    pub output: String,

    /// Project directory.
    #[arg(long = "working-directory", visible_alias = "wd", global = true, default_value = ".")]
    pub working_directory: PathBuf,

    /// Log level filter (e.g. warn, debug, neptune=trace).
    #[arg(long, global = true, env = "NEPTUNE_LOG_LEVEL", default_value = "warn")]
    pub log_level: String,

    /// Log format (text, json).
    #[arg(long, global = true, env = "NEPTUNE_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Log in through the browser, or save an API key.
    Login(LoginArgs),
    /// Delete the saved credential.
    Logout,
    /// Show the deployment status of a project.
    Status(StatusArgs),
    /// Print recent logs of a project.
    Logs(LogsArgs),
    /// Block until a deployment is running, failed, or stopped.
    Wait(WaitArgs),
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        self.output_mode()?;
        match self.log_format.as_str() {
            "text" | "json" => {}
            other => anyhow::bail!("invalid log format: {other} (expected text or json)"),
        }
        if let Some(ref url) = self.api_url {
            validate_base_url(url)?;
        }
        if let Commands::Wait(ref args) = self.command {
            args.validate()?;
        }
        Ok(())
    }

    pub fn output_mode(&self) -> anyhow::Result<OutputMode> {
        self.output.parse()
    }

    pub fn config_dir(&self) -> PathBuf {
        credential::config_dir(self.config_dir.as_deref())
    }

    pub fn credential_store(&self) -> CredentialStore {
        CredentialStore::new(self.config_dir())
    }

    /// Base URL used when neither a flag nor a saved credential names one.
    pub fn default_base_url(&self) -> &'static str {
        default_base_url(std::env::var("NEPTUNE_API_ENV").ok().as_deref())
    }

    /// Base URL for a fresh login: the explicit one, else the default.
    pub fn login_base_url(&self) -> String {
        normalize_base_url(self.api_url.as_deref().unwrap_or(self.default_base_url()))
    }

    /// Effective API settings, loading the saved credential if needed.
    pub fn api_settings(&self) -> Result<ApiSettings, StorageError> {
        let stored = match self.token {
            Some(_) => None,
            None => self.credential_store().load()?,
        };
        Ok(ApiSettings::resolve(
            self.api_url.as_deref(),
            self.token.as_deref(),
            stored.as_ref(),
            self.default_base_url(),
        ))
    }
}

pub fn default_base_url(api_env: Option<&str>) -> &'static str {
    match api_env {
        Some(env) if env.eq_ignore_ascii_case("local") => LOCAL_BASE_URL,
        _ => PRODUCTION_BASE_URL,
    }
}

pub fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_owned()
}

pub fn validate_base_url(url: &str) -> anyhow::Result<()> {
    let parsed = reqwest::Url::parse(url.trim()).with_context(|| format!("invalid API URL: {url}"))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => anyhow::bail!("invalid API URL scheme: {other} (expected http or https)"),
    }
}

/// Where and as whom to talk to the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiSettings {
    pub base_url: String,
    pub access_token: Option<String>,
}

impl ApiSettings {
    pub fn new(base_url: &str, access_token: Option<String>) -> Self {
        Self { base_url: normalize_base_url(base_url), access_token }
    }

    /// Explicit values win, then the saved credential, then `default_base`.
    ///
    /// A saved token is only used against the base URL it was issued for.
    pub fn resolve(
        api_url: Option<&str>,
        token: Option<&str>,
        stored: Option<&Credential>,
        default_base: &str,
    ) -> Self {
        let base_url = normalize_base_url(
            api_url.or(stored.map(|c| c.issued_for.as_str())).unwrap_or(default_base),
        );
        let access_token = match token {
            Some(token) => Some(token.to_owned()),
            None => stored
                .filter(|c| normalize_base_url(&c.issued_for) == base_url)
                .map(|c| c.access_token.clone()),
        };
        Self { base_url, access_token }
    }
}

/// Name the project in `dir`: explicit, then `neptune.json` (`name` or
/// `spec.name`), then `.neptune/project_name`, then the directory name.
pub fn resolve_project_name(explicit: Option<&str>, dir: &Path) -> anyhow::Result<String> {
    if let Some(name) = explicit.map(str::trim).filter(|s| !s.is_empty()) {
        return Ok(name.to_owned());
    }

    let manifest = dir.join(PROJECT_MANIFEST);
    if manifest.exists() {
        let contents = std::fs::read_to_string(&manifest)
            .with_context(|| format!("reading {}", manifest.display()))?;
        let value: serde_json::Value = serde_json::from_str(&contents)
            .with_context(|| format!("parsing {}", manifest.display()))?;
        let name = value
            .get("name")
            .or_else(|| value.get("spec").and_then(|spec| spec.get("name")))
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty());
        if let Some(name) = name {
            return Ok(name.to_owned());
        }
    }

    if let Ok(saved) = std::fs::read_to_string(dir.join(PROJECT_NAME_FILE)) {
        let saved = saved.trim();
        if !saved.is_empty() {
            return Ok(saved.to_owned());
        }
    }

    let canonical = dir.canonicalize().with_context(|| format!("resolving {}", dir.display()))?;
    match canonical.file_name().and_then(|n| n.to_str()) {
        Some(name) if !name.is_empty() => Ok(name.to_owned()),
        _ => anyhow::bail!(
            "could not determine the project name in {}; pass --project-name",
            dir.display()
        ),
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
