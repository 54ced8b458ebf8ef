// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde_json::json;

use crate::api::ApiError;
use crate::config::{resolve_project_name, Config};
use crate::error::CliCode;

use super::{authed_client, Reporter, EXIT_FAILURE, EXIT_INVALID_CONFIG, EXIT_OK, EXIT_UNREACHABLE};

#[derive(Debug, clap::Args)]
pub struct LogsArgs {
    /// Project whose logs to print; defaults to the one in the working directory.
    #[arg(long)]
    pub project_name: Option<String>,
}

pub async fn run(config: &Config, args: &LogsArgs, out: &Reporter) -> i32 {
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

    match api.get_logs(&project).await {
        Ok(lines) => {
            if lines.is_empty() {
                out.line("No logs available.");
            }
            for line in &lines {
                out.line(line);
            }
            out.success(json!({ "project": project, "logs": lines }), None);
            EXIT_OK
        }
        Err(ApiError::NotFound) => out.fail(
            CliCode::ApiError.as_str(),
            &format!("project '{project}' not found"),
            "Deploy it first with `neptune deploy`.",
            Some("neptune deploy"),
            EXIT_FAILURE,
        ),
        Err(e) => {
            let exit = if e.is_transient() { EXIT_UNREACHABLE } else { EXIT_FAILURE };
            out.fail(CliCode::ApiError.as_str(), &e.to_string(), "", Some("neptune logs"), exit)
        }
    }
}
