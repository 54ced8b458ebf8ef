// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `neptune status`: one-shot view of a project's deployment.

use serde_json::json;

use crate::api::{ApiError, ProjectResponse};
use crate::config::{resolve_project_name, Config};
use crate::deploy::DeploymentStatus;
use crate::error::CliCode;

use super::{authed_client, Reporter, EXIT_FAILURE, EXIT_INVALID_CONFIG, EXIT_OK, EXIT_UNREACHABLE};

#[derive(Debug, clap::Args)]
pub struct StatusArgs {
    /// Project to inspect; defaults to the one in the working directory.
    #[arg(long)]
    pub project_name: Option<String>,
}

pub async fn run(config: &Config, args: &StatusArgs, out: &Reporter) -> i32 {
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

    match api.get_project(&project).await {
        Ok(info) => {
            let status = info.deployment_status();
            render(out, &info, status);
            out.success(
                json!({
                    "project": info.name,
                    "condition": status,
                    "provisioning_state": info.provisioning_state,
                    "url": info.url(),
                    "resources": info.resources,
                }),
                next_action(status),
            );
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
            out.fail(CliCode::ApiError.as_str(), &e.to_string(), "", Some("neptune status"), exit)
        }
    }
}

fn render(out: &Reporter, info: &ProjectResponse, status: DeploymentStatus) {
    out.line(&format!("Project:   {}", info.name));
    if let Some(ref kind) = info.kind {
        out.line(&format!("Kind:      {kind}"));
    }
    if let Some(ref provisioning) = info.provisioning_state {
        out.line(&format!("Provision: {provisioning}"));
    }
    out.line(&format!("Status:    {status}"));
    if let Some(url) = info.url() {
        out.line(&format!("URL:       {url}"));
    }
    for resource in &info.resources {
        let state = resource.status.as_deref().unwrap_or("unknown");
        out.line(&format!("  {} {}: {state}", resource.kind, resource.name));
    }
}

fn next_action(status: DeploymentStatus) -> Option<&'static str> {
    match status {
        DeploymentStatus::Running => None,
        DeploymentStatus::Error => Some("neptune logs"),
        DeploymentStatus::Stopped => Some("neptune deploy"),
        _ => Some("neptune wait"),
    }
}
