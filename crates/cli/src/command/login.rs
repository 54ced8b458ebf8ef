// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `neptune login`: browser login, or an API key saved as-is after a
//! `/users/me` check.

use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::api::ApiClient;
use crate::auth::browser::{Browser, NoBrowser, SystemBrowser};
use crate::auth::{AuthFlow, LoginOptions};
use crate::config::{ApiSettings, Config};
use crate::credential::Credential;
use crate::error::{AuthError, CliCode};

use super::{Reporter, EXIT_FAILURE, EXIT_INTERRUPTED, EXIT_OK};

#[derive(Debug, clap::Args)]
pub struct LoginArgs {
    /// Save this API key instead of logging in through the browser.
    #[arg(long)]
    pub api_key: Option<String>,

    /// Seconds to wait for the browser to complete login.
    #[arg(long, default_value_t = 300)]
    pub timeout: u64,

    /// Loopback port for the login redirect (0 picks a free one).
    #[arg(long, default_value_t = 0)]
    pub callback_port: u16,

    /// Print the login URL instead of opening a browser.
    #[arg(long)]
    pub no_browser: bool,
}

pub async fn run(config: &Config, args: &LoginArgs, out: &Reporter, cancel: CancellationToken) -> i32 {
    if config.token.is_some() {
        out.warn("NEPTUNE_ACCESS_TOKEN is set and takes precedence over the saved login.");
    }
    let base_url = config.login_base_url();

    if let Some(ref key) = args.api_key {
        return login_with_key(config, &base_url, key, out).await;
    }

    let browser: Box<dyn Browser> = if args.no_browser { Box::new(NoBrowser) } else { Box::new(SystemBrowser) };
    let flow = AuthFlow::new(config.credential_store())
        .with_browser(browser)
        .with_options(LoginOptions {
            timeout: Duration::from_secs(args.timeout),
            callback_port: args.callback_port,
        });

    match flow.login(&base_url, cancel).await {
        Ok(credential) => {
            out.line("Logged in to Neptune.");
            out.success(
                json!({ "api_url": credential.issued_for, "credentials_path": flow.store().path() }),
                Some("neptune deploy"),
            );
            EXIT_OK
        }
        Err(AuthError::Cancelled) => out.fail(
            CliCode::Interrupted.as_str(),
            "login cancelled",
            "",
            Some("neptune login"),
            EXIT_INTERRUPTED,
        ),
        Err(e) => out.fail(e.as_str(), &e.to_string(), &e.hint(), Some("neptune login"), EXIT_FAILURE),
    }
}

async fn login_with_key(config: &Config, base_url: &str, key: &str, out: &Reporter) -> i32 {
    let key = key.trim();
    if key.is_empty() {
        return out.fail(
            CliCode::InvalidConfig.as_str(),
            "API key is empty",
            "Pass the key shown in the Neptune console.",
            None,
            EXIT_FAILURE,
        );
    }

    let api = match ApiClient::new(ApiSettings::new(base_url, Some(key.to_owned()))) {
        Ok(api) => api,
        Err(e) => return out.fail(CliCode::InvalidConfig.as_str(), &format!("{e:#}"), "", None, EXIT_FAILURE),
    };
    let user = match api.current_user().await {
        Ok(user) => user,
        Err(e) => {
            return out.fail(
                CliCode::ApiError.as_str(),
                &format!("API key rejected: {e}"),
                "Check the key and the API URL.",
                Some("neptune login"),
                EXIT_FAILURE,
            )
        }
    };

    let store = config.credential_store();
    if let Err(e) = store.save(&Credential::new(key, base_url)) {
        return out.fail(e.as_str(), &e.to_string(), &e.hint(), None, EXIT_FAILURE);
    }
    let user_id = user.get("id").and_then(|v| v.as_str()).unwrap_or("unknown");
    out.line(&format!("Logged in to Neptune as {user_id}."));
    out.success(
        json!({ "api_url": base_url, "user_id": user_id, "credentials_path": store.path() }),
        Some("neptune deploy"),
    );
    EXIT_OK
}
