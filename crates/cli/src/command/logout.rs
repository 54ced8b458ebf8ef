// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde_json::json;

use crate::auth::AuthFlow;
use crate::config::Config;

use super::{Reporter, EXIT_FAILURE, EXIT_OK};

pub async fn run(config: &Config, out: &Reporter) -> i32 {
    let flow = AuthFlow::new(config.credential_store());
    match flow.logout().await {
        Ok(removed) => {
            out.line(if removed { "Logged out of Neptune." } else { "Not logged in." });
            out.success(json!({ "removed": removed }), Some("neptune login"));
            EXIT_OK
        }
        Err(e) => out.fail(e.as_str(), &e.to_string(), &e.hint(), None, EXIT_FAILURE),
    }
}
