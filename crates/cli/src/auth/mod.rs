// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Browser-delegated login and logout.
//!
//! Login binds a loopback listener, sends the user to the provider with a
//! fresh CSRF state, waits for the redirect, verifies the state, trades the
//! code for a token, and saves the credential. The listener is closed before
//! the exchange starts.

pub mod browser;
pub mod callback;
pub mod state;

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::api::ApiClient;
use crate::config::{normalize_base_url, ApiSettings};
use crate::credential::{Credential, CredentialStore};
use crate::error::{AuthError, StorageError, CALLBACK_MISSING_CODE};

use self::browser::{Browser, SystemBrowser};
use self::callback::{CallbackListener, CallbackResult};
use self::state::OAuthState;

pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginOptions {
    /// How long to wait for the redirect.
    pub timeout: Duration,
    /// Loopback port for the redirect; 0 picks a free one.
    pub callback_port: u16,
}

impl Default for LoginOptions {
    fn default() -> Self {
        Self { timeout: DEFAULT_LOGIN_TIMEOUT, callback_port: 0 }
    }
}

pub struct AuthFlow {
    store: CredentialStore,
    browser: Box<dyn Browser>,
    options: LoginOptions,
}

impl AuthFlow {
    pub fn new(store: CredentialStore) -> Self {
        Self { store, browser: Box::new(SystemBrowser), options: LoginOptions::default() }
    }

    pub fn with_browser(mut self, browser: Box<dyn Browser>) -> Self {
        self.browser = browser;
        self
    }

    pub fn with_options(mut self, options: LoginOptions) -> Self {
        self.options = options;
        self
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Run the browser login against `base_url` and persist the credential.
    ///
    /// Nothing is written unless the state verifies and the exchange succeeds.
    pub async fn login(
        &self,
        base_url: &str,
        cancel: CancellationToken,
    ) -> Result<Credential, AuthError> {
        let base_url = normalize_base_url(base_url);
        let api = ApiClient::new(ApiSettings::new(&base_url, None))
            .map_err(|e| AuthError::ExchangeFailed(format!("{e:#}")))?;

        let state = OAuthState::generate();
        let listener = CallbackListener::bind(self.options.callback_port)
            .await
            .map_err(|e| AuthError::Listener(e.to_string()))?;
        let redirect_uri = listener.redirect_uri();
        let auth_url = authorize_url(&base_url, &redirect_uri, state.as_str())?;

        match self.browser.open(auth_url.as_str()) {
            Ok(()) => eprintln!(
                "Opening the browser to log in. If it does not open, visit:\n\n    {auth_url}\n"
            ),
            Err(e) => {
                warn!(err = %e, "could not open a browser");
                eprintln!("Open this URL in a browser to log in:\n\n    {auth_url}\n");
            }
        }

        let result = listener.start(state.as_str(), self.options.timeout, cancel).await;
        let code = accept_callback(state, result)?;

        let token = api
            .exchange_code(&code, &redirect_uri)
            .await
            .map_err(|e| AuthError::ExchangeFailed(e.to_string()))?;
        let credential = Credential::new(token, base_url);
        self.store.save(&credential)?;
        info!(issued_for = %credential.issued_for, "logged in");
        Ok(credential)
    }

    /// Delete the saved credential, then tell the API it was issued for.
    ///
    /// Returns whether a credential existed. The server notification is
    /// best-effort; local state is cleared even if it fails.
    pub async fn logout(&self) -> Result<bool, StorageError> {
        let previous = self.store.load().unwrap_or_else(|e| {
            warn!(err = %e, "discarding unreadable credential");
            None
        });
        let removed = self.store.clear()?;

        if let Some(credential) = previous {
            let settings =
                ApiSettings::new(&credential.issued_for, Some(credential.access_token.clone()));
            match ApiClient::new(settings) {
                Ok(api) => {
                    if let Err(e) = api.logout().await {
                        warn!(err = %e, "server logout failed; local credential removed");
                    }
                }
                Err(e) => warn!(err = %e, "server logout skipped"),
            }
        }
        info!(removed, "logged out");
        Ok(removed)
    }
}

/// `{base}/auth/login?redirect_uri=..&state=..`
pub fn authorize_url(
    base_url: &str,
    redirect_uri: &str,
    state: &str,
) -> Result<reqwest::Url, AuthError> {
    let mut url = reqwest::Url::parse(&format!("{base_url}/auth/login"))
        .map_err(|e| AuthError::InvalidBaseUrl(format!("{base_url}: {e}")))?;
    url.query_pairs_mut().append_pair("redirect_uri", redirect_uri).append_pair("state", state);
    Ok(url)
}

/// Check a callback against the state it must echo; yields the code.
fn accept_callback(state: OAuthState, result: CallbackResult) -> Result<String, AuthError> {
    if let Some(reason) = result.error {
        return Err(AuthError::from_callback(&reason));
    }
    if !state.verify(result.state.as_deref()) {
        return Err(AuthError::StateMismatch);
    }
    result
        .code
        .filter(|code| !code.is_empty())
        .ok_or_else(|| AuthError::Denied(CALLBACK_MISSING_CODE.to_owned()))
}

#[cfg(test)]
#[path = "flow_tests.rs"]
mod tests;
