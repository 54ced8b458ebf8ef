// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Opening the authorization URL for the user.

use anyhow::Context;

/// Something that can show a URL to the user.
pub trait Browser: Send + Sync {
    fn open(&self, url: &str) -> anyhow::Result<()>;
}

/// The platform's default browser.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl Browser for SystemBrowser {
    fn open(&self, url: &str) -> anyhow::Result<()> {
        open::that_detached(url).context("failed to launch browser")
    }
}

/// Never launches anything, so the caller prints the URL instead.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBrowser;

impl Browser for NoBrowser {
    fn open(&self, _url: &str) -> anyhow::Result<()> {
        anyhow::bail!("browser launch disabled")
    }
}
