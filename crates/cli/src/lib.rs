// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

pub mod api;
pub mod auth;
pub mod command;
pub mod config;
pub mod credential;
pub mod deploy;
pub mod error;
pub mod test_support;
