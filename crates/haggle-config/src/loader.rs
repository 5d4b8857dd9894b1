// SPDX-FileCopyrightText: 2026 Haggle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./haggle.toml` > `~/.config/haggle/haggle.toml` > `/etc/haggle/haggle.toml`
//! with environment variable overrides via `HAGGLE_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::HaggleConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/haggle/haggle.toml` (system-wide)
/// 3. `~/.config/haggle/haggle.toml` (user XDG config)
/// 4. `./haggle.toml` (local directory)
/// 5. `HAGGLE_*` environment variables
pub fn load_config() -> Result<HaggleConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(HaggleConfig::default()))
        .merge(Toml::file("/etc/haggle/haggle.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("haggle/haggle.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("haggle.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a specific TOML string only (no XDG lookup).
///
/// Used for testing and for callers that supply config inline.
pub fn load_config_from_str(toml_content: &str) -> Result<HaggleConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(HaggleConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<HaggleConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(HaggleConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names. For example, `HAGGLE_SESSION_SEND_TIMEOUT_SECS`
/// must map to `session.send_timeout_secs`, not `session.send.timeout.secs`.
fn env_provider() -> Env {
    Env::prefixed("HAGGLE_").map(|key| {
        // `key` is the lowercased env var name with prefix stripped.
        // Example: HAGGLE_SESSION_SEND_TIMEOUT_SECS -> "session_send_timeout_secs"
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("session_", "session.", 1)
            .replacen("push_", "push.", 1)
            .replacen("roster_", "roster.", 1);
        mapped.into()
    })
}
