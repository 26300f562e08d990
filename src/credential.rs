//! GitHub credential resolution.
//!
//! The token is resolved through a chain, first non-empty value wins:
//!
//! 1. `GITHUB_API_TOKEN`
//! 2. `GH_TOKEN` (what `gh` itself reads)
//!
//! Resolution happens before any remote call so a missing token fails fast.

use std::env;

use crate::config::ConfigError;

/// Environment variables checked, in order.
pub const TOKEN_VARS: [&str; 2] = ["GITHUB_API_TOKEN", "GH_TOKEN"];

/// Resolve the access token from the process environment.
pub fn resolve_token() -> Result<String, ConfigError> {
    resolve_token_from(|name| env::var(name).ok())
}

/// Resolve the access token through `lookup`, which maps a variable name to its value.
pub fn resolve_token_from(lookup: impl Fn(&str) -> Option<String>) -> Result<String, ConfigError> {
    TOKEN_VARS
        .iter()
        .find_map(|name| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()))
        .ok_or(ConfigError::MissingCredential)
}
