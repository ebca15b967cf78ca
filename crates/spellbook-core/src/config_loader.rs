// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Configuration loader for [`EngineConfig`].
//!
//! Supports two load strategies:
//!
//! 1. **TOML file**: [`load_config`] reads and deserialises a TOML file.
//!    Missing fields take their defaults.
//! 2. **Environment variables**: [`load_config_from_env`] reads
//!    `SPELLBOOK_`-prefixed variables on top of the defaults.
//!
//! # File format
//!
//! ```toml
//! host_id               = "12D3KooWHost"
//! max_error_invocations = 50
//! idle_wakeup_ms        = 60000
//! worker_spell_alias    = "worker-spell"
//! max_logs              = 50
//! max_inbox_messages    = 50
//! ```
//!
//! # Environment variables
//!
//! | Variable                          | Type    | Default          |
//! |-----------------------------------|---------|------------------|
//! | `SPELLBOOK_HOST_ID`               | string  | "host"           |
//! | `SPELLBOOK_MAX_ERROR_INVOCATIONS` | integer | 50               |
//! | `SPELLBOOK_IDLE_WAKEUP_MS`        | integer | 60000            |
//! | `SPELLBOOK_WORKER_SPELL_ALIAS`    | string  | "worker-spell"   |
//! | `SPELLBOOK_MAX_LOGS`              | integer | 50               |
//! | `SPELLBOOK_MAX_INBOX_MESSAGES`    | integer | 50               |

// Only compile this module when the "config-loader" feature is enabled.
#![cfg(feature = "config-loader")]

use std::fs;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;

use crate::config::EngineConfig;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Errors that can occur while loading or parsing engine configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required file could not be opened.
    #[error("failed to read config file \"{path}\": {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be deserialised.
    #[error("failed to parse TOML config: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// A field could not be parsed to its expected type.
    #[error("field \"{field}\": cannot parse \"{value}\": {reason}")]
    ParseField {
        field: String,
        value: String,
        reason: String,
    },

    /// A field value is outside the permitted range.
    #[error("field \"{field}\": value \"{value}\" out of range: {reason}")]
    InvalidRange {
        field: String,
        value: String,
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// TOML loader
// ---------------------------------------------------------------------------

/// Load an [`EngineConfig`] from a TOML file.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read, if the TOML does
/// not match the schema, or if a numeric field is zero.
///
/// # Example
///
/// ```rust,no_run
/// use spellbook_core::config_loader::load_config;
///
/// let config = load_config("/etc/spellbook/engine.toml").unwrap();
/// println!("host: {}", config.host_id);
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<EngineConfig, ConfigError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
        path: path.display().to_string(),
        source,
    })?;
    load_config_from_str(&content)
}

/// Parse an [`EngineConfig`] from TOML text.
///
/// ```rust
/// use spellbook_core::config_loader::load_config_from_str;
///
/// let config = load_config_from_str("host_id = \"h1\"").unwrap();
/// assert_eq!(config.host_id, "h1");
/// assert_eq!(config.idle_wakeup_ms, 60_000);
/// ```
pub fn load_config_from_str(content: &str) -> Result<EngineConfig, ConfigError> {
    let config = toml::from_str::<EngineConfig>(content)?;
    check_ranges(&config, str::to_owned)?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Environment variable loader
// ---------------------------------------------------------------------------

/// Load an [`EngineConfig`] from `SPELLBOOK_`-prefixed environment variables.
///
/// Unset variables fall back to their defaults.
///
/// # Errors
///
/// Returns [`ConfigError::ParseField`] if a numeric variable does not parse,
/// or [`ConfigError::InvalidRange`] if it is zero.
pub fn load_config_from_env() -> Result<EngineConfig, ConfigError> {
    load_config_with(|key| std::env::var(key).ok())
}

/// Same as [`load_config_from_env`], reading variables through `lookup`.
pub fn load_config_with(lookup: impl Fn(&str) -> Option<String>) -> Result<EngineConfig, ConfigError> {
    let defaults = EngineConfig::default();
    let config = EngineConfig {
        host_id: lookup("SPELLBOOK_HOST_ID").unwrap_or(defaults.host_id),
        max_error_invocations: read_env(
            &lookup,
            "SPELLBOOK_MAX_ERROR_INVOCATIONS",
            defaults.max_error_invocations,
        )?,
        idle_wakeup_ms: read_env(&lookup, "SPELLBOOK_IDLE_WAKEUP_MS", defaults.idle_wakeup_ms)?,
        worker_spell_alias: lookup("SPELLBOOK_WORKER_SPELL_ALIAS").unwrap_or(defaults.worker_spell_alias),
        max_logs: read_env(&lookup, "SPELLBOOK_MAX_LOGS", defaults.max_logs)?,
        max_inbox_messages: read_env(&lookup, "SPELLBOOK_MAX_INBOX_MESSAGES", defaults.max_inbox_messages)?,
    };
    check_ranges(&config, |field| format!("SPELLBOOK_{}", field.to_uppercase()))?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn read_env<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(val) => val.trim().parse::<T>().map_err(|source| ConfigError::ParseField {
            field: key.to_owned(),
            value: val.clone(),
            reason: source.to_string(),
        }),
        None => Ok(default),
    }
}

/// Every numeric field must be at least 1.  `field_name` maps a field to the
/// name reported in errors.
fn check_ranges(config: &EngineConfig, field_name: impl Fn(&str) -> String) -> Result<(), ConfigError> {
    let limits = [
        ("max_error_invocations", config.max_error_invocations as u64),
        ("idle_wakeup_ms",        config.idle_wakeup_ms),
        ("max_logs",              config.max_logs as u64),
        ("max_inbox_messages",    config.max_inbox_messages as u64),
    ];
    match limits.iter().find(|(_, value)| *value == 0) {
        Some((field, _)) => Err(ConfigError::InvalidRange {
            field: field_name(*field),
            value: "0".into(),
            reason: "must be >= 1".into(),
        }),
        None => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() {
        assert_eq!(load_config_with(env(&[])).unwrap(), EngineConfig::default());
    }

    #[test]
    fn environment_overrides_every_field() {
        let config = load_config_with(env(&[
            ("SPELLBOOK_HOST_ID", "h"),
            ("SPELLBOOK_MAX_ERROR_INVOCATIONS", " 7 "),
            ("SPELLBOOK_IDLE_WAKEUP_MS", "250"),
            ("SPELLBOOK_WORKER_SPELL_ALIAS", "installer"),
            ("SPELLBOOK_MAX_LOGS", "5"),
            ("SPELLBOOK_MAX_INBOX_MESSAGES", "9"),
        ]))
        .unwrap();
        assert_eq!(config.max_logs, 5);
        assert_eq!(config.max_inbox_messages, 9);
        assert_eq!(config.host_id, "h");
        assert_eq!(config.max_error_invocations, 7);
        assert_eq!(config.idle_wakeup_ms, 250);
        assert_eq!(config.worker_spell_alias, "installer");
    }

    #[test]
    fn unparsable_number_is_reported() {
        let err = load_config_with(env(&[("SPELLBOOK_IDLE_WAKEUP_MS", "soon")])).unwrap_err();
        assert!(matches!(err, ConfigError::ParseField { ref field, .. } if field == "SPELLBOOK_IDLE_WAKEUP_MS"));
    }

    #[test]
    fn zero_retention_is_out_of_range() {
        let err = load_config_with(env(&[("SPELLBOOK_MAX_ERROR_INVOCATIONS", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRange { .. }));
        assert!(load_config_from_str("idle_wakeup_ms = 0").is_err());
    }

    #[test]
    fn zero_caps_name_the_offending_field() {
        let err = load_config_with(env(&[("SPELLBOOK_MAX_INBOX_MESSAGES", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRange { ref field, .. } if field == "SPELLBOOK_MAX_INBOX_MESSAGES"));
        let err = load_config_from_str("max_logs = 0").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRange { ref field, .. } if field == "max_logs"));
    }

    #[test]
    fn toml_type_errors_surface() {
        let err = load_config_from_str("max_error_invocations = \"many\"").unwrap_err();
        assert!(matches!(err, ConfigError::TomlParse(_)));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_config("/nonexistent/spellbook.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/spellbook.toml"));
    }
}
