// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Engine-level configuration.
//!
//! [`EngineConfig`] is the single entry point for tuning the spell engine at
//! construction time.  Every field has a default, so `EngineConfig::default()`
//! is always a valid starting point and partial TOML files deserialise.

use serde::{Deserialize, Serialize};

/// Top-level configuration for [`SpellRegistry`](crate::registry::SpellRegistry).
///
/// # Examples
///
/// ```rust
/// use spellbook_core::config::EngineConfig;
///
/// let config = EngineConfig {
///     host_id: "12D3KooWHost".into(),
///     ..EngineConfig::default()
/// };
/// assert_eq!(config.max_error_invocations, 50);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Peer id of the host the engine runs on.  Callers presenting this id
    /// hold the host role.
    pub host_id: String,

    /// How many failing invocations keep their errors per spell.
    pub max_error_invocations: usize,

    /// Upper bound on how long the runtime's timer task sleeps when no
    /// timer is armed, in milliseconds.
    pub idle_wakeup_ms: u64,

    /// Alias under which a worker registers its installation spell.
    pub worker_spell_alias: String,

    /// Log lines kept per spell; the oldest is dropped first.
    pub max_logs: usize,

    /// Inbox messages kept per spell; the oldest is dropped first.
    pub max_inbox_messages: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host_id:               "host".to_owned(),
            max_error_invocations: 50,
            idle_wakeup_ms:        60_000,
            worker_spell_alias:    "worker-spell".to_owned(),
            max_logs:              50,
            max_inbox_messages:    50,
        }
    }
}
