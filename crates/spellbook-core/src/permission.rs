// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Key-prefix permission guard.
//!
//! Every key in a spell's store belongs to a scope derived from its prefix
//! (the text before the first `_`):
//!
//! | prefix | scope        | writable by                |
//! |--------|--------------|----------------------------|
//! | `h_`   | host         | the spell, the host        |
//! | `w_`   | worker       | the spell, its worker      |
//! | `hw_`  | worker+host  | the spell, host and worker |
//! | other  | private      | the spell only             |
//!
//! The prefix must match exactly, so `wh_count` and `hword_count` are
//! private keys.  Reads are never restricted.

use serde::{Deserialize, Serialize};

use crate::error::SpellError;
use crate::types::{Caller, SpellId};

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// Authority a caller holds relative to a target spell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// The target spell itself, calling from its own script.
    Spell,
    /// The host peer.
    Host,
    /// The worker that owns the target spell.
    Worker,
}

impl Role {
    /// Human-readable role name for errors and logs.
    pub fn display_name(self) -> &'static str {
        match self {
            Role::Spell  => "the spell itself",
            Role::Host   => "the host",
            Role::Worker => "the worker",
        }
    }
}

/// Describe an optional role, naming callers without one.
pub fn role_name(role: Option<Role>) -> &'static str {
    role.map_or("an outside peer", Role::display_name)
}

// ---------------------------------------------------------------------------
// Key scopes
// ---------------------------------------------------------------------------

/// Write scope of a key, derived from its prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyScope {
    Private,
    Worker,
    Host,
    WorkerHost,
}

impl KeyScope {
    /// Classify `key` by its prefix.
    ///
    /// ```rust
    /// use spellbook_core::permission::KeyScope;
    ///
    /// assert_eq!(KeyScope::classify("h_count"), KeyScope::Host);
    /// assert_eq!(KeyScope::classify("hw_count"), KeyScope::WorkerHost);
    /// assert_eq!(KeyScope::classify("wh_count"), KeyScope::Private);
    /// assert_eq!(KeyScope::classify("w"), KeyScope::Private);
    /// ```
    pub fn classify(key: &str) -> Self {
        match key.split_once('_') {
            Some(("h", _))  => KeyScope::Host,
            Some(("w", _))  => KeyScope::Worker,
            Some(("hw", _)) => KeyScope::WorkerHost,
            _ => KeyScope::Private,
        }
    }

    /// Whether `role` may write keys of this scope.
    pub fn permits(self, role: Role) -> bool {
        match role {
            Role::Spell  => true,
            Role::Host   => matches!(self, KeyScope::Host | KeyScope::WorkerHost),
            Role::Worker => matches!(self, KeyScope::Worker | KeyScope::WorkerHost),
        }
    }
}

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

/// Where a target spell lives: its id, owning worker, and host.
#[derive(Debug, Clone, Copy)]
pub struct Location<'a> {
    pub spell_id: &'a SpellId,
    pub worker_id: &'a str,
    pub host_id: &'a str,
}

/// Resolve the role `caller` holds over the spell at `location`.
///
/// A spell acting on itself is recognised first; the host check precedes
/// the worker check, so a spell owned by the host is addressed as host.
pub fn authenticate(caller: &Caller, location: &Location<'_>) -> Option<Role> {
    let is_self = caller.spell_id.as_ref() == Some(location.spell_id);
    if is_self && caller.peer_id == location.worker_id {
        Some(Role::Spell)
    } else if caller.peer_id == location.host_id {
        Some(Role::Host)
    } else if caller.peer_id == location.worker_id {
        Some(Role::Worker)
    } else {
        None
    }
}

/// Fail with [`SpellError::WriteForbidden`] unless `role` may write `key`.
pub fn check_write(role: Option<Role>, key: &str) -> Result<(), SpellError> {
    let allowed = role.is_some_and(|role| KeyScope::classify(key).permits(role));
    if allowed {
        Ok(())
    } else {
        Err(SpellError::WriteForbidden {
            key: key.to_owned(),
            role: role_name(role),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const KEYS: [&str; 6] = ["h_value", "w_value", "hw_value", "wh_value", "hword_value", "value"];

    fn location(spell_id: &SpellId) -> Location<'_> {
        Location {
            spell_id,
            worker_id: "worker",
            host_id: "host",
        }
    }

    fn writable(role: Option<Role>) -> Vec<&'static str> {
        KEYS.iter().copied().filter(|key| check_write(role, key).is_ok()).collect()
    }

    #[test]
    fn spell_writes_every_scope() {
        assert_eq!(writable(Some(Role::Spell)), KEYS.to_vec());
    }

    #[test]
    fn host_writes_only_host_scopes() {
        assert_eq!(writable(Some(Role::Host)), vec!["h_value", "hw_value"]);
    }

    #[test]
    fn worker_writes_only_worker_scopes() {
        assert_eq!(writable(Some(Role::Worker)), vec!["w_value", "hw_value"]);
    }

    #[test]
    fn outsider_writes_nothing() {
        assert!(writable(None).is_empty());
        let err = check_write(None, "h_value").unwrap_err();
        assert!(err.to_string().contains("outside peer"));
    }

    #[test]
    fn authenticate_resolves_roles() {
        let id = SpellId::from("s1");
        let other = SpellId::from("s2");
        let loc = location(&id);

        assert_eq!(authenticate(&Caller::spell("worker", id.clone()), &loc), Some(Role::Spell));
        assert_eq!(authenticate(&Caller::spell("worker", other.clone()), &loc), Some(Role::Worker));
        assert_eq!(authenticate(&Caller::peer("host"), &loc), Some(Role::Host));
        assert_eq!(authenticate(&Caller::peer("worker"), &loc), Some(Role::Worker));
        assert_eq!(authenticate(&Caller::peer("stranger"), &loc), None);
        // A spell claim from the wrong peer is not trusted.
        assert_eq!(authenticate(&Caller::spell("stranger", id.clone()), &loc), None);
    }

    #[test]
    fn host_owned_spell_is_addressed_as_host() {
        let id = SpellId::from("s1");
        let loc = Location {
            spell_id: &id,
            worker_id: "host",
            host_id: "host",
        };
        assert_eq!(authenticate(&Caller::spell("host", SpellId::from("s2")), &loc), Some(Role::Host));
    }
}
