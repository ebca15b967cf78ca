// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Script execution seam.
//!
//! The engine does not interpret spell scripts.  Each delivered trigger is
//! handed to a [`ScriptRunner`] together with a [`ScriptHost`], through
//! which the script reads and writes spell state as the spell itself.
//!
//! ```rust
//! use spellbook_core::config::EngineConfig;
//! use spellbook_core::registry::SpellRegistry;
//! use spellbook_core::runner::{runner_fn, Invocation, ScriptHost};
//! use spellbook_core::storage::InMemoryStorage;
//! use spellbook_core::trigger::TriggerConfigInput;
//! use spellbook_core::types::ScriptError;
//!
//! let runner = runner_fn(|inv: &Invocation, host: &ScriptHost<'_, InMemoryStorage>| {
//!     host.set_string("last_trigger", inv.trigger.payload.kind())
//!         .map_err(|err| ScriptError::new(1, err.to_string()))
//! });
//! let registry = SpellRegistry::in_memory(EngineConfig::default(), runner);
//! let id = registry.install("worker", "(null)", &TriggerConfigInput::oneshot(0), &[]).unwrap();
//! registry.run_due_timers();
//! assert_eq!(registry.get_string(&id, "last_trigger").unwrap().as_deref(), Some("timer"));
//! ```

use std::sync::Arc;

use crate::error::SpellError;
use crate::registry::SpellRegistry;
use crate::storage::Storage;
use crate::types::{Caller, InboxMessage, ScriptError, SpellId, StatusRecord, TriggerEvent};

/// One scheduled execution of a spell script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub spell_id: SpellId,
    /// `spell_<spell_id>_<counter>`.
    pub invocation_id: String,
    /// Worker that owns the spell.
    pub owner: String,
    pub script: String,
    /// The trigger that caused this invocation.
    pub trigger: TriggerEvent,
}

/// Executes spell scripts.
pub trait ScriptRunner<S: Storage>: Send + Sync {
    /// Run `invocation`.  An `Err` is recorded in the spell's error log;
    /// the invocation still counts as completed.
    fn run(&self, invocation: &Invocation, host: &ScriptHost<'_, S>) -> Result<(), ScriptError>;
}

/// Runner that does nothing.  Useful when only trigger bookkeeping matters.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRunner;

impl<S: Storage> ScriptRunner<S> for NoopRunner {
    fn run(&self, _invocation: &Invocation, _host: &ScriptHost<'_, S>) -> Result<(), ScriptError> {
        Ok(())
    }
}

struct FnRunner<F>(F);

impl<S, F> ScriptRunner<S> for FnRunner<F>
where
    S: Storage,
    F: Fn(&Invocation, &ScriptHost<'_, S>) -> Result<(), ScriptError> + Send + Sync,
{
    fn run(&self, invocation: &Invocation, host: &ScriptHost<'_, S>) -> Result<(), ScriptError> {
        (self.0)(invocation, host)
    }
}

/// Wrap a closure as a shareable [`ScriptRunner`].
pub fn runner_fn<S, F>(run: F) -> Arc<dyn ScriptRunner<S>>
where
    S: Storage + 'static,
    F: Fn(&Invocation, &ScriptHost<'_, S>) -> Result<(), ScriptError> + Send + Sync + 'static,
{
    Arc::new(FnRunner(run))
}

// ---------------------------------------------------------------------------
// ScriptHost
// ---------------------------------------------------------------------------

/// The registry as seen from inside a running script.
///
/// Every call is made as [`Caller::spell`], so the script holds the spell
/// role over its own store and the worker role over its fellow spells.
/// Trigger dispatch is not reachable from here; a script that triggered
/// itself would wait on its own invocation.
pub struct ScriptHost<'a, S: Storage> {
    registry: &'a SpellRegistry<S>,
    caller: Caller,
    spell_id: &'a SpellId,
    invocation_id: &'a str,
}

impl<'a, S: Storage + 'static> ScriptHost<'a, S> {
    pub(crate) fn new(registry: &'a SpellRegistry<S>, invocation: &'a Invocation) -> Self {
        Self {
            registry,
            caller: Caller::spell(invocation.owner.clone(), invocation.spell_id.clone()),
            spell_id: &invocation.spell_id,
            invocation_id: &invocation.invocation_id,
        }
    }

    pub fn caller(&self) -> &Caller {
        &self.caller
    }

    pub fn invocation_id(&self) -> &str {
        self.invocation_id
    }

    pub fn spell_id(&self) -> &SpellId {
        self.spell_id
    }

    pub fn get_string(&self, key: &str) -> Result<Option<String>, SpellError> {
        self.registry.get_string(self.spell_id(), key)
    }

    pub fn get_u32(&self, key: &str) -> Result<Option<u32>, SpellError> {
        self.registry.get_u32(self.spell_id(), key)
    }

    pub fn list_get_strings(&self, key: &str) -> Result<Vec<String>, SpellError> {
        self.registry.list_get_strings(self.spell_id(), key)
    }

    pub fn set_string(&self, key: &str, value: impl Into<String>) -> Result<(), SpellError> {
        self.registry.set_string(&self.caller, self.spell_id(), key, value)
    }

    pub fn set_u32(&self, key: &str, value: u32) -> Result<(), SpellError> {
        self.registry.set_u32(&self.caller, self.spell_id(), key, value)
    }

    pub fn list_push_string(&self, key: &str, value: impl Into<String>) -> Result<(), SpellError> {
        self.registry.list_push_string(&self.caller, self.spell_id(), key, value)
    }

    /// Remove and return the last element of the list at `key`.
    pub fn list_pop_string(&self, key: &str) -> Result<Option<String>, SpellError> {
        self.registry.list_pop_string(&self.caller, self.spell_id(), key)
    }

    pub fn remove_key(&self, key: &str) -> Result<bool, SpellError> {
        self.registry.remove_key(&self.caller, self.spell_id(), key)
    }

    pub fn set_json_fields(&self, json: &str) -> Result<usize, SpellError> {
        self.registry.set_json_fields(&self.caller, self.spell_id(), json)
    }

    pub fn store_log(&self, line: impl Into<String>) -> Result<(), SpellError> {
        self.registry.store_log(&self.caller, self.spell_id(), line)
    }

    /// Take the newest message from this spell's inbox.
    pub fn pop_inbox(&self) -> Result<Option<InboxMessage>, SpellError> {
        self.registry.pop_inbox(&self.caller, self.spell_id())
    }

    /// Write to another spell's store as this spell's worker.
    pub fn set_string_on(&self, target: &SpellId, key: &str, value: impl Into<String>) -> Result<(), SpellError> {
        self.registry.set_string(&self.caller, target, key, value)
    }

    /// Append to this spell's status ledger.
    pub fn set_status(&self, state: &str, message: &str) -> Result<StatusRecord, SpellError> {
        self.registry.set_status(&self.caller, self.spell_id(), state, message)
    }

    /// Record an error against the current invocation without failing it.
    pub fn report_error(&self, error: ScriptError) -> Result<(), SpellError> {
        self.registry
            .report_error(self.spell_id(), self.invocation_id, error)
            .map(|_| ())
    }
}
