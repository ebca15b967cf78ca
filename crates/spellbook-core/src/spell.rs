// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Per-spell state and its locking cell.

use std::sync::Mutex;

use crate::error_log::ErrorLog;
use crate::inbox::Inbox;
use crate::kv::KeyValueStore;
use crate::logbook::LogBook;
use crate::mailbox::TriggerMailbox;
use crate::permission::Location;
use crate::status::StatusLedger;
use crate::storage::{SpellSnapshot, Storage};
use crate::trigger::TriggerConfig;
use crate::types::{ErrorEntry, ScriptError, SpellId};

/// Everything the engine knows about one installed spell.
pub(crate) struct Spell<S> {
    pub(crate) id: SpellId,
    pub(crate) owner: String,
    pub(crate) script: String,
    pub(crate) config: TriggerConfig,
    /// Completed invocations.
    pub(crate) counter: u64,
    pub(crate) store: KeyValueStore,
    pub(crate) mailbox: TriggerMailbox,
    pub(crate) statuses: StatusLedger,
    pub(crate) errors: ErrorLog,
    pub(crate) logs: LogBook,
    pub(crate) inbox: Inbox,
    pub(crate) storage: S,
    /// Set once the spell is removed; in-flight handles must stop using it.
    pub(crate) removed: bool,
}

impl<S: Storage> Spell<S> {
    pub(crate) fn new(
        id: SpellId,
        owner: String,
        script: String,
        config: TriggerConfig,
        store: KeyValueStore,
        storage: S,
    ) -> Self {
        Self {
            id,
            owner,
            script,
            config,
            counter: 0,
            store,
            mailbox: TriggerMailbox::new(),
            statuses: StatusLedger::new(),
            errors: ErrorLog::new(),
            logs: LogBook::new(),
            inbox: Inbox::new(),
            storage,
            removed: false,
        }
    }

    pub(crate) fn from_snapshot(snapshot: SpellSnapshot, storage: S) -> Self {
        Self {
            id: snapshot.id,
            owner: snapshot.owner,
            script: snapshot.script,
            config: snapshot.config,
            counter: snapshot.counter,
            store: snapshot.store,
            mailbox: TriggerMailbox::restore(snapshot.triggers, snapshot.trigger_cursor),
            statuses: snapshot.statuses,
            errors: snapshot.errors,
            logs: snapshot.logs,
            inbox: snapshot.inbox,
            storage,
            removed: false,
        }
    }

    /// State for [`Storage::persist`].  Trigger history is left out; it
    /// reaches the backend through [`Storage::append_trigger`].
    pub(crate) fn snapshot(&self, aliases: Vec<String>) -> SpellSnapshot {
        SpellSnapshot {
            id: self.id.clone(),
            owner: self.owner.clone(),
            script: self.script.clone(),
            config: self.config,
            counter: self.counter,
            store: self.store.clone(),
            trigger_cursor: self.mailbox.last_read(),
            statuses: self.statuses.clone(),
            errors: self.errors.clone(),
            logs: self.logs.clone(),
            inbox: self.inbox.clone(),
            aliases,
            triggers: Vec::new(),
        }
    }

    pub(crate) fn location<'a>(&'a self, host_id: &'a str) -> Location<'a> {
        Location {
            spell_id: &self.id,
            worker_id: &self.owner,
            host_id,
        }
    }

    /// Id of the invocation that would run next.
    pub(crate) fn invocation_id(&self) -> String {
        format!("spell_{}_{}", self.id, self.counter)
    }

    pub(crate) fn record_error(
        &mut self,
        invocation_id: &str,
        error: ScriptError,
        now_ms: u64,
        max_invocations: usize,
    ) -> ErrorEntry {
        let entry = ErrorEntry {
            invocation_id: invocation_id.to_owned(),
            timestamp_ms: now_ms,
            error_idx: self.errors.next_index(invocation_id),
            error,
        };
        self.errors.record(entry.clone(), max_invocations);
        entry
    }
}

/// Shared handle to a spell.
///
/// `state` guards the data and is held only briefly.  `run_lock` is held
/// for a whole invocation so that one spell never runs twice at once while
/// reads and writes from other callers proceed.
pub(crate) struct SpellCell<S> {
    pub(crate) state: Mutex<Spell<S>>,
    pub(crate) run_lock: Mutex<()>,
}

impl<S> SpellCell<S> {
    pub(crate) fn new(spell: Spell<S>) -> Self {
        Self {
            state: Mutex::new(spell),
            run_lock: Mutex::new(()),
        }
    }
}
