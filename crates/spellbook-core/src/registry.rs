// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! [`SpellRegistry`]: the central spell engine.
//!
//! The registry owns every installed spell and ties the sub-systems
//! together:
//!
//! - trigger validation on install and update,
//! - the clock [`Scheduler`] and the peer/block [`EventRouter`],
//! - per-spell key-value stores behind the prefix permission guard,
//! - trigger mailboxes, invocation counters, status ledgers and error logs,
//! - per-spell [`Storage`] backends.
//!
//! Each spell sits behind its own lock, so operations on different spells
//! never wait for each other.  The map of spells is only locked long enough
//! to look a spell up.  Invocations of the same spell are serialised, and
//! no lock on spell data is held while a script runs.
//!
//! # Example
//!
//! ```rust
//! use spellbook_core::config::EngineConfig;
//! use spellbook_core::registry::SpellRegistry;
//! use spellbook_core::runner::NoopRunner;
//! use spellbook_core::trigger::TriggerConfigInput;
//! use spellbook_core::types::Caller;
//! use std::sync::Arc;
//!
//! let registry = SpellRegistry::in_memory(EngineConfig::default(), Arc::new(NoopRunner));
//! let id = registry
//!     .install("worker", "(null)", &TriggerConfigInput::oneshot(0), &[("w_mode", "fast")])
//!     .unwrap();
//!
//! assert_eq!(registry.run_due_timers(), 1);
//! assert_eq!(registry.get_counter(&id).unwrap(), 1);
//!
//! // The host may not touch worker-scoped keys.
//! let host = Caller::peer("host");
//! assert!(registry.set_string(&host, &id, "w_mode", "slow").is_err());
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use hashbrown::hash_map::Entry;
use hashbrown::HashMap;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::SpellError;
use crate::kv::KeyValueStore;
use crate::permission::{authenticate, Role};
use crate::router::{EventRouter, PeerEvent};
use crate::runner::{Invocation, ScriptHost, ScriptRunner};
use crate::scheduler::{DueTimer, Scheduler, TimerState};
use crate::spell::{Spell, SpellCell};
use crate::storage::{InMemoryStorage, SpellSnapshot, Storage};
use crate::trigger::{TriggerConfig, TriggerConfigInput};
use crate::types::{
    BlockTrigger, Caller, ErrorEntry, InboxMessage, InvocationErrors, KeyWriteResult, ScriptError,
    SpellId, StatusRecord, TimerTrigger, TriggerEvent, TriggerPayload,
};

type StorageFactory<S> = Box<dyn Fn(&SpellId) -> Result<S, SpellError> + Send + Sync>;
type WakeHook = Arc<dyn Fn() + Send + Sync>;
type RemovalHook = Arc<dyn Fn(&SpellId) + Send + Sync>;

/// The spell engine.
///
/// `S` is the per-spell storage backend; see [`crate::storage`].
pub struct SpellRegistry<S: Storage> {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    runner: Arc<dyn ScriptRunner<S>>,
    storage_factory: StorageFactory<S>,
    spells: RwLock<HashMap<SpellId, Arc<SpellCell<S>>>>,
    /// worker id -> alias -> spell id.
    aliases: RwLock<HashMap<String, HashMap<String, SpellId>>>,
    scheduler: Mutex<Scheduler>,
    router: RwLock<EventRouter>,
    wake: RwLock<Option<WakeHook>>,
    removal: RwLock<Option<RemovalHook>>,
}

impl SpellRegistry<InMemoryStorage> {
    /// A registry on the system clock that keeps spell state in memory only.
    pub fn in_memory(config: EngineConfig, runner: Arc<dyn ScriptRunner<InMemoryStorage>>) -> Self {
        Self::new(config, Arc::new(SystemClock), runner, |_: &SpellId| Ok(InMemoryStorage::new()))
    }
}

impl<S: Storage + 'static> SpellRegistry<S> {
    /// Create a registry.
    ///
    /// `storage_factory` is called once per installed or restored spell to
    /// create its backend.
    pub fn new<F>(
        config: EngineConfig,
        clock: Arc<dyn Clock>,
        runner: Arc<dyn ScriptRunner<S>>,
        storage_factory: F,
    ) -> Self
    where
        F: Fn(&SpellId) -> Result<S, SpellError> + Send + Sync + 'static,
    {
        Self {
            config,
            clock,
            runner,
            storage_factory: Box::new(storage_factory),
            spells: RwLock::new(HashMap::new()),
            aliases: RwLock::new(HashMap::new()),
            scheduler: Mutex::new(Scheduler::new()),
            router: RwLock::new(EventRouter::new()),
            wake: RwLock::new(None),
            removal: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn host_id(&self) -> &str {
        &self.config.host_id
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Install a spell owned by `owner` and arm its triggers.
    ///
    /// The initial store is seeded with string values and is not subject to
    /// the permission guard.
    ///
    /// # Errors
    ///
    /// [`SpellError::InvalidConfig`] if `config` fails validation, or the
    /// storage factory's error.
    pub fn install(
        &self,
        owner: &str,
        script: impl Into<String>,
        config: &TriggerConfigInput,
        initial_store: &[(&str, &str)],
    ) -> Result<SpellId, SpellError> {
        let now_sec = self.clock.now_sec();
        let config = TriggerConfig::validate(config, now_sec).map_err(|rejection| {
            warn!(owner, reason = %rejection, "spell install rejected");
            SpellError::from(rejection)
        })?;

        let id = SpellId::mint();
        let storage = (self.storage_factory)(&id)?;
        let spell = Spell::new(
            id.clone(),
            owner.to_owned(),
            script.into(),
            config,
            KeyValueStore::seeded(initial_store.iter().copied()),
            storage,
        );
        let cell = Arc::new(SpellCell::new(spell));
        write(&self.spells).insert(id.clone(), Arc::clone(&cell));

        {
            let mut spell = lock(&cell.state);
            let timer = self.activate(&id, &config, now_sec);
            self.persist(&mut spell);
            info!(spell_id = %id, owner, ?timer, "spell installed");
        }
        self.wake();
        Ok(id)
    }

    /// Replace the trigger configuration of `id`.
    ///
    /// On any error the previous configuration stays active and armed.
    pub fn update(&self, actor: &str, id: &SpellId, config: &TriggerConfigInput) -> Result<(), SpellError> {
        let now_sec = self.clock.now_sec();
        self.mutate(id, |spell| {
            ensure_owner(spell, actor)?;
            let config = TriggerConfig::validate(config, now_sec).map_err(|rejection| {
                warn!(spell_id = %id, reason = %rejection, "trigger config update rejected");
                SpellError::from(rejection)
            })?;
            spell.config = config;
            let timer = self.activate(id, &config, now_sec);
            info!(spell_id = %id, ?timer, "trigger config updated");
            Ok(())
        })?;
        self.wake();
        Ok(())
    }

    /// Remove `id`: disarm it, drop its aliases and purge its storage.
    pub fn remove(&self, actor: &str, id: &SpellId) -> Result<(), SpellError> {
        let cell = self.cell(id)?;
        let mut spell = lock(&cell.state);
        if spell.removed {
            return Err(SpellError::NotFound(id.clone()));
        }
        ensure_owner(&*spell, actor)?;

        spell.removed = true;
        self.deactivate(id);
        if let Some(bound) = write(&self.aliases).get_mut(&spell.owner) {
            bound.retain(|_, target| target != id);
        }
        write(&self.spells).remove(id);
        if let Err(err) = spell.storage.purge() {
            warn!(spell_id = %id, error = %err, "failed to purge spell storage");
        }
        drop(spell);

        info!(spell_id = %id, "spell removed");
        let removal = read(&self.removal).clone();
        if let Some(hook) = removal {
            hook(id);
        }
        self.wake();
        Ok(())
    }

    /// Load a previously persisted spell and re-arm its triggers.
    ///
    /// The end-in-the-past rule is not re-applied: a window that closed
    /// while the spell was offline simply leaves its timer expired.
    ///
    /// # Errors
    ///
    /// [`SpellError::AliasTaken`] if another spell of the same worker holds
    /// one of the snapshot's aliases, [`SpellError::Storage`] if the spell
    /// is already loaded.  Nothing is registered on error.
    pub fn restore(&self, snapshot: SpellSnapshot) -> Result<SpellId, SpellError> {
        let id = snapshot.id.clone();
        let owner = snapshot.owner.clone();
        let aliases = snapshot.aliases.clone();
        let config = snapshot.config;

        let storage = (self.storage_factory)(&id)?;
        let cell = Arc::new(SpellCell::new(Spell::from_snapshot(snapshot, storage)));

        {
            let mut all = write(&self.aliases);
            let conflict = all.get(&owner).and_then(|bound| {
                aliases
                    .iter()
                    .find(|alias| bound.get(alias.as_str()).is_some_and(|holder| holder != &id))
            });
            if let Some(alias) = conflict {
                warn!(spell_id = %id, alias = %alias, "restored alias already bound");
                return Err(SpellError::AliasTaken(alias.clone()));
            }

            match write(&self.spells).entry(id.clone()) {
                Entry::Occupied(_) => {
                    return Err(SpellError::Storage(format!("spell {id} is already loaded")));
                }
                Entry::Vacant(slot) => {
                    slot.insert(Arc::clone(&cell));
                }
            }

            let bound = all.entry(owner).or_default();
            for alias in aliases {
                bound.insert(alias, id.clone());
            }
        }

        {
            let _spell = lock(&cell.state);
            let timer = self.activate(&id, &config, self.clock.now_sec());
            info!(spell_id = %id, ?timer, "spell restored");
        }
        self.wake();
        Ok(id)
    }

    /// Ids of all installed spells, sorted.
    pub fn list(&self) -> Vec<SpellId> {
        let mut ids: Vec<SpellId> = read(&self.spells).keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn contains(&self, id: &SpellId) -> bool {
        read(&self.spells).contains_key(id)
    }

    pub fn len(&self) -> usize {
        read(&self.spells).len()
    }

    pub fn is_empty(&self) -> bool {
        read(&self.spells).is_empty()
    }

    // -----------------------------------------------------------------------
    // Spell reads
    // -----------------------------------------------------------------------

    pub fn get_config(&self, id: &SpellId) -> Result<TriggerConfig, SpellError> {
        self.with_spell(id, |spell| Ok(spell.config))
    }

    pub fn get_script(&self, id: &SpellId) -> Result<String, SpellError> {
        self.with_spell(id, |spell| Ok(spell.script.clone()))
    }

    /// Number of completed invocations.
    pub fn get_counter(&self, id: &SpellId) -> Result<u64, SpellError> {
        self.with_spell(id, |spell| Ok(spell.counter))
    }

    /// The most recent trigger, marking it as read.
    pub fn get_trigger_event(&self, id: &SpellId) -> Result<Option<TriggerEvent>, SpellError> {
        self.with_spell(id, |spell| Ok(spell.mailbox.latest()))
    }

    /// Triggers delivered after `from_ms` (`0` for all), in delivery order.
    pub fn get_all_trigger_events(&self, id: &SpellId, from_ms: u64) -> Result<Vec<TriggerEvent>, SpellError> {
        self.with_spell(id, |spell| Ok(spell.mailbox.all_since(from_ms)))
    }

    /// Current clock-trigger state, or `None` for unknown spells.
    pub fn timer_state(&self, id: &SpellId) -> Option<TimerState> {
        lock(&self.scheduler).state(id)
    }

    // -----------------------------------------------------------------------
    // Key-value store
    // -----------------------------------------------------------------------

    pub fn get_string(&self, id: &SpellId, key: &str) -> Result<Option<String>, SpellError> {
        self.with_spell(id, |spell| Ok(spell.store.get_string(key).map(str::to_owned)))
    }

    pub fn get_u32(&self, id: &SpellId, key: &str) -> Result<Option<u32>, SpellError> {
        self.with_spell(id, |spell| Ok(spell.store.get_u32(key)))
    }

    pub fn list_get_strings(&self, id: &SpellId, key: &str) -> Result<Vec<String>, SpellError> {
        self.with_spell(id, |spell| Ok(spell.store.list_get_strings(key)))
    }

    pub fn exists(&self, id: &SpellId, key: &str) -> Result<bool, SpellError> {
        self.with_spell(id, |spell| Ok(spell.store.exists(key)))
    }

    pub fn set_string(
        &self,
        caller: &Caller,
        id: &SpellId,
        key: &str,
        value: impl Into<String>,
    ) -> Result<(), SpellError> {
        let value = value.into();
        self.write_store(caller, id, |store, role| store.set_string(role, key, value))
    }

    pub fn set_u32(&self, caller: &Caller, id: &SpellId, key: &str, value: u32) -> Result<(), SpellError> {
        self.write_store(caller, id, |store, role| store.set_u32(role, key, value))
    }

    pub fn list_push_string(
        &self,
        caller: &Caller,
        id: &SpellId,
        key: &str,
        value: impl Into<String>,
    ) -> Result<(), SpellError> {
        let value = value.into();
        self.write_store(caller, id, |store, role| store.list_push_string(role, key, value))
    }

    pub fn list_pop_string(&self, caller: &Caller, id: &SpellId, key: &str) -> Result<Option<String>, SpellError> {
        self.write_store(caller, id, |store, role| store.list_pop_string(role, key))
    }

    /// Delete `key`.  Returns whether it existed.
    pub fn remove_key(&self, caller: &Caller, id: &SpellId, key: &str) -> Result<bool, SpellError> {
        self.write_store(caller, id, |store, role| store.remove_key(role, key))
    }

    /// Write several strings; each key is guarded on its own.
    ///
    /// Fails as a whole only when the spell does not exist.
    pub fn set_strings(
        &self,
        caller: &Caller,
        id: &SpellId,
        entries: &[(&str, &str)],
    ) -> Result<Vec<KeyWriteResult>, SpellError> {
        let host_id = self.config.host_id.as_str();
        self.mutate(id, |spell| {
            let role = authenticate(caller, &spell.location(host_id));
            let results = entries
                .iter()
                .map(|(key, value)| KeyWriteResult {
                    key: (*key).to_owned(),
                    result: spell.store.set_string(role, key, (*value).to_owned()).is_ok(),
                })
                .collect();
            Ok(results)
        })
    }

    /// Store each first-level field of the JSON object `json` as a string.
    /// Nested values keep their JSON text, so string fields keep their
    /// quotes.
    ///
    /// Every key is checked before anything is written; one forbidden key
    /// rejects the whole object.  Returns the number of fields written.
    pub fn set_json_fields(&self, caller: &Caller, id: &SpellId, json: &str) -> Result<usize, SpellError> {
        self.write_store(caller, id, |store, role| store.set_json_fields(role, json))
    }

    fn write_store<T>(
        &self,
        caller: &Caller,
        id: &SpellId,
        op: impl FnOnce(&mut KeyValueStore, Option<Role>) -> Result<T, SpellError>,
    ) -> Result<T, SpellError> {
        let host_id = self.config.host_id.as_str();
        self.mutate(id, |spell| {
            let role = authenticate(caller, &spell.location(host_id));
            op(&mut spell.store, role).inspect_err(|err| {
                if let SpellError::WriteForbidden { key, role } = err {
                    warn!(spell_id = %id, key = %key, caller = %caller.peer_id, role, "write forbidden");
                }
            })
        })
    }

    // -----------------------------------------------------------------------
    // Status ledger
    // -----------------------------------------------------------------------

    /// Append a status record.  Only the spell's owner, or the spell itself,
    /// may report status.
    pub fn set_status(
        &self,
        caller: &Caller,
        id: &SpellId,
        state: &str,
        message: &str,
    ) -> Result<StatusRecord, SpellError> {
        let now_ms = self.clock.now_ms();
        self.mutate(id, |spell| {
            ensure_owner(spell, &caller.peer_id)?;
            let record = spell.statuses.append(state, message, now_ms);
            debug!(spell_id = %id, state, timestamp = record.timestamp, "status recorded");
            Ok(record)
        })
    }

    /// Latest status, or the implicit `NOT_STARTED` record.
    pub fn get_status(&self, id: &SpellId) -> Result<StatusRecord, SpellError> {
        self.with_spell(id, |spell| Ok(spell.statuses.latest()))
    }

    /// Status records with `timestamp >= since`.
    pub fn get_statuses_from(&self, id: &SpellId, since: u64) -> Result<Vec<StatusRecord>, SpellError> {
        self.with_spell(id, |spell| Ok(spell.statuses.from(since)))
    }

    // -----------------------------------------------------------------------
    // Logs and inbox
    // -----------------------------------------------------------------------

    /// Append a line to the spell's log.  Only the spell itself may log.
    pub fn store_log(&self, caller: &Caller, id: &SpellId, line: impl Into<String>) -> Result<(), SpellError> {
        let line = line.into();
        let max_logs = self.config.max_logs;
        self.mutate(id, |spell| {
            self.ensure_spell(caller, spell, "store_log")?;
            spell.logs.push(line, max_logs);
            Ok(())
        })
    }

    /// Retained log lines, oldest first.
    pub fn get_logs(&self, id: &SpellId) -> Result<Vec<String>, SpellError> {
        self.with_spell(id, |spell| Ok(spell.logs.lines()))
    }

    /// Leave a message in the spell's inbox.  Any caller may push; the
    /// caller's peer id is recorded as the sender.
    pub fn push_inbox(&self, caller: &Caller, id: &SpellId, message: impl Into<String>) -> Result<(), SpellError> {
        let message = InboxMessage {
            sender: caller.peer_id.clone(),
            timestamp_ms: self.clock.now_ms(),
            message: message.into(),
        };
        let max_messages = self.config.max_inbox_messages;
        self.mutate(id, |spell| {
            debug!(spell_id = %id, sender = %message.sender, "inbox message received");
            spell.inbox.push(message, max_messages);
            Ok(())
        })
    }

    /// Inbox messages, newest first.
    pub fn get_inbox(&self, id: &SpellId) -> Result<Vec<InboxMessage>, SpellError> {
        self.with_spell(id, |spell| Ok(spell.inbox.newest_first()))
    }

    /// Remove and return the newest inbox message.  Only the spell itself
    /// may consume its inbox.
    pub fn pop_inbox(&self, caller: &Caller, id: &SpellId) -> Result<Option<InboxMessage>, SpellError> {
        self.mutate(id, |spell| {
            self.ensure_spell(caller, spell, "pop_inbox")?;
            Ok(spell.inbox.pop())
        })
    }

    fn ensure_spell(&self, caller: &Caller, spell: &Spell<S>, operation: &'static str) -> Result<(), SpellError> {
        match authenticate(caller, &spell.location(&self.config.host_id)) {
            Some(Role::Spell) => Ok(()),
            _ => {
                warn!(spell_id = %spell.id, caller = %caller.peer_id, operation, "spell-only operation refused");
                Err(SpellError::SpellOnly(operation))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Aliases
    // -----------------------------------------------------------------------

    /// Bind `alias` to `id` within the owning worker's namespace.
    pub fn add_alias(&self, actor: &str, alias: &str, id: &SpellId) -> Result<(), SpellError> {
        self.mutate(id, |spell| {
            ensure_owner(spell, actor)?;
            let mut all = write(&self.aliases);
            let bound = all.entry(spell.owner.clone()).or_default();
            if bound.get(alias).is_some_and(|existing| existing != id) {
                warn!(spell_id = %id, alias, "alias already taken");
                return Err(SpellError::AliasTaken(alias.to_owned()));
            }
            bound.insert(alias.to_owned(), id.clone());
            info!(spell_id = %id, alias, worker = %spell.owner, "alias added");
            Ok(())
        })
    }

    pub fn resolve_alias(&self, worker_id: &str, alias: &str) -> Option<SpellId> {
        read(&self.aliases)
            .get(worker_id)
            .and_then(|bound| bound.get(alias))
            .cloned()
    }

    fn aliases_of(&self, worker_id: &str, id: &SpellId) -> Vec<String> {
        let all = read(&self.aliases);
        let mut names: Vec<String> = all
            .get(worker_id)
            .map(|bound| {
                bound
                    .iter()
                    .filter(|(_, target)| *target == id)
                    .map(|(alias, _)| alias.clone())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    // -----------------------------------------------------------------------
    // Error log
    // -----------------------------------------------------------------------

    /// Record a script error against `invocation_id`.
    pub fn report_error(
        &self,
        id: &SpellId,
        invocation_id: &str,
        error: ScriptError,
    ) -> Result<ErrorEntry, SpellError> {
        let now_ms = self.clock.now_ms();
        let retention = self.config.max_error_invocations;
        self.mutate(id, |spell| Ok(spell.record_error(invocation_id, error, now_ms, retention)))
    }

    pub fn get_errors(&self, id: &SpellId, invocation_id: &str) -> Result<Vec<ErrorEntry>, SpellError> {
        self.with_spell(id, |spell| Ok(spell.errors.for_invocation(invocation_id)))
    }

    /// Every retained error, grouped by invocation.
    pub fn get_all_errors(&self, id: &SpellId) -> Result<Vec<InvocationErrors>, SpellError> {
        self.with_spell(id, |spell| Ok(spell.errors.grouped()))
    }

    // -----------------------------------------------------------------------
    // Triggering
    // -----------------------------------------------------------------------

    /// Earliest armed timer, in Unix seconds.
    pub fn next_timer_deadline_sec(&self) -> Option<u64> {
        lock(&self.scheduler).next_deadline_sec()
    }

    /// Pop every timer due now.  The caller must hand each one to
    /// [`fire_timer`](Self::fire_timer).
    pub fn take_due_timers(&self) -> Vec<DueTimer> {
        let now_sec = self.clock.now_sec();
        lock(&self.scheduler).pop_due(now_sec)
    }

    /// Deliver a due timer tick.  Returns `false` when the tick belongs to a
    /// configuration that has since been replaced.
    pub fn fire_timer(&self, due: &DueTimer) -> Result<bool, SpellError> {
        let cell = self.cell(&due.spell_id)?;
        let payload = TriggerPayload::Timer(TimerTrigger {
            timestamp: due.fire_at_sec,
        });
        self.invoke(&cell, payload, |_, _| {
            lock(&self.scheduler).is_current(&due.spell_id, due.generation)
        })
    }

    /// Fire every due timer on the calling thread.  Returns how many ran.
    pub fn run_due_timers(&self) -> usize {
        self.take_due_timers()
            .iter()
            .filter(|due| self.deliver_logged(&due.spell_id, || self.fire_timer(due)))
            .count()
    }

    /// Spells subscribed to a connectivity change.
    pub fn route_peer_event(&self, event: &PeerEvent) -> Vec<SpellId> {
        read(&self.router).route_peer(event)
    }

    /// Spells whose block window covers `height`.
    pub fn route_block(&self, height: u64) -> Vec<SpellId> {
        read(&self.router).route_block(height)
    }

    /// Deliver a routed peer or block event to `id`.
    ///
    /// The spell's live configuration is re-checked under its lock, so an
    /// event routed just before an update is dropped rather than delivered
    /// against the new configuration.  Returns whether the script ran.
    pub fn deliver(&self, id: &SpellId, payload: TriggerPayload) -> Result<bool, SpellError> {
        let cell = self.cell(id)?;
        self.invoke(&cell, payload, |spell, payload| subscribed(&spell.config, payload))
    }

    /// Route and deliver a connectivity change on the calling thread.
    pub fn dispatch_peer_event(&self, event: &PeerEvent) -> usize {
        let payload = event.to_payload();
        self.route_peer_event(event)
            .iter()
            .filter(|id| self.deliver_logged(id, || self.deliver(id, payload.clone())))
            .count()
    }

    /// Route and deliver a new block on the calling thread.
    pub fn dispatch_block(&self, height: u64) -> usize {
        let payload = TriggerPayload::Blockchain(BlockTrigger { height });
        self.route_block(height)
            .iter()
            .filter(|id| self.deliver_logged(id, || self.deliver(id, payload.clone())))
            .count()
    }

    /// Register a callback run whenever the set of armed timers changes.
    pub fn set_wake_hook(&self, hook: impl Fn() + Send + Sync + 'static) {
        *write(&self.wake) = Some(Arc::new(hook));
    }

    pub fn clear_wake_hook(&self) {
        *write(&self.wake) = None;
    }

    /// Register a callback run with the id of every removed spell.
    pub fn set_removal_hook(&self, hook: impl Fn(&SpellId) + Send + Sync + 'static) {
        *write(&self.removal) = Some(Arc::new(hook));
    }

    pub fn clear_removal_hook(&self) {
        *write(&self.removal) = None;
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn invoke(
        &self,
        cell: &SpellCell<S>,
        payload: TriggerPayload,
        guard: impl FnOnce(&Spell<S>, &TriggerPayload) -> bool,
    ) -> Result<bool, SpellError> {
        let _running = lock(&cell.run_lock);

        let invocation = {
            let mut spell = lock(&cell.state);
            if spell.removed {
                return Err(SpellError::NotFound(spell.id.clone()));
            }
            if !guard(&*spell, &payload) {
                debug!(spell_id = %spell.id, kind = payload.kind(), "stale trigger dropped");
                return Ok(false);
            }
            let kind = payload.kind();
            let trigger = spell.mailbox.append(payload, self.clock.now_ms());
            let invocation = Invocation {
                spell_id: spell.id.clone(),
                invocation_id: spell.invocation_id(),
                owner: spell.owner.clone(),
                script: spell.script.clone(),
                trigger,
            };
            if let Err(err) = spell.storage.append_trigger(&invocation.trigger) {
                warn!(spell_id = %invocation.spell_id, error = %err, "failed to persist trigger");
            }
            debug!(
                spell_id = %invocation.spell_id,
                kind,
                seq = invocation.trigger.seq,
                "trigger delivered"
            );
            invocation
        };

        let host = ScriptHost::new(self, &invocation);
        let outcome = self.runner.run(&invocation, &host);

        let mut spell = lock(&cell.state);
        if spell.removed {
            return Ok(true);
        }
        spell.counter += 1;
        if let Err(error) = outcome {
            warn!(
                spell_id = %invocation.spell_id,
                invocation_id = %invocation.invocation_id,
                error = %error,
                "spell script failed"
            );
            spell.record_error(
                &invocation.invocation_id,
                error,
                self.clock.now_ms(),
                self.config.max_error_invocations,
            );
        }
        self.persist(&mut spell);
        Ok(true)
    }

    fn deliver_logged(&self, id: &SpellId, deliver: impl FnOnce() -> Result<bool, SpellError>) -> bool {
        match deliver() {
            Ok(ran) => ran,
            Err(err) => {
                debug!(spell_id = %id, error = %err, "trigger not delivered");
                false
            }
        }
    }

    fn activate(&self, id: &SpellId, config: &TriggerConfig, now_sec: u64) -> TimerState {
        let timer = lock(&self.scheduler).arm(id, config.clock(), now_sec);
        write(&self.router).subscribe(id, config);
        timer
    }

    fn deactivate(&self, id: &SpellId) {
        lock(&self.scheduler).disarm(id);
        write(&self.router).unsubscribe(id);
    }

    fn persist(&self, spell: &mut Spell<S>) {
        if !spell.storage.is_durable() {
            return;
        }
        let snapshot = spell.snapshot(self.aliases_of(&spell.owner, &spell.id));
        if let Err(err) = spell.storage.persist(&snapshot) {
            warn!(spell_id = %spell.id, error = %err, "failed to persist spell state");
        }
    }

    fn wake(&self) {
        let hook = read(&self.wake).clone();
        if let Some(hook) = hook {
            hook();
        }
    }

    fn cell(&self, id: &SpellId) -> Result<Arc<SpellCell<S>>, SpellError> {
        read(&self.spells)
            .get(id)
            .cloned()
            .ok_or_else(|| SpellError::NotFound(id.clone()))
    }

    fn with_spell<T>(
        &self,
        id: &SpellId,
        f: impl FnOnce(&mut Spell<S>) -> Result<T, SpellError>,
    ) -> Result<T, SpellError> {
        let cell = self.cell(id)?;
        let mut spell = lock(&cell.state);
        if spell.removed {
            return Err(SpellError::NotFound(id.clone()));
        }
        f(&mut *spell)
    }

    /// Like `with_spell`, persisting the spell after a successful change.
    fn mutate<T>(
        &self,
        id: &SpellId,
        f: impl FnOnce(&mut Spell<S>) -> Result<T, SpellError>,
    ) -> Result<T, SpellError> {
        self.with_spell(id, |spell| {
            let result = f(&mut *spell)?;
            self.persist(spell);
            Ok(result)
        })
    }
}

fn ensure_owner<S>(spell: &Spell<S>, actor: &str) -> Result<(), SpellError> {
    if spell.owner == actor {
        Ok(())
    } else {
        warn!(spell_id = %spell.id, actor, "caller is not the spell owner");
        Err(SpellError::NotOwner(spell.id.clone()))
    }
}

fn subscribed(config: &TriggerConfig, payload: &TriggerPayload) -> bool {
    match payload {
        TriggerPayload::Timer(_)          => false,
        TriggerPayload::Peer(peer)        => config.connections().wants(peer.connected),
        TriggerPayload::Blockchain(block) => config.blockchain().covers(block.height),
    }
}

// ---------------------------------------------------------------------------
// Poison-tolerant lock helpers
// ---------------------------------------------------------------------------

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
