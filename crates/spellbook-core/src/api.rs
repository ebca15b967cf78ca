// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Flag-returning host surface.
//!
//! [`SpellApi`] binds a registry to one calling peer and exposes every
//! operation as a plain result struct carrying `success` and `error` fields.
//! Nothing on this surface returns `Err` or panics: validation, permission
//! and resolution failures all come back as `success: false`, and an unknown
//! spell id reads as `absent`.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use spellbook_core::api::SpellApi;
//! use spellbook_core::config::EngineConfig;
//! use spellbook_core::registry::SpellRegistry;
//! use spellbook_core::runner::NoopRunner;
//! use spellbook_core::trigger::TriggerConfigInput;
//! use spellbook_core::types::Caller;
//!
//! let registry = SpellRegistry::in_memory(EngineConfig::default(), Arc::new(NoopRunner));
//! let worker = SpellApi::new(&registry, Caller::peer("worker"));
//!
//! let installed = worker.install("(null)", &TriggerConfigInput::disabled(), &[]);
//! assert!(installed.success);
//!
//! let missing = worker.get_counter("no-such-spell");
//! assert!(!missing.success);
//! ```

use crate::error::SpellError;
use crate::registry::SpellRegistry;
use crate::storage::Storage;
use crate::trigger::{TriggerConfig, TriggerConfigInput};
use crate::types::{
    BoolResult, Caller, ConfigResult, CounterResult, ErrorsResult, InboxResult, InstallResult,
    KeyWriteResult, LogsResult, PopInboxResult, ScriptResult, SpellId, StatusRecord,
    StringListResult, StringResult, TriggerEvent, TriggerEventsResult, U32Result, UnitResult,
};

/// A registry viewed from one calling peer.
pub struct SpellApi<'a, S: Storage> {
    registry: &'a SpellRegistry<S>,
    caller: Caller,
}

impl<'a, S: Storage + 'static> SpellApi<'a, S> {
    pub fn new(registry: &'a SpellRegistry<S>, caller: Caller) -> Self {
        Self { registry, caller }
    }

    pub fn caller(&self) -> &Caller {
        &self.caller
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Install a spell owned by the calling peer.
    pub fn install(&self, script: &str, config: &TriggerConfigInput, initial_store: &[(&str, &str)]) -> InstallResult {
        match self
            .registry
            .install(&self.caller.peer_id, script, config, initial_store)
        {
            Ok(id) => InstallResult {
                success: true,
                spell_id: id.to_string(),
                error: String::new(),
            },
            Err(err) => InstallResult {
                success: false,
                spell_id: String::new(),
                error: err.to_string(),
            },
        }
    }

    pub fn remove(&self, spell_id: &str) -> UnitResult {
        self.registry
            .remove(&self.caller.peer_id, &SpellId::from(spell_id))
            .into()
    }

    pub fn update(&self, spell_id: &str, config: &TriggerConfigInput) -> UnitResult {
        self.registry
            .update(&self.caller.peer_id, &SpellId::from(spell_id), config)
            .into()
    }

    pub fn list_spells(&self) -> Vec<String> {
        self.registry
            .list()
            .into_iter()
            .map(|id| id.to_string())
            .collect()
    }

    // -----------------------------------------------------------------------
    // Spell reads
    // -----------------------------------------------------------------------

    pub fn get_config(&self, spell_id: &str) -> ConfigResult {
        match self.registry.get_config(&SpellId::from(spell_id)) {
            Ok(config) => ConfigResult {
                success: true,
                config,
                error: String::new(),
            },
            Err(err) => ConfigResult {
                success: false,
                config: TriggerConfig::disabled(),
                error: err.to_string(),
            },
        }
    }

    pub fn get_script(&self, spell_id: &str) -> ScriptResult {
        let (success, source, error) = split(self.registry.get_script(&SpellId::from(spell_id)));
        ScriptResult { success, source, error }
    }

    pub fn get_counter(&self, spell_id: &str) -> CounterResult {
        let (success, num, error) = split(self.registry.get_counter(&SpellId::from(spell_id)));
        CounterResult { success, num, error }
    }

    /// The most recent trigger; `None` when there is none or the spell is
    /// unknown.
    pub fn get_trigger_event(&self, spell_id: &str) -> Option<TriggerEvent> {
        self.registry
            .get_trigger_event(&SpellId::from(spell_id))
            .ok()
            .flatten()
    }

    pub fn get_all_trigger_events(&self, spell_id: &str, from_ms: u64) -> TriggerEventsResult {
        let (success, events, error) = split(
            self.registry
                .get_all_trigger_events(&SpellId::from(spell_id), from_ms),
        );
        TriggerEventsResult { success, events, error }
    }

    // -----------------------------------------------------------------------
    // Key-value store
    // -----------------------------------------------------------------------

    pub fn get_string(&self, spell_id: &str, key: &str) -> StringResult {
        match self.registry.get_string(&SpellId::from(spell_id), key) {
            Ok(value) => StringResult {
                success: true,
                absent: value.is_none(),
                value: value.unwrap_or_default(),
                error: String::new(),
            },
            Err(err) => StringResult {
                success: false,
                absent: true,
                value: String::new(),
                error: err.to_string(),
            },
        }
    }

    pub fn get_u32(&self, spell_id: &str, key: &str) -> U32Result {
        match self.registry.get_u32(&SpellId::from(spell_id), key) {
            Ok(value) => U32Result {
                success: true,
                absent: value.is_none(),
                value: value.unwrap_or_default(),
                error: String::new(),
            },
            Err(err) => U32Result {
                success: false,
                absent: true,
                value: 0,
                error: err.to_string(),
            },
        }
    }

    pub fn list_get_strings(&self, spell_id: &str, key: &str) -> StringListResult {
        let (success, value, error) = split(self.registry.list_get_strings(&SpellId::from(spell_id), key));
        StringListResult { success, value, error }
    }

    pub fn exists(&self, spell_id: &str, key: &str) -> BoolResult {
        let (success, value, error) = split(self.registry.exists(&SpellId::from(spell_id), key));
        BoolResult { success, value, error }
    }

    pub fn set_string(&self, spell_id: &str, key: &str, value: &str) -> UnitResult {
        self.registry
            .set_string(&self.caller, &SpellId::from(spell_id), key, value)
            .into()
    }

    pub fn set_u32(&self, spell_id: &str, key: &str, value: u32) -> UnitResult {
        self.registry
            .set_u32(&self.caller, &SpellId::from(spell_id), key, value)
            .into()
    }

    pub fn list_push_string(&self, spell_id: &str, key: &str, value: &str) -> UnitResult {
        self.registry
            .list_push_string(&self.caller, &SpellId::from(spell_id), key, value)
            .into()
    }

    pub fn remove_key(&self, spell_id: &str, key: &str) -> UnitResult {
        self.registry
            .remove_key(&self.caller, &SpellId::from(spell_id), key)
            .map(|_| ())
            .into()
    }

    /// Write many keys at once.  An unknown spell fails every key.
    pub fn set_strings(&self, spell_id: &str, entries: &[(&str, &str)]) -> Vec<KeyWriteResult> {
        self.registry
            .set_strings(&self.caller, &SpellId::from(spell_id), entries)
            .unwrap_or_else(|_| {
                entries
                    .iter()
                    .map(|(key, _)| KeyWriteResult {
                        key: (*key).to_owned(),
                        result: false,
                    })
                    .collect()
            })
    }

    /// Store the first-level fields of a JSON object as strings.  Either
    /// every field is written or none is.
    pub fn set_json_fields(&self, spell_id: &str, json: &str) -> UnitResult {
        self.registry
            .set_json_fields(&self.caller, &SpellId::from(spell_id), json)
            .map(|_| ())
            .into()
    }

    // -----------------------------------------------------------------------
    // Logs and inbox
    // -----------------------------------------------------------------------

    pub fn store_log(&self, spell_id: &str, log: &str) -> UnitResult {
        self.registry
            .store_log(&self.caller, &SpellId::from(spell_id), log)
            .into()
    }

    pub fn get_logs(&self, spell_id: &str) -> LogsResult {
        let (success, logs, error) = split(self.registry.get_logs(&SpellId::from(spell_id)));
        LogsResult { success, logs, error }
    }

    pub fn push_inbox(&self, spell_id: &str, message: &str) -> UnitResult {
        self.registry
            .push_inbox(&self.caller, &SpellId::from(spell_id), message)
            .into()
    }

    pub fn get_inbox(&self, spell_id: &str) -> InboxResult {
        let (success, messages, error) = split(self.registry.get_inbox(&SpellId::from(spell_id)));
        InboxResult {
            success,
            messages,
            error,
        }
    }

    pub fn pop_inbox(&self, spell_id: &str) -> PopInboxResult {
        let (success, message, error) = split(self.registry.pop_inbox(&self.caller, &SpellId::from(spell_id)));
        PopInboxResult {
            success,
            absent: message.is_none(),
            message,
            error,
        }
    }

    // -----------------------------------------------------------------------
    // Aliases and worker status
    // -----------------------------------------------------------------------

    pub fn add_alias(&self, alias: &str, spell_id: &str) -> UnitResult {
        self.registry
            .add_alias(&self.caller.peer_id, alias, &SpellId::from(spell_id))
            .into()
    }

    fn worker_spell(&self) -> Result<SpellId, SpellError> {
        let alias = &self.registry.config().worker_spell_alias;
        self.registry
            .resolve_alias(&self.caller.peer_id, alias)
            .ok_or_else(|| SpellError::NotFound(SpellId::from(alias.as_str())))
    }

    /// Append to the status ledger of the calling worker's installation spell.
    pub fn set_worker_spell_status(&self, state: &str, message: &str) -> UnitResult {
        self.worker_spell()
            .and_then(|id| self.registry.set_status(&self.caller, &id, state, message))
            .map(|_| ())
            .into()
    }

    /// Latest worker-spell status; `NOT_STARTED` until one is set or while
    /// no worker spell is registered.
    pub fn get_worker_spell_status(&self) -> StatusRecord {
        self.worker_spell()
            .and_then(|id| self.registry.get_status(&id))
            .unwrap_or_else(|_| StatusRecord::not_started())
    }

    pub fn get_worker_spell_statuses_from(&self, timestamp: u64) -> Vec<StatusRecord> {
        match self.worker_spell() {
            Ok(id) => self
                .registry
                .get_statuses_from(&id, timestamp)
                .unwrap_or_default(),
            Err(_) if timestamp == 0 => vec![StatusRecord::not_started()],
            Err(_) => Vec::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Errors
    // -----------------------------------------------------------------------

    /// Every retained script error of `spell_id`, grouped by invocation.
    pub fn get_spell_errors(&self, spell_id: &str) -> ErrorsResult {
        let (success, invocations, error) = split(self.registry.get_all_errors(&SpellId::from(spell_id)));
        ErrorsResult {
            success,
            invocations,
            error,
        }
    }
}

fn split<T: Default>(result: Result<T, SpellError>) -> (bool, T, String) {
    match result {
        Ok(value) => (true, value, String::new()),
        Err(err)  => (false, T::default(), err.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::clock::ManualClock;
    use crate::config::EngineConfig;
    use crate::router::PeerEvent;
    use crate::runner::{runner_fn, Invocation, NoopRunner, ScriptHost};
    use crate::storage::InMemoryStorage;
    use crate::trigger::MAX_PERIOD_SEC;
    use crate::types::{ScriptError, NOT_STARTED_MESSAGE, NOT_STARTED_STATE};

    const NOW_SEC: u64 = 1_700_000_000;
    const NOW: i64 = NOW_SEC as i64;

    fn registry() -> (SpellRegistry<InMemoryStorage>, ManualClock) {
        registry_with(EngineConfig::default())
    }

    fn registry_with(config: EngineConfig) -> (SpellRegistry<InMemoryStorage>, ManualClock) {
        let clock = ManualClock::at_sec(NOW_SEC);
        let registry = SpellRegistry::new(
            config,
            Arc::new(clock.clone()),
            Arc::new(NoopRunner),
            |_: &SpellId| Ok(InMemoryStorage::new()),
        );
        (registry, clock)
    }

    #[test]
    fn bad_configs_are_rejected_with_reason() {
        let (registry, _) = registry();
        let api = SpellApi::new(&registry, Caller::peer("worker"));

        let start = NOW + 10_000;
        let end_before_start = TriggerConfigInput::periodic(start, 5).with_end(start - 1);
        let past = NOW - 100_000;
        let end_in_past = TriggerConfigInput::periodic(past, 5).with_end(past + 1);
        let too_long = TriggerConfigInput::periodic(NOW, MAX_PERIOD_SEC as i64 + 100);

        for config in [end_before_start, end_in_past, too_long] {
            let result = api.install("(null)", &config, &[]);
            assert!(!result.success);
            assert!(result.spell_id.is_empty());
            assert!(result.error.starts_with("invalid trigger config"));
        }
        assert!(api.list_spells().is_empty());
    }

    #[test]
    fn script_reads_back_verbatim() {
        let (registry, _) = registry();
        let api = SpellApi::new(&registry, Caller::peer("worker"));
        let script = "(seq (call %init_peer_id% (\"getDataSrv\" \"spell_id\") [] id) (null))";
        let id = api.install(script, &TriggerConfigInput::disabled(), &[]).spell_id;
        assert_eq!(api.get_script(&id).source, script);
    }

    #[test]
    fn oneshot_counts_once_and_future_start_counts_zero() {
        let (registry, _) = registry();
        let api = SpellApi::new(&registry, Caller::peer("worker"));
        let now_spell = api.install("", &TriggerConfigInput::oneshot(NOW), &[]).spell_id;
        let later_spell = api.install("", &TriggerConfigInput::oneshot(NOW + 600), &[]).spell_id;

        registry.run_due_timers();

        assert_eq!(api.get_counter(&now_spell).num, 1);
        assert_eq!(api.get_counter(&later_spell).num, 0);
        let trigger = api.get_trigger_event(&now_spell).unwrap();
        assert_eq!(trigger.payload.as_timer().unwrap().timestamp, NOW_SEC);
        assert!(api.get_trigger_event(&later_spell).is_none());
    }

    #[test]
    fn periodic_events_match_counter() {
        let (registry, clock) = registry();
        let api = SpellApi::new(&registry, Caller::peer("worker"));
        let id = api.install("", &TriggerConfigInput::periodic(0, 2), &[]).spell_id;

        for _ in 0..4 {
            registry.run_due_timers();
            clock.advance_secs(1);
        }

        let events = api.get_all_trigger_events(&id, 0).events;
        assert_eq!(events.len() as u64, api.get_counter(&id).num);
        let stamps: Vec<u64> = events
            .iter()
            .filter_map(|event| event.payload.as_timer().map(|timer| timer.timestamp))
            .collect();
        for pair in stamps.windows(2) {
            let gap = pair[1] - pair[0];
            assert!((2..=3).contains(&gap), "gap {gap}");
        }
    }

    #[test]
    fn non_owner_update_leaves_config() {
        let (registry, _) = registry();
        let owner = SpellApi::new(&registry, Caller::peer("worker"));
        let intruder = SpellApi::new(&registry, Caller::peer("intruder"));

        let id = owner.install("", &TriggerConfigInput::periodic(NOW + 5, 60), &[]).spell_id;
        let before = owner.get_config(&id).config;

        let result = intruder.update(&id, &TriggerConfigInput::oneshot(0));
        assert!(!result.success);
        assert_eq!(intruder.get_config(&id).config, before);
        assert!(!intruder.remove(&id).success);
    }

    #[test]
    fn connectivity_triggers_carry_direction() {
        let (registry, _) = registry();
        let api = SpellApi::new(&registry, Caller::peer("worker"));
        let id = api
            .install("", &TriggerConfigInput::disabled().on_connect().on_disconnect(), &[])
            .spell_id;

        registry.dispatch_peer_event(&PeerEvent::connected("12D3KooWPeer"));
        let connect = api.get_trigger_event(&id).unwrap();
        assert!(connect.payload.as_peer().unwrap().connected);

        registry.dispatch_peer_event(&PeerEvent::disconnected("12D3KooWPeer"));
        let disconnect = api.get_trigger_event(&id).unwrap();
        assert!(!disconnect.payload.as_peer().unwrap().connected);
        assert_eq!(api.get_counter(&id).num, 2);
    }

    #[test]
    fn batch_write_reports_every_key() {
        let (registry, _) = registry();
        let worker = SpellApi::new(&registry, Caller::peer("worker"));
        let target = worker.install("", &TriggerConfigInput::disabled(), &[]).spell_id;
        let fellow = worker.install("", &TriggerConfigInput::disabled(), &[]).spell_id;

        // The fellow spell writes into the target during its own run.
        let fellow_api = SpellApi::new(&registry, Caller::spell("worker", SpellId::from(fellow.as_str())));
        let results = fellow_api.set_strings(
            &target,
            &[("w_key", "1"), ("hw_key", "1"), ("key", "1"), ("h_key", "1"), ("wh_key", "1")],
        );
        let flags: Vec<bool> = results.iter().map(|r| r.result).collect();
        assert_eq!(flags, vec![true, true, false, false, false]);

        let host = SpellApi::new(&registry, Caller::peer("host"));
        assert!(host.set_string(&target, "h_key", "host").success);
        assert!(!host.set_string(&target, "w_key", "host").success);
        assert_eq!(host.get_string(&target, "h_key").value, "host");
    }

    #[test]
    fn unknown_spell_never_faults() {
        let (registry, _) = registry();
        let api = SpellApi::new(&registry, Caller::peer("worker"));

        assert!(!api.get_config("ghost").success);
        assert!(!api.get_script("ghost").success);
        assert!(!api.get_counter("ghost").success);
        assert!(api.get_trigger_event("ghost").is_none());
        assert!(!api.get_all_trigger_events("ghost", 0).success);
        let value = api.get_string("ghost", "k");
        assert!(!value.success && value.absent);
        assert!(!api.get_u32("ghost", "k").success);
        assert!(!api.exists("ghost", "k").success);
        assert!(!api.list_get_strings("ghost", "k").success);
        assert!(!api.set_u32("ghost", "k", 1).success);
        assert!(!api.list_push_string("ghost", "k", "v").success);
        assert!(!api.remove_key("ghost", "k").success);
        assert!(!api.get_spell_errors("ghost").success);
        assert!(api.set_strings("ghost", &[("w_a", "1")]).iter().all(|r| !r.result));
    }

    #[test]
    fn removed_spell_reads_absent() {
        let (registry, _) = registry();
        let api = SpellApi::new(&registry, Caller::peer("worker"));
        let id = api
            .install("", &TriggerConfigInput::disabled(), &[("w_k", "v")])
            .spell_id;
        assert!(api.get_string(&id, "w_k").success);

        assert!(api.remove(&id).success);
        assert!(api.get_string(&id, "w_k").absent);
        assert!(!api.get_counter(&id).success);
        assert!(!api.list_spells().contains(&id));
        assert!(!api.remove(&id).success);
    }

    #[test]
    fn string_absent_vs_present() {
        let (registry, _) = registry();
        let api = SpellApi::new(&registry, Caller::peer("worker"));
        let id = api.install("", &TriggerConfigInput::disabled(), &[]).spell_id;

        let missing = api.get_string(&id, "w_name");
        assert!(missing.success && missing.absent);
        assert!(api.set_string(&id, "w_name", "spell").success);
        let present = api.get_string(&id, "w_name");
        assert!(present.success && !present.absent);
        assert_eq!(present.value, "spell");
        assert!(api.exists(&id, "w_name").value);

        assert!(api.set_u32(&id, "w_n", 9).success);
        assert_eq!(api.get_u32(&id, "w_n").value, 9);
    }

    #[test]
    fn logs_are_written_by_the_spell_only() {
        let config = EngineConfig {
            max_logs: 3,
            ..EngineConfig::default()
        };
        let (registry, _) = registry_with(config);
        let worker = SpellApi::new(&registry, Caller::peer("worker"));
        let id = worker.install("", &TriggerConfigInput::disabled(), &[]).spell_id;
        let itself = SpellApi::new(&registry, Caller::spell("worker", SpellId::from(id.as_str())));
        let host = SpellApi::new(&registry, Caller::peer("host"));

        assert!(!worker.store_log(&id, "from worker").success);
        let refused = host.store_log(&id, "from host");
        assert!(!refused.success);
        assert!(refused.error.contains("store_log"));

        for n in 0..5 {
            assert!(itself.store_log(&id, &format!("line {n}")).success);
        }
        let logs = host.get_logs(&id);
        assert!(logs.success);
        assert_eq!(logs.logs, vec!["line 2", "line 3", "line 4"]);
        assert!(!host.get_logs("ghost").success);
    }

    #[test]
    fn inbox_takes_messages_from_anyone_and_pops_newest() {
        let config = EngineConfig {
            max_inbox_messages: 2,
            ..EngineConfig::default()
        };
        let (registry, clock) = registry_with(config);
        let worker = SpellApi::new(&registry, Caller::peer("worker"));
        let id = worker.install("", &TriggerConfigInput::disabled(), &[]).spell_id;
        let itself = SpellApi::new(&registry, Caller::spell("worker", SpellId::from(id.as_str())));
        let stranger = SpellApi::new(&registry, Caller::peer("12D3KooWStranger"));

        assert!(stranger.push_inbox(&id, "a").success);
        clock.advance_ms(1);
        assert!(worker.push_inbox(&id, "b").success);
        clock.advance_ms(1);
        assert!(stranger.push_inbox(&id, "c").success);

        let inbox = worker.get_inbox(&id);
        let texts: Vec<&str> = inbox.messages.iter().map(|m| m.message.as_str()).collect();
        assert_eq!(texts, vec!["c", "b"]);
        assert_eq!(inbox.messages[0].sender, "12D3KooWStranger");
        assert_eq!(inbox.messages[1].sender, "worker");
        assert!(inbox.messages[0].timestamp_ms > inbox.messages[1].timestamp_ms);

        let refused = worker.pop_inbox(&id);
        assert!(!refused.success);
        assert_eq!(worker.get_inbox(&id).messages.len(), 2);

        let newest = itself.pop_inbox(&id);
        assert!(newest.success && !newest.absent);
        assert_eq!(newest.message.map(|m| m.message).as_deref(), Some("c"));
        assert_eq!(itself.pop_inbox(&id).message.map(|m| m.message).as_deref(), Some("b"));
        let empty = itself.pop_inbox(&id);
        assert!(empty.success && empty.absent && empty.message.is_none());
    }

    #[test]
    fn json_fields_follow_key_permissions() {
        let (registry, _) = registry();
        let worker = SpellApi::new(&registry, Caller::peer("worker"));
        let id = worker.install("", &TriggerConfigInput::disabled(), &[]).spell_id;
        let host = SpellApi::new(&registry, Caller::peer("host"));

        assert!(host.set_json_fields(&id, r#"{"h_name": "peer", "h_size": 12}"#).success);
        assert_eq!(host.get_string(&id, "h_name").value, "\"peer\"");
        assert_eq!(host.get_string(&id, "h_size").value, "12");

        let mixed = host.set_json_fields(&id, r#"{"h_other": 1, "w_mine": 2}"#);
        assert!(!mixed.success);
        assert!(!host.exists(&id, "h_other").value);
        assert!(!host.exists(&id, "w_mine").value);

        assert!(!host.set_json_fields(&id, "not json").success);
        assert!(!host.set_json_fields("ghost", "{}").success);
    }

    #[test]
    fn worker_status_follows_the_alias() {
        let (registry, clock) = registry();
        let worker = SpellApi::new(&registry, Caller::peer("worker"));

        let status = worker.get_worker_spell_status();
        assert_eq!(status.state, NOT_STARTED_STATE);
        assert_eq!(status.message, NOT_STARTED_MESSAGE);
        assert_eq!(worker.get_worker_spell_statuses_from(0).len(), 1);
        assert!(!worker.set_worker_spell_status("INSTALLATION_IN_PROGRESS", "").success);

        let id = worker.install("", &TriggerConfigInput::disabled(), &[]).spell_id;
        assert!(worker.add_alias("worker-spell", &id).success);
        assert_eq!(worker.get_worker_spell_statuses_from(0), vec![StatusRecord::not_started()]);

        let states = ["INSTALLATION_IN_PROGRESS", "INSTALLATION_SUCCESSFUL", "UNINSTALLING"];
        for state in states {
            assert!(worker.set_worker_spell_status(state, "step").success);
            clock.advance_ms(3);
        }

        let history = worker.get_worker_spell_statuses_from(0);
        let recorded: Vec<&str> = history.iter().map(|record| record.state.as_str()).collect();
        assert_eq!(recorded, states.to_vec());
        assert!(history.windows(2).all(|pair| pair[0].timestamp < pair[1].timestamp));

        let last = worker.get_worker_spell_status();
        assert_eq!(last.state, "UNINSTALLING");
        assert_eq!(worker.get_worker_spell_statuses_from(last.timestamp), vec![last]);

        // Another worker has its own namespace.
        let other = SpellApi::new(&registry, Caller::peer("other-worker"));
        assert_eq!(other.get_worker_spell_status().state, NOT_STARTED_STATE);
    }

    #[test]
    fn spell_errors_are_grouped_per_invocation() {
        let clock = ManualClock::at_sec(NOW_SEC);
        let runner = runner_fn(|inv: &Invocation, _: &ScriptHost<'_, InMemoryStorage>| {
            Err(ScriptError::new(10_002, format!("failed on {}", inv.trigger.payload.kind())))
        });
        let registry = SpellRegistry::new(
            EngineConfig::default(),
            Arc::new(clock.clone()),
            runner,
            |_: &SpellId| Ok(InMemoryStorage::new()),
        );
        let api = SpellApi::new(&registry, Caller::peer("worker"));
        let id = api.install("", &TriggerConfigInput::periodic(0, 1), &[]).spell_id;

        registry.run_due_timers();
        clock.advance_secs(1);
        registry.run_due_timers();

        let errors = api.get_spell_errors(&id);
        assert!(errors.success);
        assert_eq!(errors.invocations.len(), 2);
        for group in &errors.invocations {
            assert!(group.invocation_id.contains(&id));
            assert_eq!(group.errors.len(), 1);
            assert_eq!(group.errors[0].error.message, "failed on timer");
        }
        assert_eq!(api.get_counter(&id).num, 2);
    }
}
