// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Storage abstraction for spell state.
//!
//! Each installed spell owns one [`Storage`] instance created by the
//! registry's storage factory.  After every state change the registry hands
//! the backend a [`SpellSnapshot`]; on removal it calls [`Storage::purge`].
//!
//! Trigger history is append-only and is kept out of the snapshot: each
//! delivered trigger reaches the backend once, through
//! [`Storage::append_trigger`].  Loaders put the history back into
//! [`SpellSnapshot::triggers`] before restoring.
//! This crate ships [`InMemoryStorage`], which keeps nothing beyond the
//! process.  Durable implementations live in downstream crates.
//!
//! # Implementing `Storage`
//!
//! ```rust,no_run
//! use spellbook_core::error::SpellError;
//! use spellbook_core::storage::{SpellSnapshot, Storage};
//! use spellbook_core::types::TriggerEvent;
//!
//! struct LogOnly;
//!
//! impl Storage for LogOnly {
//!     fn persist(&mut self, snapshot: &SpellSnapshot) -> Result<(), SpellError> {
//!         println!("spell {} at counter {}", snapshot.id, snapshot.counter);
//!         Ok(())
//!     }
//!     fn append_trigger(&mut self, event: &TriggerEvent) -> Result<(), SpellError> {
//!         println!("trigger {} delivered", event.seq);
//!         Ok(())
//!     }
//!     fn purge(&mut self) -> Result<(), SpellError> {
//!         Ok(())
//!     }
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::error::SpellError;
use crate::error_log::ErrorLog;
use crate::inbox::Inbox;
use crate::kv::KeyValueStore;
use crate::logbook::LogBook;
use crate::status::StatusLedger;
use crate::trigger::TriggerConfig;
use crate::types::{SpellId, TriggerEvent};

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Complete persisted state of one spell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpellSnapshot {
    pub id: SpellId,
    /// Worker peer that installed the spell.
    pub owner: String,
    pub script: String,
    pub config: TriggerConfig,
    pub counter: u64,
    pub store: KeyValueStore,
    /// Sequence number of the last trigger handed out as "latest".
    #[serde(default)]
    pub trigger_cursor: Option<u64>,
    pub statuses: StatusLedger,
    pub errors: ErrorLog,
    #[serde(default)]
    pub logs: LogBook,
    #[serde(default)]
    pub inbox: Inbox,
    /// Aliases bound to this spell on its worker.
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Delivered triggers.  Always empty in snapshots handed to
    /// [`Storage::persist`]; filled in by loaders from the history recorded
    /// through [`Storage::append_trigger`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub triggers: Vec<TriggerEvent>,
}

// ---------------------------------------------------------------------------
// Storage trait
// ---------------------------------------------------------------------------

/// Pluggable persistence for a single spell.
///
/// Failures are reported to the registry, which logs them and keeps the
/// in-memory state authoritative.
pub trait Storage: Send {
    /// Record the latest state of the spell.
    fn persist(&mut self, snapshot: &SpellSnapshot) -> Result<(), SpellError>;

    /// Record one delivered trigger.  Called once per delivery, before the
    /// script runs.
    fn append_trigger(&mut self, event: &TriggerEvent) -> Result<(), SpellError>;

    /// Delete everything stored for the spell.
    fn purge(&mut self) -> Result<(), SpellError>;

    /// Whether snapshots should be built for this backend at all.
    ///
    /// Backends that drop snapshots return `false` so the registry can skip
    /// the copy.
    fn is_durable(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// InMemoryStorage
// ---------------------------------------------------------------------------

/// Process-local backend.  Spell state lives only in the registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct InMemoryStorage;

impl InMemoryStorage {
    pub fn new() -> Self {
        Self
    }
}

impl Storage for InMemoryStorage {
    fn persist(&mut self, _snapshot: &SpellSnapshot) -> Result<(), SpellError> {
        Ok(())
    }

    fn append_trigger(&mut self, _event: &TriggerEvent) -> Result<(), SpellError> {
        Ok(())
    }

    fn purge(&mut self) -> Result<(), SpellError> {
        Ok(())
    }

    fn is_durable(&self) -> bool {
        false
    }
}
