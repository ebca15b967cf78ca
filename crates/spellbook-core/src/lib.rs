// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! # spellbook-core
//!
//! Scheduling and trigger delivery for long-lived spells hosted on a peer.
//!
//! A spell is a stored script owned by a worker, with a trigger
//! configuration (clock, peer connectivity, block heights), a prefix-scoped
//! key-value store, a trigger mailbox, an inbox for messages from other
//! peers, a status ledger, an error log and a log of its own lines.
//! Enable the `async` feature (on by default) for the Tokio-driven
//! [`runtime::SpellRuntime`].
//!
//! ## Architecture
//!
//! ```text
//! SpellRegistry<S: Storage>
//!   ├── Scheduler         timer heap, one armed slot per spell
//!   ├── EventRouter       peer and block subscriptions
//!   ├── aliases           per-worker alias namespace
//!   └── SpellCell<S>      one lock per spell
//!         ├── KeyValueStore   guarded by prefix permissions
//!         ├── TriggerMailbox  delivered triggers, read cursor
//!         ├── StatusLedger    worker installation status
//!         ├── ErrorLog        script errors per invocation
//!         ├── LogBook         lines written by the spell, capped
//!         ├── Inbox           messages from any peer, capped
//!         └── S               persistence backend
//!
//! SpellApi       flag-returning host surface over the registry
//! SpellRuntime   timer task plus one ordered queue per spell
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use spellbook_core::{
//!     config::EngineConfig,
//!     registry::SpellRegistry,
//!     runner::NoopRunner,
//!     trigger::TriggerConfigInput,
//!     types::Caller,
//! };
//!
//! let registry = SpellRegistry::in_memory(EngineConfig::default(), Arc::new(NoopRunner));
//!
//! // Fire once, as soon as the scheduler runs.
//! let id = registry
//!     .install("12D3KooWWorker", "(null)", &TriggerConfigInput::oneshot(1), &[])
//!     .unwrap();
//! assert_eq!(registry.run_due_timers(), 1);
//! assert_eq!(registry.get_counter(&id).unwrap(), 1);
//!
//! // The host may write `h_` keys; the worker may not.
//! let host = Caller::peer("host");
//! assert!(registry.set_string(&host, &id, "h_note", "seen").is_ok());
//! let worker = Caller::peer("12D3KooWWorker");
//! assert!(registry.set_string(&worker, &id, "h_note", "mine").is_err());
//! ```

pub mod api;
pub mod clock;
pub mod config;
pub mod config_loader;
pub mod error;
pub mod error_log;
pub mod inbox;
pub mod kv;
pub mod logbook;
pub mod mailbox;
pub mod permission;
pub mod registry;
pub mod router;
pub mod runner;
pub mod runtime;
pub mod scheduler;
mod spell;
pub mod status;
pub mod storage;
pub mod trigger;
pub mod types;

pub use api::SpellApi;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use error::SpellError;
pub use registry::SpellRegistry;
pub use runner::{runner_fn, Invocation, NoopRunner, ScriptHost, ScriptRunner};
pub use storage::{InMemoryStorage, SpellSnapshot, Storage};
pub use trigger::{TriggerConfig, TriggerConfigInput};
pub use types::{Caller, InboxMessage, ScriptError, SpellId, StatusRecord, TriggerEvent, TriggerPayload};

#[cfg(feature = "async")]
pub use runtime::SpellRuntime;
