// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! # spellbook-std
//!
//! Filesystem storage backends for `spellbook-core`.
//!
//! This crate provides [`FileStorage`], a JSON file-backed implementation of
//! the [`Storage`](spellbook_core::storage::Storage) trait, and
//! [`SpellDirectory`], which hands out one file per spell and reloads them
//! after a restart.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use spellbook_core::{EngineConfig, NoopRunner, SpellRegistry, SystemClock};
//! use spellbook_std::SpellDirectory;
//!
//! let spells = SpellDirectory::open("/var/lib/spellbook/spells")
//!     .expect("failed to open spell directory");
//!
//! let registry = SpellRegistry::new(
//!     EngineConfig::default(),
//!     Arc::new(SystemClock),
//!     Arc::new(NoopRunner),
//!     spells.factory(),
//! );
//! spells.restore_into(&registry).expect("failed to restore spells");
//! ```

pub mod storage;

pub use storage::file::{FileStorage, SpellDirectory};
