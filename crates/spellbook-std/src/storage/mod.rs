// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Durable [`Storage`](spellbook_core::storage::Storage) backends.

pub mod file;
