// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Per-spell log of script errors, grouped by invocation.
//!
//! Only the most recent `max_invocations` failing invocations are kept; when
//! a new invocation's first error arrives past the cap, every entry of the
//! oldest invocation is evicted.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::types::{ErrorEntry, InvocationErrors};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorLog {
    entries: Vec<ErrorEntry>,
    /// Invocation ids with at least one entry, oldest first.
    invocations: VecDeque<String>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `entry`, evicting the oldest invocations beyond the cap.
    pub fn record(&mut self, entry: ErrorEntry, max_invocations: usize) {
        if !self.invocations.contains(&entry.invocation_id) {
            self.invocations.push_back(entry.invocation_id.clone());
        }
        self.entries.push(entry);

        while self.invocations.len() > max_invocations.max(1) {
            if let Some(evicted) = self.invocations.pop_front() {
                self.entries.retain(|entry| entry.invocation_id != evicted);
            }
        }
    }

    /// Errors of one invocation in recording order.
    pub fn for_invocation(&self, invocation_id: &str) -> Vec<ErrorEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.invocation_id == invocation_id)
            .cloned()
            .collect()
    }

    /// All retained errors grouped by invocation, oldest invocation first.
    pub fn grouped(&self) -> Vec<InvocationErrors> {
        self.invocations
            .iter()
            .map(|invocation_id| InvocationErrors {
                invocation_id: invocation_id.clone(),
                errors: self.for_invocation(invocation_id),
            })
            .collect()
    }

    /// Number of invocations with retained errors.
    pub fn invocation_count(&self) -> usize {
        self.invocations.len()
    }

    /// Next free `error_idx` for `invocation_id`.
    pub fn next_index(&self, invocation_id: &str) -> u32 {
        let count = self
            .entries
            .iter()
            .filter(|entry| entry.invocation_id == invocation_id)
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
