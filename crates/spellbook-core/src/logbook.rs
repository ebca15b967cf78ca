// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Lines a spell writes about itself.
//!
//! The log is capped: once `max_logs` lines are held, each new line evicts
//! the oldest one.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Bounded, oldest-first log of a spell's own messages.
///
/// ```rust
/// use spellbook_core::logbook::LogBook;
///
/// let mut log = LogBook::new();
/// for n in 0..4 {
///     log.push(format!("line {n}"), 3);
/// }
/// assert_eq!(log.lines(), vec!["line 1", "line 2", "line 3"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogBook {
    lines: VecDeque<String>,
}

impl LogBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, line: String, max_logs: usize) {
        self.lines.push_back(line);
        while self.lines.len() > max_logs.max(1) {
            self.lines.pop_front();
        }
    }

    /// Every retained line, oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
