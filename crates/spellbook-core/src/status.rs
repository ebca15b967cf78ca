// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Append-only status ledger.
//!
//! Records are never modified or removed.  Timestamps are strictly
//! increasing: a record set within the same millisecond as its predecessor
//! is stamped one millisecond later.  A ledger that was never written
//! reports a single implicit `NOT_STARTED` record with timestamp 0.

use serde::{Deserialize, Serialize};

use crate::types::StatusRecord;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusLedger {
    records: Vec<StatusRecord>,
}

impl StatusLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record stamped at `now_ms` (or just after the previous one).
    pub fn append(&mut self, state: impl Into<String>, message: impl Into<String>, now_ms: u64) -> StatusRecord {
        let floor = self.records.last().map_or(1, |last| last.timestamp + 1);
        let record = StatusRecord {
            state: state.into(),
            message: message.into(),
            timestamp: now_ms.max(floor),
        };
        self.records.push(record.clone());
        record
    }

    /// The most recent record.
    pub fn latest(&self) -> StatusRecord {
        self.records.last().cloned().unwrap_or_else(StatusRecord::not_started)
    }

    /// Records with `timestamp >= since`, oldest first.
    ///
    /// ```rust
    /// use spellbook_core::status::StatusLedger;
    ///
    /// let mut ledger = StatusLedger::new();
    /// assert_eq!(ledger.from(0)[0].state, "NOT_STARTED");
    ///
    /// let first = ledger.append("INSTALLING", "", 500);
    /// ledger.append("INSTALLED", "", 500);
    /// assert_eq!(ledger.from(0).len(), 2);
    /// assert_eq!(ledger.from(first.timestamp + 1).len(), 1);
    /// ```
    pub fn from(&self, since: u64) -> Vec<StatusRecord> {
        if self.records.is_empty() {
            let implicit = StatusRecord::not_started();
            return if implicit.timestamp >= since { vec![implicit] } else { Vec::new() };
        }
        self.records
            .iter()
            .filter(|record| record.timestamp >= since)
            .cloned()
            .collect()
    }

    /// Number of explicitly set records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NOT_STARTED_MESSAGE, NOT_STARTED_STATE};

    #[test]
    fn empty_ledger_reports_not_started() {
        let ledger = StatusLedger::new();
        let latest = ledger.latest();
        assert_eq!(latest.state, NOT_STARTED_STATE);
        assert_eq!(latest.message, NOT_STARTED_MESSAGE);
        assert_eq!(ledger.from(0), vec![latest]);
        assert!(ledger.from(1).is_empty());
    }

    #[test]
    fn implicit_record_disappears_after_first_write() {
        let mut ledger = StatusLedger::new();
        ledger.append("INSTALLATION_IN_PROGRESS", "", 1_000);
        ledger.append("INSTALLATION_SUCCESSFUL", "", 2_000);
        let states: Vec<String> = ledger.from(0).into_iter().map(|record| record.state).collect();
        assert_eq!(states, vec!["INSTALLATION_IN_PROGRESS", "INSTALLATION_SUCCESSFUL"]);
    }

    #[test]
    fn timestamps_strictly_increase_within_one_millisecond() {
        let mut ledger = StatusLedger::new();
        let stamps: Vec<u64> = (0..3).map(|n| ledger.append(format!("S{n}"), "", 42).timestamp).collect();
        assert_eq!(stamps, vec![42, 43, 44]);
    }

    #[test]
    fn clock_going_backwards_still_increases() {
        let mut ledger = StatusLedger::new();
        ledger.append("A", "", 1_000);
        assert_eq!(ledger.append("B", "", 900).timestamp, 1_001);
    }

    #[test]
    fn from_is_inclusive_of_its_bound() {
        let mut ledger = StatusLedger::new();
        ledger.append("A", "", 10);
        let last = ledger.append("B", "", 20);
        assert_eq!(ledger.from(last.timestamp), vec![last]);
    }

    #[test]
    fn zero_clock_yields_positive_first_stamp() {
        let mut ledger = StatusLedger::new();
        assert_eq!(ledger.append("A", "", 0).timestamp, 1);
    }
}
