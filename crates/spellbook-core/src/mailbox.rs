// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Per-spell trigger mailbox.
//!
//! Delivered triggers are appended in delivery order and never dropped.
//! Reading the latest trigger advances a read cursor; the history stays
//! queryable through [`TriggerMailbox::all_since`].

use serde::{Deserialize, Serialize};

use crate::types::{TriggerEvent, TriggerPayload};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerMailbox {
    events: Vec<TriggerEvent>,
    next_seq: u64,
    /// Sequence number of the last event handed out by `latest`.
    last_read: Option<u64>,
}

impl TriggerMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a mailbox from stored history.  Events are ordered by
    /// sequence number and the next sequence continues after the highest.
    pub fn restore(mut events: Vec<TriggerEvent>, last_read: Option<u64>) -> Self {
        events.sort_by_key(|event| event.seq);
        let next_seq = events.last().map_or(0, |event| event.seq + 1);
        Self {
            events,
            next_seq,
            last_read,
        }
    }

    /// Record a delivery and return the stored event.
    pub fn append(&mut self, payload: TriggerPayload, delivered_at_ms: u64) -> TriggerEvent {
        let event = TriggerEvent {
            seq: self.next_seq,
            delivered_at_ms,
            payload,
        };
        self.next_seq += 1;
        self.events.push(event.clone());
        event
    }

    /// The most recent event, marking it as read.
    pub fn latest(&mut self) -> Option<TriggerEvent> {
        let event = self.events.last()?.clone();
        self.last_read = Some(event.seq);
        Some(event)
    }

    pub fn last_read(&self) -> Option<u64> {
        self.last_read
    }

    /// Events delivered strictly after `since_ms`, in delivery order.
    /// `0` returns the full history.
    ///
    /// ```rust
    /// use spellbook_core::mailbox::TriggerMailbox;
    /// use spellbook_core::types::{BlockTrigger, TriggerPayload};
    ///
    /// let mut mailbox = TriggerMailbox::new();
    /// mailbox.append(TriggerPayload::Blockchain(BlockTrigger { height: 1 }), 1_000);
    /// mailbox.append(TriggerPayload::Blockchain(BlockTrigger { height: 2 }), 2_000);
    /// assert_eq!(mailbox.all_since(0).len(), 2);
    /// assert_eq!(mailbox.all_since(1_000).len(), 1);
    /// ```
    pub fn all_since(&self, since_ms: u64) -> Vec<TriggerEvent> {
        self.events
            .iter()
            .filter(|event| since_ms == 0 || event.delivered_at_ms > since_ms)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
