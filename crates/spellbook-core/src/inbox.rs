// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Per-spell inbox of messages from other peers.
//!
//! Unlike the trigger mailbox, the inbox is written by arbitrary callers and
//! consumed by the spell: reads return the newest message first and
//! [`Inbox::pop`] takes the newest one.  At most `max_messages` are held;
//! the oldest is evicted first.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::types::InboxMessage;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inbox {
    /// Oldest first.
    messages: VecDeque<InboxMessage>,
}

impl Inbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: InboxMessage, max_messages: usize) {
        self.messages.push_back(message);
        while self.messages.len() > max_messages.max(1) {
            self.messages.pop_front();
        }
    }

    /// Every held message, newest first.
    pub fn newest_first(&self) -> Vec<InboxMessage> {
        self.messages.iter().rev().cloned().collect()
    }

    /// Remove and return the newest message.
    pub fn pop(&mut self) -> Option<InboxMessage> {
        self.messages.pop_back()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
