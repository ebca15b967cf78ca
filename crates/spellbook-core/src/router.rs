// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Routing of peer-connectivity and block events to subscribed spells.
//!
//! The router only answers "who wants this event"; delivery is done by the
//! registry, which re-checks the spell's live configuration under its lock.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::trigger::{BlockChainConfig, ConnectionPoolConfig, TriggerConfig};
use crate::types::{PeerTrigger, SpellId, TriggerPayload};

/// A peer connected to or disconnected from the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerEvent {
    pub peer_id: String,
    pub connected: bool,
}

impl PeerEvent {
    pub fn connected(peer_id: impl Into<String>) -> Self {
        Self {
            peer_id: peer_id.into(),
            connected: true,
        }
    }

    pub fn disconnected(peer_id: impl Into<String>) -> Self {
        Self {
            peer_id: peer_id.into(),
            connected: false,
        }
    }

    /// The mailbox payload recorded for this event.
    pub fn to_payload(&self) -> TriggerPayload {
        TriggerPayload::Peer(PeerTrigger {
            peer_id: self.peer_id.clone(),
            connected: self.connected,
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct Subscription {
    connections: ConnectionPoolConfig,
    blockchain: BlockChainConfig,
}

#[derive(Debug, Default)]
pub struct EventRouter {
    subscriptions: HashMap<SpellId, Subscription>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the subscriptions of `spell_id` with those of `config`.
    pub fn subscribe(&mut self, spell_id: &SpellId, config: &TriggerConfig) {
        if config.has_subscriptions() {
            self.subscriptions.insert(
                spell_id.clone(),
                Subscription {
                    connections: *config.connections(),
                    blockchain: *config.blockchain(),
                },
            );
        } else {
            self.subscriptions.remove(spell_id);
        }
    }

    pub fn unsubscribe(&mut self, spell_id: &SpellId) -> bool {
        self.subscriptions.remove(spell_id).is_some()
    }

    /// Spells subscribed to this connectivity change, sorted by id.
    pub fn route_peer(&self, event: &PeerEvent) -> Vec<SpellId> {
        self.matching(|sub| sub.connections.wants(event.connected))
    }

    /// Spells whose block window covers `height`, sorted by id.
    pub fn route_block(&self, height: u64) -> Vec<SpellId> {
        self.matching(|sub| sub.blockchain.covers(height))
    }

    pub fn is_subscribed(&self, spell_id: &SpellId) -> bool {
        self.subscriptions.contains_key(spell_id)
    }

    fn matching(&self, wants: impl Fn(&Subscription) -> bool) -> Vec<SpellId> {
        let mut ids: Vec<SpellId> = self
            .subscriptions
            .iter()
            .filter(|(_, sub)| wants(sub))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }
}
