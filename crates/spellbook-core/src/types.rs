// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Shared data types used across the spell engine.
//!
//! Value types implement [`Clone`], [`Debug`], [`serde::Serialize`], and
//! [`serde::Deserialize`] so they can be persisted in spell snapshots and
//! handed to hosts as JSON without additional conversion steps.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SpellError;
use crate::trigger::TriggerConfig;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Opaque, globally unique spell identifier.
///
/// Ids are minted by the registry at install time and never reused.
///
/// # Examples
///
/// ```rust
/// use spellbook_core::types::SpellId;
///
/// let a = SpellId::mint();
/// let b = SpellId::mint();
/// assert_ne!(a, b);
/// assert_eq!(SpellId::from("abc").as_str(), "abc");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpellId(String);

impl SpellId {
    /// Wrap an existing id string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint a fresh random id.
    pub fn mint() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SpellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SpellId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for SpellId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// The identity performing an operation.
///
/// `peer_id` is the calling peer.  `spell_id` is set when the call
/// originates from a running spell script.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Caller {
    /// Peer the call arrives from.
    pub peer_id: String,
    /// Spell whose script issued the call, if any.
    pub spell_id: Option<SpellId>,
}

impl Caller {
    /// A caller acting directly as a peer, outside of any spell.
    pub fn peer(peer_id: impl Into<String>) -> Self {
        Self {
            peer_id: peer_id.into(),
            spell_id: None,
        }
    }

    /// A caller acting from inside the script of `spell_id`.
    pub fn spell(peer_id: impl Into<String>, spell_id: SpellId) -> Self {
        Self {
            peer_id: peer_id.into(),
            spell_id: Some(spell_id),
        }
    }
}

// ---------------------------------------------------------------------------
// Trigger events
// ---------------------------------------------------------------------------

/// A clock tick.  `timestamp` is the wall-clock second the tick fired at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerTrigger {
    pub timestamp: u64,
}

/// A peer connected to or disconnected from the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerTrigger {
    pub peer_id: String,
    pub connected: bool,
}

/// A new block was observed at `height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockTrigger {
    pub height: u64,
}

/// Payload of a delivered trigger, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerPayload {
    Timer(TimerTrigger),
    Peer(PeerTrigger),
    Blockchain(BlockTrigger),
}

impl TriggerPayload {
    /// Short kind label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            TriggerPayload::Timer(_)      => "timer",
            TriggerPayload::Peer(_)       => "peer",
            TriggerPayload::Blockchain(_) => "blockchain",
        }
    }

    pub fn as_timer(&self) -> Option<&TimerTrigger> {
        match self {
            TriggerPayload::Timer(timer) => Some(timer),
            _ => None,
        }
    }

    pub fn as_peer(&self) -> Option<&PeerTrigger> {
        match self {
            TriggerPayload::Peer(peer) => Some(peer),
            _ => None,
        }
    }

    pub fn as_block(&self) -> Option<&BlockTrigger> {
        match self {
            TriggerPayload::Blockchain(block) => Some(block),
            _ => None,
        }
    }
}

/// A trigger as recorded in a spell's mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEvent {
    /// Per-spell delivery sequence number, starting at 0.
    pub seq: u64,
    /// Delivery time in Unix milliseconds.
    pub delivered_at_ms: u64,
    pub payload: TriggerPayload,
}

// ---------------------------------------------------------------------------
// Inbox
// ---------------------------------------------------------------------------

/// A message left in a spell's inbox by any peer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboxMessage {
    /// Peer that pushed the message.
    pub sender: String,
    pub timestamp_ms: u64,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// State reported before any status was ever set.
pub const NOT_STARTED_STATE: &str = "NOT_STARTED";

/// Message paired with [`NOT_STARTED_STATE`].
pub const NOT_STARTED_MESSAGE: &str = "Installation has not started yet";

/// One entry of a spell's status ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub state: String,
    pub message: String,
    /// Unix milliseconds; strictly increasing within one ledger.
    pub timestamp: u64,
}

impl StatusRecord {
    /// The implicit record reported by a ledger that was never written.
    ///
    /// ```rust
    /// use spellbook_core::types::StatusRecord;
    ///
    /// let record = StatusRecord::not_started();
    /// assert_eq!(record.state, "NOT_STARTED");
    /// assert_eq!(record.timestamp, 0);
    /// ```
    pub fn not_started() -> Self {
        Self {
            state: NOT_STARTED_STATE.to_owned(),
            message: NOT_STARTED_MESSAGE.to_owned(),
            timestamp: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Script errors
// ---------------------------------------------------------------------------

/// Failure reported by a spell script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("script failed at `{instruction}` (code {error_code}): {message}")]
pub struct ScriptError {
    pub error_code: u32,
    /// The script instruction that failed.
    pub instruction: String,
    pub message: String,
    /// Peer the failing instruction ran on.
    pub peer_id: String,
}

impl ScriptError {
    pub fn new(error_code: u32, message: impl Into<String>) -> Self {
        Self {
            error_code,
            instruction: String::new(),
            message: message.into(),
            peer_id: String::new(),
        }
    }

    pub fn at(mut self, instruction: impl Into<String>, peer_id: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self.peer_id = peer_id.into();
        self
    }
}

/// A recorded script error, keyed by the invocation that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    /// `spell_<spell_id>_<counter>` of the failing invocation.
    pub invocation_id: String,
    pub timestamp_ms: u64,
    /// Position of this error among the invocation's errors.
    pub error_idx: u32,
    pub error: ScriptError,
}

/// All errors recorded for a single invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationErrors {
    pub invocation_id: String,
    pub errors: Vec<ErrorEntry>,
}

// ---------------------------------------------------------------------------
// Key-value store
// ---------------------------------------------------------------------------

/// A typed value held under a key in a spell's store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum StoredValue {
    String(String),
    U32(u32),
    List(Vec<String>),
}

/// Per-key outcome of a batch write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyWriteResult {
    pub key: String,
    pub result: bool,
}

// ---------------------------------------------------------------------------
// Host surface results
// ---------------------------------------------------------------------------

/// Outcome of an operation that returns no value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitResult {
    pub success: bool,
    pub error: String,
}

impl UnitResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: String::new(),
        }
    }

    pub fn failed(error: &SpellError) -> Self {
        Self {
            success: false,
            error: error.to_string(),
        }
    }
}

impl From<Result<(), SpellError>> for UnitResult {
    fn from(result: Result<(), SpellError>) -> Self {
        match result {
            Ok(())   => Self::ok(),
            Err(err) => Self::failed(&err),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallResult {
    pub success: bool,
    pub spell_id: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigResult {
    pub success: bool,
    pub config: TriggerConfig,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptResult {
    pub success: bool,
    pub source: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterResult {
    pub success: bool,
    pub num: u64,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringResult {
    pub success: bool,
    /// `true` when the key holds no string value.
    pub absent: bool,
    pub value: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct U32Result {
    pub success: bool,
    pub absent: bool,
    pub value: u32,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringListResult {
    pub success: bool,
    pub value: Vec<String>,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoolResult {
    pub success: bool,
    pub value: bool,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEventsResult {
    pub success: bool,
    pub events: Vec<TriggerEvent>,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorsResult {
    pub success: bool,
    pub invocations: Vec<InvocationErrors>,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogsResult {
    pub success: bool,
    pub logs: Vec<String>,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboxResult {
    pub success: bool,
    /// Newest message first.
    pub messages: Vec<InboxMessage>,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopInboxResult {
    pub success: bool,
    /// `true` when the inbox was empty.
    pub absent: bool,
    pub message: Option<InboxMessage>,
    pub error: String,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_serialises_with_kind_tag() {
        let payload = TriggerPayload::Peer(PeerTrigger {
            peer_id: "12D3".into(),
            connected: true,
        });
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["peer"]["peer_id"], "12D3");
        assert_eq!(json["peer"]["connected"], true);
    }

    #[test]
    fn stored_value_is_adjacently_tagged() {
        let json = serde_json::to_value(StoredValue::U32(7)).unwrap();
        assert_eq!(json["type"], "u32");
        assert_eq!(json["value"], 7);
    }

    #[test]
    fn unit_result_from_error_carries_message() {
        let result = UnitResult::from(Err(SpellError::NotFound(SpellId::from("x"))));
        assert!(!result.success);
        assert_eq!(result.error, "spell x not found");
    }

    #[test]
    fn script_error_display_names_instruction() {
        let err = ScriptError::new(10_000, "boom").at("(call %init_peer_id% (\"op\" \"noop\"))", "peer");
        assert!(err.to_string().contains("code 10000"));
        assert!(err.to_string().contains("boom"));
    }
}
