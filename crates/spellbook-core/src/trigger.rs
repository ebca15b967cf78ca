// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Trigger configuration and its validation.
//!
//! Hosts submit a [`TriggerConfigInput`], whose numeric fields are signed so
//! that a negative value can be reported instead of silently wrapping.
//! [`TriggerConfig::validate`] turns it into the unsigned [`TriggerConfig`]
//! the engine stores.  A `TriggerConfig` can only be obtained through
//! validation, so every stored configuration satisfies the rules below.
//!
//! Rules, checked in order; the first failure wins:
//!
//! 1. no field is negative,
//! 2. `period_sec` does not exceed [`MAX_PERIOD_SEC`],
//! 3. a non-zero `end_sec` is not before `start_sec`,
//! 4. a non-zero `end_sec` is not already in the past.
//!
//! A zero `end_sec` (or `end_block`) means "no end".

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest accepted clock period: one hundred 365-day years, in seconds.
pub const MAX_PERIOD_SEC: u64 = 100 * 365 * 24 * 60 * 60;

// ---------------------------------------------------------------------------
// Rejection reasons
// ---------------------------------------------------------------------------

/// Why a proposed trigger configuration was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigRejection {
    #[error("`{field}` must not be negative")]
    NegativeValue { field: &'static str },

    #[error("end_sec {end_sec} is before start_sec {start_sec}")]
    EndBeforeStart { start_sec: u64, end_sec: u64 },

    #[error("period_sec {period_sec} exceeds the ceiling of {ceiling} seconds", ceiling = MAX_PERIOD_SEC)]
    PeriodTooLong { period_sec: u64 },

    #[error("end_sec {end_sec} is already in the past (now {now_sec})")]
    EndInPast { end_sec: u64, now_sec: u64 },
}

// ---------------------------------------------------------------------------
// Unvalidated input
// ---------------------------------------------------------------------------

/// Clock section of a proposed configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockInput {
    pub start_sec: i64,
    pub end_sec: i64,
    pub period_sec: i64,
}

/// Blockchain section of a proposed configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockChainInput {
    pub start_block: i64,
    pub end_block: i64,
}

/// A trigger configuration as submitted by a host, before validation.
///
/// The builder methods cover the common shapes:
///
/// ```rust
/// use spellbook_core::trigger::{TriggerConfig, TriggerConfigInput};
///
/// let input = TriggerConfigInput::periodic(0, 60).on_connect();
/// let config = TriggerConfig::validate(&input, 1_700_000_000).unwrap();
/// assert_eq!(config.clock().period_sec, 60);
/// assert!(config.connections().connect);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerConfigInput {
    #[serde(default)]
    pub clock: ClockInput,
    #[serde(default)]
    pub connections: ConnectionPoolConfig,
    #[serde(default)]
    pub blockchain: BlockChainInput,
}

impl TriggerConfigInput {
    /// A configuration with every trigger source disabled.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Fire once at `start_sec`; `0` means "as soon as possible".
    ///
    /// A oneshot with `start_sec == 0` is indistinguishable from a disabled
    /// clock, so the immediate form uses `start_sec = 1`, which lies in the
    /// past for any real clock.
    pub fn oneshot(start_sec: i64) -> Self {
        let mut input = Self::default();
        input.clock.start_sec = start_sec.max(1);
        input
    }

    /// Fire every `period_sec` seconds starting at `start_sec` (`0` = now).
    pub fn periodic(start_sec: i64, period_sec: i64) -> Self {
        let mut input = Self::default();
        input.clock.start_sec = start_sec;
        input.clock.period_sec = period_sec;
        input
    }

    /// Fire on block heights in `start_block..=end_block` (`0` = unbounded).
    pub fn blocks(start_block: i64, end_block: i64) -> Self {
        let mut input = Self::default();
        input.blockchain = BlockChainInput { start_block, end_block };
        input
    }

    pub fn with_end(mut self, end_sec: i64) -> Self {
        self.clock.end_sec = end_sec;
        self
    }

    pub fn on_connect(mut self) -> Self {
        self.connections.connect = true;
        self
    }

    pub fn on_disconnect(mut self) -> Self {
        self.connections.disconnect = true;
        self
    }
}

// ---------------------------------------------------------------------------
// Validated configuration
// ---------------------------------------------------------------------------

/// Validated clock trigger settings, in Unix seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockConfig {
    pub start_sec: u64,
    pub end_sec: u64,
    pub period_sec: u64,
}

impl ClockConfig {
    /// The clock is off when neither a start nor a period is set.  An end
    /// time alone does not schedule anything.
    pub fn is_disabled(&self) -> bool {
        self.start_sec == 0 && self.period_sec == 0
    }

    pub fn is_oneshot(&self) -> bool {
        !self.is_disabled() && self.period_sec == 0
    }
}

/// Which peer connectivity changes should trigger the spell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionPoolConfig {
    pub connect: bool,
    pub disconnect: bool,
}

impl ConnectionPoolConfig {
    pub fn is_disabled(&self) -> bool {
        !self.connect && !self.disconnect
    }

    /// Whether a change with the given direction is subscribed to.
    pub fn wants(&self, connected: bool) -> bool {
        if connected {
            self.connect
        } else {
            self.disconnect
        }
    }
}

/// Validated block-height window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockChainConfig {
    pub start_block: u64,
    pub end_block: u64,
}

impl BlockChainConfig {
    pub fn is_disabled(&self) -> bool {
        self.start_block == 0 && self.end_block == 0
    }

    /// Whether a block at `height` falls inside the window.
    ///
    /// ```rust
    /// use spellbook_core::trigger::BlockChainConfig;
    ///
    /// let window = BlockChainConfig { start_block: 10, end_block: 0 };
    /// assert!(!window.covers(9));
    /// assert!(window.covers(10_000));
    /// ```
    pub fn covers(&self, height: u64) -> bool {
        !self.is_disabled()
            && (self.start_block == 0 || height >= self.start_block)
            && (self.end_block == 0 || height <= self.end_block)
    }
}

/// A validated trigger configuration.
///
/// Deserialising re-applies the time-independent rules, so a stored config
/// read back from disk cannot bypass validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TriggerConfigInput")]
pub struct TriggerConfig {
    clock: ClockConfig,
    connections: ConnectionPoolConfig,
    blockchain: BlockChainConfig,
}

impl TriggerConfig {
    /// Validate `input` against every rule, using `now_sec` for the
    /// end-in-the-past check.
    ///
    /// ```rust
    /// use spellbook_core::trigger::{ConfigRejection, TriggerConfig, TriggerConfigInput};
    ///
    /// let now = 1_700_000_000;
    /// let stale = TriggerConfigInput::periodic(now - 100, 10).with_end(now - 50);
    /// assert!(matches!(
    ///     TriggerConfig::validate(&stale, now as u64),
    ///     Err(ConfigRejection::EndInPast { .. })
    /// ));
    /// ```
    pub fn validate(input: &TriggerConfigInput, now_sec: u64) -> Result<Self, ConfigRejection> {
        let config = Self::try_from(*input)?;
        let end_sec = config.clock.end_sec;
        if end_sec != 0 && end_sec < now_sec {
            return Err(ConfigRejection::EndInPast { end_sec, now_sec });
        }
        Ok(config)
    }

    /// A configuration with every trigger source disabled.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn clock(&self) -> &ClockConfig {
        &self.clock
    }

    pub fn connections(&self) -> &ConnectionPoolConfig {
        &self.connections
    }

    pub fn blockchain(&self) -> &BlockChainConfig {
        &self.blockchain
    }

    /// Whether the spell listens to any routed (non-clock) event.
    pub fn has_subscriptions(&self) -> bool {
        !self.connections.is_disabled() || !self.blockchain.is_disabled()
    }

    pub fn is_disabled(&self) -> bool {
        self.clock.is_disabled() && !self.has_subscriptions()
    }
}

impl TryFrom<TriggerConfigInput> for TriggerConfig {
    type Error = ConfigRejection;

    fn try_from(input: TriggerConfigInput) -> Result<Self, Self::Error> {
        let clock = ClockConfig {
            start_sec:  non_negative("clock.start_sec", input.clock.start_sec)?,
            end_sec:    non_negative("clock.end_sec", input.clock.end_sec)?,
            period_sec: non_negative("clock.period_sec", input.clock.period_sec)?,
        };
        let blockchain = BlockChainConfig {
            start_block: non_negative("blockchain.start_block", input.blockchain.start_block)?,
            end_block:   non_negative("blockchain.end_block", input.blockchain.end_block)?,
        };

        if clock.period_sec > MAX_PERIOD_SEC {
            return Err(ConfigRejection::PeriodTooLong {
                period_sec: clock.period_sec,
            });
        }
        if clock.end_sec != 0 && clock.end_sec < clock.start_sec {
            return Err(ConfigRejection::EndBeforeStart {
                start_sec: clock.start_sec,
                end_sec: clock.end_sec,
            });
        }

        Ok(Self {
            clock,
            connections: input.connections,
            blockchain,
        })
    }
}

impl From<TriggerConfig> for TriggerConfigInput {
    fn from(config: TriggerConfig) -> Self {
        // Validated values never exceed i64::MAX: they came from i64 input.
        let signed = |value: u64| i64::try_from(value).unwrap_or(i64::MAX);
        Self {
            clock: ClockInput {
                start_sec:  signed(config.clock.start_sec),
                end_sec:    signed(config.clock.end_sec),
                period_sec: signed(config.clock.period_sec),
            },
            connections: config.connections,
            blockchain: BlockChainInput {
                start_block: signed(config.blockchain.start_block),
                end_block:   signed(config.blockchain.end_block),
            },
        }
    }
}

fn non_negative(field: &'static str, value: i64) -> Result<u64, ConfigRejection> {
    u64::try_from(value).map_err(|_| ConfigRejection::NegativeValue { field })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
