// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Engine error type.
//!
//! Every fallible engine operation returns [`SpellError`].  None of its
//! variants is fatal to the engine: the flag-returning surface in
//! [`crate::api`] turns each of them into a `success: false` value.

use thiserror::Error;

use crate::trigger::ConfigRejection;
use crate::types::{ScriptError, SpellId};

/// Errors produced by the spell engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpellError {
    /// The proposed trigger configuration failed validation.
    #[error("invalid trigger config: {0}")]
    InvalidConfig(#[from] ConfigRejection),

    /// The caller is not the owner of the spell it tried to modify.
    #[error("only the owner of spell {0} may modify it")]
    NotOwner(SpellId),

    /// The spell id does not resolve to an installed spell.
    #[error("spell {0} not found")]
    NotFound(SpellId),

    /// The caller's role may not write the key's scope.
    #[error("writing to `{key}` is forbidden for {role}")]
    WriteForbidden {
        /// The key the caller attempted to write.
        key: String,
        /// Human-readable caller role.
        role: &'static str,
    },

    /// The key holds a value of another type than the operation expects.
    #[error("key `{0}` holds a value of a different type")]
    TypeMismatch(String),

    /// The operation is reserved for the spell's own script.
    #[error("{0} can be called only by the spell itself")]
    SpellOnly(&'static str),

    /// A JSON document could not be parsed as an object.
    #[error("malformed JSON object: {0}")]
    MalformedJson(String),

    /// The alias is already bound to another spell on the same worker.
    #[error("alias `{0}` is already taken on this worker")]
    AliasTaken(String),

    /// A storage backend failed to persist or purge spell state.
    #[error("storage error: {0}")]
    Storage(String),

    /// A script reported a failure.
    #[error(transparent)]
    Script(#[from] ScriptError),
}

impl SpellError {
    /// Whether this error reports an unresolvable spell id.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SpellError::NotFound(_))
    }
}
