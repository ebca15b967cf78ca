// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Per-spell typed key-value store.
//!
//! Reads are unrestricted.  Every write takes the caller's [`Role`] and is
//! checked with [`permission::check_write`] before the store is touched, so
//! a rejected write never leaves partial state behind.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::error::SpellError;
use crate::permission::{self, Role};
use crate::types::StoredValue;

/// Typed values keyed by string.
///
/// ```rust
/// use spellbook_core::kv::KeyValueStore;
/// use spellbook_core::permission::Role;
///
/// let mut store = KeyValueStore::new();
/// store.set_string(Some(Role::Host), "h_greeting", "hello".into()).unwrap();
/// assert_eq!(store.get_string("h_greeting"), Some("hello"));
/// assert!(store.set_string(Some(Role::Host), "w_greeting", "hi".into()).is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValueStore {
    entries: HashMap<String, StoredValue>,
}

impl KeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with string values.  Seeding is done by
    /// the installer and bypasses the permission guard.
    pub fn seeded<I, K, V>(initial: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let entries = initial
            .into_iter()
            .map(|(key, value)| (key.into(), StoredValue::String(value.into())))
            .collect();
        Self { entries }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn get(&self, key: &str) -> Option<&StoredValue> {
        self.entries.get(key)
    }

    /// The string at `key`, or `None` when absent or of another type.
    pub fn get_string(&self, key: &str) -> Option<&str> {
        match self.entries.get(key) {
            Some(StoredValue::String(value)) => Some(value),
            _ => None,
        }
    }

    pub fn get_u32(&self, key: &str) -> Option<u32> {
        match self.entries.get(key) {
            Some(StoredValue::U32(value)) => Some(*value),
            _ => None,
        }
    }

    /// The list at `key`; absent keys read as an empty list.
    pub fn list_get_strings(&self, key: &str) -> Vec<String> {
        match self.entries.get(key) {
            Some(StoredValue::List(items)) => items.clone(),
            _ => Vec::new(),
        }
    }

    pub fn exists(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // ------------------------------------------------------------------
    // Guarded writes
    // ------------------------------------------------------------------

    pub fn set_string(&mut self, role: Option<Role>, key: &str, value: String) -> Result<(), SpellError> {
        permission::check_write(role, key)?;
        self.entries.insert(key.to_owned(), StoredValue::String(value));
        Ok(())
    }

    pub fn set_u32(&mut self, role: Option<Role>, key: &str, value: u32) -> Result<(), SpellError> {
        permission::check_write(role, key)?;
        self.entries.insert(key.to_owned(), StoredValue::U32(value));
        Ok(())
    }

    /// Append to the list at `key`, creating it if absent.
    pub fn list_push_string(&mut self, role: Option<Role>, key: &str, value: String) -> Result<(), SpellError> {
        permission::check_write(role, key)?;
        match self.entries.get_mut(key) {
            Some(StoredValue::List(items)) => items.push(value),
            Some(_) => return Err(SpellError::TypeMismatch(key.to_owned())),
            None => {
                self.entries.insert(key.to_owned(), StoredValue::List(vec![value]));
            }
        }
        Ok(())
    }

    /// Remove and return the last element of the list at `key`.
    pub fn list_pop_string(&mut self, role: Option<Role>, key: &str) -> Result<Option<String>, SpellError> {
        permission::check_write(role, key)?;
        match self.entries.get_mut(key) {
            Some(StoredValue::List(items)) => Ok(items.pop()),
            Some(_) => Err(SpellError::TypeMismatch(key.to_owned())),
            None => Ok(None),
        }
    }

    /// Delete `key`.  Returns whether it existed.
    pub fn remove_key(&mut self, role: Option<Role>, key: &str) -> Result<bool, SpellError> {
        permission::check_write(role, key)?;
        Ok(self.entries.remove(key).is_some())
    }

    /// Store each first-level field of a JSON object as a string holding
    /// the field's JSON text: `{"a": "x", "b": 1}` stores `"x"` (with
    /// quotes) under `a` and `1` under `b`.
    ///
    /// All keys are checked before any is written.
    pub fn set_json_fields(&mut self, role: Option<Role>, json: &str) -> Result<usize, SpellError> {
        let fields: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(json).map_err(|err| SpellError::MalformedJson(err.to_string()))?;
        for key in fields.keys() {
            permission::check_write(role, key)?;
        }

        let written = fields.len();
        for (key, value) in fields {
            self.entries.insert(key, StoredValue::String(value.to_string()));
        }
        Ok(written)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SPELL: Option<Role> = Some(Role::Spell);

    #[test]
    fn typed_reads_ignore_other_types() {
        let mut store = KeyValueStore::new();
        store.set_u32(SPELL, "count", 3).unwrap();
        assert_eq!(store.get_u32("count"), Some(3));
        assert_eq!(store.get_string("count"), None);
        assert!(store.exists("count"));
    }

    #[test]
    fn list_push_and_pop() {
        let mut store = KeyValueStore::new();
        store.list_push_string(SPELL, "items", "a".into()).unwrap();
        store.list_push_string(SPELL, "items", "b".into()).unwrap();
        assert_eq!(store.list_get_strings("items"), vec!["a", "b"]);
        assert_eq!(store.list_pop_string(SPELL, "items").unwrap().as_deref(), Some("b"));
        assert_eq!(store.list_get_strings("items"), vec!["a"]);
        assert_eq!(store.list_pop_string(SPELL, "missing").unwrap(), None);
    }

    #[test]
    fn json_fields_keep_their_json_text() {
        let mut store = KeyValueStore::new();
        let written = store
            .set_json_fields(SPELL, r#"{"name": "x", "count": 3, "nested": {"k": [1, 2]}}"#)
            .unwrap();
        assert_eq!(written, 3);
        assert_eq!(store.get_string("name"), Some(r#""x""#));
        assert_eq!(store.get_string("count"), Some("3"));
        assert_eq!(store.get_string("nested"), Some(r#"{"k":[1,2]}"#));
    }

    #[test]
    fn json_fields_are_all_or_nothing() {
        let mut store = KeyValueStore::new();
        let err = store
            .set_json_fields(Some(Role::Host), r#"{"h_ok": 1, "w_denied": 2}"#)
            .unwrap_err();
        assert!(matches!(err, SpellError::WriteForbidden { ref key, .. } if key == "w_denied"));
        assert!(store.is_empty());
    }

    #[test]
    fn json_fields_need_an_object() {
        let mut store = KeyValueStore::new();
        for bad in ["{ nope", "[1, 2]", "\"text\""] {
            let err = store.set_json_fields(SPELL, bad).unwrap_err();
            assert!(matches!(err, SpellError::MalformedJson(_)), "{bad}");
        }
        assert!(store.is_empty());
    }

    #[test]
    fn push_onto_scalar_is_a_type_mismatch() {
        let mut store = KeyValueStore::seeded([("name", "x")]);
        let err = store.list_push_string(SPELL, "name", "y".into()).unwrap_err();
        assert_eq!(err, SpellError::TypeMismatch("name".into()));
        assert_eq!(store.get_string("name"), Some("x"));
    }

    #[test]
    fn forbidden_write_leaves_store_unchanged() {
        let mut store = KeyValueStore::seeded([("w_key", "before")]);
        assert!(store.set_string(Some(Role::Host), "w_key", "after".into()).is_err());
        assert!(store.remove_key(None, "w_key").is_err());
        assert_eq!(store.get_string("w_key"), Some("before"));
    }

    #[test]
    fn remove_key_reports_presence() {
        let mut store = KeyValueStore::seeded([("hw_key", "v")]);
        assert!(store.remove_key(Some(Role::Worker), "hw_key").unwrap());
        assert!(!store.remove_key(Some(Role::Worker), "hw_key").unwrap());
    }
}
