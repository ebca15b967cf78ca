// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! File-based JSON storage backend.
//!
//! [`FileStorage`] persists one spell as one JSON file, `<dir>/<spell_id>.json`,
//! plus a JSON-lines side file, `<dir>/<spell_id>.triggers.jsonl`, holding
//! its delivered triggers.  Every snapshot is written atomically
//! (write-rename), so a crash mid-write leaves the previous snapshot intact.
//! Triggers are only ever appended.  [`SpellDirectory`] creates the
//! per-spell backends and reloads a directory on start-up.
//!
//! ## Caveats
//!
//! * The registry persists after every state change, so each trigger costs
//!   one snapshot rewrite and one appended line.
//! * A partially written last trigger line (after a crash) is skipped on load.
//! * Concurrent access from multiple processes is not supported.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use spellbook_core::error::SpellError;
use spellbook_core::registry::SpellRegistry;
use spellbook_core::storage::{SpellSnapshot, Storage};
use spellbook_core::types::{SpellId, TriggerEvent};
use tracing::{debug, info, warn};

const EXTENSION: &str = "json";
const TRIGGERS_EXTENSION: &str = "triggers.jsonl";

fn storage_error(context: &str, path: &Path, error: impl std::fmt::Display) -> SpellError {
    SpellError::Storage(format!("{context} \"{}\": {error}", path.display()))
}

// ---------------------------------------------------------------------------
// FileStorage
// ---------------------------------------------------------------------------

/// A file-backed [`Storage`] for a single spell.
///
/// # Examples
///
/// ```rust,no_run
/// use spellbook_core::storage::Storage;
/// use spellbook_std::storage::file::FileStorage;
///
/// let mut storage = FileStorage::new("/var/lib/spellbook/spell-1.json");
/// storage.purge().unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
    triggers_path: PathBuf,
}

impl FileStorage {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let triggers_path = path.with_extension(TRIGGERS_EXTENSION);
        Self { path, triggers_path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn triggers_path(&self) -> &Path {
        &self.triggers_path
    }

    /// Read the snapshot currently on disk, if any, with its trigger
    /// history filled in.
    pub fn load(&self) -> Result<Option<SpellSnapshot>, SpellError> {
        let Some(raw) = read_optional(&self.path, "cannot read spell file")? else {
            return Ok(None);
        };
        let mut snapshot: SpellSnapshot =
            serde_json::from_str(&raw).map_err(|error| storage_error("malformed spell file", &self.path, error))?;
        snapshot.triggers = self.load_triggers()?;
        Ok(Some(snapshot))
    }

    /// Trigger history from the side file.  A torn last line, left by a
    /// crash mid-append, is dropped and cut from the file so later appends
    /// start on a clean line.
    fn load_triggers(&self) -> Result<Vec<TriggerEvent>, SpellError> {
        let Some(raw) = read_optional(&self.triggers_path, "cannot read trigger log")? else {
            return Ok(Vec::new());
        };
        let mut events = Vec::new();
        let mut valid_len = 0;
        let mut chunks = raw.split_inclusive('\n').peekable();
        while let Some(chunk) = chunks.next() {
            let line = chunk.trim();
            if line.is_empty() {
                valid_len += chunk.len();
                continue;
            }
            match serde_json::from_str::<TriggerEvent>(line) {
                Ok(event) => {
                    events.push(event);
                    valid_len += chunk.len();
                }
                Err(error) if chunks.peek().is_none() => {
                    warn!(path = %self.triggers_path.display(), error = %error, "dropping torn trigger line");
                    fs::write(&self.triggers_path, &raw[..valid_len])
                        .map_err(|error| storage_error("cannot repair", &self.triggers_path, error))?;
                }
                Err(error) => return Err(storage_error("malformed trigger log", &self.triggers_path, error)),
            }
        }
        Ok(events)
    }
}

fn read_optional(path: &Path, context: &str) -> Result<Option<String>, SpellError> {
    match fs::read_to_string(path) {
        Ok(raw) => Ok(Some(raw)),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(error) => Err(storage_error(context, path, error)),
    }
}

fn remove_optional(path: &Path) -> Result<(), SpellError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(storage_error("cannot remove", path, error)),
    }
}

impl Storage for FileStorage {
    /// The file is written to `<path>.tmp` first, then renamed over the
    /// target.
    fn persist(&mut self, snapshot: &SpellSnapshot) -> Result<(), SpellError> {
        let json = serde_json::to_string_pretty(snapshot)
            .map_err(|error| storage_error("cannot serialise spell for", &self.path, error))?;

        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, json).map_err(|error| storage_error("cannot write", &tmp_path, error))?;
        fs::rename(&tmp_path, &self.path).map_err(|error| storage_error("cannot replace", &self.path, error))?;
        Ok(())
    }

    /// One JSON line per trigger, appended to the side file.
    fn append_trigger(&mut self, event: &TriggerEvent) -> Result<(), SpellError> {
        let mut line = serde_json::to_string(event)
            .map_err(|error| storage_error("cannot serialise trigger for", &self.triggers_path, error))?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.triggers_path)
            .map_err(|error| storage_error("cannot open trigger log", &self.triggers_path, error))?;
        file.write_all(line.as_bytes())
            .map_err(|error| storage_error("cannot append to", &self.triggers_path, error))
    }

    fn purge(&mut self) -> Result<(), SpellError> {
        remove_optional(&self.path)?;
        remove_optional(&self.triggers_path)?;
        debug!(path = %self.path.display(), "spell files removed");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SpellDirectory
// ---------------------------------------------------------------------------

/// A directory holding one JSON file per spell.
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use spellbook_core::{EngineConfig, NoopRunner, SpellRegistry, SystemClock};
/// use spellbook_std::SpellDirectory;
///
/// let dir = SpellDirectory::open("/var/lib/spellbook/spells").unwrap();
/// let registry = SpellRegistry::new(
///     EngineConfig::default(),
///     Arc::new(SystemClock),
///     Arc::new(NoopRunner),
///     dir.factory(),
/// );
/// let restored = dir.restore_into(&registry).unwrap();
/// println!("restored {restored} spells");
/// ```
#[derive(Debug, Clone)]
pub struct SpellDirectory {
    root: PathBuf,
}

impl SpellDirectory {
    /// Open `root`, creating it if it does not exist.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self, SpellError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|error| storage_error("cannot create spell directory", &root, error))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Backend for the spell `id`.
    ///
    /// # Errors
    ///
    /// [`SpellError::Storage`] if `id` cannot be used as a file name.
    pub fn storage_for(&self, id: &SpellId) -> Result<FileStorage, SpellError> {
        let name = id.as_str();
        if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
            return Err(SpellError::Storage(format!("spell id {name:?} is not a valid file name")));
        }
        Ok(FileStorage::new(self.root.join(format!("{name}.{EXTENSION}"))))
    }

    /// A storage factory for [`SpellRegistry::new`].
    pub fn factory(&self) -> impl Fn(&SpellId) -> Result<FileStorage, SpellError> + Send + Sync + 'static {
        let dir = self.clone();
        move |id: &SpellId| dir.storage_for(id)
    }

    /// Every snapshot in the directory, sorted by spell id.
    ///
    /// Leftover `.tmp` files from an interrupted write are ignored, as are
    /// trigger logs, which are read together with their snapshot.
    pub fn load_snapshots(&self) -> Result<Vec<SpellSnapshot>, SpellError> {
        let entries =
            fs::read_dir(&self.root).map_err(|error| storage_error("cannot list spell directory", &self.root, error))?;

        let mut snapshots = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|error| storage_error("cannot list spell directory", &self.root, error))?
                .path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(snapshot) = FileStorage::new(&path).load()? {
                snapshots.push(snapshot);
            }
        }
        snapshots.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        Ok(snapshots)
    }

    /// Restore every snapshot in the directory into `registry`.  Spells that
    /// are already loaded are skipped.  Returns how many were restored.
    pub fn restore_into(&self, registry: &SpellRegistry<FileStorage>) -> Result<usize, SpellError> {
        let mut restored = 0;
        for snapshot in self.load_snapshots()? {
            let id = snapshot.id.clone();
            if registry.contains(&id) {
                warn!(spell_id = %id, "spell already loaded; skipping file");
                continue;
            }
            registry.restore(snapshot)?;
            restored += 1;
        }
        info!(root = %self.root.display(), restored, "spell directory restored");
        Ok(restored)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
