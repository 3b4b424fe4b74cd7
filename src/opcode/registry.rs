//! The set of known opcode tables, keyed by protocol version.

use std::collections::btree_map::{self, BTreeMap};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::table::OpcodeTable;
use super::translate::{TranslationMap, TranslationWarning};
use crate::error::{ReplayError, Result};

/// Extension of opcode table documents.
pub const TABLE_EXTENSION: &str = "json";

/// Opcode tables loaded at startup. Immutable once loading is done.
#[derive(Debug, Clone, Default)]
pub struct OpcodeRegistry {
    tables: BTreeMap<u16, OpcodeTable>,
}

impl OpcodeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads every `*.json` table in `dir`.
    ///
    /// Files are visited in path order. A file that fails to load is
    /// skipped with a warning; a version id that is already registered
    /// keeps its first table.
    ///
    /// # Errors
    ///
    /// Returns `ReplayError::IoError` if the directory can't be listed.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .is_some_and(|ext| ext.eq_ignore_ascii_case(TABLE_EXTENSION))
            })
            .collect();
        paths.sort();

        let mut registry = Self::new();
        for path in paths {
            match OpcodeTable::load(&path) {
                Ok(table) => {
                    registry.insert(table);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "skipping opcode table"),
            }
        }

        info!(dir = %dir.display(), tables = registry.len(), "loaded opcode tables");
        Ok(registry)
    }

    /// Registers a table. Returns false, leaving the registry unchanged, if
    /// its version id is already registered.
    pub fn insert(&mut self, table: OpcodeTable) -> bool {
        match self.tables.entry(table.ver_id) {
            btree_map::Entry::Occupied(_) => {
                debug!(ver_id = table.ver_id, "ignoring duplicate opcode table");
                false
            }
            btree_map::Entry::Vacant(slot) => {
                slot.insert(table);
                true
            }
        }
    }

    /// Returns the table for a protocol version.
    #[must_use]
    pub fn get(&self, ver_id: u16) -> Option<&OpcodeTable> {
        self.tables.get(&ver_id)
    }

    /// Returns whether a table is registered for `ver_id`.
    #[must_use]
    pub fn contains(&self, ver_id: u16) -> bool {
        self.tables.contains_key(&ver_id)
    }

    /// Returns the number of registered tables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Returns whether no tables are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Iterates over the registered tables in version order.
    pub fn iter(&self) -> btree_map::Values<'_, u16, OpcodeTable> {
        self.tables.values()
    }

    /// Builds the translation from `old` to `new`.
    ///
    /// # Errors
    ///
    /// Returns `ReplayError::UnknownVersion` if either version has no table.
    pub fn build_map(&self, old: u16, new: u16) -> Result<(TranslationMap, Vec<TranslationWarning>)> {
        let old_table = self.get(old).ok_or(ReplayError::UnknownVersion(old))?;
        let new_table = self.get(new).ok_or(ReplayError::UnknownVersion(new))?;
        Ok(TranslationMap::build(old_table, new_table))
    }
}
