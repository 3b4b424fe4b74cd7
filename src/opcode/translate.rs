//! Translation between two protocol versions.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use tracing::{info, warn};

use super::table::OpcodeTable;

/// A message that could not be mapped between two versions.
///
/// Unmapped messages still reach the client; only their opcode is left as
/// recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TranslationWarning {
    /// The name exists in the recorded version only.
    MissingName {
        /// Message name.
        name: String,
        /// Opcode in the recorded version.
        code: u16,
    },
    /// The payload-length descriptors differ; rewriting the opcode would
    /// make the client parse the old payload with the new layout.
    LengthMismatch {
        /// Message name.
        name: String,
        /// Descriptor in the recorded version.
        old_length: String,
        /// Descriptor in the running version.
        new_length: String,
    },
}

impl TranslationWarning {
    /// Returns the message name the warning is about.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            TranslationWarning::MissingName { name, .. }
            | TranslationWarning::LengthMismatch { name, .. } => name,
        }
    }
}

impl fmt::Display for TranslationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranslationWarning::MissingName { name, code } => {
                write!(f, "no opcode for {name} ({code:#06x}) in the running version")
            }
            TranslationWarning::LengthMismatch {
                name,
                old_length,
                new_length,
            } => write!(f, "length mismatch for {name}: old {old_length}, new {new_length}"),
        }
    }
}

/// Recorded opcode to running opcode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslationMap {
    codes: HashMap<u16, u16>,
}

impl TranslationMap {
    /// Joins two tables by message name.
    ///
    /// Every name in `old` either maps its old code to the new code, or
    /// produces exactly one warning when the name is missing from `new` or
    /// the length descriptors differ.
    ///
    /// # Example
    ///
    /// ```
    /// use duty_replay::opcode::{OpcodeEntry, OpcodeTable, TranslationMap};
    ///
    /// let mut old = OpcodeTable::new("1.0", "Global", 100);
    /// old.insert(OpcodeEntry::new("S", 0x10, "4", "Foo"));
    /// let mut new = OpcodeTable::new("1.1", "Global", 110);
    /// new.insert(OpcodeEntry::new("S", 0x20, "4", "Foo"));
    ///
    /// let (map, warnings) = TranslationMap::build(&old, &new);
    /// assert!(warnings.is_empty());
    /// assert_eq!(map.translate(0x10), 0x20);
    /// assert_eq!(map.translate(0x99), 0x99);
    /// ```
    #[must_use]
    pub fn build(old: &OpcodeTable, new: &OpcodeTable) -> (Self, Vec<TranslationWarning>) {
        let mut map = TranslationMap::default();
        let mut warnings = Vec::new();

        for entry in old.iter() {
            let Some(target) = new.get(&entry.name) else {
                warnings.push(TranslationWarning::MissingName {
                    name: entry.name.clone(),
                    code: entry.code,
                });
                continue;
            };

            if target.length != entry.length {
                warnings.push(TranslationWarning::LengthMismatch {
                    name: entry.name.clone(),
                    old_length: entry.length.clone(),
                    new_length: target.length.clone(),
                });
                continue;
            }

            map.codes.entry(entry.code).or_insert(target.code);
        }

        for warning in &warnings {
            warn!(old = old.ver_id, new = new.ver_id, "{warning}");
        }
        info!(
            old = old.ver_id,
            new = new.ver_id,
            entries = map.len(),
            "built opcode translation map"
        );

        (map, warnings)
    }

    /// Returns the running opcode for `opcode`, or `opcode` itself if it
    /// has no mapping.
    #[must_use]
    pub fn translate(&self, opcode: u16) -> u16 {
        self.codes.get(&opcode).copied().unwrap_or(opcode)
    }

    /// Returns the mapping for `opcode`, if there is one.
    #[must_use]
    pub fn get(&self, opcode: u16) -> Option<u16> {
        self.codes.get(&opcode).copied()
    }

    /// Returns the number of mapped opcodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// Returns whether nothing is mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Iterates over `(old, new)` pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (u16, u16)> + '_ {
        self.codes.iter().map(|(&old, &new)| (old, new))
    }
}
