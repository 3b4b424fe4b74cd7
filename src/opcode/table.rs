//! Opcode tables: one protocol version's message dictionary.
//!
//! Tables are stored as JSON documents with positional entries:
//!
//! ```json
//! {
//!   "version": "6.38",
//!   "region": "Global",
//!   "ver_id": 6380,
//!   "opcodes": {
//!     "0": ["S", "0x0142", "32", "ActorControl"]
//!   }
//! }
//! ```
//!
//! Each entry is `[display, code as hex text, length descriptor, name]`.
//! Entries are normalized into [`OpcodeEntry`] records at load time and the
//! table is keyed by message name; the document's own keys carry no meaning.

use std::collections::btree_map::{self, BTreeMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ReplayError, Result};

/// One message definition within an [`OpcodeTable`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpcodeEntry {
    /// Free-form display field (typically the message direction).
    pub display: String,
    /// Numeric opcode in this protocol version.
    pub code: u16,
    /// Payload-length descriptor, compared verbatim between versions.
    pub length: String,
    /// Symbolic message name; the join key between versions.
    pub name: String,
}

impl OpcodeEntry {
    /// Creates an entry.
    #[must_use]
    pub fn new(
        display: impl Into<String>,
        code: u16,
        length: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        OpcodeEntry {
            display: display.into(),
            code,
            length: length.into(),
            name: name.into(),
        }
    }
}

/// The raw document shape, before normalization.
#[derive(Debug, Deserialize)]
struct TableDocument {
    version: String,
    region: String,
    ver_id: u16,
    opcodes: BTreeMap<String, Vec<String>>,
}

/// The message dictionary of one protocol version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpcodeTable {
    /// Human-readable game version, e.g. `"6.38"`.
    pub version: String,
    /// Client region tag.
    pub region: String,
    /// Protocol version id, matched against a replay header's recorded
    /// version.
    pub ver_id: u16,
    entries: BTreeMap<String, OpcodeEntry>,
}

impl OpcodeTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new(version: impl Into<String>, region: impl Into<String>, ver_id: u16) -> Self {
        OpcodeTable {
            version: version.into(),
            region: region.into(),
            ver_id,
            entries: BTreeMap::new(),
        }
    }

    /// Adds an entry, returning the entry it replaced if the name was
    /// already defined.
    pub fn insert(&mut self, entry: OpcodeEntry) -> Option<OpcodeEntry> {
        self.entries.insert(entry.name.clone(), entry)
    }

    /// Parses a table document. `source` only labels errors.
    ///
    /// # Errors
    ///
    /// - `ReplayError::Json` if the text is not a table document
    /// - `ReplayError::OpcodeTable` if an entry is not a four-element array,
    ///   has a non-hex code, or repeats a message name
    pub fn from_json(text: &str, source: impl AsRef<Path>) -> Result<Self> {
        let source = source.as_ref();
        let document: TableDocument = serde_json::from_str(text)?;
        let mut table = OpcodeTable::new(document.version, document.region, document.ver_id);

        for (key, fields) in document.opcodes {
            let entry = normalize_entry(&key, fields).map_err(|reason| table_error(source, reason))?;
            let name = entry.name.clone();
            if table.insert(entry).is_some() {
                return Err(table_error(
                    source,
                    format!("message name {name:?} defined more than once"),
                ));
            }
        }

        Ok(table)
    }

    /// Reads and parses the table document at `path`.
    ///
    /// # Errors
    ///
    /// Returns `ReplayError::IoError` if the file can't be read, or any
    /// error from [`OpcodeTable::from_json`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let table = Self::from_json(&text, path)?;
        debug!(
            path = %path.display(),
            region = %table.region,
            version = %table.version,
            opcodes = table.len(),
            "loaded opcode table"
        );
        Ok(table)
    }

    /// Looks up a message by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&OpcodeEntry> {
        self.entries.get(name)
    }

    /// Returns the number of messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the table defines no messages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the entries in name order.
    pub fn iter(&self) -> btree_map::Values<'_, String, OpcodeEntry> {
        self.entries.values()
    }
}

fn table_error(path: &Path, reason: String) -> ReplayError {
    ReplayError::OpcodeTable {
        path: PathBuf::from(path),
        reason,
    }
}

fn normalize_entry(key: &str, fields: Vec<String>) -> std::result::Result<OpcodeEntry, String> {
    let [display, code, length, name]: [String; 4] = fields
        .try_into()
        .map_err(|f: Vec<String>| format!("entry {key:?} has {} fields, expected 4", f.len()))?;

    let code = parse_hex_code(&code)
        .ok_or_else(|| format!("entry {key:?} has invalid opcode {code:?}"))?;

    Ok(OpcodeEntry {
        display,
        code,
        length,
        name,
    })
}

/// Parses an opcode written as hex text, with or without a `0x` prefix.
///
/// # Example
///
/// ```
/// use duty_replay::opcode::parse_hex_code;
///
/// assert_eq!(parse_hex_code("0x01A2"), Some(0x01A2));
/// assert_eq!(parse_hex_code("f001"), Some(0xF001));
/// assert_eq!(parse_hex_code("0x10000"), None);
/// ```
#[must_use]
pub fn parse_hex_code(text: &str) -> Option<u16> {
    let text = text.trim();
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u16::from_str_radix(digits, 16).ok()
}
