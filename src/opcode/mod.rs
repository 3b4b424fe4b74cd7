//! Opcode compatibility between protocol versions.
//!
//! Every client patch renumbers wire messages. A replay recorded on an
//! older patch can still be played if each recorded opcode is renumbered to
//! the running client's code for the same message before dispatch.
//!
//! - [`table`] - One version's message dictionary, loaded from JSON
//! - [`registry`] - All known tables, keyed by version id
//! - [`translate`] - Joining two tables into a [`TranslationMap`]
//!
//! # Example
//!
//! ```no_run
//! use duty_replay::opcode::OpcodeRegistry;
//!
//! let registry = OpcodeRegistry::load_dir("config/opcodes")?;
//! let (map, warnings) = registry.build_map(6300, 6380)?;
//! for warning in &warnings {
//!     eprintln!("untranslated: {warning}");
//! }
//! let opcode = map.translate(0x0142);
//! # Ok::<(), duty_replay::error::ReplayError>(())
//! ```

pub mod registry;
pub mod table;
pub mod translate;

pub use registry::OpcodeRegistry;
pub use table::{parse_hex_code, OpcodeEntry, OpcodeTable};
pub use translate::{TranslationMap, TranslationWarning};
