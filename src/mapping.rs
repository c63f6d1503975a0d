//! Key mapping table for the macro pad.
//!
//! One slot per physical key. Slots are either empty (unassigned) or hold a
//! normalized shortcut string of at most [`MAPPING_SIZE`] characters.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Number of physical keys on the pad.
pub const NUM_KEYS: usize = 9;

/// Maximum stored length of a shortcut, in characters.
pub const MAPPING_SIZE: usize = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("Key number must be between 1 and 9 (got {0})")]
    KeyOutOfRange(usize),
}

/// Zero-based key index; index `i` is physical key `i + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyIndex(usize);

impl KeyIndex {
    pub fn new(index: usize) -> Result<Self, MappingError> {
        if index < NUM_KEYS {
            Ok(Self(index))
        } else {
            Err(MappingError::KeyOutOfRange(index + 1))
        }
    }

    /// Build from the 1-based number printed on the pad.
    pub fn from_number(number: usize) -> Result<Self, MappingError> {
        match number {
            0 => Err(MappingError::KeyOutOfRange(0)),
            n => Self::new(n - 1),
        }
    }

    pub fn all() -> impl Iterator<Item = KeyIndex> {
        (0..NUM_KEYS).map(KeyIndex)
    }

    pub fn get(self) -> usize {
        self.0
    }

    pub fn number(self) -> usize {
        self.0 + 1
    }
}

impl fmt::Display for KeyIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key {}", self.number())
    }
}

/// Uppercase a hotkey name and strip its spaces ("ctrl+shift+a" -> "CTRL+SHIFT+A").
pub fn normalize_chord(raw: &str) -> String {
    raw.to_uppercase().replace(' ', "")
}

/// First [`MAPPING_SIZE`] characters of `value`.
pub fn truncate_mapping(value: &str) -> String {
    value.chars().take(MAPPING_SIZE).collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MappingTable {
    slots: [String; NUM_KEYS],
}

impl MappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: KeyIndex) -> &str {
        &self.slots[key.get()]
    }

    /// Store `value` for `key`, keeping only its first [`MAPPING_SIZE`] characters.
    pub fn assign(&mut self, key: KeyIndex, value: &str) {
        self.slots[key.get()] = truncate_mapping(value);
    }

    pub fn slots(&self) -> &[String] {
        &self.slots
    }

    pub fn assigned_count(&self) -> usize {
        self.slots.iter().filter(|s| !s.is_empty()).count()
    }

    /// Text shown on the key's button: the stored shortcut, or `Key N` when unassigned.
    pub fn label(&self, key: KeyIndex) -> String {
        match self.get(key) {
            "" => key.to_string(),
            value => value.to_string(),
        }
    }

    /// Wire command for this table: `SET f0|f1|...|f8\n`.
    pub fn command(&self) -> String {
        format!("SET {}\n", self.slots.join("|"))
    }
}
