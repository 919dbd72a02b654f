//! Entry type codes and their registry
//!
//! Every record kind owns one single-byte code. Checkpoints and transaction
//! markers are distinguished from producer records only by that code, so two
//! kinds must never share one. Producers register their codes with the
//! [`EntryTypeRegistry`] before the journal opens.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{JournalError, Result};

/// Code identifying the semantic kind of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryType(pub u8);

impl EntryType {
    pub const TXN_START: EntryType = EntryType(0);
    pub const TXN_COMMIT: EntryType = EntryType(1);
    pub const CHECKPOINT: EntryType = EntryType(2);
    pub const TXN_ABORT: EntryType = EntryType(3);

    pub fn code(self) -> u8 {
        self.0
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Table of known entry types
#[derive(Debug, Clone)]
pub struct EntryTypeRegistry {
    names: BTreeMap<u8, String>,
}

impl EntryTypeRegistry {
    /// A registry with no codes at all
    pub fn empty() -> Self {
        Self {
            names: BTreeMap::new(),
        }
    }

    /// A registry holding the transaction markers and the checkpoint
    pub fn with_builtins() -> Self {
        let mut names = BTreeMap::new();
        names.insert(EntryType::TXN_START.0, "txn-start".to_string());
        names.insert(EntryType::TXN_COMMIT.0, "txn-commit".to_string());
        names.insert(EntryType::CHECKPOINT.0, "checkpoint".to_string());
        names.insert(EntryType::TXN_ABORT.0, "txn-abort".to_string());
        Self { names }
    }

    /// Claim `code` for a record kind
    pub fn register(&mut self, code: EntryType, name: impl Into<String>) -> Result<()> {
        if let Some(existing) = self.names.get(&code.0) {
            return Err(JournalError::DuplicateEntryType {
                code: code.0,
                existing: existing.clone(),
            });
        }
        self.names.insert(code.0, name.into());
        Ok(())
    }

    pub fn contains(&self, code: EntryType) -> bool {
        self.names.contains_key(&code.0)
    }

    pub fn name_of(&self, code: EntryType) -> Option<&str> {
        self.names.get(&code.0).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntryType, &str)> {
        self.names.iter().map(|(code, name)| (EntryType(*code), name.as_str()))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for EntryTypeRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
