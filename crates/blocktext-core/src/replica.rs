//! Replicated text backend abstraction.
//!
//! The store drives a `TextReplica` without knowing which CRDT sits behind
//! it. `blocktext-crdt` provides the Loro-backed engine; `MemoryReplica`
//! here is the deterministic double used to test everything above it.

use std::ops::Range;

use crate::delta::Attributes;
use crate::error::SyncError;
use crate::styled::{StyledText, TextRun};

/// A mutable rich-text value that can be edited by char offset.
///
/// All offsets are in Unicode scalar values (chars). Inserted text takes
/// exactly the attributes passed in, never those of its neighbours.
pub trait TextReplica {
    /// Total length in chars.
    fn len_chars(&self) -> usize;

    fn insert(
        &mut self,
        offset: usize,
        text: &str,
        attributes: &Attributes,
    ) -> Result<(), SyncError>;

    fn delete(&mut self, range: Range<usize>) -> Result<(), SyncError>;

    /// Apply attributes over a range; a null value removes that key.
    fn format(&mut self, range: Range<usize>, attributes: &Attributes) -> Result<(), SyncError>;

    /// Current content as styled runs, in document order.
    fn runs(&self) -> Vec<TextRun>;

    /// Close the current group of operations into one transaction.
    ///
    /// Backends without transactions can leave this as a no-op.
    fn commit(&mut self) {}

    /// Delete all content.
    fn clear(&mut self) -> Result<(), SyncError> {
        let len = self.len_chars();
        if len > 0 {
            self.delete(0..len)?;
        }
        Ok(())
    }
}

/// A replica that can exchange CRDT updates with other replicas.
///
/// This is the binding point for a replication transport: export what a
/// peer is missing, import what a peer sent.
pub trait MergeableReplica: TextReplica {
    /// Opaque version marker (e.g. a version vector).
    type Version: Clone + PartialEq;

    fn version(&self) -> Self::Version;

    fn export_snapshot(&self) -> Result<Vec<u8>, SyncError>;

    /// Updates since `version`, or `None` if nothing changed.
    fn export_updates_since(&self, version: &Self::Version) -> Result<Option<Vec<u8>>, SyncError>;

    fn import(&mut self, update: &[u8]) -> Result<(), SyncError>;
}

/// Deterministic in-memory replica.
///
/// Has no merge metadata at all; it records how many transactions were
/// committed so tests can assert that replacements are atomic.
#[derive(Clone, Debug, Default)]
pub struct MemoryReplica {
    text: StyledText,
    commits: usize,
}

impl MemoryReplica {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed transactions so far.
    pub fn commits(&self) -> usize {
        self.commits
    }

    pub fn to_plain_string(&self) -> String {
        self.text.to_plain_string()
    }
}

impl TextReplica for MemoryReplica {
    fn len_chars(&self) -> usize {
        self.text.len_chars()
    }

    fn insert(
        &mut self,
        offset: usize,
        text: &str,
        attributes: &Attributes,
    ) -> Result<(), SyncError> {
        self.text.insert(offset, text, attributes)
    }

    fn delete(&mut self, range: Range<usize>) -> Result<(), SyncError> {
        self.text.delete(range)
    }

    fn format(&mut self, range: Range<usize>, attributes: &Attributes) -> Result<(), SyncError> {
        self.text.format(range, attributes)
    }

    fn runs(&self) -> Vec<TextRun> {
        self.text.runs().to_vec()
    }

    fn commit(&mut self) {
        self.commits += 1;
    }

    fn clear(&mut self) -> Result<(), SyncError> {
        self.text.clear();
        Ok(())
    }
}
