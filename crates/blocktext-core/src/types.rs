//! Core sync types: block ids, selections, edit operations and change events.
//!
//! These types are independent of any particular replica or tree backend.

use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::delta::{Attributes, Delta};
use crate::error::SyncError;

/// Opaque identifier of a block in the external document store.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(SmolStr);

impl BlockId {
    pub fn new(id: impl Into<SmolStr>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BlockId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A complete selection inside one block.
///
/// The anchor is where the selection started, the focus is where the cursor
/// is now. They may be in any order; use `start()` and `end()` for bounds.
#[derive(Clone, Debug, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: usize,
    pub focus: usize,
}

impl Selection {
    pub fn new(anchor: usize, focus: usize) -> Self {
        Self { anchor, focus }
    }

    /// Create a collapsed selection (cursor position).
    pub fn collapsed(offset: usize) -> Self {
        Self {
            anchor: offset,
            focus: offset,
        }
    }

    pub fn start(&self) -> usize {
        self.anchor.min(self.focus)
    }

    pub fn end(&self) -> usize {
        self.anchor.max(self.focus)
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }

    pub fn to_range(&self) -> Range<usize> {
        self.start()..self.end()
    }

    /// Check if the selection is backwards (focus before anchor).
    pub fn is_backwards(&self) -> bool {
        self.focus < self.anchor
    }

    /// Clamp both endpoints to `len`.
    pub fn clamped(&self, len: usize) -> Self {
        Self {
            anchor: self.anchor.min(len),
            focus: self.focus.min(len),
        }
    }
}

/// Selection as held by the external selection store.
///
/// Either endpoint may be missing; such a selection is never applied to the
/// editor.
#[derive(Clone, Debug, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSelection {
    #[serde(default)]
    pub anchor: Option<usize>,
    #[serde(default)]
    pub focus: Option<usize>,
}

impl TextSelection {
    pub fn new(anchor: Option<usize>, focus: Option<usize>) -> Self {
        Self { anchor, focus }
    }

    /// The complete selection, if both endpoints are present.
    pub fn complete(&self) -> Option<Selection> {
        Some(Selection::new(self.anchor?, self.focus?))
    }
}

impl From<Selection> for TextSelection {
    fn from(sel: Selection) -> Self {
        Self {
            anchor: Some(sel.anchor),
            focus: Some(sel.focus),
        }
    }
}

/// A transform-level edit produced by the user in the editable tree.
#[derive(Clone, Debug, PartialEq)]
pub enum EditOp {
    /// Insert `text` styled with exactly `attributes` at `offset`.
    Insert {
        offset: usize,
        text: String,
        attributes: Attributes,
    },
    /// Delete a char range.
    Delete { range: Range<usize> },
    /// Set (or with a null value, clear) attributes over a char range.
    Format {
        range: Range<usize>,
        attributes: Attributes,
    },
}

impl EditOp {
    pub fn insert(offset: usize, text: impl Into<String>) -> Self {
        EditOp::Insert {
            offset,
            text: text.into(),
            attributes: Attributes::new(),
        }
    }

    pub fn delete(range: Range<usize>) -> Self {
        EditOp::Delete { range }
    }

    pub fn format(range: Range<usize>, attributes: Attributes) -> Self {
        EditOp::Format { range, attributes }
    }

    /// Length change this op causes, in chars.
    fn len_after(&self, len: usize) -> usize {
        match self {
            EditOp::Insert { text, .. } => len + text.chars().count(),
            EditOp::Delete { range } => len - range.len(),
            EditOp::Format { .. } => len,
        }
    }
}

/// Check a batch of edits against a document of `len` chars, applying each
/// op's length change before checking the next.
///
/// Used so that a batch is rejected before any of it is applied.
pub fn validate_edits(len: usize, ops: &[EditOp]) -> Result<(), SyncError> {
    let mut len = len;
    for op in ops {
        match op {
            EditOp::Insert { offset, .. } if *offset > len => {
                return Err(SyncError::EditOutOfBounds {
                    offset: *offset,
                    len,
                });
            }
            EditOp::Delete { range } | EditOp::Format { range, .. }
                if range.start > range.end || range.end > len =>
            {
                return Err(SyncError::EditOutOfBounds {
                    offset: range.end.max(range.start),
                    len,
                });
            }
            _ => {}
        }
        len = op.len_after(len);
    }
    Ok(())
}

/// Where a change to the replicated text came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Initial content loaded when the session opened (or a re-seed).
    Seed,
    /// A user edit made through the editable tree.
    Local,
    /// A delta supplied by the authoritative document store.
    External,
    /// A CRDT update merged from another replica.
    Remote,
}

impl Origin {
    /// Whether the change originated in the authoritative store.
    pub fn is_authoritative(&self) -> bool {
        matches!(self, Origin::Seed | Origin::External)
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Origin::Seed => "seed",
            Origin::Local => "local",
            Origin::External => "external",
            Origin::Remote => "remote",
        };
        f.write_str(name)
    }
}

/// Notification payload delivered to store observers.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeEvent {
    pub origin: Origin,
    /// Content after the change, in canonical form.
    pub delta: Delta,
}
