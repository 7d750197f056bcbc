//! The editable tree: what the user directly interacts with.
//!
//! Defines the `EditableTree` trait so the binding can drive any editor
//! front end, and `BlockTree`, a plain field-based implementation holding a
//! single block's styled leaves.

use crate::delta::Delta;
use crate::error::SyncError;
use crate::styled::StyledText;
use crate::types::{EditOp, Selection, validate_edits};

/// Core trait for live editor state bound to a replicated block.
pub trait EditableTree {
    // === Required: content ===

    /// Current content as a delta.
    fn content(&self) -> Delta;

    /// Length in chars.
    fn len_chars(&self) -> usize;

    /// Apply a batch of user edits. The batch is all-or-nothing.
    fn apply_edits(&mut self, ops: &[EditOp]) -> Result<(), SyncError>;

    /// Replace the whole content with `delta` (external/remote updates).
    fn replace_content(&mut self, delta: &Delta);

    // === Required: selection and focus ===

    fn selection(&self) -> Option<Selection>;

    fn set_selection(&mut self, selection: Option<Selection>);

    fn is_focused(&self) -> bool;

    fn set_focused(&mut self, focused: bool);

    // === Provided ===

    /// Give the editor input focus.
    fn focus(&mut self) {
        self.set_focused(true);
    }

    fn blur(&mut self) {
        self.set_focused(false);
    }

    /// Select a range, clamped to the current content.
    fn select(&mut self, selection: Selection) {
        let len = self.len_chars();
        self.set_selection(Some(selection.clamped(len)));
    }

    fn is_empty(&self) -> bool {
        self.len_chars() == 0
    }

    fn plain_text(&self) -> String {
        self.content().plain_text()
    }
}

/// Simple field-based implementation of `EditableTree`.
///
/// Counts its own mutations so callers can tell a real edit from a no-op
/// refresh.
#[derive(Clone, Debug, Default)]
pub struct BlockTree {
    leaves: StyledText,
    selection: Option<Selection>,
    focused: bool,
    mutations: u64,
}

impl BlockTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_delta(delta: &Delta) -> Self {
        Self {
            leaves: StyledText::from_delta(delta),
            ..Self::default()
        }
    }

    pub fn leaves(&self) -> &StyledText {
        &self.leaves
    }

    /// Number of times content was changed (edit batches plus
    /// replacements).
    pub fn mutation_count(&self) -> u64 {
        self.mutations
    }

    fn apply_one(&mut self, op: &EditOp) -> Result<(), SyncError> {
        match op {
            EditOp::Insert {
                offset,
                text,
                attributes,
            } => {
                self.leaves.insert(*offset, text, attributes)?;
                let inserted = text.chars().count();
                self.set_selection(Some(Selection::collapsed(offset + inserted)));
            }
            EditOp::Delete { range } => {
                self.leaves.delete(range.clone())?;
                self.set_selection(Some(Selection::collapsed(range.start)));
            }
            EditOp::Format { range, attributes } => {
                self.leaves.format(range.clone(), attributes)?;
            }
        }
        Ok(())
    }
}

impl EditableTree for BlockTree {
    fn content(&self) -> Delta {
        self.leaves.to_delta()
    }

    fn len_chars(&self) -> usize {
        self.leaves.len_chars()
    }

    fn apply_edits(&mut self, ops: &[EditOp]) -> Result<(), SyncError> {
        if ops.is_empty() {
            return Ok(());
        }
        validate_edits(self.leaves.len_chars(), ops)?;
        for op in ops {
            self.apply_one(op)?;
        }
        self.mutations += 1;
        Ok(())
    }

    fn replace_content(&mut self, delta: &Delta) {
        self.leaves = StyledText::from_delta(delta);
        let len = self.leaves.len_chars();
        self.selection = self.selection.map(|sel| sel.clamped(len));
        self.mutations += 1;
    }

    fn selection(&self) -> Option<Selection> {
        self.selection
    }

    fn set_selection(&mut self, selection: Option<Selection>) {
        self.selection = selection;
    }

    fn is_focused(&self) -> bool {
        self.focused
    }

    fn set_focused(&mut self, focused: bool) {
        self.focused = focused;
    }
}
