//! Selection coordination between the external selection store and the
//! editor.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use crate::tree::EditableTree;
use crate::types::{BlockId, Selection, TextSelection};

/// Per-block selection state owned outside the editing core.
pub trait SelectionStore {
    fn selection(&self, block_id: &BlockId) -> Option<TextSelection>;

    /// Record the selection for a block; `None` clears it.
    fn set_selection(&self, block_id: &BlockId, selection: Option<TextSelection>);
}

/// In-memory selection store, one entry per block.
#[derive(Debug, Default)]
pub struct MemorySelectionStore {
    entries: RefCell<HashMap<BlockId, TextSelection>>,
}

impl MemorySelectionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SelectionStore for MemorySelectionStore {
    fn selection(&self, block_id: &BlockId) -> Option<TextSelection> {
        self.entries.borrow().get(block_id).copied()
    }

    fn set_selection(&self, block_id: &BlockId, selection: Option<TextSelection>) {
        let mut entries = self.entries.borrow_mut();
        match selection {
            Some(sel) => {
                entries.insert(block_id.clone(), sel);
            }
            None => {
                entries.remove(block_id);
            }
        }
    }
}

/// Applies externally stored selections to the editor and reports local
/// ones back.
pub struct SelectionCoordinator<S, T> {
    block_id: BlockId,
    store: Rc<S>,
    tree: Weak<RefCell<T>>,
    last_seen: Option<TextSelection>,
}

impl<S: SelectionStore, T: EditableTree> SelectionCoordinator<S, T> {
    pub fn new(block_id: BlockId, store: Rc<S>, tree: &Rc<RefCell<T>>) -> Self {
        Self {
            block_id,
            store,
            tree: Rc::downgrade(tree),
            last_seen: None,
        }
    }

    /// Pull this block's selection from the store and apply it if it changed.
    ///
    /// Only a selection with both endpoints is applied: the editor is
    /// focused first, then the range is selected. Returns the applied
    /// selection.
    pub fn sync_from_store(&mut self) -> Option<Selection> {
        let current = self.store.selection(&self.block_id);
        if current == self.last_seen {
            return None;
        }
        self.last_seen = current;

        let Some(selection) = current.and_then(|sel| sel.complete()) else {
            trace!(block_id = %self.block_id, ?current, "ignoring absent or partial selection");
            return None;
        };
        let tree = self.tree.upgrade()?;
        let mut tree = tree.borrow_mut();
        tree.focus();
        tree.select(selection);
        debug!(block_id = %self.block_id, ?selection, "applied stored selection");
        tree.selection()
    }

    /// Report a selection made in the editor, immediately.
    pub fn report_local_selection(&mut self, selection: Option<Selection>) {
        let selection = selection.map(TextSelection::from);
        // Already in the store, so the next sync must not bounce it back.
        self.last_seen = selection;
        self.store.set_selection(&self.block_id, selection);
    }

    pub fn block_id(&self) -> &BlockId {
        &self.block_id
    }
}
