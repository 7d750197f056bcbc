//! Editor binding: keeps the replicated text and the editable tree in step.
//!
//! Local edits go tree first, then store, tagged `Origin::Local`; the
//! resulting notification is recognised by its origin and not reapplied.
//! Every other origin is mirrored into the tree. A change that arrives while
//! the tree is borrowed marks the binding stale; the tree is caught up from
//! the store before the next local edit, or on `catch_up`.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::{debug, trace, warn};

use crate::error::SyncError;
use crate::observe::Subscription;
use crate::replica::TextReplica;
use crate::store::ReplicatedTextStore;
use crate::tree::EditableTree;
use crate::types::{ChangeEvent, EditOp, Origin};

/// Bidirectional link between a store and a tree.
///
/// Holds only weak handles to both; the session owns them. The store
/// listener lives exactly as long as the binding (or until `unbind`).
pub struct EditorBinding<R, T> {
    store: Weak<RefCell<ReplicatedTextStore<R>>>,
    tree: Weak<RefCell<T>>,
    subscription: Option<Subscription>,
    /// Set when a change could not be mirrored into a busy tree.
    stale: Rc<Cell<bool>>,
}

impl<R, T> EditorBinding<R, T>
where
    R: TextReplica + 'static,
    T: EditableTree + 'static,
{
    /// Attach to `store` so its non-local changes are mirrored into `tree`.
    pub fn bind(store: &Rc<RefCell<ReplicatedTextStore<R>>>, tree: &Rc<RefCell<T>>) -> Self {
        let weak_tree = Rc::downgrade(tree);
        let stale = Rc::new(Cell::new(false));
        let missed = Rc::clone(&stale);
        let subscription = store
            .borrow()
            .subscribe(move |event| mirror_into_tree(&weak_tree, &missed, event));

        Self {
            store: Rc::downgrade(store),
            tree: Rc::downgrade(tree),
            subscription: Some(subscription),
            stale,
        }
    }

    /// Whether the tree missed a store change it has not caught up on.
    pub fn is_stale(&self) -> bool {
        self.stale.get()
    }

    /// Bring a stale tree up to the store's current content.
    ///
    /// Returns whether the tree was rewritten.
    pub fn catch_up(&self) -> Result<bool, SyncError> {
        if !self.stale.get() || !self.is_bound() {
            return Ok(false);
        }
        let store = self.store.upgrade().ok_or(SyncError::SessionClosed)?;
        let tree = self.tree.upgrade().ok_or(SyncError::SessionClosed)?;
        let Ok(mut tree) = tree.try_borrow_mut() else {
            return Ok(false);
        };
        self.stale.set(false);
        let content = store.borrow().delta();
        if tree.content().content_eq(&content) {
            return Ok(false);
        }
        debug!(len = content.len_chars(), "catching editor up with missed change");
        tree.replace_content(&content);
        Ok(true)
    }

    pub fn is_bound(&self) -> bool {
        self.subscription.is_some()
    }

    /// Apply a user edit: tree first, then the replicated store.
    ///
    /// If the store refuses a batch the tree already took, the store is
    /// overwritten from the tree so the user's visible content wins, and the
    /// store's error is returned.
    pub fn apply_local_edit(&self, ops: &[EditOp]) -> Result<(), SyncError> {
        if !self.is_bound() {
            return Err(SyncError::SessionClosed);
        }
        let store = self.store.upgrade().ok_or(SyncError::SessionClosed)?;
        let tree = self.tree.upgrade().ok_or(SyncError::SessionClosed)?;

        self.catch_up()?;
        tree.borrow_mut().apply_edits(ops)?;

        let result = store.borrow_mut().mutate(ops);
        if let Err(e) = result {
            warn!(error = %e, "store rejected local edit, resyncing from editor");
            let content = tree.borrow().content();
            store.borrow_mut().overwrite(&content, Origin::Local)?;
            return Err(e);
        }
        Ok(())
    }

    /// Detach from the store. Idempotent.
    pub fn unbind(&mut self) {
        if self.subscription.take().is_some() {
            debug!("editor binding detached");
        }
    }
}

fn mirror_into_tree<T: EditableTree>(
    tree: &Weak<RefCell<T>>,
    stale: &Cell<bool>,
    event: &ChangeEvent,
) {
    if event.origin == Origin::Local {
        trace!("skipping echo of local edit");
        return;
    }
    let Some(tree) = tree.upgrade() else {
        trace!(origin = %event.origin, "tree gone, dropping notification");
        return;
    };
    let Ok(mut tree) = tree.try_borrow_mut() else {
        warn!(origin = %event.origin, "editor busy, change deferred");
        stale.set(true);
        return;
    };
    stale.set(false);
    if tree.content().content_eq(&event.delta) {
        trace!(origin = %event.origin, "editor already shows this content");
        return;
    }
    debug!(origin = %event.origin, len = event.delta.len_chars(), "mirroring change into editor");
    tree.replace_content(&event.delta);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::{Delta, attributes};
    use crate::replica::MemoryReplica;
    use crate::tree::BlockTree;
    use crate::types::BlockId;

    type Store = Rc<RefCell<ReplicatedTextStore<MemoryReplica>>>;

    fn setup(initial: &str) -> (Store, Rc<RefCell<BlockTree>>, EditorBinding<MemoryReplica, BlockTree>) {
        let store = Rc::new(RefCell::new(ReplicatedTextStore::new(
            BlockId::new("b"),
            MemoryReplica::new(),
        )));
        let tree = Rc::new(RefCell::new(BlockTree::new()));
        let binding = EditorBinding::bind(&store, &tree);
        store
            .borrow_mut()
            .seed(&Delta::new().insert(initial))
            .unwrap();
        (store, tree, binding)
    }

    #[test]
    fn test_seed_mirrors_into_tree() {
        let (_store, tree, _binding) = setup("hello");
        assert_eq!(tree.borrow().plain_text(), "hello");
        assert_eq!(tree.borrow().mutation_count(), 1);
    }

    #[test]
    fn test_local_edit_is_not_echoed() {
        let (store, tree, binding) = setup("");
        let before = tree.borrow().mutation_count();

        binding.apply_local_edit(&[EditOp::insert(0, "a")]).unwrap();

        assert_eq!(tree.borrow().mutation_count(), before + 1);
        assert_eq!(tree.borrow().plain_text(), "a");
        assert_eq!(store.borrow().delta(), Delta::new().insert("a"));
    }

    #[test]
    fn test_external_update_reaches_tree() {
        let (store, tree, _binding) = setup("hello");
        let update = Delta::new().insert_with("hello", attributes([("bold", true)]));

        store.borrow_mut().apply_external_delta(&update).unwrap();
        assert_eq!(tree.borrow().content(), update);
    }

    #[test]
    fn test_invalid_local_edit_touches_nothing() {
        let (store, tree, binding) = setup("abc");
        let err = binding
            .apply_local_edit(&[EditOp::delete(1..10)])
            .unwrap_err();

        assert!(matches!(err, SyncError::EditOutOfBounds { .. }));
        assert_eq!(tree.borrow().plain_text(), "abc");
        assert_eq!(store.borrow().delta(), Delta::new().insert("abc"));
    }

    #[test]
    fn test_change_missed_by_busy_tree_is_caught_up() {
        let (store, tree, binding) = setup("hello");
        {
            let _busy = tree.borrow();
            store
                .borrow_mut()
                .apply_external_delta(&Delta::new().insert("changed"))
                .unwrap();
        }
        assert!(binding.is_stale());
        assert_eq!(tree.borrow().plain_text(), "hello");

        binding.apply_local_edit(&[EditOp::insert(0, "x")]).unwrap();
        assert!(!binding.is_stale());
        assert_eq!(tree.borrow().plain_text(), "xchanged");
        assert_eq!(store.borrow().delta(), Delta::new().insert("xchanged"));
    }

    #[test]
    fn test_catch_up() {
        let (store, tree, binding) = setup("hello");
        assert_eq!(binding.catch_up(), Ok(false));

        let busy = tree.borrow();
        store
            .borrow_mut()
            .apply_external_delta(&Delta::new().insert("later"))
            .unwrap();
        assert_eq!(binding.catch_up(), Ok(false));
        drop(busy);

        assert_eq!(binding.catch_up(), Ok(true));
        assert_eq!(tree.borrow().plain_text(), "later");
        assert!(!binding.is_stale());
    }

    #[test]
    fn test_unbind_stops_mirroring() {
        let (store, tree, mut binding) = setup("hello");
        binding.unbind();
        binding.unbind();
        assert_eq!(store.borrow().observer_count(), 0);

        store
            .borrow_mut()
            .apply_external_delta(&Delta::new().insert("changed"))
            .unwrap();
        assert_eq!(tree.borrow().plain_text(), "hello");
        assert_eq!(
            binding.apply_local_edit(&[EditOp::insert(0, "x")]),
            Err(SyncError::SessionClosed)
        );
    }

    #[test]
    fn test_drop_detaches() {
        let (store, _tree, binding) = setup("hello");
        assert_eq!(store.borrow().observer_count(), 1);
        drop(binding);
        assert_eq!(store.borrow().observer_count(), 0);
    }
}
