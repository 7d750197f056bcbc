//! Block editing session: wires store, tree, binding, propagator and
//! selection coordinator for one block.
//!
//! Everything a session needs is passed in explicitly. Opening seeds the
//! replicated text from the block's persisted delta; a seeding failure is
//! returned before any editing is possible.

use std::cell::{Ref, RefCell};
use std::rc::Rc;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::binding::EditorBinding;
use crate::bridge::{BlockIdentity, PersistenceBridge};
use crate::config::SyncConfig;
use crate::delta::Delta;
use crate::error::SyncError;
use crate::propagator::ChangePropagator;
use crate::replica::{MergeableReplica, TextReplica};
use crate::selection::{SelectionCoordinator, SelectionStore};
use crate::status::SyncStatus;
use crate::store::ReplicatedTextStore;
use crate::tree::EditableTree;
use crate::types::{BlockId, EditOp, Selection};

/// One block's live editing session.
///
/// Must be opened and used inside a `tokio::task::LocalSet`.
pub struct BlockSession<R, T, B, S> {
    block_id: BlockId,
    store: Rc<RefCell<ReplicatedTextStore<R>>>,
    tree: Rc<RefCell<T>>,
    binding: EditorBinding<R, T>,
    propagator: ChangePropagator<B>,
    selection: SelectionCoordinator<S, T>,
}

impl<R, T, B, S> BlockSession<R, T, B, S>
where
    R: TextReplica + 'static,
    T: EditableTree + 'static,
    B: PersistenceBridge + 'static,
    S: SelectionStore,
{
    /// Open a session for the block described by `identity`.
    ///
    /// The initial content is read from `identity.data[config.content_key]`
    /// (missing means empty).
    pub fn open(
        config: &SyncConfig,
        identity: BlockIdentity,
        replica: R,
        tree: T,
        bridge: Rc<B>,
        selection_store: Rc<S>,
    ) -> Result<Self, SyncError> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(SyncError::NoRuntime);
        }
        let initial = identity.persisted_content(&config.content_key)?;
        let block_id = identity.id.clone();

        let store = Rc::new(RefCell::new(ReplicatedTextStore::new(
            block_id.clone(),
            replica,
        )));
        let tree = Rc::new(RefCell::new(tree));
        let binding = EditorBinding::bind(&store, &tree);
        store.borrow_mut().seed(&initial)?;

        let propagator = ChangePropagator::attach(&*store.borrow(), bridge, identity, config);
        let selection = SelectionCoordinator::new(block_id.clone(), selection_store, &tree);

        info!(%block_id, len = initial.len_chars(), "block session opened");
        Ok(Self {
            block_id,
            store,
            tree,
            binding,
            propagator,
            selection,
        })
    }

    pub fn block_id(&self) -> &BlockId {
        &self.block_id
    }

    /// Apply a user edit batch.
    pub fn edit(&self, ops: &[EditOp]) -> Result<(), SyncError> {
        debug!(block_id = %self.block_id, ops = ops.len(), "local edit");
        self.binding.apply_local_edit(ops)
    }

    /// Type `text` at `offset` with no formatting.
    pub fn insert_text(&self, offset: usize, text: &str) -> Result<(), SyncError> {
        self.edit(&[EditOp::insert(offset, text)])
    }

    /// Replace content with a delta from the authoritative store.
    ///
    /// Returns whether anything changed.
    pub fn apply_external_delta(&self, delta: &Delta) -> Result<bool, SyncError> {
        if !self.binding.is_bound() {
            return Err(SyncError::SessionClosed);
        }
        self.store.borrow_mut().apply_external_delta(delta)
    }

    /// Pick up the externally stored selection for this block.
    pub fn sync_selection(&mut self) -> Result<Option<Selection>, SyncError> {
        if self.is_closed() {
            return Err(SyncError::SessionClosed);
        }
        self.binding.catch_up()?;
        Ok(self.selection.sync_from_store())
    }

    /// Report the editor's current selection to the selection store.
    pub fn report_selection(&mut self) -> Result<(), SyncError> {
        if self.is_closed() {
            return Err(SyncError::SessionClosed);
        }
        let selection = self.tree.borrow().selection();
        self.selection.report_local_selection(selection);
        Ok(())
    }

    /// Current replicated content.
    pub fn content(&self) -> Delta {
        self.store.borrow().delta()
    }

    pub fn tree(&self) -> Ref<'_, T> {
        self.tree.borrow()
    }

    pub fn store(&self) -> Ref<'_, ReplicatedTextStore<R>> {
        self.store.borrow()
    }

    pub fn status(&self) -> watch::Receiver<SyncStatus> {
        self.propagator.status()
    }

    pub fn current_status(&self) -> SyncStatus {
        self.propagator.current_status()
    }

    pub fn is_closed(&self) -> bool {
        !self.binding.is_bound()
    }

    /// End the session: detach the binding and settle the pending update
    /// per the configured teardown policy.
    pub async fn close(&mut self) {
        if self.is_closed() {
            return;
        }
        self.binding.unbind();
        self.propagator.close().await;
        info!(block_id = %self.block_id, "block session closed");
    }
}

impl<R, T, B, S> BlockSession<R, T, B, S>
where
    R: MergeableReplica + 'static,
    T: EditableTree + 'static,
    B: PersistenceBridge + 'static,
    S: SelectionStore,
{
    /// Merge a CRDT update from another replica of this block.
    pub fn merge_remote(&self, update: &[u8]) -> Result<bool, SyncError> {
        if self.is_closed() {
            return Err(SyncError::SessionClosed);
        }
        self.store.borrow_mut().merge_remote(update)
    }

    pub fn version(&self) -> R::Version {
        self.store.borrow().version()
    }

    pub fn export_snapshot(&self) -> Result<Vec<u8>, SyncError> {
        self.store.borrow().export_snapshot()
    }

    pub fn export_updates_since(&self, version: &R::Version) -> Result<Option<Vec<u8>>, SyncError> {
        self.store.borrow().export_updates_since(version)
    }
}
