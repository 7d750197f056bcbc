//! The replicated text store: exclusive owner of a block's CRDT text value.

use tracing::{debug, error};

use crate::codec::{self, ReplicatedInsertSequence};
use crate::delta::Delta;
use crate::error::SyncError;
use crate::observe::{ObserverId, ObserverSet, Subscription};
use crate::replica::{MergeableReplica, TextReplica};
use crate::types::{BlockId, ChangeEvent, EditOp, Origin, validate_edits};

/// Owns one replicated text value for the lifetime of an editing session.
///
/// Every successful mutation notifies all observers exactly once, with the
/// resulting delta, before the mutating call returns.
pub struct ReplicatedTextStore<R> {
    block_id: BlockId,
    replica: R,
    observers: ObserverSet,
}

impl<R: TextReplica> ReplicatedTextStore<R> {
    pub fn new(block_id: BlockId, replica: R) -> Self {
        Self {
            block_id,
            replica,
            observers: ObserverSet::new(),
        }
    }

    pub fn block_id(&self) -> &BlockId {
        &self.block_id
    }

    pub fn replica(&self) -> &R {
        &self.replica
    }

    /// Current content as a canonical delta.
    pub fn delta(&self) -> Delta {
        codec::to_delta(&self.replica)
    }

    pub fn len_chars(&self) -> usize {
        self.replica.len_chars()
    }

    /// Initialize content from the block's persisted delta.
    ///
    /// Calling this again is an authoritative overwrite, not a merge. A
    /// replica that already holds exactly this content (e.g. one restored
    /// from a snapshot) is left untouched so its history stays shared with
    /// its peers; observers are notified either way.
    pub fn seed(&mut self, delta: &Delta) -> Result<(), SyncError> {
        let seq = codec::to_replicated_insert_sequence(delta)?;
        if seq.to_delta() != self.delta() {
            self.replace(&seq)?;
        }
        debug!(block_id = %self.block_id, len = seq.len_chars(), "seeded replicated text");
        self.notify(Origin::Seed);
        Ok(())
    }

    /// Replace content with `delta` unless the store already holds it.
    ///
    /// Returns whether anything changed. An equal delta (after
    /// canonicalization, attributes included) is a no-op and does not
    /// notify.
    pub fn apply_external_delta(&mut self, delta: &Delta) -> Result<bool, SyncError> {
        self.overwrite(delta, Origin::External)
    }

    /// Apply a batch of local edits as one transaction.
    ///
    /// The whole batch is bounds-checked before anything is applied. An
    /// empty batch does nothing and does not notify.
    pub fn mutate(&mut self, ops: &[EditOp]) -> Result<(), SyncError> {
        if ops.is_empty() {
            return Ok(());
        }
        validate_edits(self.replica.len_chars(), ops)?;

        for op in ops {
            let result = match op {
                EditOp::Insert {
                    offset,
                    text,
                    attributes,
                } => self.replica.insert(*offset, text, attributes),
                EditOp::Delete { range } => self.replica.delete(range.clone()),
                EditOp::Format { range, attributes } => {
                    self.replica.format(range.clone(), attributes)
                }
            };
            if let Err(e) = result {
                error!(block_id = %self.block_id, error = %e, "replica rejected validated edit");
                self.replica.commit();
                return Err(e);
            }
        }
        self.replica.commit();
        self.notify(Origin::Local);
        Ok(())
    }

    /// Compare-then-replace with an explicit origin.
    pub(crate) fn overwrite(&mut self, delta: &Delta, origin: Origin) -> Result<bool, SyncError> {
        let seq = codec::to_replicated_insert_sequence(delta)?;
        if seq.to_delta() == self.delta() {
            debug!(block_id = %self.block_id, %origin, "delta already applied, skipping");
            return Ok(false);
        }
        self.replace(&seq)?;
        self.notify(origin);
        Ok(true)
    }

    /// Register a change listener.
    pub fn observe(&self, handler: impl Fn(&ChangeEvent) + 'static) -> ObserverId {
        self.observers.add(handler)
    }

    /// Deregister a change listener. Returns true if it was registered.
    pub fn unobserve(&self, id: ObserverId) -> bool {
        self.observers.remove(id)
    }

    /// Register a listener that detaches when the guard is dropped.
    pub fn subscribe(&self, handler: impl Fn(&ChangeEvent) + 'static) -> Subscription {
        self.observers.subscribe(handler)
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    fn replace(&mut self, seq: &ReplicatedInsertSequence) -> Result<(), SyncError> {
        let result = self
            .replica
            .clear()
            .and_then(|()| seq.apply_to(&mut self.replica));
        self.replica.commit();
        result
    }

    fn notify(&self, origin: Origin) {
        let event = ChangeEvent {
            origin,
            delta: self.delta(),
        };
        self.observers.notify(&event);
    }
}

impl<R: MergeableReplica> ReplicatedTextStore<R> {
    /// Merge a CRDT update from another replica.
    ///
    /// Notifies with `Origin::Remote` only if the visible content changed.
    pub fn merge_remote(&mut self, update: &[u8]) -> Result<bool, SyncError> {
        let before = self.delta();
        self.replica.import(update)?;
        if self.delta() == before {
            debug!(block_id = %self.block_id, "remote update changed nothing visible");
            return Ok(false);
        }
        self.notify(Origin::Remote);
        Ok(true)
    }

    pub fn version(&self) -> R::Version {
        self.replica.version()
    }

    pub fn export_snapshot(&self) -> Result<Vec<u8>, SyncError> {
        self.replica.export_snapshot()
    }

    pub fn export_updates_since(&self, version: &R::Version) -> Result<Option<Vec<u8>>, SyncError> {
        self.replica.export_updates_since(version)
    }
}
