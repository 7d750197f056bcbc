//! blocktext-core: block rich-text sync without framework dependencies.
//!
//! This crate provides:
//! - `Delta` - the JSON operation sequence a block's content is stored as
//! - `TextReplica` trait for replicated text storage, with `MemoryReplica`
//! - `ReplicatedTextStore` - owns the replica and notifies on change
//! - `EditableTree` trait for the live editor, with `BlockTree`
//! - `EditorBinding`, `ChangePropagator`, `SelectionCoordinator`
//! - `BlockSession` - wires all of the above for one block

pub mod binding;
pub mod bridge;
pub mod codec;
pub mod config;
pub mod delta;
pub mod error;
pub mod observe;
pub mod propagator;
pub mod replica;
pub mod selection;
pub mod session;
pub mod status;
pub mod store;
pub mod styled;
pub mod tree;
pub mod types;

#[cfg(test)]
mod testing;

pub use binding::EditorBinding;
pub use bridge::{
    BlockAction, BlockActionPayload, BlockActionType, BlockIdentity, BlockPayload, BlockUpdate,
    PersistenceBridge,
};
pub use codec::{ReplicatedInsertSequence, to_delta, to_replicated_insert_sequence};
pub use config::{DEFAULT_CONTENT_KEY, DEFAULT_DEBOUNCE_MS, SyncConfig, TeardownPolicy};
pub use delta::{AttributeValue, Attributes, Delta, DeltaOp, attributes};
pub use error::{PersistenceError, SyncError};
pub use observe::{ObserverId, Subscription};
pub use propagator::ChangePropagator;
pub use replica::{MemoryReplica, MergeableReplica, TextReplica};
pub use selection::{MemorySelectionStore, SelectionCoordinator, SelectionStore};
pub use session::BlockSession;
pub use smol_str::SmolStr;
pub use status::SyncStatus;
pub use store::ReplicatedTextStore;
pub use styled::{StyledText, TextRun};
pub use tree::{BlockTree, EditableTree};
pub use types::{BlockId, ChangeEvent, EditOp, Origin, Selection, TextSelection};
