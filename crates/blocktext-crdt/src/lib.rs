//! Loro-backed replicated text for blocktext.
//!
//! This crate provides:
//! - `LoroReplica`: Loro-backed rich text implementing `TextReplica` + `MergeableReplica`
//! - `CrdtError`: errors from the Loro engine, convertible to `SyncError`
//! - `LoroBlockSession`: a `BlockSession` over `LoroReplica`

mod buffer;
mod error;

pub use buffer::{LoroReplica, TEXT_CONTAINER};
pub use error::CrdtError;

use blocktext_core::{BlockSession, BlockTree, MemorySelectionStore};

/// Block session backed by Loro, with the stock tree and selection store.
pub type LoroBlockSession<B> = BlockSession<LoroReplica, BlockTree, B, MemorySelectionStore>;

// Re-export Loro types that consumers need
pub use loro::{LoroDoc, VersionVector};
