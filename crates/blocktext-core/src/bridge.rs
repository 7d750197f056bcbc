//! Persistence bridge: the interface to the authoritative document store.
//!
//! The store itself is external. This module defines what the core hands it
//! (a block identity with the new delta spliced in) and the shape of the
//! update action the store dispatches.

use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use smol_str::SmolStr;

use crate::delta::Delta;
use crate::error::{PersistenceError, SyncError};
use crate::types::BlockId;

/// Structural context for a block, enough to build an update instruction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockIdentity {
    pub id: BlockId,
    /// Block type (e.g. "text", "heading").
    pub ty: SmolStr,
    #[serde(default)]
    pub parent: Option<BlockId>,
    #[serde(default)]
    pub children: Vec<BlockId>,
    /// Free-form payload; the content delta lives under one of its keys.
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl BlockIdentity {
    pub fn new(id: impl Into<BlockId>, ty: impl Into<SmolStr>) -> Self {
        Self {
            id: id.into(),
            ty: ty.into(),
            parent: None,
            children: Vec::new(),
            data: Map::new(),
        }
    }

    pub fn with_parent(mut self, parent: impl Into<BlockId>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = BlockId>) -> Self {
        self.children = children.into_iter().collect();
        self
    }

    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = data;
        self
    }

    /// Write `delta` into the payload under `key`, keeping other fields.
    pub fn splice_content(&mut self, key: &str, delta: &Delta) {
        self.data.insert(key.to_owned(), delta.to_json());
    }

    /// The persisted content delta, if the payload has a valid one.
    pub fn content(&self, key: &str) -> Option<Delta> {
        self.data.get(key).and_then(|v| Delta::from_json(v).ok())
    }

    /// The persisted content delta for seeding. A missing key is an empty
    /// document; a malformed value is an error.
    pub fn persisted_content(&self, key: &str) -> Result<Delta, SyncError> {
        match self.data.get(key) {
            None | Some(Value::Null) => Ok(Delta::new()),
            Some(value) => Delta::from_json(value),
        }
    }
}

/// An outgoing update: the block context with its new content.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockUpdate {
    /// Identity with `delta` already spliced into `data`.
    pub block: BlockIdentity,
    pub delta: Delta,
}

impl BlockUpdate {
    pub fn new(identity: &BlockIdentity, content_key: &str, delta: Delta) -> Self {
        let mut block = identity.clone();
        block.splice_content(content_key, &delta);
        Self { block, delta }
    }

    /// Render the store's update action for this block.
    pub fn to_action(&self) -> BlockAction {
        BlockAction {
            action: BlockActionType::Update,
            payload: BlockActionPayload {
                block: BlockPayload {
                    id: self.block.id.to_string(),
                    ty: self.block.ty.to_string(),
                    parent_id: self
                        .block
                        .parent
                        .as_ref()
                        .map(ToString::to_string)
                        .unwrap_or_default(),
                    children_id: self.block.children.iter().map(ToString::to_string).collect(),
                    data: Value::Object(self.block.data.clone()).to_string(),
                },
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockActionType {
    Update,
}

/// Action as dispatched to the document store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockAction {
    pub action: BlockActionType,
    pub payload: BlockActionPayload,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockActionPayload {
    pub block: BlockPayload,
}

/// Block as the store serializes it; `data` is a JSON string.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockPayload {
    pub id: String,
    pub ty: String,
    pub parent_id: String,
    pub children_id: Vec<String>,
    pub data: String,
}

/// Accepts committed block content.
///
/// Implementations must tolerate the same update being sent twice. The core
/// only looks at success or failure.
pub trait PersistenceBridge {
    fn update_block(&self, update: BlockUpdate) -> impl Future<Output = Result<(), PersistenceError>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn identity() -> BlockIdentity {
        let data = match json!({"level": 2, "delta": []}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        BlockIdentity::new("blk-1", "heading")
            .with_parent("page-1")
            .with_children([BlockId::new("c1"), BlockId::new("c2")])
            .with_data(data)
    }

    #[test]
    fn test_update_splices_delta_and_keeps_data() {
        let update = BlockUpdate::new(&identity(), "delta", Delta::new().insert("hi"));
        assert_eq!(update.block.data["level"], json!(2));
        assert_eq!(update.block.content("delta"), Some(Delta::new().insert("hi")));
    }

    #[test]
    fn test_action_shape() {
        let update = BlockUpdate::new(&identity(), "delta", Delta::new().insert("hi"));
        insta::assert_snapshot!(
            serde_json::to_string(&update.to_action()).unwrap(),
            @r#"{"action":"update","payload":{"block":{"id":"blk-1","ty":"heading","parent_id":"page-1","children_id":["c1","c2"],"data":"{\"delta\":[{\"insert\":\"hi\"}],\"level\":2}"}}}"#
        );
    }

    #[test]
    fn test_action_without_parent() {
        let update = BlockUpdate::new(&BlockIdentity::new("b", "text"), "delta", Delta::new());
        let action = update.to_action();
        assert_eq!(action.payload.block.parent_id, "");
        assert_eq!(action.payload.block.data, r#"{"delta":[]}"#);
    }

    #[test]
    fn test_persisted_content() {
        assert_eq!(identity().persisted_content("delta"), Ok(Delta::new()));
        assert_eq!(identity().persisted_content("missing"), Ok(Delta::new()));
        assert!(matches!(
            identity().persisted_content("level"),
            Err(SyncError::InvalidDeltaOperation { .. })
        ));
    }

    #[test]
    fn test_identity_json() {
        let parsed: BlockIdentity =
            serde_json::from_value(json!({"id": "x", "ty": "text"})).unwrap();
        assert_eq!(parsed, BlockIdentity::new("x", "text"));
    }
}
