//! Delta: the flat, ordered sequence of styled text runs that describes a
//! block's content.
//!
//! A delta is always a full snapshot of the block, never a diff against some
//! unstated baseline. Two deltas are equal when their serialized operation
//! sequences are structurally equal; `canonical()` removes the spelling
//! differences (split runs, empty runs, null attributes) that do not change
//! the content.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::error::SyncError;

/// A single style attribute value.
///
/// Style maps are JSON-compatible, but only scalars are meaningful as text
/// styles. `Null` means "remove this attribute" when formatting.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(SmolStr),
}

impl AttributeValue {
    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Float(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(SmolStr::new(value))
    }
}

/// Style attributes attached to a run, keyed by attribute name.
pub type Attributes = BTreeMap<SmolStr, AttributeValue>;

/// Build an attribute map from `(key, value)` pairs.
pub fn attributes<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Attributes
where
    K: Into<SmolStr>,
    V: Into<AttributeValue>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// One operation of a delta.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDeltaOp", into = "RawDeltaOp")]
pub enum DeltaOp {
    /// A run of text with its style.
    Insert { text: String, attributes: Attributes },
    /// A retain/format marker spanning `len` chars.
    Retain { len: usize, attributes: Attributes },
}

impl DeltaOp {
    pub fn insert(text: impl Into<String>) -> Self {
        DeltaOp::Insert {
            text: text.into(),
            attributes: Attributes::new(),
        }
    }

    pub fn insert_with(text: impl Into<String>, attributes: Attributes) -> Self {
        DeltaOp::Insert {
            text: text.into(),
            attributes,
        }
    }

    pub fn retain(len: usize, attributes: Attributes) -> Self {
        DeltaOp::Retain { len, attributes }
    }

    pub fn attributes(&self) -> &Attributes {
        match self {
            DeltaOp::Insert { attributes, .. } | DeltaOp::Retain { attributes, .. } => attributes,
        }
    }
}

/// Wire shape of an operation, before its kind has been checked.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct RawDeltaOp {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    insert: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    retain: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    delete: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    attributes: Option<Attributes>,
}

impl TryFrom<RawDeltaOp> for DeltaOp {
    type Error = SmolStr;

    fn try_from(raw: RawDeltaOp) -> Result<Self, Self::Error> {
        let attributes = raw.attributes.unwrap_or_default();
        match (raw.insert, raw.retain, raw.delete) {
            (Some(text), None, None) => Ok(DeltaOp::Insert { text, attributes }),
            (None, Some(len), None) => Ok(DeltaOp::Retain { len, attributes }),
            (None, None, Some(_)) => Err(SmolStr::new_static(
                "delete is not allowed in a content delta",
            )),
            (None, None, None) => Err(SmolStr::new_static(
                "operation is neither insert nor retain",
            )),
            _ => Err(SmolStr::new_static("operation has more than one kind")),
        }
    }
}

impl From<DeltaOp> for RawDeltaOp {
    fn from(op: DeltaOp) -> Self {
        match op {
            DeltaOp::Insert { text, attributes } => RawDeltaOp {
                insert: Some(text),
                attributes: (!attributes.is_empty()).then_some(attributes),
                ..Default::default()
            },
            DeltaOp::Retain { len, attributes } => RawDeltaOp {
                retain: Some(len),
                attributes: (!attributes.is_empty()).then_some(attributes),
                ..Default::default()
            },
        }
    }
}

/// An immutable snapshot of block content as an ordered list of operations.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Delta {
    ops: Vec<DeltaOp>,
}

impl Delta {
    /// The empty document.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ops(ops: Vec<DeltaOp>) -> Self {
        Self { ops }
    }

    /// Append a plain insert.
    pub fn insert(mut self, text: impl Into<String>) -> Self {
        self.ops.push(DeltaOp::insert(text));
        self
    }

    /// Append a styled insert.
    pub fn insert_with(mut self, text: impl Into<String>, attributes: Attributes) -> Self {
        self.ops.push(DeltaOp::insert_with(text, attributes));
        self
    }

    pub fn ops(&self) -> &[DeltaOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Length of the inserted content in chars.
    pub fn len_chars(&self) -> usize {
        self.ops
            .iter()
            .map(|op| match op {
                DeltaOp::Insert { text, .. } => text.chars().count(),
                DeltaOp::Retain { .. } => 0,
            })
            .sum()
    }

    /// The unstyled text content.
    pub fn plain_text(&self) -> String {
        self.ops
            .iter()
            .filter_map(|op| match op {
                DeltaOp::Insert { text, .. } => Some(text.as_str()),
                DeltaOp::Retain { .. } => None,
            })
            .collect()
    }

    /// Canonical spelling of this delta.
    ///
    /// Drops zero-length runs, retain markers and null attributes, and merges
    /// neighbouring inserts that carry the same style.
    pub fn canonical(&self) -> Delta {
        let mut ops: Vec<DeltaOp> = Vec::with_capacity(self.ops.len());
        for op in &self.ops {
            let DeltaOp::Insert { text, attributes } = op else {
                continue;
            };
            if text.is_empty() {
                continue;
            }
            let attributes: Attributes = attributes
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            match ops.last_mut() {
                Some(DeltaOp::Insert {
                    text: prev,
                    attributes: prev_attrs,
                }) if *prev_attrs == attributes => prev.push_str(text),
                _ => ops.push(DeltaOp::Insert {
                    text: text.clone(),
                    attributes,
                }),
            }
        }
        Delta { ops }
    }

    /// Structural equality after canonicalization.
    pub fn content_eq(&self, other: &Delta) -> bool {
        self.canonical() == other.canonical()
    }

    /// Parse a delta from its JSON form, rejecting malformed operations.
    ///
    /// Unlike plain `serde_json::from_value`, errors name the index of the
    /// offending operation.
    pub fn from_json(value: &serde_json::Value) -> Result<Delta, SyncError> {
        let items = value
            .as_array()
            .ok_or_else(|| SyncError::invalid_op(0, "delta must be an array of operations"))?;

        let mut ops = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let raw: RawDeltaOp = serde_json::from_value(item.clone())
                .map_err(|e| SyncError::invalid_op(index, e.to_string()))?;
            let op = DeltaOp::try_from(raw).map_err(|reason| SyncError::invalid_op(index, reason))?;
            ops.push(op);
        }
        Ok(Delta { ops })
    }

    /// Serialize to the JSON operation sequence.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(
            self.ops
                .iter()
                .cloned()
                .map(|op| serde_json::to_value(RawDeltaOp::from(op)).unwrap_or_default())
                .collect(),
        )
    }
}

impl FromStr for Delta {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: serde_json::Value =
            serde_json::from_str(s).map_err(|e| SyncError::invalid_op(0, e.to_string()))?;
        Delta::from_json(&value)
    }
}

impl fmt::Display for Delta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl FromIterator<DeltaOp> for Delta {
    fn from_iter<I: IntoIterator<Item = DeltaOp>>(iter: I) -> Self {
        Delta {
            ops: iter.into_iter().collect(),
        }
    }
}
