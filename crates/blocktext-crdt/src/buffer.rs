//! Loro-backed replicated text implementing the core replica traits.

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::ops::Range;

use blocktext_core::{
    AttributeValue, Attributes, MergeableReplica, SmolStr, SyncError, TextReplica, TextRun,
};
use loro::{ExpandType, ExportMode, LoroDoc, LoroText, LoroValue, StyleConfig, TextDelta, VersionVector};
use tracing::trace;

use crate::CrdtError;

/// Name of the text container inside the Loro document.
pub const TEXT_CONTAINER: &str = "content";

/// Rich text stored in a `LoroDoc`.
///
/// Style keys never expand at a mark's edges, and text inserted inside a
/// styled run is unmarked for keys it was not inserted with, so inserted text
/// carries exactly its own attributes.
#[derive(Clone)]
pub struct LoroReplica {
    doc: LoroDoc,
    text: LoroText,
}

impl LoroReplica {
    /// Create a new empty replica.
    pub fn new() -> Self {
        Self::from_doc(LoroDoc::new())
    }

    /// Create a replica from an existing Loro snapshot.
    pub fn from_snapshot(snapshot: &[u8]) -> Result<Self, CrdtError> {
        let replica = Self::from_doc(LoroDoc::new());
        replica
            .doc
            .import(snapshot)
            .map_err(|e| CrdtError::Import(e.to_string()))?;
        Ok(replica)
    }

    fn from_doc(doc: LoroDoc) -> Self {
        doc.config_default_text_style(Some(StyleConfig {
            expand: ExpandType::None,
        }));
        let text = doc.get_text(TEXT_CONTAINER);
        Self { doc, text }
    }

    /// Get the underlying Loro document.
    pub fn doc(&self) -> &LoroDoc {
        &self.doc
    }

    pub fn to_plain_string(&self) -> String {
        self.text.to_string()
    }

    fn check_range(&self, range: &Range<usize>) -> Result<(), SyncError> {
        let len = self.text.len_unicode();
        if range.start > range.end || range.end > len {
            return Err(SyncError::EditOutOfBounds {
                offset: range.end.max(range.start),
                len,
            });
        }
        Ok(())
    }

    /// Style keys present anywhere in `range`.
    fn keys_over(&self, range: &Range<usize>) -> BTreeSet<SmolStr> {
        let mut keys = BTreeSet::new();
        let mut pos = 0;
        for run in self.runs() {
            let end = pos + run.len_chars();
            if pos < range.end && end > range.start {
                keys.extend(run.attributes.into_keys());
            }
            if end >= range.end {
                break;
            }
            pos = end;
        }
        keys
    }

    fn apply_marks(&mut self, range: Range<usize>, attributes: &Attributes) -> Result<(), CrdtError> {
        if range.is_empty() {
            return Ok(());
        }
        for (key, value) in attributes {
            if value.is_null() {
                self.text.unmark(range.clone(), key)?;
            } else {
                self.text.mark(range.clone(), key, to_loro(value))?;
            }
        }
        Ok(())
    }
}

impl Default for LoroReplica {
    fn default() -> Self {
        Self::new()
    }
}

impl TextReplica for LoroReplica {
    fn len_chars(&self) -> usize {
        self.text.len_unicode()
    }

    fn insert(
        &mut self,
        offset: usize,
        text: &str,
        attributes: &Attributes,
    ) -> Result<(), SyncError> {
        self.check_range(&(offset..offset))?;
        self.text.insert(offset, text).map_err(CrdtError::from)?;

        // Inside a run, the surrounding marks span the new text too.
        let range = offset..offset + text.chars().count();
        let mut styled: Attributes = self
            .keys_over(&range)
            .into_iter()
            .map(|key| (key, AttributeValue::Null))
            .collect();
        styled.extend(
            attributes
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        self.apply_marks(range, &styled)?;
        Ok(())
    }

    fn delete(&mut self, range: Range<usize>) -> Result<(), SyncError> {
        self.check_range(&range)?;
        if range.is_empty() {
            return Ok(());
        }
        self.text
            .delete(range.start, range.len())
            .map_err(CrdtError::from)?;
        Ok(())
    }

    fn format(&mut self, range: Range<usize>, attributes: &Attributes) -> Result<(), SyncError> {
        self.check_range(&range)?;
        self.apply_marks(range, attributes)?;
        Ok(())
    }

    fn runs(&self) -> Vec<TextRun> {
        self.text
            .to_delta()
            .into_iter()
            .filter_map(|item| match item {
                TextDelta::Insert { insert, attributes } => {
                    let attributes = attributes
                        .into_iter()
                        .flatten()
                        .filter_map(|(key, value)| Some((SmolStr::new(key), from_loro(value)?)))
                        .collect();
                    Some(TextRun::new(insert, attributes))
                }
                _ => None,
            })
            .collect()
    }

    fn commit(&mut self) {
        self.doc.commit();
    }
}

impl MergeableReplica for LoroReplica {
    type Version = VersionVector;

    fn version(&self) -> VersionVector {
        self.doc.oplog_vv()
    }

    fn export_snapshot(&self) -> Result<Vec<u8>, SyncError> {
        let snapshot = self
            .doc
            .export(ExportMode::Snapshot)
            .map_err(CrdtError::from)?;
        Ok(snapshot)
    }

    fn export_updates_since(&self, version: &VersionVector) -> Result<Option<Vec<u8>>, SyncError> {
        if *version == self.doc.oplog_vv() {
            return Ok(None);
        }

        let updates = self
            .doc
            .export(ExportMode::Updates {
                from: Cow::Owned(version.clone()),
            })
            .map_err(CrdtError::from)?;

        if updates.is_empty() {
            return Ok(None);
        }
        Ok(Some(updates))
    }

    fn import(&mut self, update: &[u8]) -> Result<(), SyncError> {
        self.doc
            .import(update)
            .map_err(|e| CrdtError::Import(e.to_string()))?;
        Ok(())
    }
}

fn to_loro(value: &AttributeValue) -> LoroValue {
    match value {
        AttributeValue::Null => LoroValue::Null,
        AttributeValue::Bool(b) => LoroValue::from(*b),
        AttributeValue::Int(i) => LoroValue::from(*i),
        AttributeValue::Float(f) => LoroValue::from(*f),
        AttributeValue::String(s) => LoroValue::from(s.as_str()),
    }
}

fn from_loro(value: LoroValue) -> Option<AttributeValue> {
    match value {
        LoroValue::Null => None,
        LoroValue::Bool(b) => Some(AttributeValue::Bool(b)),
        LoroValue::I64(i) => Some(AttributeValue::Int(i)),
        LoroValue::Double(f) => Some(AttributeValue::Float(f)),
        LoroValue::String(s) => Some(AttributeValue::String(SmolStr::new(s.as_str()))),
        other => {
            trace!(?other, "ignoring non-scalar style value");
            None
        }
    }
}
