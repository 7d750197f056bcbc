//! Delta codec: converting between deltas and replica contents.
//!
//! Content deltas are full snapshots, so they are always applied to an
//! emptied replica by appending runs in order. Validation happens entirely
//! up front so a malformed delta never reaches the replica.

use crate::delta::{Delta, DeltaOp};
use crate::error::SyncError;
use crate::replica::TextReplica;
use crate::styled::TextRun;

/// Validated runs ready to be appended to an empty replica.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReplicatedInsertSequence {
    runs: Vec<TextRun>,
}

impl ReplicatedInsertSequence {
    pub fn runs(&self) -> &[TextRun] {
        &self.runs
    }

    pub fn len_chars(&self) -> usize {
        self.runs.iter().map(TextRun::len_chars).sum()
    }

    /// The content this sequence produces, as a canonical delta.
    pub fn to_delta(&self) -> Delta {
        runs_to_delta(&self.runs)
    }

    /// Append every run to `replica`, which is expected to be empty.
    pub fn apply_to<R: TextReplica + ?Sized>(&self, replica: &mut R) -> Result<(), SyncError> {
        let mut offset = replica.len_chars();
        for run in &self.runs {
            replica.insert(offset, &run.text, &run.attributes)?;
            offset += run.len_chars();
        }
        Ok(())
    }
}

/// Validate `delta` and turn it into an insert sequence.
///
/// Rules:
/// - an empty insert is only accepted as the first operation (the seed of
///   an empty document), and is dropped;
/// - a retain has no content to format in a snapshot: zero-length retains
///   are dropped, anything longer is rejected;
/// - null attributes are stripped.
pub fn to_replicated_insert_sequence(delta: &Delta) -> Result<ReplicatedInsertSequence, SyncError> {
    let mut runs = Vec::with_capacity(delta.ops().len());
    for (index, op) in delta.ops().iter().enumerate() {
        match op {
            DeltaOp::Insert { text, .. } if text.is_empty() => {
                if index != 0 {
                    return Err(SyncError::invalid_op(index, "empty insert"));
                }
            }
            DeltaOp::Insert { text, attributes } => {
                runs.push(TextRun::new(
                    text.clone(),
                    attributes
                        .iter()
                        .filter(|(_, v)| !v.is_null())
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect(),
                ));
            }
            DeltaOp::Retain { len: 0, .. } => {}
            DeltaOp::Retain { .. } => {
                return Err(SyncError::invalid_op(
                    index,
                    "retain past end of content",
                ));
            }
        }
    }
    Ok(ReplicatedInsertSequence { runs })
}

/// Extract the replica's content as a canonical delta.
pub fn to_delta<R: TextReplica + ?Sized>(replica: &R) -> Delta {
    runs_to_delta(&replica.runs())
}

fn runs_to_delta(runs: &[TextRun]) -> Delta {
    runs.iter()
        .map(|r| DeltaOp::insert_with(r.text.clone(), r.attributes.clone()))
        .collect::<Delta>()
        .canonical()
}
