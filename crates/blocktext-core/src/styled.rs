//! Run-based styled text storage.
//!
//! `StyledText` keeps content as a list of runs that each carry one
//! attribute map. It backs both the in-memory replica and the editable tree.
//! All offsets are in Unicode scalar values (chars), not bytes.

use std::ops::Range;

use crate::delta::{Attributes, Delta, DeltaOp};
use crate::error::SyncError;

/// A run of text sharing one set of attributes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub attributes: Attributes,
}

impl TextRun {
    pub fn new(text: impl Into<String>, attributes: Attributes) -> Self {
        Self {
            text: text.into(),
            attributes,
        }
    }

    pub fn len_chars(&self) -> usize {
        self.text.chars().count()
    }
}

/// Styled text stored as normalized runs.
///
/// Invariant: no run is empty and no two neighbouring runs carry equal
/// attributes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StyledText {
    runs: Vec<TextRun>,
}

impl StyledText {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a delta's inserts. Retain markers carry no content and
    /// are skipped.
    pub fn from_delta(delta: &Delta) -> Self {
        let mut styled = Self {
            runs: delta
                .ops()
                .iter()
                .filter_map(|op| match op {
                    DeltaOp::Insert { text, attributes } => Some(TextRun {
                        text: text.clone(),
                        attributes: strip_nulls(attributes),
                    }),
                    DeltaOp::Retain { .. } => None,
                })
                .collect(),
        };
        styled.normalize();
        styled
    }

    pub fn runs(&self) -> &[TextRun] {
        &self.runs
    }

    pub fn len_chars(&self) -> usize {
        self.runs.iter().map(TextRun::len_chars).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn to_plain_string(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }

    pub fn to_delta(&self) -> Delta {
        self.runs
            .iter()
            .map(|r| DeltaOp::insert_with(r.text.clone(), r.attributes.clone()))
            .collect()
    }

    pub fn clear(&mut self) {
        self.runs.clear();
    }

    /// Insert `text` at `offset` with exactly `attributes` (no inheritance
    /// from neighbours).
    pub fn insert(
        &mut self,
        offset: usize,
        text: &str,
        attributes: &Attributes,
    ) -> Result<(), SyncError> {
        self.check_offset(offset)?;
        if text.is_empty() {
            return Ok(());
        }
        let idx = self.split_at(offset);
        self.runs
            .insert(idx, TextRun::new(text, strip_nulls(attributes)));
        self.normalize();
        Ok(())
    }

    pub fn delete(&mut self, range: Range<usize>) -> Result<(), SyncError> {
        self.check_range(&range)?;
        if range.is_empty() {
            return Ok(());
        }
        let start = self.split_at(range.start);
        let end = self.split_at(range.end);
        self.runs.drain(start..end);
        self.normalize();
        Ok(())
    }

    /// Apply `attributes` over `range`. A null value removes that key.
    pub fn format(&mut self, range: Range<usize>, attributes: &Attributes) -> Result<(), SyncError> {
        self.check_range(&range)?;
        if range.is_empty() || attributes.is_empty() {
            return Ok(());
        }
        let start = self.split_at(range.start);
        let end = self.split_at(range.end);
        for run in &mut self.runs[start..end] {
            for (key, value) in attributes {
                if value.is_null() {
                    run.attributes.remove(key);
                } else {
                    run.attributes.insert(key.clone(), value.clone());
                }
            }
        }
        self.normalize();
        Ok(())
    }

    fn check_offset(&self, offset: usize) -> Result<(), SyncError> {
        let len = self.len_chars();
        if offset > len {
            return Err(SyncError::EditOutOfBounds { offset, len });
        }
        Ok(())
    }

    fn check_range(&self, range: &Range<usize>) -> Result<(), SyncError> {
        let len = self.len_chars();
        if range.start > range.end || range.end > len {
            return Err(SyncError::EditOutOfBounds {
                offset: range.end.max(range.start),
                len,
            });
        }
        Ok(())
    }

    /// Split so that a run boundary falls at `offset`; returns the index of
    /// the first run starting at or after it. `offset` must be in bounds.
    fn split_at(&mut self, offset: usize) -> usize {
        let mut pos = 0;
        for i in 0..self.runs.len() {
            if offset == pos {
                return i;
            }
            let len = self.runs[i].len_chars();
            if offset < pos + len {
                let byte = char_to_byte(&self.runs[i].text, offset - pos);
                let tail = self.runs[i].text.split_off(byte);
                let attributes = self.runs[i].attributes.clone();
                self.runs.insert(i + 1, TextRun::new(tail, attributes));
                return i + 1;
            }
            pos += len;
        }
        self.runs.len()
    }

    fn normalize(&mut self) {
        let mut merged: Vec<TextRun> = Vec::with_capacity(self.runs.len());
        for run in self.runs.drain(..) {
            if run.text.is_empty() {
                continue;
            }
            match merged.last_mut() {
                Some(prev) if prev.attributes == run.attributes => prev.text.push_str(&run.text),
                _ => merged.push(run),
            }
        }
        self.runs = merged;
    }
}

fn strip_nulls(attributes: &Attributes) -> Attributes {
    attributes
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn char_to_byte(text: &str, char_offset: usize) -> usize {
    text.char_indices()
        .nth(char_offset)
        .map(|(byte, _)| byte)
        .unwrap_or(text.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::{AttributeValue, attributes};

    fn bold() -> Attributes {
        attributes([("bold", true)])
    }

    #[test]
    fn test_insert_and_delete() {
        let mut text = StyledText::new();
        text.insert(0, "Hello", &Attributes::new()).unwrap();
        text.insert(5, " World", &Attributes::new()).unwrap();
        assert_eq!(text.to_plain_string(), "Hello World");
        assert_eq!(text.runs().len(), 1);

        text.delete(5..6).unwrap();
        assert_eq!(text.to_plain_string(), "HelloWorld");
    }

    #[test]
    fn test_insert_splits_styled_run() {
        let mut text = StyledText::new();
        text.insert(0, "abcd", &bold()).unwrap();
        text.insert(2, "X", &Attributes::new()).unwrap();

        assert_eq!(
            text.runs(),
            &[
                TextRun::new("ab", bold()),
                TextRun::new("X", Attributes::new()),
                TextRun::new("cd", bold()),
            ]
        );
    }

    #[test]
    fn test_format_and_unformat_merge_back() {
        let mut text = StyledText::new();
        text.insert(0, "hello world", &Attributes::new()).unwrap();

        text.format(0..5, &bold()).unwrap();
        assert_eq!(text.runs().len(), 2);

        text.format(0..5, &attributes([("bold", AttributeValue::Null)]))
            .unwrap();
        assert_eq!(text.runs(), &[TextRun::new("hello world", Attributes::new())]);
    }

    #[test]
    fn test_out_of_bounds() {
        let mut text = StyledText::new();
        text.insert(0, "abc", &Attributes::new()).unwrap();

        assert_eq!(
            text.insert(4, "x", &Attributes::new()),
            Err(SyncError::EditOutOfBounds { offset: 4, len: 3 })
        );
        assert!(text.delete(2..5).is_err());
        assert_eq!(text.to_plain_string(), "abc");
    }

    #[test]
    fn test_multibyte_offsets() {
        let mut text = StyledText::new();
        text.insert(0, "héllo 🌍", &Attributes::new()).unwrap();
        assert_eq!(text.len_chars(), 7);

        text.format(6..7, &bold()).unwrap();
        text.delete(1..2).unwrap();
        assert_eq!(text.to_plain_string(), "hllo 🌍");
        assert_eq!(text.runs()[1], TextRun::new("🌍", bold()));
    }

    #[test]
    fn test_from_delta_normalizes() {
        let delta = Delta::new().insert("a").insert("").insert("b");
        let text = StyledText::from_delta(&delta);
        assert_eq!(text.runs(), &[TextRun::new("ab", Attributes::new())]);
        assert_eq!(text.to_delta(), Delta::new().insert("ab"));
    }
}
