//! Per-document queues of execution units.
//!
//! A document queue is an ordered FIFO of [`ExecUnit`]s belonging to one
//! document, mutated in place by live edits while execution is underway.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::unit::{ExecUnit, UnitKey};

/// Which execution cache context a document's chunks run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitMode {
    /// The document is saved; run against the persisted cache context.
    Saved,
    /// The document has unsaved changes; run against the live context.
    Unsaved,
}

/// Mutation applied to a document queue by a live edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueOp {
    /// Insert before the anchor unit, or at the end if the anchor is absent.
    Insert,
    /// Overwrite the unit with matching identity in place.
    Replace,
    /// Remove the unit with matching identity.
    Delete,
}

/// An ordered queue of execution units for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocQueue {
    doc_id: String,
    units: VecDeque<ExecUnit>,
    commit_mode: CommitMode,
    /// Output width in pixels, for rendered chunk output.
    #[serde(default)]
    pixel_width: u32,
    /// Output width in characters, for console chunk output.
    #[serde(default)]
    char_width: u32,
}

impl DocQueue {
    pub fn new(
        doc_id: impl Into<String>,
        commit_mode: CommitMode,
        pixel_width: u32,
        char_width: u32,
    ) -> Self {
        Self {
            doc_id: doc_id.into(),
            units: VecDeque::new(),
            commit_mode,
            pixel_width,
            char_width,
        }
    }

    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }

    pub fn commit_mode(&self) -> CommitMode {
        self.commit_mode
    }

    pub fn pixel_width(&self) -> u32 {
        self.pixel_width
    }

    pub fn char_width(&self) -> u32 {
        self.char_width
    }

    /// A document queue is complete iff it holds no units.
    pub fn complete(&self) -> bool {
        self.units.is_empty()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// The next unit to execute, if any.
    pub fn first_unit(&self) -> Option<&ExecUnit> {
        self.units.front()
    }

    /// Look up a unit by identity.
    pub fn unit(&self, key: &UnitKey) -> Option<&ExecUnit> {
        self.units
            .iter()
            .find(|unit| unit.doc_id == key.doc_id && unit.chunk_id == key.chunk_id)
    }

    /// Look up a unit by identity for mutation.
    pub fn unit_mut(&mut self, key: &UnitKey) -> Option<&mut ExecUnit> {
        self.units
            .iter_mut()
            .find(|unit| unit.doc_id == key.doc_id && unit.chunk_id == key.chunk_id)
    }

    /// Append a unit at the end of the queue.
    pub fn push_unit(&mut self, unit: ExecUnit) {
        self.units.push_back(unit);
    }

    /// Remove a unit by identity, returning it if present.
    pub fn remove(&mut self, key: &UnitKey) -> Option<ExecUnit> {
        let index = self
            .units
            .iter()
            .position(|unit| unit.doc_id == key.doc_id && unit.chunk_id == key.chunk_id)?;
        self.units.remove(index)
    }

    /// Apply a live-edit mutation.
    ///
    /// `before` identifies the insert anchor by chunk id. All operations are
    /// idempotent; a mutation whose target is absent is a no-op.
    pub fn update(&mut self, unit: ExecUnit, op: QueueOp, before: Option<&str>) {
        match op {
            QueueOp::Insert => {
                let at = before
                    .and_then(|anchor| self.units.iter().position(|u| u.chunk_id == anchor))
                    .unwrap_or(self.units.len());
                self.units.insert(at, unit);
            }
            QueueOp::Replace => {
                let key = unit.key();
                if let Some(existing) = self.unit_mut(&key) {
                    *existing = unit;
                }
            }
            QueueOp::Delete => {
                self.remove(&unit.key());
            }
        }
    }

    /// A serializable view of the queue's contents.
    pub fn snapshot(&self) -> DocQueueSnapshot {
        DocQueueSnapshot {
            doc_id: self.doc_id.clone(),
            commit_mode: self.commit_mode,
            pixel_width: self.pixel_width,
            char_width: self.char_width,
            units: self.units.iter().cloned().collect(),
        }
    }
}

/// Structured snapshot of a document queue, for host queries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocQueueSnapshot {
    pub doc_id: String,
    pub commit_mode: CommitMode,
    pub pixel_width: u32,
    pub char_width: u32,
    pub units: Vec<ExecUnit>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::unit::{ExecMode, ExecRange, ExecScope};
    use serde_json::Value;

    fn unit(chunk_id: &str) -> ExecUnit {
        ExecUnit::new(
            "d1",
            chunk_id,
            ExecMode::Batch,
            ExecScope::Chunk,
            "x\n",
            vec![ExecRange::new(0, 2)],
            Value::Null,
        )
    }

    fn queue_with(chunks: &[&str]) -> DocQueue {
        let mut q = DocQueue::new("d1", CommitMode::Unsaved, 640, 80);
        for chunk in chunks {
            q.push_unit(unit(chunk));
        }
        q
    }

    fn chunk_ids(q: &DocQueue) -> Vec<String> {
        q.units.iter().map(|u| u.chunk_id.clone()).collect()
    }

    #[test]
    fn test_insert_before_anchor() {
        let mut q = queue_with(&["a", "c"]);
        q.update(unit("b"), QueueOp::Insert, Some("c"));
        assert_eq!(chunk_ids(&q), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_insert_with_absent_anchor_appends() {
        let mut q = queue_with(&["a"]);
        q.update(unit("b"), QueueOp::Insert, Some("nope"));
        q.update(unit("c"), QueueOp::Insert, None);
        assert_eq!(chunk_ids(&q), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_replace_in_place() {
        let mut q = queue_with(&["a", "b"]);
        let mut replacement = unit("b");
        replacement.code = "y\n".to_string();
        q.update(replacement, QueueOp::Replace, None);
        assert_eq!(chunk_ids(&q), vec!["a", "b"]);
        assert_eq!(q.units[1].code, "y\n");
    }

    #[test]
    fn test_replace_absent_is_noop() {
        let mut q = queue_with(&["a"]);
        q.update(unit("b"), QueueOp::Replace, None);
        assert_eq!(chunk_ids(&q), vec!["a"]);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let mut q = queue_with(&["a", "b"]);
        q.update(unit("a"), QueueOp::Delete, None);
        assert_eq!(chunk_ids(&q), vec!["b"]);
        q.update(unit("a"), QueueOp::Delete, None);
        assert_eq!(chunk_ids(&q), vec!["b"]);
    }

    #[test]
    fn test_complete_when_empty() {
        let mut q = queue_with(&["a"]);
        assert!(!q.complete());
        q.update(unit("a"), QueueOp::Delete, None);
        assert!(q.complete());
    }

    #[test]
    fn test_snapshot_reflects_contents() {
        let q = queue_with(&["a", "b"]);
        let snap = q.snapshot();
        assert_eq!(snap.doc_id, "d1");
        assert_eq!(snap.units.len(), 2);
        assert_eq!(snap.commit_mode, CommitMode::Unsaved);
    }
}
