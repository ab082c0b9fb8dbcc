#![forbid(unsafe_code)]

//! The ordered sink mirroring the tree's visible rows.
//!
//! The model never reads the sink back: every change is expressed as a
//! single `splice(start, delete_count, inserted)` that the sink must apply
//! verbatim.

use crate::node::NodeId;

/// An externally owned, ordered sequence of visible rows.
pub trait ListSink {
    /// Replace `delete_count` rows starting at `start` with `inserted`.
    fn splice(&mut self, start: usize, delete_count: usize, inserted: &[NodeId]);
}

impl ListSink for Vec<NodeId> {
    fn splice(&mut self, start: usize, delete_count: usize, inserted: &[NodeId]) {
        let _ = Vec::splice(
            self,
            start..start + delete_count,
            inserted.iter().copied(),
        );
    }
}

impl<S: ListSink + ?Sized> ListSink for &mut S {
    fn splice(&mut self, start: usize, delete_count: usize, inserted: &[NodeId]) {
        (**self).splice(start, delete_count, inserted);
    }
}

/// A sink that discards every operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ListSink for NullSink {
    fn splice(&mut self, _start: usize, _delete_count: usize, _inserted: &[NodeId]) {}
}

/// A single recorded sink operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpliceRecord {
    /// First affected row.
    pub start: usize,
    /// Rows removed.
    pub delete_count: usize,
    /// Rows inserted, in order.
    pub inserted: Vec<NodeId>,
}

/// A `Vec` sink that also keeps a log of the operations it applied.
///
/// Useful for renderers that diff rows and for asserting on the exact
/// operations the model emits.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    rows: Vec<NodeId>,
    log: Vec<SpliceRecord>,
}

impl RecordingSink {
    /// Create an empty recording sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current rows.
    #[must_use]
    pub fn rows(&self) -> &[NodeId] {
        &self.rows
    }

    /// Operations applied since the last [`take_log`](Self::take_log).
    #[must_use]
    pub fn log(&self) -> &[SpliceRecord] {
        &self.log
    }

    /// Take and clear the operation log.
    pub fn take_log(&mut self) -> Vec<SpliceRecord> {
        std::mem::take(&mut self.log)
    }
}

impl ListSink for RecordingSink {
    fn splice(&mut self, start: usize, delete_count: usize, inserted: &[NodeId]) {
        ListSink::splice(&mut self.rows, start, delete_count, inserted);
        self.log.push(SpliceRecord {
            start,
            delete_count,
            inserted: inserted.to_vec(),
        });
    }
}
