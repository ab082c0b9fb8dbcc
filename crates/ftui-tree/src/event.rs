#![forbid(unsafe_code)]

//! Model events with pausable delivery.
//!
//! Events are collected into a queue during a mutation and drained by the
//! caller, never dispatched through callbacks, so observers cannot re-enter
//! the model mid-update.
//!
//! # Invariants
//!
//! 1. While paused, emitted events are held back and invisible to
//!    [`EventQueue::drain`].
//! 2. Resuming the outermost pause releases held events in emission order.
//! 3. Pauses nest; only the matching outermost `resume` flushes.

use crate::node::NodeId;

/// Something observable changed in a tree model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeEvent {
    /// Children were replaced under one parent, or a stale subtree was refreshed.
    Splice {
        /// Top-level nodes built (or refreshed) by the edit.
        inserted: Vec<NodeId>,
        /// Top-level nodes removed by the edit. These handles are dead.
        deleted: Vec<NodeId>,
    },
    /// A node's collapsed or collapsible flag changed.
    CollapseStateChanged {
        /// The node whose flag changed.
        node: NodeId,
        /// Whether the change came from a recursive walk below the target.
        deep: bool,
    },
    /// The projection was rebuilt after filtering.
    Refiltered {
        /// Rows in the projection afterwards.
        rows: usize,
    },
}

/// A FIFO of events with nested pause/resume.
#[derive(Debug, Clone)]
pub struct EventQueue<E> {
    ready: Vec<E>,
    held: Vec<E>,
    pause_depth: usize,
}

impl<E> Default for EventQueue<E> {
    fn default() -> Self {
        Self {
            ready: Vec::new(),
            held: Vec::new(),
            pause_depth: 0,
        }
    }
}

impl<E> EventQueue<E> {
    /// Create an empty, unpaused queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit an event; held back while paused.
    pub fn emit(&mut self, event: E) {
        if self.pause_depth > 0 {
            self.held.push(event);
        } else {
            self.ready.push(event);
        }
    }

    /// Hold back delivery until the matching [`resume`](Self::resume).
    pub fn pause(&mut self) {
        self.pause_depth += 1;
    }

    /// End one pause level, flushing held events when the last one ends.
    pub fn resume(&mut self) {
        debug_assert!(self.pause_depth > 0, "resume without pause");
        self.pause_depth = self.pause_depth.saturating_sub(1);
        if self.pause_depth == 0 {
            self.ready.append(&mut self.held);
        }
    }

    /// Whether delivery is currently held back.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.pause_depth > 0
    }

    /// Number of events ready to drain.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.ready.len()
    }

    /// Take all deliverable events in emission order.
    pub fn drain(&mut self) -> Vec<E> {
        std::mem::take(&mut self.ready)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpaused_events_are_ready() {
        let mut q = EventQueue::new();
        q.emit(1);
        q.emit(2);
        assert_eq!(q.pending(), 2);
        assert_eq!(q.drain(), vec![1, 2]);
        assert!(q.drain().is_empty());
    }

    #[test]
    fn paused_events_flush_in_order_on_resume() {
        let mut q = EventQueue::new();
        q.emit(0);
        q.pause();
        q.emit(1);
        q.emit(2);
        assert_eq!(q.drain(), vec![0]);
        q.resume();
        assert_eq!(q.drain(), vec![1, 2]);
    }

    #[test]
    fn nested_pause_flushes_on_outermost_resume() {
        let mut q = EventQueue::new();
        q.pause();
        q.pause();
        q.emit("a");
        q.resume();
        assert!(q.is_paused());
        assert_eq!(q.pending(), 0);
        q.emit("b");
        q.resume();
        assert!(!q.is_paused());
        assert_eq!(q.drain(), vec!["a", "b"]);
    }
}
