#![forbid(unsafe_code)]

//! Errors raised by tree models.
//!
//! Addressing and edit validation (`InvalidLocation`, `UnknownNode`,
//! `ElementNotFound`, `InvalidSplice`, `InvalidEditIndex`, `NotDetached`,
//! `CyclicAttach`, `RootNotAllowed`, `StaleAncestor`) runs before the model is
//! mutated: an operation rejected with one of these has not changed the tree,
//! the sink or the event queue. Handles of removed in-place nodes count as
//! unknown. `InvariantViolation` only comes from the read-only checks.

use std::fmt;

use crate::node::NodeId;

/// Structural invariant that [`check_invariants`](crate::TreeModel::check_invariants) found broken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvariantKind {
    /// `depth != parent.depth + 1`.
    Depth,
    /// A child does not point back at its parent.
    ParentLink,
    /// `visible` disagrees with the parent's visibility, collapse or filter state.
    Visibility,
    /// `visible_count` disagrees with the node's own rows.
    VisibleCount,
    /// A node is linked from the tree but missing from the arena.
    Dangling,
    /// The payload table of a keyed tree has no entry for a node, or an entry
    /// for a node that is gone.
    KeyTable,
}

impl fmt::Display for InvariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Depth => "depth",
            Self::ParentLink => "parent link",
            Self::Visibility => "visibility",
            Self::VisibleCount => "visible count",
            Self::Dangling => "dangling child",
            Self::KeyTable => "key table",
        };
        f.write_str(name)
    }
}

/// Errors from tree model operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// A location does not resolve to a node.
    InvalidLocation {
        location: Vec<usize>,
    },
    /// A handle does not refer to a live node.
    UnknownNode {
        id: NodeId,
    },
    /// A payload is not present in the data-key table.
    ElementNotFound {
        element: String,
    },
    /// A splice range falls outside the parent's children.
    InvalidSplice {
        location: Vec<usize>,
        start: usize,
        delete_count: usize,
        len: usize,
    },
    /// An in-place edit index falls outside the node's children.
    InvalidEditIndex {
        node: NodeId,
        index: usize,
        len: usize,
    },
    /// `attach` was given a node that is still linked into the tree.
    NotDetached {
        id: NodeId,
    },
    /// Attaching `node` under `parent` would make it its own ancestor.
    CyclicAttach {
        node: NodeId,
        parent: NodeId,
    },
    /// The root cannot be used where a child is required.
    RootNotAllowed,
    /// A refresh target sits below another stale node; refresh the ancestor.
    StaleAncestor {
        node: NodeId,
        ancestor: NodeId,
    },
    /// A structural invariant does not hold.
    InvariantViolation {
        node: NodeId,
        kind: InvariantKind,
    },
}

impl fmt::Display for TreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidLocation { location } => {
                write!(f, "invalid tree location {location:?}")
            }
            Self::UnknownNode { id } => write!(f, "node {id} is not in the tree"),
            Self::ElementNotFound { element } => {
                write!(f, "tree element not found: {element}")
            }
            Self::InvalidSplice {
                location,
                start,
                delete_count,
                len,
            } => write!(
                f,
                "invalid splice at {location:?}: start {start} + delete {delete_count} exceeds {len} children"
            ),
            Self::InvalidEditIndex { node, index, len } => write!(
                f,
                "edit index {index} out of bounds for node {node} with {len} children"
            ),
            Self::NotDetached { id } => {
                write!(f, "node {id} is still attached and cannot be re-attached")
            }
            Self::CyclicAttach { node, parent } => write!(
                f,
                "cannot attach node {node} under {parent}: it is an ancestor of {parent}"
            ),
            Self::RootNotAllowed => f.write_str("the root node cannot be used here"),
            Self::StaleAncestor { node, ancestor } => write!(
                f,
                "cannot refresh node {node}: ancestor {ancestor} is stale"
            ),
            Self::InvariantViolation { node, kind } => {
                write!(f, "{kind} invariant violated at node {node}")
            }
        }
    }
}

impl std::error::Error for TreeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let err = TreeError::InvalidSplice {
            location: vec![0, 2],
            start: 2,
            delete_count: 3,
            len: 4,
        };
        assert_eq!(
            err.to_string(),
            "invalid splice at [0, 2]: start 2 + delete 3 exceeds 4 children"
        );
        let err = TreeError::InvariantViolation {
            node: NodeId::ROOT,
            kind: InvariantKind::VisibleCount,
        };
        assert_eq!(err.to_string(), "visible count invariant violated at node #1");
    }
}
