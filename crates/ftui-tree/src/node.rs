#![forbid(unsafe_code)]

//! Node records and handles.
//!
//! A [`TreeNode`] is a passive record: it owns a payload and the metadata the
//! model keeps in sync (depth, visibility, collapse state, visible subtree
//! count). Nodes live in the model's arena and refer to each other by
//! [`NodeId`]; the parent link is an id, never an owning pointer.

use std::fmt;

/// Opaque handle of a node in a tree model.
///
/// `0` is reserved so ids are always non-zero. Ids are allocated
/// monotonically and never reused within a model, so a handle to a deleted
/// node stays detectably dead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u64);

impl NodeId {
    /// Id of the synthetic root node.
    pub const ROOT: Self = Self(1);

    /// Get the raw numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    pub(crate) const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

bitflags::bitflags! {
    /// Per-node state bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct NodeFlags: u16 {
        /// Node occupies a row in the flat projection.
        const VISIBLE            = 0b0000_0000_0000_0001;
        /// Node can be collapsed.
        const COLLAPSIBLE        = 0b0000_0000_0000_0010;
        /// Raw collapsed bit. Ignored while not `COLLAPSIBLE`.
        const COLLAPSED          = 0b0000_0000_0000_0100;
        /// `COLLAPSIBLE` was set explicitly and survives has-children changes.
        const COLLAPSIBLE_PINNED = 0b0000_0000_0000_1000;
        /// Raw predicate verdict for this node alone.
        const FILTER_VISIBLE     = 0b0000_0000_0001_0000;
        /// Derived verdict: visible by predicate and matched or leading to a match.
        const FILTER_PASS        = 0b0000_0000_0010_0000;
        /// Children were edited in place and metadata awaits a refresh.
        const STALE              = 0b0000_0000_0100_0000;
        /// Removed from its parent's children, pending deletion on refresh.
        const DETACHED           = 0b0000_0000_1000_0000;
        /// Had children when first marked `STALE`.
        const HAD_CHILDREN       = 0b0000_0001_0000_0000;
    }
}

/// A node in the tree model.
#[derive(Debug, Clone)]
pub struct TreeNode<T, F = ()> {
    pub(crate) id: NodeId,
    pub(crate) element: T,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) depth: usize,
    pub(crate) flags: NodeFlags,
    pub(crate) visible_count: usize,
    pub(crate) filter_tag: Option<F>,
    /// Children removed by in-place edits, deleted on the next refresh.
    pub(crate) to_delete: Vec<NodeId>,
}

impl<T, F> TreeNode<T, F> {
    pub(crate) fn new(id: NodeId, element: T, parent: Option<NodeId>, depth: usize) -> Self {
        Self {
            id,
            element,
            parent,
            children: Vec::new(),
            depth,
            flags: NodeFlags::FILTER_VISIBLE | NodeFlags::FILTER_PASS,
            visible_count: 0,
            filter_tag: None,
            to_delete: Vec::new(),
        }
    }

    /// Handle of this node.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The payload.
    #[must_use]
    pub fn element(&self) -> &T {
        &self.element
    }

    /// Parent handle; `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Ordered child handles.
    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Distance from the root (root is 0).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Raw state bits.
    #[must_use]
    pub fn flags(&self) -> NodeFlags {
        self.flags
    }

    /// Whether this node occupies a row in the flat projection.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.flags.contains(NodeFlags::VISIBLE)
    }

    /// Whether this node can be collapsed.
    #[must_use]
    pub fn is_collapsible(&self) -> bool {
        self.flags.contains(NodeFlags::COLLAPSIBLE)
    }

    /// Effective collapse state: collapsed and collapsible.
    #[must_use]
    pub fn is_collapsed(&self) -> bool {
        self.flags
            .contains(NodeFlags::COLLAPSIBLE | NodeFlags::COLLAPSED)
    }

    /// Number of rows this subtree occupies in the flat projection.
    #[must_use]
    pub fn visible_count(&self) -> usize {
        self.visible_count
    }

    /// Tag attached by the last filter evaluation, if the node matched.
    #[must_use]
    pub fn filter_tag(&self) -> Option<&F> {
        self.filter_tag.as_ref()
    }

    /// Whether the node awaits a refresh after in-place edits.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.flags.contains(NodeFlags::STALE)
    }

    /// Visible and expanded: its children may occupy rows.
    pub(crate) fn reveals_children(&self) -> bool {
        self.is_visible() && !self.is_collapsed()
    }

    pub(crate) fn passes_filter(&self) -> bool {
        self.flags.contains(NodeFlags::FILTER_PASS)
    }

    pub(crate) fn set_flag(&mut self, flag: NodeFlags, value: bool) {
        self.flags.set(flag, value);
    }
}
