#![forbid(unsafe_code)]

//! The shared tree model: node arena, queries, and the collapse/visibility
//! algorithm.
//!
//! [`TreeModel`] is parameterized by an edit mode. [`Index`] models are edited
//! by splicing in subtree descriptions ([`crate::index`]); [`Flex`] models are
//! edited in place and refreshed ([`crate::flex`]). Lookup, collapse,
//! expand-to, filtering and re-rendering live here and are shared.
//!
//! # Invariants
//!
//! After every public operation returns:
//!
//! 1. `depth(root) == 0` and `depth(child) == depth(parent) + 1`.
//! 2. `visible(child) == reveals_children(parent) && passes_filter(child)`.
//! 3. `visible_count` is 0 for hidden nodes, 1 for visible collapsed nodes,
//!    and `1 + Σ children` for visible expanded nodes.
//! 4. The sink holds exactly the visible non-root nodes in pre-order.
//!
//! (Subtrees awaiting a [`Flex`] refresh are exempt until refreshed.)

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use crate::error::{InvariantKind, TreeError};
use crate::event::{EventQueue, TreeEvent};
use crate::node::{NodeFlags, NodeId, TreeNode};
use crate::options::{TreeFilter, TreeOptions};
use crate::sink::ListSink;

/// Edit mode: replace children from declarative descriptions.
#[derive(Debug)]
pub enum Index {}

/// Edit mode: mutate children in place, then refresh.
#[derive(Debug)]
pub enum Flex {}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Index {}
    impl Sealed for super::Flex {}
}

/// Marker trait for the structural edit strategy of a [`TreeModel`].
pub trait EditMode: sealed::Sealed {}
impl EditMode for Index {}
impl EditMode for Flex {}

/// Model edited through [`splice`](TreeModel::splice).
pub type IndexTreeModel<T, F = (), S = Vec<NodeId>> = TreeModel<T, F, S, Index>;

/// Model edited in place through [`edit`](TreeModel::edit) and [`refresh`](TreeModel::refresh).
pub type FlexTreeModel<T, F = (), S = Vec<NodeId>> = TreeModel<T, F, S, Flex>;

/// Optional per-call hooks fired for created and deleted nodes.
///
/// Hooks receive the node after its metadata is final (creation) or just
/// before it is dropped (deletion). They cannot reach the model.
pub struct SpliceHooks<'a, T, F = ()> {
    /// Called once per node built, or re-bound by a refresh.
    pub on_create: Option<&'a mut dyn FnMut(&TreeNode<T, F>)>,
    /// Called once per node removed, including removed descendants.
    pub on_delete: Option<&'a mut dyn FnMut(&TreeNode<T, F>)>,
}

impl<T, F> Default for SpliceHooks<'_, T, F> {
    fn default() -> Self {
        Self {
            on_create: None,
            on_delete: None,
        }
    }
}

impl<T, F> fmt::Debug for SpliceHooks<'_, T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpliceHooks")
            .field("on_create", &self.on_create.is_some())
            .field("on_delete", &self.on_delete.is_some())
            .finish()
    }
}

impl<'a, T, F> SpliceHooks<'a, T, F> {
    /// No hooks.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Set the creation hook.
    #[must_use]
    pub fn with_on_create(mut self, hook: &'a mut dyn FnMut(&TreeNode<T, F>)) -> Self {
        self.on_create = Some(hook);
        self
    }

    /// Set the deletion hook.
    #[must_use]
    pub fn with_on_delete(mut self, hook: &'a mut dyn FnMut(&TreeNode<T, F>)) -> Self {
        self.on_delete = Some(hook);
        self
    }

    pub(crate) fn created(&mut self, node: &TreeNode<T, F>) {
        if let Some(hook) = self.on_create.as_mut() {
            hook(node);
        }
    }

    pub(crate) fn deleted(&mut self, node: &TreeNode<T, F>) {
        if let Some(hook) = self.on_delete.as_mut() {
            hook(node);
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum CollapseUpdate {
    Collapsed { collapsed: bool, recursive: bool },
    Collapsible { collapsible: bool, pin: bool },
}

/// A collapsible multiway tree mirrored into an ordered [`ListSink`].
///
/// The root is synthetic: always visible, never collapsible, and never part of
/// the projection.
pub struct TreeModel<T, F = (), S = Vec<NodeId>, M = Index> {
    pub(crate) nodes: HashMap<NodeId, TreeNode<T, F>>,
    pub(crate) next_id: NodeId,
    pub(crate) sink: S,
    pub(crate) events: EventQueue<TreeEvent>,
    pub(crate) options: TreeOptions,
    pub(crate) filter: Option<TreeFilter<T, F>>,
    /// Subtrees built by `create` that may still be unattached.
    pub(crate) unattached: Vec<NodeId>,
    _mode: PhantomData<M>,
}

impl<T, F, S, M> fmt::Debug for TreeModel<T, F, S, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeModel")
            .field("nodes", &self.nodes.len())
            .field("rows", &self.size())
            .field("options", &self.options)
            .field("filtered", &self.filter.is_some())
            .field("pending_events", &self.events.pending())
            .finish()
    }
}

impl<T, F, S: ListSink, M: EditMode> TreeModel<T, F, S, M> {
    /// Create a model holding only the root, mirrored into `sink`.
    ///
    /// The sink is expected to start empty.
    pub fn new(root: T, sink: S, options: TreeOptions) -> Self {
        let mut node = TreeNode::new(NodeId::ROOT, root, None, 0);
        node.set_flag(NodeFlags::VISIBLE, true);
        node.visible_count = 1;
        let mut nodes = HashMap::new();
        nodes.insert(NodeId::ROOT, node);
        Self {
            nodes,
            next_id: NodeId::ROOT.next(),
            sink,
            events: EventQueue::new(),
            options,
            filter: None,
            unattached: Vec::new(),
            _mode: PhantomData,
        }
    }
}

impl<T, F, S, M> TreeModel<T, F, S, M> {
    /// Handle of the root node.
    #[must_use]
    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    /// The root payload.
    #[must_use]
    pub fn root_element(&self) -> &T {
        &self.nodes[&NodeId::ROOT].element
    }

    /// The options this model was built with.
    #[must_use]
    pub fn options(&self) -> &TreeOptions {
        &self.options
    }

    /// The sink the projection is mirrored into.
    #[must_use]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Consume the model, returning its sink.
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Take all delivered events.
    pub fn drain_events(&mut self) -> Vec<TreeEvent> {
        self.events.drain()
    }

    /// Number of rows in the flat projection.
    #[must_use]
    pub fn size(&self) -> usize {
        self.nodes
            .get(&NodeId::ROOT)
            .map_or(0, |root| root.visible_count.saturating_sub(1))
    }

    /// Number of live nodes, excluding the root.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len().saturating_sub(1)
    }

    /// Look up a node by handle.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&TreeNode<T, F>> {
        self.nodes.get(&id)
    }

    /// Whether `location` resolves to a node.
    #[must_use]
    pub fn has_node(&self, location: &[usize]) -> bool {
        self.resolve(location).is_ok()
    }

    /// The node at `location`.
    pub fn node_at(&self, location: &[usize]) -> Result<&TreeNode<T, F>, TreeError> {
        let id = self.resolve(location)?;
        self.get(id)
    }

    /// Resolve a location to a node handle.
    pub fn resolve(&self, location: &[usize]) -> Result<NodeId, TreeError> {
        let mut id = NodeId::ROOT;
        for &index in location {
            id = *self
                .get(id)?
                .children
                .get(index)
                .ok_or_else(|| TreeError::InvalidLocation {
                    location: location.to_vec(),
                })?;
        }
        Ok(id)
    }

    /// Derive the current location of a node.
    pub fn location(&self, id: NodeId) -> Result<Vec<usize>, TreeError> {
        let node = self.get(id)?;
        if node.flags.contains(NodeFlags::DETACHED) {
            return Err(TreeError::UnknownNode { id });
        }
        let mut location = Vec::with_capacity(node.depth);
        let mut current = id;
        while let Some(parent) = self.get(current)?.parent {
            let index = self
                .get(parent)?
                .children
                .iter()
                .position(|&child| child == current)
                .ok_or(TreeError::UnknownNode { id: current })?;
            location.push(index);
            current = parent;
        }
        location.reverse();
        Ok(location)
    }

    /// Row of the node at `location` in the projection, or `None` if hidden.
    pub fn list_index(&self, location: &[usize]) -> Result<Option<usize>, TreeError> {
        let id = self.resolve(location)?;
        self.node_row(id)
    }

    /// Row of a node in the projection, or `None` if hidden.
    pub fn node_list_index(&self, id: NodeId) -> Result<Option<usize>, TreeError> {
        self.node_row(id)
    }

    /// Location of the parent of the node at `location`; `None` for top-level
    /// nodes, whose parent is the root.
    pub fn parent_location(&self, location: &[usize]) -> Result<Option<Vec<usize>>, TreeError> {
        if location.is_empty() {
            return Err(TreeError::RootNotAllowed);
        }
        self.resolve(location)?;
        if location.len() == 1 {
            return Ok(None);
        }
        Ok(Some(location[..location.len() - 1].to_vec()))
    }

    /// Payload of the first child of the node at `location`.
    pub fn first_element_child(&self, location: &[usize]) -> Result<Option<&T>, TreeError> {
        let node = self.node_at(location)?;
        match node.children.first() {
            Some(&child) => Ok(Some(&self.get(child)?.element)),
            None => Ok(None),
        }
    }

    /// Payload of the deepest node reached by following last children from
    /// `location`; `None` if it has no children.
    pub fn last_element_ancestor(&self, location: &[usize]) -> Result<Option<&T>, TreeError> {
        let mut node = self.node_at(location)?;
        if node.children.is_empty() {
            return Ok(None);
        }
        while let Some(&last) = node.children.last() {
            node = self.get(last)?;
        }
        Ok(Some(&node.element))
    }

    /// Effective collapse state of the node at `location`.
    pub fn is_collapsed(&self, location: &[usize]) -> Result<bool, TreeError> {
        Ok(self.node_at(location)?.is_collapsed())
    }

    /// Whether the node at `location` can be collapsed.
    pub fn is_collapsible(&self, location: &[usize]) -> Result<bool, TreeError> {
        Ok(self.node_at(location)?.is_collapsible())
    }

    /// Visible non-root nodes in pre-order, computed from the tree itself.
    ///
    /// This is what the sink must contain; it does not read the sink.
    #[must_use]
    pub fn visible_rows(&self) -> Vec<NodeId> {
        let mut rows = Vec::with_capacity(self.size());
        let mut stack = vec![NodeId::ROOT];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            if !node.is_visible() {
                continue;
            }
            if id != NodeId::ROOT {
                rows.push(id);
            }
            if node.reveals_children() {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        rows
    }

    /// Verify depth, parent links, visibility and visible counts for every
    /// node reachable from the root.
    pub fn check_invariants(&self) -> Result<(), TreeError> {
        enum Step {
            Enter(NodeId),
            Exit(NodeId),
        }
        let violation = |node, kind| TreeError::InvariantViolation { node, kind };
        let root = self.get(NodeId::ROOT)?;
        if !root.is_visible() || root.depth != 0 {
            return Err(violation(NodeId::ROOT, InvariantKind::Visibility));
        }
        let mut stack = vec![Step::Enter(NodeId::ROOT)];
        while let Some(step) = stack.pop() {
            match step {
                Step::Enter(id) => {
                    let node = self.get(id)?;
                    stack.push(Step::Exit(id));
                    for &child_id in node.children.iter().rev() {
                        let child = self
                            .nodes
                            .get(&child_id)
                            .ok_or_else(|| violation(child_id, InvariantKind::Dangling))?;
                        if child.parent != Some(id) {
                            return Err(violation(child_id, InvariantKind::ParentLink));
                        }
                        if child.depth != node.depth + 1 {
                            return Err(violation(child_id, InvariantKind::Depth));
                        }
                        let expected = node.reveals_children() && child.passes_filter();
                        if child.is_visible() != expected {
                            return Err(violation(child_id, InvariantKind::Visibility));
                        }
                        stack.push(Step::Enter(child_id));
                    }
                }
                Step::Exit(id) => {
                    let node = self.get(id)?;
                    let expected = if !node.is_visible() {
                        0
                    } else if node.reveals_children() {
                        1 + node
                            .children
                            .iter()
                            .filter_map(|child| self.nodes.get(child))
                            .map(|child| child.visible_count)
                            .sum::<usize>()
                    } else {
                        1
                    };
                    if node.visible_count != expected {
                        return Err(violation(id, InvariantKind::VisibleCount));
                    }
                }
            }
        }
        Ok(())
    }

    pub(crate) fn get(&self, id: NodeId) -> Result<&TreeNode<T, F>, TreeError> {
        self.nodes.get(&id).ok_or(TreeError::UnknownNode { id })
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Result<&mut TreeNode<T, F>, TreeError> {
        self.nodes.get_mut(&id).ok_or(TreeError::UnknownNode { id })
    }

    pub(crate) fn alloc_id(&mut self) -> NodeId {
        let id = self.next_id;
        self.next_id = id.next();
        id
    }

    /// Fail with [`TreeError::UnknownNode`] if `id` or any of its ancestors is
    /// detached. Otherwise returns whether the path to the root crosses a
    /// stale node, i.e. whether the node's rows wait for a refresh.
    pub(crate) fn check_attached(&self, id: NodeId) -> Result<bool, TreeError> {
        let mut pending = false;
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = self.get(node_id)?;
            if node.flags.contains(NodeFlags::DETACHED) {
                return Err(TreeError::UnknownNode { id });
            }
            pending |= node.is_stale();
            current = node.parent;
        }
        Ok(pending)
    }

    /// Projection row of a visible node hanging off the root.
    ///
    /// `None` for hidden nodes and for nodes in a detached subtree.
    pub(crate) fn node_row(&self, id: NodeId) -> Result<Option<usize>, TreeError> {
        let node = self.get(id)?;
        if id == NodeId::ROOT || !node.is_visible() {
            return Ok(None);
        }
        let mut row = 0;
        let mut current = id;
        loop {
            let node = self.get(current)?;
            if node.flags.contains(NodeFlags::DETACHED) {
                return Ok(None);
            }
            let Some(parent_id) = node.parent else {
                break;
            };
            let parent = self.get(parent_id)?;
            for &sibling in &parent.children {
                if sibling == current {
                    break;
                }
                row += self.get(sibling)?.visible_count;
            }
            if parent_id != NodeId::ROOT {
                row += 1;
            }
            current = parent_id;
        }
        Ok(Some(row))
    }

    /// Projection row where the child at `index` of `parent` starts, if the
    /// parent reveals its children.
    pub(crate) fn child_row(&self, parent: NodeId, index: usize) -> Result<Option<usize>, TreeError> {
        let node = self.get(parent)?;
        if !node.reveals_children() {
            return Ok(None);
        }
        let mut row = match self.node_row(parent)? {
            Some(row) => row + 1,
            None if parent == NodeId::ROOT => 0,
            None => return Ok(None),
        };
        for &sibling in node.children.iter().take(index) {
            row += self.get(sibling)?.visible_count;
        }
        Ok(Some(row))
    }

    /// Add `delta` to the visible count of `from` and all its ancestors.
    pub(crate) fn adjust_counts(&mut self, from: Option<NodeId>, delta: isize) -> Result<(), TreeError> {
        if delta == 0 {
            return Ok(());
        }
        let mut current = from;
        while let Some(id) = current {
            let node = self.get_mut(id)?;
            debug_assert!(
                node.visible_count as isize + delta >= 0,
                "visible count underflow at {id}"
            );
            node.visible_count = node.visible_count.saturating_add_signed(delta);
            current = node.parent;
        }
        Ok(())
    }

    /// Recompute `visible` and `visible_count` for the subtree at `id`.
    ///
    /// Phase one (enter) derives visibility top-down; phase two (exit) sums
    /// counts bottom-up. Visible rows are appended to `rows` in pre-order.
    /// Subtrees that were and stay hidden are skipped unless `force` is set.
    pub(crate) fn recompute(
        &mut self,
        id: NodeId,
        parent_reveals: bool,
        force: bool,
        rows: &mut Vec<NodeId>,
    ) -> Result<(), TreeError> {
        enum Step {
            Enter(NodeId, bool),
            Exit(NodeId),
        }
        let mut stack = vec![Step::Enter(id, parent_reveals)];
        while let Some(step) = stack.pop() {
            match step {
                Step::Enter(id, parent_reveals) => {
                    let is_root = id == NodeId::ROOT;
                    let node = self.get_mut(id)?;
                    let was_visible = node.is_visible();
                    let visible = is_root || (parent_reveals && node.passes_filter());
                    node.set_flag(NodeFlags::VISIBLE, visible);
                    if visible {
                        if !is_root {
                            rows.push(id);
                        }
                        let reveals = node.reveals_children();
                        stack.push(Step::Exit(id));
                        for &child in node.children.iter().rev() {
                            stack.push(Step::Enter(child, reveals));
                        }
                    } else {
                        node.visible_count = 0;
                        if was_visible || force {
                            for &child in node.children.iter().rev() {
                                stack.push(Step::Enter(child, false));
                            }
                        }
                    }
                }
                Step::Exit(id) => {
                    let node = self.get(id)?;
                    let count = if node.reveals_children() {
                        1 + node
                            .children
                            .iter()
                            .filter_map(|child| self.nodes.get(child))
                            .map(|child| child.visible_count)
                            .sum::<usize>()
                    } else {
                        1
                    };
                    self.get_mut(id)?.visible_count = count;
                }
            }
        }
        Ok(())
    }

    /// Flip collapse flags for `id` (and its subtree when recursive),
    /// emitting one event per changed node. No projection work.
    pub(crate) fn apply_collapse_flags(&mut self, id: NodeId, update: CollapseUpdate) -> Result<bool, TreeError> {
        let mut changed = false;
        let mut stack = vec![(id, false)];
        while let Some((current, deep)) = stack.pop() {
            let node = self
                .nodes
                .get_mut(&current)
                .ok_or(TreeError::UnknownNode { id: current })?;
            if current != NodeId::ROOT {
                let flipped = match update {
                    CollapseUpdate::Collapsible { collapsible, pin } => {
                        if pin {
                            node.set_flag(NodeFlags::COLLAPSIBLE_PINNED, true);
                        }
                        let flipped = node.is_collapsible() != collapsible;
                        node.set_flag(NodeFlags::COLLAPSIBLE, collapsible);
                        flipped
                    }
                    CollapseUpdate::Collapsed { collapsed, .. } => {
                        if node.is_collapsible() {
                            let flipped = node.flags.contains(NodeFlags::COLLAPSED) != collapsed;
                            node.set_flag(NodeFlags::COLLAPSED, collapsed);
                            flipped
                        } else {
                            false
                        }
                    }
                };
                if flipped {
                    changed = true;
                    self.events.emit(TreeEvent::CollapseStateChanged {
                        node: current,
                        deep,
                    });
                }
            }
            if let CollapseUpdate::Collapsed {
                recursive: true, ..
            } = update
            {
                stack.extend(node.children.iter().rev().map(|&child| (child, true)));
            }
        }
        Ok(changed)
    }

    /// Apply a collapse update and patch the projection span of `id`.
    ///
    /// Detached nodes are rejected. Below a stale node only the flags change;
    /// the pending refresh rebuilds those rows.
    pub(crate) fn set_collapse_state(&mut self, id: NodeId, update: CollapseUpdate) -> Result<bool, TreeError>
    where
        S: ListSink,
    {
        let pending = self.check_attached(id)?;
        let changed = self.apply_collapse_flags(id, update)?;
        if changed && !pending {
            self.rebuild_span(id)?;
        }
        Ok(changed)
    }

    /// Recompute the subtree at `id` and replace its rows after the node's
    /// own row. Hidden nodes only get their flags recomputed lazily later.
    fn rebuild_span(&mut self, id: NodeId) -> Result<(), TreeError>
    where
        S: ListSink,
    {
        let node = self.get(id)?;
        if id != NodeId::ROOT && !node.is_visible() {
            return Ok(());
        }
        let old_count = node.visible_count;
        let parent = node.parent;
        let start = match self.node_row(id)? {
            Some(row) => row + 1,
            None if id == NodeId::ROOT => 0,
            None => return Ok(()),
        };
        let mut rows = Vec::new();
        self.recompute(id, true, false, &mut rows)?;
        let new_count = self.get(id)?.visible_count;
        let own_rows = if id == NodeId::ROOT { &rows[..] } else { &rows[1..] };
        self.sink
            .splice(start, old_count.saturating_sub(1), own_rows);
        self.adjust_counts(parent, new_count as isize - old_count as isize)?;

        #[cfg(feature = "tracing")]
        tracing::trace!(
            node = %id,
            old_count,
            new_count,
            "tree span rebuilt"
        );
        Ok(())
    }

    /// Recompute the whole tree and replace the projection in one splice.
    pub(crate) fn rebuild_projection(&mut self) -> Result<usize, TreeError>
    where
        S: ListSink,
    {
        let old_rows = self.size();
        let mut rows = Vec::with_capacity(old_rows);
        self.recompute(NodeId::ROOT, true, false, &mut rows)?;
        self.sink.splice(0, old_rows, &rows);
        Ok(rows.len())
    }

    /// Remove the subtree at `id` from the arena, firing the deletion hook in
    /// pre-order. Pending in-place deletions below it go too.
    pub(crate) fn remove_subtree(&mut self, id: NodeId, hooks: &mut SpliceHooks<'_, T, F>) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.remove(&current) else {
                continue;
            };
            hooks.deleted(&node);
            stack.extend(node.to_delete.iter().rev().copied());
            stack.extend(node.children.iter().rev().copied());
        }
    }
}

impl<T, F, S: ListSink, M> TreeModel<T, F, S, M> {
    /// Collapse, expand (`None` toggles) the node at `location`, optionally
    /// applying the same state to every collapsible descendant.
    ///
    /// Returns whether any flag changed. Change events are held back until
    /// the whole walk completes.
    pub fn set_collapsed(
        &mut self,
        location: &[usize],
        collapsed: Option<bool>,
        recursive: bool,
    ) -> Result<bool, TreeError> {
        let id = self.resolve(location)?;
        self.set_node_collapsed(id, collapsed, recursive)
    }

    /// [`set_collapsed`](Self::set_collapsed) addressed by handle.
    ///
    /// Handles of removed [`Flex`] nodes (and their descendants) are rejected
    /// with [`TreeError::UnknownNode`] until re-attached.
    pub fn set_node_collapsed(
        &mut self,
        id: NodeId,
        collapsed: Option<bool>,
        recursive: bool,
    ) -> Result<bool, TreeError> {
        let collapsed = collapsed.unwrap_or(!self.get(id)?.is_collapsed());

        #[cfg(feature = "tracing")]
        let _span = tracing::debug_span!(
            "tree_set_collapsed",
            node = %id,
            collapsed,
            recursive
        )
        .entered();

        self.events.pause();
        let result = self.collapse_chain(id, collapsed, recursive);
        self.events.resume();
        result
    }

    fn collapse_chain(&mut self, id: NodeId, collapsed: bool, recursive: bool) -> Result<bool, TreeError> {
        let update = CollapseUpdate::Collapsed {
            collapsed,
            recursive,
        };
        let result = self.set_collapse_state(id, update)?;
        if !result || collapsed || recursive || !self.options.auto_expand_single_children() {
            return Ok(result);
        }
        let mut current = id;
        loop {
            let node = self.get(current)?;
            if current == NodeId::ROOT || !node.is_collapsible() || node.is_collapsed() {
                break;
            }
            let mut visible = node
                .children
                .iter()
                .copied()
                .filter(|child| self.nodes.get(child).is_some_and(TreeNode::is_visible));
            let (Some(only), None) = (visible.next(), visible.next()) else {
                break;
            };
            if !self.set_collapse_state(only, update)? {
                break;
            }
            current = only;
        }
        Ok(result)
    }

    /// Change whether the node at `location` can be collapsed (`None`
    /// toggles). The explicit value is pinned against later has-children
    /// re-derivation. A stale collapsed bit is kept but ignored.
    pub fn set_collapsible(&mut self, location: &[usize], collapsible: Option<bool>) -> Result<bool, TreeError> {
        let id = self.resolve(location)?;
        self.set_node_collapsible(id, collapsible)
    }

    /// [`set_collapsible`](Self::set_collapsible) addressed by handle.
    pub fn set_node_collapsible(&mut self, id: NodeId, collapsible: Option<bool>) -> Result<bool, TreeError> {
        let collapsible = collapsible.unwrap_or(!self.get(id)?.is_collapsible());
        self.events.pause();
        let result = self.set_collapse_state(
            id,
            CollapseUpdate::Collapsible {
                collapsible,
                pin: true,
            },
        );
        self.events.resume();
        result
    }

    /// Expand every collapsed ancestor of the node at `location`, bottom-up
    /// and non-recursively, so the node's row becomes reachable.
    ///
    /// Returns whether any ancestor changed.
    pub fn expand_to(&mut self, location: &[usize]) -> Result<bool, TreeError> {
        let id = self.resolve(location)?;
        self.expand_to_node(id)
    }

    /// [`expand_to`](Self::expand_to) addressed by handle.
    pub fn expand_to_node(&mut self, id: NodeId) -> Result<bool, TreeError> {
        #[cfg(feature = "tracing")]
        let _span = tracing::debug_span!("tree_expand_to", node = %id).entered();

        self.check_attached(id)?;
        let mut ancestors = Vec::new();
        let mut current = self.get(id)?.parent;
        while let Some(ancestor) = current {
            let node = self.get(ancestor)?;
            if ancestor != NodeId::ROOT && node.is_collapsed() {
                ancestors.push(ancestor);
            }
            current = node.parent;
        }

        self.events.pause();
        let mut changed = false;
        let mut result = Ok(());
        for ancestor in ancestors {
            match self.set_collapse_state(
                ancestor,
                CollapseUpdate::Collapsed {
                    collapsed: false,
                    recursive: false,
                },
            ) {
                Ok(flipped) => changed |= flipped,
                Err(err) => {
                    result = Err(err);
                    break;
                }
            }
        }
        self.events.resume();
        result.map(|()| changed)
    }

    /// Re-emit the row of the node at `location` so the sink re-binds it.
    /// Hidden nodes, and nodes below a stale node, are a no-op.
    pub fn rerender(&mut self, location: &[usize]) -> Result<(), TreeError> {
        let id = self.resolve(location)?;
        self.rerender_node(id)
    }

    /// [`rerender`](Self::rerender) addressed by handle.
    pub fn rerender_node(&mut self, id: NodeId) -> Result<(), TreeError> {
        if self.check_attached(id)? {
            return Ok(());
        }
        if let Some(row) = self.node_row(id)? {
            self.sink.splice(row, 1, &[id]);
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::element::TreeElement;

    pub(crate) fn rows<T: Copy, F, S, M>(tree: &TreeModel<T, F, S, M>, sink: &[NodeId]) -> Vec<T> {
        sink.iter()
            .map(|id| *tree.node(*id).expect("live row").element())
            .collect()
    }

    /// `[1,[3,2]], [4,[6,5]]`
    pub(crate) fn scenario_a() -> IndexTreeModel<u32> {
        let mut tree: IndexTreeModel<u32> = IndexTreeModel::new(0, Vec::new(), TreeOptions::new());
        tree.splice(
            &[0],
            0,
            vec![
                TreeElement::new(1)
                    .child(TreeElement::new(3))
                    .child(TreeElement::new(2)),
                TreeElement::new(4)
                    .child(TreeElement::new(6))
                    .child(TreeElement::new(5)),
            ],
            SpliceHooks::none(),
        )
        .expect("splice");
        tree
    }

    fn projection(tree: &IndexTreeModel<u32>) -> Vec<u32> {
        rows(tree, tree.sink())
    }

    #[test]
    fn empty_model() {
        let tree: IndexTreeModel<&str> = IndexTreeModel::new("root", Vec::new(), TreeOptions::new());
        assert_eq!(tree.size(), 0);
        assert_eq!(tree.node_count(), 0);
        assert_eq!(*tree.root_element(), "root");
        assert!(tree.has_node(&[]));
        assert!(!tree.has_node(&[0]));
        tree.check_invariants().expect("invariants");
    }

    #[test]
    fn scenario_a_projection_and_depths() {
        let tree = scenario_a();
        assert_eq!(projection(&tree), vec![1, 3, 2, 4, 6, 5]);
        let depths: Vec<usize> = tree
            .sink()
            .iter()
            .map(|id| tree.node(*id).expect("node").depth())
            .collect();
        assert_eq!(depths, vec![1, 2, 2, 1, 2, 2]);
        assert_eq!(tree.node_at(&[0]).expect("node 1").visible_count(), 3);
        assert_eq!(tree.size(), 6);
        tree.check_invariants().expect("invariants");
    }

    #[test]
    fn scenario_b_collapse_and_expand() {
        let mut tree = scenario_a();
        assert!(tree.set_collapsed(&[0], Some(true), false).expect("collapse"));
        assert_eq!(projection(&tree), vec![1, 4, 6, 5]);
        assert_eq!(tree.node_at(&[0]).expect("node 1").visible_count(), 1);
        assert!(tree.set_collapsed(&[0], Some(false), false).expect("expand"));
        assert_eq!(projection(&tree), vec![1, 3, 2, 4, 6, 5]);
        tree.check_invariants().expect("invariants");
    }

    #[test]
    fn collapse_is_idempotent() {
        let mut tree = scenario_a();
        assert!(tree.set_collapsed(&[1], Some(true), false).expect("first"));
        let before = tree.sink().clone();
        tree.drain_events();
        assert!(!tree.set_collapsed(&[1], Some(true), false).expect("second"));
        assert_eq!(*tree.sink(), before);
        assert!(tree.drain_events().is_empty());
    }

    #[test]
    fn toggle_with_none() {
        let mut tree = scenario_a();
        assert!(tree.set_collapsed(&[1], None, false).expect("toggle"));
        assert!(tree.is_collapsed(&[1]).expect("state"));
        assert!(tree.set_collapsed(&[1], None, false).expect("toggle"));
        assert!(!tree.is_collapsed(&[1]).expect("state"));
    }

    #[test]
    fn leaves_are_not_collapsible() {
        let mut tree = scenario_a();
        assert!(!tree.is_collapsible(&[0, 0]).expect("leaf"));
        assert!(!tree.set_collapsed(&[0, 0], Some(true), false).expect("noop"));
        assert!(!tree.is_collapsed(&[0, 0]).expect("leaf"));
    }

    #[test]
    fn recursive_collapse_defers_events_in_change_order() {
        let mut tree: IndexTreeModel<u32> = IndexTreeModel::new(0, Vec::new(), TreeOptions::new());
        tree.splice(
            &[0],
            0,
            vec![TreeElement::new(1).child(
                TreeElement::new(2).child(TreeElement::new(3).child(TreeElement::new(4))),
            )],
            SpliceHooks::none(),
        )
        .expect("splice");
        tree.drain_events();
        let a = tree.resolve(&[0]).expect("a");
        let b = tree.resolve(&[0, 0]).expect("b");
        let c = tree.resolve(&[0, 0, 0]).expect("c");

        assert!(tree.set_collapsed(&[0], Some(true), true).expect("collapse"));
        assert_eq!(
            tree.drain_events(),
            vec![
                TreeEvent::CollapseStateChanged { node: a, deep: false },
                TreeEvent::CollapseStateChanged { node: b, deep: true },
                TreeEvent::CollapseStateChanged { node: c, deep: true },
            ]
        );
        assert_eq!(projection(&tree), vec![1]);
        tree.check_invariants().expect("invariants");

        // Expanding only the top keeps the nested nodes collapsed.
        assert!(tree.set_collapsed(&[0], Some(false), false).expect("expand"));
        assert_eq!(projection(&tree), vec![1, 2]);
        tree.check_invariants().expect("invariants");
    }

    #[test]
    fn expand_to_reveals_path_only() {
        let mut tree = scenario_a();
        tree.set_collapsed(&[], Some(true), true).expect("collapse all");
        assert_eq!(projection(&tree), vec![1, 4]);
        assert!(tree.expand_to(&[1, 0]).expect("reveal"));
        assert_eq!(projection(&tree), vec![1, 4, 6, 5]);
        assert!(tree.is_collapsed(&[0]).expect("sibling"));
        assert_eq!(tree.list_index(&[1, 0]).expect("row"), Some(2));
        assert!(!tree.expand_to(&[1, 0]).expect("already revealed"));
        tree.check_invariants().expect("invariants");
    }

    #[test]
    fn expand_to_deep_chain() {
        let mut tree: IndexTreeModel<u32> = IndexTreeModel::new(0, Vec::new(), TreeOptions::new());
        let chain = (1..=5)
            .rev()
            .fold(None, |child: Option<TreeElement<u32>>, value| {
                let node = TreeElement::new(value).with_collapsed(true);
                Some(match child {
                    Some(child) => node.child(child),
                    None => node,
                })
            })
            .expect("chain");
        tree.splice(&[0], 0, vec![chain], SpliceHooks::none())
            .expect("splice");
        assert_eq!(projection(&tree), vec![1]);
        tree.expand_to(&[0, 0, 0, 0]).expect("reveal");
        assert_eq!(projection(&tree), vec![1, 2, 3, 4, 5]);
        assert!(tree.is_collapsed(&[0, 0, 0, 0]).expect("target keeps state"));
        tree.check_invariants().expect("invariants");
    }

    #[test]
    fn set_collapsible_false_ignores_stale_collapsed_bit() {
        let mut tree = scenario_a();
        tree.set_collapsed(&[0], Some(true), false).expect("collapse");
        assert!(tree.set_collapsible(&[0], Some(false)).expect("gate"));
        let node = tree.node_at(&[0]).expect("node");
        assert!(node.flags().contains(NodeFlags::COLLAPSED));
        assert!(!node.is_collapsed());
        assert_eq!(projection(&tree), vec![1, 3, 2, 4, 6, 5]);
        assert!(tree.set_collapsible(&[0], Some(true)).expect("gate"));
        assert_eq!(projection(&tree), vec![1, 4, 6, 5]);
        tree.check_invariants().expect("invariants");
    }

    #[test]
    fn auto_expand_single_children_chain() {
        let options = TreeOptions::new()
            .with_collapse_by_default(true)
            .with_auto_expand_single_children(true);
        let mut tree: IndexTreeModel<u32> = IndexTreeModel::new(0, Vec::new(), options);
        tree.splice(
            &[0],
            0,
            vec![TreeElement::new(1).child(
                TreeElement::new(2)
                    .child(TreeElement::new(3).child(TreeElement::new(5)))
                    .child(TreeElement::new(4)),
            )],
            SpliceHooks::none(),
        )
        .expect("splice");
        assert_eq!(projection(&tree), vec![1]);
        tree.set_collapsed(&[0], Some(false), false).expect("expand");
        // 1 -> 2 auto-expands; 2 has two children so 3 stays collapsed.
        assert_eq!(projection(&tree), vec![1, 2, 3, 4]);
        tree.check_invariants().expect("invariants");
    }

    #[test]
    fn navigation_queries() {
        let tree = scenario_a();
        assert_eq!(tree.first_element_child(&[]).expect("root"), Some(&1));
        assert_eq!(tree.first_element_child(&[0, 1]).expect("leaf"), None);
        assert_eq!(tree.last_element_ancestor(&[]).expect("root"), Some(&5));
        assert_eq!(tree.parent_location(&[1, 0]).expect("parent"), Some(vec![1]));
        assert_eq!(tree.parent_location(&[1]).expect("top"), None);
        assert_eq!(tree.parent_location(&[]), Err(TreeError::RootNotAllowed));
        let id = tree.resolve(&[1, 1]).expect("node 5");
        assert_eq!(tree.location(id).expect("location"), vec![1, 1]);
        assert_eq!(tree.node_list_index(id).expect("row"), Some(5));
    }

    #[test]
    fn invalid_location_is_an_error() {
        let mut tree = scenario_a();
        assert_eq!(
            tree.set_collapsed(&[0, 7], Some(true), false),
            Err(TreeError::InvalidLocation { location: vec![0, 7] })
        );
        assert!(tree.node_at(&[2]).is_err());
    }

    #[test]
    fn rerender_reemits_visible_row() {
        let mut tree: IndexTreeModel<u32, (), crate::sink::RecordingSink> =
            IndexTreeModel::new(0, crate::sink::RecordingSink::new(), TreeOptions::new());
        tree.splice(
            &[0],
            0,
            vec![TreeElement::new(1), TreeElement::new(2)],
            SpliceHooks::none(),
        )
        .expect("splice");
        let _ = tree.sink.take_log();
        tree.rerender(&[1]).expect("rerender");
        let id = tree.resolve(&[1]).expect("node");
        assert_eq!(
            tree.sink.take_log(),
            vec![crate::sink::SpliceRecord {
                start: 1,
                delete_count: 1,
                inserted: vec![id],
            }]
        );
    }
}
