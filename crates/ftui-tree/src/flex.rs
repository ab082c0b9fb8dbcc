#![forbid(unsafe_code)]

//! In-place editing for [`FlexTreeModel`](crate::FlexTreeModel).
//!
//! Children are edited directly through [`FlexEdit`], which only touches the
//! children vectors and marks the edited node stale. Metadata (depth,
//! collapsible, filter verdicts, visibility, counts) and the projection are
//! brought up to date by [`refresh`](TreeModel::refresh) on the topmost stale
//! node. Existing nodes keep their ids across moves.
//!
//! # Invariants
//!
//! 1. A removed child is `DETACHED`, keeps its former parent link, and sits in
//!    that parent's `to_delete` list until re-attached or refreshed away.
//! 2. Until refreshed, a stale node keeps its old `visible_count`, so rows
//!    outside the stale subtree stay addressable.
//! 3. Removed nodes and their descendants cannot be collapsed, expanded to or
//!    re-rendered: their handles answer [`TreeError::UnknownNode`] until
//!    re-attached.
//! 4. A subtree from [`TreeModel::create`] that is still unattached when the
//!    next refresh completes is freed by that refresh.

use crate::element::TreeElement;
use crate::error::TreeError;
use crate::event::TreeEvent;
use crate::model::{Flex, SpliceHooks, TreeModel};
use crate::node::{NodeFlags, NodeId};
use crate::sink::ListSink;

/// Borrowed editor for one node's children.
///
/// Dropping the editor does not refresh anything.
pub struct FlexEdit<'a, T, F = (), S = Vec<NodeId>> {
    model: &'a mut TreeModel<T, F, S, Flex>,
    id: NodeId,
}

impl<T, F, S> std::fmt::Debug for FlexEdit<'_, T, F, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlexEdit")
            .field("node", &self.id)
            .field("children", &self.children().len())
            .finish()
    }
}

impl<T, F, S> FlexEdit<'_, T, F, S> {
    /// The node being edited.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Current children, including edits made so far.
    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        self.model
            .nodes
            .get(&self.id)
            .map_or(&[], |node| node.children.as_slice())
    }

    /// Number of current children.
    #[must_use]
    pub fn len(&self) -> usize {
        self.children().len()
    }

    /// Whether the node currently has no children.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children().is_empty()
    }

    /// Build a detached subtree ready to be attached.
    pub fn create(&mut self, description: TreeElement<T>) -> Result<NodeId, TreeError> {
        self.model.create(description)
    }

    /// Attach a detached node as the last child.
    pub fn push(&mut self, child: NodeId) -> Result<(), TreeError> {
        let index = self.len();
        self.insert(index, child)
    }

    /// Attach a detached node at `index`.
    pub fn insert(&mut self, index: usize, child: NodeId) -> Result<(), TreeError> {
        let len = self.len();
        if index > len {
            return Err(TreeError::InvalidEditIndex {
                node: self.id,
                index,
                len,
            });
        }
        let node = self.model.get(child)?;
        if child == NodeId::ROOT {
            return Err(TreeError::RootNotAllowed);
        }
        if !node.flags.contains(NodeFlags::DETACHED) {
            return Err(TreeError::NotDetached { id: child });
        }
        let former_parent = node.parent;

        let mut current = Some(self.id);
        while let Some(ancestor) = current {
            if ancestor == child {
                return Err(TreeError::CyclicAttach {
                    node: child,
                    parent: self.id,
                });
            }
            current = self.model.get(ancestor)?.parent;
        }

        if let Some(former) = former_parent.and_then(|id| self.model.nodes.get_mut(&id)) {
            former.to_delete.retain(|&pending| pending != child);
        }
        let node = self.model.get_mut(child)?;
        node.parent = Some(self.id);
        node.set_flag(NodeFlags::DETACHED, false);
        self.model.get_mut(self.id)?.children.insert(index, child);
        Ok(())
    }

    /// Build a subtree and attach it as the last child.
    pub fn push_new(&mut self, description: TreeElement<T>) -> Result<NodeId, TreeError> {
        let index = self.len();
        self.insert_new(index, description)
    }

    /// Build a subtree and attach it at `index`.
    pub fn insert_new(&mut self, index: usize, description: TreeElement<T>) -> Result<NodeId, TreeError> {
        let len = self.len();
        if index > len {
            return Err(TreeError::InvalidEditIndex {
                node: self.id,
                index,
                len,
            });
        }
        let child = self.model.create(description)?;
        self.insert(index, child)?;
        Ok(child)
    }

    /// Detach the child at `index`. It is deleted on the next refresh unless
    /// attached somewhere first.
    pub fn remove(&mut self, index: usize) -> Result<NodeId, TreeError> {
        let node = self.model.get_mut(self.id)?;
        let len = node.children.len();
        if index >= len {
            return Err(TreeError::InvalidEditIndex {
                node: self.id,
                index,
                len,
            });
        }
        let child = node.children.remove(index);
        node.to_delete.push(child);
        self.model.get_mut(child)?.set_flag(NodeFlags::DETACHED, true);
        Ok(child)
    }
}

impl<T, F, S> TreeModel<T, F, S, Flex> {
    /// Build a detached subtree from a description, ready to be attached
    /// with [`FlexEdit::push`] or [`FlexEdit::insert`].
    ///
    /// Attach it before the next [`refresh`](Self::refresh) completes, or
    /// that refresh frees it (firing the deletion hook).
    pub fn create(&mut self, description: TreeElement<T>) -> Result<NodeId, TreeError> {
        let mut created = Vec::new();
        let id = self.build_subtree(description, None, 0, &mut created)?;
        self.get_mut(id)?.set_flag(NodeFlags::DETACHED, true);
        self.unattached.push(id);
        Ok(id)
    }

    /// Drop a node made by [`create`](Self::create) that was never attached.
    pub fn discard(&mut self, id: NodeId) -> Result<(), TreeError> {
        let node = self.get(id)?;
        if !node.flags.contains(NodeFlags::DETACHED) || node.parent.is_some() {
            return Err(TreeError::UnknownNode { id });
        }
        self.remove_subtree(id, &mut SpliceHooks::none());
        self.unattached.retain(|&pending| pending != id);
        Ok(())
    }

    /// Start editing the children of `id`, marking it stale.
    pub fn edit(&mut self, id: NodeId) -> Result<FlexEdit<'_, T, F, S>, TreeError> {
        let node = self.get_mut(id)?;
        if !node.is_stale() {
            let had_children = !node.children.is_empty();
            node.set_flag(NodeFlags::STALE, true);
            node.set_flag(NodeFlags::HAD_CHILDREN, had_children);
        }
        Ok(FlexEdit { model: self, id })
    }

    /// [`edit`](Self::edit) addressed by location.
    pub fn edit_at(&mut self, location: &[usize]) -> Result<FlexEdit<'_, T, F, S>, TreeError> {
        let id = self.resolve(location)?;
        self.edit(id)
    }
}

impl<T, F, S: ListSink> TreeModel<T, F, S, Flex> {
    /// Bring the stale subtree at `id` up to date and patch the projection.
    ///
    /// Returns `Ok(false)` if `id` is not stale. Every node in the refreshed
    /// subtree goes through the creation hook; removed children that were not
    /// re-attached (and their descendants) go through the deletion hook and
    /// are freed, as do subtrees from [`create`](Self::create) that were never
    /// attached.
    ///
    /// # Errors
    ///
    /// [`TreeError::StaleAncestor`] if an ancestor is stale too (refresh the
    /// ancestor instead), [`TreeError::UnknownNode`] for dead or detached
    /// handles.
    pub fn refresh(&mut self, id: NodeId, mut hooks: SpliceHooks<'_, T, F>) -> Result<bool, TreeError> {
        let node = self.get(id)?;
        if node.flags.contains(NodeFlags::DETACHED) {
            return Err(TreeError::UnknownNode { id });
        }
        if !node.is_stale() {
            return Ok(false);
        }
        let mut current = node.parent;
        while let Some(ancestor) = current {
            let ancestor_node = self.get(ancestor)?;
            if ancestor_node.is_stale() {
                return Err(TreeError::StaleAncestor { node: id, ancestor });
            }
            current = ancestor_node.parent;
        }

        #[cfg(feature = "tracing")]
        let _span = tracing::debug_span!("tree_refresh", node = %id).entered();

        self.events.pause();
        let result = self.refresh_subtree(id, &mut hooks);
        self.events.resume();
        result.map(|()| true)
    }

    /// [`refresh`](Self::refresh) addressed by location.
    pub fn refresh_at(&mut self, location: &[usize], hooks: SpliceHooks<'_, T, F>) -> Result<bool, TreeError> {
        let id = self.resolve(location)?;
        self.refresh(id, hooks)
    }

    fn refresh_subtree(&mut self, id: NodeId, hooks: &mut SpliceHooks<'_, T, F>) -> Result<(), TreeError> {
        let node = self.get(id)?;
        let old_count = node.visible_count;
        let parent = node.parent;
        let (parent_reveals, start, old_rows) = match parent {
            None => (true, Some(0), old_count.saturating_sub(1)),
            Some(parent) => {
                let index = self
                    .get(parent)?
                    .children
                    .iter()
                    .position(|&child| child == id)
                    .ok_or(TreeError::UnknownNode { id })?;
                (
                    self.get(parent)?.reveals_children(),
                    self.child_row(parent, index)?,
                    old_count,
                )
            }
        };

        let (subtree, doomed) = self.relink_subtree(id)?;

        if self.filter.is_some() {
            for &node in subtree.iter().rev() {
                self.evaluate_filter(node)?;
            }
        }

        let mut rows = Vec::new();
        self.recompute(id, parent_reveals, true, &mut rows)?;
        let new_count = self.get(id)?.visible_count;
        if let Some(start) = start {
            self.sink.splice(start, old_rows, &rows);
            self.adjust_counts(parent, new_count as isize - old_count as isize)?;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            nodes = subtree.len(),
            deleted = doomed.len(),
            old_count,
            new_count,
            "tree subtree refreshed"
        );

        if let Some(parent) = parent {
            if self.update_ancestor_verdicts(parent)? {
                self.rebuild_projection()?;
            }
        }

        for &node in subtree.iter().rev() {
            if let Some(node) = self.nodes.get(&node) {
                hooks.created(node);
            }
        }
        let mut deleted = Vec::new();
        for doomed in doomed {
            if self
                .nodes
                .get(&doomed)
                .is_some_and(|node| node.flags.contains(NodeFlags::DETACHED))
            {
                self.remove_subtree(doomed, hooks);
                deleted.push(doomed);
            }
        }
        for orphan in std::mem::take(&mut self.unattached) {
            if self
                .nodes
                .get(&orphan)
                .is_some_and(|node| node.parent.is_none() && node.flags.contains(NodeFlags::DETACHED))
            {
                self.remove_subtree(orphan, hooks);
                deleted.push(orphan);
            }
        }

        self.events.emit(TreeEvent::Splice {
            inserted: vec![id],
            deleted,
        });
        Ok(())
    }

    /// Pre-order walk fixing parent links and depths, clearing stale marks,
    /// re-deriving collapsible flags of edited nodes, and collecting pending
    /// deletions. Returns the subtree in pre-order and the pending deletions.
    fn relink_subtree(&mut self, id: NodeId) -> Result<(Vec<NodeId>, Vec<NodeId>), TreeError> {
        let mut subtree = Vec::new();
        let mut doomed = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            subtree.push(current);
            let node = self
                .nodes
                .get_mut(&current)
                .ok_or(TreeError::UnknownNode { id: current })?;
            if node.is_stale() {
                let had_children = node.flags.contains(NodeFlags::HAD_CHILDREN);
                let has_children = !node.children.is_empty();
                if current != NodeId::ROOT
                    && had_children != has_children
                    && !node.flags.contains(NodeFlags::COLLAPSIBLE_PINNED)
                    && node.is_collapsible() != has_children
                {
                    node.set_flag(NodeFlags::COLLAPSIBLE, has_children);
                    self.events.emit(TreeEvent::CollapseStateChanged {
                        node: current,
                        deep: current != id,
                    });
                }
                node.set_flag(NodeFlags::STALE | NodeFlags::HAD_CHILDREN, false);
                doomed.append(&mut node.to_delete);
            }
            let depth = node.depth + 1;
            for index in (0..node.children.len()).rev() {
                let child = self.get(current)?.children[index];
                let child_node = self.get_mut(child)?;
                child_node.parent = Some(current);
                child_node.depth = depth;
                child_node.set_flag(NodeFlags::DETACHED, false);
                stack.push(child);
            }
        }
        Ok((subtree, doomed))
    }
}
