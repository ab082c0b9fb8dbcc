#![forbid(unsafe_code)]

//! Splice-by-description for [`IndexTreeModel`](crate::IndexTreeModel).
//!
//! A splice replaces a run of siblings with freshly built subtrees and patches
//! the projection with at most one sink splice (plus one projection rebuild
//! when an installed filter flips an ancestor's verdict).
//!
//! | Step | Cost |
//! |------|------|
//! | resolve + validate | O(depth) |
//! | build inserted subtrees | O(inserted nodes) |
//! | row offset + count propagation | O(depth × siblings) |
//! | free deleted subtrees | O(deleted nodes) |

use crate::element::TreeElement;
use crate::error::TreeError;
use crate::event::TreeEvent;
use crate::model::{CollapseUpdate, Index, SpliceHooks, TreeModel};
use crate::node::{NodeFlags, NodeId, TreeNode};
use crate::sink::ListSink;

impl<T, F, S: ListSink> TreeModel<T, F, S, Index> {
    /// Replace `delete_count` children at `location` with subtrees built from
    /// `to_insert`.
    ///
    /// `location` is the parent's path followed by the start index, so `[0]`
    /// addresses the first top-level slot and `[2, 0]` the first child of the
    /// third top-level node. Validation happens before anything is touched.
    ///
    /// # Errors
    ///
    /// [`TreeError::InvalidLocation`] if the parent path does not resolve (or
    /// `location` is empty), [`TreeError::InvalidSplice`] if the range falls
    /// outside the parent's children.
    pub fn splice<I>(
        &mut self,
        location: &[usize],
        delete_count: usize,
        to_insert: I,
        mut hooks: SpliceHooks<'_, T, F>,
    ) -> Result<(), TreeError>
    where
        I: IntoIterator<Item = TreeElement<T>>,
    {
        let (&start, parent_location) =
            location
                .split_last()
                .ok_or_else(|| TreeError::InvalidLocation {
                    location: location.to_vec(),
                })?;
        let parent = self.resolve(parent_location)?;
        let len = self.get(parent)?.children.len();
        let end = start.checked_add(delete_count).filter(|&end| end <= len);
        let Some(end) = end.filter(|_| start <= len) else {
            return Err(TreeError::InvalidSplice {
                location: location.to_vec(),
                start,
                delete_count,
                len,
            });
        };

        #[cfg(feature = "tracing")]
        let _span = tracing::debug_span!(
            "tree_splice",
            parent = %parent,
            start,
            delete_count
        )
        .entered();

        self.events.pause();
        let result = self.splice_children(parent, start, end, to_insert, &mut hooks);
        self.events.resume();
        result
    }

    fn splice_children<I>(
        &mut self,
        parent: NodeId,
        start: usize,
        end: usize,
        to_insert: I,
        hooks: &mut SpliceHooks<'_, T, F>,
    ) -> Result<(), TreeError>
    where
        I: IntoIterator<Item = TreeElement<T>>,
    {
        let parent_node = self.get(parent)?;
        let child_depth = parent_node.depth + 1;
        let had_children = !parent_node.children.is_empty();
        let parent_reveals = parent_node.reveals_children();
        let row_start = self.child_row(parent, start)?;

        let mut created = Vec::new();
        let mut inserted = Vec::new();
        for description in to_insert {
            inserted.push(self.build_subtree(description, Some(parent), child_depth, &mut created)?);
        }

        let deleted: Vec<NodeId> = self
            .get_mut(parent)?
            .children
            .splice(start..end, inserted.iter().copied())
            .collect();

        let mut rows = Vec::new();
        for &id in &inserted {
            self.recompute(id, parent_reveals, false, &mut rows)?;
        }
        let deleted_rows: usize = deleted
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .map(TreeNode::visible_count)
            .sum();

        if let Some(row_start) = row_start {
            self.sink.splice(row_start, deleted_rows, &rows);
            self.adjust_counts(Some(parent), rows.len() as isize - deleted_rows as isize)?;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            inserted = inserted.len(),
            deleted = deleted.len(),
            inserted_rows = rows.len(),
            deleted_rows,
            "tree splice applied"
        );

        if self.update_ancestor_verdicts(parent)? {
            self.rebuild_projection()?;
        }

        let has_children = !self.get(parent)?.children.is_empty();
        if parent != NodeId::ROOT
            && had_children != has_children
            && !self.get(parent)?.flags.contains(NodeFlags::COLLAPSIBLE_PINNED)
        {
            self.set_collapse_state(
                parent,
                CollapseUpdate::Collapsible {
                    collapsible: has_children,
                    pin: false,
                },
            )?;
        }

        for &id in &created {
            if let Some(node) = self.nodes.get(&id) {
                hooks.created(node);
            }
        }
        for &id in &deleted {
            self.remove_subtree(id, hooks);
        }

        self.events.emit(TreeEvent::Splice { inserted, deleted });
        Ok(())
    }
}

impl<T, F, S, M> TreeModel<T, F, S, M> {
    /// Materialize one description into the arena, depth-first without
    /// recursion. Filter verdicts are evaluated bottom-up; visibility and
    /// counts are left for [`recompute`](TreeModel::recompute). Created ids are
    /// appended to `created` in post-order.
    pub(crate) fn build_subtree(
        &mut self,
        description: TreeElement<T>,
        parent: Option<NodeId>,
        depth: usize,
        created: &mut Vec<NodeId>,
    ) -> Result<NodeId, TreeError> {
        let (top, pending) = self.create_node(description, parent, depth);
        let mut stack = vec![(top, depth, pending)];
        loop {
            let Some((id, depth, pending)) = stack.last_mut() else {
                break;
            };
            let (id, depth) = (*id, *depth);
            match pending.next() {
                Some(child) => {
                    let (child_id, child_pending) = self.create_node(child, Some(id), depth + 1);
                    self.get_mut(id)?.children.push(child_id);
                    stack.push((child_id, depth + 1, child_pending));
                }
                None => {
                    stack.pop();
                    self.evaluate_filter(id)?;
                    created.push(id);
                }
            }
        }
        Ok(top)
    }

    fn create_node(
        &mut self,
        description: TreeElement<T>,
        parent: Option<NodeId>,
        depth: usize,
    ) -> (NodeId, std::vec::IntoIter<TreeElement<T>>) {
        let TreeElement {
            element,
            children,
            collapsible,
            collapsed,
        } = description;
        let id = self.alloc_id();
        let mut node = TreeNode::new(id, element, parent, depth);
        let has_children = !children.is_empty();
        node.set_flag(
            NodeFlags::COLLAPSIBLE,
            collapsible.unwrap_or(collapsed.is_some()) || has_children,
        );
        node.set_flag(NodeFlags::COLLAPSIBLE_PINNED, collapsible.is_some());
        node.set_flag(
            NodeFlags::COLLAPSED,
            collapsed.unwrap_or(self.options.collapse_by_default()),
        );
        node.children.reserve(children.len());
        self.nodes.insert(id, node);
        (id, children.into_iter())
    }
}
