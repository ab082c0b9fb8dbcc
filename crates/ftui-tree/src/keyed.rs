#![forbid(unsafe_code)]

//! Payload-addressed wrapper over either tree model.
//!
//! [`KeyedTree`] keeps a table from payload to node handle, maintained through
//! the creation/deletion hooks of every structural edit, so callers can address
//! nodes by the domain object they display instead of by location. Payloads
//! must be unique within the tree; the root payload always maps to the root.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;

use crate::element::TreeElement;
use crate::error::{InvariantKind, TreeError};
use crate::event::TreeEvent;
use crate::flex::FlexEdit;
use crate::model::{CollapseUpdate, EditMode, Flex, Index, SpliceHooks, TreeModel};
use crate::node::{NodeFlags, NodeId, TreeNode};
use crate::options::{TreeFilter, TreeOptions};
use crate::sink::ListSink;

/// Saved expansion state of a keyed tree.
///
/// Lists the payloads of expanded collapsible nodes in pre-order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "state-persistence",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct TreeViewState<T> {
    /// Payloads of collapsible nodes that are expanded.
    pub expanded: Vec<T>,
}

/// A tree model addressed by payload.
pub struct KeyedTree<T, F = (), S = Vec<NodeId>, M = Index> {
    model: TreeModel<T, F, S, M>,
    table: HashMap<T, NodeId>,
}

/// Keyed wrapper over an [`IndexTreeModel`](crate::IndexTreeModel).
pub type KeyedIndexTree<T, F = (), S = Vec<NodeId>> = KeyedTree<T, F, S, Index>;

/// Keyed wrapper over a [`FlexTreeModel`](crate::FlexTreeModel).
pub type KeyedFlexTree<T, F = (), S = Vec<NodeId>> = KeyedTree<T, F, S, Flex>;

impl<T, F, S, M> fmt::Debug for KeyedTree<T, F, S, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedTree")
            .field("model", &self.model)
            .field("keys", &self.table.len())
            .finish()
    }
}

impl<T, F, S, M> KeyedTree<T, F, S, M>
where
    T: Eq + Hash + Clone + fmt::Debug,
    S: ListSink,
    M: EditMode,
{
    /// Create a keyed tree holding only `root`.
    pub fn new(root: T, sink: S, options: TreeOptions) -> Self {
        Self {
            model: TreeModel::new(root, sink, options),
            table: HashMap::new(),
        }
    }
}

impl<T, F, S, M> KeyedTree<T, F, S, M>
where
    T: Eq + Hash + Clone + fmt::Debug,
{
    /// The wrapped model.
    #[must_use]
    pub fn model(&self) -> &TreeModel<T, F, S, M> {
        &self.model
    }

    /// The sink the projection is mirrored into.
    #[must_use]
    pub fn sink(&self) -> &S {
        self.model.sink()
    }

    /// Take all delivered events.
    pub fn drain_events(&mut self) -> Vec<TreeEvent> {
        self.model.drain_events()
    }

    /// Number of rows in the flat projection.
    #[must_use]
    pub fn size(&self) -> usize {
        self.model.size()
    }

    /// Number of live nodes, excluding the root.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.model.node_count()
    }

    /// Whether `element` is the root payload or a node in the tree.
    #[must_use]
    pub fn has_element(&self, element: &T) -> bool {
        self.node_id(element).is_ok()
    }

    /// Handle of the node holding `element`.
    pub fn node_id(&self, element: &T) -> Result<NodeId, TreeError> {
        if element == self.model.root_element() {
            return Ok(NodeId::ROOT);
        }
        self.table
            .get(element)
            .copied()
            .ok_or_else(|| TreeError::ElementNotFound {
                element: format!("{element:?}"),
            })
    }

    /// The node holding `element`.
    pub fn node(&self, element: &T) -> Result<&TreeNode<T, F>, TreeError> {
        let id = self.node_id(element)?;
        self.model.get(id)
    }

    /// Current location of `element`.
    pub fn location(&self, element: &T) -> Result<Vec<usize>, TreeError> {
        self.model.location(self.node_id(element)?)
    }

    /// Projection row of `element`, or `None` if hidden.
    pub fn list_index(&self, element: &T) -> Result<Option<usize>, TreeError> {
        self.model.node_list_index(self.node_id(element)?)
    }

    /// Payload of the parent of `element`; `None` for the root.
    pub fn parent_element(&self, element: &T) -> Result<Option<&T>, TreeError> {
        match self.node(element)?.parent {
            Some(parent) => Ok(Some(&self.model.get(parent)?.element)),
            None => Ok(None),
        }
    }

    /// Payloads of the children of `element`, in order.
    pub fn child_elements(&self, element: &T) -> Result<Vec<&T>, TreeError> {
        self.node(element)?
            .children
            .iter()
            .map(|&child| self.model.get(child).map(TreeNode::element))
            .collect()
    }

    /// Effective collapse state of `element`.
    pub fn is_collapsed(&self, element: &T) -> Result<bool, TreeError> {
        Ok(self.node(element)?.is_collapsed())
    }

    /// Whether `element` can be collapsed.
    pub fn is_collapsible(&self, element: &T) -> Result<bool, TreeError> {
        Ok(self.node(element)?.is_collapsible())
    }

    /// Install or remove the filter predicate.
    pub fn set_filter(&mut self, filter: Option<TreeFilter<T, F>>) {
        self.model.set_filter(filter);
    }

    /// Expanded collapsible payloads, in pre-order.
    #[must_use]
    pub fn view_state(&self) -> TreeViewState<T> {
        let mut expanded = Vec::new();
        let mut stack = vec![NodeId::ROOT];
        while let Some(id) = stack.pop() {
            let Some(node) = self.model.node(id) else {
                continue;
            };
            if id != NodeId::ROOT && node.is_collapsible() && !node.is_collapsed() {
                expanded.push(node.element.clone());
            }
            stack.extend(node.children.iter().rev().copied());
        }
        TreeViewState { expanded }
    }

    /// Model invariants, plus: every non-root node reachable from the root
    /// has exactly one table entry and it points at that node, and no entry
    /// points anywhere else.
    pub fn check_invariants(&self) -> Result<(), TreeError> {
        self.model.check_invariants()?;
        let violation = |node| TreeError::InvariantViolation {
            node,
            kind: InvariantKind::KeyTable,
        };
        let mut keyed = 0;
        let mut stack = vec![NodeId::ROOT];
        while let Some(id) = stack.pop() {
            let node = self.model.get(id)?;
            if id != NodeId::ROOT {
                if self.table.get(&node.element) != Some(&id) {
                    return Err(violation(id));
                }
                keyed += 1;
            }
            stack.extend(node.children.iter().copied());
        }
        if keyed != self.table.len() {
            let dead = self
                .table
                .values()
                .copied()
                .find(|&id| self.model.location(id).is_err())
                .unwrap_or(NodeId::ROOT);
            return Err(violation(dead));
        }
        Ok(())
    }

    /// Wrap the caller's hooks with table maintenance and run `op`.
    ///
    /// Creation points the payload at the new node. Deletion drops the entry
    /// only while it still points at the deleted node, so a payload created
    /// again elsewhere (by this operation or an earlier one) stays keyed.
    fn tracked<R>(
        model: &mut TreeModel<T, F, S, M>,
        table: &mut HashMap<T, NodeId>,
        hooks: SpliceHooks<'_, T, F>,
        op: impl FnOnce(&mut TreeModel<T, F, S, M>, SpliceHooks<'_, T, F>) -> R,
    ) -> R {
        let SpliceHooks {
            on_create: mut user_create,
            on_delete: mut user_delete,
        } = hooks;
        let table = RefCell::new(table);
        let mut on_create = |node: &TreeNode<T, F>| {
            if node.id != NodeId::ROOT {
                table.borrow_mut().insert(node.element.clone(), node.id);
            }
            if let Some(hook) = user_create.as_mut() {
                hook(node);
            }
        };
        let mut on_delete = |node: &TreeNode<T, F>| {
            if node.id != NodeId::ROOT {
                let mut table = table.borrow_mut();
                if table.get(&node.element) == Some(&node.id) {
                    table.remove(&node.element);
                }
            }
            if let Some(hook) = user_delete.as_mut() {
                hook(node);
            }
        };
        op(
            model,
            SpliceHooks {
                on_create: Some(&mut on_create),
                on_delete: Some(&mut on_delete),
            },
        )
    }
}

impl<T, F, S, M> KeyedTree<T, F, S, M>
where
    T: Eq + Hash + Clone + fmt::Debug,
    S: ListSink,
{
    /// Collapse, expand or toggle (`None`) `element`.
    pub fn set_collapsed(&mut self, element: &T, collapsed: Option<bool>, recursive: bool) -> Result<bool, TreeError> {
        let id = self.node_id(element)?;
        self.model.set_node_collapsed(id, collapsed, recursive)
    }

    /// Change (and pin) whether `element` can be collapsed.
    pub fn set_collapsible(&mut self, element: &T, collapsible: Option<bool>) -> Result<bool, TreeError> {
        let id = self.node_id(element)?;
        self.model.set_node_collapsible(id, collapsible)
    }

    /// Expand every collapsed ancestor of `element`.
    pub fn expand_to(&mut self, element: &T) -> Result<bool, TreeError> {
        let id = self.node_id(element)?;
        self.model.expand_to_node(id)
    }

    /// Re-emit the row of `element`.
    pub fn rerender(&mut self, element: &T) -> Result<(), TreeError> {
        let id = self.node_id(element)?;
        self.model.rerender_node(id)
    }

    /// Re-evaluate the filter predicate; see [`TreeModel::filter`].
    pub fn filter(&mut self, visible_only: bool) -> Result<usize, TreeError> {
        self.model.filter(visible_only)
    }

    /// Restore expansion from `state`: collapsible nodes listed there are
    /// expanded, every other collapsible node is collapsed. Payloads missing
    /// from the tree are ignored.
    ///
    /// Returns the number of nodes whose state changed. The projection is
    /// rebuilt in one splice.
    pub fn apply_view_state(&mut self, state: &TreeViewState<T>) -> Result<usize, TreeError> {
        let expanded: HashSet<&T> = state.expanded.iter().collect();
        let mut updates = Vec::new();
        for (element, &id) in &self.table {
            let node = self.model.get(id)?;
            let collapsed = !expanded.contains(element);
            if node.is_collapsible() && node.is_collapsed() != collapsed {
                updates.push((id, collapsed));
            }
        }
        if updates.is_empty() {
            return Ok(0);
        }
        updates.sort_unstable_by_key(|&(id, _)| id);

        self.model.events.pause();
        let result = self.apply_collapse_updates(&updates);
        self.model.events.resume();
        result.map(|()| updates.len())
    }

    fn apply_collapse_updates(&mut self, updates: &[(NodeId, bool)]) -> Result<(), TreeError> {
        for &(id, collapsed) in updates {
            self.model.apply_collapse_flags(
                id,
                CollapseUpdate::Collapsed {
                    collapsed,
                    recursive: false,
                },
            )?;
        }
        self.model.rebuild_projection()?;
        Ok(())
    }
}

impl<T, F, S> KeyedTree<T, F, S, Index>
where
    T: Eq + Hash + Clone + fmt::Debug,
    S: ListSink,
{
    /// Replace `delete_count` children of `parent` starting at `start`.
    pub fn splice_children<I>(
        &mut self,
        parent: &T,
        start: usize,
        delete_count: usize,
        children: I,
        hooks: SpliceHooks<'_, T, F>,
    ) -> Result<(), TreeError>
    where
        I: IntoIterator<Item = TreeElement<T>>,
    {
        let mut location = self.location(parent)?;
        location.push(start);
        Self::tracked(&mut self.model, &mut self.table, hooks, |model, hooks| {
            model.splice(&location, delete_count, children, hooks)
        })
    }

    /// Replace all children of `parent`.
    ///
    /// Descriptions whose payload is already in the tree keep that node's
    /// collapsible and collapsed state unless they set it themselves.
    pub fn set_children(
        &mut self,
        parent: &T,
        mut children: Vec<TreeElement<T>>,
        hooks: SpliceHooks<'_, T, F>,
    ) -> Result<(), TreeError> {
        let len = self.node(parent)?.children.len();
        self.preserve_collapse_state(&mut children);
        self.splice_children(parent, 0, len, children, hooks)
    }

    /// Remove every node and replace the root payload with `root`.
    pub fn reset(&mut self, root: T, hooks: SpliceHooks<'_, T, F>) -> Result<(), TreeError> {
        let len = self.model.get(NodeId::ROOT)?.children.len();
        Self::tracked(&mut self.model, &mut self.table, hooks, |model, hooks| {
            model.splice(&[0], len, Vec::new(), hooks)
        })?;
        self.table.clear();
        self.model.get_mut(NodeId::ROOT)?.element = root;
        Ok(())
    }

    fn preserve_collapse_state(&self, children: &mut [TreeElement<T>]) {
        let mut stack: Vec<&mut TreeElement<T>> = children.iter_mut().collect();
        while let Some(description) = stack.pop() {
            if let Some(node) = self
                .table
                .get(&description.element)
                .and_then(|&id| self.model.node(id))
            {
                if description.collapsible.is_none() {
                    description.collapsible = Some(node.is_collapsible());
                }
                if description.collapsed.is_none() {
                    description.collapsed = Some(node.flags.contains(NodeFlags::COLLAPSED));
                }
            }
            stack.extend(description.children.iter_mut());
        }
    }
}

impl<T, F, S> KeyedTree<T, F, S, Flex>
where
    T: Eq + Hash + Clone + fmt::Debug,
    S: ListSink,
{
    /// Start editing the children of `element` in place.
    pub fn edit(&mut self, element: &T) -> Result<FlexEdit<'_, T, F, S>, TreeError> {
        let id = self.node_id(element)?;
        self.model.edit(id)
    }

    /// Refresh the stale subtree at `element`; see [`TreeModel::refresh`].
    pub fn refresh(&mut self, element: &T, hooks: SpliceHooks<'_, T, F>) -> Result<bool, TreeError> {
        let id = self.node_id(element)?;
        Self::tracked(&mut self.model, &mut self.table, hooks, |model, hooks| {
            model.refresh(id, hooks)
        })
    }
}
