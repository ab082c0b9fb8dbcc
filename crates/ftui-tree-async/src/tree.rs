#![forbid(unsafe_code)]

//! Keyed tree whose children are fetched on demand.
//!
//! [`AsyncDataTree`] wraps a [`KeyedIndexTree`] and fills it from a
//! [`ChildrenProvider`]. Each element has at most one refresh in flight; the
//! refresh is a shared future stored per element (its pending token) so every
//! caller interested in that element awaits the same fetch.
//!
//! # Ordering
//!
//! `expand`, `collapse` and `toggle_collapsed` await, in order:
//!
//! 1. the root's pending refresh (initial load),
//! 2. the element's pending refresh,
//! 3. the state change itself (synchronous),
//! 4. any refresh the state change started.
//!
//! A caller therefore never observes an element it expanded with its
//! children still loading.
//!
//! # Failure
//!
//! A failed fetch clears the token, collapses the element again and
//! delivers the error to every awaiter. Fetches cannot be cancelled.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::rc::{Rc, Weak};

use futures::future::{FutureExt, LocalBoxFuture, Shared, join_all};
use ftui_tree::{
    KeyedIndexTree, KeyedTree, ListSink, NodeId, SpliceHooks, TreeElement, TreeError, TreeEvent,
    TreeOptions,
};

use crate::error::AsyncTreeError;
use crate::provider::{Children, ChildrenProvider};

/// A refresh in flight. Cloning shares the same fetch.
pub type Refresh = Shared<LocalBoxFuture<'static, Result<(), AsyncTreeError>>>;

struct Token {
    id: u64,
    refresh: Refresh,
}

struct Inner<T, P, S> {
    tree: RefCell<KeyedIndexTree<T, (), S>>,
    provider: P,
    pending: RefCell<HashMap<T, Token>>,
    loaded: RefCell<HashSet<T>>,
    generation: Cell<u64>,
    next_token: Cell<u64>,
}

/// A keyed tree with lazily fetched children.
///
/// Handles are cheap to clone and share one tree. All futures run on a
/// single-threaded executor.
pub struct AsyncDataTree<T, P, S = Vec<NodeId>> {
    inner: Rc<Inner<T, P, S>>,
}

impl<T, P, S> Clone for AsyncDataTree<T, P, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T, P, S> fmt::Debug for AsyncDataTree<T, P, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncDataTree")
            .field("pending", &self.inner.pending.borrow().len())
            .field("loaded", &self.inner.loaded.borrow().len())
            .field("generation", &self.inner.generation.get())
            .finish_non_exhaustive()
    }
}

fn upgrade<T, P, S>(weak: &Weak<Inner<T, P, S>>) -> Result<Rc<Inner<T, P, S>>, AsyncTreeError> {
    weak.upgrade().ok_or(AsyncTreeError::Disposed)
}

impl<T, P, S> AsyncDataTree<T, P, S>
where
    T: Eq + Hash + Clone + fmt::Debug + 'static,
    P: ChildrenProvider<T> + 'static,
    S: ListSink + 'static,
{
    /// Create a tree holding only `root`. Nothing is fetched until
    /// [`set_input`](Self::set_input) or
    /// [`update_children`](Self::update_children) runs.
    pub fn new(root: T, provider: P, sink: S, options: TreeOptions) -> Self {
        Self {
            inner: Rc::new(Inner {
                tree: RefCell::new(KeyedTree::new(root, sink, options)),
                provider,
                pending: RefCell::new(HashMap::new()),
                loaded: RefCell::new(HashSet::new()),
                generation: Cell::new(0),
                next_token: Cell::new(0),
            }),
        }
    }

    /// The children provider.
    #[must_use]
    pub fn provider(&self) -> &P {
        &self.inner.provider
    }

    /// Run `f` with read access to the keyed tree.
    ///
    /// `f` must not call back into this handle's mutating operations.
    pub fn with_tree<R>(&self, f: impl FnOnce(&KeyedIndexTree<T, (), S>) -> R) -> R {
        f(&self.inner.tree.borrow())
    }

    /// Take all delivered tree events.
    pub fn drain_events(&self) -> Vec<TreeEvent> {
        self.inner.tree.borrow_mut().drain_events()
    }

    /// Whether `element` is loaded in the tree.
    #[must_use]
    pub fn has_element(&self, element: &T) -> bool {
        self.inner.tree.borrow().has_element(element)
    }

    /// Effective collapse state of `element`.
    pub fn is_collapsed(&self, element: &T) -> Result<bool, AsyncTreeError> {
        Ok(self.inner.tree.borrow().is_collapsed(element)?)
    }

    /// Whether a refresh of `element` is in flight.
    #[must_use]
    pub fn is_refreshing(&self, element: &T) -> bool {
        self.inner.pending.borrow().contains_key(element)
    }

    /// Replace the root with `root` and load its children.
    ///
    /// Refreshes still in flight for the previous input finish without
    /// touching the tree.
    pub async fn set_input(&self, root: T) -> Result<(), AsyncTreeError> {
        let inner = &self.inner;
        inner.generation.set(inner.generation.get() + 1);
        inner.pending.borrow_mut().clear();
        inner.loaded.borrow_mut().clear();
        inner
            .tree
            .borrow_mut()
            .reset(root.clone(), SpliceHooks::none())?;
        tracing::debug!(root = ?root, generation = inner.generation.get(), "tree input replaced");
        self.update_children(&root, false).await
    }

    /// Fetch the children of `element` again, joining a refresh already in
    /// flight.
    ///
    /// Loaded children keep their subtrees and collapse state. With
    /// `recursive`, expanded children are fetched again as well; otherwise
    /// only expanded children never loaded before are fetched.
    ///
    /// The returned future does not borrow the tree and may outlive it, in
    /// which case it resolves to [`AsyncTreeError::Disposed`].
    pub fn update_children(&self, element: &T, recursive: bool) -> Refresh {
        self.inner.refresh(element.clone(), recursive)
    }

    /// Expand `element` (and with `recursive` its collapsible descendants),
    /// loading children that are not loaded yet. Returns whether any state
    /// changed.
    pub async fn expand(&self, element: &T, recursive: bool) -> Result<bool, AsyncTreeError> {
        self.change_collapse(element, Some(false), recursive).await
    }

    /// Collapse `element` (and with `recursive` its collapsible descendants).
    pub async fn collapse(&self, element: &T, recursive: bool) -> Result<bool, AsyncTreeError> {
        self.change_collapse(element, Some(true), recursive).await
    }

    /// Flip the collapse state of `element`.
    pub async fn toggle_collapsed(&self, element: &T, recursive: bool) -> Result<bool, AsyncTreeError> {
        self.change_collapse(element, None, recursive).await
    }

    async fn change_collapse(
        &self,
        element: &T,
        collapsed: Option<bool>,
        recursive: bool,
    ) -> Result<bool, AsyncTreeError> {
        let root = self.with_tree(|tree| tree.model().root_element().clone());
        self.await_pending(&root).await?;
        self.await_pending(element).await?;

        let changed = self
            .inner
            .tree
            .borrow_mut()
            .set_collapsed(element, collapsed, recursive)?;
        let targets = self.inner.load_targets(element, changed, recursive)?;
        if targets.is_empty() {
            return Ok(changed);
        }

        tracing::debug!(element = ?element, count = targets.len(), "loading children after expansion");
        let refreshes: Vec<Refresh> = targets
            .into_iter()
            .map(|target| self.inner.refresh(target, false))
            .collect();
        for result in join_all(refreshes).await {
            result?;
        }
        Ok(changed)
    }

    async fn await_pending(&self, element: &T) -> Result<(), AsyncTreeError> {
        let refresh = self
            .inner
            .pending
            .borrow()
            .get(element)
            .map(|token| token.refresh.clone());
        match refresh {
            Some(refresh) => refresh.await,
            None => Ok(()),
        }
    }
}

impl<T, P, S> Inner<T, P, S>
where
    T: Eq + Hash + Clone + fmt::Debug + 'static,
    P: ChildrenProvider<T> + 'static,
    S: ListSink + 'static,
{
    /// The pending refresh of `element`, started if there is none.
    ///
    /// The token is stored before the future is first polled and removed by
    /// the future itself when it completes.
    fn refresh(self: &Rc<Self>, element: T, recursive: bool) -> Refresh {
        if let Some(token) = self.pending.borrow().get(&element) {
            return token.refresh.clone();
        }

        let id = self.next_token.get();
        self.next_token.set(id + 1);
        let weak = Rc::downgrade(self);
        let key = element.clone();
        let refresh = async move {
            let result = Self::run_refresh(&weak, &element, recursive).await;
            if let Some(inner) = weak.upgrade() {
                let mut pending = inner.pending.borrow_mut();
                if pending.get(&element).is_some_and(|token| token.id == id) {
                    pending.remove(&element);
                }
            }
            result
        }
        .boxed_local()
        .shared();

        self.pending.borrow_mut().insert(
            key,
            Token {
                id,
                refresh: refresh.clone(),
            },
        );
        refresh
    }

    async fn run_refresh(weak: &Weak<Self>, element: &T, recursive: bool) -> Result<(), AsyncTreeError> {
        let (generation, children) = {
            let inner = upgrade(weak)?;
            inner.tree.borrow().node_id(element)?;
            let children = if inner.provider.has_children(element) {
                inner.provider.get_children(element)
            } else {
                Children::Ready(Vec::new())
            };
            (inner.generation.get(), children)
        };

        tracing::debug!(element = ?element, "fetching children");
        let fetched = children.resolve().await;

        let follow_up = {
            let inner = upgrade(weak)?;
            if inner.generation.get() != generation {
                tracing::debug!(element = ?element, "discarding children fetched for a replaced input");
                return Ok(());
            }
            let children = match fetched {
                Ok(children) => children,
                Err(error) => {
                    tracing::warn!(element = ?element, error = %error, "children fetch failed");
                    inner.revert_expansion(element)?;
                    return Err(error.into());
                }
            };
            let follow_up = inner.apply_children(element, children, recursive)?;
            follow_up
                .into_iter()
                .map(|child| inner.refresh(child, recursive))
                .collect::<Vec<_>>()
        };

        for result in join_all(follow_up).await {
            result?;
        }
        Ok(())
    }

    /// Replace the children of `element` with `children`. Returns the
    /// children that need a fetch of their own.
    ///
    /// Children already present keep their nodes (and loaded subtrees);
    /// only added and removed children are spliced. A reordering replaces
    /// the whole child list.
    fn apply_children(&self, element: &T, children: Vec<T>, recursive: bool) -> Result<Vec<T>, AsyncTreeError> {
        let mut tree = self.tree.borrow_mut();
        if !tree.has_element(element) {
            tracing::debug!(element = ?element, "element removed while its children were loading");
            return Ok(Vec::new());
        }

        let wanted: HashSet<&T> = children.iter().collect();
        let current: Vec<T> = tree
            .child_elements(element)?
            .into_iter()
            .cloned()
            .collect();
        let kept: Vec<&T> = current.iter().filter(|child| wanted.contains(child)).collect();
        let present: HashSet<&T> = kept.iter().copied().collect();
        let in_order = children
            .iter()
            .filter(|child| present.contains(child))
            .eq(kept.iter().copied());

        if in_order {
            self.splice_changes(&mut tree, element, &current, &wanted, &children)?;
        } else {
            let descriptions = children
                .iter()
                .map(|child| self.describe_child(&tree, child))
                .collect::<Result<Vec<_>, _>>()?;
            tree.set_children(element, descriptions, SpliceHooks::none())?;
        }

        let mut loaded = self.loaded.borrow_mut();
        loaded.retain(|payload| tree.has_element(payload));
        loaded.insert(element.clone());
        tracing::debug!(element = ?element, count = children.len(), reordered = !in_order, "children loaded");

        let mut follow_up = Vec::new();
        for child in children {
            if self.provider.has_children(&child)
                && !tree.is_collapsed(&child)?
                && (recursive || !loaded.contains(&child))
            {
                follow_up.push(child);
            }
        }
        Ok(follow_up)
    }

    /// Remove children missing from `wanted` and insert new ones between
    /// the kept children, which stay in their relative order.
    fn splice_changes(
        &self,
        tree: &mut KeyedIndexTree<T, (), S>,
        element: &T,
        current: &[T],
        wanted: &HashSet<&T>,
        children: &[T],
    ) -> Result<(), AsyncTreeError> {
        let mut index = current.len();
        while index > 0 {
            if wanted.contains(&current[index - 1]) {
                index -= 1;
                continue;
            }
            let end = index;
            while index > 0 && !wanted.contains(&current[index - 1]) {
                index -= 1;
            }
            tree.splice_children(element, index, end - index, Vec::new(), SpliceHooks::none())?;
        }

        let mut kept = current.iter().filter(|child| wanted.contains(child)).peekable();
        let mut index = 0;
        let mut batch = Vec::new();
        for child in children {
            if kept.peek() == Some(&child) {
                kept.next();
                if !batch.is_empty() {
                    let inserted = batch.len();
                    tree.splice_children(element, index, 0, std::mem::take(&mut batch), SpliceHooks::none())?;
                    index += inserted;
                }
                self.update_kept(tree, child)?;
                index += 1;
            } else {
                batch.push(self.describe_child(tree, child)?);
            }
        }
        if !batch.is_empty() {
            tree.splice_children(element, index, 0, batch, SpliceHooks::none())?;
        }
        Ok(())
    }

    /// Description of a child about to be inserted. A payload already in the
    /// tree elsewhere brings its loaded subtree along.
    fn describe_child(&self, tree: &KeyedIndexTree<T, (), S>, child: &T) -> Result<TreeElement<T>, TreeError> {
        let has_children = self.provider.has_children(child);
        let existing = tree
            .node(child)
            .ok()
            .map(|node| (node.is_collapsible(), node.is_collapsed()));
        let description = match existing {
            Some(_) => describe_loaded(tree, child)?,
            None => TreeElement::new(child.clone()),
        }
        .with_collapsible(has_children);
        Ok(match existing {
            _ if !has_children => description,
            Some((true, collapsed)) => description.with_collapsed(collapsed),
            _ => description.with_collapsed(self.provider.collapse_by_default(child)),
        })
    }

    /// Follow a kept child's has-children answer.
    fn update_kept(&self, tree: &mut KeyedIndexTree<T, (), S>, child: &T) -> Result<(), TreeError> {
        let has_children = self.provider.has_children(child);
        let was_collapsible = tree.is_collapsible(child)?;
        if was_collapsible != has_children {
            tree.set_collapsible(child, Some(has_children))?;
        }
        if has_children && !was_collapsible {
            tree.set_collapsed(child, Some(self.provider.collapse_by_default(child)), false)?;
        }
        Ok(())
    }

    /// Collapse `element` after its fetch failed.
    fn revert_expansion(&self, element: &T) -> Result<(), AsyncTreeError> {
        let mut tree = self.tree.borrow_mut();
        if tree.has_element(element) && tree.node_id(element)? != NodeId::ROOT {
            tree.set_collapsed(element, Some(true), false)?;
        }
        Ok(())
    }

    /// Elements to fetch after a collapse change on `element`.
    ///
    /// The element itself when it ended up expanded and is either unloaded or
    /// (not the root) just changed with `should_refresh_children`; with
    /// `recursive`, also expanded descendants never loaded.
    fn load_targets(&self, element: &T, changed: bool, recursive: bool) -> Result<Vec<T>, AsyncTreeError> {
        let tree = self.tree.borrow();
        let loaded = self.loaded.borrow();
        let model = tree.model();
        let wants_load = |payload: &T, node_changed: bool| -> Result<bool, AsyncTreeError> {
            let expanded = tree.node_id(payload)? == NodeId::ROOT || !tree.is_collapsed(payload)?;
            Ok(expanded
                && self.provider.has_children(payload)
                && (!loaded.contains(payload)
                    || (node_changed && self.provider.should_refresh_children(payload))))
        };

        let mut targets = Vec::new();
        let refetch = changed && tree.node_id(element)? != NodeId::ROOT;
        if wants_load(element, refetch)? {
            targets.push(element.clone());
        }
        if !recursive {
            return Ok(targets);
        }

        let mut stack: Vec<NodeId> = tree.node(element)?.children().to_vec();
        while let Some(id) = stack.pop() {
            let Some(node) = model.node(id) else {
                continue;
            };
            if node.is_collapsed() {
                continue;
            }
            if wants_load(node.element(), false)? {
                targets.push(node.element().clone());
            }
            stack.extend(node.children().iter().copied());
        }
        Ok(targets)
    }
}

/// Description of the loaded subtree at `element`, carrying the collapse
/// state of every node below it.
fn describe_loaded<T, S>(tree: &KeyedIndexTree<T, (), S>, element: &T) -> Result<TreeElement<T>, TreeError>
where
    T: Eq + Hash + Clone + fmt::Debug,
{
    let model = tree.model();
    let top = tree.node_id(element)?;

    // Pre-order walk recording each node's parent slot.
    let mut order: Vec<(NodeId, Option<usize>)> = Vec::new();
    let mut stack = vec![(top, None)];
    while let Some((id, parent)) = stack.pop() {
        let slot = order.len();
        order.push((id, parent));
        let node = model.node(id).ok_or(TreeError::UnknownNode { id })?;
        stack.extend(node.children().iter().rev().map(|&child| (child, Some(slot))));
    }

    // Reverse pre-order builds every subtree before its parent; siblings
    // arrive last-first.
    let mut built: Vec<Vec<TreeElement<T>>> = order.iter().map(|_| Vec::new()).collect();
    let mut description = None;
    for (slot, &(id, parent)) in order.iter().enumerate().rev() {
        let node = model.node(id).ok_or(TreeError::UnknownNode { id })?;
        let mut children = std::mem::take(&mut built[slot]);
        children.reverse();
        let mut current = TreeElement::new(node.element().clone()).with_children(children);
        if id != top {
            current = current.with_collapsible(node.is_collapsible());
            if node.is_collapsible() {
                current = current.with_collapsed(node.is_collapsed());
            }
        }
        match parent {
            Some(parent) => built[parent].push(current),
            None => description = Some(current),
        }
    }
    description.ok_or(TreeError::UnknownNode { id: top })
}
