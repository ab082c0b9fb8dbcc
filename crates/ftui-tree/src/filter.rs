#![forbid(unsafe_code)]

//! Predicate filtering with automatic reveal of hidden matches.
//!
//! A node passes when its predicate verdict is visible and it either carries
//! a match tag or has a passing child. Nodes that fail are left out of the
//! projection together with their subtree.
//!
//! Filtering never runs implicitly on predicate changes: install a predicate
//! with [`set_filter`](TreeModel::set_filter), then call
//! [`filter`](TreeModel::filter). Structural edits evaluate the predicate for
//! the nodes they build.

use crate::error::TreeError;
use crate::event::TreeEvent;
use crate::model::{CollapseUpdate, TreeModel};
use crate::node::{NodeFlags, NodeId, TreeNode};
use crate::options::TreeFilter;
use crate::sink::ListSink;

impl<T, F, S, M> TreeModel<T, F, S, M> {
    /// Install or remove the filter predicate. Takes effect on the next
    /// [`filter`](Self::filter) call and for nodes built afterwards.
    pub fn set_filter(&mut self, filter: Option<TreeFilter<T, F>>) {
        self.filter = filter;
    }

    /// Whether a predicate is installed.
    #[must_use]
    pub fn has_filter(&self) -> bool {
        self.filter.is_some()
    }

    /// Evaluate the predicate for one node, using its children's current
    /// verdicts.
    pub(crate) fn evaluate_filter(&mut self, id: NodeId) -> Result<(), TreeError> {
        if id == NodeId::ROOT {
            return Ok(());
        }
        let node = self.get(id)?;
        let (visibility, tag, pass) = match self.filter.as_ref() {
            None => (true, None, true),
            Some(filter) => {
                let result = filter(&node.element);
                let pass = result.visibility
                    && (result.tag.is_some() || self.any_child_passes(node));
                (result.visibility, result.tag, pass)
            }
        };
        let node = self.get_mut(id)?;
        node.set_flag(NodeFlags::FILTER_VISIBLE, visibility);
        node.set_flag(NodeFlags::FILTER_PASS, pass);
        node.filter_tag = tag;
        Ok(())
    }

    /// Re-derive the pass verdict of `from` and its ancestors after their
    /// children changed, without calling the predicate again.
    ///
    /// Returns whether any verdict flipped.
    pub(crate) fn update_ancestor_verdicts(&mut self, from: NodeId) -> Result<bool, TreeError> {
        if self.filter.is_none() {
            return Ok(false);
        }
        let mut flipped = false;
        let mut current = Some(from);
        while let Some(id) = current {
            if id == NodeId::ROOT {
                break;
            }
            let node = self.get(id)?;
            let pass = node.flags.contains(NodeFlags::FILTER_VISIBLE)
                && (node.filter_tag.is_some() || self.any_child_passes(node));
            if pass == node.passes_filter() {
                break;
            }
            current = node.parent;
            self.get_mut(id)?.set_flag(NodeFlags::FILTER_PASS, pass);
            flipped = true;
        }
        Ok(flipped)
    }

    fn any_child_passes(&self, node: &TreeNode<T, F>) -> bool {
        node.children
            .iter()
            .any(|child| self.nodes.get(child).is_some_and(TreeNode::passes_filter))
    }
}

impl<T, F, S: ListSink, M> TreeModel<T, F, S, M> {
    /// Re-evaluate the predicate and rebuild the projection in one splice.
    ///
    /// With `visible_only`, nodes under a collapsed ancestor are skipped and
    /// keep their previous verdict. Otherwise the whole tree is evaluated,
    /// and every match hidden under a collapsed ancestor is revealed by
    /// expanding those ancestors (non-recursively, one
    /// [`TreeEvent::CollapseStateChanged`] each).
    ///
    /// Returns the number of rows in the new projection.
    pub fn filter(&mut self, visible_only: bool) -> Result<usize, TreeError> {
        #[cfg(feature = "tracing")]
        let _span = tracing::debug_span!("tree_filter", visible_only).entered();

        let hidden_matches = self.evaluate_tree(visible_only)?;

        self.events.pause();
        let result = self.reveal_and_rebuild(&hidden_matches);
        self.events.resume();
        let rows = result?;

        #[cfg(feature = "tracing")]
        tracing::debug!(rows, revealed = hidden_matches.len(), "tree refiltered");

        self.events.emit(TreeEvent::Refiltered { rows });
        Ok(rows)
    }

    /// Post-order evaluation walk. Returns matches found below a collapsed
    /// ancestor (only when walking the whole tree).
    fn evaluate_tree(&mut self, visible_only: bool) -> Result<Vec<NodeId>, TreeError> {
        enum Step {
            Enter(NodeId, bool),
            Exit(NodeId, bool),
        }
        let mut hidden_matches = Vec::new();
        let mut stack = vec![Step::Enter(NodeId::ROOT, false)];
        while let Some(step) = stack.pop() {
            match step {
                Step::Enter(id, under_collapsed) => {
                    let node = self.get(id)?;
                    let collapsed = id != NodeId::ROOT && node.is_collapsed();
                    stack.push(Step::Exit(id, under_collapsed));
                    if visible_only && collapsed {
                        continue;
                    }
                    let child_under = under_collapsed || collapsed;
                    for &child in node.children.iter().rev() {
                        stack.push(Step::Enter(child, child_under));
                    }
                }
                Step::Exit(id, under_collapsed) => {
                    self.evaluate_filter(id)?;
                    if !visible_only && under_collapsed {
                        let node = self.get(id)?;
                        if node.passes_filter() && node.filter_tag.is_some() {
                            hidden_matches.push(id);
                        }
                    }
                }
            }
        }
        Ok(hidden_matches)
    }

    fn reveal_and_rebuild(&mut self, hidden_matches: &[NodeId]) -> Result<usize, TreeError> {
        for &id in hidden_matches {
            let mut path = Vec::new();
            let mut reachable = true;
            let mut current = self.get(id)?.parent;
            while let Some(ancestor) = current {
                if ancestor == NodeId::ROOT {
                    break;
                }
                let node = self.get(ancestor)?;
                if !node.passes_filter() {
                    reachable = false;
                    break;
                }
                if node.is_collapsed() {
                    path.push(ancestor);
                }
                current = node.parent;
            }
            if !reachable {
                continue;
            }
            for ancestor in path {
                self.apply_collapse_flags(
                    ancestor,
                    CollapseUpdate::Collapsed {
                        collapsed: false,
                        recursive: false,
                    },
                )?;
            }
        }
        self.rebuild_projection()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::TreeElement;
    use crate::model::tests::rows;
    use crate::model::{IndexTreeModel, SpliceHooks};
    use crate::options::{FilterResult, TreeOptions};
    use crate::sink::RecordingSink;

    fn even(value: &i32) -> FilterResult<()> {
        FilterResult::from_match(value % 2 == 0)
    }

    fn scenario_d() -> IndexTreeModel<i32> {
        let mut tree: IndexTreeModel<i32> = IndexTreeModel::new(-1, Vec::new(), TreeOptions::new());
        tree.splice(
            &[0],
            0,
            vec![TreeElement::new(0).with_children((1..=6).map(TreeElement::new).collect())],
            SpliceHooks::none(),
        )
        .expect("build");
        tree
    }

    #[test]
    fn scenario_d_even_only_then_clear() {
        let mut tree = scenario_d();
        tree.set_filter(Some(Box::new(even)));
        assert_eq!(tree.filter(false).expect("filter"), 4);
        assert_eq!(rows(&tree, tree.sink()), vec![0, 2, 4, 6]);
        assert_eq!(tree.node_at(&[0]).expect("r").visible_count(), 4);
        tree.check_invariants().expect("invariants");

        tree.set_filter(None);
        assert_eq!(tree.filter(false).expect("clear"), 7);
        assert_eq!(rows(&tree, tree.sink()), vec![0, 1, 2, 3, 4, 5, 6]);
        tree.check_invariants().expect("invariants");
    }

    #[test]
    fn refilter_replaces_projection_in_one_splice() {
        let mut tree: IndexTreeModel<i32, (), RecordingSink> =
            IndexTreeModel::new(-1, RecordingSink::new(), TreeOptions::new());
        tree.splice(
            &[0],
            0,
            (1..=4).map(TreeElement::new).collect::<Vec<_>>(),
            SpliceHooks::none(),
        )
        .expect("build");
        let _ = tree.sink.take_log();
        tree.set_filter(Some(Box::new(even)));
        tree.filter(true).expect("filter");
        let log = tree.sink.take_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].start, 0);
        assert_eq!(log[0].delete_count, 4);
        assert_eq!(log[0].inserted.len(), 2);
        assert_eq!(tree.drain_events().last(), Some(&TreeEvent::Refiltered { rows: 2 }));
    }

    #[test]
    fn hidden_match_is_revealed() {
        let mut tree: IndexTreeModel<i32> = IndexTreeModel::new(-1, Vec::new(), TreeOptions::new());
        tree.splice(
            &[0],
            0,
            vec![
                TreeElement::new(1)
                    .with_collapsed(true)
                    .child(TreeElement::new(3).with_collapsed(true).child(TreeElement::new(4))),
                TreeElement::new(5).with_collapsed(true).child(TreeElement::new(7)),
            ],
            SpliceHooks::none(),
        )
        .expect("build");
        assert_eq!(rows(&tree, tree.sink()), vec![1, 5]);
        tree.drain_events();

        tree.set_filter(Some(Box::new(even)));
        assert_eq!(tree.filter(false).expect("filter"), 3);
        assert_eq!(rows(&tree, tree.sink()), vec![1, 3, 4]);
        assert!(!tree.is_collapsed(&[0]).expect("revealed"));
        assert!(!tree.is_collapsed(&[0, 0]).expect("revealed"));
        assert!(tree.is_collapsed(&[1]).expect("no match below"));

        let events = tree.drain_events();
        let changed = events
            .iter()
            .filter(|event| matches!(event, TreeEvent::CollapseStateChanged { .. }))
            .count();
        assert_eq!(changed, 2);
        assert!(matches!(events.last(), Some(TreeEvent::Refiltered { rows: 3 })));
        tree.check_invariants().expect("invariants");
    }

    #[test]
    fn visible_only_does_not_reveal() {
        let mut tree: IndexTreeModel<i32> = IndexTreeModel::new(-1, Vec::new(), TreeOptions::new());
        tree.splice(
            &[0],
            0,
            vec![
                TreeElement::new(2).with_collapsed(true).child(TreeElement::new(4)),
                TreeElement::new(3),
            ],
            SpliceHooks::none(),
        )
        .expect("build");
        tree.set_filter(Some(Box::new(even)));
        assert_eq!(tree.filter(true).expect("filter"), 1);
        assert!(tree.is_collapsed(&[0]).expect("still collapsed"));
        tree.set_collapsed(&[0], Some(false), false).expect("expand");
        assert_eq!(rows(&tree, tree.sink()), vec![2, 4]);
        tree.check_invariants().expect("invariants");
    }

    #[test]
    fn invisible_verdict_hides_matching_descendants() {
        let mut tree: IndexTreeModel<i32> = IndexTreeModel::new(-1, Vec::new(), TreeOptions::new());
        tree.splice(
            &[0],
            0,
            vec![TreeElement::new(9).child(TreeElement::new(2)), TreeElement::new(4)],
            SpliceHooks::none(),
        )
        .expect("build");
        tree.set_filter(Some(Box::new(|value: &i32| {
            if *value == 9 {
                FilterResult::hidden()
            } else {
                FilterResult::from_match(value % 2 == 0)
            }
        })));
        tree.filter(false).expect("filter");
        assert_eq!(rows(&tree, tree.sink()), vec![4]);
        tree.check_invariants().expect("invariants");
    }

    #[test]
    fn filter_tags_are_recorded() {
        let mut tree: IndexTreeModel<&str, usize> =
            IndexTreeModel::new("", Vec::new(), TreeOptions::new());
        tree.splice(
            &[0],
            0,
            vec![TreeElement::new("src").child(TreeElement::new("main.rs"))],
            SpliceHooks::none(),
        )
        .expect("build");
        tree.set_filter(Some(Box::new(|name: &&str| match name.find("main") {
            Some(offset) => FilterResult::matched(offset),
            None => FilterResult::recurse(),
        })));
        tree.filter(false).expect("filter");
        assert_eq!(tree.node_at(&[0, 0]).expect("file").filter_tag(), Some(&0));
        assert_eq!(tree.node_at(&[0]).expect("dir").filter_tag(), None);
        assert_eq!(tree.size(), 2);
    }

    #[test]
    fn splice_under_filter_updates_ancestor_verdicts() {
        let mut tree = scenario_d();
        tree.splice(&[1], 0, vec![TreeElement::new(11)], SpliceHooks::none())
            .expect("odd top-level");
        tree.set_filter(Some(Box::new(even)));
        tree.filter(false).expect("filter");
        assert_eq!(rows(&tree, tree.sink()), vec![0, 2, 4, 6]);

        // An even child turns the failing odd parent into a passing ancestor.
        tree.splice(&[1, 0], 0, vec![TreeElement::new(12)], SpliceHooks::none())
            .expect("even child");
        assert_eq!(rows(&tree, tree.sink()), vec![0, 2, 4, 6, 11, 12]);
        tree.check_invariants().expect("invariants");

        tree.splice(&[1, 0], 1, Vec::new(), SpliceHooks::none())
            .expect("remove child");
        assert_eq!(rows(&tree, tree.sink()), vec![0, 2, 4, 6]);
        tree.check_invariants().expect("invariants");
    }
}
