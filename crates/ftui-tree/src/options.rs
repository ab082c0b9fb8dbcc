#![forbid(unsafe_code)]

//! Model configuration and the filter predicate contract.

/// Construction-time options for a tree model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TreeOptions {
    collapse_by_default: bool,
    auto_expand_single_children: bool,
}

impl TreeOptions {
    /// Default options: nodes start expanded, no single-child auto expansion.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Collapse state for new nodes whose description leaves it unset.
    #[must_use]
    pub fn with_collapse_by_default(mut self, collapse: bool) -> Self {
        self.collapse_by_default = collapse;
        self
    }

    /// When expanding a node that has a single visible child, expand that
    /// child as well, down the chain.
    #[must_use]
    pub fn with_auto_expand_single_children(mut self, enabled: bool) -> Self {
        self.auto_expand_single_children = enabled;
        self
    }

    /// Whether new nodes start collapsed.
    #[must_use]
    pub fn collapse_by_default(&self) -> bool {
        self.collapse_by_default
    }

    /// Whether single-child chains expand together.
    #[must_use]
    pub fn auto_expand_single_children(&self) -> bool {
        self.auto_expand_single_children
    }
}

/// Verdict of a filter predicate for one payload.
///
/// `visibility == false` hides the node and its whole subtree. A visible node
/// without a `tag` is not a match: it only shows up as an ancestor of a
/// matching descendant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterResult<F> {
    /// Whether the node may be shown at all.
    pub visibility: bool,
    /// Match tag; `Some` marks the node as matched.
    pub tag: Option<F>,
}

impl<F> FilterResult<F> {
    /// A matched node carrying `tag`.
    #[must_use]
    pub fn matched(tag: F) -> Self {
        Self {
            visibility: true,
            tag: Some(tag),
        }
    }

    /// A node shown only when a descendant matches.
    #[must_use]
    pub fn recurse() -> Self {
        Self {
            visibility: true,
            tag: None,
        }
    }

    /// A node hidden together with its subtree.
    #[must_use]
    pub fn hidden() -> Self {
        Self {
            visibility: false,
            tag: None,
        }
    }
}

impl FilterResult<()> {
    /// Convenience for tagless predicates: `true` matches, `false` recurses.
    #[must_use]
    pub fn from_match(matched: bool) -> Self {
        if matched {
            Self::matched(())
        } else {
            Self::recurse()
        }
    }
}

/// Boxed filter predicate.
pub type TreeFilter<T, F> = Box<dyn Fn(&T) -> FilterResult<F>>;
