#![forbid(unsafe_code)]

//! Declarative subtree descriptions consumed by [`splice`](crate::IndexTreeModel::splice).

/// Description of a node to build: payload, optional collapse hints and
/// nested child descriptions.
///
/// # Example
///
/// ```
/// use ftui_tree::TreeElement;
///
/// let src = TreeElement::new("src")
///     .child(TreeElement::new("main.rs"))
///     .child(TreeElement::new("lib.rs"))
///     .with_collapsed(true);
///
/// assert_eq!(src.children().len(), 2);
/// assert_eq!(src.collapsed(), Some(true));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeElement<T> {
    pub(crate) element: T,
    pub(crate) children: Vec<TreeElement<T>>,
    pub(crate) collapsible: Option<bool>,
    pub(crate) collapsed: Option<bool>,
}

impl<T> TreeElement<T> {
    /// Describe a leaf with default collapse state.
    #[must_use]
    pub fn new(element: T) -> Self {
        Self {
            element,
            children: Vec::new(),
            collapsible: None,
            collapsed: None,
        }
    }

    /// Append a child description.
    #[must_use]
    pub fn child(mut self, child: TreeElement<T>) -> Self {
        self.children.push(child);
        self
    }

    /// Replace the child descriptions.
    #[must_use]
    pub fn with_children(mut self, children: Vec<TreeElement<T>>) -> Self {
        self.children = children;
        self
    }

    /// Pin the collapsible flag.
    ///
    /// Note that a pinned `false` is still overridden when the node is built
    /// with children.
    #[must_use]
    pub fn with_collapsible(mut self, collapsible: bool) -> Self {
        self.collapsible = Some(collapsible);
        self
    }

    /// Set the initial collapse state. Also makes the node collapsible unless
    /// pinned otherwise.
    #[must_use]
    pub fn with_collapsed(mut self, collapsed: bool) -> Self {
        self.collapsed = Some(collapsed);
        self
    }

    /// The payload.
    #[must_use]
    pub fn element(&self) -> &T {
        &self.element
    }

    /// Child descriptions.
    #[must_use]
    pub fn children(&self) -> &[TreeElement<T>] {
        &self.children
    }

    /// Explicit collapsible pin, if any.
    #[must_use]
    pub fn collapsible(&self) -> Option<bool> {
        self.collapsible
    }

    /// Explicit collapse state, if any.
    #[must_use]
    pub fn collapsed(&self) -> Option<bool> {
        self.collapsed
    }

    /// Consume the description, returning the payload.
    pub fn into_element(self) -> T {
        self.element
    }
}

impl<T> From<T> for TreeElement<T> {
    fn from(element: T) -> Self {
        Self::new(element)
    }
}
