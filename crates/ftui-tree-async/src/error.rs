#![forbid(unsafe_code)]

//! Errors raised by children providers and the async tree.

use std::fmt;
use std::rc::Rc;

use ftui_tree::TreeError;

/// A children provider failed to produce the children of an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    message: String,
}

impl ProviderError {
    /// Create an error carrying `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The failure message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "children provider failed: {}", self.message)
    }
}

impl std::error::Error for ProviderError {}

/// Error returned by [`AsyncDataTree`](crate::AsyncDataTree) operations.
///
/// Cloneable so one refresh outcome can be delivered to every caller awaiting
/// the same pending refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AsyncTreeError {
    /// The underlying tree rejected an operation.
    Tree(TreeError),
    /// The children provider failed.
    Provider(Rc<ProviderError>),
    /// The tree was dropped while a refresh was in flight.
    Disposed,
}

impl fmt::Display for AsyncTreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tree(error) => write!(f, "{error}"),
            Self::Provider(error) => write!(f, "{error}"),
            Self::Disposed => write!(f, "tree dropped while a refresh was in flight"),
        }
    }
}

impl std::error::Error for AsyncTreeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Tree(error) => Some(error),
            Self::Provider(error) => Some(error.as_ref()),
            Self::Disposed => None,
        }
    }
}

impl From<TreeError> for AsyncTreeError {
    fn from(error: TreeError) -> Self {
        Self::Tree(error)
    }
}

impl From<ProviderError> for AsyncTreeError {
    fn from(error: ProviderError) -> Self {
        Self::Provider(Rc::new(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ftui_tree::NodeId;
    use std::error::Error;

    #[test]
    fn display_and_source() {
        let provider = AsyncTreeError::from(ProviderError::new("timed out"));
        assert_eq!(provider.to_string(), "children provider failed: timed out");
        assert!(provider.source().is_some());

        let tree = AsyncTreeError::from(TreeError::UnknownNode { id: NodeId::ROOT });
        assert!(matches!(tree, AsyncTreeError::Tree(_)));
        assert!(AsyncTreeError::Disposed.source().is_none());
    }

    #[test]
    fn clones_share_provider_error() {
        let error = AsyncTreeError::from(ProviderError::new("offline"));
        let copy = error.clone();
        assert_eq!(error, copy);
        if let (AsyncTreeError::Provider(a), AsyncTreeError::Provider(b)) = (&error, &copy) {
            assert!(Rc::ptr_eq(a, b));
        }
    }
}
