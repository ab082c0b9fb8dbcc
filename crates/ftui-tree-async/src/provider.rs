#![forbid(unsafe_code)]

//! Source of lazily loaded children.

use std::fmt;

use futures::future::LocalBoxFuture;

use crate::error::ProviderError;

/// Children of an element, available now or after a fetch completes.
pub enum Children<T> {
    /// Children known synchronously.
    Ready(Vec<T>),
    /// Children still being fetched.
    Pending(LocalBoxFuture<'static, Result<Vec<T>, ProviderError>>),
}

impl<T> Children<T> {
    /// Wrap a fetch future.
    pub fn pending<Fut>(fetch: Fut) -> Self
    where
        Fut: std::future::Future<Output = Result<Vec<T>, ProviderError>> + 'static,
    {
        Self::Pending(Box::pin(fetch))
    }

    /// Resolve to the children, awaiting the fetch if one is pending.
    pub async fn resolve(self) -> Result<Vec<T>, ProviderError> {
        match self {
            Self::Ready(children) => Ok(children),
            Self::Pending(fetch) => fetch.await,
        }
    }
}

impl<T> From<Vec<T>> for Children<T> {
    fn from(children: Vec<T>) -> Self {
        Self::Ready(children)
    }
}

impl<T: fmt::Debug> fmt::Debug for Children<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(children) => f.debug_tuple("Ready").field(children).finish(),
            Self::Pending(_) => f.write_str("Pending"),
        }
    }
}

/// Supplies the children of elements on demand.
///
/// `has_children` is answered synchronously so a node can show as
/// collapsible before its children are fetched.
pub trait ChildrenProvider<T> {
    /// Whether `element` has (or may have) children.
    fn has_children(&self, element: &T) -> bool;

    /// Fetch the children of `element`.
    fn get_children(&self, element: &T) -> Children<T>;

    /// Initial collapse state of a newly loaded element with children.
    fn collapse_by_default(&self, _element: &T) -> bool {
        true
    }

    /// Whether expanding an already loaded `element` fetches its children
    /// again.
    fn should_refresh_children(&self, _element: &T) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    #[test]
    fn ready_children_resolve_immediately() {
        let children: Children<u32> = vec![1, 2].into();
        assert_eq!(block_on(children.resolve()), Ok(vec![1, 2]));
    }

    #[test]
    fn pending_children_resolve_through_fetch() {
        let children = Children::pending(async { Ok(vec![3u32]) });
        assert_eq!(format!("{children:?}"), "Pending");
        assert_eq!(block_on(children.resolve()), Ok(vec![3]));

        let failed: Children<u32> = Children::pending(async { Err(ProviderError::new("offline")) });
        assert_eq!(block_on(failed.resolve()), Err(ProviderError::new("offline")));
    }
}
