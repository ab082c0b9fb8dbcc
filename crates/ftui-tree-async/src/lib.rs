#![forbid(unsafe_code)]

//! Lazily loaded children for [`ftui_tree`] keyed trees.
//!
//! [`AsyncDataTree`] asks a [`ChildrenProvider`] for the children of an
//! element when it is first expanded and keeps at most one fetch in flight
//! per element. Concurrent expand, collapse and toggle requests on the same
//! element are serialized behind that fetch.
//!
//! Futures are `!Send` and meant for a single-threaded executor.
//!
//! # Example
//!
//! ```
//! use futures::executor::block_on;
//! use ftui_tree::TreeOptions;
//! use ftui_tree_async::{AsyncDataTree, Children, ChildrenProvider};
//!
//! struct Numbers;
//!
//! impl ChildrenProvider<u32> for Numbers {
//!     fn has_children(&self, n: &u32) -> bool {
//!         *n < 10
//!     }
//!
//!     fn get_children(&self, n: &u32) -> Children<u32> {
//!         Children::Ready(vec![n * 10 + 1, n * 10 + 2])
//!     }
//! }
//!
//! let tree = AsyncDataTree::new(0, Numbers, Vec::new(), TreeOptions::new());
//! block_on(tree.set_input(0)).unwrap();
//! assert_eq!(tree.with_tree(|t| t.size()), 2);
//!
//! block_on(tree.expand(&1, false)).unwrap();
//! assert_eq!(tree.with_tree(|t| t.size()), 4);
//! ```

pub mod error;
pub mod provider;
pub mod tree;

pub use error::{AsyncTreeError, ProviderError};
pub use provider::{Children, ChildrenProvider};
pub use tree::{AsyncDataTree, Refresh};
