#![forbid(unsafe_code)]

//! Virtualized, collapsible tree model for FrankenTUI hierarchical lists.
//!
//! A [`TreeModel`] owns a multiway tree of payloads and mirrors the rows a
//! user can currently see (nodes not hidden by a collapsed ancestor or the
//! filter) into an external ordered [`ListSink`]. Every change reaches the
//! sink as a minimal `splice(start, delete_count, inserted)`, so a list view
//! can stay virtualized over trees with millions of nodes.
//!
//! Two structural edit strategies share the same queries and collapse logic:
//!
//! - [`IndexTreeModel`]: replace children from [`TreeElement`] descriptions
//!   with [`splice`](TreeModel::splice).
//! - [`FlexTreeModel`]: edit children in place through [`FlexEdit`] and
//!   [`refresh`](TreeModel::refresh) the edited subtree.
//!
//! [`KeyedTree`] addresses either variant by payload instead of location.
//!
//! # Example
//!
//! ```
//! use ftui_tree::{IndexTreeModel, SpliceHooks, TreeElement, TreeOptions};
//!
//! let mut tree: IndexTreeModel<&str> =
//!     IndexTreeModel::new("/", Vec::new(), TreeOptions::new());
//! tree.splice(
//!     &[0],
//!     0,
//!     vec![
//!         TreeElement::new("src")
//!             .child(TreeElement::new("lib.rs"))
//!             .child(TreeElement::new("main.rs")),
//!         TreeElement::new("Cargo.toml"),
//!     ],
//!     SpliceHooks::none(),
//! )
//! .unwrap();
//! assert_eq!(tree.size(), 4);
//!
//! tree.set_collapsed(&[0], Some(true), false).unwrap();
//! assert_eq!(tree.size(), 2);
//! assert_eq!(tree.list_index(&[1]).unwrap(), Some(1));
//! ```
//!
//! # Feature flags
//!
//! - `tracing`: debug spans around splices, refreshes, collapse changes and
//!   filtering.
//! - `state-persistence`: serde derives for [`TreeViewState`].

pub mod element;
pub mod error;
pub mod event;
mod filter;
pub mod flex;
mod index;
pub mod keyed;
pub mod model;
pub mod node;
pub mod options;
pub mod sink;

pub use element::TreeElement;
pub use error::{InvariantKind, TreeError};
pub use event::{EventQueue, TreeEvent};
pub use flex::FlexEdit;
pub use keyed::{KeyedFlexTree, KeyedIndexTree, KeyedTree, TreeViewState};
pub use model::{EditMode, Flex, FlexTreeModel, Index, IndexTreeModel, SpliceHooks, TreeModel};
pub use node::{NodeFlags, NodeId, TreeNode};
pub use options::{FilterResult, TreeFilter, TreeOptions};
pub use sink::{ListSink, NullSink, RecordingSink, SpliceRecord};
