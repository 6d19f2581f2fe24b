//! Tree node cache, reconciliation and change routing.

pub mod cache;
pub mod router;
pub mod view;

pub use cache::{CachedNode, Expansion, ReconcileReport, TreeCache};
pub use router::{dispatch, NotificationRouter};
pub use view::{FlatItem, TreeView};
