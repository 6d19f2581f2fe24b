//! Tree provider boundary.
//!
//! A provider exposes a live, externally mutating tree. Every method is
//! thread-affine: implementations check `ExecutorHandle::ensure_on_worker`
//! and must only be called through the executor.

pub mod fs;
pub mod identity;
pub mod memory;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::ProviderError;
use identity::{CanonicalId, RuntimeId};

/// Attributes of one provider element.
///
/// Only `runtime_id` is used by the cache; the rest is for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementInfo {
    pub runtime_id: Option<RuntimeId>,
    pub name: String,
    /// Element type label (e.g. "directory", "pane").
    pub kind: String,
    /// Owning process or user, when the provider knows it.
    pub owner: Option<String>,
    /// Whether the element reported children at read time.
    pub has_children: bool,
}

impl ElementInfo {
    /// Canonical identity, or `None` for an ephemeral element.
    pub fn id(&self) -> Option<CanonicalId> {
        identity::resolve(self.runtime_id.as_ref())
    }

    /// Single-line label, `kind 'name'` when a name is present.
    pub fn label(&self) -> String {
        if self.name.trim().is_empty() {
            self.kind.clone()
        } else {
            format!("{} '{}'", self.kind, self.name)
        }
    }
}

/// Kind of structural change reported for a subscribed element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    ChildAdded,
    ChildRemoved,
    /// Children changed in an unspecified way.
    ChildrenInvalidated,
    ChildrenBulkAdded,
    ChildrenBulkRemoved,
    ChildrenReordered,
}

/// One structural-change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureChange {
    /// The subscribed element whose children changed.
    pub source: CanonicalId,
    pub kind: ChangeKind,
    /// The child the change is about, when known.
    pub affected: Option<CanonicalId>,
}

impl fmt::Display for StructureChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?}", self.source, self.kind)?;
        if let Some(affected) = &self.affected {
            write!(f, " ({})", affected)?;
        }
        Ok(())
    }
}

/// Callback invoked on the executor worker thread for each change.
pub type ChangeHandler = Arc<dyn Fn(StructureChange) + Send + Sync + 'static>;

/// Handle to one registered subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// Monotonic subscription id source shared by a provider's registry.
#[derive(Debug, Default)]
pub struct SubscriptionIds(AtomicU64);

impl SubscriptionIds {
    pub fn next(&self) -> SubscriptionId {
        SubscriptionId(self.0.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// A live hierarchical data source.
pub trait TreeProvider: Send + Sync {
    /// The root element.
    fn root(&self) -> Result<ElementInfo, ProviderError>;

    /// Fresh, ordered list of the element's current children.
    fn children(&self, id: &CanonicalId) -> Result<Vec<ElementInfo>, ProviderError>;

    /// Cheap check for at least one child.
    fn has_children(&self, id: &CanonicalId) -> Result<bool, ProviderError>;

    /// Deliver future structural changes of `id` to `handler`.
    fn subscribe(
        &self,
        id: &CanonicalId,
        handler: ChangeHandler,
    ) -> Result<SubscriptionId, ProviderError>;

    /// Release a subscription. Unknown ids are ignored.
    fn unsubscribe(&self, subscription: SubscriptionId) -> Result<(), ProviderError>;

    /// Number of live subscriptions held by the provider.
    fn subscription_count(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(name: &str) -> ElementInfo {
        ElementInfo {
            runtime_id: Some(RuntimeId::Ints(vec![1])),
            name: name.to_string(),
            kind: "pane".to_string(),
            owner: None,
            has_children: false,
        }
    }

    #[test]
    fn label_includes_name_when_present() {
        assert_eq!(info("Editor").label(), "pane 'Editor'");
        assert_eq!(info("  ").label(), "pane");
    }

    #[test]
    fn element_without_runtime_id_has_no_identity() {
        let mut element = info("x");
        element.runtime_id = None;
        assert!(element.id().is_none());
    }

    #[test]
    fn subscription_ids_are_unique() {
        let ids = SubscriptionIds::default();
        let a = ids.next();
        let b = ids.next();
        assert_ne!(a, b);
        assert!(b > a);
        assert_eq!(a.to_string(), "sub#1");
    }

    #[test]
    fn change_display_mentions_affected_child() {
        let change = StructureChange {
            source: info("a").id().unwrap(),
            kind: ChangeKind::ChildAdded,
            affected: Some(info("b").id().unwrap()),
        };
        assert_eq!(change.to_string(), "0001 ChildAdded (0001)");
    }
}
