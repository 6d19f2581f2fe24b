//! In-memory provider mutated programmatically from any thread.
//!
//! Mutations play the part of the outside world changing the tree; the
//! resulting notifications are forwarded onto the executor worker thread.
//! Backs `--demo` and the cache tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

use crate::error::ProviderError;
use crate::executor::{Dispatch, ExecutorHandle};

use super::identity::{self, CanonicalId, RuntimeId};
use super::{
    ChangeHandler, ChangeKind, ElementInfo, StructureChange, SubscriptionId, SubscriptionIds,
    TreeProvider,
};

/// Key of the root element.
pub const ROOT_KEY: i64 = 0;

/// Canonical id of the element created with `key`.
pub fn id_of(key: i64) -> CanonicalId {
    identity::resolve(Some(&RuntimeId::Ints(vec![key]))).unwrap_or_else(|| {
        unreachable!("non-empty runtime ids always resolve")
    })
}

struct MemoryNode {
    key: i64,
    name: String,
    kind: String,
    parent: Option<CanonicalId>,
    children: Vec<CanonicalId>,
}

#[derive(Default)]
struct MemoryTree {
    nodes: HashMap<CanonicalId, MemoryNode>,
    subscriptions: HashMap<SubscriptionId, (CanonicalId, ChangeHandler)>,
    failing: HashSet<CanonicalId>,
}

impl MemoryTree {
    fn info(&self, node: &MemoryNode) -> ElementInfo {
        ElementInfo {
            runtime_id: Some(RuntimeId::Ints(vec![node.key])),
            name: node.name.clone(),
            kind: node.kind.clone(),
            owner: Some("memory".to_string()),
            has_children: !node.children.is_empty(),
        }
    }

    fn handlers_for(&self, id: &CanonicalId) -> Vec<ChangeHandler> {
        self.subscriptions
            .values()
            .filter(|(source, _)| source == id)
            .map(|(_, handler)| handler.clone())
            .collect()
    }

    fn remove_subtree(&mut self, id: &CanonicalId) {
        let mut stack = vec![id.clone()];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(&current) {
                stack.extend(node.children);
            }
        }
    }
}

/// Provider over an in-memory tree.
pub struct MemoryProvider {
    executor: ExecutorHandle,
    tree: Mutex<MemoryTree>,
    ids: SubscriptionIds,
}

impl MemoryProvider {
    /// Create a provider holding only the root element.
    pub fn new(executor: ExecutorHandle, root_name: &str) -> Self {
        let mut tree = MemoryTree::default();
        tree.nodes.insert(
            id_of(ROOT_KEY),
            MemoryNode {
                key: ROOT_KEY,
                name: root_name.to_string(),
                kind: "root".to_string(),
                parent: None,
                children: Vec::new(),
            },
        );
        Self {
            executor,
            tree: Mutex::new(tree),
            ids: SubscriptionIds::default(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryTree> {
        self.tree.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a new element under `parent`.
    pub fn add(&self, parent: i64, key: i64, name: &str, kind: &str) -> Result<(), ProviderError> {
        let parent_id = id_of(parent);
        let child_id = id_of(key);
        let handlers = {
            let mut tree = self.lock();
            if !tree.nodes.contains_key(&parent_id) {
                return Err(ProviderError::Unknown(parent_id));
            }
            if tree.nodes.contains_key(&child_id) {
                return Err(ProviderError::Duplicate(child_id));
            }
            tree.nodes.insert(
                child_id.clone(),
                MemoryNode {
                    key,
                    name: name.to_string(),
                    kind: kind.to_string(),
                    parent: Some(parent_id.clone()),
                    children: Vec::new(),
                },
            );
            if let Some(node) = tree.nodes.get_mut(&parent_id) {
                node.children.push(child_id.clone());
            }
            tree.handlers_for(&parent_id)
        };
        self.notify(handlers, parent_id, ChangeKind::ChildAdded, Some(child_id));
        Ok(())
    }

    /// Remove an element and its whole subtree.
    pub fn remove(&self, key: i64) -> Result<(), ProviderError> {
        let id = id_of(key);
        let (handlers, parent_id) = {
            let mut tree = self.lock();
            let parent_id = match tree.nodes.get(&id) {
                Some(node) => node.parent.clone(),
                None => return Err(ProviderError::Unknown(id)),
            };
            let Some(parent_id) = parent_id else {
                // The root never goes away.
                return Err(ProviderError::AccessDenied(id));
            };
            if let Some(parent) = tree.nodes.get_mut(&parent_id) {
                parent.children.retain(|child| child != &id);
            }
            tree.remove_subtree(&id);
            (tree.handlers_for(&parent_id), parent_id)
        };
        self.notify(handlers, parent_id, ChangeKind::ChildRemoved, Some(id));
        Ok(())
    }

    /// Move an element (with its subtree) under another parent.
    pub fn reparent(&self, key: i64, new_parent: i64) -> Result<(), ProviderError> {
        let id = id_of(key);
        let new_parent_id = id_of(new_parent);
        let (old_handlers, new_handlers, old_parent_id) = {
            let mut tree = self.lock();
            if !tree.nodes.contains_key(&new_parent_id) {
                return Err(ProviderError::Unknown(new_parent_id));
            }
            let old_parent_id = match tree.nodes.get(&id).map(|node| node.parent.clone()) {
                Some(Some(parent)) => parent,
                Some(None) => return Err(ProviderError::AccessDenied(id)),
                None => return Err(ProviderError::Unknown(id)),
            };
            if let Some(old_parent) = tree.nodes.get_mut(&old_parent_id) {
                old_parent.children.retain(|child| child != &id);
            }
            if let Some(new_parent) = tree.nodes.get_mut(&new_parent_id) {
                new_parent.children.push(id.clone());
            }
            if let Some(node) = tree.nodes.get_mut(&id) {
                node.parent = Some(new_parent_id.clone());
            }
            (
                tree.handlers_for(&old_parent_id),
                tree.handlers_for(&new_parent_id),
                old_parent_id,
            )
        };
        self.notify(
            old_handlers,
            old_parent_id,
            ChangeKind::ChildRemoved,
            Some(id.clone()),
        );
        self.notify(new_handlers, new_parent_id, ChangeKind::ChildAdded, Some(id));
        Ok(())
    }

    /// Reverse the child order of `parent`.
    pub fn reverse_children(&self, parent: i64) -> Result<(), ProviderError> {
        let parent_id = id_of(parent);
        let handlers = {
            let mut tree = self.lock();
            match tree.nodes.get_mut(&parent_id) {
                Some(node) => node.children.reverse(),
                None => return Err(ProviderError::Unknown(parent_id)),
            }
            tree.handlers_for(&parent_id)
        };
        self.notify(handlers, parent_id, ChangeKind::ChildrenReordered, None);
        Ok(())
    }

    /// Make `children` of `key` fail with `AccessDenied` (or stop failing).
    #[cfg(test)]
    pub fn set_failing(&self, key: i64, failing: bool) {
        let id = id_of(key);
        let mut tree = self.lock();
        if failing {
            tree.failing.insert(id);
        } else {
            tree.failing.remove(&id);
        }
    }

    /// Whether an element with `key` currently exists.
    pub fn contains(&self, key: i64) -> bool {
        self.lock().nodes.contains_key(&id_of(key))
    }

    /// Keys of the current children of `parent`, in order.
    #[cfg(test)]
    pub fn child_keys(&self, parent: i64) -> Vec<i64> {
        let tree = self.lock();
        tree.nodes
            .get(&id_of(parent))
            .map(|node| {
                node.children
                    .iter()
                    .filter_map(|child| tree.nodes.get(child).map(|c| c.key))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether `id` currently has at least one live subscription.
    #[cfg(test)]
    pub fn is_subscribed(&self, id: &CanonicalId) -> bool {
        self.lock()
            .subscriptions
            .values()
            .any(|(source, _)| source == id)
    }

    fn notify(
        &self,
        handlers: Vec<ChangeHandler>,
        source: CanonicalId,
        kind: ChangeKind,
        affected: Option<CanonicalId>,
    ) {
        for handler in handlers {
            let change = StructureChange {
                source: source.clone(),
                kind,
                affected: affected.clone(),
            };
            // Always queued: mutations may come from the worker itself.
            if let Err(err) = self
                .executor
                .post_with(Dispatch::Enqueue, move || handler(change))
            {
                tracing::debug!(%err, "dropping memory provider notification");
            }
        }
    }
}

impl TreeProvider for MemoryProvider {
    fn root(&self) -> Result<ElementInfo, ProviderError> {
        self.executor.ensure_on_worker("root")?;
        let tree = self.lock();
        let root = tree
            .nodes
            .get(&id_of(ROOT_KEY))
            .ok_or_else(|| ProviderError::Vanished(id_of(ROOT_KEY)))?;
        Ok(tree.info(root))
    }

    fn children(&self, id: &CanonicalId) -> Result<Vec<ElementInfo>, ProviderError> {
        self.executor.ensure_on_worker("children")?;
        let tree = self.lock();
        if tree.failing.contains(id) {
            return Err(ProviderError::AccessDenied(id.clone()));
        }
        let node = tree
            .nodes
            .get(id)
            .ok_or_else(|| ProviderError::Vanished(id.clone()))?;
        Ok(node
            .children
            .iter()
            .filter_map(|child| tree.nodes.get(child))
            .map(|child| tree.info(child))
            .collect())
    }

    fn has_children(&self, id: &CanonicalId) -> Result<bool, ProviderError> {
        self.executor.ensure_on_worker("has_children")?;
        let tree = self.lock();
        tree.nodes
            .get(id)
            .map(|node| !node.children.is_empty())
            .ok_or_else(|| ProviderError::Vanished(id.clone()))
    }

    fn subscribe(
        &self,
        id: &CanonicalId,
        handler: ChangeHandler,
    ) -> Result<SubscriptionId, ProviderError> {
        self.executor.ensure_on_worker("subscribe")?;
        let mut tree = self.lock();
        if !tree.nodes.contains_key(id) {
            return Err(ProviderError::Vanished(id.clone()));
        }
        let subscription = self.ids.next();
        tree.subscriptions.insert(subscription, (id.clone(), handler));
        Ok(subscription)
    }

    fn unsubscribe(&self, subscription: SubscriptionId) -> Result<(), ProviderError> {
        self.executor.ensure_on_worker("unsubscribe")?;
        self.lock().subscriptions.remove(&subscription);
        Ok(())
    }

    fn subscription_count(&self) -> usize {
        self.lock().subscriptions.len()
    }
}

/// Demo content: a desktop with a few windows and panes.
pub fn seed_demo(provider: &MemoryProvider) -> Result<(), ProviderError> {
    let windows = [(1, "Terminal"), (2, "Browser"), (3, "Editor")];
    for (key, name) in windows {
        provider.add(ROOT_KEY, key, name, "window")?;
        for pane in 0..3 {
            let pane_key = key * 100 + pane;
            provider.add(key, pane_key, &format!("{} pane {}", name, pane), "pane")?;
        }
    }
    Ok(())
}

/// One deterministic mutation of the demo tree.
///
/// Each four-step cycle adds a transient pane to a window, reverses that
/// window's panes, moves the transient pane to the next window and finally
/// removes it, so the tree churns without growing unbounded.
pub fn churn_step(provider: &MemoryProvider, step: i64) -> Result<(), ProviderError> {
    let window = 1 + (step / 4) % 3;
    let transient = 10_000 + step - step % 4;
    match step % 4 {
        0 => provider.add(window, transient, &format!("transient {}", transient), "pane"),
        1 => provider.reverse_children(window),
        2 if provider.contains(transient) => provider.reparent(transient, window % 3 + 1),
        3 if provider.contains(transient) => provider.remove(transient),
        _ => Ok(()),
    }
}
