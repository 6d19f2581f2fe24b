//! Consumer-side mirror of the provider tree.
//!
//! The cache is owned by the consumer and never touched by the executor
//! worker. Every provider call goes through the executor; subscription
//! releases are posted so they stay ordered behind earlier provider calls.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::{CacheError, ProviderError};
use crate::executor::ExecutorHandle;
use crate::provider::identity::CanonicalId;
use crate::provider::{ElementInfo, SubscriptionId, TreeProvider};

use super::router::NotificationRouter;

/// Whether a node's children are materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expansion {
    /// Children not loaded; `has_children` is the provider's last hint.
    Lazy { has_children: bool },
    Expanded,
}

/// One cached element.
#[derive(Debug, Clone)]
pub struct CachedNode {
    pub id: CanonicalId,
    pub info: ElementInfo,
    /// Back-reference only; the parent owns the child through `children`.
    pub parent: Option<CanonicalId>,
    pub children: Vec<CanonicalId>,
    pub expansion: Expansion,
    pub subscription: Option<SubscriptionId>,
}

impl CachedNode {
    fn new(id: CanonicalId, info: ElementInfo, parent: Option<CanonicalId>) -> Self {
        let expansion = Expansion::Lazy {
            has_children: info.has_children,
        };
        Self {
            id,
            info,
            parent,
            children: Vec::new(),
            expansion,
            subscription: None,
        }
    }

    pub fn is_expanded(&self) -> bool {
        self.expansion == Expansion::Expanded
    }

    /// Whether the node has, or is believed to have, children.
    pub fn has_children(&self) -> bool {
        match self.expansion {
            Expansion::Expanded => !self.children.is_empty(),
            Expansion::Lazy { has_children } => has_children,
        }
    }
}

/// Outcome of one reconciliation, in the order the changes apply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// New or moved-in children, in live order.
    pub added: Vec<CanonicalId>,
    /// Children dropped together with their subtrees.
    pub removed: Vec<CanonicalId>,
    pub kept: Vec<CanonicalId>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Tree node cache with its reconciliation engine.
pub struct TreeCache {
    provider: Arc<dyn TreeProvider>,
    executor: ExecutorHandle,
    router: NotificationRouter,
    nodes: HashMap<CanonicalId, CachedNode>,
    root: Option<CanonicalId>,
}

impl TreeCache {
    /// Fetch the provider root, subscribe it and expand it.
    pub fn new(
        provider: Arc<dyn TreeProvider>,
        executor: ExecutorHandle,
        router: NotificationRouter,
    ) -> Result<Self, CacheError> {
        let mut cache = Self {
            provider,
            executor,
            router,
            nodes: HashMap::new(),
            root: None,
        };
        cache.load_root()?;
        Ok(cache)
    }

    fn load_root(&mut self) -> Result<(), CacheError> {
        let provider = Arc::clone(&self.provider);
        let info = self
            .executor
            .submit(move || provider.root())?
            .map_err(|err| match err {
                ProviderError::Affinity(err) => CacheError::Executor(err),
                other => CacheError::RootUnavailable(other),
            })?;
        let id = info.id().ok_or(CacheError::NoRootIdentity)?;

        self.nodes
            .insert(id.clone(), CachedNode::new(id.clone(), info, None));
        self.root = Some(id.clone());
        self.expand(&id)?;
        tracing::info!(root = %id, nodes = self.nodes.len(), "tree cache loaded");
        Ok(())
    }

    pub fn root_id(&self) -> Option<&CanonicalId> {
        self.root.as_ref()
    }

    pub fn get(&self, id: &CanonicalId) -> Option<&CachedNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &CanonicalId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Cached children of `id`, empty for lazy or unknown nodes.
    pub fn children_of(&self, id: &CanonicalId) -> &[CanonicalId] {
        self.nodes
            .get(id)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of cached nodes holding a live subscription.
    pub fn subscribed_count(&self) -> usize {
        self.nodes
            .values()
            .filter(|node| node.subscription.is_some())
            .count()
    }

    /// Ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: &CanonicalId) -> Vec<CanonicalId> {
        let mut chain = Vec::new();
        let mut current = self.nodes.get(id).and_then(|node| node.parent.clone());
        while let Some(parent) = current {
            if chain.len() > self.nodes.len() {
                tracing::error!(%id, "parent chain does not terminate");
                break;
            }
            current = self.nodes.get(&parent).and_then(|node| node.parent.clone());
            chain.push(parent);
        }
        chain
    }

    /// Materialize the children of a lazy node.
    ///
    /// Returns `None` when the node is unknown or already expanded. The node
    /// itself is subscribed after the read if it holds no subscription.
    pub fn expand(&mut self, id: &CanonicalId) -> Result<Option<ReconcileReport>, CacheError> {
        match self.nodes.get(id) {
            Some(node) if !node.is_expanded() => {}
            _ => return Ok(None),
        }

        let live = self.fetch_children(id)?;
        if let Some(node) = self.nodes.get_mut(id) {
            node.expansion = Expansion::Expanded;
            node.children.clear();
        }
        let report = self.reconcile(id, &live)?;

        if self
            .nodes
            .get(id)
            .is_some_and(|node| node.subscription.is_none())
        {
            let granted = self.subscribe_all(vec![id.clone()])?;
            self.attach(granted);
        }
        tracing::debug!(%id, children = report.added.len(), "expanded");
        Ok(Some(report))
    }

    /// Drop every descendant of `id` and mark it lazy again.
    ///
    /// The node keeps its own subscription. Returns the number of discarded
    /// nodes.
    pub fn collapse(&mut self, id: &CanonicalId) -> usize {
        let Some(node) = self.nodes.get_mut(id) else {
            return 0;
        };
        if !node.is_expanded() {
            return 0;
        }
        let children = std::mem::take(&mut node.children);
        node.expansion = Expansion::Lazy {
            has_children: !children.is_empty(),
        };

        let mut released = Vec::new();
        let discarded: usize = children
            .iter()
            .map(|child| self.discard_subtree(child, &mut released))
            .sum();
        self.release(released);
        tracing::debug!(%id, discarded, "collapsed");
        discarded
    }

    /// Bring the cached children of `id` in line with `live`.
    ///
    /// Matching is by canonical identity; elements without one are skipped.
    /// Kept children are left untouched, removed ones are discarded with
    /// their subtrees, and added ones are moved over when cached elsewhere
    /// or created and subscribed otherwise. Children end up in live order.
    /// On a lazy node only the `has_children` hint is updated.
    pub fn reconcile(
        &mut self,
        id: &CanonicalId,
        live: &[ElementInfo],
    ) -> Result<ReconcileReport, CacheError> {
        let Some(node) = self.nodes.get_mut(id) else {
            return Ok(ReconcileReport::default());
        };
        if !node.is_expanded() {
            let has_children = !live.is_empty();
            node.expansion = Expansion::Lazy { has_children };
            node.info.has_children = has_children;
            return Ok(ReconcileReport::default());
        }
        let previous = node.children.clone();

        let ancestors: HashSet<CanonicalId> = self.ancestors(id).into_iter().collect();
        let mut seen = HashSet::new();
        let mut incoming: Vec<(CanonicalId, &ElementInfo)> = Vec::new();
        for info in live {
            let Some(child) = info.id() else {
                continue;
            };
            if child == *id || ancestors.contains(&child) {
                tracing::warn!(parent = %id, %child, "provider reported an ancestor as child");
                continue;
            }
            if seen.insert(child.clone()) {
                incoming.push((child, info));
            }
        }

        let before: HashSet<&CanonicalId> = previous.iter().collect();
        let mut report = ReconcileReport::default();
        let mut fresh = Vec::new();

        for (child, info) in &incoming {
            if before.contains(child) {
                report.kept.push(child.clone());
                continue;
            }
            report.added.push(child.clone());

            let moved_from = self.nodes.get(child).map(|node| node.parent.clone());
            match moved_from {
                Some(old_parent) => {
                    if let Some(old) = old_parent.as_ref().and_then(|p| self.nodes.get_mut(p)) {
                        old.children.retain(|c| c != child);
                    }
                    if let Some(node) = self.nodes.get_mut(child) {
                        node.parent = Some(id.clone());
                    }
                    tracing::debug!(%child, to = %id, "reusing moved node");
                }
                None => {
                    self.nodes.insert(
                        child.clone(),
                        CachedNode::new(child.clone(), (*info).clone(), Some(id.clone())),
                    );
                    fresh.push(child.clone());
                }
            }
        }

        let after: HashSet<&CanonicalId> = incoming.iter().map(|(child, _)| child).collect();
        let mut released = Vec::new();
        for child in &previous {
            if !after.contains(child) {
                report.removed.push(child.clone());
                self.discard_subtree(child, &mut released);
            }
        }

        let ordered: Vec<CanonicalId> = incoming.into_iter().map(|(child, _)| child).collect();
        if let Some(node) = self.nodes.get_mut(id) {
            node.info.has_children = !ordered.is_empty();
            node.children = ordered;
        }

        self.release(released);
        let granted = self.subscribe_all(fresh)?;
        self.attach(granted);

        if !report.is_empty() {
            tracing::debug!(
                parent = %id,
                added = report.added.len(),
                removed = report.removed.len(),
                kept = report.kept.len(),
                "reconciled"
            );
        }
        Ok(report)
    }

    /// Re-read `id` from the provider: reconcile an expanded node, refresh
    /// the hint of a lazy one.
    pub fn refresh(&mut self, id: &CanonicalId) -> Result<ReconcileReport, CacheError> {
        match self.nodes.get(id).map(CachedNode::is_expanded) {
            None => Ok(ReconcileReport::default()),
            Some(true) => {
                let live = self.fetch_children(id)?;
                self.reconcile(id, &live)
            }
            Some(false) => {
                let has_children = self.fetch_has_children(id)?;
                if let Some(node) = self.nodes.get_mut(id) {
                    node.expansion = Expansion::Lazy { has_children };
                    node.info.has_children = has_children;
                }
                Ok(ReconcileReport::default())
            }
        }
    }

    /// Drop everything and rebuild from the provider root.
    pub fn reload(&mut self) -> Result<(), CacheError> {
        self.clear()?;
        self.load_root()
    }

    /// Release every subscription and empty the cache.
    ///
    /// Unlike collapse, this waits for the releases to complete so it can
    /// run right before the executor shuts down.
    pub fn clear(&mut self) -> Result<usize, CacheError> {
        let released: Vec<SubscriptionId> = self
            .nodes
            .values()
            .filter_map(|node| node.subscription)
            .collect();
        self.nodes.clear();
        self.root = None;

        let count = released.len();
        if count > 0 {
            let provider = Arc::clone(&self.provider);
            let leftover = self.executor.submit(move || {
                unsubscribe_all(provider.as_ref(), released);
                provider.subscription_count()
            })?;
            if leftover > 0 {
                tracing::warn!(leftover, "provider still holds subscriptions after clear");
            }
        }
        tracing::debug!(released = count, "tree cache cleared");
        Ok(count)
    }

    /// Remove `id` and everything below it, collecting subscriptions.
    fn discard_subtree(&mut self, id: &CanonicalId, released: &mut Vec<SubscriptionId>) -> usize {
        let mut discarded = 0;
        let mut stack = vec![id.clone()];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(&current) {
                discarded += 1;
                released.extend(node.subscription);
                stack.extend(node.children);
            }
        }
        discarded
    }

    fn fetch_children(&self, id: &CanonicalId) -> Result<Vec<ElementInfo>, CacheError> {
        let provider = Arc::clone(&self.provider);
        let target = id.clone();
        let fetched = self.executor.submit(move || provider.children(&target))?;
        degrade(fetched, "children", id)
    }

    fn fetch_has_children(&self, id: &CanonicalId) -> Result<bool, CacheError> {
        let provider = Arc::clone(&self.provider);
        let target = id.clone();
        let fetched = self.executor.submit(move || provider.has_children(&target))?;
        degrade(fetched, "has_children", id)
    }

    fn subscribe_all(
        &self,
        ids: Vec<CanonicalId>,
    ) -> Result<Vec<(CanonicalId, SubscriptionId)>, CacheError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let provider = Arc::clone(&self.provider);
        let router = self.router.clone();
        let outcomes = self.executor.submit(move || {
            ids.into_iter()
                .map(|id| {
                    let outcome = provider.subscribe(&id, router.handler());
                    (id, outcome)
                })
                .collect::<Vec<_>>()
        })?;

        let mut granted = Vec::with_capacity(outcomes.len());
        for (id, outcome) in outcomes {
            match outcome {
                Ok(subscription) => granted.push((id, subscription)),
                Err(ProviderError::Affinity(err)) => return Err(err.into()),
                Err(err) => tracing::warn!(%id, %err, "subscription failed"),
            }
        }
        Ok(granted)
    }

    fn attach(&mut self, granted: Vec<(CanonicalId, SubscriptionId)>) {
        let mut orphaned = Vec::new();
        for (id, subscription) in granted {
            match self.nodes.get_mut(&id) {
                Some(node) => node.subscription = Some(subscription),
                None => orphaned.push(subscription),
            }
        }
        self.release(orphaned);
    }

    fn release(&self, subscriptions: Vec<SubscriptionId>) {
        if subscriptions.is_empty() {
            return;
        }
        let provider = Arc::clone(&self.provider);
        if let Err(err) = self
            .executor
            .post(move || unsubscribe_all(provider.as_ref(), subscriptions))
        {
            tracing::debug!(%err, "subscriptions not released, executor is down");
        }
    }
}

fn unsubscribe_all(provider: &dyn TreeProvider, subscriptions: Vec<SubscriptionId>) {
    for subscription in subscriptions {
        if let Err(err) = provider.unsubscribe(subscription) {
            tracing::warn!(%subscription, %err, "unsubscribe failed");
        }
    }
}

/// Provider faults become "nothing there"; affinity faults propagate.
fn degrade<T: Default>(
    fetched: Result<T, ProviderError>,
    operation: &'static str,
    id: &CanonicalId,
) -> Result<T, CacheError> {
    match fetched {
        Ok(value) => Ok(value),
        Err(ProviderError::Affinity(err)) => Err(err.into()),
        Err(err) => {
            tracing::warn!(%id, %err, operation, "provider read failed, treating as empty");
            Ok(T::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExecutorError;
    use crate::event::Event;
    use crate::executor::{AffinityExecutor, ExecutorConfig, ExecutorState};
    use crate::provider::identity::RuntimeId;
    use crate::provider::memory::{id_of, seed_demo, MemoryProvider, ROOT_KEY};
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct Fixture {
        executor: AffinityExecutor,
        handle: ExecutorHandle,
        provider: Arc<MemoryProvider>,
        events_tx: mpsc::UnboundedSender<Event>,
        _events: mpsc::UnboundedReceiver<Event>,
    }

    impl Fixture {
        fn new() -> Self {
            let executor = AffinityExecutor::new(ExecutorConfig::default());
            let handle = executor.start(|| Ok(())).unwrap();
            let provider = Arc::new(MemoryProvider::new(handle.clone(), "desktop"));
            let (events_tx, events) = mpsc::unbounded_channel();
            Self {
                executor,
                handle,
                provider,
                events_tx,
                _events: events,
            }
        }

        fn cache(&self) -> TreeCache {
            TreeCache::new(
                Arc::clone(&self.provider) as Arc<dyn TreeProvider>,
                self.handle.clone(),
                NotificationRouter::new(self.events_tx.clone()),
            )
            .unwrap()
        }

        /// Wait until every posted release has run.
        fn settle(&self) {
            self.handle.submit(|| ()).unwrap();
        }
    }

    fn keys(ids: &[i64]) -> Vec<CanonicalId> {
        ids.iter().map(|k| id_of(*k)).collect()
    }

    #[test]
    fn root_is_expanded_and_subscribed_on_creation() {
        let fx = Fixture::new();
        seed_demo(&fx.provider).unwrap();
        let cache = fx.cache();

        let root = cache.root_id().unwrap().clone();
        assert_eq!(root, id_of(ROOT_KEY));
        assert!(cache.get(&root).unwrap().is_expanded());
        assert_eq!(cache.children_of(&root), keys(&[1, 2, 3]).as_slice());
        assert_eq!(cache.len(), 4);
        assert_eq!(cache.subscribed_count(), 4);
        assert!(matches!(
            cache.get(&id_of(1)).unwrap().expansion,
            Expansion::Lazy { has_children: true }
        ));
    }

    #[test]
    fn reconcile_replaces_b_with_d() {
        let fx = Fixture::new();
        for (key, name) in [(1, "A"), (2, "B"), (3, "C")] {
            fx.provider.add(ROOT_KEY, key, name, "pane").unwrap();
        }
        let mut cache = fx.cache();
        let root = id_of(ROOT_KEY);
        fx.settle();
        let sub_a = cache.get(&id_of(1)).unwrap().subscription;
        let sub_c = cache.get(&id_of(3)).unwrap().subscription;
        assert!(sub_a.is_some() && sub_c.is_some());
        let live_before = fx.provider.subscription_count();

        fx.provider.remove(2).unwrap();
        fx.provider.add(ROOT_KEY, 4, "D", "pane").unwrap();
        let report = cache.refresh(&root).unwrap();

        assert_eq!(cache.children_of(&root), keys(&[1, 3, 4]).as_slice());
        assert_eq!(report.added, keys(&[4]));
        assert_eq!(report.removed, keys(&[2]));
        assert_eq!(report.kept, keys(&[1, 3]));
        assert!(!cache.contains(&id_of(2)));

        fx.settle();
        assert!(!fx.provider.is_subscribed(&id_of(2)));
        assert!(fx.provider.is_subscribed(&id_of(4)));

        // Kept nodes hold on to their original subscriptions.
        assert_eq!(cache.get(&id_of(1)).unwrap().subscription, sub_a);
        assert_eq!(cache.get(&id_of(3)).unwrap().subscription, sub_c);
        assert!(fx.provider.is_subscribed(&id_of(1)));
        assert!(fx.provider.is_subscribed(&id_of(3)));
        assert_eq!(fx.provider.subscription_count(), live_before);
    }

    #[test]
    fn reconcile_twice_is_a_no_op() {
        let fx = Fixture::new();
        seed_demo(&fx.provider).unwrap();
        let mut cache = fx.cache();
        let root = id_of(ROOT_KEY);

        fx.provider.add(ROOT_KEY, 9, "new", "window").unwrap();
        let first = cache.refresh(&root).unwrap();
        assert_eq!(first.added, keys(&[9]));

        let second = cache.refresh(&root).unwrap();
        assert!(second.is_empty());
        assert_eq!(second.kept, keys(&[1, 2, 3, 9]));
    }

    #[test]
    fn reconcile_follows_live_order() {
        let fx = Fixture::new();
        seed_demo(&fx.provider).unwrap();
        let mut cache = fx.cache();
        let root = id_of(ROOT_KEY);

        fx.provider.reverse_children(ROOT_KEY).unwrap();
        let report = cache.refresh(&root).unwrap();
        assert!(report.is_empty());
        assert_eq!(cache.children_of(&root), keys(&[3, 2, 1]).as_slice());
    }

    #[test]
    fn cache_converges_after_churn() {
        let fx = Fixture::new();
        seed_demo(&fx.provider).unwrap();
        let mut cache = fx.cache();
        for window in 1..=3 {
            cache.expand(&id_of(window)).unwrap();
        }

        for step in 0..12 {
            crate::provider::memory::churn_step(&fx.provider, step).unwrap();
        }
        fx.provider.remove(202).unwrap();
        fx.provider.add(3, 303, "late pane", "pane").unwrap();

        for window in 1..=3 {
            cache.refresh(&id_of(window)).unwrap();
            assert_eq!(
                cache.children_of(&id_of(window)),
                keys(&fx.provider.child_keys(window)).as_slice()
            );
        }
        fx.settle();
        assert_eq!(fx.provider.subscription_count(), cache.subscribed_count());
        assert_eq!(cache.subscribed_count(), cache.len());
    }

    #[test]
    fn collapse_then_expand_restores_children() {
        let fx = Fixture::new();
        seed_demo(&fx.provider).unwrap();
        let mut cache = fx.cache();
        let root = id_of(ROOT_KEY);
        cache.expand(&id_of(1)).unwrap();
        assert_eq!(cache.len(), 7);

        let discarded = cache.collapse(&root);
        assert_eq!(discarded, 6);
        assert_eq!(cache.len(), 1);
        assert!(matches!(
            cache.get(&root).unwrap().expansion,
            Expansion::Lazy { has_children: true }
        ));
        fx.settle();
        assert_eq!(fx.provider.subscription_count(), 1);
        assert!(fx.provider.is_subscribed(&root));

        cache.expand(&root).unwrap();
        assert_eq!(cache.children_of(&root), keys(&[1, 2, 3]).as_slice());
        assert!(!cache.get(&id_of(1)).unwrap().is_expanded());
        fx.settle();
        assert_eq!(fx.provider.subscription_count(), 4);
    }

    #[test]
    fn expand_of_expanded_or_unknown_node_is_ignored() {
        let fx = Fixture::new();
        let mut cache = fx.cache();
        assert!(cache.expand(&id_of(ROOT_KEY)).unwrap().is_none());
        assert!(cache.expand(&id_of(77)).unwrap().is_none());
        assert_eq!(cache.collapse(&id_of(77)), 0);
    }

    #[test]
    fn failed_fetch_yields_no_children() {
        let fx = Fixture::new();
        seed_demo(&fx.provider).unwrap();
        let mut cache = fx.cache();

        fx.provider.set_failing(1, true);
        let report = cache.expand(&id_of(1)).unwrap().unwrap();
        assert!(report.added.is_empty());
        let node = cache.get(&id_of(1)).unwrap();
        assert!(node.is_expanded());
        assert!(node.children.is_empty());
        assert!(node.subscription.is_some());
    }

    #[test]
    fn moved_node_is_reused_not_recreated() {
        let fx = Fixture::new();
        seed_demo(&fx.provider).unwrap();
        let mut cache = fx.cache();
        cache.expand(&id_of(1)).unwrap();
        cache.expand(&id_of(2)).unwrap();
        let subscription = cache.get(&id_of(101)).unwrap().subscription;

        fx.provider.reparent(101, 2).unwrap();
        let report = cache.refresh(&id_of(2)).unwrap();
        assert_eq!(report.added, keys(&[101]));

        let moved = cache.get(&id_of(101)).unwrap();
        assert_eq!(moved.parent, Some(id_of(2)));
        assert_eq!(moved.subscription, subscription);
        assert!(!cache.children_of(&id_of(1)).contains(&id_of(101)));

        let report = cache.refresh(&id_of(1)).unwrap();
        assert!(report.is_empty());
        assert!(cache.contains(&id_of(101)));
    }

    #[test]
    fn lazy_node_refresh_updates_hint() {
        let fx = Fixture::new();
        seed_demo(&fx.provider).unwrap();
        let mut cache = fx.cache();
        for pane in 300..303 {
            fx.provider.remove(pane).unwrap();
        }
        cache.refresh(&id_of(3)).unwrap();
        let node = cache.get(&id_of(3)).unwrap();
        assert_eq!(node.expansion, Expansion::Lazy { has_children: false });
        assert!(!node.has_children());
    }

    #[test]
    fn unresolvable_and_duplicate_children_are_skipped() {
        let fx = Fixture::new();
        let mut cache = fx.cache();
        let root = id_of(ROOT_KEY);
        let element = |runtime_id: Option<RuntimeId>| ElementInfo {
            runtime_id,
            name: "x".to_string(),
            kind: "pane".to_string(),
            owner: None,
            has_children: false,
        };
        let live = vec![
            element(None),
            element(Some(RuntimeId::Ints(Vec::new()))),
            element(Some(RuntimeId::Ints(vec![5]))),
            element(Some(RuntimeId::Ints(vec![5]))),
            element(Some(RuntimeId::Ints(vec![ROOT_KEY]))),
        ];
        let report = cache.reconcile(&root, &live).unwrap();
        assert_eq!(report.added, keys(&[5]));
        assert_eq!(cache.children_of(&root), keys(&[5]).as_slice());
    }

    #[test]
    fn ancestors_walk_to_root() {
        let fx = Fixture::new();
        seed_demo(&fx.provider).unwrap();
        let mut cache = fx.cache();
        cache.expand(&id_of(2)).unwrap();
        assert_eq!(cache.ancestors(&id_of(201)), keys(&[2, ROOT_KEY]));
        assert!(cache.ancestors(&id_of(ROOT_KEY)).is_empty());
    }

    #[test]
    fn clear_releases_every_subscription() {
        let fx = Fixture::new();
        seed_demo(&fx.provider).unwrap();
        let mut cache = fx.cache();
        cache.expand(&id_of(1)).unwrap();
        assert_eq!(cache.clear().unwrap(), 7);
        assert!(cache.is_empty());
        assert!(cache.root_id().is_none());
        assert_eq!(fx.provider.subscription_count(), 0);
    }

    #[test]
    fn reload_rebuilds_from_root() {
        let fx = Fixture::new();
        seed_demo(&fx.provider).unwrap();
        let mut cache = fx.cache();
        cache.expand(&id_of(1)).unwrap();
        fx.provider.add(ROOT_KEY, 4, "Mail", "window").unwrap();

        cache.reload().unwrap();
        assert_eq!(cache.len(), 5);
        assert_eq!(
            cache.children_of(&id_of(ROOT_KEY)),
            keys(&[1, 2, 3, 4]).as_slice()
        );
        fx.settle();
        assert_eq!(fx.provider.subscription_count(), 5);
    }

    #[test]
    fn stopped_executor_surfaces_as_cache_error() {
        let fx = Fixture::new();
        seed_demo(&fx.provider).unwrap();
        let mut cache = fx.cache();
        fx.executor.shutdown(Duration::from_secs(2)).unwrap();

        let err = cache.expand(&id_of(1)).unwrap_err();
        assert!(matches!(
            err,
            CacheError::Executor(ExecutorError::NotRunning(ExecutorState::Stopped))
        ));
    }
}
