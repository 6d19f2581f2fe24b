use std::time::{Duration, Instant};

use crate::error::CacheError;
use crate::executor::ExecutorHandle;
use crate::provider::StructureChange;
use crate::theme::ThemeColors;
use crate::tree::{self, CachedNode, TreeCache, TreeView};

/// How long queued work may wait before the status bar complains.
const WORKER_STALL: Duration = Duration::from_secs(2);

/// Main application state.
pub struct App {
    pub cache: TreeCache,
    pub view: TreeView,
    pub executor: ExecutorHandle,
    pub theme: ThemeColors,
    /// What the tree is showing (a path, or the demo desktop).
    pub source_label: String,
    /// Whether provider change subscriptions actually fire.
    pub watching: bool,
    pub should_quit: bool,
    /// Message, when it was set, and whether it is an error.
    pub status_message: Option<(String, Instant, bool)>,
}

impl App {
    pub fn new(
        cache: TreeCache,
        executor: ExecutorHandle,
        theme: ThemeColors,
        source_label: String,
        watching: bool,
    ) -> Self {
        let mut app = Self {
            cache,
            view: TreeView::default(),
            executor,
            theme,
            source_label,
            watching,
            should_quit: false,
            status_message: None,
        };
        app.view.flatten(&app.cache);
        app
    }

    /// Set a status message with current timestamp.
    pub fn set_status_message(&mut self, msg: String) {
        self.status_message = Some((msg, Instant::now(), false));
    }

    pub fn set_error(&mut self, msg: String) {
        self.status_message = Some((msg, Instant::now(), true));
    }

    /// Clear the status message if it has been displayed for more than 3 seconds.
    pub fn clear_expired_status(&mut self) {
        if let Some((_, ref created, _)) = self.status_message {
            if created.elapsed().as_secs() > 3 {
                self.status_message = None;
            }
        }
    }

    /// Quit the application.
    pub fn quit(&mut self) {
        self.should_quit = true;
    }

    pub fn select_next(&mut self) {
        self.view.select_next();
    }

    pub fn select_previous(&mut self) {
        self.view.select_previous();
    }

    pub fn select_first(&mut self) {
        self.view.select_first();
    }

    pub fn select_last(&mut self) {
        self.view.select_last();
    }

    /// Cached node behind the selection.
    pub fn selected_node(&self) -> Option<&CachedNode> {
        self.view.selected_id().and_then(|id| self.cache.get(id))
    }

    /// Names from the root down to the selected node.
    pub fn selected_path(&self) -> Option<String> {
        let id = self.view.selected_id()?;
        let mut chain = self.cache.ancestors(id);
        chain.reverse();
        chain.push(id.clone());
        let names: Vec<&str> = chain
            .iter()
            .filter_map(|id| self.cache.get(id))
            .map(|node| node.info.name.as_str())
            .collect();
        Some(names.join(" / "))
    }

    /// Expand the selected node.
    pub fn expand_selected(&mut self) {
        let Some(id) = self.view.selected_id().cloned() else {
            return;
        };
        let outcome = self.cache.expand(&id);
        self.after(outcome.map(|_| ()));
    }

    /// Collapse the selected node, or jump to its parent if it is not expanded.
    pub fn collapse_selected(&mut self) {
        let Some(item) = self.view.selected() else {
            return;
        };
        let id = item.id.clone();

        if item.is_expanded {
            self.cache.collapse(&id);
            self.view.flatten(&self.cache);
            return;
        }

        if let Some(parent) = self.cache.get(&id).and_then(|node| node.parent.clone()) {
            self.view.select(&parent);
        }
    }

    /// Re-read the selected node from the provider.
    pub fn refresh_selected(&mut self) {
        let Some(id) = self.view.selected_id().cloned() else {
            return;
        };
        match self.cache.refresh(&id) {
            Ok(report) => {
                self.view.flatten(&self.cache);
                self.set_status_message(format!(
                    "Refreshed: {} added, {} removed",
                    report.added.len(),
                    report.removed.len()
                ));
            }
            Err(err) => self.set_error(err.to_string()),
        }
    }

    /// Rebuild the whole cache from the provider root.
    pub fn reload(&mut self) {
        let outcome = self.cache.reload();
        if outcome.is_ok() {
            self.view.select_first();
            self.set_status_message(format!("Reloaded {} nodes", self.cache.len()));
        }
        self.after(outcome);
    }

    /// Apply a structure change forwarded by the notification router.
    pub fn handle_structure_change(&mut self, change: StructureChange) {
        match tree::dispatch(&mut self.cache, &change) {
            Ok(Some(report)) if !report.is_empty() => {
                tracing::debug!(
                    %change,
                    added = report.added.len(),
                    removed = report.removed.len(),
                    kept = report.kept.len(),
                    "structure change applied"
                );
                self.view.flatten(&self.cache);
            }
            Ok(_) => self.view.flatten(&self.cache),
            Err(err) => self.set_error(err.to_string()),
        }
    }

    fn after(&mut self, outcome: Result<(), CacheError>) {
        if let Err(err) = outcome {
            tracing::error!(%err, "cache operation failed");
            self.set_error(err.to_string());
        }
        self.view.flatten(&self.cache);
    }

    /// Warn when queued work has been waiting on a busy worker for too long.
    pub fn check_worker(&mut self) {
        let queued = self.executor.queue_len();
        if queued == 0 || self.status_message.is_some() {
            return;
        }
        let stalled = self
            .executor
            .last_drain()
            .is_some_and(|at| at.elapsed() > WORKER_STALL);
        if stalled {
            tracing::warn!(queued, "provider worker is not draining");
            self.set_error(format!("Provider worker busy, {} tasks queued", queued));
        }
    }

    /// Counters shown in the status bar.
    pub fn stats(&self) -> String {
        format!(
            "{} nodes | {} watched | queue {} | wakes {} | worker {}",
            self.cache.len(),
            self.cache.subscribed_count(),
            self.executor.queue_len(),
            self.executor.wakes_delivered(),
            self.executor.state()
        )
    }
}
