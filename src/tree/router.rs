//! Change notification routing.
//!
//! Provider handlers run on the executor worker. They only forward the
//! change to the consumer's event channel; the consumer then applies it to
//! the cache with [`dispatch`].

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::CacheError;
use crate::event::Event;
use crate::provider::{ChangeHandler, StructureChange};

use super::cache::{ReconcileReport, TreeCache};

/// Hands out provider change handlers that feed the consumer channel.
#[derive(Clone)]
pub struct NotificationRouter {
    tx: mpsc::UnboundedSender<Event>,
}

impl NotificationRouter {
    pub fn new(tx: mpsc::UnboundedSender<Event>) -> Self {
        Self { tx }
    }

    /// Handler to register with a provider subscription.
    pub fn handler(&self) -> ChangeHandler {
        let tx = self.tx.clone();
        Arc::new(move |change: StructureChange| {
            tracing::trace!(%change, "structure change");
            if tx.send(Event::Structure(change)).is_err() {
                tracing::debug!("event channel closed, dropping structure change");
            }
        })
    }
}

/// Apply one notification on the consumer side.
///
/// Notifications for elements no longer cached are dropped. Otherwise the
/// source is re-read: an expanded node is reconciled against its live
/// children, a lazy one only gets its `has_children` hint refreshed.
pub fn dispatch(
    cache: &mut TreeCache,
    change: &StructureChange,
) -> Result<Option<ReconcileReport>, CacheError> {
    if !cache.contains(&change.source) {
        tracing::trace!(%change, "notification for uncached element");
        return Ok(None);
    }
    cache.refresh(&change.source).map(Some)
}
