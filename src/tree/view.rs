use crate::provider::identity::CanonicalId;

use super::cache::TreeCache;

/// A flattened representation of a cached node for rendering.
#[derive(Debug, Clone)]
pub struct FlatItem {
    pub id: CanonicalId,
    pub label: String,
    pub depth: usize,
    pub is_expanded: bool,
    pub has_children: bool,
    pub is_last_sibling: bool,
    pub subscribed: bool,
}

/// Selection and scroll state over the flattened cache.
#[derive(Debug, Default)]
pub struct TreeView {
    pub flat_items: Vec<FlatItem>,
    pub selected_index: usize,
    pub scroll_offset: usize,
}

impl TreeView {
    /// Rebuild the flat items list from the cache.
    ///
    /// The selection follows the previously selected element when it is still
    /// visible, otherwise the index is clamped.
    pub fn flatten(&mut self, cache: &TreeCache) {
        let previous = self.selected_id().cloned();
        self.flat_items.clear();
        if let Some(root) = cache.root_id() {
            Self::flatten_node(cache, root, 0, true, &mut self.flat_items);
        }

        if let Some(index) = previous.and_then(|id| self.find_index(&id)) {
            self.selected_index = index;
        } else if !self.flat_items.is_empty() && self.selected_index >= self.flat_items.len() {
            self.selected_index = self.flat_items.len() - 1;
        }
    }

    fn flatten_node(
        cache: &TreeCache,
        id: &CanonicalId,
        depth: usize,
        is_last: bool,
        items: &mut Vec<FlatItem>,
    ) {
        let Some(node) = cache.get(id) else {
            return;
        };
        items.push(FlatItem {
            id: node.id.clone(),
            label: node.info.label(),
            depth,
            is_expanded: node.is_expanded(),
            is_last_sibling: is_last,
            has_children: node.has_children(),
            subscribed: node.subscription.is_some(),
        });

        if node.is_expanded() {
            let children = cache.children_of(id);
            for (i, child) in children.iter().enumerate() {
                let is_last_child = i == children.len() - 1;
                Self::flatten_node(cache, child, depth + 1, is_last_child, items);
            }
        }
    }

    pub fn selected(&self) -> Option<&FlatItem> {
        self.flat_items.get(self.selected_index)
    }

    pub fn selected_id(&self) -> Option<&CanonicalId> {
        self.selected().map(|item| &item.id)
    }

    pub fn find_index(&self, id: &CanonicalId) -> Option<usize> {
        self.flat_items.iter().position(|item| &item.id == id)
    }

    pub fn select(&mut self, id: &CanonicalId) -> bool {
        match self.find_index(id) {
            Some(index) => {
                self.selected_index = index;
                true
            }
            None => false,
        }
    }

    pub fn select_next(&mut self) {
        if self.selected_index + 1 < self.flat_items.len() {
            self.selected_index += 1;
        }
    }

    pub fn select_previous(&mut self) {
        self.selected_index = self.selected_index.saturating_sub(1);
    }

    pub fn select_first(&mut self) {
        self.selected_index = 0;
    }

    pub fn select_last(&mut self) {
        self.selected_index = self.flat_items.len().saturating_sub(1);
    }

    /// Update the scroll offset to ensure the selected item is visible.
    pub fn update_scroll(&mut self, visible_height: usize) {
        if visible_height == 0 {
            return;
        }
        if self.selected_index < self.scroll_offset {
            self.scroll_offset = self.selected_index;
        } else if self.selected_index >= self.scroll_offset + visible_height {
            self.scroll_offset = self.selected_index - visible_height + 1;
        }
    }
}
