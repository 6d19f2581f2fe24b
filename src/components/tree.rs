use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Widget},
};

use crate::theme::ThemeColors;
use crate::tree::{FlatItem, TreeView};

/// Tree widget that renders the cached tree with box-drawing characters.
pub struct TreeWidget<'a> {
    view: &'a TreeView,
    theme: &'a ThemeColors,
    block: Option<Block<'a>>,
}

impl<'a> TreeWidget<'a> {
    pub fn new(view: &'a TreeView, theme: &'a ThemeColors) -> Self {
        Self {
            view,
            theme,
            block: None,
        }
    }

    pub fn block(mut self, block: Block<'a>) -> Self {
        self.block = block.into();
        self
    }

    /// Build the prefix string for tree indentation using box-drawing characters.
    ///
    /// Continuation lines depend on whether each ancestor is a last sibling,
    /// found by walking back to the nearest item at that depth.
    fn build_prefix(item: &FlatItem, items: &[FlatItem], item_index: usize) -> String {
        if item.depth == 0 {
            return String::new();
        }

        let mut parts: Vec<&str> = Vec::new();
        for d in 1..item.depth {
            let mut ancestor_is_last = false;
            for j in (0..item_index).rev() {
                if items[j].depth == d {
                    ancestor_is_last = items[j].is_last_sibling;
                    break;
                }
                if items[j].depth < d {
                    break;
                }
            }
            parts.push(if ancestor_is_last { "   " } else { "│  " });
        }

        parts.push(if item.is_last_sibling {
            "└──"
        } else {
            "├──"
        });
        parts.join("")
    }

    /// Expansion marker: `[-]` expanded, `[+]` collapsed with children.
    fn item_indicator(item: &FlatItem) -> &'static str {
        match (item.is_expanded, item.has_children) {
            (true, true) => "[-] ",
            (false, true) => "[+] ",
            _ => " ·  ",
        }
    }
}

impl<'a> Widget for TreeWidget<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let inner_area = if let Some(block) = &self.block {
            let inner = block.inner(area);
            block.clone().render(area, buf);
            inner
        } else {
            area
        };

        let items = &self.view.flat_items;
        let selected = self.view.selected_index;
        let visible_height = inner_area.height as usize;

        if items.is_empty() || visible_height == 0 {
            return;
        }

        let scroll = self.view.scroll_offset;
        let visible_items = items.iter().enumerate().skip(scroll).take(visible_height);

        for (i, (idx, item)) in visible_items.enumerate() {
            let y = inner_area.y + i as u16;

            let prefix = Self::build_prefix(item, items, idx);
            let indicator = Self::item_indicator(item);

            let style = if idx == selected {
                Style::default()
                    .bg(self.theme.tree_selected_bg)
                    .fg(self.theme.tree_selected_fg)
                    .add_modifier(Modifier::BOLD)
            } else if item.has_children {
                Style::default()
                    .fg(self.theme.tree_branch_fg)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(self.theme.tree_leaf_fg)
            };

            let mut spans = vec![
                Span::styled(prefix, Style::default().fg(self.theme.tree_guide_fg)),
                Span::styled(format!("{}{}", indicator, item.label), style),
            ];
            if !item.subscribed {
                spans.push(Span::styled(
                    " (unwatched)",
                    Style::default().fg(self.theme.warning_fg),
                ));
            }

            let line = Line::from(spans);
            buf.set_line(inner_area.x, y, &line, inner_area.width);
        }
    }
}
