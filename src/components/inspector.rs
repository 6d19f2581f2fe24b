use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Widget},
};

use crate::theme::ThemeColors;
use crate::tree::{CachedNode, Expansion};

/// Attribute panel for the selected cached node.
pub struct InspectorWidget<'a> {
    node: Option<&'a CachedNode>,
    path: Option<String>,
    theme: &'a ThemeColors,
    block: Option<Block<'a>>,
}

impl<'a> InspectorWidget<'a> {
    pub fn new(node: Option<&'a CachedNode>, theme: &'a ThemeColors) -> Self {
        Self {
            node,
            path: None,
            theme,
            block: None,
        }
    }

    /// Names from the root down to the node.
    pub fn path(mut self, path: String) -> Self {
        self.path = Some(path);
        self
    }

    pub fn block(mut self, block: Block<'a>) -> Self {
        self.block = block.into();
        self
    }

    fn rows(node: &CachedNode, path: Option<String>) -> Vec<(&'static str, String)> {
        let expansion = match node.expansion {
            Expansion::Expanded => format!("expanded ({} children)", node.children.len()),
            Expansion::Lazy { has_children: true } => "collapsed, has children".to_string(),
            Expansion::Lazy {
                has_children: false,
            } => "collapsed, no children".to_string(),
        };
        let mut rows = vec![
            ("name", node.info.name.clone()),
            ("kind", node.info.kind.clone()),
            (
                "owner",
                node.info.owner.clone().unwrap_or_else(|| "-".to_string()),
            ),
            ("id", node.id.to_string()),
            (
                "parent",
                node.parent
                    .as_ref()
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ),
            ("state", expansion),
            (
                "watch",
                node.subscription
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "none".to_string()),
            ),
        ];
        if let Some(path) = path {
            rows.push(("path", path));
        }
        rows
    }
}

impl<'a> Widget for InspectorWidget<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let inner = if let Some(block) = self.block {
            let inner = block.inner(area);
            block.render(area, buf);
            inner
        } else {
            area
        };

        if inner.width == 0 || inner.height == 0 {
            return;
        }

        let Some(node) = self.node else {
            let line = Line::from(Span::styled(
                "Nothing selected",
                Style::default().fg(self.theme.dim_fg),
            ));
            buf.set_line(inner.x, inner.y, &line, inner.width);
            return;
        };

        let key_style = Style::default()
            .fg(self.theme.inspector_key_fg)
            .add_modifier(Modifier::BOLD);
        let value_style = Style::default().fg(self.theme.inspector_value_fg);

        for (i, (key, value)) in Self::rows(node, self.path)
            .into_iter()
            .take(inner.height as usize)
            .enumerate()
        {
            let line = Line::from(vec![
                Span::styled(format!("{:<7}", key), key_style),
                Span::styled(value, value_style),
            ]);
            buf.set_line(inner.x, inner.y + i as u16, &line, inner.width);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::identity::RuntimeId;
    use crate::provider::memory::id_of;
    use crate::provider::ElementInfo;
    use crate::theme;
    use ratatui::widgets::Borders;

    fn node() -> CachedNode {
        CachedNode {
            id: id_of(42),
            info: ElementInfo {
                runtime_id: Some(RuntimeId::Ints(vec![42])),
                name: "Editor".to_string(),
                kind: "window".to_string(),
                owner: Some("memory".to_string()),
                has_children: true,
            },
            parent: Some(id_of(0)),
            children: Vec::new(),
            expansion: Expansion::Lazy { has_children: true },
            subscription: None,
        }
    }

    fn text(buf: &Buffer, width: u16, height: u16) -> String {
        (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|pos| buf.cell(pos).unwrap().symbol().to_string())
            .collect()
    }

    #[test]
    fn shows_node_attributes() {
        let node = node();
        let tc = theme::dark_theme();
        let area = Rect::new(0, 0, 40, 10);
        let mut buf = Buffer::empty(area);
        InspectorWidget::new(Some(&node), &tc)
            .path("desktop / Editor".to_string())
            .block(Block::default().borders(Borders::ALL))
            .render(area, &mut buf);

        let content = text(&buf, 40, 10);
        assert!(content.contains("desktop / Editor"));
        assert!(content.contains("Editor"));
        assert!(content.contains("002A"));
        assert!(content.contains("collapsed, has children"));
        assert!(content.contains("none"));
    }

    #[test]
    fn empty_selection_shows_placeholder() {
        let tc = theme::dark_theme();
        let area = Rect::new(0, 0, 30, 2);
        let mut buf = Buffer::empty(area);
        InspectorWidget::new(None, &tc).render(area, &mut buf);
        assert!(text(&buf, 30, 1).contains("Nothing selected"));
    }
}
