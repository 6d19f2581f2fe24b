use ratatui::{
    layout::{Constraint, Direction, Layout},
    style::Style,
    text::Span,
    widgets::{Block, Borders},
    Frame,
};

use crate::app::App;
use crate::components::inspector::InspectorWidget;
use crate::components::status_bar::StatusBarWidget;
use crate::components::tree::TreeWidget;

/// Render the application UI.
pub fn render(app: &mut App, frame: &mut Frame) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(1)])
        .split(frame.area());
    let panes = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(rows[0]);

    // Update scroll offset to keep selected item visible
    let visible_height = panes[0].height.saturating_sub(2) as usize; // account for border
    app.view.update_scroll(visible_height);

    let theme = &app.theme;
    let title = app
        .cache
        .root_id()
        .and_then(|id| app.cache.get(id))
        .map(|root| format!(" {} ", root.info.name))
        .unwrap_or_else(|| " (empty) ".to_string());

    let tree_block = Block::default()
        .title(Span::styled(title, Style::default().fg(theme.accent_fg)))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.border_focused_fg));
    frame.render_widget(TreeWidget::new(&app.view, theme).block(tree_block), panes[0]);

    let inspector_block = Block::default()
        .title(" Element ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.border_fg));
    let mut inspector = InspectorWidget::new(app.selected_node(), theme).block(inspector_block);
    if let Some(path) = app.selected_path() {
        inspector = inspector.path(path);
    }
    frame.render_widget(inspector, panes[1]);

    let stats = app.stats();
    let mut status = StatusBarWidget::new(&app.source_label, &stats, theme);
    if let Some((msg, _, is_error)) = &app.status_message {
        status = status.status_message(msg, *is_error);
    }
    if !app.watching {
        status = status.watch_status("[no watch]");
    }
    frame.render_widget(status, rows[1]);
}
