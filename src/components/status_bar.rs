use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::Widget,
};

use crate::theme::ThemeColors;

const KEY_HINTS: &str = " j/k:move  l:expand  h:collapse  r:refresh  R:reload  q:quit ";

/// Status bar widget: source, cache/executor counters, key hints, or a
/// transient status message.
pub struct StatusBarWidget<'a> {
    source: &'a str,
    stats: &'a str,
    theme: &'a ThemeColors,
    status_message: Option<&'a str>,
    is_error: bool,
    watch_status: Option<&'a str>,
}

impl<'a> StatusBarWidget<'a> {
    pub fn new(source: &'a str, stats: &'a str, theme: &'a ThemeColors) -> Self {
        Self {
            source,
            stats,
            theme,
            status_message: None,
            is_error: false,
            watch_status: None,
        }
    }

    pub fn status_message(mut self, msg: &'a str, is_error: bool) -> Self {
        self.status_message = Some(msg);
        self.is_error = is_error;
        self
    }

    pub fn watch_status(mut self, status: &'a str) -> Self {
        self.watch_status = Some(status);
        self
    }
}

/// Keep the last `budget` characters, marking the cut with `...`.
fn tail(s: &str, budget: usize) -> String {
    let len = s.chars().count();
    if len <= budget {
        return s.to_string();
    }
    if budget <= 3 {
        return s.chars().take(budget).collect();
    }
    let kept: String = s.chars().skip(len - (budget - 3)).collect();
    format!("...{}", kept)
}

impl<'a> Widget for StatusBarWidget<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.height == 0 || area.width == 0 {
            return;
        }

        let width = area.width as usize;

        if let Some(msg) = self.status_message {
            let style = if self.is_error {
                Style::default()
                    .bg(self.theme.error_fg)
                    .fg(self.theme.status_fg)
            } else {
                Style::default().fg(self.theme.success_fg)
            };

            let display: String = msg.chars().take(width).collect();
            let display = format!("{:<width$}", display, width = width);
            let line = Line::from(Span::styled(display, style));
            buf.set_line(area.x, area.y, &line, area.width);
            return;
        }

        // Normal bar: [source] [stats] [watch] [key_hints]
        let hints_len = KEY_HINTS.chars().count();
        // Leading space plus the flag itself.
        let watch_len = self.watch_status.map_or(0, |w| 1 + w.chars().count());
        let remaining = width.saturating_sub(hints_len).saturating_sub(watch_len);
        let stats_len = self.stats.chars().count();
        let source_budget = remaining.saturating_sub(stats_len).saturating_sub(1);
        let source_display = tail(self.source, source_budget);
        let stats_display: String = self
            .stats
            .chars()
            .take(remaining.saturating_sub(source_display.chars().count()))
            .collect();

        let gap = remaining
            .saturating_sub(source_display.chars().count())
            .saturating_sub(stats_display.chars().count());

        let mut spans = vec![
            Span::styled(source_display, Style::default().fg(self.theme.status_fg)),
            Span::raw(" ".repeat(gap)),
            Span::styled(stats_display, Style::default().fg(self.theme.info_fg)),
        ];

        if let Some(watch) = self.watch_status {
            spans.push(Span::raw(" "));
            spans.push(Span::styled(
                watch.to_string(),
                Style::default()
                    .fg(self.theme.warning_fg)
                    .add_modifier(Modifier::BOLD),
            ));
        }

        let used: usize = spans.iter().map(|s| s.content.chars().count()).sum();
        let pad = width.saturating_sub(used).saturating_sub(hints_len);
        if pad > 0 {
            spans.push(Span::raw(" ".repeat(pad)));
        }
        spans.push(Span::styled(
            KEY_HINTS,
            Style::default()
                .fg(self.theme.dim_fg)
                .add_modifier(Modifier::DIM),
        ));

        buf.set_style(area, Style::default().bg(self.theme.status_bg));
        let line = Line::from(spans);
        buf.set_line(area.x, area.y, &line, area.width);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::theme;
    use ratatui::style::Color;

    fn test_theme() -> ThemeColors {
        theme::dark_theme()
    }

    fn row(buf: &Buffer, width: u16) -> String {
        (0..width)
            .map(|x| buf.cell((x, 0)).unwrap().symbol().to_string())
            .collect()
    }

    #[test]
    fn test_status_message_success() {
        let tc = test_theme();
        let widget = StatusBarWidget::new("/path", "info", &tc).status_message("Reloaded", false);

        let area = Rect::new(0, 0, 80, 1);
        let mut buf = Buffer::empty(area);
        widget.render(area, &mut buf);

        assert!(row(&buf, 80).contains("Reloaded"));
        let cell = buf.cell((0, 0)).unwrap();
        assert_eq!(cell.fg, Color::Rgb(166, 227, 161));
    }

    #[test]
    fn test_status_message_error() {
        let tc = test_theme();
        let widget = StatusBarWidget::new("/path", "info", &tc)
            .status_message("executor is not running", true);

        let area = Rect::new(0, 0, 80, 1);
        let mut buf = Buffer::empty(area);
        widget.render(area, &mut buf);

        assert!(row(&buf, 80).contains("executor is not running"));
        let cell = buf.cell((0, 0)).unwrap();
        assert_eq!(cell.bg, Color::Rgb(243, 139, 168));
        assert_eq!(cell.fg, Color::Rgb(205, 214, 244));
    }

    #[test]
    fn test_normal_bar_rendering() {
        let tc = test_theme();
        let widget = StatusBarWidget::new("/home/user/project", "12 nodes | queue 0", &tc)
            .watch_status("[no watch]");

        let area = Rect::new(0, 0, 120, 1);
        let mut buf = Buffer::empty(area);
        widget.render(area, &mut buf);

        let content = row(&buf, 120);
        assert!(content.contains("/home/user/project"));
        assert!(content.contains("12 nodes | queue 0"));
        assert!(content.contains("[no watch]"));
        assert!(content.contains("r:refresh"));
        assert!(content.contains("R:reload"));
    }

    #[test]
    fn test_watch_flag_does_not_push_hints_off_a_narrow_bar() {
        let tc = test_theme();
        let widget = StatusBarWidget::new(
            "/home/user/some/deeply/nested/project/directory",
            "12 nodes | 12 watched | queue 0 | wakes 3 | worker running",
            &tc,
        )
        .watch_status("[no watch]");

        let area = Rect::new(0, 0, 90, 1);
        let mut buf = Buffer::empty(area);
        widget.render(area, &mut buf);

        let content = row(&buf, 90);
        assert!(content.contains("[no watch]"));
        assert!(content.ends_with(KEY_HINTS));
    }

    #[test]
    fn test_long_source_is_truncated_from_the_left() {
        assert_eq!(tail("/a/very/long/path", 10), "...ng/path");
        assert_eq!(tail("short", 10), "short");
        assert_eq!(tail("/ünïcode/päth", 8), ".../päth");
    }

    #[test]
    fn test_zero_area_does_not_panic() {
        let tc = test_theme();
        let widget = StatusBarWidget::new("/path", "info", &tc);
        let area = Rect::new(0, 0, 0, 0);
        let mut buf = Buffer::empty(area);
        widget.render(area, &mut buf);
    }
}
