use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Widget,
};
use unicode_width::UnicodeWidthStr;

use super::ConnectionState;

pub struct TopBar<'a> {
    pub title: &'a str,
    pub connection: ConnectionState,
}

impl<'a> Widget for TopBar<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let style = Style::default().bg(Color::DarkGray).fg(Color::White);
        buf.set_style(area, style);

        let title_bg = match self.connection {
            ConnectionState::Connected => Color::Blue,
            ConnectionState::Connecting => Color::Yellow,
            ConnectionState::Disconnected => Color::Red,
        };
        let left = Line::from(vec![Span::styled(
            format!(" {} ", self.title),
            Style::default()
                .bg(title_bg)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )]);
        buf.set_line(area.x, area.y, &left, area.width);

        let right = " inboxwatch ";
        let right_len = right.width() as u16;
        if area.width > right_len + left.width() as u16 {
            let rx = area.x + area.width - right_len;
            buf.set_string(rx, area.y, right, style);
        }
    }
}

pub struct BottomBar<'a> {
    pub hints: &'a str,
    /// In-flight command note, e.g. "Saving…".
    pub status: Option<&'a str>,
    pub error: Option<&'a str>,
}

impl<'a> Widget for BottomBar<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let style = Style::default().bg(Color::DarkGray).fg(Color::White);
        buf.set_style(area, style);

        let mut spans = Vec::new();
        if let Some(err) = self.error {
            spans.push(Span::styled(
                format!(" {} ", err),
                Style::default()
                    .bg(Color::Red)
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD),
            ));
        }
        if let Some(status) = self.status {
            spans.push(Span::styled(
                format!(" {} ", status),
                style.fg(Color::Yellow),
            ));
        }
        spans.push(Span::styled(format!(" {}", self.hints), style));

        buf.set_line(area.x, area.y, &Line::from(spans), area.width);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(buf: &Buffer) -> String {
        (0..buf.area.width)
            .map(|x| buf[(x, 0)].symbol().to_string())
            .collect()
    }

    #[test]
    fn top_bar_shows_title() {
        let area = Rect::new(0, 0, 50, 1);
        let mut buf = Buffer::empty(area);
        TopBar {
            title: "Disconnected",
            connection: ConnectionState::Disconnected,
        }
        .render(area, &mut buf);
        let text = row(&buf);
        assert!(text.starts_with(" Disconnected "));
        assert!(text.ends_with(" inboxwatch "));
        assert_eq!(buf[(1, 0)].bg, Color::Red);
    }

    #[test]
    fn bottom_bar_puts_error_first() {
        let area = Rect::new(0, 0, 60, 1);
        let mut buf = Buffer::empty(area);
        BottomBar {
            hints: "q quit",
            status: Some("Saving"),
            error: Some("boom"),
        }
        .render(area, &mut buf);
        let text = row(&buf);
        let err = text.find("boom").unwrap();
        let status = text.find("Saving").unwrap();
        let hints = text.find("q quit").unwrap();
        assert!(err < status && status < hints);
    }
}
