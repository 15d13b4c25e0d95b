use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    widgets::Widget,
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::message::MessageItem;

pub struct MessageList<'a> {
    pub items: &'a [&'a MessageItem],
    pub selected: usize,
    /// Prefix each row with its mailbox when several are watched.
    pub show_mailbox: bool,
}

impl<'a> MessageList<'a> {
    /// Rows `[start, end)` to draw so that `selected` stays on screen.
    ///
    /// The offset is derived from the selection alone, so the list needs
    /// no scroll state of its own.
    pub fn visible_range(selected: usize, height: usize, total: usize) -> (usize, usize) {
        if height == 0 || total == 0 {
            return (0, 0);
        }
        let selected = selected.min(total - 1);
        let start = (selected + 1).saturating_sub(height);
        (start, (start + height).min(total))
    }
}

impl<'a> Widget for MessageList<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if self.items.is_empty() {
            let style = Style::default().fg(Color::DarkGray);
            buf.set_string(
                area.x + 2,
                area.y + area.height / 2,
                "No messages",
                style,
            );
            return;
        }

        let (start, end) =
            Self::visible_range(self.selected, area.height as usize, self.items.len());
        let w = area.width as usize;

        for (i, item) in self.items[start..end].iter().enumerate() {
            let y = area.y + i as u16;
            let is_selected = start + i == self.selected;
            let message = &item.message;

            let base_style = if is_selected {
                Style::default().bg(Color::Indexed(236)).fg(Color::White)
            } else {
                Style::default()
            };
            buf.set_style(Rect::new(area.x, y, area.width, 1), base_style);

            let marker = if is_selected { "> " } else { "  " };
            buf.set_string(
                area.x,
                y,
                marker,
                base_style.fg(Color::Cyan).add_modifier(Modifier::BOLD),
            );
            let mut x = area.x + 2;

            if self.show_mailbox {
                let label = truncate_str(&item.mailbox, 18.min(w.saturating_sub(2)));
                buf.set_string(x, y, &label, base_style.fg(Color::Magenta));
                x += 19;
            }

            let from_width = 20.min(w.saturating_sub((x - area.x) as usize));
            let from = truncate_str(&message.from_display(), from_width);
            buf.set_string(x, y, &from, base_style.add_modifier(Modifier::BOLD));

            let date = message.date_display();
            let date_width = date.width();
            let date_x = if w > date_width + 1 {
                area.x + area.width - date_width as u16 - 1
            } else {
                area.x + area.width.saturating_sub(1)
            };
            buf.set_string(date_x, y, &date, base_style.fg(Color::DarkGray));

            let subject_start = x + from_width as u16 + 1;
            let subject_end = date_x.saturating_sub(1);
            if subject_start < subject_end {
                let subject_width = (subject_end - subject_start) as usize;
                let subject = truncate_str(message.subject_display(), subject_width);
                buf.set_string(subject_start, y, &subject, base_style);
            }
        }
    }
}

/// Fit `s` into `max_width` terminal columns, ending in `~` when cut.
fn truncate_str(s: &str, max_width: usize) -> String {
    if max_width == 0 {
        return String::new();
    }
    if s.width() <= max_width {
        return s.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for c in s.chars() {
        let cw = c.width().unwrap_or(0);
        if used + cw + 1 > max_width {
            break;
        }
        out.push(c);
        used += cw;
    }
    out.push('~');
    out
}
