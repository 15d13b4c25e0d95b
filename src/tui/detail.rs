use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget, Wrap},
};

use super::{App, Cursor, DetailTab, TABS};
use crate::message::Message;
use crate::security::{self, AuthVerdict};

/// Raw HTML beyond this many bytes is cut off in the Raw tab.
pub const RAW_HTML_LIMIT: usize = 4096;

pub struct DetailView<'a> {
    pub app: &'a App,
}

impl<'a> Widget for DetailView<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let Some(item) = self.app.selected_message.as_ref() else {
            return;
        };
        if area.height < 2 {
            return;
        }

        buf.set_line(area.x, area.y, &tab_bar(self.app.detail_tab), area.width);

        let body = Rect::new(area.x, area.y + 1, area.width, area.height - 1);
        let info = self.app.detail_tab.info();
        let lines = (info.render)(self.app, &item.message);

        // Cursor tabs scroll to keep the marked row visible; the others
        // scroll freely and wrap long lines.
        let paragraph = match info.cursor {
            Some(cursor) => {
                let row = match cursor {
                    Cursor::Link => self.app.selected_link,
                    Cursor::Attachment => self.app.selected_attachment,
                };
                let visible = body.height.saturating_sub(1) as usize;
                let scroll = (row + 1).saturating_sub(visible) as u16;
                Paragraph::new(lines).scroll((scroll, 0))
            }
            None => Paragraph::new(lines)
                .wrap(Wrap { trim: false })
                .scroll((self.app.detail_scroll, 0)),
        };

        paragraph
            .block(
                Block::default()
                    .borders(Borders::TOP)
                    .border_style(Style::default().fg(Color::DarkGray)),
            )
            .render(body, buf);
    }
}

pub fn tab_bar(active: DetailTab) -> Line<'static> {
    let mut spans = Vec::new();
    for (i, info) in TABS.iter().enumerate() {
        let style = if info.tab == active {
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Gray)
        };
        if i > 0 {
            spans.push(Span::raw(" "));
        }
        spans.push(Span::styled(format!(" {} {} ", i + 1, info.title), style));
    }
    Line::from(spans)
}

fn label_style() -> Style {
    Style::default().fg(Color::DarkGray)
}

fn field(label: &'static str, value: String) -> Line<'static> {
    Line::from(vec![
        Span::styled(label, label_style()),
        Span::styled(value, Style::default().fg(Color::White)),
    ])
}

fn muted(text: impl Into<String>) -> Line<'static> {
    Line::from(Span::styled(text.into(), label_style()))
}

pub fn content_lines(_app: &App, message: &Message) -> Vec<Line<'static>> {
    let mut lines = vec![
        field(
            "From:        ",
            message
                .from
                .as_ref()
                .map(|a| a.to_string())
                .unwrap_or_else(|| "(unknown)".to_string()),
        ),
        field("To:          ", message.to.clone()),
        field(
            "Date:        ",
            message.received_at.format("%Y-%m-%d %H:%M %Z").to_string(),
        ),
        Line::from(vec![
            Span::styled("Subject:     ", label_style()),
            Span::styled(
                message.subject_display().to_string(),
                Style::default()
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD),
            ),
        ]),
        field("Links:       ", message.links.len().to_string()),
        field("Attachments: ", message.attachments.len().to_string()),
        Line::from(""),
    ];

    if message.text.trim().is_empty() {
        lines.push(muted("(no content)"));
    } else {
        for line in message.text.lines() {
            let style = if line.starts_with('>') {
                Style::default().fg(Color::DarkGray)
            } else {
                Style::default().fg(Color::White)
            };
            lines.push(Line::from(Span::styled(line.to_string(), style)));
        }
    }
    lines
}

fn verdict_style(verdict: AuthVerdict) -> Style {
    match verdict {
        AuthVerdict::Pass => Style::default().fg(Color::Green),
        AuthVerdict::Fail | AuthVerdict::PermError => Style::default().fg(Color::Red),
        AuthVerdict::SoftFail | AuthVerdict::TempError => Style::default().fg(Color::Yellow),
        AuthVerdict::Neutral | AuthVerdict::None => Style::default().fg(Color::Gray),
    }
}

fn verdict_line(label: &'static str, verdict: AuthVerdict) -> Line<'static> {
    Line::from(vec![
        Span::styled(label, label_style()),
        Span::styled(verdict.to_string(), verdict_style(verdict)),
    ])
}

pub fn security_lines(_app: &App, message: &Message) -> Vec<Line<'static>> {
    let auth = &message.auth;
    let transport = &message.transport;
    let score = security::score(auth, transport);
    let score_style = match score {
        70..=100 => Style::default().fg(Color::Green),
        40..=69 => Style::default().fg(Color::Yellow),
        _ => Style::default().fg(Color::Red),
    };

    vec![
        muted("Authentication"),
        verdict_line("  SPF:   ", auth.spf),
        verdict_line("  DKIM:  ", auth.dkim),
        verdict_line("  DMARC: ", auth.dmarc),
        Line::from(""),
        muted("Transport"),
        field("  Hops:        ", transport.hops.to_string()),
        field(
            "  TLS:         ",
            if transport.tls { "yes" } else { "no" }.to_string(),
        ),
        field(
            "  First relay: ",
            transport
                .first_relay
                .clone()
                .unwrap_or_else(|| "(unknown)".to_string()),
        ),
        Line::from(""),
        Line::from(vec![
            Span::styled("Score: ", label_style()),
            Span::styled(
                format!("{}/100", score),
                score_style.add_modifier(Modifier::BOLD),
            ),
        ]),
    ]
}

fn cursor_row(selected: bool, text: String) -> Line<'static> {
    if selected {
        Line::from(vec![
            Span::styled(
                "> ",
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                text,
                Style::default().bg(Color::Indexed(236)).fg(Color::White),
            ),
        ])
    } else {
        Line::from(vec![Span::raw("  "), Span::raw(text)])
    }
}

pub fn link_lines(app: &App, message: &Message) -> Vec<Line<'static>> {
    if message.links.is_empty() {
        return vec![muted("No links")];
    }
    message
        .links
        .iter()
        .enumerate()
        .map(|(i, url)| cursor_row(i == app.selected_link, format!("[{}] {}", i + 1, url)))
        .collect()
}

pub fn attachment_lines(app: &App, message: &Message) -> Vec<Line<'static>> {
    let mut lines: Vec<Line<'static>> = if message.attachments.is_empty() {
        vec![muted("No attachments")]
    } else {
        message
            .attachments
            .iter()
            .enumerate()
            .map(|(i, a)| {
                cursor_row(
                    i == app.selected_attachment,
                    format!(
                        "[{}] {}  ({}, {})",
                        i + 1,
                        a.filename,
                        a.content_type,
                        a.size_display()
                    ),
                )
            })
            .collect()
    };
    if let Some(path) = &app.last_saved_attachment {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("Saved to {}", path.display()),
            Style::default().fg(Color::Green),
        )));
    }
    lines
}

pub fn raw_lines(_app: &App, message: &Message) -> Vec<Line<'static>> {
    let mut lines: Vec<Line<'static>> = message
        .sorted_headers()
        .into_iter()
        .map(|(name, value)| {
            Line::from(vec![
                Span::styled(format!("{}: ", name), Style::default().fg(Color::Cyan)),
                Span::raw(value.to_string()),
            ])
        })
        .collect();

    lines.push(Line::from(""));
    match &message.raw_text {
        Some(text) => lines.extend(text.lines().map(|l| Line::from(l.to_string()))),
        None => lines.push(muted("(no text part)")),
    }

    lines.push(Line::from(""));
    match &message.html {
        Some(html) => {
            let shown = truncate_html(html, RAW_HTML_LIMIT);
            lines.extend(shown.lines().map(|l| Line::from(l.to_string())));
        }
        None => lines.push(muted("(no HTML part)")),
    }
    lines
}

/// Cut `html` to at most `limit` bytes on a char boundary, noting how
/// much was dropped.
pub fn truncate_html(html: &str, limit: usize) -> String {
    if html.len() <= limit {
        return html.to_string();
    }
    let mut cut = limit;
    while !html.is_char_boundary(cut) {
        cut -= 1;
    }
    format!(
        "{}\u{2026} [{} more bytes]",
        &html[..cut],
        html.len() - cut
    )
}
