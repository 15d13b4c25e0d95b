use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

use crate::security::{AuthResults, TransportSummary};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub name: Option<String>,
    pub email: String,
}

impl Address {
    /// Name only (for compact list views), falls back to email.
    pub fn short_display(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.email.clone())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} <{}>", name, self.email),
            None => write!(f, "{}", self.email),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn size_display(&self) -> String {
        let len = self.bytes.len();
        if len < 1024 {
            format!("{} B", len)
        } else if len < 1024 * 1024 {
            format!("{:.1} KB", len as f64 / 1024.0)
        } else {
            format!("{:.1} MB", len as f64 / (1024.0 * 1024.0))
        }
    }
}

/// A single received mail, already parsed into the facets the detail view shows.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: String,
    pub subject: String,
    pub from: Option<Address>,
    /// Raw `To:` header text.
    pub to: String,
    pub received_at: DateTime<Utc>,
    /// Display body: the text/plain part, or the HTML part converted to text.
    pub text: String,
    /// The text/plain part exactly as sent.
    pub raw_text: Option<String>,
    pub html: Option<String>,
    pub links: Vec<String>,
    pub attachments: Vec<Attachment>,
    /// Unfolded headers in file order.
    pub headers: Vec<(String, String)>,
    pub auth: AuthResults,
    pub transport: TransportSummary,
}

impl Default for Message {
    fn default() -> Self {
        Self {
            id: String::new(),
            subject: String::new(),
            from: None,
            to: String::new(),
            received_at: Utc::now(),
            text: String::new(),
            raw_text: None,
            html: None,
            links: Vec::new(),
            attachments: Vec::new(),
            headers: Vec::new(),
            auth: AuthResults::default(),
            transport: TransportSummary::default(),
        }
    }
}

impl Message {
    /// Short form for the message list (name only, falls back to email).
    pub fn from_display(&self) -> String {
        self.from
            .as_ref()
            .map(|a| a.short_display())
            .unwrap_or_else(|| "(unknown)".to_string())
    }

    pub fn subject_display(&self) -> &str {
        if self.subject.trim().is_empty() {
            "(no subject)"
        } else {
            &self.subject
        }
    }

    pub fn date_display(&self) -> String {
        let now = Utc::now();
        let date = self.received_at;
        if now.date_naive() == date.date_naive() {
            date.format("%H:%M").to_string()
        } else if (now - date).num_days() < 7 {
            date.format("%a %H:%M").to_string()
        } else if now.format("%Y").to_string() == date.format("%Y").to_string() {
            date.format("%b %d").to_string()
        } else {
            date.format("%Y-%m-%d").to_string()
        }
    }

    /// Headers sorted by name; headers sharing a name keep their file order.
    pub fn sorted_headers(&self) -> Vec<(&str, &str)> {
        let mut headers: Vec<(&str, &str)> = self
            .headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        headers.sort_by_key(|(k, _)| k.to_ascii_lowercase());
        headers
    }
}

/// A message plus the label of the mailbox that delivered it.
///
/// Two items are the same entity when their message IDs match, whatever
/// mailbox they came from.
#[derive(Debug, Clone)]
pub struct MessageItem {
    pub message: Arc<Message>,
    pub mailbox: String,
}

impl MessageItem {
    pub fn new(message: Arc<Message>, mailbox: impl Into<String>) -> Self {
        Self {
            message,
            mailbox: mailbox.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.message.id
    }
}

impl PartialEq for MessageItem {
    fn eq(&self, other: &Self) -> bool {
        self.message.id == other.message.id
    }
}

impl Eq for MessageItem {}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: &str) -> Arc<Message> {
        Arc::new(Message {
            id: id.to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn items_compare_by_message_id_only() {
        let a = MessageItem::new(msg("1"), "a@x.test");
        let b = MessageItem::new(msg("1"), "b@x.test");
        let c = MessageItem::new(msg("2"), "a@x.test");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn empty_subject_gets_placeholder() {
        let m = Message {
            subject: "  ".into(),
            ..Default::default()
        };
        assert_eq!(m.subject_display(), "(no subject)");
    }

    #[test]
    fn from_display_prefers_name() {
        let mut m = Message::default();
        assert_eq!(m.from_display(), "(unknown)");
        m.from = Some(Address {
            name: None,
            email: "bob@example.com".into(),
        });
        assert_eq!(m.from_display(), "bob@example.com");
        m.from = Some(Address {
            name: Some("Bob".into()),
            email: "bob@example.com".into(),
        });
        assert_eq!(m.from_display(), "Bob");
        assert_eq!(m.from.unwrap().to_string(), "Bob <bob@example.com>");
    }

    #[test]
    fn headers_sort_case_insensitively_and_stably() {
        let m = Message {
            headers: vec![
                ("Subject".into(), "hi".into()),
                ("received".into(), "b".into()),
                ("From".into(), "x".into()),
                ("Received".into(), "a".into()),
            ],
            ..Default::default()
        };
        let sorted = m.sorted_headers();
        assert_eq!(
            sorted,
            vec![
                ("From", "x"),
                ("received", "b"),
                ("Received", "a"),
                ("Subject", "hi"),
            ]
        );
    }

    #[test]
    fn attachment_sizes() {
        let a = |n: usize| Attachment {
            filename: "f".into(),
            content_type: "application/octet-stream".into(),
            bytes: vec![0; n],
        };
        assert_eq!(a(10).size_display(), "10 B");
        assert_eq!(a(2048).size_display(), "2.0 KB");
        assert_eq!(a(3 * 1024 * 1024).size_display(), "3.0 MB");
    }
}
