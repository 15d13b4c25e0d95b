use chrono::{DateTime, Utc};
use mail_parser::{MessageParser, MimeHeaders, PartType};
use regex::Regex;
use std::sync::OnceLock;

use crate::error::{Error, Result};
use crate::message::{Address, Attachment, Message};
use crate::security::{AuthResults, TransportSummary};

/// Width used when an HTML-only body has to be flattened to text.
const HTML_TEXT_WIDTH: usize = 100;

fn html_to_text(html: &[u8], width: usize) -> String {
    html2text::from_read(html, width).unwrap_or_else(|_| "[HTML rendering error]".to_string())
}

/// Parse a raw RFC 5322 message.
///
/// `fallback_id` is used when the message has no `Message-ID`, and
/// `fallback_date` when it has no parseable `Date`.
pub fn parse_message(
    raw: &[u8],
    fallback_id: &str,
    fallback_date: DateTime<Utc>,
) -> Result<Message> {
    let parsed = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| Error::Parse(format!("{}: not a MIME message", fallback_id)))?;

    let headers = split_headers(raw);

    let id = parsed
        .message_id()
        .map(str::to_string)
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| fallback_id.to_string());

    let from = parsed
        .from()
        .and_then(|addr| addr.first())
        .map(|a| Address {
            name: a.name().map(str::to_string),
            email: a.address().unwrap_or_default().to_string(),
        });

    let received_at = parsed
        .date()
        .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0))
        .unwrap_or(fallback_date);

    let mut raw_text = None;
    let mut html = None;
    for part in parsed.parts.iter() {
        if part.attachment_name().is_some() {
            continue;
        }
        match &part.body {
            PartType::Text(text) if raw_text.is_none() && is_plain(part) => {
                raw_text = Some(text.to_string());
            }
            PartType::Html(body) if html.is_none() => {
                html = Some(body.to_string());
            }
            _ => {}
        }
    }

    let text = match (&raw_text, &html) {
        (Some(t), _) => t.clone(),
        (None, Some(h)) => html_to_text(h.as_bytes(), HTML_TEXT_WIDTH),
        (None, None) => String::new(),
    };

    let attachments = parsed
        .attachments()
        .map(|part| Attachment {
            filename: part.attachment_name().unwrap_or("attachment").to_string(),
            content_type: part
                .content_type()
                .map(|ct| match ct.subtype() {
                    Some(sub) => format!("{}/{}", ct.ctype(), sub),
                    None => ct.ctype().to_string(),
                })
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            bytes: part.contents().to_vec(),
        })
        .collect();

    let links = extract_links(html.as_deref(), raw_text.as_deref());
    let auth = AuthResults::from_headers(&headers);
    let transport = TransportSummary::from_headers(&headers);

    Ok(Message {
        id,
        subject: parsed.subject().unwrap_or_default().to_string(),
        from,
        to: header_value(&headers, "To").unwrap_or_default().to_string(),
        received_at,
        text,
        raw_text,
        html,
        links,
        attachments,
        headers,
        auth,
        transport,
    })
}

fn is_plain(part: &mail_parser::MessagePart) -> bool {
    part.content_type().map_or(true, |ct| {
        ct.ctype().eq_ignore_ascii_case("text")
            && ct.subtype().map_or(true, |s| s.eq_ignore_ascii_case("plain"))
    })
}

fn header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Split the header block off a raw message and unfold continuation lines.
pub fn split_headers(raw: &[u8]) -> Vec<(String, String)> {
    let text = String::from_utf8_lossy(raw);
    let mut headers: Vec<(String, String)> = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            break;
        }
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some((_, value)) = headers.last_mut() {
                if !value.is_empty() {
                    value.push(' ');
                }
                value.push_str(line.trim());
            }
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }
    headers
}

fn href_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)href\s*=\s*["'](https?://[^"']+)["']"#).ok())
        .as_ref()
}

fn url_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"https?://[^\s<>"'()\[\]]+"#).ok())
        .as_ref()
}

/// Unique http(s) links: HTML `href`s first, then bare URLs in the text part.
pub fn extract_links(html: Option<&str>, text: Option<&str>) -> Vec<String> {
    let mut links: Vec<String> = Vec::new();
    let mut push = |url: &str| {
        let url = url.trim_end_matches(['.', ',', ';', ':', '!', '?']);
        if !url.is_empty() && !links.iter().any(|l| l == url) {
            links.push(url.to_string());
        }
    };
    if let (Some(html), Some(re)) = (html, href_re()) {
        for caps in re.captures_iter(html) {
            push(&caps[1].replace("&amp;", "&"));
        }
    }
    if let (Some(text), Some(re)) = (text, url_re()) {
        for m in re.find_iter(text) {
            push(m.as_str());
        }
    }
    links
}
