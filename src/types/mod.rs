//! Core types for mail composition.
//!
//! This module provides:
//! - Address and attachment types
//! - Priority and importance axes
//! - The ordered, duplicate-tolerant header mapping
//! - The immutable [`Message`] produced by a session and the
//!   [`Envelope`] derived from it for relay submission
//!
//! Addresses are carried as opaque strings: composition performs no
//! validation, and a relay that dislikes a mailbox rejects it at
//! MAIL FROM/RCPT TO time.

use std::fmt;

use crate::errors::{MailerError, MailerResult};

/// A mailbox, optionally paired with a display name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    /// Display name shown by mail clients.
    pub name: Option<String>,
    /// The mailbox itself, kept exactly as given.
    pub email: String,
}

impl Address {
    /// Creates a bare address.
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            name: None,
            email: email.into(),
        }
    }

    /// Creates a named address.
    pub fn with_name(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            email: email.into(),
        }
    }

    /// Splits `Name <box@host>` notation; anything without a bracketed
    /// mailbox is taken as a bare address verbatim.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();

        let bracketed = s.find('<').and_then(|start| {
            let end = s.rfind('>')?;
            if end <= start {
                return None;
            }
            let name = s[..start].trim().trim_matches('"');
            Some((name, s[start + 1..end].trim()))
        });

        match bracketed {
            Some(("", email)) => Self::new(email),
            Some((name, email)) => Self::with_name(name, email),
            None => Self::new(s),
        }
    }

    /// The mailbox without any display name.
    pub fn email(&self) -> &str {
        &self.email
    }

    /// The display name, when one was given.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Header rendering: quotes the display name unless it is a plain
    /// run of alphanumerics and spaces.
    pub fn to_header(&self) -> String {
        match &self.name {
            None => self.email.clone(),
            Some(name) => {
                let atom_safe = name.chars().all(|c| c.is_alphanumeric() || c == ' ');
                if atom_safe {
                    format!("{} <{}>", name, self.email)
                } else {
                    format!("\"{}\" <{}>", name, self.email)
                }
            }
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_header())
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Address::parse(s)
    }
}

impl From<String> for Address {
    fn from(s: String) -> Self {
        Address::parse(&s)
    }
}

impl<N: Into<String>, E: Into<String>> From<(N, E)> for Address {
    fn from((name, email): (N, E)) -> Self {
        Address::with_name(name, email)
    }
}

/// File attachment: a filename, a content type, and opaque bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Filename presented to the recipient.
    pub filename: String,
    /// MIME content type.
    pub content_type: String,
    /// Binary content.
    pub data: Vec<u8>,
}

impl Attachment {
    /// Creates an attachment with an explicit content type.
    pub fn new(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            data,
        }
    }

    /// Creates an attachment, guessing the content type from the
    /// filename extension (octet-stream when nothing matches).
    pub fn from_file(filename: impl Into<String>, data: Vec<u8>) -> Self {
        let filename = filename.into();
        let guessed = mime_guess::from_path(&filename).first_or_octet_stream();
        Self {
            content_type: guessed.to_string(),
            filename,
            data,
        }
    }
}

/// Transfer priority, serialized as the X-Priority header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
    /// Low priority (X-Priority: 5).
    Low,
    /// Normal priority, no header written.
    #[default]
    Normal,
    /// High priority (X-Priority: 1).
    High,
}

impl Priority {
    /// Header value, `None` for the normal default.
    pub fn header_value(&self) -> Option<&'static str> {
        match self {
            Priority::High => Some("1"),
            Priority::Normal => None,
            Priority::Low => Some("5"),
        }
    }
}

/// Reader-facing importance, serialized as the Importance header.
/// Independent of [`Priority`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Importance {
    /// Low importance.
    Low,
    /// Normal importance, no header written.
    #[default]
    Normal,
    /// High importance.
    High,
}

impl Importance {
    /// Header value, `None` for the normal default.
    pub fn header_value(&self) -> Option<&'static str> {
        match self {
            Importance::High => Some("high"),
            Importance::Normal => None,
            Importance::Low => Some("low"),
        }
    }
}

/// Message body: exactly one of plain text or HTML.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyContent {
    /// Plain-text body.
    Text(String),
    /// HTML body.
    Html(String),
}

impl BodyContent {
    /// Creates a body from text and an HTML flag.
    pub fn new(body: impl Into<String>, is_html: bool) -> Self {
        if is_html {
            BodyContent::Html(body.into())
        } else {
            BodyContent::Text(body.into())
        }
    }

    /// Returns the body text.
    pub fn text(&self) -> &str {
        match self {
            BodyContent::Text(text) | BodyContent::Html(text) => text,
        }
    }

    /// Returns true for HTML bodies.
    pub fn is_html(&self) -> bool {
        matches!(self, BodyContent::Html(_))
    }

    /// Content type for the body part.
    pub fn content_type(&self) -> &'static str {
        match self {
            BodyContent::Text(_) => "text/plain; charset=utf-8",
            BodyContent::Html(_) => "text/html; charset=utf-8",
        }
    }
}

/// Ordered header mapping. Duplicate names are legal and insertion
/// order is preserved; lookups are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Creates an empty header mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a header, keeping any existing entries with the same name.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Replaces every entry with the given name by a single value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        self.entries.push((name, value.into()));
    }

    /// Returns the first value for a header.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns every value for a header, in insertion order.
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Returns true when the header is present.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterates over all entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when no entries exist.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A composed, immutable message.
///
/// Produced by a session's `compose`; structurally legal even when
/// fields a send would need are missing (the sendability check guards
/// the send path, not the builder).
#[derive(Debug, Clone)]
pub struct Message {
    /// Subject, possibly empty.
    pub subject: String,
    /// Transfer priority.
    pub priority: Priority,
    /// Reader-facing importance.
    pub importance: Importance,
    /// Ordered sender mailboxes. Usually one; co-sending puts several.
    pub from: Vec<Address>,
    /// Submitting mailbox when `from` lists more than one sender.
    pub sender: Option<Address>,
    /// Primary recipients.
    pub to: Vec<Address>,
    /// Carbon-copy recipients.
    pub cc: Vec<Address>,
    /// Blind-carbon-copy recipients.
    pub bcc: Vec<Address>,
    /// Body content.
    pub body: BodyContent,
    /// Ordered attachments.
    pub attachments: Vec<Attachment>,
    /// Auxiliary headers.
    pub headers: Headers,
}

impl Message {
    /// Returns true when any recipient list is non-empty.
    pub fn has_recipients(&self) -> bool {
        !self.to.is_empty() || !self.cc.is_empty() || !self.bcc.is_empty()
    }

    /// Total recipient count across to, cc, and bcc.
    pub fn recipient_count(&self) -> usize {
        self.to.len() + self.cc.len() + self.bcc.len()
    }
}

/// SMTP envelope derived from a message: the reverse-path mailbox and
/// every forward-path recipient (to, cc, and bcc).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// MAIL FROM mailbox.
    pub sender: String,
    /// RCPT TO mailboxes, in to/cc/bcc order.
    pub recipients: Vec<String>,
}

impl Envelope {
    /// Derives the envelope for a message.
    ///
    /// The submitting mailbox wins over the first `from` entry when both
    /// are present.
    pub fn for_message(message: &Message) -> MailerResult<Self> {
        let sender = message
            .sender
            .as_ref()
            .or_else(|| message.from.first())
            .map(|a| a.email.clone())
            .ok_or_else(|| MailerError::addressing("message has no sender mailbox"))?;

        let recipients: Vec<String> = message
            .to
            .iter()
            .chain(message.cc.iter())
            .chain(message.bcc.iter())
            .map(|a| a.email.clone())
            .collect();

        if recipients.is_empty() {
            return Err(MailerError::addressing("message has no recipients"));
        }

        Ok(Self { sender, recipients })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_forms() {
        let plain = Address::new("a@example.com");
        assert_eq!(plain.to_header(), "a@example.com");
        assert!(plain.name().is_none());

        let named = Address::with_name("John Doe", "john@example.com");
        assert_eq!(named.to_header(), "John Doe <john@example.com>");

        let quoted = Address::with_name("Doe, John", "john@example.com");
        assert_eq!(quoted.to_header(), "\"Doe, John\" <john@example.com>");
    }

    #[test]
    fn test_address_parse() {
        let addr = Address::parse("John Doe <john@example.com>");
        assert_eq!(addr.name.as_deref(), Some("John Doe"));
        assert_eq!(addr.email, "john@example.com");

        let addr = Address::parse("  plain@example.com  ");
        assert_eq!(addr.email, "plain@example.com");
        assert!(addr.name.is_none());

        let addr = Address::parse("<bare@example.com>");
        assert_eq!(addr.email, "bare@example.com");
        assert!(addr.name.is_none());

        // A quoted name keeps its inner punctuation
        let addr = Address::parse("\"Doe, John\" <john@example.com>");
        assert_eq!(addr.name.as_deref(), Some("Doe, John"));
    }

    #[test]
    fn test_address_conversions() {
        let from_str: Address = "a@example.com".into();
        assert_eq!(from_str.email, "a@example.com");

        let from_tuple: Address = ("Ops", "ops@example.com").into();
        assert_eq!(from_tuple.name.as_deref(), Some("Ops"));
        assert_eq!(from_tuple.email, "ops@example.com");
    }

    #[test]
    fn test_attachment_content_type_guess() {
        let attachment = Attachment::from_file("report.pdf", vec![1, 2, 3]);
        assert_eq!(attachment.content_type, "application/pdf");

        let unknown = Attachment::from_file("blob.xyzzy", vec![1]);
        assert_eq!(unknown.content_type, "application/octet-stream");
    }

    #[test]
    fn test_priority_and_importance_headers() {
        assert_eq!(Priority::High.header_value(), Some("1"));
        assert_eq!(Priority::Low.header_value(), Some("5"));
        assert_eq!(Priority::Normal.header_value(), None);

        assert_eq!(Importance::High.header_value(), Some("high"));
        assert_eq!(Importance::Low.header_value(), Some("low"));
        assert_eq!(Importance::Normal.header_value(), None);
    }

    #[test]
    fn test_body_content() {
        let text = BodyContent::new("hello", false);
        assert!(!text.is_html());
        assert_eq!(text.content_type(), "text/plain; charset=utf-8");

        let html = BodyContent::new("<p>hello</p>", true);
        assert!(html.is_html());
        assert_eq!(html.text(), "<p>hello</p>");
    }

    #[test]
    fn test_headers_preserve_order_and_duplicates() {
        let mut headers = Headers::new();
        headers.add("X-Tag", "one");
        headers.add("X-Other", "mid");
        headers.add("X-Tag", "two");

        assert_eq!(headers.len(), 3);
        assert_eq!(headers.get("x-tag"), Some("one"));
        assert_eq!(headers.get_all("X-TAG"), vec!["one", "two"]);

        let order: Vec<&str> = headers.iter().map(|(n, _)| n).collect();
        assert_eq!(order, vec!["X-Tag", "X-Other", "X-Tag"]);
    }

    #[test]
    fn test_headers_set_replaces() {
        let mut headers = Headers::new();
        headers.add("X-Tag", "one");
        headers.add("X-Tag", "two");
        headers.set("x-tag", "only");
        assert_eq!(headers.get_all("X-Tag"), vec!["only"]);
    }

    fn message_fixture() -> Message {
        Message {
            subject: "Subject".into(),
            priority: Priority::default(),
            importance: Importance::default(),
            from: vec![Address::new("from@example.com")],
            sender: None,
            to: vec![Address::new("to@example.com")],
            cc: vec![Address::new("cc@example.com")],
            bcc: vec![Address::new("bcc@example.com")],
            body: BodyContent::new("hi", false),
            attachments: Vec::new(),
            headers: Headers::new(),
        }
    }

    #[test]
    fn test_envelope_derivation() {
        let message = message_fixture();
        let envelope = Envelope::for_message(&message).unwrap();
        assert_eq!(envelope.sender, "from@example.com");
        assert_eq!(
            envelope.recipients,
            vec!["to@example.com", "cc@example.com", "bcc@example.com"]
        );
    }

    #[test]
    fn test_envelope_prefers_submitting_mailbox() {
        let mut message = message_fixture();
        message.from = vec![
            Address::new("first@example.com"),
            Address::new("second@example.com"),
        ];
        message.sender = Some(Address::new("first@example.com"));
        let envelope = Envelope::for_message(&message).unwrap();
        assert_eq!(envelope.sender, "first@example.com");
    }

    #[test]
    fn test_envelope_requires_sender_and_recipients() {
        let mut message = message_fixture();
        message.from.clear();
        assert!(Envelope::for_message(&message).is_err());

        let mut message = message_fixture();
        message.to.clear();
        message.cc.clear();
        message.bcc.clear();
        assert!(Envelope::for_message(&message).is_err());
    }
}
