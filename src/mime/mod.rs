//! MIME serialization for composed messages.
//!
//! Produces RFC 5322 output with:
//! - Header encoding (RFC 2047) and folding
//! - Quoted-printable bodies and Base64 attachments
//! - Forced CRLF line endings throughout
//! - Dot-stuffing helpers shared by the pickup writer and the relay
//!
//! Every artifact leaving this module uses CRLF exclusively; body text
//! is normalized before encoding so host-platform newlines never leak
//! into the serialized form.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::{MailerError, MailerResult};
use crate::types::{Address, Attachment, BodyContent, Message};

/// Soft wrap column for header folding.
const FOLD_WIDTH: usize = 78;

/// Content-Transfer-Encoding values this encoder emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferEncoding {
    /// Plain 7-bit content, no transformation.
    SevenBit,
    /// Raw 8-bit content.
    EightBit,
    /// Quoted-printable, used for every body part.
    #[default]
    QuotedPrintable,
    /// Base64, used for every attachment.
    Base64,
}

impl TransferEncoding {
    /// The token written into the header.
    pub fn header_value(&self) -> &'static str {
        match self {
            TransferEncoding::SevenBit => "7bit",
            TransferEncoding::EightBit => "8bit",
            TransferEncoding::QuotedPrintable => "quoted-printable",
            TransferEncoding::Base64 => "base64",
        }
    }
}

/// Serializes [`Message`] values to RFC 5322 form.
pub struct MimeEncoder {
    /// Stamp written into Date and the Message-ID local part.
    date: DateTime<Utc>,
    /// Right-hand side of generated Message-ID values.
    domain: String,
}

impl MimeEncoder {
    /// Creates a new encoder stamping messages with the current time.
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            date: Utc::now(),
            domain: domain.into(),
        }
    }

    /// Encodes a message in wire form. The Bcc header is omitted; relay
    /// recipients travel in the envelope instead.
    pub fn encode(&self, message: &Message) -> MailerResult<Vec<u8>> {
        self.encode_inner(message, false)
    }

    /// Encodes a message for a pickup artifact. The Bcc header is
    /// included so the pickup agent can recover the full recipient set
    /// from the file alone.
    pub fn encode_with_bcc(&self, message: &Message) -> MailerResult<Vec<u8>> {
        self.encode_inner(message, true)
    }

    fn encode_inner(&self, message: &Message, include_bcc: bool) -> MailerResult<Vec<u8>> {
        let mut output = Vec::new();

        self.write_header(&mut output, "Date", &self.format_date())?;

        if !message.from.is_empty() {
            self.write_header(&mut output, "From", &self.address_list(&message.from))?;
        }
        if let Some(sender) = &message.sender {
            self.write_header(&mut output, "Sender", &self.encode_address(sender))?;
        }
        if !message.to.is_empty() {
            self.write_header(&mut output, "To", &self.address_list(&message.to))?;
        }
        if !message.cc.is_empty() {
            self.write_header(&mut output, "Cc", &self.address_list(&message.cc))?;
        }
        if include_bcc && !message.bcc.is_empty() {
            self.write_header(&mut output, "Bcc", &self.address_list(&message.bcc))?;
        }

        self.write_header(&mut output, "Subject", &self.encode_header(&message.subject))?;
        self.write_header(
            &mut output,
            "Message-ID",
            &format!("<{}>", self.generate_message_id()),
        )?;

        if let Some(value) = message.priority.header_value() {
            self.write_header(&mut output, "X-Priority", value)?;
        }
        if let Some(value) = message.importance.header_value() {
            self.write_header(&mut output, "Importance", value)?;
        }

        // Custom headers, duplicates and insertion order preserved
        for (name, value) in message.headers.iter() {
            self.write_header(&mut output, name, &self.encode_header(value))?;
        }

        self.write_header(&mut output, "MIME-Version", "1.0")?;

        if message.attachments.is_empty() {
            self.write_body_part(&mut output, &message.body)?;
        } else {
            let boundary = self.generate_boundary();
            self.write_header(
                &mut output,
                "Content-Type",
                &format!("multipart/mixed; boundary=\"{}\"", boundary),
            )?;
            output.extend_from_slice(b"\r\n");

            output.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
            self.write_body_part(&mut output, &message.body)?;
            output.extend_from_slice(b"\r\n");

            for attachment in &message.attachments {
                output.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
                self.write_attachment(&mut output, attachment)?;
            }

            output.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
        }

        Ok(output)
    }

    /// Writes a header line.
    fn write_header(&self, output: &mut Vec<u8>, name: &str, value: &str) -> MailerResult<()> {
        if name.is_empty() || name.chars().any(|c| c.is_control() || c == ':') {
            return Err(MailerError::invalid_header(format!(
                "invalid header name: {:?}",
                name
            )));
        }

        let folded = self.fold_header(&format!("{}: {}", name, value));
        output.extend_from_slice(folded.as_bytes());
        output.extend_from_slice(b"\r\n");
        Ok(())
    }

    /// Soft-wraps a header near [`FOLD_WIDTH`] columns, breaking at
    /// spaces with a single-space continuation indent. Words longer
    /// than the width are left intact; the RFC hard limit is 998.
    fn fold_header(&self, header: &str) -> String {
        if header.len() <= FOLD_WIDTH {
            return header.to_string();
        }

        let mut folded = String::with_capacity(header.len() + 8);
        let mut column = 0usize;

        for word in header.split(' ') {
            if column == 0 {
                folded.push_str(word);
                column = word.len();
            } else if column + word.len() < FOLD_WIDTH {
                folded.push(' ');
                folded.push_str(word);
                column += word.len() + 1;
            } else {
                folded.push_str("\r\n ");
                folded.push_str(word);
                column = word.len() + 1;
            }
        }

        folded
    }

    /// Encodes a header value as an RFC 2047 encoded-word when it
    /// leaves ASCII or carries control characters. Encoding controls
    /// keeps raw CRLF out of header values.
    fn encode_header(&self, value: &str) -> String {
        let needs_encoding = value.chars().any(|c| !c.is_ascii() || c.is_control());
        if needs_encoding {
            format!("=?UTF-8?B?{}?=", BASE64.encode(value.as_bytes()))
        } else {
            value.to_string()
        }
    }

    /// Renders one address, RFC 2047-encoding the display name when
    /// needed.
    fn encode_address(&self, address: &Address) -> String {
        match address.name() {
            Some(name) if name.chars().any(|c| !c.is_ascii() || c.is_control()) => {
                format!("{} <{}>", self.encode_header(name), address.email)
            }
            _ => address.to_header(),
        }
    }

    /// Renders an address list for a single header.
    fn address_list(&self, addresses: &[Address]) -> String {
        addresses
            .iter()
            .map(|a| self.encode_address(a))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Encodes text using quoted-printable, normalizing line endings
    /// first so the encoded form contains only CRLF breaks.
    fn encode_quoted_printable(&self, text: &str) -> Vec<u8> {
        quoted_printable::encode(normalize_crlf(text))
    }

    /// Builds a unique Message-ID local part: timestamp, then random.
    fn generate_message_id(&self) -> String {
        format!(
            "{}.{}@{}",
            self.date.timestamp(),
            Uuid::new_v4().simple(),
            self.domain
        )
    }

    /// Builds a multipart boundary that cannot occur in encoded parts.
    fn generate_boundary(&self) -> String {
        format!("=_{}", Uuid::new_v4().simple())
    }

    /// RFC 2822 date for the Date header.
    fn format_date(&self) -> String {
        self.date.to_rfc2822()
    }

    /// Writes the body as a text part: content headers, blank line,
    /// quoted-printable content.
    fn write_body_part(&self, output: &mut Vec<u8>, body: &BodyContent) -> MailerResult<()> {
        self.write_header(output, "Content-Type", body.content_type())?;
        self.write_header(
            output,
            "Content-Transfer-Encoding",
            TransferEncoding::QuotedPrintable.header_value(),
        )?;
        output.extend_from_slice(b"\r\n");
        output.extend_from_slice(&self.encode_quoted_printable(body.text()));
        Ok(())
    }

    /// Writes an attachment part.
    fn write_attachment(&self, output: &mut Vec<u8>, attachment: &Attachment) -> MailerResult<()> {
        self.write_header(
            output,
            "Content-Type",
            &format!("{}; name=\"{}\"", attachment.content_type, attachment.filename),
        )?;
        self.write_header(
            output,
            "Content-Transfer-Encoding",
            TransferEncoding::Base64.header_value(),
        )?;
        self.write_header(
            output,
            "Content-Disposition",
            &format!("attachment; filename=\"{}\"", attachment.filename),
        )?;
        output.extend_from_slice(b"\r\n");

        let encoded = BASE64.encode(&attachment.data);
        for chunk in encoded.as_bytes().chunks(76) {
            output.extend_from_slice(chunk);
            output.extend_from_slice(b"\r\n");
        }

        Ok(())
    }
}

impl Default for MimeEncoder {
    fn default() -> Self {
        Self::new("localhost")
    }
}

/// Normalizes line endings to CRLF. Lone LF and lone CR both become
/// CRLF; existing CRLF pairs pass through.
pub fn normalize_crlf(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                output.push_str("\r\n");
            }
            '\n' => output.push_str("\r\n"),
            _ => output.push(c),
        }
    }
    output
}

/// Applies SMTP dot-stuffing: any line whose first byte is `.` gets a
/// second `.` prepended.
pub fn dot_stuff(input: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(input.len() + 16);
    let mut at_line_start = true;

    for &byte in input {
        if at_line_start && byte == b'.' {
            output.push(b'.');
        }
        output.push(byte);
        at_line_start = byte == b'\n';
    }

    output
}

/// Reverses dot-stuffing: drops the first `.` of any line that starts
/// with one.
pub fn dot_unstuff(input: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(input.len());
    let mut at_line_start = true;

    for &byte in input {
        if at_line_start && byte == b'.' {
            at_line_start = false;
            continue;
        }
        output.push(byte);
        at_line_start = byte == b'\n';
    }

    output
}

/// Prepares a DATA payload for the wire: dot-stuffs the encoded
/// message, forces a CRLF ending, and appends the terminating dot line.
pub fn frame_data_payload(encoded: &[u8]) -> Vec<u8> {
    let mut output = dot_stuff(encoded);

    if !output.ends_with(b"\r\n") {
        if output.ends_with(b"\n") {
            output.pop();
        }
        output.extend_from_slice(b"\r\n");
    }

    output.extend_from_slice(b".\r\n");
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Headers, Importance, Priority};

    fn message_fixture(body: BodyContent) -> Message {
        Message {
            subject: "Test Subject".into(),
            priority: Priority::default(),
            importance: Importance::default(),
            from: vec![Address::new("sender@example.com")],
            sender: None,
            to: vec![Address::new("recipient@example.com")],
            cc: Vec::new(),
            bcc: Vec::new(),
            body,
            attachments: Vec::new(),
            headers: Headers::new(),
        }
    }

    fn has_bare_lf(bytes: &[u8]) -> bool {
        let mut previous = 0u8;
        for &byte in bytes {
            if byte == b'\n' && previous != b'\r' {
                return true;
            }
            previous = byte;
        }
        false
    }

    #[test]
    fn test_header_values_encode_when_nonascii() {
        let encoder = MimeEncoder::new("example.com");
        assert_eq!(encoder.encode_header("plain ascii"), "plain ascii");
        assert_eq!(encoder.encode_header("Résumé"), "=?UTF-8?B?UsOpc3Vtw6k=?=");

        // Control characters are encoded too, so raw CRLF never lands
        // in a header value
        assert!(encoder.encode_header("a\r\nb").starts_with("=?UTF-8?B?"));
    }

    #[test]
    fn test_long_headers_fold_with_continuation_indent() {
        let encoder = MimeEncoder::new("example.com");
        let value = std::iter::repeat("wordy")
            .take(24)
            .collect::<Vec<_>>()
            .join(" ");
        let folded = encoder.fold_header(&format!("X-Long: {}", value));

        assert!(folded.contains("\r\n "));
        for line in folded.split("\r\n") {
            assert!(line.len() <= FOLD_WIDTH);
        }
        // Folding is lossless apart from the inserted breaks
        assert_eq!(folded.replace("\r\n ", " "), format!("X-Long: {}", value));
    }

    #[test]
    fn test_boundary_and_message_id_generation() {
        let encoder = MimeEncoder::new("example.com");
        assert_ne!(encoder.generate_boundary(), encoder.generate_boundary());
        assert!(encoder.generate_message_id().ends_with("@example.com"));
    }

    #[test]
    fn test_normalize_crlf() {
        assert_eq!(normalize_crlf("a\nb"), "a\r\nb");
        assert_eq!(normalize_crlf("a\rb"), "a\r\nb");
        assert_eq!(normalize_crlf("a\r\nb"), "a\r\nb");
        assert_eq!(normalize_crlf("a\n\nb"), "a\r\n\r\nb");
    }

    #[test]
    fn test_dot_stuffing_cases() {
        assert_eq!(dot_stuff(b".\r\n"), b"..\r\n");
        assert_eq!(dot_stuff(b"..leading\r\n"), b"...leading\r\n");
        assert_eq!(dot_stuff(b"no dots\r\n"), b"no dots\r\n");
        assert_eq!(dot_stuff(b"a\r\n.b\r\n"), b"a\r\n..b\r\n");
    }

    #[test]
    fn test_dot_unstuff_reverses_exactly() {
        let inputs: [&[u8]; 4] = [
            b".\r\n",
            b"..leading\r\nplain\r\n",
            b"Hello.\r\nBye.",
            b".start\r\n..double\r\nend\r\n",
        ];
        for input in inputs {
            assert_eq!(dot_unstuff(&dot_stuff(input)), input);
        }
    }

    #[test]
    fn test_frame_data_payload() {
        let framed = frame_data_payload(b"Hello\r\n.World");
        let text = String::from_utf8_lossy(&framed);
        assert!(text.contains("\r\n..World"));
        assert!(text.ends_with("\r\n.\r\n"));

        // Bare-LF ending is repaired before the terminator
        let framed = frame_data_payload(b"Hello\n");
        assert!(framed.ends_with(b"\r\n.\r\n"));
        assert!(!has_bare_lf(&framed));
    }

    #[test]
    fn test_simple_message_encoding() {
        let encoder = MimeEncoder::new("example.com");
        let message = message_fixture(BodyContent::new("Hello World!", false));
        let encoded = encoder.encode(&message).unwrap();
        let content = String::from_utf8_lossy(&encoded);

        assert!(content.contains("From: sender@example.com"));
        assert!(content.contains("To: recipient@example.com"));
        assert!(content.contains("Subject: Test Subject"));
        assert!(content.contains("MIME-Version: 1.0"));
        assert!(content.contains("Content-Type: text/plain; charset=utf-8"));
        assert!(content.contains("Hello World!"));
        assert!(!has_bare_lf(&encoded));
    }

    #[test]
    fn test_body_newlines_are_forced_to_crlf() {
        let encoder = MimeEncoder::new("example.com");
        let message = message_fixture(BodyContent::new("Hello.\nBye.", false));
        let encoded = encoder.encode(&message).unwrap();

        assert!(!has_bare_lf(&encoded));
        let content = String::from_utf8_lossy(&encoded);
        assert!(content.contains("Hello.\r\nBye."));
    }

    #[test]
    fn test_bcc_written_only_for_pickup_form() {
        let encoder = MimeEncoder::new("example.com");
        let mut message = message_fixture(BodyContent::new("hi", false));
        message.bcc = vec![Address::new("hidden@example.com")];

        let wire = encoder.encode(&message).unwrap();
        assert!(!String::from_utf8_lossy(&wire).contains("hidden@example.com"));

        let artifact = encoder.encode_with_bcc(&message).unwrap();
        let content = String::from_utf8_lossy(&artifact);
        assert!(content.contains("Bcc: hidden@example.com"));
    }

    #[test]
    fn test_multiple_senders_writes_sender_header() {
        let encoder = MimeEncoder::new("example.com");
        let mut message = message_fixture(BodyContent::new("hi", false));
        message.from = vec![
            Address::new("first@example.com"),
            Address::new("second@example.com"),
        ];
        message.sender = Some(Address::new("first@example.com"));

        let encoded = encoder.encode(&message).unwrap();
        let content = String::from_utf8_lossy(&encoded);
        assert!(content.contains("From: first@example.com, second@example.com"));
        assert!(content.contains("Sender: first@example.com"));
    }

    #[test]
    fn test_priority_and_importance_headers_written() {
        let encoder = MimeEncoder::new("example.com");
        let mut message = message_fixture(BodyContent::new("hi", false));
        message.priority = Priority::High;
        message.importance = Importance::Low;

        let encoded = encoder.encode(&message).unwrap();
        let content = String::from_utf8_lossy(&encoded);
        assert!(content.contains("X-Priority: 1"));
        assert!(content.contains("Importance: low"));

        // Normal on both axes writes neither header
        let plain = encoder
            .encode(&message_fixture(BodyContent::new("hi", false)))
            .unwrap();
        let content = String::from_utf8_lossy(&plain);
        assert!(!content.contains("X-Priority"));
        assert!(!content.contains("Importance"));
    }

    #[test]
    fn test_duplicate_custom_headers_preserved() {
        let encoder = MimeEncoder::new("example.com");
        let mut message = message_fixture(BodyContent::new("hi", false));
        message.headers.add("X-Tag", "one");
        message.headers.add("X-Tag", "two");

        let encoded = encoder.encode(&message).unwrap();
        let content = String::from_utf8_lossy(&encoded);
        let first = content.find("X-Tag: one").unwrap();
        let second = content.find("X-Tag: two").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_attachment_encoding() {
        let encoder = MimeEncoder::new("example.com");
        let mut message = message_fixture(BodyContent::new("see attached", false));
        message.attachments = vec![Attachment::new(
            "data.bin",
            "application/octet-stream",
            vec![0u8; 128],
        )];

        let encoded = encoder.encode(&message).unwrap();
        let content = String::from_utf8_lossy(&encoded);
        assert!(content.contains("multipart/mixed; boundary="));
        assert!(content.contains("Content-Disposition: attachment; filename=\"data.bin\""));
        assert!(content.contains("Content-Transfer-Encoding: base64"));
        assert!(!has_bare_lf(&encoded));
    }

    #[test]
    fn test_invalid_header_name_rejected() {
        let encoder = MimeEncoder::new("example.com");
        let mut message = message_fixture(BodyContent::new("hi", false));
        message.headers.add("Bad:Name", "value");

        let err = encoder.encode(&message).unwrap_err();
        assert_eq!(err.kind(), crate::errors::MailerErrorKind::InvalidHeader);
    }
}
