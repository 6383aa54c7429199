//! SMTP wire grammar: command formatting and reply parsing.
//!
//! Replies are assembled one line at a time through [`ReplyAccumulator`]
//! so the transport can feed whatever its reader produces without
//! buffering a whole multiline reply first. Commands render through
//! `Display`; the caller writes the CRLF.

use std::fmt;
use std::mem;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::errors::{EnhancedStatusCode, MailerError, MailerResult};

/// Server greeting after connect.
pub const CODE_READY: u16 = 220;
/// Authentication accepted.
pub const CODE_AUTH_OK: u16 = 235;
/// Server challenge during AUTH.
pub const CODE_AUTH_CONTINUE: u16 = 334;
/// Go-ahead after DATA.
pub const CODE_SEND_DATA: u16 = 354;

/// Authentication mechanisms this client can speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    /// AUTH PLAIN (RFC 4616), single round trip.
    Plain,
    /// AUTH LOGIN, challenge per credential.
    Login,
}

impl AuthMethod {
    /// Recognizes a mechanism token from an EHLO AUTH line.
    pub fn from_token(token: &str) -> Option<Self> {
        if token.eq_ignore_ascii_case("PLAIN") {
            Some(AuthMethod::Plain)
        } else if token.eq_ignore_ascii_case("LOGIN") {
            Some(AuthMethod::Login)
        } else {
            None
        }
    }

    /// Mechanism name as it appears on the wire.
    pub fn mechanism(&self) -> &'static str {
        match self {
            AuthMethod::Plain => "PLAIN",
            AuthMethod::Login => "LOGIN",
        }
    }

    /// PLAIN initial response: base64 over `\0user\0pass`.
    pub fn plain_initial_response(username: &str, password: &str) -> String {
        let raw = format!("\0{}\0{}", username, password);
        BASE64.encode(raw.as_bytes())
    }

    /// Answer to a LOGIN challenge.
    pub fn login_response(value: &str) -> String {
        BASE64.encode(value.as_bytes())
    }
}

/// Client commands used by the relay conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpCommand {
    /// EHLO with the announced client identity.
    Ehlo(String),
    /// STARTTLS negotiation request.
    StartTls,
    /// AUTH with an optional initial response.
    Auth {
        /// Mechanism name.
        mechanism: &'static str,
        /// Initial response, already base64-encoded.
        initial: Option<String>,
    },
    /// MAIL FROM with a bare address; brackets are added on render.
    MailFrom(String),
    /// RCPT TO with a bare address; brackets are added on render.
    RcptTo(String),
    /// DATA.
    Data,
    /// QUIT.
    Quit,
}

impl fmt::Display for SmtpCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SmtpCommand::Ehlo(identity) => write!(f, "EHLO {}", identity),
            SmtpCommand::StartTls => f.write_str("STARTTLS"),
            SmtpCommand::Auth {
                mechanism,
                initial: Some(initial),
            } => write!(f, "AUTH {} {}", mechanism, initial),
            SmtpCommand::Auth {
                mechanism,
                initial: None,
            } => write!(f, "AUTH {}", mechanism),
            SmtpCommand::MailFrom(address) => write!(f, "MAIL FROM:<{}>", address),
            SmtpCommand::RcptTo(address) => write!(f, "RCPT TO:<{}>", address),
            SmtpCommand::Data => f.write_str("DATA"),
            SmtpCommand::Quit => f.write_str("QUIT"),
        }
    }
}

/// A complete server reply, possibly spanning several lines.
#[derive(Debug, Clone)]
pub struct SmtpReply {
    /// Three-digit reply code shared by every line.
    pub code: u16,
    /// Enhanced status code (RFC 3463) when the first line carried one.
    pub enhanced: Option<EnhancedStatusCode>,
    /// Text of each line, code and separator stripped.
    pub lines: Vec<String>,
}

impl SmtpReply {
    /// True for 2xx replies.
    pub fn is_completion(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// True for 3xx replies (server expects more input).
    pub fn is_intermediate(&self) -> bool {
        (300..400).contains(&self.code)
    }

    /// First text line, or empty when the reply carried none.
    pub fn summary(&self) -> &str {
        self.lines.first().map(String::as_str).unwrap_or("")
    }

    /// All text lines joined for logs and error messages.
    pub fn text(&self) -> String {
        self.lines.join("; ")
    }

    /// Maps the reply onto the error taxonomy, carrying the enhanced
    /// code along when present.
    pub fn to_error(&self) -> MailerError {
        let mut error = MailerError::from_smtp_reply(self.code, self.text());
        if let Some(enhanced) = &self.enhanced {
            error = error.with_enhanced_code(enhanced.clone());
        }
        error
    }
}

impl fmt::Display for SmtpReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.summary())
    }
}

/// Splits one raw reply line into (code, more-to-come, text).
///
/// The separator after the code decides continuation: `-` means more
/// lines follow, a space or end of line means the reply is complete.
fn split_reply_line(raw: &str) -> MailerResult<(u16, bool, &str)> {
    let bytes = raw.as_bytes();
    if bytes.len() < 3 || !bytes[..3].iter().all(u8::is_ascii_digit) {
        return Err(MailerError::protocol(format!(
            "Malformed reply line: {:?}",
            raw
        )));
    }

    // ASCII digits guarantee the slice boundary; first digit 2-5 per
    // RFC 5321 reply code grammar.
    let code: u16 = raw[..3]
        .parse()
        .map_err(|_| MailerError::protocol(format!("Malformed reply line: {:?}", raw)))?;
    if !(2..=5).contains(&(code / 100)) {
        return Err(MailerError::protocol(format!(
            "Reply code out of range: {}",
            code
        )));
    }

    match bytes.get(3) {
        None => Ok((code, false, "")),
        Some(b'-') => Ok((code, true, &raw[4..])),
        Some(b' ') => Ok((code, false, &raw[4..])),
        Some(_) => Err(MailerError::protocol(format!(
            "Malformed reply separator: {:?}",
            raw
        ))),
    }
}

/// Incremental reply parser. Feed lines as they arrive; a completed
/// [`SmtpReply`] is handed back once the final line lands, and the
/// accumulator is then ready for the next reply.
#[derive(Debug, Default)]
pub struct ReplyAccumulator {
    code: Option<u16>,
    enhanced: Option<EnhancedStatusCode>,
    lines: Vec<String>,
}

impl ReplyAccumulator {
    /// Creates an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes one line (CRLF already trimmed). Returns the finished
    /// reply when this line completes it, `None` when continuation
    /// lines are still expected.
    pub fn push_line(&mut self, raw: &str) -> MailerResult<Option<SmtpReply>> {
        let (code, more, text) = split_reply_line(raw)?;

        match self.code {
            None => self.code = Some(code),
            Some(expected) if expected != code => {
                return Err(MailerError::protocol(format!(
                    "Reply code changed mid-reply: {} then {}",
                    expected, code
                )));
            }
            Some(_) => {}
        }

        // Enhanced status codes ride on the first line only.
        let text = if self.lines.is_empty() {
            self.strip_enhanced(text)
        } else {
            text
        };
        self.lines.push(text.to_string());

        if more {
            return Ok(None);
        }

        let reply = SmtpReply {
            code: self.code.take().unwrap_or(code),
            enhanced: self.enhanced.take(),
            lines: mem::take(&mut self.lines),
        };
        Ok(Some(reply))
    }

    fn strip_enhanced<'a>(&mut self, text: &'a str) -> &'a str {
        let mut parts = text.splitn(2, ' ');
        let head = parts.next().unwrap_or("");
        if let Some(enhanced) = EnhancedStatusCode::parse(head) {
            self.enhanced = Some(enhanced);
            parts.next().unwrap_or("").trim_start()
        } else {
            text
        }
    }
}

/// What the server advertised in its EHLO reply.
#[derive(Debug, Clone, Default)]
pub struct ServerCapabilities {
    /// STARTTLS offered.
    pub starttls: bool,
    /// Advertised AUTH mechanisms we can speak, in advertised order.
    pub auth: Vec<AuthMethod>,
    /// SIZE limit in bytes when the server declared one.
    pub max_size: Option<u64>,
}

impl ServerCapabilities {
    /// Reads capabilities out of an EHLO reply. The first line is the
    /// server identity and carries no keyword.
    pub fn from_reply(reply: &SmtpReply) -> Self {
        let mut capabilities = Self::default();

        for line in reply.lines.iter().skip(1) {
            let mut words = line.split_whitespace();
            let keyword = match words.next() {
                Some(word) => word,
                None => continue,
            };

            if keyword.eq_ignore_ascii_case("STARTTLS") {
                capabilities.starttls = true;
            } else if keyword.eq_ignore_ascii_case("SIZE") {
                capabilities.max_size = words.next().and_then(|v| v.parse().ok());
            } else if keyword.eq_ignore_ascii_case("AUTH") {
                capabilities.extend_auth(words);
            } else if let Some(rest) = strip_auth_eq(keyword) {
                // Legacy AUTH=PLAIN LOGIN form some servers still emit
                capabilities.extend_auth(std::iter::once(rest).chain(words));
            }
        }

        capabilities
    }

    fn extend_auth<'a>(&mut self, tokens: impl Iterator<Item = &'a str>) {
        for token in tokens {
            if let Some(method) = AuthMethod::from_token(token) {
                if !self.auth.contains(&method) {
                    self.auth.push(method);
                }
            }
        }
    }

    /// Mechanism to use: PLAIN when offered, LOGIN as fallback.
    pub fn preferred_auth(&self) -> Option<AuthMethod> {
        if self.auth.contains(&AuthMethod::Plain) {
            Some(AuthMethod::Plain)
        } else if self.auth.contains(&AuthMethod::Login) {
            Some(AuthMethod::Login)
        } else {
            None
        }
    }
}

fn strip_auth_eq(keyword: &str) -> Option<&str> {
    let prefix = keyword.get(..5)?;
    if prefix.eq_ignore_ascii_case("AUTH=") {
        Some(&keyword[5..])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::MailerErrorKind;

    fn complete(lines: &[&str]) -> SmtpReply {
        let mut accumulator = ReplyAccumulator::new();
        let (last, rest) = lines.split_last().unwrap();
        for line in rest {
            assert!(accumulator.push_line(line).unwrap().is_none());
        }
        accumulator.push_line(last).unwrap().unwrap()
    }

    #[test]
    fn test_single_line_reply() {
        let reply = complete(&["250 OK"]);
        assert_eq!(reply.code, 250);
        assert!(reply.is_completion());
        assert_eq!(reply.summary(), "OK");
    }

    #[test]
    fn test_multiline_reply_collects_every_line() {
        let reply = complete(&[
            "250-mail.example.com greets you",
            "250-SIZE 35882577",
            "250 STARTTLS",
        ]);
        assert_eq!(reply.code, 250);
        assert_eq!(reply.lines.len(), 3);
        assert_eq!(reply.text(), "mail.example.com greets you; SIZE 35882577; STARTTLS");
    }

    #[test]
    fn test_bare_code_line_completes() {
        let reply = complete(&["354"]);
        assert_eq!(reply.code, 354);
        assert!(reply.is_intermediate());
        assert_eq!(reply.summary(), "");
    }

    #[test]
    fn test_code_drift_is_a_protocol_error() {
        let mut accumulator = ReplyAccumulator::new();
        assert!(accumulator.push_line("250-first").unwrap().is_none());
        let err = accumulator.push_line("251 second").unwrap_err();
        assert_eq!(err.kind(), MailerErrorKind::InvalidResponse);
    }

    #[test]
    fn test_malformed_lines_rejected() {
        let mut accumulator = ReplyAccumulator::new();
        assert!(accumulator.push_line("not a reply").is_err());
        assert!(accumulator.push_line("25").is_err());
        assert!(accumulator.push_line("250_separator").is_err());
        assert!(accumulator.push_line("999 out of range").is_err());
    }

    #[test]
    fn test_accumulator_reusable_after_completion() {
        let mut accumulator = ReplyAccumulator::new();
        let first = accumulator.push_line("220 ready").unwrap().unwrap();
        let second = accumulator.push_line("550 5.1.1 no").unwrap().unwrap();
        assert_eq!(first.code, 220);
        assert_eq!(second.code, 550);
        assert!(first.enhanced.is_none());
    }

    #[test]
    fn test_enhanced_code_stripped_from_first_line() {
        let reply = complete(&["550 5.1.1 User unknown"]);
        let enhanced = reply.enhanced.clone().unwrap();
        assert_eq!((enhanced.class, enhanced.subject, enhanced.detail), (5, 1, 1));
        assert_eq!(reply.summary(), "User unknown");

        let err = reply.to_error();
        assert_eq!(err.kind(), MailerErrorKind::RecipientRejected);
        assert_eq!(err.smtp_code(), Some(550));
    }

    #[test]
    fn test_command_wire_format() {
        assert_eq!(
            SmtpCommand::Ehlo("localhost".to_string()).to_string(),
            "EHLO localhost"
        );
        assert_eq!(
            SmtpCommand::MailFrom("a@example.com".to_string()).to_string(),
            "MAIL FROM:<a@example.com>"
        );
        assert_eq!(
            SmtpCommand::RcptTo("b@example.com".to_string()).to_string(),
            "RCPT TO:<b@example.com>"
        );
        assert_eq!(
            SmtpCommand::Auth {
                mechanism: "PLAIN",
                initial: Some("AHgAeQ==".to_string()),
            }
            .to_string(),
            "AUTH PLAIN AHgAeQ=="
        );
        assert_eq!(
            SmtpCommand::Auth {
                mechanism: "LOGIN",
                initial: None,
            }
            .to_string(),
            "AUTH LOGIN"
        );
        assert_eq!(SmtpCommand::StartTls.to_string(), "STARTTLS");
        assert_eq!(SmtpCommand::Quit.to_string(), "QUIT");
    }

    #[test]
    fn test_capabilities_skip_identity_line() {
        let reply = complete(&[
            "250-mail.example.com at your service",
            "250-SIZE 10485760",
            "250-AUTH PLAIN LOGIN CRAM-MD5",
            "250 STARTTLS",
        ]);
        let capabilities = ServerCapabilities::from_reply(&reply);
        assert!(capabilities.starttls);
        assert_eq!(capabilities.max_size, Some(10485760));
        assert_eq!(
            capabilities.auth,
            vec![AuthMethod::Plain, AuthMethod::Login]
        );
        assert_eq!(capabilities.preferred_auth(), Some(AuthMethod::Plain));
    }

    #[test]
    fn test_capabilities_accept_legacy_auth_eq() {
        let reply = complete(&["250-mail.example.com", "250 AUTH=LOGIN"]);
        let capabilities = ServerCapabilities::from_reply(&reply);
        assert_eq!(capabilities.preferred_auth(), Some(AuthMethod::Login));
    }

    #[test]
    fn test_preferred_auth_none_when_unrecognized() {
        let reply = complete(&["250-mail.example.com", "250 AUTH CRAM-MD5 XOAUTH2"]);
        let capabilities = ServerCapabilities::from_reply(&reply);
        assert_eq!(capabilities.preferred_auth(), None);
        assert!(capabilities.auth.is_empty());
    }

    #[test]
    fn test_plain_initial_response_encoding() {
        assert_eq!(
            AuthMethod::plain_initial_response("user", "pass"),
            "AHVzZXIAcGFzcw=="
        );
        assert_eq!(AuthMethod::login_response("user"), "dXNlcg==");
    }
}
