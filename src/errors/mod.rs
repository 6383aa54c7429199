//! Error types for mail composition and delivery.
//!
//! A single [`MailerError`] carries an error kind, an optional SMTP reply
//! code, and an optional RFC 3463 enhanced status code. Validation errors
//! (configuration, addressing) are raised before any I/O; transport and
//! durability errors are surfaced unchanged from the delivery path.

use std::fmt;
use thiserror::Error;

/// Result type for mailer operations.
pub type MailerResult<T> = Result<T, MailerError>;

/// Mailer error kinds categorizing different failure modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MailerErrorKind {
    // Pre-delivery validation
    /// Required settings are absent for the chosen delivery mode.
    Configuration,
    /// No resolvable sender, or no recipients at all.
    Addressing,

    // Composition
    /// Header name or value was rejected during serialization.
    InvalidHeader,
    /// Body or header encoding failed.
    Encoding,
    /// Attachment could not be read or described.
    Attachment,

    // Template rendering
    /// Template lookup or rendering failed.
    Render,

    // Pickup directory
    /// Disk failure while materializing a pickup artifact.
    Durability,

    // Connection
    /// Connection was refused.
    ConnectionRefused,
    /// Connection timed out.
    ConnectionTimeout,
    /// Connection was reset.
    ConnectionReset,

    // TLS
    /// TLS handshake failed.
    TlsHandshakeFailed,
    /// Certificate was rejected.
    CertificateInvalid,
    /// STARTTLS required but not offered by the server.
    StarttlsNotSupported,

    // Authentication
    /// Credentials were rejected.
    CredentialsInvalid,
    /// Server requires authentication.
    AuthenticationRequired,
    /// No mutually supported authentication mechanism.
    AuthMethodNotSupported,

    // Protocol
    /// Response could not be parsed.
    InvalidResponse,
    /// Response code outside the expected set.
    UnexpectedResponse,
    /// Server is shutting down (421).
    ServerShutdown,
    /// Sender address rejected by the server.
    SenderRejected,
    /// Recipient address rejected by the server.
    RecipientRejected,
    /// Message exceeds the server's size limit.
    MessageTooLarge,

    // Timeouts
    /// Connect timeout.
    ConnectTimeout,
    /// Read timeout.
    ReadTimeout,
    /// Write timeout.
    WriteTimeout,
    /// Command exchange timeout.
    CommandTimeout,

    /// Unknown or internal error.
    Unknown,
}

impl MailerErrorKind {
    /// Returns true for kinds raised by the network relay.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            MailerErrorKind::ConnectionRefused
                | MailerErrorKind::ConnectionTimeout
                | MailerErrorKind::ConnectionReset
                | MailerErrorKind::TlsHandshakeFailed
                | MailerErrorKind::CertificateInvalid
                | MailerErrorKind::StarttlsNotSupported
                | MailerErrorKind::CredentialsInvalid
                | MailerErrorKind::AuthenticationRequired
                | MailerErrorKind::AuthMethodNotSupported
                | MailerErrorKind::InvalidResponse
                | MailerErrorKind::UnexpectedResponse
                | MailerErrorKind::ServerShutdown
                | MailerErrorKind::SenderRejected
                | MailerErrorKind::RecipientRejected
                | MailerErrorKind::MessageTooLarge
                | MailerErrorKind::ConnectTimeout
                | MailerErrorKind::ReadTimeout
                | MailerErrorKind::WriteTimeout
                | MailerErrorKind::CommandTimeout
        )
    }

    /// Returns true for kinds detected before any delivery I/O.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            MailerErrorKind::Configuration | MailerErrorKind::Addressing
        )
    }
}

impl fmt::Display for MailerErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MailerErrorKind::Configuration => write!(f, "Invalid configuration"),
            MailerErrorKind::Addressing => write!(f, "Addressing incomplete"),
            MailerErrorKind::InvalidHeader => write!(f, "Invalid header"),
            MailerErrorKind::Encoding => write!(f, "Encoding failed"),
            MailerErrorKind::Attachment => write!(f, "Attachment error"),
            MailerErrorKind::Render => write!(f, "Template rendering failed"),
            MailerErrorKind::Durability => write!(f, "Pickup write failed"),
            MailerErrorKind::ConnectionRefused => write!(f, "Connection refused"),
            MailerErrorKind::ConnectionTimeout => write!(f, "Connection timed out"),
            MailerErrorKind::ConnectionReset => write!(f, "Connection reset"),
            MailerErrorKind::TlsHandshakeFailed => write!(f, "TLS handshake failed"),
            MailerErrorKind::CertificateInvalid => write!(f, "Invalid certificate"),
            MailerErrorKind::StarttlsNotSupported => write!(f, "STARTTLS not supported"),
            MailerErrorKind::CredentialsInvalid => write!(f, "Invalid credentials"),
            MailerErrorKind::AuthenticationRequired => write!(f, "Authentication required"),
            MailerErrorKind::AuthMethodNotSupported => write!(f, "Auth method not supported"),
            MailerErrorKind::InvalidResponse => write!(f, "Invalid server response"),
            MailerErrorKind::UnexpectedResponse => write!(f, "Unexpected response"),
            MailerErrorKind::ServerShutdown => write!(f, "Server shutting down"),
            MailerErrorKind::SenderRejected => write!(f, "Sender rejected"),
            MailerErrorKind::RecipientRejected => write!(f, "Recipient rejected"),
            MailerErrorKind::MessageTooLarge => write!(f, "Message too large"),
            MailerErrorKind::ConnectTimeout => write!(f, "Connect timeout"),
            MailerErrorKind::ReadTimeout => write!(f, "Read timeout"),
            MailerErrorKind::WriteTimeout => write!(f, "Write timeout"),
            MailerErrorKind::CommandTimeout => write!(f, "Command timeout"),
            MailerErrorKind::Unknown => write!(f, "Unknown error"),
        }
    }
}

/// RFC 3463 enhanced status code in `class.subject.detail` form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnhancedStatusCode {
    /// 2 success, 4 transient failure, 5 permanent failure.
    pub class: u8,
    /// Failure subject (1 addressing, 2 mailbox, 7 policy, ...).
    pub subject: u16,
    /// Subject-specific detail.
    pub detail: u16,
}

impl EnhancedStatusCode {
    /// Builds a code from its three fields.
    pub fn new(class: u8, subject: u16, detail: u16) -> Self {
        Self { class, subject, detail }
    }

    /// Parses dotted notation such as `5.1.1`. Anything that is not
    /// exactly three numeric fields with a known class is rejected, so
    /// ordinary reply text never parses by accident.
    pub fn parse(s: &str) -> Option<Self> {
        let mut fields = s.split('.');
        let class: u8 = fields.next()?.parse().ok()?;
        let subject = fields.next()?.parse().ok()?;
        let detail = fields.next()?.parse().ok()?;
        if fields.next().is_some() || !matches!(class, 2 | 4 | 5) {
            return None;
        }
        Some(Self { class, subject, detail })
    }

    /// True for 4.x.x transient failures.
    pub fn is_transient(&self) -> bool {
        self.class == 4
    }

    /// True for 5.x.x permanent failures.
    pub fn is_permanent(&self) -> bool {
        self.class == 5
    }
}

impl fmt::Display for EnhancedStatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.class, self.subject, self.detail)
    }
}

/// The one error type every fallible operation in this crate returns.
///
/// Carries a kind for programmatic matching, a description for humans,
/// and whatever the SMTP server said when the failure came off the
/// wire.
#[derive(Error, Debug)]
pub struct MailerError {
    kind: MailerErrorKind,
    message: String,
    smtp_code: Option<u16>,
    enhanced_code: Option<EnhancedStatusCode>,
    #[source]
    cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl MailerError {
    /// Creates an error of the given kind.
    pub fn new(kind: MailerErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            smtp_code: None,
            enhanced_code: None,
            cause: None,
        }
    }

    /// Attaches the SMTP reply code.
    pub fn with_smtp_code(mut self, code: u16) -> Self {
        self.smtp_code = Some(code);
        self
    }

    /// Attaches the enhanced status code.
    pub fn with_enhanced_code(mut self, code: EnhancedStatusCode) -> Self {
        self.enhanced_code = Some(code);
        self
    }

    /// Attaches the underlying cause.
    pub fn with_cause<E: std::error::Error + Send + Sync + 'static>(mut self, cause: E) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// The error kind.
    pub fn kind(&self) -> MailerErrorKind {
        self.kind
    }

    /// The human-readable description.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// SMTP reply code, when the server produced this error.
    pub fn smtp_code(&self) -> Option<u16> {
        self.smtp_code
    }

    /// Enhanced status code, when the reply carried one.
    pub fn enhanced_code(&self) -> Option<&EnhancedStatusCode> {
        self.enhanced_code.as_ref()
    }

    /// True when the failure happened on the network path.
    pub fn is_transport(&self) -> bool {
        self.kind.is_transport()
    }

    // Convenience constructors

    /// Settings are missing or inconsistent for the requested work.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(MailerErrorKind::Configuration, message)
    }

    /// Creates an addressing error.
    pub fn addressing(message: impl Into<String>) -> Self {
        Self::new(MailerErrorKind::Addressing, message)
    }

    /// Creates a template rendering error.
    pub fn render(message: impl Into<String>) -> Self {
        Self::new(MailerErrorKind::Render, message)
    }

    /// Creates a pickup durability error.
    pub fn durability(message: impl Into<String>) -> Self {
        Self::new(MailerErrorKind::Durability, message)
    }

    /// Creates a header validation error.
    pub fn invalid_header(message: impl Into<String>) -> Self {
        Self::new(MailerErrorKind::InvalidHeader, message)
    }

    /// Creates an encoding error.
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::new(MailerErrorKind::Encoding, message)
    }

    /// Socket-level failure while reaching the server.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(MailerErrorKind::ConnectionRefused, message)
    }

    /// Creates a timeout error of the given kind.
    pub fn timeout(kind: MailerErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, message)
    }

    /// TLS negotiation failure.
    pub fn tls(message: impl Into<String>) -> Self {
        Self::new(MailerErrorKind::TlsHandshakeFailed, message)
    }

    /// Credential rejection.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(MailerErrorKind::CredentialsInvalid, message)
    }

    /// The server said something we could not parse.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(MailerErrorKind::InvalidResponse, message)
    }

    /// Creates an error from an SMTP reply.
    pub fn from_smtp_reply(code: u16, message: impl Into<String>) -> Self {
        let msg = message.into();
        let kind = match code {
            421 => MailerErrorKind::ServerShutdown,
            450 | 451 | 452 => MailerErrorKind::UnexpectedResponse,
            500 | 501 | 502 | 503 => MailerErrorKind::InvalidResponse,
            530 => MailerErrorKind::AuthenticationRequired,
            535 => MailerErrorKind::CredentialsInvalid,
            550 => MailerErrorKind::RecipientRejected,
            552 => MailerErrorKind::MessageTooLarge,
            553 => MailerErrorKind::SenderRejected,
            554 => MailerErrorKind::UnexpectedResponse,
            _ if code >= 400 => MailerErrorKind::UnexpectedResponse,
            _ => MailerErrorKind::Unknown,
        };
        Self::new(kind, msg).with_smtp_code(code)
    }
}

impl fmt::Display for MailerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        match (self.smtp_code, &self.enhanced_code) {
            (Some(code), Some(enhanced)) => write!(f, " (SMTP {} {})", code, enhanced),
            (Some(code), None) => write!(f, " (SMTP {})", code),
            (None, Some(enhanced)) => write!(f, " ({})", enhanced),
            (None, None) => Ok(()),
        }
    }
}
