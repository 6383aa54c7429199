//! SMTP relay transport.
//!
//! Submits messages over the network, one complete SMTP conversation
//! per submission: connect, greet, optional STARTTLS, optional AUTH,
//! envelope exchange, DATA, QUIT. Nothing is pooled or retried here;
//! a failed conversation surfaces as an error and the next submission
//! starts fresh.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::config::{MailerConfig, TlsMode};
use crate::errors::{MailerError, MailerErrorKind, MailerResult};
use crate::mime;
use crate::protocol::{
    AuthMethod, ReplyAccumulator, ServerCapabilities, SmtpCommand, SmtpReply, CODE_AUTH_CONTINUE,
    CODE_AUTH_OK, CODE_READY, CODE_SEND_DATA,
};
use crate::types::Envelope;

/// Identity announced in EHLO.
const EHLO_IDENTITY: &str = "localhost";

/// Outcome of a successful relay submission.
#[derive(Debug, Clone)]
pub struct RelayReceipt {
    /// Number of recipients the server accepted.
    pub accepted: usize,
    /// Final server response to the message data.
    pub response: String,
    /// Whether the conversation ran over TLS.
    pub tls_used: bool,
}

/// Transport seam for network submission. The production
/// implementation is [`SmtpRelay`]; tests substitute a mock.
#[async_trait]
pub trait RelayTransport: Send + Sync + fmt::Debug {
    /// Submits one encoded message for the given envelope.
    async fn submit(&self, envelope: &Envelope, data: &[u8]) -> MailerResult<RelayReceipt>;
}

/// Network SMTP submission client.
#[derive(Debug)]
pub struct SmtpRelay {
    config: Arc<MailerConfig>,
}

impl SmtpRelay {
    /// Creates a relay over the given settings.
    pub fn new(config: Arc<MailerConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl RelayTransport for SmtpRelay {
    async fn submit(&self, envelope: &Envelope, data: &[u8]) -> MailerResult<RelayReceipt> {
        let mut conversation = RelayConversation::open(&self.config).await?;

        let result = async {
            conversation.handshake(&self.config).await?;
            conversation.transact(envelope, data).await
        }
        .await;

        conversation.quit().await;

        #[cfg(feature = "tracing")]
        match &result {
            Ok(receipt) => tracing::info!(
                recipients = receipt.accepted,
                tls = receipt.tls_used,
                "Message relayed"
            ),
            Err(error) => tracing::warn!(%error, "Relay submission failed"),
        }

        result
    }
}

/// Stream that starts plain and may be upgraded to TLS.
enum RelayStream {
    Plain(BufReader<TcpStream>),
    #[cfg(feature = "rustls-tls")]
    Tls(BufReader<tokio_rustls::client::TlsStream<TcpStream>>),
    Closed,
}

impl RelayStream {
    async fn write_all(&mut self, data: &[u8], timeout_duration: Duration) -> MailerResult<()> {
        match self {
            RelayStream::Plain(stream) => {
                write_all_timed(stream.get_mut(), data, timeout_duration).await
            }
            #[cfg(feature = "rustls-tls")]
            RelayStream::Tls(stream) => {
                write_all_timed(stream.get_mut(), data, timeout_duration).await
            }
            RelayStream::Closed => Err(MailerError::connection("Connection already closed")),
        }
    }

    async fn read_reply(&mut self, timeout_duration: Duration) -> MailerResult<SmtpReply> {
        match self {
            RelayStream::Plain(stream) => read_reply_timed(stream, timeout_duration).await,
            #[cfg(feature = "rustls-tls")]
            RelayStream::Tls(stream) => read_reply_timed(stream, timeout_duration).await,
            RelayStream::Closed => Err(MailerError::connection("Connection already closed")),
        }
    }
}

/// One SMTP conversation from greeting to QUIT.
struct RelayConversation {
    stream: RelayStream,
    command_timeout: Duration,
    capabilities: ServerCapabilities,
    tls_enabled: bool,
    host: String,
}

impl RelayConversation {
    /// Connects and consumes the server greeting. For implicit TLS the
    /// socket is wrapped before the greeting is read.
    async fn open(config: &MailerConfig) -> MailerResult<Self> {
        let host = config.host.trim().to_string();
        let address = format!("{}:{}", host, config.port);

        let stream = timeout(config.connect_timeout(), TcpStream::connect(&address))
            .await
            .map_err(|_| {
                MailerError::timeout(MailerErrorKind::ConnectTimeout, "Connect timed out")
            })?
            .map_err(|e| map_io_error(e, &address))?;

        stream.set_nodelay(true).ok();

        let mut conversation = Self {
            stream: RelayStream::Plain(BufReader::new(stream)),
            command_timeout: config.command_timeout(),
            capabilities: ServerCapabilities::default(),
            tls_enabled: false,
            host,
        };

        if config.tls.mode == TlsMode::Implicit {
            conversation.upgrade_tls().await?;
        }

        let greeting = conversation.read_reply().await?;
        if greeting.code != CODE_READY {
            return Err(greeting.to_error());
        }

        Ok(conversation)
    }

    /// Greets the server, negotiates STARTTLS per policy, and
    /// authenticates when credentials are configured.
    async fn handshake(&mut self, config: &MailerConfig) -> MailerResult<()> {
        self.ehlo().await?;

        if !self.tls_enabled
            && matches!(config.tls.mode, TlsMode::StartTls | TlsMode::StartTlsRequired)
        {
            if self.capabilities.starttls {
                let reply = self.command(&SmtpCommand::StartTls).await?;
                if reply.is_completion() {
                    self.upgrade_tls().await?;
                    // Capabilities change once the channel is secured
                    self.ehlo().await?;
                } else if config.tls.mode == TlsMode::StartTlsRequired {
                    return Err(reply.to_error());
                }
            } else if config.tls.mode == TlsMode::StartTlsRequired {
                return Err(MailerError::new(
                    MailerErrorKind::StarttlsNotSupported,
                    "Server does not support STARTTLS",
                ));
            }
        }

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            self.authenticate(username, password.expose_secret()).await?;
        }

        Ok(())
    }

    async fn ehlo(&mut self) -> MailerResult<()> {
        let reply = self
            .command(&SmtpCommand::Ehlo(EHLO_IDENTITY.to_string()))
            .await?;
        if !reply.is_completion() {
            return Err(reply.to_error());
        }
        self.capabilities = ServerCapabilities::from_reply(&reply);
        Ok(())
    }

    async fn authenticate(&mut self, username: &str, password: &str) -> MailerResult<()> {
        let method = self.capabilities.preferred_auth().ok_or_else(|| {
            MailerError::new(
                MailerErrorKind::AuthMethodNotSupported,
                "Server offers no supported authentication mechanism",
            )
        })?;

        let reply = match method {
            AuthMethod::Plain => {
                let initial = AuthMethod::plain_initial_response(username, password);
                self.command(&SmtpCommand::Auth {
                    mechanism: method.mechanism(),
                    initial: Some(initial),
                })
                .await?
            }
            AuthMethod::Login => {
                let reply = self
                    .command(&SmtpCommand::Auth {
                        mechanism: method.mechanism(),
                        initial: None,
                    })
                    .await?;
                if reply.code != CODE_AUTH_CONTINUE {
                    return Err(reply.to_error());
                }

                self.send_line(&AuthMethod::login_response(username)).await?;
                let reply = self.read_reply().await?;
                if reply.code != CODE_AUTH_CONTINUE {
                    return Err(reply.to_error());
                }

                self.send_line(&AuthMethod::login_response(password)).await?;
                self.read_reply().await?
            }
        };

        if reply.code == CODE_AUTH_OK {
            Ok(())
        } else {
            Err(reply.to_error())
        }
    }

    /// Runs the envelope exchange and message data transfer. Any
    /// rejected recipient aborts the submission; nothing is delivered
    /// partially.
    async fn transact(&mut self, envelope: &Envelope, data: &[u8]) -> MailerResult<RelayReceipt> {
        let reply = self
            .command(&SmtpCommand::MailFrom(envelope.sender.clone()))
            .await?;
        if !reply.is_completion() {
            return Err(reply.to_error());
        }

        for recipient in &envelope.recipients {
            let reply = self
                .command(&SmtpCommand::RcptTo(recipient.clone()))
                .await?;
            if !reply.is_completion() {
                return Err(reply.to_error());
            }
        }

        let reply = self.command(&SmtpCommand::Data).await?;
        if reply.code != CODE_SEND_DATA {
            return Err(reply.to_error());
        }

        let payload = mime::frame_data_payload(data);
        self.stream.write_all(&payload, self.command_timeout).await?;

        let reply = self.read_reply().await?;
        if !reply.is_completion() {
            return Err(reply.to_error());
        }

        Ok(RelayReceipt {
            accepted: envelope.recipients.len(),
            response: reply.text(),
            tls_used: self.tls_enabled,
        })
    }

    async fn command(&mut self, command: &SmtpCommand) -> MailerResult<SmtpReply> {
        #[cfg(feature = "tracing")]
        tracing::debug!(command = %command, "Writing SMTP command");

        self.send_line(&command.to_string()).await?;
        self.read_reply().await
    }

    async fn send_line(&mut self, line: &str) -> MailerResult<()> {
        let framed = format!("{}\r\n", line);
        self.stream
            .write_all(framed.as_bytes(), self.command_timeout)
            .await
    }

    async fn read_reply(&mut self) -> MailerResult<SmtpReply> {
        let reply = self.stream.read_reply(self.command_timeout).await?;

        #[cfg(feature = "tracing")]
        tracing::debug!(code = reply.code, message = %reply.summary(), "Received SMTP reply");

        Ok(reply)
    }

    /// Sends QUIT and drops the stream. Failures here are ignored; the
    /// message outcome was already decided.
    async fn quit(&mut self) {
        if !matches!(self.stream, RelayStream::Closed) {
            let _ = self.command(&SmtpCommand::Quit).await;
            self.stream = RelayStream::Closed;
        }
    }

    #[cfg(feature = "rustls-tls")]
    async fn upgrade_tls(&mut self) -> MailerResult<()> {
        use rustls::pki_types::ServerName;

        if self.tls_enabled {
            return Ok(());
        }

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        let connector = tokio_rustls::TlsConnector::from(Arc::new(tls_config));
        let server_name = ServerName::try_from(self.host.clone())
            .map_err(|_| MailerError::tls(format!("Invalid server name: {}", self.host)))?;

        let tcp_stream = match std::mem::replace(&mut self.stream, RelayStream::Closed) {
            RelayStream::Plain(reader) => reader.into_inner(),
            other => {
                self.stream = other;
                return Err(MailerError::tls("Connection is not in plain state"));
            }
        };

        let tls_stream = timeout(
            self.command_timeout,
            connector.connect(server_name, tcp_stream),
        )
        .await
        .map_err(|_| {
            MailerError::timeout(MailerErrorKind::ConnectTimeout, "TLS handshake timed out")
        })?
        .map_err(|e| MailerError::tls(format!("TLS handshake failed: {}", e)))?;

        self.stream = RelayStream::Tls(BufReader::new(tls_stream));
        self.tls_enabled = true;
        Ok(())
    }

    #[cfg(not(feature = "rustls-tls"))]
    async fn upgrade_tls(&mut self) -> MailerResult<()> {
        Err(MailerError::configuration("No TLS implementation available"))
    }
}

/// Maps IO errors to mailer errors.
fn map_io_error(error: io::Error, address: &str) -> MailerError {
    match error.kind() {
        io::ErrorKind::ConnectionRefused => MailerError::new(
            MailerErrorKind::ConnectionRefused,
            format!("Connection refused to {}", address),
        ),
        io::ErrorKind::TimedOut => {
            MailerError::timeout(MailerErrorKind::ConnectTimeout, "Connect timed out")
        }
        io::ErrorKind::ConnectionReset => {
            MailerError::new(MailerErrorKind::ConnectionReset, "Connection reset by server")
        }
        _ => MailerError::connection(format!("Connection error: {}", error)),
    }
}

/// Reads lines into a [`ReplyAccumulator`] until a complete reply
/// lands. The per-line timeout restarts with every continuation line.
async fn read_reply_timed<R: AsyncBufReadExt + Unpin>(
    reader: &mut R,
    timeout_duration: Duration,
) -> MailerResult<SmtpReply> {
    let mut accumulator = ReplyAccumulator::new();

    loop {
        let mut line = String::new();

        let read = timeout(timeout_duration, reader.read_line(&mut line))
            .await
            .map_err(|_| MailerError::timeout(MailerErrorKind::ReadTimeout, "Read timed out"))?
            .map_err(|e| MailerError::protocol(format!("Read error: {}", e)))?;

        if read == 0 {
            return Err(MailerError::new(
                MailerErrorKind::ConnectionReset,
                "Server closed connection",
            ));
        }

        if let Some(reply) = accumulator.push_line(line.trim_end())? {
            return Ok(reply);
        }
    }
}

/// Writes and flushes with a per-operation timeout.
async fn write_all_timed<W: AsyncWrite + Unpin>(
    writer: &mut W,
    data: &[u8],
    timeout_duration: Duration,
) -> MailerResult<()> {
    timeout(timeout_duration, writer.write_all(data))
        .await
        .map_err(|_| MailerError::timeout(MailerErrorKind::WriteTimeout, "Write timed out"))?
        .map_err(|e| MailerError::protocol(format!("Write error: {}", e)))?;

    timeout(timeout_duration, writer.flush())
        .await
        .map_err(|_| MailerError::timeout(MailerErrorKind::WriteTimeout, "Flush timed out"))?
        .map_err(|e| MailerError::protocol(format!("Flush error: {}", e)))?;

    Ok(())
}
