//! Stateful mail session.
//!
//! A [`Mailer`] accumulates addressing, subject, categories,
//! attachments, and auxiliary headers across calls, then composes and
//! delivers a message on demand. After a successful send the
//! per-message state resets (sender preserved) unless the caller opts
//! out, so one session can produce a stream of independent messages.
//!
//! Composition never validates: a session with no recipients still
//! composes a structurally legal [`Message`]. The send path is guarded
//! instead, by an explicit sendability check that runs before any I/O.

use std::sync::Arc;

use serde::Serialize;

use crate::category::{CategoryTags, CATEGORY_HEADER};
use crate::config::{DeliveryMode, MailerConfig};
use crate::delivery::{Delivery, DeliveryRouter};
use crate::errors::{MailerError, MailerResult};
use crate::observability::{MailerMetrics, Timer};
use crate::relay::RelayTransport;
use crate::render::TemplateRenderer;
use crate::types::{Address, Attachment, BodyContent, Headers, Importance, Message, Priority};

/// Stateful mail session over a delivery configuration.
#[derive(Debug)]
pub struct Mailer {
    config: Arc<MailerConfig>,
    router: DeliveryRouter,
    metrics: Arc<MailerMetrics>,

    subject: String,
    priority: Priority,
    importance: Importance,
    from: Option<Address>,
    froms: Vec<Address>,
    to: Vec<Address>,
    cc: Vec<Address>,
    bcc: Vec<Address>,
    attachments: Vec<Attachment>,
    headers: Headers,
    categories: CategoryTags,
    reset_after_send: bool,
}

impl Mailer {
    /// Creates a session over the given configuration.
    pub fn new(config: MailerConfig) -> Self {
        Self::shared(Arc::new(config))
    }

    /// Creates a session over a shared configuration.
    pub fn shared(config: Arc<MailerConfig>) -> Self {
        let router = DeliveryRouter::new(Arc::clone(&config));
        Self::assemble(config, router)
    }

    /// Creates a session with a custom relay transport. Used by tests
    /// to observe submissions without a live server.
    pub fn with_relay(config: Arc<MailerConfig>, relay: Arc<dyn RelayTransport>) -> Self {
        let router = DeliveryRouter::with_relay(Arc::clone(&config), relay);
        Self::assemble(config, router)
    }

    fn assemble(config: Arc<MailerConfig>, router: DeliveryRouter) -> Self {
        let categories = CategoryTags::seeded(config.categories.iter().cloned());
        Self {
            config,
            router,
            metrics: Arc::new(MailerMetrics::new()),
            subject: String::new(),
            priority: Priority::default(),
            importance: Importance::default(),
            from: None,
            froms: Vec::new(),
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            attachments: Vec::new(),
            headers: Headers::new(),
            categories,
            reset_after_send: true,
        }
    }

    // Addressing

    /// Sets the sender, overriding any configured default.
    pub fn set_from(&mut self, sender: impl Into<Address>) -> &mut Self {
        self.from = Some(sender.into());
        self
    }

    /// Adds a co-sender. When co-senders are present they form the
    /// From list and the first one becomes the submitting mailbox.
    pub fn add_from(&mut self, sender: impl Into<Address>) -> &mut Self {
        self.froms.push(sender.into());
        self
    }

    /// Adds a primary recipient.
    pub fn add_to(&mut self, recipient: impl Into<Address>) -> &mut Self {
        self.to.push(recipient.into());
        self
    }

    /// Adds several primary recipients.
    pub fn add_to_many(
        &mut self,
        recipients: impl IntoIterator<Item = impl Into<Address>>,
    ) -> &mut Self {
        self.to.extend(recipients.into_iter().map(Into::into));
        self
    }

    /// Adds a carbon-copy recipient.
    pub fn add_cc(&mut self, recipient: impl Into<Address>) -> &mut Self {
        self.cc.push(recipient.into());
        self
    }

    /// Adds several carbon-copy recipients.
    pub fn add_cc_many(
        &mut self,
        recipients: impl IntoIterator<Item = impl Into<Address>>,
    ) -> &mut Self {
        self.cc.extend(recipients.into_iter().map(Into::into));
        self
    }

    /// Adds a blind-carbon-copy recipient.
    pub fn add_bcc(&mut self, recipient: impl Into<Address>) -> &mut Self {
        self.bcc.push(recipient.into());
        self
    }

    /// Adds several blind-carbon-copy recipients.
    pub fn add_bcc_many(
        &mut self,
        recipients: impl IntoIterator<Item = impl Into<Address>>,
    ) -> &mut Self {
        self.bcc.extend(recipients.into_iter().map(Into::into));
        self
    }

    // Message attributes

    /// Sets the subject.
    pub fn set_subject(&mut self, subject: impl Into<String>) -> &mut Self {
        self.subject = subject.into();
        self
    }

    /// Sets the transfer priority.
    pub fn set_priority(&mut self, priority: Priority) -> &mut Self {
        self.priority = priority;
        self
    }

    /// Sets the reader-facing importance.
    pub fn set_importance(&mut self, importance: Importance) -> &mut Self {
        self.importance = importance;
        self
    }

    /// Adds an attachment.
    pub fn add_attachment(&mut self, attachment: Attachment) -> &mut Self {
        self.attachments.push(attachment);
        self
    }

    /// Appends an auxiliary header.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.add(name, value);
        self
    }

    /// Replaces an auxiliary header.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.set(name, value);
        self
    }

    /// Adds a category tag.
    pub fn add_category(&mut self, category: impl Into<String>) -> &mut Self {
        self.categories.add(category);
        self
    }

    /// Overrides the category header with a verbatim value. A blank
    /// override suppresses the header entirely.
    pub fn set_category_override(&mut self, value: impl Into<String>) -> &mut Self {
        self.categories.set_override(value);
        self
    }

    /// Removes a category override, restoring accumulated tags.
    pub fn clear_category_override(&mut self) -> &mut Self {
        self.categories.clear_override();
        self
    }

    /// Sets whether per-message state resets after a successful send.
    /// Defaults to on.
    pub fn set_reset_after_send(&mut self, reset: bool) -> &mut Self {
        self.reset_after_send = reset;
        self
    }

    // Accessors

    /// Returns the session configuration.
    pub fn config(&self) -> &MailerConfig {
        &self.config
    }

    /// Returns the current subject.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Returns the primary recipients.
    pub fn to(&self) -> &[Address] {
        &self.to
    }

    /// Returns the carbon-copy recipients.
    pub fn cc(&self) -> &[Address] {
        &self.cc
    }

    /// Returns the blind-carbon-copy recipients.
    pub fn bcc(&self) -> &[Address] {
        &self.bcc
    }

    /// Returns the category state.
    pub fn categories(&self) -> &CategoryTags {
        &self.categories
    }

    /// Returns the delivery metrics for this session.
    pub fn metrics(&self) -> &MailerMetrics {
        &self.metrics
    }

    // Sending

    /// Returns true when a send would pass the pre-flight checks.
    pub fn is_sendable(&self) -> bool {
        self.sendability_error().is_none()
    }

    /// Pre-flight check: a sender must be resolvable, at least one
    /// recipient list must be non-empty, and network delivery needs a
    /// relay host. Runs before any I/O.
    fn sendability_error(&self) -> Option<MailerError> {
        let sender_available = self.from.is_some()
            || !self.froms.is_empty()
            || self.config.sender_address().is_some();
        if !sender_available {
            return Some(MailerError::addressing("no sender is configured"));
        }

        if self.to.is_empty() && self.cc.is_empty() && self.bcc.is_empty() {
            return Some(MailerError::addressing("no recipients are configured"));
        }

        if self.config.delivery_mode == DeliveryMode::Network && !self.config.has_host() {
            return Some(MailerError::configuration(
                "network delivery requires a relay host",
            ));
        }

        None
    }

    /// Resolves the effective sender: an explicit one verbatim,
    /// otherwise the configured default. The result is cached until
    /// `reset(true)`.
    fn resolve_sender(&mut self) -> Option<Address> {
        if self.from.is_none() {
            self.from = self.config.sender_address();
        }
        self.from.clone()
    }

    /// Composes a message from the current state without validating
    /// it. The category header is computed here; an unresolvable
    /// sender yields an empty From list.
    pub fn compose(&mut self, body: impl Into<String>, is_html: bool) -> Message {
        let resolved = self.resolve_sender();

        let (from, sender) = if self.froms.is_empty() {
            (resolved.into_iter().collect(), None)
        } else {
            let sender = if self.froms.len() > 1 {
                self.froms.first().cloned()
            } else {
                None
            };
            (self.froms.clone(), sender)
        };

        let mut headers = self.headers.clone();
        if let Some(value) = self.categories.header_value() {
            headers.add(CATEGORY_HEADER, value);
        }

        self.metrics.record_compose();

        Message {
            subject: self.subject.clone(),
            priority: self.priority,
            importance: self.importance,
            from,
            sender,
            to: self.to.clone(),
            cc: self.cc.clone(),
            bcc: self.bcc.clone(),
            body: BodyContent::new(body, is_html),
            attachments: self.attachments.clone(),
            headers,
        }
    }

    /// Composes and delivers a message with the given body.
    pub async fn send(&mut self, body: impl Into<String>, is_html: bool) -> MailerResult<Delivery> {
        if let Some(error) = self.sendability_error() {
            return Err(error);
        }

        let message = self.compose(body, is_html);
        self.dispatch(message).await
    }

    /// Delivers a caller-composed message. The message is checked for
    /// a sender and recipients; session addressing state is not used.
    pub async fn send_message(&mut self, message: Message) -> MailerResult<Delivery> {
        if message.from.is_empty() && message.sender.is_none() {
            return Err(MailerError::addressing("message has no sender mailbox"));
        }
        if !message.has_recipients() {
            return Err(MailerError::addressing("message has no recipients"));
        }
        if self.config.delivery_mode == DeliveryMode::Network && !self.config.has_host() {
            return Err(MailerError::configuration(
                "network delivery requires a relay host",
            ));
        }

        self.dispatch(message).await
    }

    /// Renders a template and sends the result as an HTML body.
    pub async fn send_template<T: Serialize>(
        &mut self,
        renderer: &TemplateRenderer,
        name: &str,
        model: &T,
    ) -> MailerResult<Delivery> {
        let body = renderer.render(name, model)?;
        self.send(body, true).await
    }

    async fn dispatch(&mut self, message: Message) -> MailerResult<Delivery> {
        let timer = Timer::start("deliver");
        let result = self.router.deliver(&message).await;
        timer.stop();

        match &result {
            Ok(Delivery::PickupFile(_)) => self.metrics.record_pickup_deposit(),
            Ok(Delivery::Relayed(_)) => self.metrics.record_relay_submission(),
            Err(_) => self.metrics.record_send_failure(),
        }

        if result.is_ok() && self.reset_after_send {
            self.reset(false);
        }

        result
    }

    /// Clears per-message state: subject and all recipient lists.
    /// The sender is cleared only when requested; categories,
    /// co-senders, attachments, and auxiliary headers survive.
    pub fn reset(&mut self, reset_sender: bool) {
        self.subject.clear();
        self.to.clear();
        self.cc.clear();
        self.bcc.clear();
        if reset_sender {
            self.from = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::MailerErrorKind;
    use crate::mocks::MockRelay;
    use rstest::rstest;
    use serde_json::json;

    fn network_config() -> MailerConfig {
        MailerConfig::builder()
            .host("smtp.example.com")
            .from_address("default@example.com")
            .build()
            .unwrap()
    }

    fn mailer_with_mock(config: MailerConfig) -> (Mailer, Arc<MockRelay>) {
        let relay = Arc::new(MockRelay::new());
        let mailer = Mailer::with_relay(Arc::new(config), Arc::clone(&relay) as Arc<dyn RelayTransport>);
        (mailer, relay)
    }

    #[test]
    fn test_explicit_sender_wins_over_settings() {
        let (mut mailer, _relay) = mailer_with_mock(network_config());
        mailer.set_from(Address::with_name("Explicit", "explicit@example.com"));

        let message = mailer.compose("hi", false);
        assert_eq!(message.from.len(), 1);
        assert_eq!(message.from[0].email(), "explicit@example.com");
        assert_eq!(message.from[0].name(), Some("Explicit"));
    }

    #[test]
    fn test_settings_sender_with_display_name() {
        let config = MailerConfig::builder()
            .host("smtp.example.com")
            .from_address("noreply@example.com")
            .from_display_name("Notifications")
            .build()
            .unwrap();
        let (mut mailer, _relay) = mailer_with_mock(config);

        let message = mailer.compose("hi", false);
        assert_eq!(message.from[0].email(), "noreply@example.com");
        assert_eq!(message.from[0].name(), Some("Notifications"));
    }

    #[test]
    fn test_settings_sender_without_display_name_doubles_address() {
        let (mut mailer, _relay) = mailer_with_mock(network_config());

        let message = mailer.compose("hi", false);
        assert_eq!(message.from[0].email(), "default@example.com");
        assert_eq!(message.from[0].name(), Some("default@example.com"));
    }

    #[test]
    fn test_unresolvable_sender_composes_empty_from() {
        let (mut mailer, _relay) = mailer_with_mock(
            MailerConfig::builder().host("smtp.example.com").build().unwrap(),
        );

        let message = mailer.compose("hi", false);
        assert!(message.from.is_empty());
        assert!(message.sender.is_none());
    }

    #[test]
    fn test_resolved_sender_cached_until_full_reset() {
        let (mut mailer, _relay) = mailer_with_mock(network_config());
        mailer.set_from("explicit@example.com");

        mailer.reset(false);
        let message = mailer.compose("hi", false);
        assert_eq!(message.from[0].email(), "explicit@example.com");

        mailer.reset(true);
        let message = mailer.compose("hi", false);
        assert_eq!(message.from[0].email(), "default@example.com");
    }

    #[test]
    fn test_co_senders_form_from_list_with_submitting_mailbox() {
        let (mut mailer, _relay) = mailer_with_mock(network_config());
        mailer.add_from("first@example.com");
        mailer.add_from(("Second", "second@example.com"));

        let message = mailer.compose("hi", false);
        assert_eq!(message.from.len(), 2);
        assert_eq!(message.sender.as_ref().unwrap().email(), "first@example.com");
    }

    #[test]
    fn test_single_co_sender_writes_no_sender_field() {
        let (mut mailer, _relay) = mailer_with_mock(network_config());
        mailer.add_from("only@example.com");

        let message = mailer.compose("hi", false);
        assert_eq!(message.from.len(), 1);
        assert!(message.sender.is_none());
    }

    #[rstest]
    #[case(true, true, true, true)]
    #[case(true, true, false, false)]
    #[case(true, false, true, false)]
    #[case(true, false, false, false)]
    #[case(false, true, true, false)]
    #[case(false, true, false, false)]
    #[case(false, false, true, false)]
    #[case(false, false, false, false)]
    fn test_sendability_table(
        #[case] with_sender: bool,
        #[case] with_recipient: bool,
        #[case] with_host: bool,
        #[case] expected: bool,
    ) {
        let mut builder = MailerConfig::builder();
        if with_host {
            builder = builder.host("smtp.example.com");
        }
        let (mut mailer, _relay) = mailer_with_mock(builder.build().unwrap());

        if with_sender {
            mailer.set_from("from@example.com");
        }
        if with_recipient {
            mailer.add_to("to@example.com");
        }

        assert_eq!(mailer.is_sendable(), expected);
    }

    #[test]
    fn test_pickup_mode_is_sendable_without_host() {
        let dir = tempfile::tempdir().unwrap();
        let mut mailer = Mailer::new(MailerConfig::pickup(dir.path()));
        mailer.set_from("from@example.com");
        mailer.add_to("to@example.com");
        assert!(mailer.is_sendable());
    }

    #[tokio::test]
    async fn test_unsendable_send_does_no_io() {
        let (mut mailer, relay) = mailer_with_mock(network_config());
        // No recipients

        let err = mailer.send("hi", false).await.unwrap_err();
        assert_eq!(err.kind(), MailerErrorKind::Addressing);
        assert!(relay.submissions().is_empty());
        assert_eq!(mailer.metrics().snapshot().messages_failed, 0);
    }

    #[tokio::test]
    async fn test_send_delivers_and_resets() {
        let (mut mailer, relay) = mailer_with_mock(network_config());
        mailer
            .set_subject("Hello")
            .add_to("to@example.com")
            .add_category("alerts")
            .add_attachment(Attachment::new("a.txt", "text/plain", b"x".to_vec()));

        let delivery = mailer.send("body text", false).await.unwrap();
        assert!(matches!(delivery, Delivery::Relayed(_)));

        // Subject and recipients cleared, durable state kept
        assert_eq!(mailer.subject(), "");
        assert!(mailer.to().is_empty());
        assert!(!mailer.categories().accumulated().is_empty());
        assert_eq!(mailer.metrics().snapshot().messages_composed, 1);
        assert_eq!(mailer.metrics().snapshot().relay_submissions, 1);

        // Sender survives the post-send reset
        mailer.add_to("next@example.com");
        assert!(mailer.is_sendable());
    }

    #[tokio::test]
    async fn test_reset_after_send_opt_out() {
        let (mut mailer, _relay) = mailer_with_mock(network_config());
        mailer
            .set_reset_after_send(false)
            .set_subject("Keep")
            .add_to("to@example.com");

        mailer.send("body", false).await.unwrap();
        assert_eq!(mailer.subject(), "Keep");
        assert_eq!(mailer.to().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_send_preserves_state() {
        let (mut mailer, relay) = mailer_with_mock(network_config());
        relay.fail_next_with(MailerError::connection("down"));
        mailer.set_subject("Retry me").add_to("to@example.com");

        assert!(mailer.send("body", false).await.is_err());
        assert_eq!(mailer.subject(), "Retry me");
        assert_eq!(mailer.to().len(), 1);
        assert_eq!(mailer.metrics().snapshot().messages_failed, 1);
    }

    #[tokio::test]
    async fn test_category_tags_accumulate_from_config() {
        let config = MailerConfig::builder()
            .host("smtp.example.com")
            .from_address("from@example.com")
            .category("news")
            .build()
            .unwrap();
        let (mut mailer, relay) = mailer_with_mock(config);
        mailer.add_category("alerts").add_to("to@example.com");

        mailer.send("body", false).await.unwrap();

        let data = relay.last_submission().unwrap().data_text();
        assert!(data.contains("X-SMTPAPI: {\"category\":[\"news,alerts\"]}"));
    }

    #[tokio::test]
    async fn test_category_override_is_verbatim() {
        let (mut mailer, relay) = mailer_with_mock(network_config());
        mailer
            .add_category("ignored")
            .set_category_override("billing")
            .add_to("to@example.com");

        mailer.send("body", false).await.unwrap();

        let data = relay.last_submission().unwrap().data_text();
        assert!(data.contains("X-SMTPAPI: {\"category\":[\"billing\"]}"));
        assert!(!data.contains("ignored"));
    }

    #[tokio::test]
    async fn test_blank_category_override_suppresses_header() {
        let (mut mailer, relay) = mailer_with_mock(network_config());
        mailer
            .add_category("news")
            .set_category_override("")
            .add_to("to@example.com");

        mailer.send("body", false).await.unwrap();

        let data = relay.last_submission().unwrap().data_text();
        assert!(!data.contains("X-SMTPAPI"));
    }

    #[tokio::test]
    async fn test_send_message_overload() {
        let (mut mailer, relay) = mailer_with_mock(network_config());

        let delivery = mailer.send_message(crate::mocks::test_message()).await.unwrap();
        assert!(matches!(delivery, Delivery::Relayed(_)));
        assert_eq!(
            relay.last_submission().unwrap().envelope.sender,
            "sender@example.com"
        );
    }

    #[tokio::test]
    async fn test_send_message_requires_recipients() {
        let (mut mailer, _relay) = mailer_with_mock(network_config());
        let mut message = crate::mocks::test_message();
        message.to.clear();

        let err = mailer.send_message(message).await.unwrap_err();
        assert_eq!(err.kind(), MailerErrorKind::Addressing);
    }

    #[tokio::test]
    async fn test_send_template_renders_html_body() {
        let mut renderer = TemplateRenderer::new();
        renderer
            .register_template("invoice", "<p>Total: {{total}}</p>")
            .unwrap();

        let (mut mailer, relay) = mailer_with_mock(network_config());
        mailer.add_to("to@example.com");

        mailer
            .send_template(&renderer, "invoice", &json!({"total": "42"}))
            .await
            .unwrap();

        let data = relay.last_submission().unwrap().data_text();
        assert!(data.contains("Content-Type: text/html; charset=utf-8"));
        assert!(data.contains("Total: 42"));
    }

    #[tokio::test]
    async fn test_send_template_miss_is_an_error_before_io() {
        let renderer = TemplateRenderer::new();
        let (mut mailer, relay) = mailer_with_mock(network_config());
        mailer.add_to("to@example.com");

        let err = mailer
            .send_template(&renderer, "absent", &json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), MailerErrorKind::Render);
        assert!(relay.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_pickup_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let mut mailer = Mailer::new(MailerConfig::pickup(dir.path()));
        mailer
            .set_from("from@example.com")
            .add_to("to@example.com")
            .set_subject("Greetings");

        let delivery = mailer.send("Hello.\nBye.", false).await.unwrap();
        let path = match delivery {
            Delivery::PickupFile(path) => path,
            other => panic!("expected pickup delivery, got {:?}", other),
        };

        let bytes = tokio::fs::read(&path).await.unwrap();
        let restored = crate::mime::dot_unstuff(&bytes);
        let content = String::from_utf8_lossy(&restored);
        assert!(content.contains("To: to@example.com"));
        assert!(content.contains("Subject: Greetings"));
        assert!(content.contains("Hello.\r\nBye."));
        assert!(bytes.ends_with(b"\r\n"));
        assert!(!bytes.ends_with(b"\r\n.\r\n"));

        assert_eq!(mailer.metrics().snapshot().pickup_deposits, 1);
    }
}
