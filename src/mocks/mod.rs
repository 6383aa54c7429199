//! Mock implementations for testing.
//!
//! Provides a recording relay transport and message fixtures so
//! delivery behavior can be asserted without a live SMTP server.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::errors::{MailerError, MailerResult};
use crate::relay::{RelayReceipt, RelayTransport};
use crate::types::{
    Address, Attachment, BodyContent, Envelope, Headers, Importance, Message, Priority,
};

/// One recorded relay submission.
#[derive(Debug, Clone)]
pub struct RecordedSubmission {
    /// Envelope the caller supplied.
    pub envelope: Envelope,
    /// Serialized message data as handed to the transport.
    pub data: Vec<u8>,
}

impl RecordedSubmission {
    /// Returns the data as text for content assertions.
    pub fn data_text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

/// Mock relay transport that records submissions.
#[derive(Debug, Default)]
pub struct MockRelay {
    submissions: Arc<Mutex<Vec<RecordedSubmission>>>,
    fail_next: Arc<Mutex<Option<MailerError>>>,
}

impl MockRelay {
    /// Creates a new mock relay.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the next submission to fail with the given error.
    pub fn fail_next_with(&self, error: MailerError) -> &Self {
        *self.fail_next.lock().unwrap() = Some(error);
        self
    }

    /// Returns all recorded submissions.
    pub fn submissions(&self) -> Vec<RecordedSubmission> {
        self.submissions.lock().unwrap().clone()
    }

    /// Returns the most recent submission.
    pub fn last_submission(&self) -> Option<RecordedSubmission> {
        self.submissions.lock().unwrap().last().cloned()
    }

    /// Clears recorded state.
    pub fn clear(&self) {
        self.submissions.lock().unwrap().clear();
        *self.fail_next.lock().unwrap() = None;
    }
}

#[async_trait]
impl RelayTransport for MockRelay {
    async fn submit(&self, envelope: &Envelope, data: &[u8]) -> MailerResult<RelayReceipt> {
        if let Some(error) = self.fail_next.lock().unwrap().take() {
            return Err(error);
        }

        self.submissions.lock().unwrap().push(RecordedSubmission {
            envelope: envelope.clone(),
            data: data.to_vec(),
        });

        Ok(RelayReceipt {
            accepted: envelope.recipients.len(),
            response: "2.0.0 Queued".to_string(),
            tls_used: false,
        })
    }
}

/// Creates a plain test message.
pub fn test_message() -> Message {
    Message {
        subject: "Test Subject".into(),
        priority: Priority::default(),
        importance: Importance::default(),
        from: vec![Address::new("sender@example.com")],
        sender: None,
        to: vec![Address::new("recipient@example.com")],
        cc: Vec::new(),
        bcc: Vec::new(),
        body: BodyContent::new("Test body", false),
        attachments: Vec::new(),
        headers: Headers::new(),
    }
}

/// Creates a test message with an HTML body.
pub fn test_message_html() -> Message {
    Message {
        body: BodyContent::new("<html><body><h1>Hello</h1></body></html>", true),
        ..test_message()
    }
}

/// Creates a test message with an attachment.
pub fn test_message_with_attachment() -> Message {
    Message {
        attachments: vec![Attachment::new(
            "test.txt",
            "text/plain",
            b"Hello, World!".to_vec(),
        )],
        ..test_message()
    }
}
