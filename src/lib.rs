//! # Mailer Integration Library
//!
//! A production-ready mail delivery implementation with:
//! - RFC 5322 message composition with MIME multipart attachments
//! - Quoted-printable bodies and base64 attachments
//! - Network relay over SMTP with STARTTLS and implicit TLS
//! - AUTH PLAIN and AUTH LOGIN
//! - Pickup-directory delivery for local agent handoff
//! - Handlebars template rendering for HTML bodies
//! - Category tagging for downstream analytics
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use integrations_mailer::{Mailer, MailerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Configure a network relay
//!     let config = MailerConfig::builder()
//!         .host("smtp.example.com")
//!         .port(587)
//!         .credentials("user@example.com", "password")
//!         .from_address("noreply@example.com")
//!         .build()?;
//!
//!     // Accumulate a message and send it
//!     let mut mailer = Mailer::new(config);
//!     mailer
//!         .add_to("recipient@example.com")
//!         .set_subject("Welcome aboard");
//!
//!     let delivery = mailer.send("Your account is ready.", false).await?;
//!     println!("Delivered: {:?}", delivery);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Core modules
pub mod config;
pub mod errors;
pub mod types;

// Protocol layer
pub mod protocol;

// MIME encoding
pub mod mime;

// Category tagging
pub mod category;

// Delivery backends
pub mod pickup;
pub mod relay;

// Delivery routing
pub mod delivery;

// Template rendering
pub mod render;

// Observability
pub mod observability;

// Session
pub mod session;

// Mocks for testing
pub mod mocks;

// Re-exports for convenience
pub use category::{CategoryTags, CATEGORY_HEADER};
pub use config::{DeliveryMode, MailerConfig, MailerConfigBuilder, TlsMode};
pub use delivery::{Delivery, DeliveryRouter};
pub use errors::{EnhancedStatusCode, MailerError, MailerErrorKind, MailerResult};
pub use mime::{MimeEncoder, TransferEncoding};
pub use observability::{MailerMetrics, MetricsSnapshot, Timer};
pub use pickup::PickupDirectory;
pub use protocol::{AuthMethod, ServerCapabilities, SmtpCommand, SmtpReply};
pub use relay::{RelayReceipt, RelayTransport, SmtpRelay};
pub use render::TemplateRenderer;
pub use session::Mailer;
pub use types::{
    Address, Attachment, BodyContent, Envelope, Headers, Importance, Message, Priority,
};
