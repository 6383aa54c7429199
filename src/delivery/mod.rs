//! Delivery routing.
//!
//! Routes composed messages to exactly one backend chosen by the
//! configured delivery mode: the network relay or the pickup
//! directory. There is no fallback between the two; a failure on the
//! selected path is the outcome of the send.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{DeliveryMode, MailerConfig};
use crate::errors::{MailerError, MailerResult};
use crate::mime::MimeEncoder;
use crate::pickup::PickupDirectory;
use crate::relay::{RelayReceipt, RelayTransport, SmtpRelay};
use crate::types::{Envelope, Message};

/// How a message left the process.
#[derive(Debug, Clone)]
pub enum Delivery {
    /// Deposited as a pickup artifact at this path.
    PickupFile(PathBuf),
    /// Accepted by the upstream relay.
    Relayed(RelayReceipt),
}

/// Routes messages to the configured delivery backend.
pub struct DeliveryRouter {
    config: Arc<MailerConfig>,
    relay: Arc<dyn RelayTransport>,
}

impl fmt::Debug for DeliveryRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryRouter")
            .field("delivery_mode", &self.config.delivery_mode)
            .finish()
    }
}

impl DeliveryRouter {
    /// Creates a router with the production relay transport.
    pub fn new(config: Arc<MailerConfig>) -> Self {
        let relay = Arc::new(SmtpRelay::new(Arc::clone(&config)));
        Self { config, relay }
    }

    /// Creates a router over a custom relay transport.
    pub fn with_relay(config: Arc<MailerConfig>, relay: Arc<dyn RelayTransport>) -> Self {
        Self { config, relay }
    }

    /// Delivers one message over the configured backend.
    pub async fn deliver(&self, message: &Message) -> MailerResult<Delivery> {
        match self.config.delivery_mode {
            DeliveryMode::PickupDirectory => {
                let directory = self.config.pickup_directory.as_ref().ok_or_else(|| {
                    MailerError::configuration("Pickup delivery requires a pickup directory")
                })?;

                let pickup = PickupDirectory::new(directory, self.config.message_id_domain());
                let path = pickup.write(message).await?;
                Ok(Delivery::PickupFile(path))
            }
            DeliveryMode::Network => {
                let encoder = MimeEncoder::new(self.config.message_id_domain());
                let data = encoder.encode(message)?;
                let envelope = Envelope::for_message(message)?;
                let receipt = self.relay.submit(&envelope, &data).await?;
                Ok(Delivery::Relayed(receipt))
            }
        }
    }
}
