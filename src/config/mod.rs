//! Configuration for mail delivery.
//!
//! [`MailerConfig`] is the immutable settings surface shared by every
//! session: relay endpoint and credentials, delivery mode, pickup
//! directory, default sender, default categories, and TLS policy. A
//! config is read-only after construction and is typically wrapped in an
//! `Arc` so many sessions can share it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::errors::{MailerError, MailerResult};
use crate::types::Address;

/// Default SMTP relay port.
pub const DEFAULT_PORT: u16 = 25;

/// Connect timeout applied when no timeout is configured.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-command timeout applied when no timeout is configured.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// How a finished message leaves the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Submit over the network to the configured SMTP relay.
    #[default]
    Network,
    /// Materialize a `.eml` artifact into the pickup directory.
    PickupDirectory,
}

/// TLS negotiation mode for the relay connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TlsMode {
    /// Plain connection, never upgraded.
    None,
    /// Opportunistic STARTTLS (default).
    #[default]
    StartTls,
    /// Required STARTTLS (fail if not offered).
    StartTlsRequired,
    /// TLS from the first byte (SMTPS).
    Implicit,
}

/// TLS policy for the relay connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsPolicy {
    /// Negotiation mode.
    #[serde(default)]
    pub mode: TlsMode,
    /// Whether certificate revocation is checked where the verifier has
    /// revocation data available.
    #[serde(default = "default_check_revocation")]
    pub check_certificate_revocation: bool,
}

impl Default for TlsPolicy {
    fn default() -> Self {
        Self {
            mode: TlsMode::default(),
            check_certificate_revocation: default_check_revocation(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_check_revocation() -> bool {
    true
}

/// Settings for composing and delivering mail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailerConfig {
    /// Relay host name. Only required for network delivery.
    #[serde(default)]
    pub host: String,

    /// Relay port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Username for relay authentication.
    #[serde(default)]
    pub username: Option<String>,

    /// Password for relay authentication. Never serialized.
    #[serde(skip)]
    pub password: Option<SecretString>,

    /// Optional timeout applied to connect and to each command exchange.
    /// Unset falls back to [`DEFAULT_CONNECT_TIMEOUT`] and
    /// [`DEFAULT_COMMAND_TIMEOUT`].
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,

    /// Delivery mode.
    #[serde(default)]
    pub delivery_mode: DeliveryMode,

    /// Directory watched by the pickup agent. Required for pickup
    /// delivery.
    #[serde(default)]
    pub pickup_directory: Option<PathBuf>,

    /// Sender address used when a session does not set one explicitly.
    #[serde(default)]
    pub from_address: Option<String>,

    /// Display name paired with the default sender address.
    #[serde(default)]
    pub from_display_name: Option<String>,

    /// Categories every new session starts with.
    #[serde(default)]
    pub categories: Vec<String>,

    /// TLS policy for the relay connection.
    #[serde(default)]
    pub tls: TlsPolicy,
}

impl Default for MailerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            username: None,
            password: None,
            timeout: None,
            delivery_mode: DeliveryMode::default(),
            pickup_directory: None,
            from_address: None,
            from_display_name: None,
            categories: Vec::new(),
            tls: TlsPolicy::default(),
        }
    }
}

impl MailerConfig {
    /// Creates a network-delivery config for the given relay host.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    /// Creates a pickup-directory config for the given directory.
    pub fn pickup(directory: impl Into<PathBuf>) -> Self {
        Self {
            delivery_mode: DeliveryMode::PickupDirectory,
            pickup_directory: Some(directory.into()),
            ..Self::default()
        }
    }

    /// Returns a builder for constructing a config.
    pub fn builder() -> MailerConfigBuilder {
        MailerConfigBuilder::default()
    }

    /// Returns true when a relay host is configured.
    pub fn has_host(&self) -> bool {
        !self.host.trim().is_empty()
    }

    /// Resolves the default sender from `from_address` and
    /// `from_display_name`.
    ///
    /// When no display name is configured the address doubles as its own
    /// display name. Returns `None` when no address is configured.
    pub fn sender_address(&self) -> Option<Address> {
        let address = self
            .from_address
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())?;
        let name = self
            .from_display_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(address);
        Some(Address::with_name(name, address))
    }

    /// Domain used for generated Message-ID and boundary values.
    pub fn message_id_domain(&self) -> &str {
        if self.has_host() {
            self.host.as_str()
        } else {
            "localhost"
        }
    }

    /// Connect timeout: the configured value or the default.
    pub fn connect_timeout(&self) -> Duration {
        self.timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT)
    }

    /// Per-command timeout: the configured value or the default.
    pub fn command_timeout(&self) -> Duration {
        self.timeout.unwrap_or(DEFAULT_COMMAND_TIMEOUT)
    }

    /// Validates the configuration.
    ///
    /// A blank host is legal here: host is a network-mode requirement
    /// enforced by the sendability check at send time.
    pub fn validate(&self) -> MailerResult<()> {
        if self.port == 0 {
            return Err(MailerError::configuration("port must be non-zero"));
        }
        if let Some(timeout) = self.timeout {
            if timeout.is_zero() {
                return Err(MailerError::configuration("timeout must be non-zero"));
            }
        }
        if self.delivery_mode == DeliveryMode::PickupDirectory {
            match self.pickup_directory.as_deref() {
                Some(dir) if !dir.as_os_str().is_empty() => {}
                _ => {
                    return Err(MailerError::configuration(
                        "pickup delivery requires a pickup directory",
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Builder for [`MailerConfig`].
#[derive(Debug, Default)]
pub struct MailerConfigBuilder {
    config: MailerConfig,
}

impl MailerConfigBuilder {
    /// Sets the relay host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Sets the relay port.
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Sets the relay credentials.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.username = Some(username.into());
        self.config.password = Some(SecretString::new(password.into()));
        self
    }

    /// Sets the timeout applied to connect and command exchanges.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    /// Sets the delivery mode.
    pub fn delivery_mode(mut self, mode: DeliveryMode) -> Self {
        self.config.delivery_mode = mode;
        self
    }

    /// Sets the pickup directory and switches to pickup delivery.
    pub fn pickup_directory(mut self, directory: impl AsRef<Path>) -> Self {
        self.config.delivery_mode = DeliveryMode::PickupDirectory;
        self.config.pickup_directory = Some(directory.as_ref().to_path_buf());
        self
    }

    /// Sets the default sender address.
    pub fn from_address(mut self, address: impl Into<String>) -> Self {
        self.config.from_address = Some(address.into());
        self
    }

    /// Sets the display name for the default sender.
    pub fn from_display_name(mut self, name: impl Into<String>) -> Self {
        self.config.from_display_name = Some(name.into());
        self
    }

    /// Appends a default category.
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.config.categories.push(category.into());
        self
    }

    /// Replaces the default categories.
    pub fn categories(mut self, categories: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.config.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the TLS negotiation mode.
    pub fn tls_mode(mut self, mode: TlsMode) -> Self {
        self.config.tls.mode = mode;
        self
    }

    /// Sets whether certificate revocation is checked.
    pub fn check_certificate_revocation(mut self, check: bool) -> Self {
        self.config.tls.check_certificate_revocation = check;
        self
    }

    /// Validates and returns the config.
    pub fn build(self) -> MailerResult<MailerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&humantime::format_duration(*d).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value: Option<String> = Option::deserialize(deserializer)?;
        match value {
            Some(text) => humantime::parse_duration(&text)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}
