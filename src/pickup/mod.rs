//! Pickup directory delivery.
//!
//! Deposits each message as a uniquely named `.eml` file in a
//! directory watched by a local transfer agent. Uniqueness comes from
//! random file tokens claimed with exclusive creation, so concurrent
//! writers on the same directory never clobber each other. Artifacts
//! carry the Bcc header: the pickup agent reconstructs the envelope
//! from headers alone.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::errors::{MailerError, MailerResult};
use crate::mime::{self, MimeEncoder};
use crate::types::Message;

/// Writes messages into a pickup directory.
#[derive(Debug, Clone)]
pub struct PickupDirectory {
    directory: PathBuf,
    domain: String,
}

impl PickupDirectory {
    /// Creates a writer for the given directory. The domain feeds
    /// Message-ID generation.
    pub fn new(directory: impl Into<PathBuf>, domain: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            domain: domain.into(),
        }
    }

    /// Returns the target directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Serializes the message and deposits it as a new `.eml` file,
    /// returning the artifact path. A failure after the file was
    /// claimed removes the partial artifact before reporting.
    pub async fn write(&self, message: &Message) -> MailerResult<PathBuf> {
        let (path, file) = self.create_unique().await?;

        match self.write_message(file, message).await {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(path = %path.display(), "Pickup artifact written");
                Ok(path)
            }
            Err(error) => {
                // Never leave a truncated artifact for the agent
                let _ = tokio::fs::remove_file(&path).await;
                Err(error)
            }
        }
    }

    /// Claims a fresh file name. Collisions retry with a new token;
    /// any other creation failure is fatal.
    async fn create_unique(&self) -> MailerResult<(PathBuf, File)> {
        loop {
            let name = format!("{}.eml", Uuid::new_v4());
            let path = self.directory.join(name);

            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(MailerError::durability(format!(
                        "Cannot create pickup file in {}: {}",
                        self.directory.display(),
                        e
                    ))
                    .with_cause(e))
                }
            }
        }
    }

    async fn write_message(&self, mut file: File, message: &Message) -> MailerResult<()> {
        let encoder = MimeEncoder::new(&self.domain);
        let encoded = encoder.encode_with_bcc(message)?;
        let artifact = artifact_payload(&encoded);

        file.write_all(&artifact)
            .await
            .map_err(|e| MailerError::durability(format!("Write failed: {}", e)).with_cause(e))?;
        file.flush()
            .await
            .map_err(|e| MailerError::durability(format!("Flush failed: {}", e)).with_cause(e))?;

        Ok(())
    }
}

/// Prepares an artifact body: dot-stuffed with a guaranteed CRLF
/// ending. Unlike the wire form there is no terminating dot line; the
/// file boundary ends the message.
fn artifact_payload(encoded: &[u8]) -> Vec<u8> {
    let mut output = mime::dot_stuff(encoded);

    if !output.ends_with(b"\r\n") {
        if output.ends_with(b"\n") {
            output.pop();
        }
        output.extend_from_slice(b"\r\n");
    }

    output
}
