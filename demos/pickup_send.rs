//! Pickup Directory Delivery Example
//!
//! This example demonstrates how to:
//! - Configure pickup-directory delivery instead of a network relay
//! - Accumulate a message on a mail session
//! - Inspect the `.eml` artifact handed off to the local transport agent

use integrations_mailer::{Delivery, Mailer, MailerConfig, MailerError};

#[tokio::main]
async fn main() -> Result<(), MailerError> {
    // Messages land as .eml files here; a local agent (IIS SMTP,
    // Postfix pickup, etc.) takes them from there.
    let spool = std::env::temp_dir().join("mailer-pickup");
    tokio::fs::create_dir_all(&spool)
        .await
        .map_err(|e| MailerError::durability("could not create pickup directory").with_cause(e))?;

    let config = MailerConfig::builder()
        .pickup_directory(&spool)
        .from_address("noreply@example.com")
        .from_display_name("Example Service")
        .build()?;

    let mut mailer = Mailer::new(config);
    mailer
        .add_to("recipient@example.com")
        .set_subject("Nightly report");

    println!("Depositing message into {}", spool.display());

    match mailer.send("All systems nominal.\n\nThe Reporting Bot", false).await {
        Ok(Delivery::PickupFile(path)) => {
            println!("Artifact written: {}", path.display());
        }
        Ok(other) => println!("Unexpected delivery outcome: {:?}", other),
        Err(e) => {
            eprintln!("Failed to deposit message: {}", e);
            return Err(e);
        }
    }

    Ok(())
}
