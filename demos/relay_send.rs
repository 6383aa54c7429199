//! Network Relay Example
//!
//! This example demonstrates how to:
//! - Configure a network relay with STARTTLS and credentials
//! - Attach a file and tag the message with categories
//! - Inspect the relay receipt after submission

use integrations_mailer::{Attachment, Delivery, Mailer, MailerConfig, MailerError, TlsMode};

#[tokio::main]
async fn main() -> Result<(), MailerError> {
    let config = MailerConfig::builder()
        .host("smtp.example.com")
        .port(587)
        .credentials("user@example.com", "your-password")
        .tls_mode(TlsMode::StartTlsRequired)
        .from_address("sender@example.com")
        .from_display_name("Sender Name")
        .category("transactional")
        .build()?;

    let mut mailer = Mailer::new(config);
    mailer
        .add_to(("Recipient Name", "recipient@example.com"))
        .add_cc("archive@example.com")
        .set_subject("Your weekly summary")
        .add_category("welcome")
        .add_attachment(Attachment::from_file(
            "notes.txt",
            b"Attached notes.".to_vec(),
        ));

    println!("Submitting to {}:{}", mailer.config().host, mailer.config().port);

    match mailer.send("Summary attached.\n\nRegards,\nThe Mailer", false).await {
        Ok(Delivery::Relayed(receipt)) => {
            println!("Message accepted for {} recipient(s)", receipt.accepted);
            println!("  Server said: {}", receipt.response);
            println!("  TLS in use: {}", receipt.tls_used);
        }
        Ok(other) => println!("Unexpected delivery outcome: {:?}", other),
        Err(e) => {
            eprintln!("Failed to send email: {}", e);
            return Err(e);
        }
    }

    Ok(())
}
