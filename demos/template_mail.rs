//! Templated HTML Mail Example
//!
//! This example demonstrates how to:
//! - Register a Handlebars template and render it with a typed model
//! - Send the rendered output as an HTML body
//! - Fall back cleanly when a template is missing

use integrations_mailer::{Mailer, MailerConfig, MailerError, TemplateRenderer};
use serde::Serialize;

#[derive(Serialize)]
struct WelcomeModel {
    name: String,
    verify_url: String,
}

#[tokio::main]
async fn main() -> Result<(), MailerError> {
    let mut renderer = TemplateRenderer::new();
    renderer.register_template(
        "welcome",
        "<html><body>\
         <h1>Welcome, {{name}}!</h1>\
         <p>Please <a href=\"{{verify_url}}\">verify your email address</a>.</p>\
         </body></html>",
    )?;

    let config = MailerConfig::builder()
        .host("smtp.example.com")
        .port(587)
        .credentials("user@example.com", "your-password")
        .from_address("noreply@example.com")
        .from_display_name("Example Service")
        .build()?;

    let mut mailer = Mailer::new(config);
    mailer
        .add_to("new.user@example.com")
        .set_subject("Welcome to Our Service!");

    let model = WelcomeModel {
        name: "New User".into(),
        verify_url: "https://example.com/verify".into(),
    };

    println!("Rendering template 'welcome' and sending...");

    match mailer.send_template(&renderer, "welcome", &model).await {
        Ok(delivery) => println!("Sent: {:?}", delivery),
        Err(e) => {
            eprintln!("Failed to send templated email: {}", e);
            return Err(e);
        }
    }

    Ok(())
}
