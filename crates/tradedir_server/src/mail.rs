//! Outgoing mail for entity-to-entity contact.

use crate::AppError;

/// Delivers contact messages.
pub trait Mailer: Send + Sync {
    /// Send one message.
    ///
    /// # Errors
    /// Returns an error when delivery fails.
    fn send(&self, receiver: &str, subject: &str, text: &str, html: &str) -> Result<(), AppError>;
}

/// Mailer that only logs; used when no delivery backend is configured.
#[derive(Debug, Default)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, receiver: &str, subject: &str, text: &str, _html: &str) -> Result<(), AppError> {
        tracing::info!(
            receiver,
            subject,
            bytes = text.len(),
            "Contact message accepted for delivery"
        );
        Ok(())
    }
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            '\n' => escaped.push_str("<br>"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Subject, plain-text body, and HTML body for a contact message.
pub(crate) fn render_contact(sender_name: &str, sender_email: &str, body: &str) -> (String, String, String) {
    let subject = format!("New message from {}", sender_name);
    let text = format!(
        "{} ({}) sent you a message:\n\n{}",
        sender_name, sender_email, body
    );
    let html = format!(
        "<p><strong>{}</strong> ({}) sent you a message:</p><p>{}</p>",
        escape_html(sender_name),
        escape_html(sender_email),
        escape_html(body)
    );
    (subject, text, html)
}
