//! Outbound e-mail seam. Delivery itself is out of scope; the default mailer
//! writes messages to the log.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Error, Debug)]
#[error("failed to send mail to {to}: {reason}")]
pub struct MailError {
    pub to: String,
    pub reason: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> Result<(), MailError>;
}

#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        tracing::info!(
            from = %email.from,
            to = %email.to,
            subject = %email.subject,
            body = %email.body,
            "outgoing mail"
        );
        Ok(())
    }
}

/// Sends in the background; the request does not wait and failures are only logged.
pub fn send_detached(mailer: Arc<dyn Mailer>, email: Email) {
    tokio::spawn(async move {
        if let Err(e) = mailer.send(&email).await {
            tracing::warn!(error = %e, "mail delivery failed");
        }
    });
}

pub fn invitation(from: &str, to: &str, accept_url: &str) -> Email {
    Email {
        from: from.to_string(),
        to: to.to_string(),
        subject: "You're invited to join our LMS platform".to_string(),
        body: format!("Click the link to accept the invitation: {accept_url}"),
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use parking_lot::Mutex;

    /// Keeps every message so tests can inspect what would have been sent.
    #[derive(Default)]
    pub struct RecordingMailer {
        pub sent: Mutex<Vec<Email>>,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, email: &Email) -> Result<(), MailError> {
            self.sent.lock().push(email.clone());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingMailer;
    use super::*;

    #[tokio::test]
    async fn detached_send_reaches_mailer() {
        let mailer = Arc::new(RecordingMailer::default());
        let email = invitation("lms@example.com", "new@example.com", "http://app/accept-invite/abc/");

        send_detached(mailer.clone(), email.clone());
        for _ in 0..50 {
            if !mailer.sent.lock().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }

        assert_eq!(mailer.sent.lock().as_slice(), &[email]);
    }

    #[tokio::test]
    async fn log_mailer_never_fails() {
        let email = invitation("a@x", "b@x", "u");
        assert!(LogMailer.send(&email).await.is_ok());
    }
}
