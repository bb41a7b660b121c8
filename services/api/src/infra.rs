use grantdesk::workflows::grants::{
    DirectoryImportError, InMemoryUserDirectory, MailError, Mailer, OutboundEmail,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Mailer that writes each message to the log instead of an SMTP relay.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, email: &OutboundEmail) -> Result<(), MailError> {
        info!(
            to = %email.to,
            subject = %email.subject,
            bytes = email.html_body.len(),
            "notification email handed to log transport"
        );
        Ok(())
    }
}

/// Mailer that keeps messages in memory so the demo can print them.
#[derive(Default, Clone)]
pub(crate) struct OutboxMailer {
    sent: Arc<Mutex<Vec<OutboundEmail>>>,
}

impl OutboxMailer {
    pub(crate) fn take(&self) -> Vec<OutboundEmail> {
        match self.sent.lock() {
            Ok(mut sent) => std::mem::take(&mut *sent),
            Err(_) => Vec::new(),
        }
    }
}

impl Mailer for OutboxMailer {
    fn send(&self, email: &OutboundEmail) -> Result<(), MailError> {
        let mut sent = self
            .sent
            .lock()
            .map_err(|_| MailError::Transport("outbox mutex poisoned".to_string()))?;
        sent.push(email.clone());
        Ok(())
    }
}

/// Load the identity directory from `path`, or start empty.
pub(crate) fn load_directory(
    path: Option<&Path>,
) -> Result<InMemoryUserDirectory, DirectoryImportError> {
    match path {
        Some(path) => {
            let directory = InMemoryUserDirectory::from_path(path)?;
            info!(path = %path.display(), users = directory.len(), "user directory loaded");
            Ok(directory)
        }
        None => {
            tracing::warn!("no user directory configured; notifications will have no recipients");
            Ok(InMemoryUserDirectory::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email(to: &str) -> OutboundEmail {
        OutboundEmail {
            to: to.to_string(),
            subject: "Application Status Update - SF2025100001".to_string(),
            html_body: "<p>hello</p>".to_string(),
        }
    }

    #[test]
    fn outbox_hands_back_messages_once() {
        let outbox = OutboxMailer::default();
        outbox.send(&email("a@example.org")).expect("send");
        outbox.send(&email("b@example.org")).expect("send");

        let sent = outbox.take();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].to, "b@example.org");
        assert!(outbox.take().is_empty());
    }

    #[test]
    fn log_mailer_always_accepts() {
        assert!(LogMailer.send(&email("a@example.org")).is_ok());
    }

    #[test]
    fn missing_directory_path_yields_empty_directory() {
        let directory = load_directory(None).expect("empty directory");
        assert!(directory.is_empty());
        assert!(load_directory(Some(Path::new("/nonexistent/users.csv"))).is_err());
    }
}
