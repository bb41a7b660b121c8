//! Fire-and-forget email notifications for submissions and status changes.
//!
//! The lifecycle service only ever enqueues a [`Notification`]; a [`NotificationWorker`]
//! resolves recipients and talks to the [`Mailer`] off the request path. Delivery problems are
//! logged and counted, never returned to the caller that triggered them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use super::domain::{Application, ApplicationStatus};
use super::repository::{UserAccount, UserDirectory};

/// Event emitted by the lifecycle service.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// A new application was stored; every reachable administrator hears about it.
    Submitted { application: Box<Application> },
    /// A review moved the application to `status`; the applicant hears about it.
    StatusChanged {
        application: Box<Application>,
        status: ApplicationStatus,
        changed_at: DateTime<Utc>,
    },
}

/// Rendered message handed to a [`Mailer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

/// Outbound email transport.
pub trait Mailer: Send + Sync {
    fn send(&self, email: &OutboundEmail) -> Result<(), MailError>;
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail transport unavailable: {0}")]
    Transport(String),
    #[error("recipient {recipient} rejected: {reason}")]
    Rejected { recipient: String, reason: String },
}

/// Outcome counters for one or more processed notifications.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub sent: usize,
    pub failed: usize,
}

impl DeliveryReport {
    fn absorb(&mut self, other: DeliveryReport) {
        self.sent += other.sent;
        self.failed += other.failed;
    }
}

/// Cheap handle used by the service to enqueue notifications.
#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    sender: mpsc::UnboundedSender<Notification>,
}

impl NotificationDispatcher {
    pub fn channel<U, M>(
        users: Arc<U>,
        mailer: Arc<M>,
    ) -> (NotificationDispatcher, NotificationWorker<U, M>)
    where
        U: UserDirectory + 'static,
        M: Mailer + 'static,
    {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            NotificationDispatcher { sender },
            NotificationWorker {
                receiver,
                users,
                mailer,
            },
        )
    }

    /// Enqueue without blocking. A stopped worker is logged and otherwise ignored.
    pub fn dispatch(&self, notification: Notification) {
        if self.sender.send(notification).is_err() {
            tracing::warn!("notification worker stopped; dropping notification");
        }
    }
}

/// Consumes queued notifications and delivers them.
pub struct NotificationWorker<U, M> {
    receiver: mpsc::UnboundedReceiver<Notification>,
    users: Arc<U>,
    mailer: Arc<M>,
}

impl<U, M> NotificationWorker<U, M>
where
    U: UserDirectory + 'static,
    M: Mailer + 'static,
{
    /// Deliver notifications until every dispatcher has been dropped.
    ///
    /// `Mailer::send` is synchronous, so each delivery runs on the blocking pool.
    pub async fn run(mut self) -> DeliveryReport {
        let mut total = DeliveryReport::default();
        while let Some(notification) = self.receiver.recv().await {
            let users = Arc::clone(&self.users);
            let mailer = Arc::clone(&self.mailer);
            let report =
                tokio::task::spawn_blocking(move || deliver(&*users, &*mailer, &notification))
                    .await
                    .unwrap_or_else(|error| {
                        tracing::warn!(%error, "notification delivery task failed");
                        DeliveryReport { sent: 0, failed: 1 }
                    });
            total.absorb(report);
        }
        tracing::debug!(sent = total.sent, failed = total.failed, "notification worker stopped");
        total
    }

    /// Deliver everything queued so far without waiting for more.
    pub fn drain(&mut self) -> DeliveryReport {
        let mut total = DeliveryReport::default();
        while let Ok(notification) = self.receiver.try_recv() {
            total.absorb(deliver(&*self.users, &*self.mailer, &notification));
        }
        total
    }
}

fn deliver<U: UserDirectory, M: Mailer>(
    users: &U,
    mailer: &M,
    notification: &Notification,
) -> DeliveryReport {
    let recipients = match recipients(users, notification) {
        Ok(recipients) => recipients,
        Err(error) => {
            tracing::warn!(%error, "could not resolve notification recipients");
            return DeliveryReport {
                sent: 0,
                failed: 1,
            };
        }
    };

    let mut report = DeliveryReport::default();
    for recipient in recipients {
        let email = render(notification, &recipient.email);
        match mailer.send(&email) {
            Ok(()) => report.sent += 1,
            Err(error) => {
                report.failed += 1;
                tracing::warn!(
                    recipient = %recipient.email,
                    subject = %email.subject,
                    %error,
                    "notification delivery failed"
                );
            }
        }
    }
    report
}

fn recipients<U: UserDirectory>(
    users: &U,
    notification: &Notification,
) -> Result<Vec<UserAccount>, super::repository::RepositoryError> {
    let candidates = match notification {
        Notification::Submitted { .. } => users.administrators()?,
        Notification::StatusChanged { application, .. } => users
            .fetch(&application.applicant_id)?
            .into_iter()
            .collect(),
    };
    Ok(candidates
        .into_iter()
        .filter(UserAccount::is_reachable)
        .collect())
}

/// Render `notification` for one recipient.
pub fn render(notification: &Notification, to: &str) -> OutboundEmail {
    match notification {
        Notification::Submitted { application } => {
            let financial = &application.financial_info;
            OutboundEmail {
                to: to.to_string(),
                subject: format!(
                    "New Application Submitted - {}",
                    application.application_number
                ),
                html_body: format!(
                    "<h2>New Grant Application Submitted</h2>\n\
                     <p>A new application has been submitted and requires review:</p>\n\
                     <ul>\n\
                     <li><strong>Application Number:</strong> {number}</li>\n\
                     <li><strong>Type:</strong> {kind}</li>\n\
                     <li><strong>Title:</strong> {title}</li>\n\
                     <li><strong>Requested Amount:</strong> {currency} {amount}</li>\n\
                     <li><strong>Priority:</strong> {priority}</li>\n\
                     <li><strong>Submitted:</strong> {submitted}</li>\n\
                     </ul>\n\
                     <p>Please log in to the admin dashboard to review this application.</p>",
                    number = application.application_number,
                    kind = application.application_type(),
                    title = escape_html(&application.title),
                    currency = escape_html(&financial.currency),
                    amount = format_amount(financial.requested_amount),
                    priority = application.priority,
                    submitted = application.submitted_at.format("%Y-%m-%d"),
                ),
            }
        }
        Notification::StatusChanged {
            application,
            status,
            changed_at,
        } => {
            let (headline, colour) = status_headline(*status);
            let comments = application
                .current_review()
                .map(|review| review.comments.trim())
                .filter(|comments| !comments.is_empty())
                .map(|comments| {
                    format!(
                        "\n<h3>Reviewer Comments:</h3>\n<p>{}</p>",
                        escape_html(comments)
                    )
                })
                .unwrap_or_default();
            OutboundEmail {
                to: to.to_string(),
                subject: format!(
                    "Application Status Update - {}",
                    application.application_number
                ),
                html_body: format!(
                    "<h2 style=\"color: {colour};\">{headline}</h2>\n\
                     <p>Your application details:</p>\n\
                     <ul>\n\
                     <li><strong>Application Number:</strong> {number}</li>\n\
                     <li><strong>Title:</strong> {title}</li>\n\
                     <li><strong>New Status:</strong> {status}</li>\n\
                     <li><strong>Updated On:</strong> {updated}</li>\n\
                     </ul>{comments}\n\
                     <p>You can check your application status by logging into your account.</p>",
                    number = application.application_number,
                    title = escape_html(&application.title),
                    updated = changed_at.format("%Y-%m-%d"),
                ),
            }
        }
    }
}

fn status_headline(status: ApplicationStatus) -> (String, &'static str) {
    match status {
        ApplicationStatus::Approved => ("Your application has been approved!".into(), "#28a745"),
        ApplicationStatus::Rejected => ("Your application has been rejected.".into(), "#dc3545"),
        ApplicationStatus::UnderReview => {
            ("Your application is now under review.".into(), "#ffc107")
        }
        ApplicationStatus::Completed => ("Your application has been completed!".into(), "#28a745"),
        other => (
            format!("Your application status has been updated to {other}."),
            "#333",
        ),
    }
}

/// Thousands-separated amount with at most two decimals, e.g. `1,250,000` or `99.5`.
fn format_amount(amount: f64) -> String {
    let rounded = format!("{amount:.2}");
    let (whole, fraction) = rounded.split_once('.').unwrap_or((rounded.as_str(), ""));
    let (sign, digits) = match whole.strip_prefix('-') {
        Some(digits) => ("-", digits),
        None => ("", whole),
    };

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        format!("{sign}{grouped}")
    } else {
        format!("{sign}{grouped}.{fraction}")
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
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amounts_are_grouped_by_thousands() {
        assert_eq!(format_amount(1_250_000.0), "1,250,000");
        assert_eq!(format_amount(999.0), "999");
        assert_eq!(format_amount(1000.5), "1,000.5");
        assert_eq!(format_amount(12.346), "12.35");
    }

    #[test]
    fn html_in_user_text_is_escaped() {
        assert_eq!(
            escape_html("<b>Fees & \"books\"</b>"),
            "&lt;b&gt;Fees &amp; &quot;books&quot;&lt;/b&gt;"
        );
    }

    #[test]
    fn generic_headline_names_the_status() {
        let (headline, colour) = status_headline(ApplicationStatus::Cancelled);
        assert_eq!(headline, "Your application status has been updated to CANCELLED.");
        assert_eq!(colour, "#333");
    }
}
