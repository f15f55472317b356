// src/notify/mod.rs
//! One email per notice, sent independently; failures are captured, never raised.

pub mod http_email;
pub mod render;
pub mod smtp;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
#[cfg(any(test, feature = "test-util"))]
use parking_lot::Mutex;
use reqwest::Client;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{ConfigError, NotifyError};
use crate::listing::Listing;

/// What an email is about.
#[derive(Debug, Clone)]
pub enum Notice<'a> {
    Listing(&'a Listing),
    /// Operator alert when the search itself failed.
    FetchFailure { message: String },
}

impl Notice<'_> {
    fn label(&self) -> String {
        match self {
            Notice::Listing(l) => l.id.to_string(),
            Notice::FetchFailure { .. } => "fetch-failure".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationOutcome {
    Sent,
    Failed(String),
}

impl NotificationOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, NotificationOutcome::Sent)
    }
}

impl fmt::Display for NotificationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationOutcome::Sent => f.write_str("sent"),
            NotificationOutcome::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

// --- message shape expected by the transactional email API ---

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundEmail {
    pub sender_address: String,
    pub recipients: Recipients,
    pub content: EmailContent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recipients {
    pub to: Vec<EmailAddress>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailAddress {
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailContent {
    pub subject: String,
    pub html: String,
}

impl OutboundEmail {
    pub fn recipient(&self) -> &str {
        self.recipients
            .to
            .first()
            .map(|a| a.address.as_str())
            .unwrap_or_default()
    }
}

#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, msg: &OutboundEmail) -> Result<(), NotifyError>;
    fn name(&self) -> &'static str;
}

/// Build a transport from `ACS_CONNECTION_STRING`:
/// `endpoint=…;accesskey=…` for the HTTP API, `smtp://`/`smtps://` for SMTP,
/// `log://` to only log messages.
pub fn transport_from_connection_string(
    conn: &str,
    client: Client,
) -> Result<Arc<dyn EmailTransport>, ConfigError> {
    let conn = conn.trim();
    if conn.starts_with("smtp://") || conn.starts_with("smtps://") {
        return Ok(Arc::new(smtp::SmtpTransport::from_url(conn)?));
    }
    if conn.starts_with("log://") {
        return Ok(Arc::new(LogTransport));
    }
    Ok(Arc::new(http_email::HttpEmailTransport::from_connection_string(
        client, conn,
    )?))
}

fn validate_address(addr: &str) -> Result<(), NotifyError> {
    addr.parse::<lettre::Address>()
        .map(|_| ())
        .map_err(|_| NotifyError::InvalidAddress(addr.to_string()))
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    transport: Arc<dyn EmailTransport>,
    sender: String,
}

impl NotificationDispatcher {
    pub fn new(transport: Arc<dyn EmailTransport>, sender: impl Into<String>) -> Self {
        Self {
            transport,
            sender: sender.into(),
        }
    }

    pub fn compose(&self, notice: &Notice<'_>, recipient: &str) -> OutboundEmail {
        OutboundEmail {
            sender_address: self.sender.clone(),
            recipients: Recipients {
                to: vec![EmailAddress {
                    address: recipient.to_string(),
                }],
            },
            content: EmailContent {
                subject: render::subject(notice),
                html: render::html_body(notice),
            },
        }
    }

    /// Send exactly one email for `notice`. No retry; errors become `Failed`.
    pub async fn notify(&self, notice: &Notice<'_>, recipient: &str) -> NotificationOutcome {
        let result = match validate_address(recipient) {
            Ok(()) => {
                let msg = self.compose(notice, recipient);
                self.transport.send(&msg).await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                info!(notice = %notice.label(), transport = self.transport.name(), "email sent");
                NotificationOutcome::Sent
            }
            Err(err) => {
                warn!(notice = %notice.label(), transport = self.transport.name(), error = %err, "email send failed");
                NotificationOutcome::Failed(err.to_string())
            }
        }
    }
}

/// Logs messages instead of sending them (dry runs, demo binary).
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTransport;

#[async_trait]
impl EmailTransport for LogTransport {
    async fn send(&self, msg: &OutboundEmail) -> Result<(), NotifyError> {
        info!(
            to = msg.recipient(),
            from = %msg.sender_address,
            subject = %msg.content.subject,
            "dry-run email"
        );
        tracing::debug!(html = %msg.content.html, "dry-run email body");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

// --- Test helper ---

/// Records every message; subjects containing a configured marker fail.
#[cfg(any(test, feature = "test-util"))]
#[derive(Default)]
pub struct RecordingTransport {
    pub sent: Mutex<Vec<OutboundEmail>>,
    fail_marker: Mutex<Option<String>>,
}

#[cfg(any(test, feature = "test-util"))]
impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_when_subject_contains(marker: &str) -> Self {
        let t = Self::default();
        *t.fail_marker.lock() = Some(marker.to_string());
        t
    }

    pub fn subjects(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .map(|m| m.content.subject.clone())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[cfg(any(test, feature = "test-util"))]
#[async_trait]
impl EmailTransport for RecordingTransport {
    async fn send(&self, msg: &OutboundEmail) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .push(msg.clone());
        let marker = self.fail_marker.lock().clone();
        match marker {
            Some(m) if msg.content.subject.contains(&m) => {
                Err(NotifyError::Transport("simulated transport failure".into()))
            }
            _ => Ok(()),
        }
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}
