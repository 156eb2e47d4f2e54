//! Outbound notifications to the person who filed a report.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notifier configuration error: {0}")]
    Config(String),
    #[error("invalid recipient `{0}`")]
    Recipient(String),
    #[error("delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_created(&self, email: &str) -> Result<(), NotifyError>;

    async fn notify_status_changed(&self, email: &str, status_label: &str)
    -> Result<(), NotifyError>;
}

/// Stand-in used when no mail transport is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_created(&self, email: &str) -> Result<(), NotifyError> {
        info!(
            target = "civic_reports::notify",
            recipient = email,
            "created notification skipped, no transport configured"
        );
        Ok(())
    }

    async fn notify_status_changed(
        &self,
        email: &str,
        status_label: &str,
    ) -> Result<(), NotifyError> {
        info!(
            target = "civic_reports::notify",
            recipient = email,
            status = status_label,
            "status notification skipped, no transport configured"
        );
        Ok(())
    }
}

/// What to tell the recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Created,
    StatusChanged { label: String },
}

/// Sends notices on detached tasks; delivery failures are logged only.
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    pub fn dispatch(&self, email: &str, notice: Notice) -> JoinHandle<()> {
        let notifier = self.notifier.clone();
        let email = email.to_string();
        tokio::spawn(async move {
            let result = match &notice {
                Notice::Created => notifier.notify_created(&email).await,
                Notice::StatusChanged { label } => {
                    notifier.notify_status_changed(&email, label).await
                }
            };
            if let Err(err) = result {
                warn!(
                    target = "civic_reports::notify",
                    recipient = %email,
                    notice = ?notice,
                    error = %err,
                    "notification failed"
                );
            }
        })
    }
}
