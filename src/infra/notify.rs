//! SMTP delivery of reporter notifications via `lettre`.

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor, message::Mailbox,
    transport::smtp::authentication::Credentials,
};
use tracing::info;

use crate::application::notify::{Notifier, NotifyError};
use crate::config::SmtpSettings;

const IMPLICIT_TLS_PORT: u16 = 465;

pub const CREATED_SUBJECT: &str = "Report received";
pub const CREATED_BODY: &str = "Your report has been received and will be reviewed shortly.";
pub const STATUS_SUBJECT: &str = "Report status changed";

pub fn status_body(label: &str) -> String {
    format!("The status of your report changed to: {label}.")
}

#[derive(Debug)]
pub struct EmailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailNotifier {
    pub fn from_settings(settings: &SmtpSettings) -> Result<Self, NotifyError> {
        let from: Mailbox = settings
            .from
            .parse()
            .map_err(|err: lettre::address::AddressError| NotifyError::Config(err.to_string()))?;

        let mut builder = (if settings.port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)
                .map_err(|err| NotifyError::Config(err.to_string()))?
        } else if settings.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
                .map_err(|err| NotifyError::Config(err.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.host)
        })
        .port(settings.port);

        if let (Some(username), Some(password)) =
            (settings.username.as_ref(), settings.password.as_ref())
        {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    async fn send(&self, recipient: &str, subject: &str, body: String) -> Result<(), NotifyError> {
        let to: Mailbox = recipient
            .parse()
            .map_err(|_: lettre::address::AddressError| {
                NotifyError::Recipient(recipient.to_string())
            })?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .body(body)
            .map_err(|err| NotifyError::Delivery(err.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|err| NotifyError::Delivery(err.to_string()))?;

        info!(
            target = "civic_reports::notify",
            subject, "notification delivered"
        );
        Ok(())
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn notify_created(&self, email: &str) -> Result<(), NotifyError> {
        self.send(email, CREATED_SUBJECT, CREATED_BODY.to_string())
            .await
    }

    async fn notify_status_changed(
        &self,
        email: &str,
        status_label: &str,
    ) -> Result<(), NotifyError> {
        self.send(email, STATUS_SUBJECT, status_body(status_label))
            .await
    }
}
