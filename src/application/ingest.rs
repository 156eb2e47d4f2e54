//! Submission, replacement and status change of reports.
//!
//! A new report moves through metadata validation, media processing, number
//! allocation and persistence. Once media has been stored, any later failure
//! hands the uploaded URLs to the asset janitor before the error is returned.

use std::{sync::Arc, time::Duration};

use metrics::counter;
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::application::error::AppError;
use crate::application::media::{MediaPart, MediaProcessor};
use crate::application::notify::{Notice, NotificationDispatcher};
use crate::application::reports::{DEFAULT_REQUEST_DEADLINE, within};
use crate::application::repos::{RepoError, ReportsWriteRepo, SequenceRepo};
use crate::domain::reports::{Report, ReportDraft, Status, check_attachment_count};

/// A new report as handed over by the transport layer.
#[derive(Debug, Clone, Default)]
pub struct Submission {
    /// Raw JSON describing the report.
    pub metadata: Option<String>,
    pub files: Vec<MediaPart>,
}

#[derive(Clone)]
pub struct IngestionCoordinator {
    reports: Arc<dyn ReportsWriteRepo>,
    sequence: Arc<dyn SequenceRepo>,
    media: MediaProcessor,
    notifications: NotificationDispatcher,
    deadline: Duration,
}

impl IngestionCoordinator {
    pub fn new(
        reports: Arc<dyn ReportsWriteRepo>,
        sequence: Arc<dyn SequenceRepo>,
        media: MediaProcessor,
        notifications: NotificationDispatcher,
    ) -> Self {
        Self {
            reports,
            sequence,
            media,
            notifications,
            deadline: DEFAULT_REQUEST_DEADLINE,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub async fn create(&self, submission: Submission) -> Result<Report, AppError> {
        let Submission { metadata, files } = submission;

        let draft = decode_draft(metadata.as_deref())?;
        let geo = draft.validate()?;
        check_attachment_count(files.len())?;
        debug!(
            target = "civic_reports::ingest",
            files = files.len(),
            "metadata validated"
        );

        let media = self.media.process(files).await?;

        let number = match within(
            self.deadline,
            "sequence.next_number",
            self.sequence.next_number(),
        )
        .await
        {
            Ok(number) => number,
            Err(err) => {
                self.media
                    .janitor()
                    .dispatch("number allocation failed", media);
                return Err(err);
            }
        };

        let report = draft.into_report(geo, number, media.clone(), OffsetDateTime::now_utc());
        let stored = match within(self.deadline, "reports.insert", self.reports.insert(&report)).await
        {
            Ok(stored) => stored,
            Err(err) => {
                self.media.janitor().dispatch("insert failed", media);
                return Err(err);
            }
        };

        counter!("civic_reports_created_total").increment(1);
        info!(
            target = "civic_reports::ingest",
            number = stored.number,
            id = %stored.id,
            media = stored.media.len(),
            "report created"
        );

        if let Some(email) = stored.contacts.email() {
            self.notifications.dispatch(email, Notice::Created);
        }
        Ok(stored)
    }

    /// Replaces a report wholesale. The incoming status is persisted as given;
    /// only [`IngestionCoordinator::change_status`] range-checks it.
    pub async fn update(&self, report: Report) -> Result<Report, AppError> {
        report.validate_replacement()?;

        let replaced = within(self.deadline, "reports.replace", self.reports.replace(&report)).await?;
        let (previous, current) = (replaced.previous, replaced.current);

        let orphaned = previous.orphaned_media(&current);
        if !orphaned.is_empty() {
            debug!(
                target = "civic_reports::ingest",
                number = current.number,
                removed = orphaned.len(),
                "scheduling removal of detached media"
            );
            self.media
                .janitor()
                .dispatch("media detached by update", orphaned);
        }

        if previous.status != current.status {
            self.notify_status(&current);
        }

        info!(
            target = "civic_reports::ingest",
            number = current.number,
            status = %current.status,
            "report replaced"
        );
        Ok(current)
    }

    pub async fn change_status(&self, number: i64, status: Status) -> Result<Report, AppError> {
        if !status.is_known() {
            return Err(AppError::repo(
                "reports.set_status",
                RepoError::InvalidStatus(status.get()),
            ));
        }

        let report = within(
            self.deadline,
            "reports.set_status",
            self.reports.set_status(number, status),
        )
        .await?;

        info!(
            target = "civic_reports::ingest",
            number,
            status = %report.status,
            "report status changed"
        );
        self.notify_status(&report);
        Ok(report)
    }

    fn notify_status(&self, report: &Report) {
        if let Some(email) = report.contacts.email() {
            self.notifications.dispatch(
                email,
                Notice::StatusChanged {
                    label: report.status.to_string(),
                },
            );
        }
    }
}

fn decode_draft(metadata: Option<&str>) -> Result<ReportDraft, AppError> {
    let raw = metadata
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .ok_or_else(|| AppError::validation("report metadata is missing"))?;
    serde_json::from_str(raw)
        .map_err(|err| AppError::validation(format!("report metadata is not valid JSON: {err}")))
}
