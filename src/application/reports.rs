//! Read, delete and statistics operations over stored reports.

use std::{future::Future, sync::Arc, time::Duration};

use tracing::info;

use crate::application::error::AppError;
use crate::application::repos::{ListFilter, RepoError, ReportsRepo, ReportsWriteRepo};
use crate::domain::geo::{Geo, Polygon};
use crate::domain::reports::{Report, Statistic, Status};

pub const DEFAULT_REQUEST_DEADLINE: Duration = Duration::from_secs(10);

/// Runs a store call under `deadline`, tagging any failure with `operation`.
pub async fn within<T>(
    deadline: Duration,
    operation: &'static str,
    call: impl Future<Output = Result<T, RepoError>>,
) -> Result<T, AppError> {
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result.map_err(|err| AppError::repo(operation, err)),
        Err(_) => Err(AppError::repo(operation, RepoError::Timeout)),
    }
}

#[derive(Clone)]
pub struct ReportService {
    reader: Arc<dyn ReportsRepo>,
    writer: Arc<dyn ReportsWriteRepo>,
    deadline: Duration,
}

impl ReportService {
    pub fn new(reader: Arc<dyn ReportsRepo>, writer: Arc<dyn ReportsWriteRepo>) -> Self {
        Self {
            reader,
            writer,
            deadline: DEFAULT_REQUEST_DEADLINE,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub async fn by_number(&self, number: i64) -> Result<Report, AppError> {
        within(self.deadline, "reports.by_number", self.reader.by_number(number)).await
    }

    pub async fn by_id(&self, id: &str) -> Result<Report, AppError> {
        within(self.deadline, "reports.by_id", self.reader.by_id(id)).await
    }

    pub async fn list(&self, statuses: &[Status]) -> Result<Vec<Report>, AppError> {
        within(self.deadline, "reports.list", self.reader.list(statuses)).await
    }

    pub async fn list_filtered(
        &self,
        count: Option<i64>,
        sort: Option<i64>,
        statuses: Vec<Status>,
    ) -> Result<Vec<Report>, AppError> {
        let filter = ListFilter::new(count, sort, statuses);
        within(
            self.deadline,
            "reports.list_filtered",
            self.reader.list_filtered(&filter),
        )
        .await
    }

    pub async fn by_radius(
        &self,
        radius_meters: f64,
        center: Geo,
        statuses: &[Status],
    ) -> Result<Vec<Report>, AppError> {
        if !radius_meters.is_finite() || radius_meters < 0.0 {
            return Err(AppError::invalid_argument(format!(
                "radius must be a non-negative number of meters, got {radius_meters}"
            )));
        }
        center
            .validate()
            .map_err(|err| AppError::invalid_argument(err.to_string()))?;

        within(
            self.deadline,
            "reports.by_radius",
            self.reader.by_radius(radius_meters, center, statuses),
        )
        .await
    }

    pub async fn by_polygon(
        &self,
        vertices: &[[f64; 2]],
        statuses: &[Status],
    ) -> Result<Vec<Report>, AppError> {
        let polygon = Polygon::from_vertices(vertices)?;
        within(
            self.deadline,
            "reports.by_polygon",
            self.reader.by_polygon(&polygon, statuses),
        )
        .await
    }

    pub async fn statistics(&self) -> Result<Statistic, AppError> {
        within(self.deadline, "reports.statistics", self.reader.statistics()).await
    }

    pub async fn delete(&self, number: i64) -> Result<(), AppError> {
        within(
            self.deadline,
            "reports.delete_by_number",
            self.writer.delete_by_number(number),
        )
        .await?;
        info!(target = "civic_reports::reports", number, "report deleted");
        Ok(())
    }

    pub async fn delete_rejected(&self) -> Result<u64, AppError> {
        let deleted = within(
            self.deadline,
            "reports.delete_rejected",
            self.writer.delete_rejected(),
        )
        .await?;
        info!(
            target = "civic_reports::reports",
            deleted, "rejected reports deleted"
        );
        Ok(deleted)
    }
}
