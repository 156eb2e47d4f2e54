//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::geo::{Geo, Polygon};
use crate::domain::reports::{Report, Statistic, Status};

pub const DEFAULT_LIST_COUNT: i64 = 20;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("no records matched")]
    Empty,
    #[error("invalid report number {0}")]
    InvalidNumber(i64),
    #[error("invalid report id `{0}`")]
    InvalidId(String),
    #[error("invalid status {0}")]
    InvalidStatus(i16),
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Direction applied to the report number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

impl SortOrder {
    /// `1` sorts ascending, `-1` descending; anything else falls back to
    /// descending.
    pub fn from_token(token: Option<i64>) -> Self {
        match token {
            Some(1) => Self::Ascending,
            _ => Self::Descending,
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

/// Normalised arguments for a capped listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListFilter {
    pub count: i64,
    pub order: SortOrder,
    pub statuses: Vec<Status>,
}

impl ListFilter {
    pub fn new(count: Option<i64>, sort: Option<i64>, statuses: Vec<Status>) -> Self {
        let count = match count {
            Some(value) if value > 0 => value,
            _ => DEFAULT_LIST_COUNT,
        };
        Self {
            count,
            order: SortOrder::from_token(sort),
            statuses,
        }
    }
}

/// Outcome of a full replace: the stored row before and after.
#[derive(Debug, Clone, PartialEq)]
pub struct Replaced {
    pub previous: Report,
    pub current: Report,
}

/// Parses a report id as it arrives from a path or query string.
pub fn parse_report_id(raw: &str) -> Result<Uuid, RepoError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(RepoError::InvalidId(String::new()));
    }
    match Uuid::parse_str(trimmed) {
        Ok(id) if !id.is_nil() => Ok(id),
        _ => Err(RepoError::InvalidId(trimmed.to_string())),
    }
}

pub fn ensure_number(number: i64) -> Result<(), RepoError> {
    if number < 1 {
        return Err(RepoError::InvalidNumber(number));
    }
    Ok(())
}

/// Turns an empty collection into [`RepoError::Empty`].
pub fn non_empty(reports: Vec<Report>) -> Result<Vec<Report>, RepoError> {
    if reports.is_empty() {
        Err(RepoError::Empty)
    } else {
        Ok(reports)
    }
}

#[async_trait]
pub trait ReportsRepo: Send + Sync {
    async fn by_number(&self, number: i64) -> Result<Report, RepoError>;

    async fn by_id(&self, id: &str) -> Result<Report, RepoError>;

    /// All reports with a status in `statuses` (all when empty), highest
    /// number first.
    async fn list(&self, statuses: &[Status]) -> Result<Vec<Report>, RepoError>;

    async fn list_filtered(&self, filter: &ListFilter) -> Result<Vec<Report>, RepoError>;

    /// Reports within `radius_meters` of `center`, nearest first.
    async fn by_radius(
        &self,
        radius_meters: f64,
        center: Geo,
        statuses: &[Status],
    ) -> Result<Vec<Report>, RepoError>;

    async fn by_polygon(
        &self,
        polygon: &Polygon,
        statuses: &[Status],
    ) -> Result<Vec<Report>, RepoError>;

    async fn statistics(&self) -> Result<Statistic, RepoError>;
}

#[async_trait]
pub trait ReportsWriteRepo: Send + Sync {
    /// Stores a fully formed report and returns it with its assigned id.
    async fn insert(&self, report: &Report) -> Result<Report, RepoError>;

    /// Replaces the report with the same number, stamping `updated`.
    async fn replace(&self, report: &Report) -> Result<Replaced, RepoError>;

    async fn set_status(&self, number: i64, status: Status) -> Result<Report, RepoError>;

    async fn delete_by_number(&self, number: i64) -> Result<(), RepoError>;

    async fn delete_rejected(&self) -> Result<u64, RepoError>;
}

#[async_trait]
pub trait SequenceRepo: Send + Sync {
    /// Atomically increments the report counter and returns the new value.
    async fn next_number(&self) -> Result<i64, RepoError>;
}

#[async_trait]
pub trait HealthRepo: Send + Sync {
    /// Succeeds when the backing store answers a trivial query.
    async fn ping(&self) -> Result<(), RepoError>;
}
