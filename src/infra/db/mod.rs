//! Postgres/PostGIS-backed repository implementations.

mod reports;
mod sequence;
mod util;

pub use util::map_sqlx_error;

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{
    postgres::{PgPool, PgPoolOptions},
    query,
};
use thiserror::Error;
use tracing::info;

use crate::application::repos::{HealthRepo, RepoError};

pub const DEFAULT_REPORTS_TABLE: &str = "reports";
pub const DEFAULT_COUNTERS_TABLE: &str = "counters";
pub const DEFAULT_COUNTER_NAME: &str = "reports";

const MAX_IDENTIFIER_LEN: usize = 63;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("`{0}` is not a valid table name")]
pub struct InvalidIdentifier(pub String);

/// Where reports and the number counter live.
///
/// Table names are interpolated into SQL, so they are restricted to plain
/// unquoted identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLayout {
    reports_table: String,
    counters_table: String,
    counter_name: String,
}

impl StoreLayout {
    pub fn new(
        reports_table: impl Into<String>,
        counters_table: impl Into<String>,
        counter_name: impl Into<String>,
    ) -> Result<Self, InvalidIdentifier> {
        let reports_table = checked_identifier(reports_table.into())?;
        let counters_table = checked_identifier(counters_table.into())?;
        Ok(Self {
            reports_table,
            counters_table,
            counter_name: counter_name.into(),
        })
    }

    pub fn reports_table(&self) -> &str {
        &self.reports_table
    }

    pub fn counters_table(&self) -> &str {
        &self.counters_table
    }

    pub fn counter_name(&self) -> &str {
        &self.counter_name
    }
}

impl Default for StoreLayout {
    fn default() -> Self {
        Self {
            reports_table: DEFAULT_REPORTS_TABLE.to_string(),
            counters_table: DEFAULT_COUNTERS_TABLE.to_string(),
            counter_name: DEFAULT_COUNTER_NAME.to_string(),
        }
    }
}

fn checked_identifier(name: String) -> Result<String, InvalidIdentifier> {
    let mut chars = name.chars();
    let valid_head = chars
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_');
    let valid_tail = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid_head && valid_tail && name.len() <= MAX_IDENTIFIER_LEN {
        Ok(name)
    } else {
        Err(InvalidIdentifier(name))
    }
}

#[derive(Clone)]
pub struct PostgresRepositories {
    pool: Arc<PgPool>,
    layout: Arc<StoreLayout>,
}

impl PostgresRepositories {
    pub fn new(pool: PgPool, layout: StoreLayout) -> Self {
        Self {
            pool: Arc::new(pool),
            layout: Arc::new(layout),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }

    /// Creates the PostGIS extension, tables and indexes when missing.
    pub async fn ensure_schema(&self) -> Result<(), sqlx::Error> {
        let reports = self.layout.reports_table();
        let counters = self.layout.counters_table();

        let statements = [
            "CREATE EXTENSION IF NOT EXISTS postgis".to_string(),
            format!(
                "CREATE TABLE IF NOT EXISTS {reports} (
                    id uuid PRIMARY KEY,
                    number bigint NOT NULL,
                    created timestamptz NOT NULL,
                    updated timestamptz NOT NULL,
                    city text NOT NULL,
                    address text NOT NULL,
                    description text NOT NULL DEFAULT '',
                    email text,
                    whatsapp text,
                    telegram text,
                    phone text,
                    media text[] NOT NULL DEFAULT '{{}}',
                    geo geography(Point, 4326) NOT NULL,
                    status smallint NOT NULL
                )"
            ),
            format!("CREATE UNIQUE INDEX IF NOT EXISTS {reports}_number_key ON {reports} (number)"),
            format!("CREATE INDEX IF NOT EXISTS {reports}_geo_idx ON {reports} USING GIST (geo)"),
            format!("CREATE INDEX IF NOT EXISTS {reports}_status_idx ON {reports} (status)"),
            format!(
                "CREATE TABLE IF NOT EXISTS {counters} (
                    name text PRIMARY KEY,
                    value bigint NOT NULL
                )"
            ),
        ];

        for statement in &statements {
            query(statement).execute(self.pool()).await?;
        }

        info!(
            target = "civic_reports::db",
            reports, counters, "schema ensured"
        );
        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        query("SELECT 1").execute(self.pool()).await.map(|_| ())
    }
}

#[async_trait]
impl HealthRepo for PostgresRepositories {
    async fn ping(&self) -> Result<(), RepoError> {
        self.health_check().await.map_err(map_sqlx_error)
    }
}
