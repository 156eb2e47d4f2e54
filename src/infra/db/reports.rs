use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{
        ListFilter, RepoError, Replaced, ReportsRepo, ReportsWriteRepo, ensure_number, non_empty,
        parse_report_id,
    },
    domain::{
        geo::{Geo, Polygon, StoredPoint},
        reports::{Contacts, Report, Statistic, Status},
    },
};

use super::{PostgresRepositories, map_sqlx_error};

const REPORT_COLUMNS: &str = "id, number, created, updated, city, address, description, \
    email, whatsapp, telegram, phone, media, \
    ST_X(geo::geometry) AS longitude, ST_Y(geo::geometry) AS latitude, status";

#[derive(sqlx::FromRow)]
struct ReportRow {
    id: Uuid,
    number: i64,
    created: OffsetDateTime,
    updated: OffsetDateTime,
    city: String,
    address: String,
    description: String,
    email: Option<String>,
    whatsapp: Option<String>,
    telegram: Option<String>,
    phone: Option<String>,
    media: Vec<String>,
    longitude: f64,
    latitude: f64,
    status: i16,
}

impl From<ReportRow> for Report {
    fn from(row: ReportRow) -> Self {
        Self {
            id: row.id,
            number: row.number,
            created: row.created,
            updated: row.updated,
            city: row.city,
            address: row.address,
            description: row.description,
            contacts: Contacts {
                email: row.email,
                whatsapp: row.whatsapp,
                telegram: row.telegram,
                phone: row.phone,
            },
            media: row.media,
            geo: Geo::from(StoredPoint::new(row.longitude, row.latitude)),
            status: Status::from_raw(row.status),
        }
    }
}

#[derive(sqlx::FromRow)]
struct StatusCountRow {
    status: i16,
    count: i64,
}

impl PostgresRepositories {
    fn select_reports(&self) -> QueryBuilder<'static, Postgres> {
        let mut qb = QueryBuilder::new("SELECT ");
        qb.push(REPORT_COLUMNS);
        qb.push(" FROM ");
        qb.push(self.layout().reports_table());
        qb.push(" WHERE TRUE");
        qb
    }

    fn push_point(qb: &mut QueryBuilder<'_, Postgres>, point: StoredPoint) {
        qb.push("ST_SetSRID(ST_MakePoint(");
        qb.push_bind(point.longitude());
        qb.push(", ");
        qb.push_bind(point.latitude());
        qb.push("), 4326)::geography");
    }

    fn push_status_filter(qb: &mut QueryBuilder<'_, Postgres>, statuses: &[Status]) {
        if statuses.is_empty() {
            return;
        }
        let raw: Vec<i16> = statuses.iter().map(|status| status.get()).collect();
        qb.push(" AND status = ANY(");
        qb.push_bind(raw);
        qb.push(")");
    }

    async fn fetch_reports(
        &self,
        mut qb: QueryBuilder<'_, Postgres>,
    ) -> Result<Vec<Report>, RepoError> {
        let rows = qb
            .build_query_as::<ReportRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        non_empty(rows.into_iter().map(Report::from).collect())
    }

    async fn fetch_report(&self, mut qb: QueryBuilder<'_, Postgres>) -> Result<Report, RepoError> {
        qb.build_query_as::<ReportRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .map(Report::from)
            .ok_or(RepoError::NotFound)
    }
}

/// Postgres keeps microseconds; stamps are truncated so the returned value
/// matches what a later read yields.
fn stamp_now() -> Result<OffsetDateTime, RepoError> {
    let now = OffsetDateTime::now_utc();
    now.replace_microsecond(now.microsecond())
        .map_err(RepoError::from_persistence)
}

#[async_trait]
impl ReportsRepo for PostgresRepositories {
    async fn by_number(&self, number: i64) -> Result<Report, RepoError> {
        ensure_number(number)?;
        let mut qb = self.select_reports();
        qb.push(" AND number = ");
        qb.push_bind(number);
        self.fetch_report(qb).await
    }

    async fn by_id(&self, id: &str) -> Result<Report, RepoError> {
        let id = parse_report_id(id)?;
        let mut qb = self.select_reports();
        qb.push(" AND id = ");
        qb.push_bind(id);
        self.fetch_report(qb).await
    }

    async fn list(&self, statuses: &[Status]) -> Result<Vec<Report>, RepoError> {
        let mut qb = self.select_reports();
        Self::push_status_filter(&mut qb, statuses);
        qb.push(" ORDER BY number DESC");
        self.fetch_reports(qb).await
    }

    async fn list_filtered(&self, filter: &ListFilter) -> Result<Vec<Report>, RepoError> {
        let mut qb = self.select_reports();
        Self::push_status_filter(&mut qb, &filter.statuses);
        qb.push(" ORDER BY number ");
        qb.push(filter.order.as_sql());
        qb.push(" LIMIT ");
        qb.push_bind(filter.count);
        self.fetch_reports(qb).await
    }

    async fn by_radius(
        &self,
        radius_meters: f64,
        center: Geo,
        statuses: &[Status],
    ) -> Result<Vec<Report>, RepoError> {
        let point = StoredPoint::from(center);
        let mut qb = self.select_reports();
        qb.push(" AND ST_DWithin(geo, ");
        Self::push_point(&mut qb, point);
        qb.push(", ");
        qb.push_bind(radius_meters);
        qb.push(")");
        Self::push_status_filter(&mut qb, statuses);
        qb.push(" ORDER BY ST_Distance(geo, ");
        Self::push_point(&mut qb, point);
        qb.push("), number DESC");
        self.fetch_reports(qb).await
    }

    async fn by_polygon(
        &self,
        polygon: &Polygon,
        statuses: &[Status],
    ) -> Result<Vec<Report>, RepoError> {
        let mut qb = self.select_reports();
        qb.push(" AND ST_Covers(ST_GeogFromText(");
        qb.push_bind(format!("SRID=4326;{}", polygon.to_wkt()));
        qb.push("), geo)");
        Self::push_status_filter(&mut qb, statuses);
        qb.push(" ORDER BY number DESC");
        self.fetch_reports(qb).await
    }

    async fn statistics(&self) -> Result<Statistic, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT status, COUNT(*) AS count FROM ");
        qb.push(self.layout().reports_table());
        qb.push(" GROUP BY status");

        let rows = qb
            .build_query_as::<StatusCountRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let counts = rows
            .into_iter()
            .map(|row| {
                let count = u64::try_from(row.count)
                    .map_err(|_| RepoError::from_persistence("count exceeds supported range"))?;
                Ok((Status::from_raw(row.status), count))
            })
            .collect::<Result<Vec<_>, RepoError>>()?;

        Ok(Statistic::from_counts(counts))
    }
}

#[async_trait]
impl ReportsWriteRepo for PostgresRepositories {
    async fn insert(&self, report: &Report) -> Result<Report, RepoError> {
        ensure_number(report.number)?;
        let id = if report.id.is_nil() {
            Uuid::new_v4()
        } else {
            report.id
        };

        let mut qb = QueryBuilder::<Postgres>::new("INSERT INTO ");
        qb.push(self.layout().reports_table());
        qb.push(
            " (id, number, created, updated, city, address, description, \
             email, whatsapp, telegram, phone, media, geo, status) VALUES (",
        );
        {
            let mut values = qb.separated(", ");
            values.push_bind(id);
            values.push_bind(report.number);
            values.push_bind(report.created);
            values.push_bind(report.updated);
            values.push_bind(report.city.clone());
            values.push_bind(report.address.clone());
            values.push_bind(report.description.clone());
            values.push_bind(report.contacts.email.clone());
            values.push_bind(report.contacts.whatsapp.clone());
            values.push_bind(report.contacts.telegram.clone());
            values.push_bind(report.contacts.phone.clone());
            values.push_bind(report.media.clone());
        }
        qb.push(", ");
        Self::push_point(&mut qb, StoredPoint::from(&report.geo));
        qb.push(", ");
        qb.push_bind(report.status.get());
        qb.push(") RETURNING ");
        qb.push(REPORT_COLUMNS);

        self.fetch_report(qb).await
    }

    async fn replace(&self, report: &Report) -> Result<Replaced, RepoError> {
        ensure_number(report.number)?;
        if report.id.is_nil() {
            return Err(RepoError::InvalidId(report.id.to_string()));
        }

        let table = self.layout().reports_table();
        let updated = stamp_now()?;

        let mut qb = QueryBuilder::<Postgres>::new("WITH previous AS (SELECT ");
        qb.push(REPORT_COLUMNS);
        qb.push(" FROM ");
        qb.push(table);
        qb.push(" WHERE number = ");
        qb.push_bind(report.number);
        qb.push(" FOR UPDATE) UPDATE ");
        qb.push(table);
        qb.push(" AS r SET updated = ");
        qb.push_bind(updated);
        qb.push(", city = ");
        qb.push_bind(report.city.clone());
        qb.push(", address = ");
        qb.push_bind(report.address.clone());
        qb.push(", description = ");
        qb.push_bind(report.description.clone());
        qb.push(", email = ");
        qb.push_bind(report.contacts.email.clone());
        qb.push(", whatsapp = ");
        qb.push_bind(report.contacts.whatsapp.clone());
        qb.push(", telegram = ");
        qb.push_bind(report.contacts.telegram.clone());
        qb.push(", phone = ");
        qb.push_bind(report.contacts.phone.clone());
        qb.push(", media = ");
        qb.push_bind(report.media.clone());
        qb.push(", geo = ");
        Self::push_point(&mut qb, StoredPoint::from(&report.geo));
        qb.push(", status = ");
        qb.push_bind(report.status.get());
        qb.push(" FROM previous WHERE r.id = previous.id RETURNING previous.*");

        let previous = self.fetch_report(qb).await?;
        let current = Report {
            id: previous.id,
            number: previous.number,
            created: previous.created,
            updated,
            ..report.clone()
        };
        Ok(Replaced { previous, current })
    }

    async fn set_status(&self, number: i64, status: Status) -> Result<Report, RepoError> {
        ensure_number(number)?;
        if !status.is_known() {
            return Err(RepoError::InvalidStatus(status.get()));
        }

        let mut qb = QueryBuilder::<Postgres>::new("UPDATE ");
        qb.push(self.layout().reports_table());
        qb.push(" SET status = ");
        qb.push_bind(status.get());
        qb.push(", updated = ");
        qb.push_bind(stamp_now()?);
        qb.push(" WHERE number = ");
        qb.push_bind(number);
        qb.push(" RETURNING ");
        qb.push(REPORT_COLUMNS);

        self.fetch_report(qb).await
    }

    async fn delete_by_number(&self, number: i64) -> Result<(), RepoError> {
        ensure_number(number)?;
        let mut qb = QueryBuilder::<Postgres>::new("DELETE FROM ");
        qb.push(self.layout().reports_table());
        qb.push(" WHERE number = ");
        qb.push_bind(number);

        let result = qb
            .build()
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn delete_rejected(&self) -> Result<u64, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new("DELETE FROM ");
        qb.push(self.layout().reports_table());
        qb.push(" WHERE status = ");
        qb.push_bind(Status::REJECTED.get());

        let result = qb
            .build()
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        match result.rows_affected() {
            0 => Err(RepoError::NotFound),
            deleted => Ok(deleted),
        }
    }
}
