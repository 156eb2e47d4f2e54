//! Report handlers

use axum::Json;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::info;

use crate::application::ingest::Submission;
use crate::application::media::MediaPart;
use crate::domain::geo::Geo;
use crate::domain::reports::{Report, Status};

use super::parse_number;
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::middleware::Moderator;
use crate::infra::http::api::models::{
    DeletedResponse, FilterQuery, QuadRequest, RadiusQuery, StatusChangeRequest, StatusQuery,
};
use crate::infra::http::api::state::ApiState;

/// Multipart field carrying the report metadata.
pub const METADATA_FIELD: &str = "json";

pub async fn create_report(
    State(state): State<ApiState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut submission = Submission::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::bad_request("invalid multipart payload", Some(err.to_string())))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match field.file_name().map(str::to_string) {
            Some(filename) => {
                let data = field.bytes().await.map_err(|err| {
                    ApiError::bad_request("failed to read upload", Some(err.to_string()))
                })?;
                submission.files.push(MediaPart::new(filename, data));
            }
            None if name == METADATA_FIELD => {
                let text = field.text().await.map_err(|err| {
                    ApiError::bad_request("failed to read metadata", Some(err.to_string()))
                })?;
                submission.metadata = Some(text);
            }
            None => {}
        }
    }

    let report = state.ingest.create(submission).await?;
    Ok((StatusCode::CREATED, Json(report)))
}

pub async fn list_reports(
    State(state): State<ApiState>,
    Query(query): Query<StatusQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let reports = state.reports.list(&query.statuses()).await?;
    Ok(Json(reports))
}

pub async fn filter_reports(
    State(state): State<ApiState>,
    Query(query): Query<FilterQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let statuses = query
        .status
        .as_deref()
        .map(Status::parse_list)
        .unwrap_or_default();
    let reports = state
        .reports
        .list_filtered(query.count, query.sort, statuses)
        .await?;
    Ok(Json(reports))
}

pub async fn get_report(
    State(state): State<ApiState>,
    Path(number): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let number = parse_number(&number)?;
    let report = state.reports.by_number(number).await?;
    Ok(Json(report))
}

pub async fn get_report_by_id(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state.reports.by_id(&id).await?;
    Ok(Json(report))
}

pub async fn reports_in_radius(
    State(state): State<ApiState>,
    Query(query): Query<RadiusQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (Some(lat), Some(lon), Some(radius)) = (query.lat, query.lon, query.r) else {
        return Err(ApiError::invalid_argument(
            "lat, lon and r query parameters are required",
        ));
    };
    let statuses = query
        .status
        .as_deref()
        .map(Status::parse_list)
        .unwrap_or_default();

    let reports = state
        .reports
        .by_radius(radius, Geo::new(lat, lon), &statuses)
        .await?;
    Ok(Json(reports))
}

pub async fn reports_in_polygon(
    State(state): State<ApiState>,
    Query(query): Query<StatusQuery>,
    Json(payload): Json<QuadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let reports = state
        .reports
        .by_polygon(&payload.quad, &query.statuses())
        .await?;
    Ok(Json(reports))
}

pub async fn update_report(
    State(state): State<ApiState>,
    moderator: Moderator,
    Json(report): Json<Report>,
) -> Result<impl IntoResponse, ApiError> {
    let number = report.number;
    let report = state.ingest.update(report).await?;
    info!(
        target = "civic_reports::http::moderation",
        number,
        moderator = moderator.subject.as_deref().unwrap_or(""),
        "report replaced"
    );
    Ok(Json(report))
}

pub async fn change_report_status(
    State(state): State<ApiState>,
    moderator: Moderator,
    Path(number): Path<String>,
    Json(payload): Json<StatusChangeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let number = parse_number(&number)?;
    let report = state
        .ingest
        .change_status(number, Status::from_raw(payload.status))
        .await?;
    info!(
        target = "civic_reports::http::moderation",
        number,
        status = payload.status,
        moderator = moderator.subject.as_deref().unwrap_or(""),
        "report status changed"
    );
    Ok(Json(report))
}

pub async fn delete_report(
    State(state): State<ApiState>,
    moderator: Moderator,
    Path(number): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let number = parse_number(&number)?;
    state.reports.delete(number).await?;
    info!(
        target = "civic_reports::http::moderation",
        number,
        moderator = moderator.subject.as_deref().unwrap_or(""),
        "report deleted"
    );
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_rejected_reports(
    State(state): State<ApiState>,
    _moderator: Moderator,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state.reports.delete_rejected().await?;
    Ok(Json(DeletedResponse { deleted }))
}

pub async fn report_statistics(
    State(state): State<ApiState>,
    _moderator: Moderator,
) -> Result<impl IntoResponse, ApiError> {
    let statistic = state.reports.statistics().await?;
    Ok(Json(statistic))
}
