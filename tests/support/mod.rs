#![allow(dead_code)]

use std::future::Future;
use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use civic_reports::application::assets::{AssetJanitor, AssetStore, AssetStoreError};
use civic_reports::application::ingest::IngestionCoordinator;
use civic_reports::application::media::{MediaPart, MediaProcessor, MediaSettings};
use civic_reports::application::notify::{NotificationDispatcher, Notifier, NotifyError};
use civic_reports::application::reports::ReportService;
use civic_reports::application::repos::{
    HealthRepo, ListFilter, Replaced, RepoError, ReportsRepo, ReportsWriteRepo, SequenceRepo,
    SortOrder, ensure_number, non_empty, parse_report_id,
};
use civic_reports::domain::geo::{Geo, Polygon, StoredPoint};
use civic_reports::domain::reports::{Contacts, Report, Statistic, Status};
use civic_reports::infra::http::ApiState;
use civic_reports::infra::http::api::middleware::ModeratorAuth;

pub const JWT_SECRET: &str = "integration-secret";
pub const CDN_BASE: &str = "https://cdn.test/reports";

const EARTH_RADIUS_M: f64 = 6_371_008.8;

#[derive(Default)]
pub struct MemoryReports {
    pub rows: Mutex<Vec<Report>>,
    pub insert_failure: Mutex<Option<RepoError>>,
}

impl MemoryReports {
    pub async fn seed(&self, report: Report) {
        self.rows.lock().await.push(report);
    }

    async fn matching(&self, statuses: &[Status]) -> Vec<Report> {
        self.rows
            .lock()
            .await
            .iter()
            .filter(|report| statuses.is_empty() || statuses.contains(&report.status))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ReportsRepo for MemoryReports {
    async fn by_number(&self, number: i64) -> Result<Report, RepoError> {
        ensure_number(number)?;
        self.rows
            .lock()
            .await
            .iter()
            .find(|report| report.number == number)
            .cloned()
            .ok_or(RepoError::NotFound)
    }

    async fn by_id(&self, id: &str) -> Result<Report, RepoError> {
        let id = parse_report_id(id)?;
        self.rows
            .lock()
            .await
            .iter()
            .find(|report| report.id == id)
            .cloned()
            .ok_or(RepoError::NotFound)
    }

    async fn list(&self, statuses: &[Status]) -> Result<Vec<Report>, RepoError> {
        let mut reports = self.matching(statuses).await;
        reports.sort_by(|a, b| b.number.cmp(&a.number));
        non_empty(reports)
    }

    async fn list_filtered(&self, filter: &ListFilter) -> Result<Vec<Report>, RepoError> {
        let mut reports = self.matching(&filter.statuses).await;
        match filter.order {
            SortOrder::Ascending => reports.sort_by_key(|report| report.number),
            SortOrder::Descending => reports.sort_by(|a, b| b.number.cmp(&a.number)),
        }
        reports.truncate(filter.count as usize);
        non_empty(reports)
    }

    async fn by_radius(
        &self,
        radius_meters: f64,
        center: Geo,
        statuses: &[Status],
    ) -> Result<Vec<Report>, RepoError> {
        let mut hits: Vec<(f64, Report)> = self
            .matching(statuses)
            .await
            .into_iter()
            .map(|report| (distance_m(&center, &report.geo), report))
            .filter(|(distance, _)| *distance <= radius_meters)
            .collect();
        hits.sort_by(|(da, a), (db, b)| da.total_cmp(db).then(b.number.cmp(&a.number)));
        non_empty(hits.into_iter().map(|(_, report)| report).collect())
    }

    async fn by_polygon(
        &self,
        polygon: &Polygon,
        statuses: &[Status],
    ) -> Result<Vec<Report>, RepoError> {
        let mut reports: Vec<Report> = self
            .matching(statuses)
            .await
            .into_iter()
            .filter(|report| contains(polygon.ring(), StoredPoint::from(&report.geo)))
            .collect();
        reports.sort_by(|a, b| b.number.cmp(&a.number));
        non_empty(reports)
    }

    async fn statistics(&self) -> Result<Statistic, RepoError> {
        let rows = self.rows.lock().await;
        Ok(Statistic::from_counts(
            rows.iter().map(|report| (report.status, 1)),
        ))
    }
}

#[async_trait]
impl ReportsWriteRepo for MemoryReports {
    async fn insert(&self, report: &Report) -> Result<Report, RepoError> {
        if let Some(err) = self.insert_failure.lock().await.take() {
            return Err(err);
        }
        let mut rows = self.rows.lock().await;
        if rows.iter().any(|row| row.number == report.number) {
            return Err(RepoError::Duplicate {
                constraint: "reports_number_key".into(),
            });
        }
        let mut stored = report.clone();
        if stored.id.is_nil() {
            stored.id = Uuid::new_v4();
        }
        rows.push(stored.clone());
        Ok(stored)
    }

    async fn replace(&self, report: &Report) -> Result<Replaced, RepoError> {
        ensure_number(report.number)?;
        if report.id.is_nil() {
            return Err(RepoError::InvalidId(String::new()));
        }
        let mut rows = self.rows.lock().await;
        let row = rows
            .iter_mut()
            .find(|row| row.number == report.number)
            .ok_or(RepoError::NotFound)?;
        let previous = row.clone();
        let current = Report {
            id: previous.id,
            number: previous.number,
            created: previous.created,
            updated: OffsetDateTime::now_utc(),
            ..report.clone()
        };
        *row = current.clone();
        Ok(Replaced { previous, current })
    }

    async fn set_status(&self, number: i64, status: Status) -> Result<Report, RepoError> {
        if !status.is_known() {
            return Err(RepoError::InvalidStatus(status.get()));
        }
        let mut rows = self.rows.lock().await;
        let row = rows
            .iter_mut()
            .find(|row| row.number == number)
            .ok_or(RepoError::NotFound)?;
        row.status = status;
        row.updated = OffsetDateTime::now_utc();
        Ok(row.clone())
    }

    async fn delete_by_number(&self, number: i64) -> Result<(), RepoError> {
        ensure_number(number)?;
        let mut rows = self.rows.lock().await;
        let before = rows.len();
        rows.retain(|row| row.number != number);
        if rows.len() == before {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn delete_rejected(&self) -> Result<u64, RepoError> {
        let mut rows = self.rows.lock().await;
        let before = rows.len();
        rows.retain(|row| row.status != Status::REJECTED);
        match before - rows.len() {
            0 => Err(RepoError::NotFound),
            removed => Ok(removed as u64),
        }
    }
}

#[derive(Default)]
pub struct MemorySequence {
    value: AtomicI64,
    pub failing: AtomicBool,
}

impl MemorySequence {
    pub fn current(&self) -> i64 {
        self.value.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SequenceRepo for MemorySequence {
    async fn next_number(&self) -> Result<i64, RepoError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RepoError::Persistence("counter unavailable".into()));
        }
        Ok(self.value.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

pub struct StaticHealth(pub bool);

#[async_trait]
impl HealthRepo for StaticHealth {
    async fn ping(&self) -> Result<(), RepoError> {
        if self.0 {
            Ok(())
        } else {
            Err(RepoError::Persistence("connection refused".into()))
        }
    }
}

#[derive(Default)]
pub struct RecordingAssets {
    pub uploaded: Mutex<Vec<String>>,
    pub deleted: Mutex<Vec<String>>,
    uploads: AtomicUsize,
}

impl RecordingAssets {
    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssetStore for RecordingAssets {
    async fn upload(
        &self,
        name: &str,
        _data: Bytes,
        _content_type: &str,
    ) -> Result<String, AssetStoreError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        let url = format!("{CDN_BASE}/{name}");
        self.uploaded.lock().await.push(url.clone());
        Ok(url)
    }

    async fn delete(&self, url: &str) -> Result<(), AssetStoreError> {
        if !url.starts_with(CDN_BASE) {
            return Err(AssetStoreError::ForeignUrl(url.to_string()));
        }
        self.deleted.lock().await.push(url.to_string());
        Ok(())
    }
}

/// Captured notices: `(recipient, None)` for creation, `(recipient, Some(label))`
/// for status changes.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, Option<String>)>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_created(&self, email: &str) -> Result<(), NotifyError> {
        self.sent.lock().await.push((email.to_string(), None));
        Ok(())
    }

    async fn notify_status_changed(
        &self,
        email: &str,
        status_label: &str,
    ) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .await
            .push((email.to_string(), Some(status_label.to_string())));
        Ok(())
    }
}

pub struct Harness {
    pub reports: Arc<MemoryReports>,
    pub sequence: Arc<MemorySequence>,
    pub assets: Arc<RecordingAssets>,
    pub notifier: Arc<RecordingNotifier>,
    pub ingest: Arc<IngestionCoordinator>,
    pub service: Arc<ReportService>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_media_settings(MediaSettings::default())
    }

    pub fn with_media_settings(settings: MediaSettings) -> Self {
        let reports = Arc::new(MemoryReports::default());
        let sequence = Arc::new(MemorySequence::default());
        let assets = Arc::new(RecordingAssets::default());
        let notifier = Arc::new(RecordingNotifier::default());

        let janitor = AssetJanitor::new(assets.clone());
        let media = MediaProcessor::new(assets.clone(), janitor, settings);
        let ingest = IngestionCoordinator::new(
            reports.clone(),
            sequence.clone(),
            media,
            NotificationDispatcher::new(notifier.clone()),
        );
        let service = ReportService::new(reports.clone(), reports.clone());

        Self {
            reports,
            sequence,
            assets,
            notifier,
            ingest: Arc::new(ingest),
            service: Arc::new(service),
        }
    }

    pub fn api_state(&self) -> ApiState {
        self.api_state_with_secret(Some(JWT_SECRET))
    }

    pub fn api_state_with_secret(&self, secret: Option<&str>) -> ApiState {
        ApiState {
            ingest: self.ingest.clone(),
            reports: self.service.clone(),
            auth: Arc::new(ModeratorAuth::new(secret)),
            health: Arc::new(StaticHealth(true)),
            media: None,
        }
    }
}

/// Polls `check` until it holds or two seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

pub fn encode_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([90, 120, 30])));
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, format).expect("encode fixture");
    buf.into_inner()
}

pub fn jpeg_part(name: &str) -> MediaPart {
    MediaPart::new(name, encode_image(32, 24, ImageFormat::Jpeg))
}

pub fn png_part(name: &str) -> MediaPart {
    MediaPart::new(name, encode_image(24, 32, ImageFormat::Png))
}

/// Submission metadata located at `[lat, lon]`.
pub fn metadata(email: Option<&str>, lat: f64, lon: f64) -> String {
    let mut value = serde_json::json!({
        "city": "Omsk",
        "address": "Lenina 5",
        "description": "Open manhole next to the bus stop",
        "geo": { "type": "Point", "coordinates": [lat, lon] },
    });
    if let Some(email) = email {
        value["contacts"] = serde_json::json!({ "email": email });
    }
    value.to_string()
}

/// A stored report for seeding repositories directly.
pub fn report(number: i64, status: Status, lat: f64, lon: f64) -> Report {
    let now = OffsetDateTime::now_utc();
    Report {
        id: Uuid::new_v4(),
        number,
        created: now,
        updated: now,
        city: "Omsk".into(),
        address: format!("Lenina {number}"),
        description: String::new(),
        contacts: Contacts::default(),
        media: vec![format!("{CDN_BASE}/seed-{number}.jpg")],
        geo: Geo::new(lat, lon),
        status,
    }
}

fn distance_m(a: &Geo, b: &Geo) -> f64 {
    let (lat1, lat2) = (a.latitude().to_radians(), b.latitude().to_radians());
    let dlat = lat2 - lat1;
    let dlon = (b.longitude() - a.longitude()).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

fn contains(ring: &[StoredPoint], point: StoredPoint) -> bool {
    let (x, y) = (point.longitude(), point.latitude());
    let mut inside = false;
    for edge in ring.windows(2) {
        let (a, b) = (edge[0], edge[1]);
        let (xa, ya, xb, yb) = (a.longitude(), a.latitude(), b.longitude(), b.latitude());
        if (ya > y) != (yb > y) && x < (xb - xa) * (y - ya) / (yb - ya) + xa {
            inside = !inside;
        }
    }
    inside
}
