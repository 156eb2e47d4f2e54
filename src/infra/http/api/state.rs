use std::sync::Arc;

use crate::application::ingest::IngestionCoordinator;
use crate::application::reports::ReportService;
use crate::application::repos::HealthRepo;
use crate::infra::assets::ObjectAssetStore;

use super::middleware::ModeratorAuth;

#[derive(Clone)]
pub struct ApiState {
    pub ingest: Arc<IngestionCoordinator>,
    pub reports: Arc<ReportService>,
    pub auth: Arc<ModeratorAuth>,
    pub health: Arc<dyn HealthRepo>,
    /// Set when media lives in a local directory and is served by this process.
    pub media: Option<Arc<ObjectAssetStore>>,
}
