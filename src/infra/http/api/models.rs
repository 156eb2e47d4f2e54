use serde::{Deserialize, Serialize};

use crate::domain::reports::Status;

#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    pub status: Option<String>,
}

impl StatusQuery {
    pub fn statuses(&self) -> Vec<Status> {
        self.status
            .as_deref()
            .map(Status::parse_list)
            .unwrap_or_default()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct FilterQuery {
    pub count: Option<i64>,
    pub sort: Option<i64>,
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RadiusQuery {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    /// Radius in meters.
    pub r: Option<f64>,
    pub status: Option<String>,
}

/// Polygon vertices as `[lat, lon]` pairs.
#[derive(Debug, Deserialize, Serialize)]
pub struct QuadRequest {
    pub quad: Vec<[f64; 2]>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct StatusChangeRequest {
    pub status: i16,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DeletedResponse {
    pub deleted: u64,
}
