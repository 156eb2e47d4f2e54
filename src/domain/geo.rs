//! Geographic points and polygons.
//!
//! Clients speak `[latitude, longitude]`. Storage and spatial predicates speak
//! `[longitude, latitude]`. [`StoredPoint`] is the only place where the pair is
//! reordered: `From<&Geo>` on the way in, `From<StoredPoint>` on the way out.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use super::error::DomainError;

pub const MIN_POLYGON_VERTICES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GeoKind {
    #[default]
    Point,
}

/// A location as exchanged with clients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geo {
    #[serde(rename = "type", default)]
    pub kind: GeoKind,
    /// `[latitude, longitude]`
    pub coordinates: [f64; 2],
}

impl Geo {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            kind: GeoKind::Point,
            coordinates: [latitude, longitude],
        }
    }

    pub fn latitude(&self) -> f64 {
        self.coordinates[0]
    }

    pub fn longitude(&self) -> f64 {
        self.coordinates[1]
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        check_coordinates(self.latitude(), self.longitude())
            .map_err(|reason| DomainError::validation(format!("geo.coordinates {reason}")))
    }
}

/// A location in storage order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoredPoint {
    /// `[longitude, latitude]`
    pub coordinates: [f64; 2],
}

impl StoredPoint {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            coordinates: [longitude, latitude],
        }
    }

    pub fn longitude(&self) -> f64 {
        self.coordinates[0]
    }

    pub fn latitude(&self) -> f64 {
        self.coordinates[1]
    }
}

impl From<&Geo> for StoredPoint {
    fn from(geo: &Geo) -> Self {
        let [latitude, longitude] = geo.coordinates;
        Self::new(longitude, latitude)
    }
}

impl From<Geo> for StoredPoint {
    fn from(geo: Geo) -> Self {
        Self::from(&geo)
    }
}

impl From<StoredPoint> for Geo {
    fn from(point: StoredPoint) -> Self {
        let [longitude, latitude] = point.coordinates;
        Geo::new(latitude, longitude)
    }
}

/// A closed ring of stored points.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    ring: Vec<StoredPoint>,
}

impl Polygon {
    /// Builds a polygon from client `[latitude, longitude]` vertices, appending
    /// the first vertex when the ring is left open.
    pub fn from_vertices(vertices: &[[f64; 2]]) -> Result<Self, DomainError> {
        if vertices.len() < MIN_POLYGON_VERTICES {
            return Err(DomainError::invalid_argument(format!(
                "polygon needs at least {MIN_POLYGON_VERTICES} vertices, got {}",
                vertices.len()
            )));
        }

        let mut ring = Vec::with_capacity(vertices.len() + 1);
        for (index, &[latitude, longitude]) in vertices.iter().enumerate() {
            check_coordinates(latitude, longitude).map_err(|reason| {
                DomainError::invalid_argument(format!("polygon vertex {index} {reason}"))
            })?;
            ring.push(StoredPoint::from(Geo::new(latitude, longitude)));
        }

        if ring.first() != ring.last() {
            ring.push(ring[0]);
        }
        if ring.len() <= MIN_POLYGON_VERTICES {
            return Err(DomainError::invalid_argument(
                "closed polygon needs at least three distinct vertices",
            ));
        }

        Ok(Self { ring })
    }

    pub fn ring(&self) -> &[StoredPoint] {
        &self.ring
    }

    /// Well-known text in `lon lat` order, ready for `ST_GeogFromText`.
    pub fn to_wkt(&self) -> String {
        let mut wkt = String::from("POLYGON((");
        for (index, point) in self.ring.iter().enumerate() {
            if index > 0 {
                wkt.push_str(", ");
            }
            let _ = write!(wkt, "{} {}", point.longitude(), point.latitude());
        }
        wkt.push_str("))");
        wkt
    }
}

fn check_coordinates(latitude: f64, longitude: f64) -> Result<(), String> {
    if !latitude.is_finite() || !longitude.is_finite() {
        return Err("must be finite numbers".to_string());
    }
    if !(-90.0..=90.0).contains(&latitude) {
        return Err(format!("latitude {latitude} is outside [-90, 90]"));
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(format!("longitude {longitude} is outside [-180, 180]"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_point_swaps_once_each_way() {
        let geo = Geo::new(55.75, 37.62);
        let stored = StoredPoint::from(&geo);
        assert_eq!(stored.coordinates, [37.62, 55.75]);
        assert_eq!(Geo::from(stored), geo);
    }

    #[test]
    fn round_trip_is_identity_across_the_globe() {
        for &(lat, lon) in &[
            (0.0, 0.0),
            (-90.0, 180.0),
            (90.0, -180.0),
            (-33.8688, 151.2093),
            (64.1466, -21.9426),
        ] {
            let geo = Geo::new(lat, lon);
            let back = Geo::from(StoredPoint::from(geo));
            assert_eq!(back.coordinates, [lat, lon]);
            assert_eq!(back.kind, GeoKind::Point);
        }
    }

    #[test]
    fn wire_format_uses_point_type_and_lat_lon_order() {
        let json = serde_json::to_value(Geo::new(10.5, 20.25)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "Point", "coordinates": [10.5, 20.25]})
        );

        let parsed: Geo = serde_json::from_str(r#"{"coordinates":[1.0,2.0]}"#).unwrap();
        assert_eq!(parsed.kind, GeoKind::Point);
        assert!(serde_json::from_str::<Geo>(r#"{"type":"Polygon","coordinates":[1.0,2.0]}"#).is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_and_non_finite() {
        assert!(Geo::new(45.0, 45.0).validate().is_ok());
        assert!(Geo::new(91.0, 0.0).validate().is_err());
        assert!(Geo::new(0.0, -180.5).validate().is_err());
        assert!(Geo::new(f64::NAN, 0.0).validate().is_err());
        assert!(Geo::new(0.0, f64::INFINITY).validate().is_err());
    }

    #[test]
    fn open_and_closed_rings_produce_identical_polygons() {
        let open = [[0.0, 0.0], [0.0, 1.0], [1.0, 1.0], [1.0, 0.0]];
        let closed = [[0.0, 0.0], [0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]];

        let from_open = Polygon::from_vertices(&open).unwrap();
        let from_closed = Polygon::from_vertices(&closed).unwrap();

        assert_eq!(from_open, from_closed);
        assert_eq!(from_open.ring().len(), 5);
        assert_eq!(from_open.to_wkt(), from_closed.to_wkt());
    }

    #[test]
    fn polygon_wkt_is_in_lon_lat_order() {
        let polygon = Polygon::from_vertices(&[[10.0, 20.0], [11.0, 20.0], [11.0, 21.0]]).unwrap();
        assert_eq!(polygon.to_wkt(), "POLYGON((20 10, 20 11, 21 11, 20 10))");
    }

    #[test]
    fn polygon_requires_three_vertices() {
        let err = Polygon::from_vertices(&[[0.0, 0.0], [1.0, 1.0]]).unwrap_err();
        assert!(matches!(err, DomainError::InvalidArgument { .. }));
        assert!(Polygon::from_vertices(&[]).is_err());
    }

    #[test]
    fn polygon_rejects_invalid_vertex() {
        let err = Polygon::from_vertices(&[[0.0, 0.0], [100.0, 1.0], [1.0, 1.0]]).unwrap_err();
        assert!(err.to_string().contains("vertex 1"));
    }
}
