//! Geographic point codec.
//!
//! Cart items may carry a location. Postgres keeps it in a PostGIS `geometry(Point, 4326)`
//! column, SQLite keeps the same point as WKT text. Either way it leaves the store as a
//! plain latitude/longitude pair.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeoPointError {
    #[error("latitude {0} is outside [-90, 90]")]
    LatitudeOutOfRange(f64),
    #[error("longitude {0} is outside [-180, 180]")]
    LongitudeOutOfRange(f64),
    #[error("location needs both latitude and longitude")]
    HalfSpecified,
    #[error("malformed point: {0}")]
    Malformed(String),
}

/// WGS84 point. Note WKT and PostGIS order coordinates as (lng, lat).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Result<Self, GeoPointError> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(GeoPointError::LatitudeOutOfRange(lat));
        }
        if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
            return Err(GeoPointError::LongitudeOutOfRange(lng));
        }
        Ok(Self { lat, lng })
    }

    /// Build from a pair where each side may be missing. Both absent is "no location".
    pub fn from_parts(lat: Option<f64>, lng: Option<f64>) -> Result<Option<Self>, GeoPointError> {
        match (lat, lng) {
            (Some(lat), Some(lng)) => Self::new(lat, lng).map(Some),
            (None, None) => Ok(None),
            _ => Err(GeoPointError::HalfSpecified),
        }
    }

    pub fn to_wkt(&self) -> String {
        format!("POINT({} {})", self.lng, self.lat)
    }

    pub fn from_wkt(s: &str) -> Result<Self, GeoPointError> {
        let malformed = || GeoPointError::Malformed(s.to_string());

        let inner = s
            .trim()
            .strip_prefix("POINT")
            .map(str::trim_start)
            .and_then(|rest| rest.strip_prefix('('))
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(malformed)?;

        let mut coords = inner.split_whitespace();
        let lng: f64 = coords
            .next()
            .and_then(|v| v.parse().ok())
            .ok_or_else(malformed)?;
        let lat: f64 = coords
            .next()
            .and_then(|v| v.parse().ok())
            .ok_or_else(malformed)?;
        if coords.next().is_some() {
            return Err(malformed());
        }

        Self::new(lat, lng)
    }
}

/// Requested change to an item's location.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LocationPatch {
    Set(GeoPoint),
    Clear,
}

impl LocationPatch {
    /// Interpret the lat/lng fields of a partial update.
    ///
    /// Outer `None` means the field was not sent; `Some(None)` is an explicit null.
    /// A complete pair sets, a double null clears, anything lopsided is rejected.
    pub fn from_fields(
        lat: Option<Option<f64>>,
        lng: Option<Option<f64>>,
    ) -> Result<Option<Self>, GeoPointError> {
        match (lat, lng) {
            (None, None) => Ok(None),
            (Some(None), Some(None)) => Ok(Some(LocationPatch::Clear)),
            (Some(Some(lat)), Some(Some(lng))) => {
                GeoPoint::new(lat, lng).map(|p| Some(LocationPatch::Set(p)))
            }
            _ => Err(GeoPointError::HalfSpecified),
        }
    }
}
