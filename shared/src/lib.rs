use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `[min_lon, min_lat, max_lon, max_lat]`, the GeoJSON bbox order.
pub type Bbox = [f64; 4];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub bbox: Bbox,
}

impl GeoPoint {
    /// Coordinate pair in routing-service order.
    pub fn lon_lat(&self) -> [f64; 2] {
        [self.longitude, self.latitude]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("place name must not be empty")]
pub struct EmptyPlace;

/// A free-text place name, trimmed and guaranteed non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlaceQuery(String);

impl PlaceQuery {
    pub fn new(text: impl AsRef<str>) -> Result<Self, EmptyPlace> {
        let trimmed = text.as_ref().trim();
        if trimmed.is_empty() {
            return Err(EmptyPlace);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlaceQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("transport must be one of: driving-car, foot-walking, cycling-regular (got {0:?})")]
pub struct UnknownTransport(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportProfile {
    Car,
    Walking,
    Bicycle,
}

impl TransportProfile {
    pub const ALL: [TransportProfile; 3] = [Self::Car, Self::Walking, Self::Bicycle];

    /// Profile identifier understood by the routing service.
    pub fn service_id(self) -> &'static str {
        match self {
            Self::Car => "driving-car",
            Self::Walking => "foot-walking",
            Self::Bicycle => "cycling-regular",
        }
    }
}

impl FromStr for TransportProfile {
    type Err = UnknownTransport;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        match label.trim().to_lowercase().as_str() {
            "driving-car" | "car" | "auto" => Ok(Self::Car),
            "foot-walking" | "walking" | "walk" => Ok(Self::Walking),
            "cycling-regular" | "bike" | "bicycle" => Ok(Self::Bicycle),
            _ => Err(UnknownTransport(label.to_string())),
        }
    }
}

impl fmt::Display for TransportProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.service_id())
    }
}

/// A computed route as returned by the directions endpoint.
///
/// `geometry` is kept as opaque GeoJSON; the map page draws it as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteArtifact {
    pub distance_m: f64,
    pub duration_s: f64,
    pub geometry: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Bbox>,
}

impl RouteArtifact {
    /// All `[lon, lat]` positions of a LineString or MultiLineString geometry.
    ///
    /// Positions with an elevation component keep only the first two values.
    /// Other geometry types yield an empty list.
    pub fn line_coordinates(&self) -> Vec<[f64; 2]> {
        let coordinates = self.geometry.get("coordinates");
        let lines: Vec<&Value> = match self.geometry.get("type").and_then(Value::as_str) {
            Some("LineString") => coordinates.into_iter().collect(),
            Some("MultiLineString") => coordinates
                .and_then(Value::as_array)
                .map(|lines| lines.iter().collect())
                .unwrap_or_default(),
            _ => Vec::new(),
        };

        lines
            .into_iter()
            .filter_map(Value::as_array)
            .flatten()
            .filter_map(|position| {
                let position = position.as_array()?;
                let lon = position.first()?.as_f64()?;
                let lat = position.get(1)?.as_f64()?;
                Some([lon, lat])
            })
            .collect()
    }

    pub fn summary(&self) -> RouteSummary {
        RouteSummary {
            distance_m: self.distance_m,
            duration_s: self.duration_s,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteSummary {
    pub distance_m: f64,
    pub duration_s: f64,
}

impl RouteSummary {
    /// Distance in kilometres, rounded to one decimal.
    pub fn distance_km(&self) -> f64 {
        (self.distance_m / 1000.0 * 10.0).round() / 10.0
    }

    /// Duration as `HH:MM:SS`, the format stored as a tour's estimated time.
    pub fn estimated_time(&self) -> String {
        let secs = self.duration_s.max(0.0).round() as u64;
        format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tour {
    pub name: String,
    pub from_location: String,
    pub to_location: String,
    pub transport_type: String,
}
