use reqwest::{
    blocking::{Client, Response},
    header::ACCEPT,
    StatusCode,
};
use serde::Deserialize;
use serde_json::{json, Value};
use shared::{Bbox, GeoPoint, PlaceQuery, RouteArtifact, TransportProfile};

use crate::config::RouterConfig;
use crate::error::RouteError;

/// Geocoding and directions lookups against a remote routing service.
///
/// Implementations are stateless apart from immutable configuration and may be
/// shared between worker threads. Calls block the calling thread for the
/// duration of the network round trip and are never retried.
///
/// # Contract
/// - `geocode` fails with [`RouteError::NotFound`] when the service knows no
///   place of that name.
/// - `directions` fails with [`RouteError::NoRoute`] when the service returns
///   no route between the two points.
/// - Non-success HTTP status maps to [`RouteError::Service`].
/// - Transport-class failures come in two variants: network problems map to
///   [`RouteError::Transport`], unreadable payloads to [`RouteError::Decode`].
///   [`RouteError::is_transport`] is true for both.
pub trait RouteProvider: Send + Sync {
    fn geocode(&self, place: &PlaceQuery) -> Result<GeoPoint, RouteError>;

    fn directions(
        &self,
        profile: TransportProfile,
        from: &GeoPoint,
        to: &GeoPoint,
    ) -> Result<RouteArtifact, RouteError>;
}

/// Blocking client for an openrouteservice-compatible API.
pub struct OrsClient {
    http: Client,
    config: RouterConfig,
}

impl OrsClient {
    pub fn new(config: RouterConfig) -> Result<Self, RouteError> {
        let http = Client::builder().timeout(config.timeout).build()?;
        tracing::info!("routing client targeting {}", config.base_url);
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }
}

impl RouteProvider for OrsClient {
    fn geocode(&self, place: &PlaceQuery) -> Result<GeoPoint, RouteError> {
        let url = format!("{}/geocode/search", self.config.base_url);
        tracing::debug!("geocode request for {place:?}");

        let response = self
            .http
            .get(&url)
            .query(&[
                ("api_key", self.config.api_key.as_str()),
                ("text", place.as_str()),
            ])
            .header(ACCEPT, "application/json")
            .send()?;
        let body = read_success(response, "geocode")?;

        let point = parse_geocode(place, &body)?;
        tracing::debug!(
            "geocoded {place:?} to lat={} lon={}",
            point.latitude,
            point.longitude
        );
        Ok(point)
    }

    fn directions(
        &self,
        profile: TransportProfile,
        from: &GeoPoint,
        to: &GeoPoint,
    ) -> Result<RouteArtifact, RouteError> {
        let url = format!(
            "{}/v2/directions/{}/geojson",
            self.config.base_url,
            profile.service_id()
        );
        let body = json!({ "coordinates": [from.lon_lat(), to.lon_lat()] });
        tracing::debug!("directions request ({profile}) {body}");

        let response = self
            .http
            .post(&url)
            .query(&[("api_key", self.config.api_key.as_str())])
            .header(ACCEPT, "application/json")
            .json(&body)
            .send()?;
        let body = read_success(response, "directions")?;

        let route = parse_directions(&body)?;
        tracing::info!(
            "route computed ({profile}): {:.0} m, {:.0} s",
            route.distance_m,
            route.duration_s
        );
        Ok(route)
    }
}

fn read_success(response: Response, operation: &str) -> Result<String, RouteError> {
    let status = response.status();
    if status != StatusCode::OK {
        tracing::warn!("{operation} failed: HTTP {status}");
        return Err(RouteError::Service(status));
    }
    Ok(response.text()?)
}

#[derive(Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    features: Vec<GeocodeFeature>,
}

#[derive(Deserialize)]
struct GeocodeFeature {
    geometry: PointGeometry,
    #[serde(default)]
    bbox: Option<Vec<f64>>,
}

#[derive(Deserialize)]
struct PointGeometry {
    coordinates: Vec<f64>,
}

#[derive(Deserialize)]
struct DirectionsResponse {
    #[serde(default)]
    features: Vec<RouteFeature>,
    #[serde(default)]
    bbox: Option<Vec<f64>>,
}

#[derive(Deserialize)]
struct RouteFeature {
    #[serde(default)]
    properties: RouteProperties,
    geometry: Value,
    #[serde(default)]
    bbox: Option<Vec<f64>>,
}

#[derive(Default, Deserialize)]
struct RouteProperties {
    #[serde(default)]
    segments: Vec<Segment>,
}

#[derive(Deserialize)]
struct Segment {
    #[serde(default)]
    distance: f64,
    #[serde(default)]
    duration: f64,
}

/// Takes the first feature of a geocode search.
///
/// A feature without a bbox gets a degenerate one around its point.
fn parse_geocode(place: &PlaceQuery, body: &str) -> Result<GeoPoint, RouteError> {
    let response: GeocodeResponse = serde_json::from_str(body)?;
    let feature = response
        .features
        .into_iter()
        .next()
        .ok_or_else(|| RouteError::NotFound(place.to_string()))?;

    let (longitude, latitude) = match feature.geometry.coordinates.as_slice() {
        [lon, lat, ..] => (*lon, *lat),
        _ => {
            return Err(RouteError::Decode(serde::de::Error::custom(
                "geocode feature has fewer than two coordinates",
            )))
        }
    };
    let bbox = feature
        .bbox
        .as_deref()
        .and_then(planar_bbox)
        .unwrap_or([longitude, latitude, longitude, latitude]);

    Ok(GeoPoint {
        latitude,
        longitude,
        bbox,
    })
}

/// Takes the first route feature; distance and duration come from its first
/// segment, the bbox from the collection (or the feature as a fallback).
fn parse_directions(body: &str) -> Result<RouteArtifact, RouteError> {
    let response: DirectionsResponse = serde_json::from_str(body)?;
    let collection_bbox = response.bbox;
    let feature = response
        .features
        .into_iter()
        .next()
        .ok_or(RouteError::NoRoute)?;

    let (distance_m, duration_s) = feature
        .properties
        .segments
        .first()
        .map(|segment| (segment.distance, segment.duration))
        .unwrap_or((0.0, 0.0));
    let bbox = collection_bbox
        .as_deref()
        .and_then(planar_bbox)
        .or_else(|| feature.bbox.as_deref().and_then(planar_bbox));

    Ok(RouteArtifact {
        distance_m,
        duration_s,
        geometry: feature.geometry,
        bbox,
    })
}

/// Accepts 2D (`[minX,minY,maxX,maxY]`) and 3D (`[minX,minY,minZ,maxX,maxY,maxZ]`)
/// GeoJSON bboxes and drops the elevation axis.
fn planar_bbox(values: &[f64]) -> Option<Bbox> {
    match *values {
        [min_lon, min_lat, max_lon, max_lat] => Some([min_lon, min_lat, max_lon, max_lat]),
        [min_lon, min_lat, _, max_lon, max_lat, _] => Some([min_lon, min_lat, max_lon, max_lat]),
        _ => None,
    }
}
