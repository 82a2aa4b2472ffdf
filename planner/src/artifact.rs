use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::Serialize;
use serde_json::Value;
use shared::{Bbox, RouteArtifact};

use crate::error::ArtifactError;

/// File name of the single artifact slot read by the map page.
pub const ARTIFACT_FILE: &str = "directions.js";
/// File name of the map page loaded into the rendering surface.
pub const MAP_PAGE_FILE: &str = "leaflet.html";

/// Global the map page reads the route from.
const ARTIFACT_VARIABLE: &str = "directions";

const MAP_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>Tour route</title>
  <link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css">
  <style>html, body, #map { height: 100%; margin: 0; }</style>
  <script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"></script>
  <script src="directions.js"></script>
</head>
<body>
  <div id="map"></div>
  <script>
    window.map = L.map('map');
    L.tileLayer('https://tile.openstreetmap.org/{z}/{x}/{y}.png', {
      maxZoom: 19,
      attribution: '&copy; OpenStreetMap contributors'
    }).addTo(map);
    if (window.directions) {
      L.geoJSON(directions.geometry).addTo(map);
      var b = directions.bbox;
      map.fitBounds([[b[1], b[0]], [b[3], b[2]]]);
    } else {
      map.setView([47.5, 14.5], 7);
    }
  </script>
</body>
</html>
"#;

#[derive(Serialize)]
struct ArtifactPayload<'a> {
    bbox: Bbox,
    geometry: &'a Value,
}

/// Writes computed routes into the artifact slot of a map directory.
///
/// The slot is positional: every write truncates `directions.js`, and the map
/// page always reads that same path. A directory must not be shared between
/// controllers.
#[derive(Debug, Clone, Copy, Default)]
pub struct RouteArtifactWriter;

impl RouteArtifactWriter {
    pub fn new() -> Self {
        Self
    }

    /// Script text for `route`: `var directions = {"bbox":[..],"geometry":{..}};`
    pub fn render(&self, route: &RouteArtifact) -> Result<String, ArtifactError> {
        let bbox = route_bounds(route).ok_or(ArtifactError::MissingBounds)?;
        let payload = ArtifactPayload {
            bbox,
            geometry: &route.geometry,
        };
        let json = serde_json::to_string(&payload)?;
        Ok(format!("var {ARTIFACT_VARIABLE} = {json};"))
    }

    /// Replaces the artifact slot in `target_dir` and returns its path.
    pub fn write(&self, route: &RouteArtifact, target_dir: &Path) -> Result<PathBuf, ArtifactError> {
        let path = target_dir.join(ARTIFACT_FILE);
        let script = self.render(route)?;
        fs::write(&path, script).map_err(|err| {
            tracing::error!("failed to write {}: {err}", path.display());
            err
        })?;
        tracing::info!("wrote route artifact to {}", path.display());
        Ok(path)
    }

    /// Creates `target_dir` and installs the bundled map page unless one is
    /// already present. Returns the page path.
    pub fn install_map_page(&self, target_dir: &Path) -> io::Result<PathBuf> {
        fs::create_dir_all(target_dir)?;
        let page = target_dir.join(MAP_PAGE_FILE);
        if !page.exists() {
            fs::write(&page, MAP_PAGE)?;
            tracing::info!("installed map page at {}", page.display());
        }
        Ok(page)
    }
}

/// The route's own bbox, or the extent of its line geometry.
pub fn route_bounds(route: &RouteArtifact) -> Option<Bbox> {
    if let Some(bbox) = route.bbox {
        return Some(bbox);
    }

    let coords = route.line_coordinates();
    if coords.is_empty() {
        return None;
    }
    let mut bbox = [f64::MAX, f64::MAX, f64::MIN, f64::MIN];
    for [lon, lat] in coords {
        bbox[0] = bbox[0].min(lon);
        bbox[1] = bbox[1].min(lat);
        bbox[2] = bbox[2].max(lon);
        bbox[3] = bbox[3].max(lat);
    }
    Some(bbox)
}
