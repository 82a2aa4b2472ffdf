use std::{fs::File, io::BufWriter, path::Path};

use geo_types::Point;
use gpx::{Gpx, GpxVersion, Track, TrackSegment, Waypoint};
use shared::RouteArtifact;

use crate::error::ArtifactError;

/// Builds a GPX 1.1 document with one track following the route geometry.
pub fn route_to_gpx(route: &RouteArtifact, name: &str) -> Result<Gpx, ArtifactError> {
    let coords = route.line_coordinates();
    if coords.is_empty() {
        return Err(ArtifactError::EmptyGeometry);
    }

    let mut gpx = Gpx {
        version: GpxVersion::Gpx11,
        creator: Some("tourplanner".into()),
        ..Default::default()
    };
    let mut track = Track {
        name: Some(name.to_string()),
        ..Default::default()
    };

    let mut segment = TrackSegment::new();
    segment
        .points
        .extend(coords.into_iter().map(|[lon, lat]| Waypoint::new(Point::new(lon, lat))));
    track.segments.push(segment);
    gpx.tracks.push(track);
    Ok(gpx)
}

pub fn write_route_gpx(
    route: &RouteArtifact,
    name: &str,
    path: impl AsRef<Path>,
) -> Result<(), ArtifactError> {
    let path = path.as_ref();
    let gpx = route_to_gpx(route, name)?;
    let writer = BufWriter::new(File::create(path)?);
    gpx::write(&gpx, writer)?;
    tracing::info!("exported route GPX to {}", path.display());
    Ok(())
}
