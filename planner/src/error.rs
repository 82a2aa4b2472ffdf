use std::{io, time::Duration};

use shared::{EmptyPlace, UnknownTransport};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("could not geocode {0:?}: no results")]
    NotFound(String),
    #[error("no route found")]
    NoRoute,
    #[error("routing service failed: HTTP {0}")]
    Service(reqwest::StatusCode),
    #[error("routing service unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed routing service response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl RouteError {
    /// Network or serialization failure, as opposed to an answer from the
    /// service.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Decode(_))
    }
}

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to write route artifact: {0}")]
    Io(#[from] io::Error),
    #[error("failed to serialize route artifact: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("route has neither a bbox nor line coordinates to derive one from")]
    MissingBounds,
    #[error("route geometry has no line coordinates")]
    EmptyGeometry,
    #[error("failed to build GPX document: {0}")]
    Gpx(#[from] gpx::errors::GpxError),
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("invalid tour location: {0}")]
    Place(#[from] EmptyPlace),
    #[error(transparent)]
    Profile(#[from] UnknownTransport),
    #[error(transparent)]
    Route(#[from] RouteError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error("map page failed to load")]
    SurfaceLoadFailed,
    #[error("UI thread is no longer running")]
    UiUnavailable,
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("map did not finish loading within {0:?}")]
    LoadTimeout(Duration),
    #[error("map snapshot timed out after {0:?}")]
    SnapshotTimeout(Duration),
    #[error("UI thread is no longer running")]
    UiUnavailable,
    #[error("failed to store map snapshot: {0}")]
    Io(#[from] io::Error),
    #[error("failed to encode map snapshot: {0}")]
    Encode(#[from] image::ImageError),
}
