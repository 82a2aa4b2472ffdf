pub mod artifact;
pub mod config;
pub mod controller;
pub mod error;
pub mod gpx_export;
pub mod routing;
pub mod snapshot;
pub mod surface;
pub mod ui;

pub use artifact::RouteArtifactWriter;
pub use config::{MapConfig, RouterConfig};
pub use controller::{MapState, MapSurfaceController, RenderOutcome, RenderRequest, RenderTicket};
pub use error::{ArtifactError, RenderError, RouteError, SnapshotError};
pub use routing::{OrsClient, RouteProvider};
pub use snapshot::{SnapshotCoordinator, SnapshotResult};
pub use surface::{LoadStateProperty, MapSurface, Subscription, SurfaceLoadState};
pub use ui::{UiHandle, UiThread};
