//! Drives the render pipeline for one map surface.
//!
//! A render cycle runs in two phases:
//!
//! 1. **Network** (worker thread): parse the tour, geocode both endpoints,
//!    fetch directions.
//! 2. **Present** (UI thread): write the artifact slot, subscribe once to the
//!    surface's next finished load, load the cache-busted page.
//!
//! Every selection bumps a generation counter. A cycle only writes or loads
//! while its generation is current, so overlapping selections never interleave
//! on the surface; superseded cycles resolve their ticket with
//! [`RenderOutcome::Superseded`].

use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use shared::{PlaceQuery, RouteArtifact, RouteSummary, Tour, TransportProfile};
use tokio::{runtime::Handle, sync::oneshot};
use url::Url;

use crate::artifact::RouteArtifactWriter;
use crate::config::MapConfig;
use crate::error::RenderError;
use crate::routing::RouteProvider;
use crate::surface::{MapSurface, Subscription, SurfaceLoadState};
use crate::ui::UiHandle;

/// Re-runs the map's layout once the page (and the container around it) has
/// been sized.
pub const INVALIDATE_SCRIPT: &str = "if (window.map) { map.invalidateSize(); }";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapState {
    Empty,
    Rendering,
    Rendered,
}

/// What a route render is computed from.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    pub from: PlaceQuery,
    pub to: PlaceQuery,
    pub profile: TransportProfile,
}

impl RenderRequest {
    pub fn from_tour(tour: &Tour) -> Result<Self, RenderError> {
        Ok(Self {
            from: PlaceQuery::new(&tour.from_location)?,
            to: PlaceQuery::new(&tour.to_location)?,
            profile: tour.transport_type.parse()?,
        })
    }
}

/// How a selection ended.
#[derive(Debug)]
pub enum RenderOutcome {
    Rendered(RouteSummary),
    Cleared,
    Failed(RenderError),
    /// A newer selection took over before this one finished.
    Superseded,
}

/// Completion handle for one selection.
pub struct RenderTicket {
    generation: u64,
    outcome: oneshot::Receiver<RenderOutcome>,
}

impl RenderTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Waits for the cycle to settle. Resolves to
    /// `Failed(RenderError::UiUnavailable)` if the UI thread went away first.
    pub async fn outcome(self) -> RenderOutcome {
        self.outcome
            .await
            .unwrap_or(RenderOutcome::Failed(RenderError::UiUnavailable))
    }
}

struct Current {
    generation: u64,
    state: MapState,
    /// Listener and ticket of the current cycle while its page is loading.
    pending_load: Option<PendingLoad>,
}

struct PendingLoad {
    subscription: Subscription,
    tx: oneshot::Sender<RenderOutcome>,
}

/// Owner of a map surface and its artifact directory.
#[derive(Clone)]
pub struct MapSurfaceController {
    inner: Arc<Inner>,
}

struct Inner {
    surface: Arc<dyn MapSurface>,
    router: Arc<dyn RouteProvider>,
    writer: RouteArtifactWriter,
    ui: UiHandle,
    workers: Handle,
    map_dir: PathBuf,
    page_url: Url,
    settle_delay: Duration,
    current: Mutex<Current>,
}

impl MapSurfaceController {
    /// Installs the map page into `config.map_dir`. Network work is spawned as
    /// blocking tasks on `workers`.
    pub fn new(
        surface: Arc<dyn MapSurface>,
        router: Arc<dyn RouteProvider>,
        ui: UiHandle,
        workers: Handle,
        config: &MapConfig,
    ) -> io::Result<Self> {
        let writer = RouteArtifactWriter::new();
        let page = fs::canonicalize(writer.install_map_page(&config.map_dir)?)?;
        let page_url = Url::from_file_path(&page).map_err(|()| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("map page {} is not addressable as a URL", page.display()),
            )
        })?;
        let map_dir = page
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| config.map_dir.clone());

        Ok(Self {
            inner: Arc::new(Inner {
                surface,
                router,
                writer,
                ui,
                workers,
                map_dir,
                page_url,
                settle_delay: config.settle_delay,
                current: Mutex::new(Current {
                    generation: 0,
                    state: MapState::Empty,
                    pending_load: None,
                }),
            }),
        })
    }

    pub fn state(&self) -> MapState {
        self.inner.lock().state
    }

    /// Generation of the most recent selection.
    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    /// The surface, for snapshotting.
    pub fn surface(&self) -> Arc<dyn MapSurface> {
        self.inner.surface.clone()
    }

    pub fn map_dir(&self) -> &Path {
        &self.inner.map_dir
    }

    /// Starts a render cycle for `tour`, or clears the surface for `None`.
    /// Any cycle still in flight is superseded.
    pub fn select(&self, tour: Option<&Tour>) -> RenderTicket {
        let (tx, outcome) = oneshot::channel();
        let generation = match tour {
            Some(tour) => self.begin(tour.clone(), tx),
            None => self.clear(tx),
        };
        RenderTicket {
            generation,
            outcome,
        }
    }

    /// Reloads the page when a route is on screen.
    pub fn refresh(&self) {
        let inner = self.inner.clone();
        let posted = self.inner.ui.run(move || {
            if inner.lock().state == MapState::Rendered {
                tracing::debug!("reloading map surface");
                inner.surface.reload();
            }
        });
        if posted.is_err() {
            tracing::warn!("cannot refresh map: UI thread is gone");
        }
    }

    fn begin(&self, tour: Tour, tx: oneshot::Sender<RenderOutcome>) -> u64 {
        let generation = self.inner.advance(MapState::Rendering);
        tracing::info!(
            "render cycle {generation} for tour {:?}: {} -> {} ({})",
            tour.name,
            tour.from_location,
            tour.to_location,
            tour.transport_type
        );

        let inner = self.inner.clone();
        self.inner.workers.spawn_blocking(move || {
            let route = inner.fetch_route(&tour);
            let presenter = inner.clone();
            if inner
                .ui
                .run_later(move || presenter.present(generation, route, tx))
                .is_err()
            {
                tracing::warn!("render cycle {generation} dropped: UI thread is gone");
            }
        });
        generation
    }

    fn clear(&self, tx: oneshot::Sender<RenderOutcome>) -> u64 {
        let generation = self.inner.advance(MapState::Empty);
        tracing::info!("render cycle {generation}: selection cleared");

        let inner = self.inner.clone();
        let posted = self.inner.ui.run(move || {
            if inner.is_current(generation) {
                inner.surface.load_content("");
                let _ = tx.send(RenderOutcome::Cleared);
            } else {
                let _ = tx.send(RenderOutcome::Superseded);
            }
        });
        if posted.is_err() {
            tracing::warn!("cannot clear map: UI thread is gone");
        }
        generation
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Current> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts a new generation. A page load still pending for the previous
    /// one is detached and its ticket resolved as superseded.
    fn advance(&self, state: MapState) -> u64 {
        let (generation, superseded) = {
            let mut current = self.lock();
            current.generation += 1;
            current.state = state;
            (current.generation, current.pending_load.take())
        };
        if let Some(pending) = superseded {
            pending.subscription.cancel();
            let _ = pending.tx.send(RenderOutcome::Superseded);
            tracing::debug!("detached page load superseded by render cycle {generation}");
        }
        generation
    }

    /// Takes the ticket of `generation`'s pending page load, if that cycle is
    /// still current.
    fn take_pending_load(&self, generation: u64) -> Option<oneshot::Sender<RenderOutcome>> {
        let mut current = self.lock();
        if current.generation != generation {
            return None;
        }
        current.pending_load.take().map(|pending| pending.tx)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock().generation == generation
    }

    /// Moves to `state` if `generation` is still the latest selection.
    fn settle(&self, generation: u64, state: MapState) -> bool {
        let mut current = self.lock();
        if current.generation != generation {
            return false;
        }
        current.state = state;
        true
    }

    /// Network phase. Blocks the calling worker thread.
    fn fetch_route(&self, tour: &Tour) -> Result<RouteArtifact, RenderError> {
        let request = RenderRequest::from_tour(tour)?;
        let from = self.router.geocode(&request.from)?;
        let to = self.router.geocode(&request.to)?;
        Ok(self.router.directions(request.profile, &from, &to)?)
    }

    /// Present phase. Runs on the UI thread.
    fn present(
        self: &Arc<Self>,
        generation: u64,
        route: Result<RouteArtifact, RenderError>,
        tx: oneshot::Sender<RenderOutcome>,
    ) {
        if !self.is_current(generation) {
            tracing::debug!("render cycle {generation} superseded before presenting");
            let _ = tx.send(RenderOutcome::Superseded);
            return;
        }

        let route = match route {
            Ok(route) => route,
            Err(err) => return self.fail(generation, err, tx),
        };
        if let Err(err) = self.writer.write(&route, &self.map_dir) {
            return self.fail(generation, err.into(), tx);
        }

        let summary = route.summary();
        let inner = self.clone();
        let subscription = self
            .surface
            .load_state()
            .subscribe_once(SurfaceLoadState::is_finished, move |state| {
                inner.on_load_finished(generation, state, summary)
            });
        {
            let mut current = self.lock();
            if current.generation != generation {
                drop(current);
                subscription.cancel();
                let _ = tx.send(RenderOutcome::Superseded);
                return;
            }
            current.pending_load = Some(PendingLoad { subscription, tx });
        }

        let url = self.cache_busted_url(generation);
        tracing::debug!("render cycle {generation}: loading {url}");
        self.surface.load(url.as_str());
    }

    /// Fires once, on the UI thread, when the load started by `present` ends.
    fn on_load_finished(
        self: &Arc<Self>,
        generation: u64,
        state: SurfaceLoadState,
        summary: RouteSummary,
    ) {
        let Some(tx) = self.take_pending_load(generation) else {
            tracing::debug!("ignoring page load of superseded render cycle {generation}");
            return;
        };
        if state == SurfaceLoadState::Failed {
            return self.fail(generation, RenderError::SurfaceLoadFailed, tx);
        }

        self.surface.execute_script(INVALIDATE_SCRIPT);
        let inner = self.clone();
        let scheduled = self.ui.run_after(self.settle_delay, move || {
            if inner.is_current(generation) {
                inner.surface.execute_script(INVALIDATE_SCRIPT);
            }
        });
        if scheduled.is_err() {
            tracing::warn!("render cycle {generation}: delayed invalidation not scheduled");
        }

        if self.settle(generation, MapState::Rendered) {
            tracing::info!(
                "render cycle {generation} rendered: {:.1} km, {}",
                summary.distance_km(),
                summary.estimated_time()
            );
            let _ = tx.send(RenderOutcome::Rendered(summary));
        } else {
            let _ = tx.send(RenderOutcome::Superseded);
        }
    }

    fn fail(&self, generation: u64, err: RenderError, tx: oneshot::Sender<RenderOutcome>) {
        if !self.settle(generation, MapState::Empty) {
            tracing::debug!("render cycle {generation} failed after being superseded: {err}");
            let _ = tx.send(RenderOutcome::Superseded);
            return;
        }
        tracing::error!("render cycle {generation} failed: {err}");
        self.surface.load_content("");
        let _ = tx.send(RenderOutcome::Failed(err));
    }

    fn cache_busted_url(&self, generation: u64) -> Url {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos())
            .unwrap_or_default();
        let mut url = self.page_url.clone();
        url.set_query(Some(&format!("t={nanos}-{generation}")));
        url
    }
}
