#![allow(dead_code)]

use std::{
    collections::HashMap,
    net::TcpListener,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    thread,
    time::{Duration, Instant},
};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use image::{Rgba, RgbaImage};
use planner::{
    LoadStateProperty, MapConfig, MapSurface, MapSurfaceController, RouteError, RouteProvider,
    SurfaceLoadState, UiHandle, UiThread,
};
use serde_json::{json, Value};
use shared::{Bbox, GeoPoint, PlaceQuery, RouteArtifact, Tour, TransportProfile};
use tempfile::TempDir;

pub const API_KEY: &str = "test-key";
pub const VIENNA_SALZBURG_BBOX: Bbox = [13.055, 47.8095, 16.3738, 48.2082];

pub fn vienna() -> GeoPoint {
    GeoPoint {
        latitude: 48.2082,
        longitude: 16.3738,
        bbox: [16.1826, 48.1179, 16.5775, 48.3230],
    }
}

pub fn salzburg() -> GeoPoint {
    GeoPoint {
        latitude: 47.8095,
        longitude: 13.055,
        bbox: [12.9856, 47.7512, 13.1269, 47.8543],
    }
}

pub fn vienna_salzburg_geometry() -> Value {
    json!({"type": "LineString", "coordinates": [[16.3738, 48.2082], [13.055, 47.8095]]})
}

pub fn vienna_salzburg_route() -> RouteArtifact {
    RouteArtifact {
        distance_m: 295_000.0,
        duration_s: 10_800.0,
        geometry: vienna_salzburg_geometry(),
        bbox: Some(VIENNA_SALZBURG_BBOX),
    }
}

pub fn tour(from: &str, to: &str, transport: &str) -> Tour {
    Tour {
        name: format!("{from} - {to}"),
        from_location: from.into(),
        to_location: to.into(),
        transport_type: transport.into(),
    }
}

/// Deterministic in-memory routing service.
pub struct FakeRouter {
    places: HashMap<String, GeoPoint>,
    slow_places: HashMap<String, Duration>,
    fail_directions: AtomicBool,
    calls: Mutex<Vec<String>>,
}

impl FakeRouter {
    pub fn new() -> Self {
        let mut places = HashMap::new();
        places.insert("Vienna".to_string(), vienna());
        places.insert("Salzburg".to_string(), salzburg());
        places.insert(
            "Linz".to_string(),
            GeoPoint {
                latitude: 48.3069,
                longitude: 14.2858,
                bbox: [14.2, 48.2, 14.4, 48.4],
            },
        );
        Self {
            places,
            slow_places: HashMap::new(),
            fail_directions: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Geocoding `place` takes `delay` and resolves to Linz.
    pub fn slow(mut self, place: &str, delay: Duration) -> Self {
        let linz = self.places["Linz"];
        self.places.insert(place.to_string(), linz);
        self.slow_places.insert(place.to_string(), delay);
        self
    }

    pub fn failing_directions(self) -> Self {
        self.fail_directions.store(true, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl RouteProvider for FakeRouter {
    fn geocode(&self, place: &PlaceQuery) -> Result<GeoPoint, RouteError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("geocode {}", place.as_str()));
        if let Some(delay) = self.slow_places.get(place.as_str()) {
            thread::sleep(*delay);
        }
        self.places
            .get(place.as_str())
            .copied()
            .ok_or_else(|| RouteError::NotFound(place.to_string()))
    }

    fn directions(
        &self,
        profile: TransportProfile,
        from: &GeoPoint,
        to: &GeoPoint,
    ) -> Result<RouteArtifact, RouteError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("directions {}", profile.service_id()));
        if self.fail_directions.load(Ordering::SeqCst) {
            return Err(RouteError::NoRoute);
        }
        if *from == vienna() && *to == salzburg() {
            return Ok(vienna_salzburg_route());
        }
        Ok(RouteArtifact {
            distance_m: 1_000.0,
            duration_s: 600.0,
            geometry: json!({"type": "LineString", "coordinates": [from.lon_lat(), to.lon_lat()]}),
            bbox: None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadBehavior {
    Succeed,
    Fail,
    Hang,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceCall {
    Load(String),
    Reload,
    LoadContent(String),
    Script(String),
    Snapshot,
}

/// Rendering surface that completes loads asynchronously on the UI thread.
pub struct FakeSurface {
    ui: UiHandle,
    state: LoadStateProperty,
    behavior: Mutex<LoadBehavior>,
    calls: Mutex<Vec<(Instant, SurfaceCall)>>,
    off_thread_calls: AtomicUsize,
}

impl FakeSurface {
    pub fn new(ui: UiHandle) -> Arc<Self> {
        Arc::new(Self {
            ui,
            state: LoadStateProperty::new(),
            behavior: Mutex::new(LoadBehavior::Succeed),
            calls: Mutex::new(Vec::new()),
            off_thread_calls: AtomicUsize::new(0),
        })
    }

    pub fn set_behavior(&self, behavior: LoadBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, call)| call.clone())
            .collect()
    }

    pub fn loads(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SurfaceCall::Load(url) => Some(url),
                _ => None,
            })
            .collect()
    }

    pub fn script_times(&self) -> Vec<Instant> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, call)| matches!(call, SurfaceCall::Script(_)))
            .map(|(at, _)| *at)
            .collect()
    }

    pub fn off_thread_calls(&self) -> usize {
        self.off_thread_calls.load(Ordering::SeqCst)
    }

    fn record(&self, call: SurfaceCall) {
        if !self.ui.is_ui_thread() {
            self.off_thread_calls.fetch_add(1, Ordering::SeqCst);
        }
        self.calls.lock().unwrap().push((Instant::now(), call));
    }

    fn start_load(&self, behavior: LoadBehavior) {
        self.state.set(SurfaceLoadState::Loading);
        let finished = match behavior {
            LoadBehavior::Succeed => SurfaceLoadState::Succeeded,
            LoadBehavior::Fail => SurfaceLoadState::Failed,
            LoadBehavior::Hang => return,
        };
        let state = self.state.clone();
        let _ = self.ui.run_later(move || state.set(finished));
    }
}

impl MapSurface for FakeSurface {
    fn load(&self, url: &str) {
        self.record(SurfaceCall::Load(url.to_string()));
        let behavior = *self.behavior.lock().unwrap();
        self.start_load(behavior);
    }

    fn reload(&self) {
        self.record(SurfaceCall::Reload);
        let behavior = *self.behavior.lock().unwrap();
        self.start_load(behavior);
    }

    fn load_content(&self, html: &str) {
        self.record(SurfaceCall::LoadContent(html.to_string()));
        self.start_load(LoadBehavior::Succeed);
    }

    fn execute_script(&self, script: &str) {
        self.record(SurfaceCall::Script(script.to_string()));
    }

    fn snapshot(&self) -> RgbaImage {
        self.record(SurfaceCall::Snapshot);
        RgbaImage::from_pixel(64, 48, Rgba([0x33, 0x66, 0x99, 0xff]))
    }

    fn load_state(&self) -> &LoadStateProperty {
        &self.state
    }
}

/// A controller wired to fakes. Must be built inside a tokio runtime.
pub struct Harness {
    pub ui: UiThread,
    pub surface: Arc<FakeSurface>,
    pub router: Arc<FakeRouter>,
    pub controller: MapSurfaceController,
    pub dir: TempDir,
}

pub fn harness(router: FakeRouter) -> Harness {
    let ui = UiThread::start().unwrap();
    let surface = FakeSurface::new(ui.handle());
    let router = Arc::new(router);
    let dir = tempfile::tempdir().unwrap();
    let config = MapConfig::new(dir.path().join("leaflet"));
    let controller = MapSurfaceController::new(
        surface.clone(),
        router.clone(),
        ui.handle(),
        tokio::runtime::Handle::current(),
        &config,
    )
    .unwrap();
    Harness {
        ui,
        surface,
        router,
        controller,
        dir,
    }
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: &'static str,
    pub path: String,
    pub query: HashMap<String, String>,
    pub body: Option<Value>,
}

/// openrouteservice stand-in served from a background thread.
pub struct OrsStub {
    pub base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl OrsStub {
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

type Recorder = Arc<Mutex<Vec<RecordedRequest>>>;

pub fn spawn_ors_stub() -> OrsStub {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let requests: Recorder = Arc::default();

    let app = Router::new()
        .route("/geocode/search", get(geocode))
        .route("/v2/directions/:profile/geojson", post(directions))
        .with_state(requests.clone());

    thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, app).await.unwrap();
        });
    });

    OrsStub { base_url, requests }
}

async fn geocode(
    State(requests): State<Recorder>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, StatusCode> {
    requests.lock().unwrap().push(RecordedRequest {
        method: "GET",
        path: "/geocode/search".into(),
        query: query.clone(),
        body: None,
    });
    if query.get("api_key").map(String::as_str) != Some(API_KEY) {
        return Err(StatusCode::FORBIDDEN);
    }

    let feature = |point: GeoPoint| {
        json!({
            "type": "Feature",
            "geometry": {"type": "Point", "coordinates": [point.longitude, point.latitude]},
            "bbox": point.bbox,
        })
    };
    let features = match query.get("text").map(String::as_str) {
        Some("Vienna") => vec![feature(vienna())],
        Some("Salzburg") => vec![feature(salzburg())],
        _ => Vec::new(),
    };
    Ok(Json(json!({"type": "FeatureCollection", "features": features})))
}

async fn directions(
    State(requests): State<Recorder>,
    Path(profile): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    requests.lock().unwrap().push(RecordedRequest {
        method: "POST",
        path: format!("/v2/directions/{profile}/geojson"),
        query: query.clone(),
        body: Some(body),
    });
    if query.get("api_key").map(String::as_str) != Some(API_KEY) {
        return Err(StatusCode::FORBIDDEN);
    }

    match profile.as_str() {
        "driving-car" => Ok(Json(json!({
            "type": "FeatureCollection",
            "bbox": VIENNA_SALZBURG_BBOX,
            "features": [{
                "type": "Feature",
                "properties": {"segments": [{"distance": 295000.0, "duration": 10800.0}]},
                "geometry": vienna_salzburg_geometry(),
            }],
        }))),
        "foot-walking" => Ok(Json(json!({"type": "FeatureCollection", "features": []}))),
        _ => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}
