use std::{env, path::PathBuf};

use clap::Parser;
use planner::{MapConfig, OrsClient, RouteArtifactWriter, RouteProvider, RouterConfig};
use shared::{PlaceQuery, TransportProfile};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Compute a route between two places and write it for the map page"
)]
struct Args {
    /// Start of the tour, as a free-text place name
    #[arg(long)]
    from: String,

    /// End of the tour, as a free-text place name
    #[arg(long)]
    to: String,

    /// driving-car / car / auto, foot-walking / walking / walk, cycling-regular / bike / bicycle
    #[arg(long, default_value = "driving-car")]
    transport: String,

    /// Directory receiving directions.js and the map page (overrides TOURPLANNER_MAP_DIR)
    #[arg(long)]
    map_dir: Option<PathBuf>,

    /// Also export the route as a GPX track
    #[arg(long)]
    gpx: Option<PathBuf>,

    /// Routing service base URL (overrides ORS_BASE_URL)
    #[arg(long)]
    base_url: Option<String>,

    /// Routing service API key (overrides ORS_API_KEY)
    #[arg(long)]
    api_key: Option<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "planner=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let router_config = RouterConfig::from_lookup(|key| match key {
        "ORS_API_KEY" => args.api_key.clone().or_else(|| env::var(key).ok()),
        "ORS_BASE_URL" => args.base_url.clone().or_else(|| env::var(key).ok()),
        _ => env::var(key).ok(),
    })?;
    let map_config = match &args.map_dir {
        Some(dir) => MapConfig::new(dir),
        None => MapConfig::from_env()?,
    };

    let profile: TransportProfile = args.transport.parse()?;
    let from = PlaceQuery::new(&args.from)?;
    let to = PlaceQuery::new(&args.to)?;

    let router = OrsClient::new(router_config)?;
    let start = router.geocode(&from)?;
    let end = router.geocode(&to)?;
    let route = router.directions(profile, &start, &end)?;

    let writer = RouteArtifactWriter::new();
    let page = writer.install_map_page(&map_config.map_dir)?;
    let artifact = writer.write(&route, &map_config.map_dir)?;
    tracing::info!("open {} to view the route", page.display());

    if let Some(path) = &args.gpx {
        let name = format!("{from} - {to}");
        planner::gpx_export::write_route_gpx(&route, &name, path)?;
    }

    let summary = route.summary();
    println!("{from} -> {to} ({profile})");
    println!("distance: {:.1} km", summary.distance_km());
    println!("estimated time: {}", summary.estimated_time());
    println!("artifact: {}", artifact.display());
    Ok(())
}
