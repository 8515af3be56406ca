//! Reverse geocoding server.
//!
//! Loads one house filter per configured country and answers
//! `/v1/reverse?lat=..&lon=..` with the nearest known address.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use clap::Parser;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use house_resolver::config::{Config, StorageConfig};
use house_resolver::storage::{CsvDataSource, HouseDataSource, ScyllaDataSource};
use house_resolver::{
    Answer, AnswerSink, Coordinate, CountryLookup, CountryMap, HouseLocationFilter,
    LocaleNormalizer,
};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "reverse")]
#[command(about = "Nearest-house reverse geocoding server")]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "house-resolver.toml")]
    config: PathBuf,

    /// Listen address (overrides the config file)
    #[arg(short, long)]
    listen: Option<String>,
}

/// Application state shared across handlers
struct AppState<D: HouseDataSource> {
    filters: Vec<HouseLocationFilter<D>>,
    fetch_timeout: Duration,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    let mut config = Config::load_from_file(&args.config)
        .with_context(|| format!("Failed to load config {}", args.config.display()))?;
    if let Some(listen) = args.listen {
        config.server.listen = listen;
    }

    info!("House resolver server");

    match config.storage.clone() {
        StorageConfig::Csv { dir } => {
            let source = CsvDataSource::open_dir(&dir)
                .with_context(|| format!("Failed to scan house files in {}", dir.display()))?;
            serve(Arc::new(source), config).await
        }
        StorageConfig::Scylla {
            scylla_url,
            keyspace,
        } => {
            let source = ScyllaDataSource::connect(&scylla_url, &keyspace)
                .await
                .context("Failed to connect to ScyllaDB")?;
            serve(Arc::new(source), config).await
        }
    }
}

async fn serve<D>(source: Arc<D>, config: Config) -> Result<()>
where
    D: HouseDataSource + 'static,
{
    let table = config.country_map();
    if table.is_empty() {
        anyhow::bail!("No countries configured");
    }
    info!("Loading houses for {} countries", table.len());

    let countries: Arc<dyn CountryLookup> = Arc::new(table.clone());
    let normalizer = Arc::new(config.locale_normalizer());

    let filters = load_filters(&source, &table, &countries, &normalizer).await;
    if filters.is_empty() {
        anyhow::bail!("No country could be loaded");
    }

    let state = Arc::new(AppState {
        filters,
        fetch_timeout: config.fetch_timeout(),
    });

    // Build router
    let app = Router::new()
        .route("/health", get(health_handler::<D>))
        .route("/v1/reverse", get(reverse_handler::<D>))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("Starting server on {}", config.server.listen);

    let listener = tokio::net::TcpListener::bind(&config.server.listen).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build all country filters concurrently. A country whose addresses cannot
/// be loaded is left out.
async fn load_filters<D>(
    source: &Arc<D>,
    table: &CountryMap,
    countries: &Arc<dyn CountryLookup>,
    normalizer: &Arc<LocaleNormalizer>,
) -> Vec<HouseLocationFilter<D>>
where
    D: HouseDataSource,
{
    let loads = table.countries().into_iter().map(|country| {
        HouseLocationFilter::<D>::load(
            country.clone(),
            Arc::clone(source),
            Arc::clone(countries),
            Arc::clone(normalizer),
        )
    });

    let mut filters = Vec::new();
    for result in join_all(loads).await {
        match result {
            Ok(filter) => filters.push(filter),
            Err(e) => error!("Skipping country: {:#}", anyhow::Error::from(e)),
        }
    }
    filters
}

/// Health check endpoint
async fn health_handler<D: HouseDataSource + 'static>(
    State(state): State<Arc<AppState<D>>>,
) -> Json<HealthResponse> {
    let countries = state
        .filters
        .iter()
        .map(|f| CountryHealth {
            code: f.country().code.clone(),
            name: f.country().name.clone(),
            addresses: f.len(),
        })
        .collect();

    Json(HealthResponse {
        status: "ok",
        countries,
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    countries: Vec<CountryHealth>,
}

#[derive(Serialize)]
struct CountryHealth {
    code: String,
    name: String,
    addresses: usize,
}

#[derive(Debug, Deserialize)]
struct ReverseQueryParams {
    lat: f64,
    lon: f64,
}

#[derive(Serialize)]
struct ReverseResponse {
    query: Coordinate,
    #[serde(skip_serializing_if = "Option::is_none")]
    distance: Option<f64>,
    answer: Answer,
}

/// Reverse geocoding: every country filter gets a turn on the same answer
async fn reverse_handler<D: HouseDataSource + 'static>(
    State(state): State<Arc<AppState<D>>>,
    Query(params): Query<ReverseQueryParams>,
) -> Result<Json<ReverseResponse>, (StatusCode, String)> {
    if !(-90.0..=90.0).contains(&params.lat) || !(-180.0..=180.0).contains(&params.lon) {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("Coordinate out of range: {}, {}", params.lat, params.lon),
        ));
    }

    let query = Coordinate::new(params.lat, params.lon);
    let mut answer = Answer::new();

    for filter in &state.filters {
        let outcome = filter
            .resolve(&query, &mut answer, state.fetch_timeout)
            .await;
        debug!("{}: {:?}", filter.description(), outcome);
    }

    let distance = answer.distance_from_query();
    Ok(Json(ReverseResponse {
        query,
        distance: distance.is_finite().then_some(distance),
        answer,
    }))
}
