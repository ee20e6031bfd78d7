//! Tax-Loss Harvesting API
//!
//! HTTP surface over the harvest engine and store: seed demo data, inspect
//! the portfolio and market snapshot, build and fetch plans, and render a
//! plan as plain text.

pub mod error;
pub mod routes;

pub use error::AppError;

use harvest_store::HarvestStore;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub store: HarvestStore,
}

/// Uniform JSON envelope for successful responses.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Build the application router.
pub fn router(state: AppState) -> axum::Router {
    routes::routes()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Read configuration from the environment, open the store, and serve.
pub async fn run_server() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:tlh.sqlite".to_string());
    let store = HarvestStore::new(&database_url).await?;

    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);
    let addr = format!("{host}:{port}");

    let app = router(AppState { store });
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, %database_url, "harvest API listening");
    axum::serve(listener, app).await?;

    Ok(())
}
