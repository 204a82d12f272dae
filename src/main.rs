//! AdIntel - offer tracking with ad-count trend classification.
//!
//! # API Endpoints
//!
//! - `GET /offers` - List offers with recent-trend classification
//! - `POST /offers` - Create an offer
//! - `GET|PATCH|DELETE /offers/:id` - Offer detail, update, removal
//! - `POST /offers/:id/archive` - Toggle archived flag
//! - `POST /offers/:id/ad-counts` - Record an ad count
//! - `POST /offers/:id/notes` - Attach a note
//! - `POST /performance` - Classify an arbitrary history
//! - `GET /health` - Health check

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use adintel::api::{AppState, router};
use adintel::config::Config;
use adintel::storage::Storage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("adintel=info".parse()?))
        .init();

    let config = Config::from_env()?;

    info!(
        port = config.port,
        db_url = %config.database_url,
        days_to_analyze = config.analysis.days_to_analyze,
        min_ads_threshold = config.analysis.min_ads_threshold,
        max_drop_percentage = config.analysis.max_drop_percentage,
        "Starting AdIntel server"
    );

    let storage = Storage::new(&config.database_url).await?;
    info!("Database initialized");

    let state = AppState {
        storage,
        analysis: config.analysis,
    };
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;

    info!(%addr, "AdIntel is listening");

    axum::serve(listener, app).await?;

    Ok(())
}
