//! Sampling Roster - Axum Server
//!
//! Run with: cargo run
//! Serves the SMALL demo week; configure with `ROSTER__*` variables.

use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

use sampling_roster::api::{self, AppState};
use sampling_roster::config::SchedulerConfig;
use sampling_roster::demo_data::{self, DemoData};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("sampling_roster=info".parse()?))
        .init();

    let config = SchedulerConfig::from_env()?;
    let demo = demo_data::generate(DemoData::Small);
    let state = Arc::new(AppState::new(Arc::new(demo.repository()), config.clone()));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = api::router(state).layer(ServiceBuilder::new().layer(cors));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %config.bind_addr, samplers = demo.samplers.len(), "Server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
