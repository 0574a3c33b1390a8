mod api;
mod config;
mod job;
mod notification;
mod persistence;
mod report;
mod routes;
mod status;
mod subscription;
mod test_module;
#[cfg(test)]
mod testing;

use crate::api::{build_api, build_state, AppError};
use crate::config::Config;
use crate::job::service::spawn_ticker;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Arc::new(Config::load()?);
    let app_state = build_state(Arc::clone(&config)).await?;
    if let Some(secs) = config.job.interval_secs {
        info!(interval_secs = secs, "scheduling alert job");
        spawn_ticker(Arc::clone(&app_state.job), Duration::from_secs(secs.max(1)));
    }

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    info!(address = %config.server.bind_address, "listening");
    axum::serve(listener, build_api(app_state)).await?;
    Ok(())
}
