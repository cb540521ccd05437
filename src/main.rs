use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cinesync::{
    api::{create_router, AppState},
    config::Config,
    services::HttpBackend,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("cinesync=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let settings = config.sync_settings();

    let backend = HttpBackend::new(
        config.api_url.clone(),
        settings.request_timeout,
        settings.training_timeout,
    )?;
    tracing::info!(api_url = %config.api_url, "Using backend");

    let state = AppState::new(Arc::new(backend), settings);

    // Pick up a backend session left over from a previous run
    let client = state.client.clone();
    tokio::spawn(async move {
        if let Err(e) = client.check_backend_session().await {
            tracing::warn!(error = %e, "Backend session check failed");
        }
    });

    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server running on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
