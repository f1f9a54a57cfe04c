use gpx_speed::{
    config::Config, create_router, source::OsmTraceClient, storage::TrackStore, AppState,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gpx_speed=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let client = OsmTraceClient::new(config.traces_api_url.clone(), config.request_timeout)?;
    tracing::info!("using trace source {}", config.traces_api_url);

    let mut state = AppState::new(client, config.max_pages);
    if let Some(url) = config.database_url.as_deref() {
        match TrackStore::connect(url).await {
            Ok(store) => {
                store.migrate().await?;
                state = state.with_store(store);
            }
            Err(e) => {
                tracing::warn!("PostgreSQL not available, stored traces disabled: {e}");
            }
        }
    } else {
        tracing::info!("DATABASE_URL not set, stored traces disabled");
    }

    let app = create_router(state);

    tracing::info!("starting backend on http://{}", config.bind_addr);
    tracing::info!("  GET /            - initial map coordinates");
    tracing::info!("  GET /gpx         - speed-annotated public traces for a bbox");
    tracing::info!("  GET /gpx/stored  - previously stored traces for a bbox");

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
