use std::{net::SocketAddr, sync::Arc};

use server::{
    build_router,
    config::{load_settings, prepare_database_url},
    AppState,
};
use server_api::ApiContext;
use storage::Storage;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url);
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;
    let mut api = ApiContext::new(storage);
    api.max_page_size = settings.max_page_size;

    let app = build_router(Arc::new(AppState { api }), settings.body_limit_bytes);

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, max_page_size = settings.max_page_size, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
