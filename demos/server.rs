//! Demo server: reads settings from the environment, loads the resource declarations and
//! serves them next to the health routes.

use axum::Router;
use restmap_sdk::{common_routes_with_ready, load_from_path, resolve, resource_routes, AppState, Settings};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("restmap_sdk=info".parse()?))
        .init();

    let settings = Settings::from_env()?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .connect(&settings.database_url)
        .await?;

    let config = load_from_path(&settings.resources_path).await?;
    let graph = resolve(&config)?;
    tracing::info!(resources = graph.resources.len(), "resources loaded");

    let bind_addr = settings.bind_addr.clone();
    let state = AppState::new(pool, graph, settings);
    let app = Router::new()
        .merge(common_routes_with_ready(state.clone()))
        .merge(resource_routes(state));

    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
