use anyhow::Context;

use staydesk_api::app::{build_app, services::build_services};
use staydesk_api::config::ApiConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    staydesk_observability::init();

    let config = ApiConfig::from_env()?;
    let services = build_services(&config.store).await?;
    let app = build_app(services);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
