use std::sync::Arc;

use equiplend_infra::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    equiplend_observability::init();

    let config = AppConfig::from_env()?;
    let services = equiplend_api::app::services::build_services(&config.persistence).await?;
    let app = equiplend_api::app::router(config.jwt_secret.clone(), Arc::new(services));

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app).await?;
    Ok(())
}
