use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pos_inventory::api::create_api_router;
use pos_inventory::config::AppConfig;
use pos_inventory::connect;
use pos_inventory::entities::{primary_setup, setup_schema};

#[tokio::main]
async fn main() {
    let config = AppConfig::from_env().expect("Invalid configuration");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.log_filter))
        .init();

    let db = connect(&config).await.expect("Failed to connect to the database");
    setup_schema(&db).await.expect("Failed to create schema");

    if let Some(admin) = &config.admin {
        match primary_setup(&db, &admin.email, &admin.password).await {
            Ok(true) => {}
            Ok(false) => info!(email = %admin.email, "Admin user already present"),
            Err(err) => warn!(error = %err, "Failed to seed admin user"),
        }
    }

    let app = create_api_router(Arc::new(db));

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .expect("Failed to bind listener");
    info!(addr = %config.bind_addr, "Running");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "Failed to listen for shutdown signal");
    }
    info!("Shutting down");
}
