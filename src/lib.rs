pub mod api;
pub mod cart;
pub mod checkout;
pub mod config;
pub mod entities;
pub mod error;
pub mod format;
pub mod middleware;
pub mod views;

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};

use crate::config::AppConfig;

/// Opens the connection pool every handler shares.
pub async fn connect(config: &AppConfig) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(config.database_url.clone());
    options.max_connections(config.max_connections);

    let busy_timeout = config.busy_timeout;
    options.map_sqlx_sqlite_opts(move |sqlite| sqlite.busy_timeout(busy_timeout));

    Database::connect(options).await
}
