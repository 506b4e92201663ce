pub mod category;
pub mod order;
pub mod product;

use axum::{middleware::from_fn, Router};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::middleware::logging::logging_middleware;
use category::category_router;
use order::order_router;
use product::product_router;

pub fn create_api_router(shared_db: Arc<DatabaseConnection>) -> Router {
    let api = Router::new()
        .merge(product_router(shared_db.clone()))
        .merge(category_router(shared_db.clone()))
        .merge(order_router(shared_db));

    Router::new()
        .nest("/api", api)
        .layer(from_fn(logging_middleware))
        .layer(TraceLayer::new_for_http())
}
