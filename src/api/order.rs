use axum::{extract::Extension, response::Response, routing::get, Router};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, TransactionTrait};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use validator::Validate;

use crate::checkout::{place_order, CheckoutRequest};
use crate::entities::order::{self, Entity as OrderEntity, Status};
use crate::error::{created, ok, ApiError, IdPath, ValidJson};
use crate::views::{load_order, load_orders};

//ROUTERS
pub fn order_router(db: Arc<DatabaseConnection>) -> Router {
    Router::new()
        .route("/orders", get(get_orders).post(create_order))
        .route("/orders/:id", get(get_order).put(update_order))
        .layer(Extension(db))
}

//ROUTES
async fn get_orders(
    Extension(db): Extension<Arc<DatabaseConnection>>,
) -> Result<Response, ApiError> {
    let orders = load_orders(&*db).await?;
    Ok(ok(orders))
}

async fn get_order(
    IdPath(id): IdPath,
    Extension(db): Extension<Arc<DatabaseConnection>>,
) -> Result<Response, ApiError> {
    match load_order(&*db, id).await? {
        Some(order) => Ok(ok(order)),
        None => Err(ApiError::NotFound("Order not found".into())),
    }
}

/// Checkout: validates every line, decrements stock and stores the order.
async fn create_order(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    ValidJson(payload): ValidJson<CheckoutRequest>,
) -> Result<Response, ApiError> {
    let order = place_order(&*db, payload).await?;
    Ok(created(order))
}

async fn update_order(
    IdPath(id): IdPath,
    Extension(db): Extension<Arc<DatabaseConnection>>,
    ValidJson(payload): ValidJson<UpdateOrder>,
) -> Result<Response, ApiError> {
    let txn = db.begin().await?;

    let result = OrderEntity::update_many()
        .set(order::ActiveModel {
            status: Set(payload.status),
            ..Default::default()
        })
        .filter(order::Column::Id.eq(id))
        .exec(&txn)
        .await?;
    if result.rows_affected == 0 {
        return Err(ApiError::NotFound("Order not found".into()));
    }

    let view = load_order(&txn, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Order not found".into()))?;
    txn.commit().await?;

    info!(order_id = id, status = %payload.status, "Order status updated");
    Ok(ok(view))
}

//Struct
#[derive(Deserialize, Validate, Debug)]
struct UpdateOrder {
    status: Status,
}
