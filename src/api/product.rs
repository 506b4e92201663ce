use axum::{
    extract::{rejection::QueryRejection, Extension, Query},
    response::Response,
    routing::get,
    Router,
};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Deserializer};
use std::sync::Arc;
use tracing::info;
use validator::Validate;

use crate::entities::{category, product, product::Entity as ProductEntity};
use crate::error::{created, ok, valid_amount, ApiError, IdPath, ValidJson};
use crate::views::{load_product, ProductView};

//ROUTERS
pub fn product_router(db: Arc<DatabaseConnection>) -> Router {
    Router::new()
        .route("/products", get(get_products).post(create_product))
        .route(
            "/products/:id",
            get(get_product).put(update_product).delete(delete_product),
        )
        .layer(Extension(db))
}

//ROUTES
async fn get_products(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    query: Result<Query<ProductsQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(params) = query.map_err(|rejection| ApiError::Validation(rejection.body_text()))?;

    let mut finder = ProductEntity::find().find_also_related(category::Entity);
    if let Some(category_id) = params.category_id {
        finder = finder.filter(product::Column::CategoryId.eq(category_id));
    }

    let products: Vec<ProductView> = finder
        .order_by_asc(product::Column::Name)
        .all(&*db)
        .await?
        .into_iter()
        .map(|(product, category)| ProductView::new(product, category))
        .collect();

    Ok(ok(products))
}

async fn get_product(
    IdPath(id): IdPath,
    Extension(db): Extension<Arc<DatabaseConnection>>,
) -> Result<Response, ApiError> {
    match load_product(&*db, id).await? {
        Some(product) => Ok(ok(product)),
        None => Err(ApiError::NotFound("Product not found".into())),
    }
}

async fn create_product(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    ValidJson(payload): ValidJson<CreateProduct>,
) -> Result<Response, ApiError> {
    if let Some(category_id) = payload.category_id {
        ensure_category(&*db, category_id).await?;
    }

    let txn = db.begin().await?;

    let new_product = product::ActiveModel {
        name: Set(payload.name),
        description: Set(payload.description),
        price: Set(payload.price),
        stock: Set(payload.stock.unwrap_or(0)),
        image_url: Set(payload.image_url),
        category_id: Set(payload.category_id),
        ..Default::default()
    };

    let inserted = new_product.insert(&txn).await?;
    let view = load_product(&txn, inserted.id)
        .await?
        .ok_or_else(|| ApiError::Internal("Created product vanished".into()))?;
    txn.commit().await?;

    info!(product_id = view.product.id, name = %view.product.name, "Product created");
    Ok(created(view))
}

async fn update_product(
    IdPath(id): IdPath,
    Extension(db): Extension<Arc<DatabaseConnection>>,
    ValidJson(payload): ValidJson<UpdateProduct>,
) -> Result<Response, ApiError> {
    if let Some(Some(category_id)) = payload.category_id {
        ensure_category(&*db, category_id).await?;
    }

    let mut changes = <product::ActiveModel as Default>::default();
    if let Some(name) = payload.name {
        changes.name = Set(name);
    }
    if let Some(description) = payload.description {
        changes.description = Set(description);
    }
    if let Some(price) = payload.price {
        changes.price = Set(price);
    }
    if let Some(stock) = payload.stock {
        changes.stock = Set(stock);
    }
    if let Some(image_url) = payload.image_url {
        changes.image_url = Set(image_url);
    }
    if let Some(category_id) = payload.category_id {
        changes.category_id = Set(category_id);
    }

    let txn = db.begin().await?;

    // The update goes first so sqlite grants the write lock before any read.
    if changes.is_changed() {
        let result = ProductEntity::update_many()
            .set(changes)
            .filter(product::Column::Id.eq(id))
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(ApiError::NotFound("Product not found".into()));
        }
    }

    let view = load_product(&txn, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Product not found".into()))?;
    txn.commit().await?;

    Ok(ok(view))
}

async fn delete_product(
    IdPath(id): IdPath,
    Extension(db): Extension<Arc<DatabaseConnection>>,
) -> Result<Response, ApiError> {
    let txn = db.begin().await?;

    let result = ProductEntity::delete_by_id(id).exec(&txn).await?;
    if result.rows_affected == 0 {
        txn.rollback().await?;
        return Err(ApiError::NotFound("Product not found".into()));
    }
    txn.commit().await?;

    info!(product_id = id, "Product deleted");
    Ok(ok(()))
}

async fn ensure_category<C: ConnectionTrait>(conn: &C, category_id: i32) -> Result<(), ApiError> {
    match category::Entity::find_by_id(category_id).one(conn).await? {
        Some(_) => Ok(()),
        None => Err(ApiError::Validation(format!(
            "Category with ID {} not found",
            category_id
        ))),
    }
}

//Struct
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProductsQuery {
    category_id: Option<i32>,
}

#[derive(Deserialize, Validate, Debug)]
#[serde(rename_all = "camelCase")]
struct CreateProduct {
    #[validate(length(min = 1, message = "must not be empty"))]
    name: String,
    description: Option<String>,
    #[validate(custom(function = "valid_amount"))]
    price: Decimal,
    #[validate(range(min = 0, message = "must not be negative"))]
    stock: Option<i32>,
    image_url: Option<String>,
    category_id: Option<i32>,
}

/// Missing fields are left alone; `null` clears the nullable ones.
#[derive(Deserialize, Validate, Debug)]
#[serde(rename_all = "camelCase")]
struct UpdateProduct {
    #[validate(length(min = 1, message = "must not be empty"))]
    name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    description: Option<Option<String>>,
    #[validate(custom(function = "valid_amount"))]
    price: Option<Decimal>,
    #[validate(range(min = 0, message = "must not be negative"))]
    stock: Option<i32>,
    #[serde(default, deserialize_with = "nullable")]
    image_url: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    category_id: Option<Option<i32>>,
}

/// A present field, `null` included, becomes `Some`.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
