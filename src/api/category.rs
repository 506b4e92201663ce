use axum::{extract::Extension, response::Response, routing::get, Router};
use sea_orm::{
    sea_query::{Expr, Query},
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use validator::Validate;

use crate::entities::{category, category::Entity as CategoryEntity, product};
use crate::error::{created, ok, ApiError, IdPath, ValidJson};
use crate::views::{load_category, CategoryView};

const CATEGORY_IN_USE: &str = "Cannot delete category with associated products. Please remove products first or reassign them to another category.";

//ROUTERS
pub fn category_router(db: Arc<DatabaseConnection>) -> Router {
    Router::new()
        .route("/categories", get(get_categories).post(create_category))
        .route(
            "/categories/:id",
            get(get_category)
                .put(update_category)
                .delete(delete_category),
        )
        .layer(Extension(db))
}

//ROUTES
async fn get_categories(
    Extension(db): Extension<Arc<DatabaseConnection>>,
) -> Result<Response, ApiError> {
    let categories: Vec<CategoryView> = CategoryEntity::find()
        .order_by_asc(category::Column::Name)
        .order_by_asc(category::Column::Id)
        .find_with_related(product::Entity)
        .order_by_asc(product::Column::Name)
        .all(&*db)
        .await?
        .into_iter()
        .map(|(category, products)| CategoryView::new(category, products))
        .collect();

    Ok(ok(categories))
}

async fn get_category(
    IdPath(id): IdPath,
    Extension(db): Extension<Arc<DatabaseConnection>>,
) -> Result<Response, ApiError> {
    match load_category(&*db, id).await? {
        Some(category) => Ok(ok(category)),
        None => Err(ApiError::NotFound("Category not found".into())),
    }
}

async fn create_category(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    ValidJson(payload): ValidJson<CategoryPayload>,
) -> Result<Response, ApiError> {
    let new_category = category::ActiveModel {
        name: Set(payload.name),
        ..Default::default()
    };

    let inserted = new_category.insert(&*db).await?;
    info!(category_id = inserted.id, name = %inserted.name, "Category created");

    Ok(created(CategoryView::new(inserted, vec![])))
}

async fn update_category(
    IdPath(id): IdPath,
    Extension(db): Extension<Arc<DatabaseConnection>>,
    ValidJson(payload): ValidJson<CategoryPayload>,
) -> Result<Response, ApiError> {
    let txn = db.begin().await?;

    let result = CategoryEntity::update_many()
        .set(category::ActiveModel {
            name: Set(payload.name),
            ..Default::default()
        })
        .filter(category::Column::Id.eq(id))
        .exec(&txn)
        .await?;
    if result.rows_affected == 0 {
        return Err(ApiError::NotFound("Category not found".into()));
    }

    let view = load_category(&txn, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Category not found".into()))?;
    txn.commit().await?;

    Ok(ok(view))
}

async fn delete_category(
    IdPath(id): IdPath,
    Extension(db): Extension<Arc<DatabaseConnection>>,
) -> Result<Response, ApiError> {
    let txn = db.begin().await?;

    // Only deletes when no product points at the category.
    let in_use = Query::select()
        .expr(Expr::val(1))
        .from(product::Entity)
        .and_where(product::Column::CategoryId.eq(id))
        .to_owned();
    let result = CategoryEntity::delete_many()
        .filter(category::Column::Id.eq(id))
        .filter(Expr::exists(in_use).not())
        .exec(&txn)
        .await?;

    if result.rows_affected == 0 {
        let exists = CategoryEntity::find_by_id(id).one(&txn).await?.is_some();
        txn.rollback().await?;
        return Err(if exists {
            ApiError::Validation(CATEGORY_IN_USE.into())
        } else {
            ApiError::NotFound("Category not found".into())
        });
    }
    txn.commit().await?;

    info!(category_id = id, "Category deleted");
    Ok(ok(()))
}

//Struct
#[derive(Deserialize, Validate, Debug)]
struct CategoryPayload {
    #[validate(length(min = 1, message = "must not be empty"))]
    name: String,
}
