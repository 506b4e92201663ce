//! Turning a list of cart lines into an order.
//!
//! The whole flow runs in one transaction: every product lookup, every stock
//! decrement and the order insert either commit together or not at all.
//! Stock is decremented with a guarded `UPDATE ... WHERE stock >= quantity`,
//! so two registers selling the last unit at the same time cannot both win.
//! That update is the first statement of the transaction: sqlite hands out
//! its write lock before anything is read, and a second checkout waits on
//! the busy timeout instead of failing on a lock upgrade.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseTransaction, DbErr, EntityTrait,
    QueryFilter, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use validator::Validate;

use crate::entities::{
    order::{self, Status},
    order_item, product, user,
};
use crate::error::{valid_amount, ApiError};
use crate::format::{format_currency, normalize_amount};
use crate::views::{load_order, OrderView};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutItem {
    pub product_id: i32,
    #[validate(range(min = 1, message = "must be at least 1"))]
    pub quantity: i32,
    /// Price shown at the register. Stored as the line's `priceAtPurchase`;
    /// the product's current price is used when it is omitted.
    #[serde(default)]
    #[validate(custom(function = "valid_amount"))]
    pub price: Option<Decimal>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    #[validate(
        length(min = 1, message = "Order must contain at least one item"),
        nested
    )]
    pub items: Vec<CheckoutItem>,
    #[serde(default)]
    pub user_id: Option<i32>,
    #[serde(default)]
    pub status: Option<Status>,
}

#[derive(Error, Debug)]
pub enum CheckoutError {
    #[error("Order must contain at least one item")]
    EmptyOrder,
    #[error("Quantity for product {product_id} must be at least 1")]
    InvalidQuantity { product_id: i32 },
    #[error("Product with ID {0} not found")]
    ProductNotFound(i32),
    #[error("Insufficient stock for {name} (ID {product_id}): requested {requested}, available {available}")]
    InsufficientStock {
        product_id: i32,
        name: String,
        requested: i32,
        available: i32,
    },
    #[error("User with ID {0} not found")]
    UserNotFound(i32),
    #[error("Order total is too large")]
    AmountOverflow,
    #[error("Database error: {0}")]
    Db(#[from] DbErr),
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::Db(err) => ApiError::from(err),
            other => ApiError::Validation(other.to_string()),
        }
    }
}

/// Places an order for `request` and returns it with its items and user.
///
/// Nothing is written when any line fails: a missing product, a quantity
/// larger than the remaining stock or an unknown user rolls the whole
/// transaction back.
pub async fn place_order<C>(db: &C, request: CheckoutRequest) -> Result<OrderView, CheckoutError>
where
    C: TransactionTrait + Sync,
{
    if request.items.is_empty() {
        return Err(CheckoutError::EmptyOrder);
    }
    if let Some(item) = request.items.iter().find(|item| item.quantity < 1) {
        return Err(CheckoutError::InvalidQuantity {
            product_id: item.product_id,
        });
    }

    let txn = db.begin().await?;

    match create_order(&txn, &request).await {
        Ok(order_id) => {
            let view = load_order(&txn, order_id)
                .await?
                .ok_or_else(|| DbErr::RecordNotFound(format!("order {order_id}")))?;
            txn.commit().await?;

            info!(
                order_id = view.id,
                items = view.items.len(),
                total = %format_currency(view.total_amount),
                "Order placed"
            );
            Ok(view)
        }
        Err(err) => {
            if let Err(rollback_err) = txn.rollback().await {
                warn!(error = %rollback_err, "Failed to roll back checkout");
            }
            debug!(error = %err, "Checkout rejected");
            Err(err)
        }
    }
}

async fn create_order(
    txn: &DatabaseTransaction,
    request: &CheckoutRequest,
) -> Result<i32, CheckoutError> {
    let mut total = Decimal::ZERO;
    let mut lines = Vec::with_capacity(request.items.len());

    for item in &request.items {
        let decremented = product::Entity::update_many()
            .col_expr(
                product::Column::Stock,
                Expr::col(product::Column::Stock).sub(item.quantity),
            )
            .filter(product::Column::Id.eq(item.product_id))
            .filter(product::Column::Stock.gte(item.quantity))
            .exec(txn)
            .await?;

        let product = product::Entity::find_by_id(item.product_id)
            .one(txn)
            .await?
            .ok_or(CheckoutError::ProductNotFound(item.product_id))?;

        if decremented.rows_affected == 0 {
            return Err(CheckoutError::InsufficientStock {
                product_id: product.id,
                name: product.name,
                requested: item.quantity,
                available: product.stock,
            });
        }

        let price = normalize_amount(product.price);
        total = price
            .checked_mul(Decimal::from(item.quantity))
            .and_then(|line| total.checked_add(line))
            .ok_or(CheckoutError::AmountOverflow)?;

        lines.push((item, item.price.map(normalize_amount).unwrap_or(price)));
    }

    if let Some(user_id) = request.user_id {
        if user::Entity::find_by_id(user_id).one(txn).await?.is_none() {
            return Err(CheckoutError::UserNotFound(user_id));
        }
    }

    let order = order::ActiveModel {
        total_amount: Set(total),
        status: Set(request.status.unwrap_or_default()),
        created_at: Set(Utc::now()),
        user_id: Set(request.user_id),
        ..Default::default()
    }
    .insert(txn)
    .await?;

    let items = lines.into_iter().map(|(item, price)| order_item::ActiveModel {
        order_id: Set(order.id),
        product_id: Set(Some(item.product_id)),
        quantity: Set(item.quantity),
        price_at_purchase: Set(price),
        ..Default::default()
    });
    order_item::Entity::insert_many(items).exec(txn).await?;

    Ok(order.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::setup_schema;
    use rust_decimal_macros::dec;
    use sea_orm::{ConnectOptions, Database, DatabaseConnection, PaginatorTrait};

    async fn test_db() -> DatabaseConnection {
        let mut options = ConnectOptions::new("sqlite::memory:");
        options.max_connections(1).sqlx_logging(false);
        let db = Database::connect(options).await.expect("connect");
        setup_schema(&db).await.expect("schema");
        db
    }

    async fn seed_product(db: &DatabaseConnection, name: &str, price: Decimal, stock: i32) -> i32 {
        product::ActiveModel {
            name: Set(name.to_string()),
            price: Set(price),
            stock: Set(stock),
            ..Default::default()
        }
        .insert(db)
        .await
        .expect("insert product")
        .id
    }

    async fn stock_of(db: &DatabaseConnection, id: i32) -> i32 {
        product::Entity::find_by_id(id)
            .one(db)
            .await
            .unwrap()
            .expect("product exists")
            .stock
    }

    fn line(product_id: i32, quantity: i32, price: Decimal) -> CheckoutItem {
        CheckoutItem {
            product_id,
            quantity,
            price: Some(price),
        }
    }

    fn request(items: Vec<CheckoutItem>) -> CheckoutRequest {
        CheckoutRequest {
            items,
            user_id: None,
            status: None,
        }
    }

    #[tokio::test]
    async fn checkout_totals_and_decrements_stock() {
        let db = test_db().await;
        let a = seed_product(&db, "Croissant", dec!(10.00), 5).await;

        let order = place_order(&db, request(vec![line(a, 2, dec!(10.00))]))
            .await
            .expect("order placed");

        assert_eq!(order.total_amount, dec!(20.00));
        assert_eq!(order.status, Status::Pending);
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.items[0].quantity, 2);
        assert_eq!(order.items[0].price_at_purchase, dec!(10.00));
        assert_eq!(stock_of(&db, a).await, 3);
    }

    #[tokio::test]
    async fn total_uses_the_product_price_and_snapshots_the_register_price() {
        let db = test_db().await;
        let a = seed_product(&db, "Baguette", dec!(2.50), 10).await;
        let b = seed_product(&db, "Brioche", dec!(4.00), 10).await;

        let order = place_order(
            &db,
            request(vec![
                line(a, 2, dec!(2.00)),
                CheckoutItem {
                    product_id: b,
                    quantity: 1,
                    price: None,
                },
            ]),
        )
        .await
        .expect("order placed");

        assert_eq!(order.total_amount, dec!(9.00));
        assert_eq!(order.items[0].price_at_purchase, dec!(2.00));
        assert_eq!(order.items[1].price_at_purchase, dec!(4.00));
    }

    #[tokio::test]
    async fn missing_product_rolls_back_earlier_lines() {
        let db = test_db().await;
        let a = seed_product(&db, "Eclair", dec!(3.00), 4).await;

        let err = place_order(&db, request(vec![line(a, 2, dec!(3.00)), line(999, 1, dec!(1))]))
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::ProductNotFound(999)));
        assert_eq!(stock_of(&db, a).await, 4);
        assert_eq!(order::Entity::find().count(&db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn stock_never_goes_negative() {
        let db = test_db().await;
        let a = seed_product(&db, "Macaron", dec!(1.50), 3).await;

        // The same product twice: the second line only sees what the first left.
        let err = place_order(&db, request(vec![line(a, 2, dec!(1.50)), line(a, 2, dec!(1.50))]))
            .await
            .unwrap_err();

        match err {
            CheckoutError::InsufficientStock {
                requested,
                available,
                ..
            } => {
                assert_eq!(requested, 2);
                assert_eq!(available, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(stock_of(&db, a).await, 3);
        assert_eq!(order_item::Entity::find().count(&db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn empty_and_non_positive_requests_are_refused() {
        let db = test_db().await;
        let a = seed_product(&db, "Tarte", dec!(12.00), 3).await;

        assert!(matches!(
            place_order(&db, request(vec![])).await,
            Err(CheckoutError::EmptyOrder)
        ));
        assert!(matches!(
            place_order(&db, request(vec![line(a, 0, dec!(12.00))])).await,
            Err(CheckoutError::InvalidQuantity { product_id }) if product_id == a
        ));
        assert_eq!(stock_of(&db, a).await, 3);
    }

    #[tokio::test]
    async fn unknown_user_is_refused() {
        let db = test_db().await;
        let a = seed_product(&db, "Madeleine", dec!(0.75), 3).await;

        let mut req = request(vec![line(a, 1, dec!(0.75))]);
        req.user_id = Some(42);

        assert!(matches!(
            place_order(&db, req).await,
            Err(CheckoutError::UserNotFound(42))
        ));
        assert_eq!(stock_of(&db, a).await, 3);
    }

    #[tokio::test]
    async fn oversized_totals_are_refused_without_panicking() {
        let db = test_db().await;
        // Written straight to the table: the API refuses prices this large.
        let a = seed_product(&db, "Pièce montée", dec!(10000000000000000000000000000), 100).await;

        let err = place_order(&db, request(vec![line(a, 10, dec!(1))]))
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::AmountOverflow));
        assert_eq!(
            ApiError::from(err),
            ApiError::Validation("Order total is too large".into())
        );
        assert_eq!(stock_of(&db, a).await, 100);
        assert_eq!(order::Entity::find().count(&db).await.unwrap(), 0);
    }

    #[test]
    fn checkout_errors_are_client_errors_except_storage() {
        let err: ApiError = CheckoutError::ProductNotFound(7).into();
        assert_eq!(err, ApiError::Validation("Product with ID 7 not found".into()));

        let err: ApiError = CheckoutError::Db(DbErr::Custom("locked".into())).into();
        assert!(matches!(err, ApiError::Db(_)));
    }

    #[test]
    fn request_validation_reports_bad_lines() {
        let req = request(vec![CheckoutItem {
            product_id: 1,
            quantity: 0,
            price: Some(dec!(-1)),
        }]);
        assert!(req.validate().is_err());

        assert!(request(vec![]).validate().is_err());
        assert!(request(vec![line(1, 1, dec!(0))]).validate().is_ok());
    }
}
