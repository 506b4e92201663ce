//! Read models returned by the API.
//!
//! Rows coming out of sea-orm are mapped field by field into these structs, so
//! the JSON shape never depends on how a query happened to join things.
//! Amounts are brought back to two decimals on the way out.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::entities::{
    category,
    order::{self, Status},
    order_item, product,
    user::{self, Role},
};
use crate::format::normalize_amount;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySummary {
    pub id: i32,
    pub name: String,
}

impl From<category::Model> for CategorySummary {
    fn from(value: category::Model) -> Self {
        CategorySummary {
            id: value.id,
            name: value.name,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSummary {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub stock: i32,
    pub image_url: Option<String>,
    pub category_id: Option<i32>,
}

impl From<product::Model> for ProductSummary {
    fn from(value: product::Model) -> Self {
        ProductSummary {
            id: value.id,
            name: value.name,
            description: value.description,
            price: normalize_amount(value.price),
            stock: value.stock,
            image_url: value.image_url,
            category_id: value.category_id,
        }
    }
}

/// A product together with the category it belongs to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductView {
    #[serde(flatten)]
    pub product: ProductSummary,
    pub category: Option<CategorySummary>,
}

impl ProductView {
    pub fn new(product: product::Model, category: Option<category::Model>) -> Self {
        ProductView {
            product: product.into(),
            category: category.map(Into::into),
        }
    }
}

/// A category together with all of its products.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryView {
    pub id: i32,
    pub name: String,
    pub products: Vec<ProductSummary>,
}

impl CategoryView {
    pub fn new(category: category::Model, products: Vec<product::Model>) -> Self {
        CategoryView {
            id: category.id,
            name: category.name,
            products: products.into_iter().map(Into::into).collect(),
        }
    }
}

/// User as exposed on an order. The password hash never leaves the database layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl From<user::Model> for UserView {
    fn from(value: user::Model) -> Self {
        UserView {
            id: value.id,
            name: value.name,
            email: value.email,
            role: value.role,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemView {
    pub id: i32,
    pub order_id: i32,
    pub product_id: Option<i32>,
    pub quantity: i32,
    pub price_at_purchase: Decimal,
    pub product: Option<ProductSummary>,
}

impl OrderItemView {
    fn new(item: order_item::Model, product: Option<product::Model>) -> Self {
        OrderItemView {
            id: item.id,
            order_id: item.order_id,
            product_id: item.product_id,
            quantity: item.quantity,
            price_at_purchase: normalize_amount(item.price_at_purchase),
            product: product.map(Into::into),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    pub id: i32,
    pub total_amount: Decimal,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub user_id: Option<i32>,
    pub user: Option<UserView>,
    pub items: Vec<OrderItemView>,
}

pub async fn load_product<C: ConnectionTrait>(
    conn: &C,
    id: i32,
) -> Result<Option<ProductView>, DbErr> {
    let row = product::Entity::find_by_id(id)
        .find_also_related(category::Entity)
        .one(conn)
        .await?;

    Ok(row.map(|(product, category)| ProductView::new(product, category)))
}

pub async fn load_category<C: ConnectionTrait>(
    conn: &C,
    id: i32,
) -> Result<Option<CategoryView>, DbErr> {
    let Some(category) = category::Entity::find_by_id(id).one(conn).await? else {
        return Ok(None);
    };

    let products = product::Entity::find()
        .filter(product::Column::CategoryId.eq(id))
        .order_by_asc(product::Column::Name)
        .all(conn)
        .await?;

    Ok(Some(CategoryView::new(category, products)))
}

pub async fn load_order<C: ConnectionTrait>(conn: &C, id: i32) -> Result<Option<OrderView>, DbErr> {
    let Some(order) = order::Entity::find_by_id(id).one(conn).await? else {
        return Ok(None);
    };

    Ok(assemble_orders(conn, vec![order]).await?.pop())
}

/// Every order, newest first.
pub async fn load_orders<C: ConnectionTrait>(conn: &C) -> Result<Vec<OrderView>, DbErr> {
    let orders = order::Entity::find()
        .order_by_desc(order::Column::CreatedAt)
        .order_by_desc(order::Column::Id)
        .all(conn)
        .await?;

    assemble_orders(conn, orders).await
}

async fn assemble_orders<C: ConnectionTrait>(
    conn: &C,
    orders: Vec<order::Model>,
) -> Result<Vec<OrderView>, DbErr> {
    if orders.is_empty() {
        return Ok(vec![]);
    }

    let order_ids: Vec<i32> = orders.iter().map(|o| o.id).collect();
    let user_ids: Vec<i32> = orders.iter().filter_map(|o| o.user_id).collect();

    let mut items_by_order: HashMap<i32, Vec<OrderItemView>> = HashMap::new();
    let rows = order_item::Entity::find()
        .filter(order_item::Column::OrderId.is_in(order_ids))
        .order_by_asc(order_item::Column::Id)
        .find_also_related(product::Entity)
        .all(conn)
        .await?;
    for (item, product) in rows {
        items_by_order
            .entry(item.order_id)
            .or_default()
            .push(OrderItemView::new(item, product));
    }

    let mut users: HashMap<i32, UserView> = HashMap::new();
    if !user_ids.is_empty() {
        for found in user::Entity::find()
            .filter(user::Column::Id.is_in(user_ids))
            .all(conn)
            .await?
        {
            users.insert(found.id, found.into());
        }
    }

    Ok(orders
        .into_iter()
        .map(|order| OrderView {
            id: order.id,
            total_amount: normalize_amount(order.total_amount),
            status: order.status,
            created_at: order.created_at,
            user_id: order.user_id,
            user: order.user_id.and_then(|id| users.get(&id).cloned()),
            items: items_by_order.remove(&order.id).unwrap_or_default(),
        })
        .collect())
}
