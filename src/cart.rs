//! Register-side cart.
//!
//! Lives only in memory for the duration of a sale; nothing here is persisted.
//! The register keeps its own copy of the catalog so it can show stock and
//! refuse to sell more than it believes is on the shelf. The authoritative
//! check happens at checkout.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::checkout::{place_order, CheckoutItem, CheckoutRequest};
use crate::error::ApiError;
use crate::format::{format_currency, format_date};
use crate::views::{OrderView, ProductSummary, ProductView};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CartError {
    #[error("Product is out of stock")]
    OutOfStock,
    #[error("Cannot exceed available stock")]
    StockExceeded,
    #[error("Product {0} is not in the cart")]
    NotInCart(i32),
    #[error("Product {0} is not in the catalog")]
    UnknownProduct(i32),
    #[error("Cart total is too large")]
    AmountOverflow,
    #[error("{0}")]
    Checkout(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct CartItem {
    pub product: ProductSummary,
    pub quantity: i32,
}

impl CartItem {
    pub fn line_total(&self) -> Result<Decimal, CartError> {
        self.product
            .price
            .checked_mul(Decimal::from(self.quantity))
            .ok_or(CartError::AmountOverflow)
    }
}

#[derive(Clone, Debug, Default)]
pub struct Cart {
    items: Vec<CartItem>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn quantity_of(&self, product_id: i32) -> Option<i32> {
        self.find(product_id).map(|item| item.quantity)
    }

    /// Adds one unit, capped at the product's stock.
    pub fn add(&mut self, product: &ProductSummary) -> Result<(), CartError> {
        if product.stock <= 0 {
            return Err(CartError::OutOfStock);
        }

        match self.items.iter_mut().find(|item| item.product.id == product.id) {
            Some(existing) => {
                if existing.quantity >= product.stock {
                    return Err(CartError::StockExceeded);
                }
                existing.quantity += 1;
            }
            None => self.items.push(CartItem {
                product: product.clone(),
                quantity: 1,
            }),
        }

        Ok(())
    }

    /// The `+` button: one more unit, never past the stock the line was added with.
    pub fn increment(&mut self, product_id: i32) -> Result<(), CartError> {
        let item = self.find_mut(product_id)?;
        if item.quantity >= item.product.stock {
            return Err(CartError::StockExceeded);
        }
        item.quantity += 1;
        Ok(())
    }

    /// The `-` button: one unit less, never below one.
    pub fn decrement(&mut self, product_id: i32) -> Result<(), CartError> {
        let item = self.find_mut(product_id)?;
        item.quantity = (item.quantity - 1).max(1);
        Ok(())
    }

    /// Direct quantity edit. Stock is not re-checked here; checkout will.
    pub fn update_quantity(&mut self, product_id: i32, quantity: i32) -> Result<(), CartError> {
        let item = self.find_mut(product_id)?;
        item.quantity = quantity.max(1);
        Ok(())
    }

    pub fn remove(&mut self, product_id: i32) -> Result<(), CartError> {
        let before = self.items.len();
        self.items.retain(|item| item.product.id != product_id);
        if self.items.len() == before {
            return Err(CartError::NotInCart(product_id));
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn total_items(&self) -> i32 {
        self.items.iter().map(|item| item.quantity).sum()
    }

    pub fn total(&self) -> Result<Decimal, CartError> {
        self.items.iter().try_fold(Decimal::ZERO, |total, item| {
            total
                .checked_add(item.line_total()?)
                .ok_or(CartError::AmountOverflow)
        })
    }

    pub fn to_checkout(&self) -> CheckoutRequest {
        CheckoutRequest {
            items: self
                .items
                .iter()
                .map(|item| CheckoutItem {
                    product_id: item.product.id,
                    quantity: item.quantity,
                    price: Some(item.product.price),
                })
                .collect(),
            user_id: None,
            status: None,
        }
    }

    fn find(&self, product_id: i32) -> Option<&CartItem> {
        self.items.iter().find(|item| item.product.id == product_id)
    }

    fn find_mut(&mut self, product_id: i32) -> Result<&mut CartItem, CartError> {
        self.items
            .iter_mut()
            .find(|item| item.product.id == product_id)
            .ok_or(CartError::NotInCart(product_id))
    }
}

/// Where a register sends a finished cart.
#[async_trait]
pub trait PlaceOrder: Send + Sync {
    async fn place_order(&self, request: CheckoutRequest) -> Result<OrderView, ApiError>;
}

/// Places orders straight into the database the API also uses.
#[derive(Clone)]
pub struct DbOrders {
    db: Arc<DatabaseConnection>,
}

impl DbOrders {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        DbOrders { db }
    }
}

#[async_trait]
impl PlaceOrder for DbOrders {
    async fn place_order(&self, request: CheckoutRequest) -> Result<OrderView, ApiError> {
        place_order(&*self.db, request).await.map_err(ApiError::from)
    }
}

/// One point-of-sale terminal: the catalog it displays, the current cart and
/// the category the cashier is browsing.
pub struct Register<P: PlaceOrder> {
    products: Vec<ProductView>,
    cart: Cart,
    selected_category: Option<i32>,
    orders: P,
}

impl<P: PlaceOrder> Register<P> {
    pub fn new(products: Vec<ProductView>, orders: P) -> Self {
        Register {
            products,
            cart: Cart::new(),
            selected_category: None,
            orders,
        }
    }

    pub fn cart(&self) -> &Cart {
        &self.cart
    }

    pub fn cart_mut(&mut self) -> &mut Cart {
        &mut self.cart
    }

    pub fn products(&self) -> &[ProductView] {
        &self.products
    }

    pub fn select_category(&mut self, category_id: Option<i32>) {
        self.selected_category = category_id;
    }

    /// Products shown in the grid for the selected category (all when none is selected).
    pub fn visible_products(&self) -> Vec<&ProductView> {
        self.products
            .iter()
            .filter(|view| match self.selected_category {
                Some(id) => view.product.category_id == Some(id),
                None => true,
            })
            .collect()
    }

    /// Puts one unit of a catalog product in the cart.
    pub fn add_to_cart(&mut self, product_id: i32) -> Result<(), CartError> {
        let view = self
            .products
            .iter()
            .find(|view| view.product.id == product_id)
            .ok_or(CartError::UnknownProduct(product_id))?;
        self.cart.add(&view.product)
    }

    /// Sends the cart to checkout.
    ///
    /// Returns `Ok(None)` for an empty cart. On success the displayed stock
    /// drops by what was sold and the cart is emptied; on failure both are
    /// left as they were.
    pub async fn checkout(&mut self) -> Result<Option<OrderView>, CartError> {
        if self.cart.is_empty() {
            return Ok(None);
        }

        let order = match self.orders.place_order(self.cart.to_checkout()).await {
            Ok(order) => order,
            Err(err) => {
                warn!(error = %err, "Checkout failed");
                return Err(CartError::Checkout(err.public_message()));
            }
        };

        for view in self.products.iter_mut() {
            if let Some(sold) = self.cart.quantity_of(view.product.id) {
                view.product.stock -= sold;
            }
        }
        self.cart.clear();

        info!(
            order_id = order.id,
            receipt = %receipt_summary(&order),
            "Order completed successfully"
        );
        Ok(Some(order))
    }

    /// Cart lines as the receipt panel shows them.
    pub fn receipt_lines(&self) -> Result<Vec<String>, CartError> {
        self.cart
            .items()
            .iter()
            .map(|item| {
                Ok(format!(
                    "{} {} × {} = {}",
                    item.product.name,
                    format_currency(item.product.price),
                    item.quantity,
                    format_currency(item.line_total()?)
                ))
            })
            .collect()
    }
}

/// Footer printed under a completed sale.
pub fn receipt_summary(order: &OrderView) -> String {
    format!(
        "Commande #{} du {} : {}",
        order.id,
        format_date(&order.created_at),
        format_currency(order.total_amount)
    )
}
