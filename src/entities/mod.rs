pub mod category;
pub mod order;
pub mod order_item;
pub mod product;
pub mod user;

use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Schema,
    Set, TransactionTrait,
};
use thiserror::Error;
use tracing::info;

use crate::entities::{
    category::Entity as Category,
    order::Entity as Order,
    order_item::Entity as OrderItem,
    product::Entity as Product,
    user::Entity as User,
};

/// Creates every table (and its indexes) that does not exist yet.
///
/// Tables are created parents first so the foreign keys always point at an
/// existing table.
pub async fn setup_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    let schema = Schema::new(db.get_database_backend());

    create_table(db, &schema, User).await?;
    create_table(db, &schema, Category).await?;
    create_table(db, &schema, Product).await?;
    create_table(db, &schema, Order).await?;
    create_table(db, &schema, OrderItem).await?;

    Ok(())
}

async fn create_table<E: EntityTrait>(
    db: &DatabaseConnection,
    schema: &Schema,
    entity: E,
) -> Result<(), DbErr> {
    let backend = db.get_database_backend();

    let mut table = schema.create_table_from_entity(entity);
    db.execute(backend.build(table.if_not_exists())).await?;

    for mut index in schema.create_index_from_entity(entity) {
        db.execute(backend.build(index.if_not_exists())).await?;
    }

    Ok(())
}

/// Seeds an admin account unless one with the same email already exists.
///
/// Returns `true` when a row was inserted.
pub async fn primary_setup(
    db: &DatabaseConnection,
    email: &str,
    password: &str,
) -> Result<bool, SetupError> {
    let txn = db.begin().await?;

    let existing = User::find()
        .filter(user::Column::Email.eq(email))
        .one(&txn)
        .await?;
    if existing.is_some() {
        txn.rollback().await?;
        return Ok(false);
    }

    let password_hash = user::hash_password(password).map_err(SetupError::PasswordHash)?;

    let new_admin = user::ActiveModel {
        name: Set("admin".to_owned()),
        email: Set(email.to_owned()),
        password: Set(password_hash),
        role: Set(user::Role::Admin),
        ..Default::default()
    };

    User::insert(new_admin).exec(&txn).await?;
    txn.commit().await?;

    info!(email = %email, "Seeded admin user");
    Ok(true)
}


#[derive(Error, Debug)]
pub enum SetupError {
    #[error("Database error: {0}")]
    Db(#[from] DbErr),
    #[error("Failed to hash password: {0}")]
    PasswordHash(String),
}
