use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Path, Request},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use sea_orm::{DbErr, SqlErr};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::middleware::logging::to_response;

const INTERNAL_MESSAGE: &str = "Internal server error";
const MAX_AMOUNT: i64 = 1_000_000_000_000;

/// Body shared by every endpoint: `{ data?, error?, success }`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub success: bool,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        ApiResponse {
            data: Some(data),
            error: None,
            success: true,
        }
    }
}

impl ApiResponse<()> {
    pub fn failure(error: String) -> Self {
        ApiResponse {
            data: None,
            error: Some(error),
            success: false,
        }
    }
}

/// 200 with the envelope around `data`.
pub fn ok<T: Serialize>(data: T) -> Response {
    to_response((StatusCode::OK, Json(ApiResponse::ok(data))), Ok(()))
}

/// 201 with the envelope around `data`.
pub fn created<T: Serialize>(data: T) -> Response {
    to_response((StatusCode::CREATED, Json(ApiResponse::ok(data))), Ok(()))
}

#[derive(Error, Clone, Debug, PartialEq)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Database error: {0}")]
    Db(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Db(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message the caller gets. Server-side causes stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Validation(message) | ApiError::NotFound(message) => message.clone(),
            ApiError::Db(_) | ApiError::Internal(_) => INTERNAL_MESSAGE.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ApiResponse::failure(self.public_message()));
        to_response((self.status(), body), Err(self))
    }
}

impl From<DbErr> for ApiError {
    fn from(err: DbErr) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => {
                ApiError::Validation("A record with the same unique value already exists".into())
            }
            Some(SqlErr::ForeignKeyConstraintViolation(_)) => {
                ApiError::Validation("The referenced record is still in use or does not exist".into())
            }
            _ => ApiError::Db(err.to_string()),
        }
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        let mut fields: Vec<String> = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| {
                let reasons: Vec<String> = errs
                    .iter()
                    .map(|err| {
                        err.message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| err.code.to_string())
                    })
                    .collect();
                format!("{}: {}", field, reasons.join(", "))
            })
            .collect();

        // Nested list errors (checkout lines) are reported by index.
        for (field, kind) in errors.errors() {
            if let validator::ValidationErrorsKind::List(items) = kind {
                for (index, nested) in items {
                    fields.push(format!("{}[{}]: {}", field, index, nested));
                }
            }
        }

        fields.sort();
        ApiError::Validation(format!("Failed to validate: {}", fields.join("; ")))
    }
}

/// Amounts are whole cents in `[0, 10^12)`.
pub fn valid_amount(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(
            ValidationError::new("negative_amount").with_message("must not be negative".into()),
        );
    }
    if value.normalize().scale() > 2 {
        return Err(ValidationError::new("amount_precision")
            .with_message("must have at most two decimal places".into()));
    }
    if *value >= Decimal::from(MAX_AMOUNT) {
        return Err(
            ValidationError::new("amount_too_large").with_message("is too large".into()),
        );
    }
    Ok(())
}

/// JSON body that has already passed `validator` checks.
pub struct ValidJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::Validation(rejection.body_text()))?;
        value.validate()?;
        Ok(ValidJson(value))
    }
}

/// Numeric `:id` path segment.
pub struct IdPath(pub i32);

#[async_trait]
impl<S> FromRequestParts<S> for IdPath
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<i32>::from_request_parts(parts, state).await {
            Ok(Path(id)) => Ok(IdPath(id)),
            Err(_) => Err(ApiError::Validation("Invalid ID".to_string())),
        }
    }
}
