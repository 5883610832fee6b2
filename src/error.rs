use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::domain::status::OrderStatus;
use crate::response::{ApiResponse, Meta};

/// Every failure the API can report. Business-rule violations carry enough
/// context to be actionable; anything unexpected collapses into the three
/// server-error variants at the bottom.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("User id is required")]
    IdRequired,

    #[error("A valid shipping address is required")]
    ShippingAddressRequired,

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Insufficient stock for {product_name}: requested {requested}, available {available}")]
    InsufficientStock {
        product_name: String,
        available: i32,
        requested: i32,
    },

    #[error("Not Found")]
    NotFound,

    #[error("You do not have access to this order")]
    Unauthorized,

    #[error("Order cannot move from {from} to {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    #[error("The resource was modified concurrently, retry the operation")]
    ConcurrencyConflict,

    #[error("Bad Request {0}")]
    BadRequest(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Database error")]
    DbError(#[from] sqlx::Error),

    #[error("ORM error")]
    OrmError(#[from] sea_orm::DbErr),

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Stable machine-readable code, part of the API contract.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::IdRequired => "ID_REQUIRED",
            AppError::ShippingAddressRequired => "SHIPPING_ADDRESS_REQUIRED",
            AppError::EmptyCart => "EMPTY_CART",
            AppError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            AppError::NotFound => "NOT_FOUND",
            AppError::Unauthorized => "UNAUTHORIZED",
            AppError::InvalidStatusTransition { .. } => "INVALID_STATUS_TRANSITION",
            AppError::ConcurrencyConflict => "CONCURRENCY_CONFLICT",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Forbidden => "FORBIDDEN",
            AppError::DbError(_) | AppError::OrmError(_) | AppError::Internal(_) => "SERVER_ERROR",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::IdRequired
            | AppError::ShippingAddressRequired
            | AppError::EmptyCart
            | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Unauthorized | AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::InsufficientStock { .. }
            | AppError::InvalidStatusTransition { .. }
            | AppError::ConcurrencyConflict => StatusCode::CONFLICT,
            AppError::DbError(_) | AppError::OrmError(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorData {
    code: &'static str,
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        }

        let body = ApiResponse {
            message: self.to_string(),
            data: Some(ErrorData {
                code: self.code(),
                error: self.to_string(),
            }),
            meta: Some(Meta::empty()),
        };

        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
