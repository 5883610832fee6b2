use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    audit::{AuditAction, log_audit},
    db::DbPool,
    dto::cart::{AddToCartRequest, CartItemDto, CartList},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{CartItem, ProductVariant},
    response::{ApiResponse, Meta},
    routes::params::Pagination,
};

#[derive(FromRow)]
struct CartVariantRow {
    cart_id: Uuid,
    quantity: i32,
    variant_id: Uuid,
    sku: String,
    name: String,
    price: i64,
    stock: i32,
    is_active: bool,
    created_at: DateTime<Utc>,
}

pub async fn list_cart(
    pool: &DbPool,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<CartList>> {
    let (page, limit, offset) = pagination.normalize();
    let rows = sqlx::query_as::<_, CartVariantRow>(
        r#"
        SELECT ci.id AS cart_id, ci.quantity,
               v.id AS variant_id, v.sku, v.name, v.price, v.stock, v.is_active, v.created_at
        FROM cart_items ci
        JOIN product_variants v ON v.id = ci.product_variant_id
        WHERE ci.user_id = $1
        ORDER BY ci.created_at ASC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(user.user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cart_items WHERE user_id = $1")
        .bind(user.user_id)
        .fetch_one(pool)
        .await?;

    let items = rows
        .into_iter()
        .map(|row| CartItemDto {
            id: row.cart_id,
            variant: ProductVariant {
                id: row.variant_id,
                sku: row.sku,
                name: row.name,
                price: row.price,
                stock: row.stock,
                is_active: row.is_active,
                created_at: row.created_at,
            },
            quantity: row.quantity,
        })
        .collect();

    let meta = Meta::new(page, limit, total.0);
    Ok(ApiResponse::paginated("OK", CartList { items }, meta))
}

pub async fn add_to_cart(
    pool: &DbPool,
    user: &AuthUser,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<CartItem>> {
    if payload.quantity <= 0 {
        return Err(AppError::BadRequest(
            "quantity must be greater than 0".to_string(),
        ));
    }

    let variant: Option<(Uuid, bool)> =
        sqlx::query_as("SELECT id, is_active FROM product_variants WHERE id = $1")
            .bind(payload.product_variant_id)
            .fetch_optional(pool)
            .await?;
    match variant {
        None => return Err(AppError::BadRequest("product not found".to_string())),
        Some((_, false)) => {
            return Err(AppError::BadRequest("product is not available".to_string()));
        }
        Some(_) => {}
    }

    let exist: Option<CartItem> =
        sqlx::query_as("SELECT * FROM cart_items WHERE user_id = $1 AND product_variant_id = $2")
            .bind(user.user_id)
            .bind(payload.product_variant_id)
            .fetch_optional(pool)
            .await?;

    let cart_item = if let Some(item) = exist {
        sqlx::query_as::<_, CartItem>(
            r#"
            UPDATE cart_items
            SET quantity = $3
            WHERE id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(item.id)
        .bind(user.user_id)
        .bind(payload.quantity)
        .fetch_one(pool)
        .await?
    } else {
        sqlx::query_as(
            "INSERT INTO cart_items (user_id, product_variant_id, quantity) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(user.user_id)
        .bind(payload.product_variant_id)
        .bind(payload.quantity)
        .fetch_one(pool)
        .await?
    };

    if let Err(err) = log_audit(
        pool,
        Some(user.user_id),
        AuditAction::CartUpdated,
        Some(serde_json::json!({
            "product_variant_id": payload.product_variant_id,
            "quantity": payload.quantity,
        })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success("OK", cart_item))
}

pub async fn remove_from_cart(
    pool: &DbPool,
    user: &AuthUser,
    product_variant_id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = sqlx::query("DELETE FROM cart_items WHERE product_variant_id = $1 AND user_id = $2")
        .bind(product_variant_id)
        .bind(user.user_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }

    if let Err(err) = log_audit(
        pool,
        Some(user.user_id),
        AuditAction::CartRemoved,
        Some(serde_json::json!({ "product_variant_id": product_variant_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success("Removed from cart", serde_json::json!({})))
}
