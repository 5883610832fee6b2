use serde_json::Value;
use uuid::Uuid;

use crate::{db::DbPool, error::AppResult};

/// Everything the API records an audit trail for. Each action knows which
/// resource table it concerns.
#[derive(Debug, Clone, Copy)]
pub enum AuditAction {
    Checkout,
    OrderCancelled,
    OrderStatusUpdated,
    InventoryAdjusted,
    CartUpdated,
    CartRemoved,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::Checkout => "checkout",
            AuditAction::OrderCancelled => "order_cancelled",
            AuditAction::OrderStatusUpdated => "order_status_update",
            AuditAction::InventoryAdjusted => "inventory_adjust",
            AuditAction::CartUpdated => "cart_update",
            AuditAction::CartRemoved => "cart_remove",
        }
    }

    pub fn resource(self) -> &'static str {
        match self {
            AuditAction::Checkout
            | AuditAction::OrderCancelled
            | AuditAction::OrderStatusUpdated => "orders",
            AuditAction::InventoryAdjusted => "product_variants",
            AuditAction::CartUpdated | AuditAction::CartRemoved => "cart_items",
        }
    }
}

pub async fn log_audit(
    pool: &DbPool,
    user_id: Option<Uuid>,
    action: AuditAction,
    metadata: Option<Value>,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO audit_logs (id, user_id, action, resource, metadata)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(action.as_str())
    .bind(action.resource())
    .bind(metadata)
    .execute(pool)
    .await?;

    Ok(())
}
