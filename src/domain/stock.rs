use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};

use crate::{
    entity::product_variants::{Column as VariantCol, Entity as ProductVariants, Model as VariantModel},
    error::{AppError, AppResult},
};

/// Outcome of a ledger mutation. Nothing is durable until [`apply`] runs
/// inside a transaction that commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockChange {
    pub quantity: i32,
    pub version: i64,
}

/// Take `quantity` units off the variant's stock.
pub fn deduct(variant: &VariantModel, quantity: i32) -> AppResult<StockChange> {
    if quantity <= 0 {
        return Err(AppError::BadRequest(
            "quantity must be greater than 0".to_string(),
        ));
    }
    if variant.stock < quantity {
        return Err(AppError::InsufficientStock {
            product_name: variant.name.clone(),
            available: variant.stock,
            requested: quantity,
        });
    }
    Ok(StockChange {
        quantity: variant.stock - quantity,
        version: variant.version + 1,
    })
}

/// Put `quantity` units back. No upper bound: a restore can only return
/// units a previous deduction took out.
pub fn restore(variant: &VariantModel, quantity: i32) -> AppResult<StockChange> {
    if quantity <= 0 {
        return Err(AppError::BadRequest(
            "quantity must be greater than 0".to_string(),
        ));
    }
    Ok(StockChange {
        quantity: variant.stock + quantity,
        version: variant.version + 1,
    })
}

/// Write the change back, guarded by the version the variant was loaded at.
/// Zero rows updated means another transaction mutated the variant first.
pub async fn apply<C: ConnectionTrait>(
    conn: &C,
    variant: &VariantModel,
    change: StockChange,
) -> AppResult<()> {
    let result = ProductVariants::update_many()
        .col_expr(VariantCol::Stock, Expr::value(change.quantity))
        .col_expr(VariantCol::Version, Expr::value(change.version))
        .filter(VariantCol::Id.eq(variant.id))
        .filter(VariantCol::Version.eq(variant.version))
        .exec(conn)
        .await?;
    if result.rows_affected == 0 {
        return Err(AppError::ConcurrencyConflict);
    }
    Ok(())
}
