use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, SqlErr, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::{AuditAction, log_audit},
    domain::{
        order::{self, OrderDraft},
        order_number,
        status::{OrderStatus, PaymentStatus},
        stock,
    },
    dto::orders::{CheckoutRequest, OrderList, OrderWithItems},
    entity::{
        addresses::Entity as Addresses,
        cart_items::{Column as CartCol, Entity as CartItems},
        order_items::{
            ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems,
            Model as OrderItemModel,
        },
        orders::{
            ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel,
        },
        product_variants::Entity as ProductVariants,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Order, OrderItem, ShippingAddress},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    state::AppState,
};

/// Convert the caller's cart into a durable order.
///
/// Stock deductions, the order insert and the cart deletion all ride one
/// transaction; any failure rolls the whole thing back. Contended rows are
/// never locked up front: each write is guarded by the version read
/// earlier, and a guard that matches nothing turns into
/// [`AppError::ConcurrencyConflict`].
pub async fn checkout(
    state: &AppState,
    user: &AuthUser,
    payload: CheckoutRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    if user.user_id.is_nil() {
        return Err(AppError::IdRequired);
    }

    let address = Addresses::find_by_id(payload.shipping_address_id)
        .one(&state.orm)
        .await?;
    let address = match address {
        Some(a) if a.user_id == user.user_id => a,
        _ => return Err(AppError::ShippingAddressRequired),
    };

    let txn = state.orm.begin().await?;

    let cart_rows = CartItems::find()
        .filter(CartCol::UserId.eq(user.user_id))
        .order_by_asc(CartCol::CreatedAt)
        .all(&txn)
        .await?;
    if cart_rows.is_empty() {
        return Err(AppError::EmptyCart);
    }

    let mut draft = OrderDraft::new(
        user.user_id,
        order_number::generate(),
        order::snapshot_address(&address),
    );

    for row in &cart_rows {
        let variant = ProductVariants::find_by_id(row.product_variant_id)
            .one(&txn)
            .await?
            .ok_or(AppError::NotFound)?;
        if !variant.is_active {
            return Err(AppError::BadRequest(format!(
                "{} is no longer available",
                variant.name
            )));
        }
        let change = stock::deduct(&variant, row.quantity)?;
        stock::apply(&txn, &variant, change).await?;
        draft.add_item(&variant, row.quantity)?;
    }

    let order = insert_order(&txn, &draft).await?;

    let mut items = Vec::with_capacity(draft.items.len());
    for item in &draft.items {
        let model = OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_variant_id: Set(item.product_variant_id),
            product_name: Set(item.product_name.clone()),
            unit_price: Set(item.unit_price),
            quantity: Set(item.quantity),
            item_total: Set(item.item_total),
            created_at: NotSet,
        }
        .insert(&txn)
        .await?;
        items.push(order_item_from_entity(model));
    }

    // Delete exactly the rows read above. Anything missing or requantified
    // means the cart was edited while we were checking out.
    let mut read_rows = Condition::any();
    for row in &cart_rows {
        read_rows = read_rows.add(
            Condition::all()
                .add(CartCol::Id.eq(row.id))
                .add(CartCol::Quantity.eq(row.quantity)),
        );
    }
    let deleted = CartItems::delete_many()
        .filter(CartCol::UserId.eq(user.user_id))
        .filter(read_rows)
        .exec(&txn)
        .await?;
    if deleted.rows_affected != cart_rows.len() as u64 {
        return Err(AppError::ConcurrencyConflict);
    }

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        AuditAction::Checkout,
        Some(serde_json::json!({
            "order_id": order.id,
            "order_number": order.order_number,
        })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Checkout success",
        OrderWithItems {
            order: order_from_entity(order),
            items,
        },
    ))
}

/// Cancel an order the caller owns, putting every deducted unit back on
/// the shelf. Rejected by the state machine once the order has shipped.
pub async fn cancel_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    if order.user_id != user.user_id {
        return Err(AppError::Unauthorized);
    }
    let next = parse_status(&order)?.transition(OrderStatus::Cancelled)?;

    let txn = state.orm.begin().await?;

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(&txn)
        .await?;
    for item in &items {
        let variant = ProductVariants::find_by_id(item.product_variant_id)
            .one(&txn)
            .await?
            .ok_or(AppError::NotFound)?;
        let change = stock::restore(&variant, item.quantity)?;
        stock::apply(&txn, &variant, change).await?;
    }

    let updated = persist_status(&txn, &order, next).await?;
    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        AuditAction::OrderCancelled,
        Some(serde_json::json!({ "order_id": updated.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Order cancelled",
        OrderWithItems {
            order: order_from_entity(updated),
            items: items.into_iter().map(order_item_from_entity).collect(),
        },
    ))
}

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination.normalize();
    let mut condition = Condition::all().add(OrderCol::UserId.eq(user.user_id));
    if let Some(status) = query.status.as_ref().filter(|s| !s.is_empty()) {
        let status = OrderStatus::parse(status)
            .ok_or_else(|| AppError::BadRequest("Invalid order status".into()))?;
        condition = condition.add(OrderCol::Status.eq(status.as_str()));
    }

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let mut finder = Orders::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_from_entity)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::paginated(
        "Ok",
        OrderList { items: orders },
        meta,
    ))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    if order.user_id != user.user_id && user.role != "admin" {
        return Err(AppError::Unauthorized);
    }

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_item_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "OK",
        OrderWithItems {
            order: order_from_entity(order),
            items,
        },
    ))
}

async fn insert_order<C: ConnectionTrait>(conn: &C, draft: &OrderDraft) -> AppResult<OrderModel> {
    let active = OrderActive {
        id: Set(draft.id),
        user_id: Set(draft.user_id),
        order_number: Set(draft.order_number.clone()),
        status: Set(OrderStatus::Pending.as_str().to_owned()),
        payment_status: Set(PaymentStatus::Unpaid.as_str().to_owned()),
        total_amount: Set(draft.total_amount),
        ship_recipient: Set(draft.shipping_address.recipient.clone()),
        ship_phone: Set(draft.shipping_address.phone.clone()),
        ship_line1: Set(draft.shipping_address.line1.clone()),
        ship_line2: Set(draft.shipping_address.line2.clone()),
        ship_city: Set(draft.shipping_address.city.clone()),
        ship_province: Set(draft.shipping_address.province.clone()),
        ship_postal_code: Set(draft.shipping_address.postal_code.clone()),
        ship_country: Set(draft.shipping_address.country.clone()),
        version: Set(0),
        created_at: NotSet,
        updated_at: NotSet,
    };
    match active.insert(conn).await {
        Ok(model) => Ok(model),
        // An order-number collision trips the unique index. Surface it as
        // retryable rather than overwriting or bubbling a raw DB error.
        Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            Err(AppError::ConcurrencyConflict)
        }
        Err(err) => Err(err.into()),
    }
}

/// Version-guarded status write. Zero rows updated means the order moved
/// under us and the caller has to reload before retrying.
pub(crate) async fn persist_status<C: ConnectionTrait>(
    conn: &C,
    order: &OrderModel,
    next: OrderStatus,
) -> AppResult<OrderModel> {
    let result = Orders::update_many()
        .col_expr(OrderCol::Status, Expr::value(next.as_str()))
        .col_expr(OrderCol::Version, Expr::value(order.version + 1))
        .col_expr(OrderCol::UpdatedAt, Expr::value(Utc::now()))
        .filter(OrderCol::Id.eq(order.id))
        .filter(OrderCol::Version.eq(order.version))
        .exec(conn)
        .await?;
    if result.rows_affected == 0 {
        return Err(AppError::ConcurrencyConflict);
    }
    Orders::find_by_id(order.id)
        .one(conn)
        .await?
        .ok_or(AppError::NotFound)
}

pub(crate) fn parse_status(order: &OrderModel) -> AppResult<OrderStatus> {
    OrderStatus::parse(&order.status).ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!(
            "order {} has unknown status {:?}",
            order.id,
            order.status
        ))
    })
}

pub(crate) fn order_from_entity(model: OrderModel) -> Order {
    Order {
        id: model.id,
        user_id: model.user_id,
        order_number: model.order_number,
        status: model.status,
        payment_status: model.payment_status,
        total_amount: model.total_amount,
        shipping_address: ShippingAddress {
            recipient: model.ship_recipient,
            phone: model.ship_phone,
            line1: model.ship_line1,
            line2: model.ship_line2,
            city: model.ship_city,
            province: model.ship_province,
            postal_code: model.ship_postal_code,
            country: model.ship_country,
        },
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}

pub(crate) fn order_item_from_entity(model: OrderItemModel) -> OrderItem {
    OrderItem {
        id: model.id,
        order_id: model.order_id,
        product_variant_id: model.product_variant_id,
        product_name: model.product_name,
        unit_price: model.unit_price,
        quantity: model.quantity,
        item_total: model.item_total,
        created_at: model.created_at.with_timezone(&Utc),
    }
}
