use anyhow::Result;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use tokio::sync::OnceCell;
use uuid::Uuid;

use storefront_api::{
    db::{create_orm_conn, create_pool, run_migrations},
    domain::status::OrderStatus,
    dto::{
        cart::AddToCartRequest,
        orders::{CheckoutRequest, OrderWithItems},
    },
    entity::{
        addresses::{ActiveModel as AddressActive, Entity as Addresses},
        product_variants::{
            ActiveModel as VariantActive, Entity as ProductVariants, Model as VariantModel,
        },
        users::ActiveModel as UserActive,
    },
    error::AppError,
    middleware::auth::AuthUser,
    routes::admin::{InventoryAdjustRequest, UpdateOrderStatusRequest},
    routes::params::{AdminOrderSearchQuery, OrderListQuery, Pagination},
    services::{admin_service, cart_service, order_service},
    state::AppState,
};

static MIGRATIONS: OnceCell<()> = OnceCell::const_new();

// Every test seeds its own users and variants (random emails and SKUs), so
// the suite can run in parallel against one database without truncating.
async fn setup_state() -> Result<Option<AppState>> {
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run order lifecycle tests."
            );
            return Ok(None);
        }
    };

    let pool = create_pool(&database_url, 5).await?;
    let orm = create_orm_conn(&database_url).await?;
    MIGRATIONS
        .get_or_try_init(|| async { run_migrations(&orm).await })
        .await?;

    Ok(Some(AppState { pool, orm }))
}

async fn create_user(state: &AppState, role: &str) -> Result<AuthUser> {
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set(format!("{role}-{}@example.com", Uuid::new_v4())),
        role: Set(role.to_string()),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(AuthUser {
        user_id: user.id,
        role: role.to_string(),
    })
}

async fn create_address(state: &AppState, user: &AuthUser) -> Result<Uuid> {
    let address = AddressActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        recipient: Set("Test Recipient".to_string()),
        phone: Set("+62 811 0000".to_string()),
        line1: Set("Jl. Test 1".to_string()),
        line2: Set(None),
        city: Set("Jakarta".to_string()),
        province: Set("DKI Jakarta".to_string()),
        postal_code: Set("10110".to_string()),
        country: Set("ID".to_string()),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(address.id)
}

async fn create_variant(
    state: &AppState,
    name: &str,
    price: i64,
    stock: i32,
) -> Result<VariantModel> {
    let variant = VariantActive {
        id: Set(Uuid::new_v4()),
        sku: Set(format!("SKU-{}", Uuid::new_v4())),
        name: Set(name.to_string()),
        price: Set(price),
        stock: Set(stock),
        is_active: Set(true),
        version: Set(0),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(variant)
}

async fn add_to_cart(
    state: &AppState,
    user: &AuthUser,
    variant_id: Uuid,
    quantity: i32,
) -> Result<()> {
    cart_service::add_to_cart(
        &state.pool,
        user,
        AddToCartRequest {
            product_variant_id: variant_id,
            quantity,
        },
    )
    .await?;
    Ok(())
}

async fn place_order(state: &AppState, user: &AuthUser, address_id: Uuid) -> Result<OrderWithItems> {
    let resp = order_service::checkout(
        state,
        user,
        CheckoutRequest {
            shipping_address_id: address_id,
        },
    )
    .await?;
    Ok(resp.data.expect("checkout data"))
}

async fn reload_variant(state: &AppState, id: Uuid) -> Result<VariantModel> {
    Ok(ProductVariants::find_by_id(id)
        .one(&state.orm)
        .await?
        .expect("variant exists"))
}

async fn cart_len(state: &AppState, user: &AuthUser) -> Result<usize> {
    let resp = cart_service::list_cart(
        &state.pool,
        user,
        Pagination {
            page: None,
            per_page: None,
        },
    )
    .await?;
    Ok(resp.data.expect("cart data").items.len())
}

async fn set_status(
    state: &AppState,
    caller: &AuthUser,
    order_id: Uuid,
    status: &str,
) -> Result<(), AppError> {
    admin_service::update_order_status(
        state,
        caller,
        order_id,
        UpdateOrderStatusRequest {
            status: status.to_string(),
        },
    )
    .await
    .map(|_| ())
}

#[tokio::test]
async fn checkout_converts_the_cart_into_a_pending_order() -> Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let user = create_user(&state, "user").await?;
    let address_id = create_address(&state, &user).await?;
    let variant = create_variant(&state, "Ferris Mug", 100, 10).await?;
    add_to_cart(&state, &user, variant.id, 2).await?;

    let OrderWithItems { order, items } = place_order(&state, &user, address_id).await?;

    assert_eq!(order.total_amount, 200);
    assert_eq!(order.status, "pending");
    assert_eq!(order.payment_status, "unpaid");
    assert!(order.order_number.starts_with("ORD-"));
    assert_eq!(order.user_id, user.user_id);
    assert_eq!(order.shipping_address.city, "Jakarta");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].product_name, "Ferris Mug");
    assert_eq!(items[0].unit_price, 100);
    assert_eq!(items[0].quantity, 2);
    assert_eq!(items[0].item_total, 200);

    let after = reload_variant(&state, variant.id).await?;
    assert_eq!(after.stock, 8);
    assert_eq!(after.version, 1);

    assert_eq!(cart_len(&state, &user).await?, 0);
    Ok(())
}

#[tokio::test]
async fn failed_checkout_leaves_stock_and_cart_untouched() -> Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let user = create_user(&state, "user").await?;
    let address_id = create_address(&state, &user).await?;
    let plenty = create_variant(&state, "Plenty", 50, 5).await?;
    let scarce = create_variant(&state, "Scarce", 80, 1).await?;
    add_to_cart(&state, &user, plenty.id, 1).await?;
    add_to_cart(&state, &user, scarce.id, 2).await?;

    let err = order_service::checkout(
        &state,
        &user,
        CheckoutRequest {
            shipping_address_id: address_id,
        },
    )
    .await
    .unwrap_err();
    match err {
        AppError::InsufficientStock {
            product_name,
            available,
            requested,
        } => {
            assert_eq!(product_name, "Scarce");
            assert_eq!(available, 1);
            assert_eq!(requested, 2);
        }
        other => panic!("unexpected error: {other}"),
    }

    // Nothing from the aborted checkout may stick, including the deduction
    // that succeeded before the failing item.
    let plenty_after = reload_variant(&state, plenty.id).await?;
    assert_eq!(plenty_after.stock, 5);
    assert_eq!(plenty_after.version, 0);
    let scarce_after = reload_variant(&state, scarce.id).await?;
    assert_eq!(scarce_after.stock, 1);

    assert_eq!(cart_len(&state, &user).await?, 2);
    Ok(())
}

#[tokio::test]
async fn checkout_validates_user_address_and_cart() -> Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let user = create_user(&state, "user").await?;
    let other = create_user(&state, "user").await?;
    let other_address = create_address(&state, &other).await?;

    let nobody = AuthUser {
        user_id: Uuid::nil(),
        role: "user".to_string(),
    };
    let err = order_service::checkout(
        &state,
        &nobody,
        CheckoutRequest {
            shipping_address_id: other_address,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::IdRequired));

    let err = order_service::checkout(
        &state,
        &user,
        CheckoutRequest {
            shipping_address_id: other_address,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::ShippingAddressRequired));

    let err = order_service::checkout(
        &state,
        &user,
        CheckoutRequest {
            shipping_address_id: Uuid::new_v4(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::ShippingAddressRequired));

    let address_id = create_address(&state, &user).await?;
    let err = order_service::checkout(
        &state,
        &user,
        CheckoutRequest {
            shipping_address_id: address_id,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::EmptyCart));

    Ok(())
}

#[tokio::test]
async fn cancelling_a_pending_order_restores_stock() -> Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let user = create_user(&state, "user").await?;
    let address_id = create_address(&state, &user).await?;
    let variant = create_variant(&state, "Hoodie", 100, 10).await?;
    add_to_cart(&state, &user, variant.id, 2).await?;
    let OrderWithItems { order, .. } = place_order(&state, &user, address_id).await?;

    let resp = order_service::cancel_order(&state, &user, order.id).await?;
    let cancelled = resp.data.expect("cancel data").order;
    assert_eq!(cancelled.status, "cancelled");

    let after = reload_variant(&state, variant.id).await?;
    assert_eq!(after.stock, 10);
    assert_eq!(after.version, 2);
    Ok(())
}

#[tokio::test]
async fn shipped_orders_cannot_be_cancelled() -> Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let user = create_user(&state, "user").await?;
    let admin = create_user(&state, "admin").await?;
    let address_id = create_address(&state, &user).await?;
    let variant = create_variant(&state, "Hoodie", 100, 10).await?;
    add_to_cart(&state, &user, variant.id, 2).await?;
    let OrderWithItems { order, .. } = place_order(&state, &user, address_id).await?;

    set_status(&state, &admin, order.id, "processing").await?;
    set_status(&state, &admin, order.id, "shipped").await?;

    let err = order_service::cancel_order(&state, &user, order.id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::InvalidStatusTransition {
            from: OrderStatus::Shipped,
            to: OrderStatus::Cancelled,
        }
    ));

    let after = reload_variant(&state, variant.id).await?;
    assert_eq!(after.stock, 8);
    Ok(())
}

#[tokio::test]
async fn status_updates_follow_the_state_machine() -> Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let user = create_user(&state, "user").await?;
    let admin = create_user(&state, "admin").await?;
    let address_id = create_address(&state, &user).await?;
    let variant = create_variant(&state, "Mug", 100, 10).await?;
    add_to_cart(&state, &user, variant.id, 1).await?;
    let OrderWithItems { order, .. } = place_order(&state, &user, address_id).await?;

    let err = set_status(&state, &admin, order.id, "delivered")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidStatusTransition { .. }));

    let err = set_status(&state, &admin, order.id, "paid")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let err = set_status(&state, &user, order.id, "processing")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    let err = set_status(&state, &admin, Uuid::new_v4(), "processing")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound));

    set_status(&state, &admin, order.id, "processing").await?;
    set_status(&state, &admin, order.id, "shipped").await?;
    set_status(&state, &admin, order.id, "delivered").await?;

    let err = set_status(&state, &admin, order.id, "cancelled")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidStatusTransition { .. }));

    Ok(())
}

#[tokio::test]
async fn order_history_ignores_later_catalog_and_address_edits() -> Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let user = create_user(&state, "user").await?;
    let address_id = create_address(&state, &user).await?;
    let variant = create_variant(&state, "Original Name", 100, 10).await?;
    add_to_cart(&state, &user, variant.id, 2).await?;
    let OrderWithItems { order, .. } = place_order(&state, &user, address_id).await?;

    let loaded = reload_variant(&state, variant.id).await?;
    let mut active: VariantActive = loaded.into();
    active.name = Set("Renamed".to_string());
    active.price = Set(999);
    active.update(&state.orm).await?;

    let address = Addresses::find_by_id(address_id)
        .one(&state.orm)
        .await?
        .expect("address exists");
    let mut active: AddressActive = address.into();
    active.city = Set("Surabaya".to_string());
    active.update(&state.orm).await?;

    let resp = order_service::get_order(&state, &user, order.id).await?;
    let OrderWithItems { order, items } = resp.data.expect("order data");
    assert_eq!(items[0].product_name, "Original Name");
    assert_eq!(items[0].unit_price, 100);
    assert_eq!(order.total_amount, 200);
    assert_eq!(order.shipping_address.city, "Jakarta");
    Ok(())
}

#[tokio::test]
async fn each_checkout_gets_its_own_order_number() -> Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let user = create_user(&state, "user").await?;
    let address_id = create_address(&state, &user).await?;
    let variant = create_variant(&state, "Sticker Pack", 100, 10).await?;

    add_to_cart(&state, &user, variant.id, 1).await?;
    let first = place_order(&state, &user, address_id).await?;
    add_to_cart(&state, &user, variant.id, 1).await?;
    let second = place_order(&state, &user, address_id).await?;

    assert_ne!(first.order.order_number, second.order.order_number);

    let resp = order_service::list_orders(
        &state,
        &user,
        OrderListQuery {
            pagination: Pagination {
                page: None,
                per_page: None,
            },
            status: None,
            sort_order: None,
        },
    )
    .await?;
    assert_eq!(resp.data.expect("orders").items.len(), 2);
    Ok(())
}

#[tokio::test]
async fn orders_are_private_to_their_owner() -> Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let alice = create_user(&state, "user").await?;
    let mallory = create_user(&state, "user").await?;
    let admin = create_user(&state, "admin").await?;
    let address_id = create_address(&state, &alice).await?;
    let variant = create_variant(&state, "E-book", 100, 10).await?;
    add_to_cart(&state, &alice, variant.id, 1).await?;
    let OrderWithItems { order, .. } = place_order(&state, &alice, address_id).await?;

    let err = order_service::get_order(&state, &mallory, order.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unauthorized));

    let err = order_service::cancel_order(&state, &mallory, order.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unauthorized));

    // Privileged readers are exempt from the ownership check.
    order_service::get_order(&state, &admin, order.id).await?;
    admin_service::get_order_admin(&state, &admin, order.id).await?;

    let search = AdminOrderSearchQuery {
        pagination: Pagination {
            page: None,
            per_page: None,
        },
        status: None,
        user_id: Some(alice.user_id),
        order_number: None,
        sort_order: None,
    };
    let resp = admin_service::search_orders(&state, &admin, search).await?;
    assert!(
        resp.data
            .expect("orders")
            .items
            .iter()
            .any(|o| o.id == order.id)
    );

    let search = AdminOrderSearchQuery {
        pagination: Pagination {
            page: None,
            per_page: None,
        },
        status: None,
        user_id: None,
        order_number: None,
        sort_order: None,
    };
    let err = admin_service::search_orders(&state, &mallory, search)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    Ok(())
}

#[tokio::test]
async fn inventory_adjustments_use_the_ledger_rules() -> Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let admin = create_user(&state, "admin").await?;
    let variant = create_variant(&state, "Adjustable", 10, 5).await?;

    let resp =
        admin_service::adjust_inventory(&state, &admin, variant.id, InventoryAdjustRequest {
            delta: 3,
        })
        .await?;
    assert_eq!(resp.data.expect("variant").stock, 8);

    let err =
        admin_service::adjust_inventory(&state, &admin, variant.id, InventoryAdjustRequest {
            delta: -20,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InsufficientStock { .. }));

    let err =
        admin_service::adjust_inventory(&state, &admin, variant.id, InventoryAdjustRequest {
            delta: 0,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let after = reload_variant(&state, variant.id).await?;
    assert_eq!(after.stock, 8);
    assert_eq!(after.version, 1);
    Ok(())
}

#[tokio::test]
async fn racing_checkouts_never_oversell_the_last_unit() -> Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let variant = create_variant(&state, "Last Unit", 100, 1).await?;
    let alice = create_user(&state, "user").await?;
    let bob = create_user(&state, "user").await?;
    let alice_address = create_address(&state, &alice).await?;
    let bob_address = create_address(&state, &bob).await?;
    add_to_cart(&state, &alice, variant.id, 1).await?;
    add_to_cart(&state, &bob, variant.id, 1).await?;

    let (first, second) = tokio::join!(
        order_service::checkout(
            &state,
            &alice,
            CheckoutRequest {
                shipping_address_id: alice_address,
            },
        ),
        order_service::checkout(
            &state,
            &bob,
            CheckoutRequest {
                shipping_address_id: bob_address,
            },
        ),
    );

    let winners = [first.is_ok(), second.is_ok()]
        .iter()
        .filter(|ok| **ok)
        .count();
    assert_eq!(winners, 1, "exactly one checkout may win the last unit");

    let loser = if first.is_ok() {
        second.unwrap_err()
    } else {
        first.unwrap_err()
    };
    assert!(
        matches!(
            loser,
            AppError::ConcurrencyConflict | AppError::InsufficientStock { .. }
        ),
        "loser got: {loser}"
    );

    let after = reload_variant(&state, variant.id).await?;
    assert_eq!(after.stock, 0, "the shelf must end exactly empty");
    Ok(())
}
