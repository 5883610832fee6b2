use storefront_api::{config::AppConfig, db::create_pool};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url, config.max_connections).await?;
    // Ensure migrations are applied.
    sqlx::migrate!("./migrations").run(&pool).await?;

    let admin_id = ensure_user(&pool, "admin@example.com", "admin").await?;
    let user_id = ensure_user(&pool, "user@example.com", "user").await?;
    ensure_address(&pool, user_id).await?;
    seed_variants(&pool).await?;

    println!("Seed completed. Admin ID: {admin_id}, User ID: {user_id}");
    Ok(())
}

async fn ensure_user(pool: &sqlx::PgPool, email: &str, role: &str) -> anyhow::Result<Uuid> {
    let row: (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO users (id, email, role)
        VALUES ($1, $2, $3)
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(role)
    .fetch_one(pool)
    .await?;

    println!("Ensured user {email} (role={role})");
    Ok(row.0)
}

async fn ensure_address(pool: &sqlx::PgPool, user_id: Uuid) -> anyhow::Result<()> {
    let existing: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM addresses WHERE user_id = $1 LIMIT 1")
            .bind(user_id)
            .fetch_optional(pool)
            .await?;
    if existing.is_some() {
        return Ok(());
    }

    sqlx::query(
        r#"
        INSERT INTO addresses (user_id, recipient, phone, line1, city, province, postal_code, country)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(user_id)
    .bind("Demo User")
    .bind("+62 812 3456 7890")
    .bind("Jl. Mawar 1")
    .bind("Jakarta")
    .bind("DKI Jakarta")
    .bind("10110")
    .bind("ID")
    .execute(pool)
    .await?;

    println!("Seeded address for user {user_id}");
    Ok(())
}

async fn seed_variants(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let variants = vec![
        ("HOODIE-RUST-M", "Axum Hoodie (M)", 550000, 50),
        ("MUG-FERRIS", "Ferris Mug", 120000, 100),
        ("STICKER-PACK", "Rust Sticker Pack", 50000, 200),
        ("EBOOK-ASYNC", "E-book: Async Rust", 250000, 75),
    ];

    for (sku, name, price, stock) in variants {
        sqlx::query(
            r#"
            INSERT INTO product_variants (id, sku, name, price, stock)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (sku) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(sku)
        .bind(name)
        .bind(price)
        .bind(stock)
        .execute(pool)
        .await?;
    }

    println!("Seeded product variants");
    Ok(())
}
