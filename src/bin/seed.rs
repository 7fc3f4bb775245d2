use std::sync::Arc;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use shop_orders_api::{
    config::AppConfig,
    db::{OrmConn, create_orm_conn, run_migrations},
    entity::users::{ActiveModel as UserActive, Column as UserCol, Entity as Users},
    middleware::auth::AuthUser,
    models::UserType,
    notify::{LogMailer, Notifier},
    services::{auth_service::hash_password, catalog_service},
    state::AppState,
};

const DEMO_CATALOG: &str = r#"
shop: Demo Electronics
categories:
  - id: 224
    name: Smartphones
  - id: 15
    name: Accessories
goods:
  - id: 4216292
    category: 224
    model: apple/iphone/xs-max
    name: Smartphone Apple iPhone XS Max 512GB (gold)
    price: 110000
    price_rrc: 116990
    quantity: 14
    parameters:
      "Diagonal (inch)": 6.5
      "Resolution (px)": 2688x1242
      "Built-in memory (GB)": 512
      "Colour": gold
  - id: 4216226
    category: 224
    model: apple/iphone/xr
    name: Smartphone Apple iPhone XR 256GB (red)
    price: 65000
    price_rrc: 69990
    quantity: 9
    parameters:
      "Diagonal (inch)": 6.1
      "Built-in memory (GB)": 256
      "Colour": red
  - id: 4672670
    category: 15
    model: apple/earpods
    name: Headset Apple EarPods
    price: 1500
    price_rrc: 1990
    quantity: 40
"#;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let orm = create_orm_conn(&config.database_url, config.db_max_connections).await?;
    run_migrations(&orm).await?;

    let admin_id = ensure_user(&orm, "admin@example.com", "admin1234", UserType::Buyer, true).await?;
    let buyer_id = ensure_user(&orm, "buyer@example.com", "buyer1234", UserType::Buyer, false).await?;
    let partner_id = ensure_user(&orm, "partner@example.com", "partner1234", UserType::Shop, false).await?;

    let notifier = Notifier::spawn(Arc::new(LogMailer), config.notify_queue_capacity);
    let state = AppState::new(orm, config, notifier)?;

    let partner = AuthUser {
        user_id: partner_id,
        user_type: UserType::Shop,
        is_staff: false,
    };
    let document = catalog_service::parse_catalog(DEMO_CATALOG.as_bytes())?;
    let report = catalog_service::sync_catalog(&state, &partner, document, None)
        .await?
        .data
        .unwrap_or_default();

    println!(
        "Seed completed. Admin ID: {admin_id}, Buyer ID: {buyer_id}, Partner ID: {partner_id}"
    );
    println!(
        "Catalog: {} created, {} updated, {} deleted, {} retired",
        report.created, report.updated, report.deleted, report.retired
    );
    Ok(())
}

async fn ensure_user(
    orm: &OrmConn,
    email: &str,
    password: &str,
    user_type: UserType,
    is_staff: bool,
) -> anyhow::Result<Uuid> {
    if let Some(existing) = Users::find()
        .filter(UserCol::Email.eq(email))
        .one(orm)
        .await?
    {
        println!("User {email} already exists");
        return Ok(existing.id);
    }

    let user = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set(email.to_string()),
        password_hash: Set(hash_password(password)?),
        first_name: Set("Demo".to_string()),
        last_name: Set(user_type.as_str().to_string()),
        company: Set("Demo".to_string()),
        position: Set(String::new()),
        user_type: Set(user_type.as_str().to_string()),
        is_active: Set(true),
        is_staff: Set(is_staff),
        created_at: Set(Utc::now().into()),
    }
    .insert(orm)
    .await?;

    println!("Created user {email} (type={})", user_type.as_str());
    Ok(user.id)
}
