#![allow(dead_code)]

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use shop_orders_api::{
    config::AppConfig,
    db::{create_orm_conn, run_migrations},
    dto::{catalog::SyncReport, contacts::ContactRequest},
    entity::{
        product_infos::{Column as InfoCol, Entity as ProductInfos, Model as InfoModel},
        shops::{Column as ShopCol, Entity as Shops},
        users::{ActiveModel as UserActive, Model as UserModel},
    },
    middleware::auth::AuthUser,
    models::UserType,
    notify::{Notification, Notifier},
    services::{auth_service::hash_password, catalog_service, contact_service},
    state::AppState,
};
use tokio::sync::mpsc;
use uuid::Uuid;

pub const PASSWORD: &str = "correct horse 42";

pub const CATALOG: &str = r#"
shop: Gadget Hub
categories:
  - id: 1
    name: Phones
  - id: 2
    name: Cases
goods:
  - id: 100
    category: 1
    model: acme/phone-x
    name: Acme Phone X
    price: 500
    price_rrc: 550
    quantity: 10
    parameters:
      "Memory (GB)": 128
      "Colour": black
  - id: 200
    category: 1
    model: acme/phone-mini
    name: Acme Phone Mini
    price: 300
    price_rrc: 320
    quantity: 5
  - id: 300
    category: 2
    model: acme/case
    name: Acme Case
    price: 20
    price_rrc: 25
    quantity: 100
"#;

/// Fresh application state on an in-memory SQLite database.
///
/// The notification receiver is returned instead of a worker so tests can inspect
/// what would have been emailed.
pub async fn setup_state() -> anyhow::Result<(AppState, mpsc::Receiver<Notification>)> {
    let config = AppConfig::for_database("sqlite::memory:", "test-secret");
    let orm = create_orm_conn(&config.database_url, config.db_max_connections).await?;
    run_migrations(&orm).await?;
    let (notifier, receiver) = Notifier::channel(config.notify_queue_capacity);
    let state = AppState::new(orm, config, notifier)?;
    Ok((state, receiver))
}

pub async fn create_user(
    state: &AppState,
    email: &str,
    user_type: UserType,
    is_staff: bool,
) -> anyhow::Result<(UserModel, AuthUser)> {
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set(email.to_string()),
        password_hash: Set(hash_password(PASSWORD)?),
        first_name: Set("Test".into()),
        last_name: Set("User".into()),
        company: Set("Acme".into()),
        position: Set("Tester".into()),
        user_type: Set(user_type.as_str().to_string()),
        is_active: Set(true),
        is_staff: Set(is_staff),
        created_at: Set(Utc::now().into()),
    }
    .insert(&state.orm)
    .await?;

    let auth = AuthUser {
        user_id: user.id,
        user_type,
        is_staff,
    };
    Ok((user, auth))
}

pub async fn sync(state: &AppState, partner: &AuthUser, yaml: &str) -> anyhow::Result<SyncReport> {
    let document = catalog_service::parse_catalog(yaml.as_bytes())?;
    let resp = catalog_service::sync_catalog(state, partner, document, None).await?;
    Ok(resp.data.unwrap_or_default())
}

/// Listings of the named shop keyed by position in external id order.
pub async fn listings(state: &AppState, shop: &str) -> anyhow::Result<Vec<InfoModel>> {
    let shop = Shops::find()
        .filter(ShopCol::Name.eq(shop))
        .one(&state.orm)
        .await?
        .ok_or_else(|| anyhow::anyhow!("shop {shop} missing"))?;
    Ok(ProductInfos::find()
        .filter(InfoCol::ShopId.eq(shop.id))
        .order_by_asc(InfoCol::ExternalId)
        .all(&state.orm)
        .await?)
}

pub async fn listing(state: &AppState, id: Uuid) -> anyhow::Result<InfoModel> {
    ProductInfos::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| anyhow::anyhow!("listing {id} missing"))
}

pub async fn add_contact(state: &AppState, user: &AuthUser) -> anyhow::Result<Uuid> {
    let resp = contact_service::create_contact(
        state,
        user,
        ContactRequest {
            city: Some("Springfield".into()),
            street: Some("Evergreen Terrace".into()),
            house: Some("742".into()),
            phone: Some("+1 555 0100".into()),
            ..Default::default()
        },
    )
    .await?;
    resp.data
        .map(|c| c.id)
        .ok_or_else(|| anyhow::anyhow!("contact not returned"))
}
