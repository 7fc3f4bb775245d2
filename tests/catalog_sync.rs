mod common;

use sea_orm::{ColumnTrait, EntityTrait, ModelTrait, PaginatorTrait, QueryFilter};
use shop_orders_api::{
    dto::basket::{AddBasketItemsRequest, NewBasketItem},
    entity::{
        categories::Entity as Categories,
        shops::{Column as ShopCol, Entity as Shops},
        product_parameters::{Column as ProductParameterCol, Entity as ProductParameters},
    },
    error::AppError,
    models::UserType,
    routes::params::ProductQuery,
    services::{catalog_service, order_service},
};

use common::{CATALOG, create_user, listing, listings, setup_state, sync};

#[tokio::test]
async fn resync_with_same_document_is_idempotent() -> anyhow::Result<()> {
    let (state, _rx) = setup_state().await?;
    let (_, partner) = create_user(&state, "shop@example.com", UserType::Shop, false).await?;

    let first = sync(&state, &partner, CATALOG).await?;
    assert_eq!(first.created, 3);
    assert_eq!(first.updated, 0);
    let before = listings(&state, "Gadget Hub").await?;

    let second = sync(&state, &partner, CATALOG).await?;
    assert_eq!(second.created, 0);
    assert_eq!(second.updated, 3);
    assert_eq!(second.deleted + second.retired, 0);
    let after = listings(&state, "Gadget Hub").await?;

    assert_eq!(before, after);
    assert_eq!(Categories::find().count(&state.orm).await?, 2);
    let shop = Shops::find()
        .filter(ShopCol::Name.eq("Gadget Hub"))
        .one(&state.orm)
        .await?
        .unwrap();
    assert_eq!(shop.find_related(Categories).count(&state.orm).await?, 2);
    let params = ProductParameters::find()
        .filter(ProductParameterCol::ProductInfoId.eq(after[0].id))
        .count(&state.orm)
        .await?;
    assert_eq!(params, 2);
    Ok(())
}

#[tokio::test]
async fn resync_updates_prices_and_drops_parameters() -> anyhow::Result<()> {
    let (state, _rx) = setup_state().await?;
    let (_, partner) = create_user(&state, "shop@example.com", UserType::Shop, false).await?;
    sync(&state, &partner, CATALOG).await?;

    let changed = CATALOG
        .replace("price: 500", "price: 450")
        .replace("      \"Colour\": black\n", "");
    sync(&state, &partner, &changed).await?;

    let goods = listings(&state, "Gadget Hub").await?;
    assert_eq!(goods[0].price, 450);
    let params = ProductParameters::find()
        .filter(ProductParameterCol::ProductInfoId.eq(goods[0].id))
        .count(&state.orm)
        .await?;
    assert_eq!(params, 1);
    Ok(())
}

#[tokio::test]
async fn stale_listings_are_deleted_or_retired() -> anyhow::Result<()> {
    let (state, _rx) = setup_state().await?;
    let (_, partner) = create_user(&state, "shop@example.com", UserType::Shop, false).await?;
    let (_, buyer) = create_user(&state, "buyer@example.com", UserType::Buyer, false).await?;
    sync(&state, &partner, CATALOG).await?;
    let goods = listings(&state, "Gadget Hub").await?;

    order_service::add_items(
        &state,
        &buyer,
        AddBasketItemsRequest {
            items: vec![NewBasketItem {
                product_info: goods[1].id,
                quantity: 1,
            }],
        },
    )
    .await?;

    let only_first = r#"
shop: Gadget Hub
categories:
  - id: 1
    name: Phones
goods:
  - id: 100
    category: 1
    model: acme/phone-x
    name: Acme Phone X
    price: 500
    price_rrc: 550
    quantity: 10
"#;
    let report = sync(&state, &partner, only_first).await?;
    assert_eq!(report.updated, 1);
    assert_eq!(report.deleted, 1);
    assert_eq!(report.retired, 1);

    let remaining = listings(&state, "Gadget Hub").await?;
    assert_eq!(remaining.len(), 2);
    assert_eq!(listing(&state, goods[1].id).await?.quantity, 0);

    let again = sync(&state, &partner, only_first).await?;
    assert_eq!(again.deleted + again.retired, 0);
    Ok(())
}

#[tokio::test]
async fn only_the_owning_partner_may_sync() -> anyhow::Result<()> {
    let (state, _rx) = setup_state().await?;
    let (_, partner) = create_user(&state, "shop@example.com", UserType::Shop, false).await?;
    let (_, rival) = create_user(&state, "rival@example.com", UserType::Shop, false).await?;
    let (_, buyer) = create_user(&state, "buyer@example.com", UserType::Buyer, false).await?;

    let err = sync(&state, &buyer, CATALOG).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<AppError>(),
        Some(AppError::Authorization(_))
    ));

    sync(&state, &partner, CATALOG).await?;
    let err = sync(&state, &rival, CATALOG).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<AppError>(),
        Some(AppError::Authorization(_))
    ));
    assert_eq!(listings(&state, "Gadget Hub").await?.len(), 3);
    Ok(())
}

#[tokio::test]
async fn malformed_documents_change_nothing() -> anyhow::Result<()> {
    let (state, _rx) = setup_state().await?;
    let (_, partner) = create_user(&state, "shop@example.com", UserType::Shop, false).await?;

    let err = catalog_service::parse_catalog(b"goods: {not: [a list").unwrap_err();
    assert!(matches!(err, AppError::Parse(_)));

    let bad = CATALOG.replace("category: 2", "category: 7");
    let err = sync(&state, &partner, &bad).await.unwrap_err();
    assert!(matches!(err.downcast_ref::<AppError>(), Some(AppError::Parse(_))));
    assert_eq!(Categories::find().count(&state.orm).await?, 0);
    Ok(())
}

#[tokio::test]
async fn fetch_rejects_non_http_urls() -> anyhow::Result<()> {
    let (state, _rx) = setup_state().await?;
    for url in ["not a url", "ftp://example.com/catalog.yaml"] {
        let err = catalog_service::fetch_catalog(&state, url).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidFields(_)), "{url}");
    }
    Ok(())
}

#[tokio::test]
async fn closed_shops_disappear_from_browsing() -> anyhow::Result<()> {
    let (state, _rx) = setup_state().await?;
    let (_, partner) = create_user(&state, "shop@example.com", UserType::Shop, false).await?;
    sync(&state, &partner, CATALOG).await?;

    let shops = catalog_service::list_shops(&state).await?.data.unwrap();
    assert_eq!(shops.items.len(), 1);
    let products = catalog_service::list_product_infos(&state, ProductQuery::default())
        .await?
        .data
        .unwrap();
    assert_eq!(products.items.len(), 3);
    let phone = products
        .items
        .iter()
        .find(|p| p.external_id == 100)
        .unwrap();
    assert_eq!(phone.category, "Phones");
    assert_eq!(phone.shop.name, "Gadget Hub");
    assert_eq!(phone.parameters.len(), 2);

    let cheap = catalog_service::list_product_infos(
        &state,
        ProductQuery {
            max_price: Some(100),
            ..Default::default()
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(cheap.items.len(), 1);

    let shop = catalog_service::set_shop_state(&state, &partner, false)
        .await?
        .data
        .unwrap();
    assert!(!shop.state);

    assert!(catalog_service::list_shops(&state).await?.data.unwrap().items.is_empty());
    let products = catalog_service::list_product_infos(&state, ProductQuery::default())
        .await?
        .data
        .unwrap();
    assert!(products.items.is_empty());
    Ok(())
}
