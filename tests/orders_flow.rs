mod common;

use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use shop_orders_api::{
    dto::{
        basket::{AddBasketItemsRequest, BasketItemUpdate, NewBasketItem, UpdateBasketItemsRequest},
        contacts::DeleteItemsRequest,
        orders::{CheckoutRequest, UpdateOrderStateRequest},
    },
    entity::orders::{Column as OrderCol, Entity as Orders},
    error::AppError,
    models::{OrderState, UserType},
    notify::NotificationKind,
    routes::params::{OrderListQuery, ProductQuery},
    services::{admin_service, catalog_service, order_service},
};
use uuid::Uuid;

use common::{CATALOG, add_contact, create_user, listing, listings, setup_state, sync};

#[tokio::test]
async fn one_basket_per_user() -> anyhow::Result<()> {
    let (state, _rx) = setup_state().await?;
    let (buyer, _) = create_user(&state, "buyer@example.com", UserType::Buyer, false).await?;

    let first = order_service::get_or_create_basket(&state.orm, buyer.id).await?;
    let second = order_service::get_or_create_basket(&state.orm, buyer.id).await?;
    assert_eq!(first.id, second.id);

    let baskets = Orders::find()
        .filter(OrderCol::UserId.eq(buyer.id))
        .filter(OrderCol::State.eq("basket"))
        .count(&state.orm)
        .await?;
    assert_eq!(baskets, 1);
    Ok(())
}

#[tokio::test]
async fn add_item_validates_quantity_and_listing() -> anyhow::Result<()> {
    let (state, _rx) = setup_state().await?;
    let (_, partner) = create_user(&state, "shop@example.com", UserType::Shop, false).await?;
    let (buyer, buyer_auth) =
        create_user(&state, "buyer@example.com", UserType::Buyer, false).await?;
    sync(&state, &partner, CATALOG).await?;
    let goods = listings(&state, "Gadget Hub").await?;

    let basket = order_service::get_or_create_basket(&state.orm, buyer.id).await?;

    for quantity in [0, -3] {
        let err = order_service::add_item(&state.orm, &basket, goods[0].id, quantity)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
    let err = order_service::add_item(&state.orm, &basket, Uuid::new_v4(), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    order_service::add_item(&state.orm, &basket, goods[0].id, 1).await?;
    let merged = order_service::add_item(&state.orm, &basket, goods[0].id, 2).await?;
    assert_eq!(merged.quantity, 3);
    order_service::add_item(&state.orm, &basket, goods[2].id, 1).await?;

    let view = order_service::get_basket(&state, &buyer_auth).await?.data.unwrap();
    assert_eq!(view.order.id, basket.id);
    assert_eq!(view.items.len(), 2);
    assert_eq!(view.total_sum, 3 * 500 + 20);
    Ok(())
}

#[tokio::test]
async fn batch_add_is_all_or_nothing() -> anyhow::Result<()> {
    let (state, _rx) = setup_state().await?;
    let (_, partner) = create_user(&state, "shop@example.com", UserType::Shop, false).await?;
    let (_, buyer) = create_user(&state, "buyer@example.com", UserType::Buyer, false).await?;
    sync(&state, &partner, CATALOG).await?;
    let goods = listings(&state, "Gadget Hub").await?;

    let err = order_service::add_items(
        &state,
        &buyer,
        AddBasketItemsRequest {
            items: vec![
                NewBasketItem {
                    product_info: goods[0].id,
                    quantity: 1,
                },
                NewBasketItem {
                    product_info: Uuid::new_v4(),
                    quantity: 1,
                },
            ],
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let basket = order_service::get_basket(&state, &buyer).await?.data.unwrap();
    assert!(basket.items.is_empty());
    assert_eq!(basket.total_sum, 0);
    Ok(())
}

#[tokio::test]
async fn checkout_rejects_empty_basket_and_foreign_contact() -> anyhow::Result<()> {
    let (state, _rx) = setup_state().await?;
    let (_, partner) = create_user(&state, "shop@example.com", UserType::Shop, false).await?;
    let (_, buyer) = create_user(&state, "buyer@example.com", UserType::Buyer, false).await?;
    let (_, other) = create_user(&state, "other@example.com", UserType::Buyer, false).await?;
    sync(&state, &partner, CATALOG).await?;
    let goods = listings(&state, "Gadget Hub").await?;

    let own_contact = add_contact(&state, &buyer).await?;
    let foreign_contact = add_contact(&state, &other).await?;
    let basket = order_service::get_basket(&state, &buyer).await?.data.unwrap();

    let err = order_service::checkout(
        &state,
        &buyer,
        CheckoutRequest {
            id: basket.order.id,
            contact: own_contact,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    order_service::add_items(
        &state,
        &buyer,
        AddBasketItemsRequest {
            items: vec![NewBasketItem {
                product_info: goods[0].id,
                quantity: 1,
            }],
        },
    )
    .await?;

    let err = order_service::checkout(
        &state,
        &buyer,
        CheckoutRequest {
            id: basket.order.id,
            contact: foreign_contact,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    assert_eq!(listing(&state, goods[0].id).await?.quantity, 10);
    Ok(())
}

#[tokio::test]
async fn checkout_takes_stock_and_notifies_once() -> anyhow::Result<()> {
    let (state, mut rx) = setup_state().await?;
    let (_, partner) = create_user(&state, "shop@example.com", UserType::Shop, false).await?;
    let (_, buyer) = create_user(&state, "buyer@example.com", UserType::Buyer, false).await?;
    sync(&state, &partner, CATALOG).await?;
    let goods = listings(&state, "Gadget Hub").await?;
    let contact = add_contact(&state, &buyer).await?;

    order_service::add_items(
        &state,
        &buyer,
        AddBasketItemsRequest {
            items: vec![
                NewBasketItem {
                    product_info: goods[0].id,
                    quantity: 4,
                },
                NewBasketItem {
                    product_info: goods[2].id,
                    quantity: 2,
                },
            ],
        },
    )
    .await?;
    let basket = order_service::get_basket(&state, &buyer).await?.data.unwrap();
    assert_eq!(basket.total_sum, 4 * 500 + 2 * 20);

    let placed = order_service::checkout(
        &state,
        &buyer,
        CheckoutRequest {
            id: basket.order.id,
            contact,
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(placed.order.state, OrderState::New);
    assert_eq!(placed.order.contact_id, Some(contact));
    assert_eq!(placed.total_sum, 2040);

    assert_eq!(listing(&state, goods[0].id).await?.quantity, 6);
    assert_eq!(listing(&state, goods[2].id).await?.quantity, 98);

    let note = rx.try_recv()?;
    assert_eq!(note.kind, NotificationKind::OrderStatus);
    assert_eq!(note.recipient, "buyer@example.com");
    assert_eq!(note.payload["state"], "new");
    assert!(rx.try_recv().is_err());

    // A placed order is frozen and a new basket takes its place.
    let order_model = Orders::find_by_id(placed.order.id)
        .one(&state.orm)
        .await?
        .unwrap();
    let err = order_service::add_item(&state.orm, &order_model, goods[1].id, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::State(_)));
    let fresh = order_service::get_basket(&state, &buyer).await?.data.unwrap();
    assert_ne!(fresh.order.id, placed.order.id);

    let history = order_service::list_orders(&state, &buyer, OrderListQuery::default())
        .await?
        .data
        .unwrap();
    assert_eq!(history.items.len(), 1);
    assert_eq!(history.items[0].total_sum, 2040);
    assert!(history.items[0].contact.is_some());
    Ok(())
}

#[tokio::test]
async fn checkout_rejects_overstock_and_closed_shops() -> anyhow::Result<()> {
    let (state, mut rx) = setup_state().await?;
    let (_, partner) = create_user(&state, "shop@example.com", UserType::Shop, false).await?;
    let (_, buyer) = create_user(&state, "buyer@example.com", UserType::Buyer, false).await?;
    sync(&state, &partner, CATALOG).await?;
    let goods = listings(&state, "Gadget Hub").await?;
    let contact = add_contact(&state, &buyer).await?;

    order_service::add_items(
        &state,
        &buyer,
        AddBasketItemsRequest {
            items: vec![NewBasketItem {
                product_info: goods[1].id,
                quantity: 6,
            }],
        },
    )
    .await?;
    let basket = order_service::get_basket(&state, &buyer).await?.data.unwrap();
    let request = || CheckoutRequest {
        id: basket.order.id,
        contact,
    };

    let err = order_service::checkout(&state, &buyer, request()).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(listing(&state, goods[1].id).await?.quantity, 5);

    let line = basket.items[0].id;
    let basket_model = Orders::find_by_id(basket.order.id).one(&state.orm).await?.unwrap();
    order_service::update_item(&state.orm, &basket_model, line, 5).await?;

    catalog_service::set_shop_state(&state, &partner, false).await?;
    let err = order_service::checkout(&state, &buyer, request()).await.unwrap_err();
    assert!(matches!(err, AppError::State(_)));

    catalog_service::set_shop_state(&state, &partner, true).await?;
    order_service::checkout(&state, &buyer, request()).await?;
    assert_eq!(listing(&state, goods[1].id).await?.quantity, 0);
    assert!(rx.try_recv().is_ok());
    Ok(())
}

#[tokio::test]
async fn staff_moves_orders_and_cancel_restocks() -> anyhow::Result<()> {
    let (state, mut rx) = setup_state().await?;
    let (_, partner) = create_user(&state, "shop@example.com", UserType::Shop, false).await?;
    let (_, buyer) = create_user(&state, "buyer@example.com", UserType::Buyer, false).await?;
    let (_, staff) = create_user(&state, "staff@example.com", UserType::Buyer, true).await?;
    sync(&state, &partner, CATALOG).await?;
    let goods = listings(&state, "Gadget Hub").await?;
    let contact = add_contact(&state, &buyer).await?;

    order_service::add_items(
        &state,
        &buyer,
        AddBasketItemsRequest {
            items: vec![NewBasketItem {
                product_info: goods[0].id,
                quantity: 3,
            }],
        },
    )
    .await?;
    let basket = order_service::get_basket(&state, &buyer).await?.data.unwrap();
    order_service::checkout(
        &state,
        &buyer,
        CheckoutRequest {
            id: basket.order.id,
            contact,
        },
    )
    .await?;
    let _ = rx.try_recv()?;
    assert_eq!(listing(&state, goods[0].id).await?.quantity, 7);

    let err = admin_service::update_order_state(
        &state,
        &buyer,
        basket.order.id,
        UpdateOrderStateRequest {
            state: OrderState::Confirmed,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Authorization(_)));

    let err = admin_service::update_order_state(
        &state,
        &staff,
        basket.order.id,
        UpdateOrderStateRequest {
            state: OrderState::Delivered,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::State(_)));

    let confirmed = admin_service::update_order_state(
        &state,
        &staff,
        basket.order.id,
        UpdateOrderStateRequest {
            state: OrderState::Confirmed,
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(confirmed.state, OrderState::Confirmed);
    assert_eq!(rx.try_recv()?.payload["state"], "confirmed");

    admin_service::update_order_state(
        &state,
        &staff,
        basket.order.id,
        UpdateOrderStateRequest {
            state: OrderState::Canceled,
        },
    )
    .await?;
    assert_eq!(listing(&state, goods[0].id).await?.quantity, 10);

    let err = admin_service::update_order_state(
        &state,
        &staff,
        basket.order.id,
        UpdateOrderStateRequest {
            state: OrderState::New,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::State(_)));
    Ok(())
}

#[tokio::test]
async fn partners_see_only_their_lines() -> anyhow::Result<()> {
    let (state, _rx) = setup_state().await?;
    let (_, partner) = create_user(&state, "shop@example.com", UserType::Shop, false).await?;
    let (_, rival) = create_user(&state, "rival@example.com", UserType::Shop, false).await?;
    let (_, buyer) = create_user(&state, "buyer@example.com", UserType::Buyer, false).await?;
    sync(&state, &partner, CATALOG).await?;
    sync(&state, &rival, &CATALOG.replace("Gadget Hub", "Rival Store")).await?;
    let ours = listings(&state, "Gadget Hub").await?;
    let theirs = listings(&state, "Rival Store").await?;
    let contact = add_contact(&state, &buyer).await?;

    order_service::add_items(
        &state,
        &buyer,
        AddBasketItemsRequest {
            items: vec![
                NewBasketItem {
                    product_info: ours[0].id,
                    quantity: 1,
                },
                NewBasketItem {
                    product_info: theirs[2].id,
                    quantity: 2,
                },
            ],
        },
    )
    .await?;
    let basket = order_service::get_basket(&state, &buyer).await?.data.unwrap();

    let before = order_service::list_partner_orders(&state, &partner, OrderListQuery::default())
        .await?
        .data
        .unwrap();
    assert!(before.items.is_empty(), "baskets are not partner orders");

    order_service::checkout(
        &state,
        &buyer,
        CheckoutRequest {
            id: basket.order.id,
            contact,
        },
    )
    .await?;

    let orders = order_service::list_partner_orders(&state, &partner, OrderListQuery::default())
        .await?
        .data
        .unwrap();
    assert_eq!(orders.items.len(), 1);
    assert_eq!(orders.items[0].items.len(), 1);
    assert_eq!(orders.items[0].items[0].shop, "Gadget Hub");
    assert_eq!(orders.items[0].total_sum, 500);

    let err = order_service::list_partner_orders(&state, &buyer, OrderListQuery::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Authorization(_)));
    Ok(())
}

#[tokio::test]
async fn basket_lines_can_be_changed_and_removed() -> anyhow::Result<()> {
    let (state, _rx) = setup_state().await?;
    let (_, partner) = create_user(&state, "shop@example.com", UserType::Shop, false).await?;
    let (_, buyer) = create_user(&state, "buyer@example.com", UserType::Buyer, false).await?;
    let (other, other_auth) =
        create_user(&state, "other@example.com", UserType::Buyer, false).await?;
    sync(&state, &partner, CATALOG).await?;
    let goods = listings(&state, "Gadget Hub").await?;

    order_service::add_items(
        &state,
        &buyer,
        AddBasketItemsRequest {
            items: vec![
                NewBasketItem {
                    product_info: goods[0].id,
                    quantity: 1,
                },
                NewBasketItem {
                    product_info: goods[2].id,
                    quantity: 1,
                },
            ],
        },
    )
    .await?;
    let basket = order_service::get_basket(&state, &buyer).await?.data.unwrap();
    let line_for = |info: Uuid| {
        basket
            .items
            .iter()
            .find(|item| item.product_info == info)
            .map(|item| item.id)
            .unwrap()
    };
    let phone_line = line_for(goods[0].id);
    let case_line = line_for(goods[2].id);

    let other_basket = order_service::get_or_create_basket(&state.orm, other.id).await?;
    let foreign_line = order_service::add_item(&state.orm, &other_basket, goods[1].id, 1)
        .await?
        .id;

    order_service::update_items(
        &state,
        &buyer,
        UpdateBasketItemsRequest {
            items: vec![BasketItemUpdate {
                id: phone_line,
                quantity: 4,
            }],
        },
    )
    .await?;
    let view = order_service::get_basket(&state, &buyer).await?.data.unwrap();
    assert_eq!(view.total_sum, 4 * 500 + 20);

    let err = order_service::update_items(
        &state,
        &buyer,
        UpdateBasketItemsRequest {
            items: vec![
                BasketItemUpdate {
                    id: case_line,
                    quantity: 7,
                },
                BasketItemUpdate {
                    id: foreign_line,
                    quantity: 2,
                },
            ],
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::NotFound));
    let view = order_service::get_basket(&state, &buyer).await?.data.unwrap();
    assert_eq!(view.total_sum, 4 * 500 + 20, "failed batch left no trace");

    let basket_model = Orders::find_by_id(basket.order.id).one(&state.orm).await?.unwrap();
    let err = order_service::remove_item(&state.orm, &basket_model, foreign_line)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound));
    let theirs = order_service::get_basket(&state, &other_auth).await?.data.unwrap();
    assert_eq!(theirs.items.len(), 1);

    let removed = order_service::remove_items(
        &state,
        &buyer,
        DeleteItemsRequest {
            items: format!("{case_line},{case_line}"),
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(removed.count, 1);

    let err = order_service::remove_items(
        &state,
        &buyer,
        DeleteItemsRequest {
            items: case_line.to_string(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::NotFound));

    let view = order_service::get_basket(&state, &buyer).await?.data.unwrap();
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].id, phone_line);
    Ok(())
}

#[tokio::test]
async fn placed_orders_reject_line_edits() -> anyhow::Result<()> {
    let (state, mut rx) = setup_state().await?;
    let (_, partner) = create_user(&state, "shop@example.com", UserType::Shop, false).await?;
    let (_, buyer) = create_user(&state, "buyer@example.com", UserType::Buyer, false).await?;
    sync(&state, &partner, CATALOG).await?;
    let goods = listings(&state, "Gadget Hub").await?;
    let contact = add_contact(&state, &buyer).await?;

    order_service::add_items(
        &state,
        &buyer,
        AddBasketItemsRequest {
            items: vec![NewBasketItem {
                product_info: goods[0].id,
                quantity: 2,
            }],
        },
    )
    .await?;
    let basket = order_service::get_basket(&state, &buyer).await?.data.unwrap();
    let line = basket.items[0].id;
    order_service::checkout(
        &state,
        &buyer,
        CheckoutRequest {
            id: basket.order.id,
            contact,
        },
    )
    .await?;
    let _ = rx.try_recv()?;

    let placed = Orders::find_by_id(basket.order.id).one(&state.orm).await?.unwrap();
    let err = order_service::update_item(&state.orm, &placed, line, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::State(_)));
    let err = order_service::remove_item(&state.orm, &placed, line)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::State(_)));

    let order = order_service::get_order(&state, &buyer, placed.id)
        .await?
        .data
        .unwrap();
    assert_eq!(order.items[0].quantity, 2);
    Ok(())
}

#[tokio::test]
async fn sold_out_listings_cannot_be_ordered() -> anyhow::Result<()> {
    let (state, mut rx) = setup_state().await?;
    let (_, partner) = create_user(&state, "shop@example.com", UserType::Shop, false).await?;
    let (_, buyer) = create_user(&state, "buyer@example.com", UserType::Buyer, false).await?;
    let (next, _) = create_user(&state, "next@example.com", UserType::Buyer, false).await?;
    sync(&state, &partner, CATALOG).await?;
    let goods = listings(&state, "Gadget Hub").await?;
    let contact = add_contact(&state, &buyer).await?;

    order_service::add_items(
        &state,
        &buyer,
        AddBasketItemsRequest {
            items: vec![NewBasketItem {
                product_info: goods[1].id,
                quantity: 5,
            }],
        },
    )
    .await?;
    let basket = order_service::get_basket(&state, &buyer).await?.data.unwrap();
    order_service::checkout(
        &state,
        &buyer,
        CheckoutRequest {
            id: basket.order.id,
            contact,
        },
    )
    .await?;
    let _ = rx.try_recv()?;
    assert_eq!(listing(&state, goods[1].id).await?.quantity, 0);

    let next_basket = order_service::get_or_create_basket(&state.orm, next.id).await?;
    let err = order_service::add_item(&state.orm, &next_basket, goods[1].id, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let browsable = catalog_service::list_product_infos(&state, ProductQuery::default())
        .await?
        .data
        .unwrap();
    assert_eq!(browsable.items.len(), 2);
    assert!(browsable.items.iter().all(|p| p.id != goods[1].id));
    Ok(())
}

#[tokio::test]
async fn huge_prices_do_not_overflow_totals() -> anyhow::Result<()> {
    let (state, _rx) = setup_state().await?;
    let (_, partner) = create_user(&state, "shop@example.com", UserType::Shop, false).await?;
    let (buyer, buyer_auth) =
        create_user(&state, "buyer@example.com", UserType::Buyer, false).await?;
    sync(&state, &partner, &CATALOG.replace("price: 500", "price: 1000000000000")).await?;
    let goods = listings(&state, "Gadget Hub").await?;

    let basket = order_service::get_or_create_basket(&state.orm, buyer.id).await?;
    order_service::add_item(&state.orm, &basket, goods[0].id, i32::MAX).await?;

    let view = order_service::get_basket(&state, &buyer_auth).await?.data.unwrap();
    assert_eq!(view.total_sum, i64::MAX);
    Ok(())
}
