use std::collections::{HashMap, HashSet};

use chrono::Utc;
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, FromQueryResult,
    JoinType, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, QueryTrait, RelationTrait, Set,
    TransactionTrait,
};
use serde_json::json;
use uuid::Uuid;

use crate::{
    audit,
    dto::{
        basket::{AddBasketItemsRequest, OrderWithItems, UpdateBasketItemsRequest},
        contacts::DeleteItemsRequest,
        orders::{CheckoutRequest, OrderList, OrderSummary, PartnerOrderList},
    },
    entity::{
        contacts::{Column as ContactCol, Entity as Contacts},
        order_items::{
            ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems,
            Model as OrderItemModel, Relation as OrderItemRel,
        },
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel},
        product_infos::{Column as InfoCol, Entity as ProductInfos, Relation as InfoRel},
        products::Column as ProductCol,
        shops::Column as ShopCol,
        users::Entity as Users,
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_partner},
    models::{Contact, Order, OrderItem, OrderState},
    notify::NotificationKind,
    response::{Affected, ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    services::{catalog_service::partner_shop, contact_service::parse_id_list},
    state::AppState,
};

async fn find_basket<C: ConnectionTrait>(conn: &C, user_id: Uuid) -> AppResult<Option<OrderModel>> {
    Ok(Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user_id))
                .add(OrderCol::State.eq(OrderState::Basket.as_str())),
        )
        .one(conn)
        .await?)
}

/// Returns the user's basket, creating it on first use.
///
/// Must not be called inside a transaction: a lost race on the one-basket-per-user index
/// is recovered by reading the winner's row, which an aborted transaction cannot do.
pub async fn get_or_create_basket<C: ConnectionTrait>(conn: &C, user_id: Uuid) -> AppResult<OrderModel> {
    if let Some(order) = find_basket(conn, user_id).await? {
        return Ok(order);
    }

    let now = Utc::now();
    let inserted = OrderActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        state: Set(OrderState::Basket.as_str().to_string()),
        contact_id: Set(None),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(conn)
    .await;

    match inserted {
        Ok(order) => Ok(order),
        Err(err) => match find_basket(conn, user_id).await? {
            Some(order) => {
                tracing::debug!(%user_id, "basket created concurrently, reusing it");
                Ok(order)
            }
            None => Err(err.into()),
        },
    }
}

fn ensure_basket(order: &OrderModel) -> AppResult<()> {
    if order.state == OrderState::Basket.as_str() {
        Ok(())
    } else {
        Err(AppError::State(format!(
            "Order {} is '{}' and can no longer be edited",
            order.id, order.state
        )))
    }
}

fn ensure_positive(quantity: i32) -> AppResult<()> {
    if quantity <= 0 {
        return Err(AppError::Validation("Quantity must be greater than zero".into()));
    }
    Ok(())
}

/// Adds `quantity` units of a listing, merging with an existing line for the same listing.
pub async fn add_item<C: ConnectionTrait>(
    conn: &C,
    order: &OrderModel,
    product_info_id: Uuid,
    quantity: i32,
) -> AppResult<OrderItemModel> {
    ensure_positive(quantity)?;
    ensure_basket(order)?;

    let listing = ProductInfos::find_by_id(product_info_id)
        .one(conn)
        .await?
        .ok_or_else(|| {
            AppError::Validation(format!("Product listing {product_info_id} not found"))
        })?;
    if listing.quantity == 0 {
        return Err(AppError::Validation(format!(
            "Product listing {product_info_id} is out of stock"
        )));
    }

    let existing = OrderItems::find()
        .filter(
            Condition::all()
                .add(OrderItemCol::OrderId.eq(order.id))
                .add(OrderItemCol::ProductInfoId.eq(product_info_id)),
        )
        .one(conn)
        .await?;

    let item = match existing {
        Some(item) => {
            let total = item.quantity.checked_add(quantity).ok_or_else(|| {
                AppError::Validation("Quantity is too large".into())
            })?;
            let mut active: OrderItemActive = item.into();
            active.quantity = Set(total);
            active.update(conn).await?
        }
        None => {
            OrderItemActive {
                id: Set(Uuid::new_v4()),
                order_id: Set(order.id),
                product_info_id: Set(product_info_id),
                quantity: Set(quantity),
                created_at: Set(Utc::now().into()),
            }
            .insert(conn)
            .await?
        }
    };

    Ok(item)
}

pub async fn update_item<C: ConnectionTrait>(
    conn: &C,
    order: &OrderModel,
    item_id: Uuid,
    quantity: i32,
) -> AppResult<OrderItemModel> {
    ensure_basket(order)?;
    ensure_positive(quantity)?;

    let item = OrderItems::find()
        .filter(
            Condition::all()
                .add(OrderItemCol::Id.eq(item_id))
                .add(OrderItemCol::OrderId.eq(order.id)),
        )
        .one(conn)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: OrderItemActive = item.into();
    active.quantity = Set(quantity);
    Ok(active.update(conn).await?)
}

pub async fn remove_item<C: ConnectionTrait>(
    conn: &C,
    order: &OrderModel,
    item_id: Uuid,
) -> AppResult<()> {
    ensure_basket(order)?;

    let result = OrderItems::delete_many()
        .filter(
            Condition::all()
                .add(OrderItemCol::Id.eq(item_id))
                .add(OrderItemCol::OrderId.eq(order.id)),
        )
        .exec(conn)
        .await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }
    Ok(())
}

pub async fn add_items(
    state: &AppState,
    user: &AuthUser,
    payload: AddBasketItemsRequest,
) -> AppResult<ApiResponse<Affected>> {
    if payload.items.is_empty() {
        return Err(AppError::field("items", "This field is required."));
    }
    for item in &payload.items {
        ensure_positive(item.quantity)?;
    }

    let basket = get_or_create_basket(&state.orm, user.user_id).await?;

    let txn = state.orm.begin().await?;
    for item in &payload.items {
        add_item(&txn, &basket, item.product_info, item.quantity).await?;
    }
    txn.commit().await?;

    tracing::debug!(order_id = %basket.id, count = payload.items.len(), "basket items added");
    Ok(ApiResponse::success(
        "Items added",
        Affected {
            count: payload.items.len() as u64,
        },
        Some(Meta::empty()),
    ))
}

pub async fn update_items(
    state: &AppState,
    user: &AuthUser,
    payload: UpdateBasketItemsRequest,
) -> AppResult<ApiResponse<Affected>> {
    if payload.items.is_empty() {
        return Err(AppError::field("items", "This field is required."));
    }
    for item in &payload.items {
        ensure_positive(item.quantity)?;
    }

    let basket = find_basket(&state.orm, user.user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let txn = state.orm.begin().await?;
    for item in &payload.items {
        update_item(&txn, &basket, item.id, item.quantity).await?;
    }
    txn.commit().await?;

    Ok(ApiResponse::success(
        "Items updated",
        Affected {
            count: payload.items.len() as u64,
        },
        Some(Meta::empty()),
    ))
}

pub async fn remove_items(
    state: &AppState,
    user: &AuthUser,
    payload: DeleteItemsRequest,
) -> AppResult<ApiResponse<Affected>> {
    let mut ids = parse_id_list(&payload.items)?;
    let mut seen = HashSet::new();
    ids.retain(|id| seen.insert(*id));

    let basket = find_basket(&state.orm, user.user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let txn = state.orm.begin().await?;
    for id in &ids {
        remove_item(&txn, &basket, *id).await?;
    }
    txn.commit().await?;

    Ok(ApiResponse::success(
        "Items deleted",
        Affected {
            count: ids.len() as u64,
        },
        Some(Meta::empty()),
    ))
}

pub async fn get_basket(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<OrderWithItems>> {
    let basket = get_or_create_basket(&state.orm, user.user_id).await?;
    let data = with_items(&state.orm, basket, None).await?;
    Ok(ApiResponse::success("OK", data, Some(Meta::empty())))
}

#[derive(Debug, FromQueryResult)]
struct CheckoutRow {
    product_info_id: Uuid,
    quantity: i32,
    stock: i32,
    shop_name: String,
    shop_state: bool,
}

/// Places the basket: stock is checked and taken inside one transaction.
pub async fn checkout(
    state: &AppState,
    user: &AuthUser,
    payload: CheckoutRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let txn = state.orm.begin().await?;

    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::Id.eq(payload.id))
                .add(OrderCol::UserId.eq(user.user_id)),
        )
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::Validation("Order not found".into()))?;
    if order.state != OrderState::Basket.as_str() {
        return Err(AppError::Validation("Only a basket can be checked out".into()));
    }

    let contact = Contacts::find()
        .filter(
            Condition::all()
                .add(ContactCol::Id.eq(payload.contact))
                .add(ContactCol::UserId.eq(user.user_id)),
        )
        .one(&txn)
        .await?;
    if contact.is_none() {
        return Err(AppError::Validation("Contact not found".into()));
    }

    let rows = OrderItems::find()
        .select_only()
        .column(OrderItemCol::ProductInfoId)
        .column(OrderItemCol::Quantity)
        .column_as(InfoCol::Quantity, "stock")
        .column_as(ShopCol::Name, "shop_name")
        .column_as(ShopCol::State, "shop_state")
        .join(JoinType::InnerJoin, OrderItemRel::ProductInfos.def())
        .join(JoinType::InnerJoin, InfoRel::Shops.def())
        .filter(OrderItemCol::OrderId.eq(order.id))
        .lock(LockType::Update)
        .into_model::<CheckoutRow>()
        .all(&txn)
        .await?;

    if rows.is_empty() {
        return Err(AppError::Validation("Basket is empty".into()));
    }

    for row in &rows {
        if !row.shop_state {
            return Err(AppError::State(format!(
                "Shop '{}' is not accepting orders",
                row.shop_name
            )));
        }
        if row.stock < row.quantity {
            return Err(AppError::Validation(format!(
                "Insufficient stock for listing {}",
                row.product_info_id
            )));
        }
    }

    for row in &rows {
        ProductInfos::update_many()
            .col_expr(InfoCol::Quantity, Expr::col(InfoCol::Quantity).sub(row.quantity))
            .filter(InfoCol::Id.eq(row.product_info_id))
            .exec(&txn)
            .await?;
    }

    let mut active: OrderActive = order.into();
    active.state = Set(OrderState::New.as_str().to_string());
    active.contact_id = Set(Some(payload.contact));
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&txn).await?;

    txn.commit().await?;

    tracing::info!(order_id = %order.id, user_id = %user.user_id, items = rows.len(), "order placed");
    notify_state(state, &order).await;
    audit::record(
        &state.orm,
        Some(user.user_id),
        "checkout",
        "orders",
        json!({ "order_id": order.id }),
    )
    .await;

    let data = with_items(&state.orm, order, None).await?;
    Ok(ApiResponse::success("Order placed", data, Some(Meta::empty())))
}

/// Queues an order status email for the order's owner.
pub(crate) async fn notify_state(state: &AppState, order: &OrderModel) {
    match Users::find_by_id(order.user_id).one(&state.orm).await {
        Ok(Some(owner)) => state.notifier.enqueue(
            NotificationKind::OrderStatus,
            &owner.email,
            json!({ "order_id": order.id.to_string(), "state": order.state }),
        ),
        Ok(None) => tracing::warn!(order_id = %order.id, "order owner vanished, no notification"),
        Err(err) => tracing::warn!(error = %err, order_id = %order.id, "could not load order owner"),
    }
}

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let condition = Condition::all().add(OrderCol::UserId.eq(user.user_id));
    list_placed_orders(state, condition, query).await
}

/// Non-basket orders matching `condition`, newest first unless asked otherwise.
pub(crate) async fn list_placed_orders(
    state: &AppState,
    condition: Condition,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination().normalize();

    let mut condition = condition.add(OrderCol::State.ne(OrderState::Basket.as_str()));
    if let Some(wanted) = query.state {
        condition = condition.add(OrderCol::State.eq(wanted.as_str()));
    }

    let order = query.sort_order.unwrap_or(SortOrder::Desc).as_order();
    let finder = Orders::find()
        .filter(condition)
        .order_by(OrderCol::CreatedAt, order)
        .order_by_asc(OrderCol::Id);

    let total = finder.clone().count(&state.orm).await? as i64;
    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?;

    let items = summarize(&state.orm, orders).await?;
    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Orders", OrderList { items }, Some(meta)))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::Id.eq(id))
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::State.ne(OrderState::Basket.as_str())),
        )
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let data = with_items(&state.orm, order, None).await?;
    Ok(ApiResponse::success("OK", data, Some(Meta::empty())))
}

pub async fn list_partner_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<PartnerOrderList>> {
    ensure_partner(user)?;
    let shop = partner_shop(state, user).await?;
    let (page, limit, offset) = query.pagination().normalize();

    let touching_shop = OrderItems::find()
        .select_only()
        .column(OrderItemCol::OrderId)
        .join(JoinType::InnerJoin, OrderItemRel::ProductInfos.def())
        .filter(InfoCol::ShopId.eq(shop.id))
        .into_query();

    let mut condition = Condition::all()
        .add(OrderCol::Id.in_subquery(touching_shop))
        .add(OrderCol::State.ne(OrderState::Basket.as_str()));
    if let Some(wanted) = query.state {
        condition = condition.add(OrderCol::State.eq(wanted.as_str()));
    }

    let order = query.sort_order.unwrap_or(SortOrder::Desc).as_order();
    let finder = Orders::find()
        .filter(condition)
        .order_by(OrderCol::CreatedAt, order)
        .order_by_asc(OrderCol::Id);

    let total = finder.clone().count(&state.orm).await? as i64;
    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?;

    let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
    let mut lines = load_items(&state.orm, &ids, Some(shop.id)).await?;
    let items = orders
        .into_iter()
        .map(|model| {
            let items = lines.remove(&model.id).unwrap_or_default();
            Ok(OrderWithItems {
                total_sum: total_sum(&items),
                order: Order::try_from(model)?,
                items,
            })
        })
        .collect::<AppResult<Vec<_>>>()?;

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Orders", PartnerOrderList { items }, Some(meta)))
}

#[derive(Debug, FromQueryResult)]
struct ItemRow {
    id: Uuid,
    order_id: Uuid,
    product_info_id: Uuid,
    quantity: i32,
    model: String,
    price: i64,
    product: String,
    shop: String,
}

/// Order lines with listing details, grouped by order id.
pub(crate) async fn load_items<C: ConnectionTrait>(
    conn: &C,
    order_ids: &[Uuid],
    shop_id: Option<Uuid>,
) -> AppResult<HashMap<Uuid, Vec<OrderItem>>> {
    if order_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let mut condition = Condition::all().add(OrderItemCol::OrderId.is_in(order_ids.to_vec()));
    if let Some(shop_id) = shop_id {
        condition = condition.add(InfoCol::ShopId.eq(shop_id));
    }

    let rows = OrderItems::find()
        .select_only()
        .column(OrderItemCol::Id)
        .column(OrderItemCol::OrderId)
        .column(OrderItemCol::ProductInfoId)
        .column(OrderItemCol::Quantity)
        .column_as(InfoCol::Model, "model")
        .column_as(InfoCol::Price, "price")
        .column_as(ProductCol::Name, "product")
        .column_as(ShopCol::Name, "shop")
        .join(JoinType::InnerJoin, OrderItemRel::ProductInfos.def())
        .join(JoinType::InnerJoin, InfoRel::Products.def())
        .join(JoinType::InnerJoin, InfoRel::Shops.def())
        .filter(condition)
        .order_by_asc(OrderItemCol::CreatedAt)
        .order_by_asc(OrderItemCol::Id)
        .into_model::<ItemRow>()
        .all(conn)
        .await?;

    let mut grouped: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
    for row in rows {
        grouped.entry(row.order_id).or_default().push(OrderItem {
            id: row.id,
            product_info: row.product_info_id,
            product: row.product,
            shop: row.shop,
            model: row.model,
            quantity: row.quantity,
            price: row.price,
        });
    }
    Ok(grouped)
}

/// Saturates at `i64::MAX` instead of wrapping on absurd prices.
pub(crate) fn total_sum(items: &[OrderItem]) -> i64 {
    items.iter().fold(0i64, |acc, item| {
        acc.saturating_add(item.price.saturating_mul(i64::from(item.quantity)))
    })
}

pub(crate) async fn with_items<C: ConnectionTrait>(
    conn: &C,
    order: OrderModel,
    shop_id: Option<Uuid>,
) -> AppResult<OrderWithItems> {
    let items = load_items(conn, &[order.id], shop_id)
        .await?
        .remove(&order.id)
        .unwrap_or_default();
    Ok(OrderWithItems {
        total_sum: total_sum(&items),
        order: Order::try_from(order)?,
        items,
    })
}

async fn summarize<C: ConnectionTrait>(
    conn: &C,
    orders: Vec<OrderModel>,
) -> AppResult<Vec<OrderSummary>> {
    let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
    let mut lines = load_items(conn, &ids, None).await?;

    let contact_ids: Vec<Uuid> = orders.iter().filter_map(|o| o.contact_id).collect();
    let contacts: HashMap<Uuid, Contact> = if contact_ids.is_empty() {
        HashMap::new()
    } else {
        Contacts::find()
            .filter(ContactCol::Id.is_in(contact_ids))
            .all(conn)
            .await?
            .into_iter()
            .map(|c| (c.id, Contact::from(c)))
            .collect()
    };

    orders
        .into_iter()
        .map(|model| {
            let items = lines.remove(&model.id).unwrap_or_default();
            let contact = model.contact_id.and_then(|id| contacts.get(&id).cloned());
            Ok(OrderSummary {
                total_sum: total_sum(&items),
                contact,
                order: Order::try_from(model)?,
            })
        })
        .collect()
}
