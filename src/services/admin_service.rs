use chrono::Utc;
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, QueryFilter, QuerySelect, Set,
    TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::{
        basket::OrderWithItems,
        orders::{OrderList, UpdateOrderStateRequest},
    },
    entity::{
        order_items::{Column as OrderItemCol, Entity as OrderItems},
        orders::{ActiveModel as OrderActive, Entity as Orders},
        product_infos::{Column as InfoCol, Entity as ProductInfos},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_staff},
    models::{Order, OrderState},
    response::{ApiResponse, Meta},
    routes::params::OrderListQuery,
    services::order_service::{list_placed_orders, notify_state, with_items},
    state::AppState,
};

pub async fn list_all_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_staff(user)?;
    list_placed_orders(state, Condition::all(), query).await
}

pub async fn get_order_admin(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    ensure_staff(user)?;
    let order = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let data = with_items(&state.orm, order, None).await?;
    Ok(ApiResponse::success("Order found", data, Some(Meta::empty())))
}

/// Moves a placed order through its lifecycle. Canceling gives the stock back.
pub async fn update_order_state(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOrderStateRequest,
) -> AppResult<ApiResponse<Order>> {
    ensure_staff(user)?;

    let txn = state.orm.begin().await?;
    let existing = Orders::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let current = OrderState::parse(&existing.state)?;
    let next = payload.state;
    if !current.can_transition_to(next) {
        return Err(AppError::State(format!(
            "Cannot move order from '{current}' to '{next}'"
        )));
    }

    if next == OrderState::Canceled && current.holds_stock() {
        let items = OrderItems::find()
            .filter(OrderItemCol::OrderId.eq(existing.id))
            .all(&txn)
            .await?;
        for item in &items {
            ProductInfos::update_many()
                .col_expr(InfoCol::Quantity, Expr::col(InfoCol::Quantity).add(item.quantity))
                .filter(InfoCol::Id.eq(item.product_info_id))
                .exec(&txn)
                .await?;
        }
        tracing::info!(order_id = %existing.id, lines = items.len(), "stock restored");
    }

    let mut active: OrderActive = existing.into();
    active.state = Set(next.as_str().to_string());
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&txn).await?;

    txn.commit().await?;

    notify_state(state, &order).await;
    audit::record(
        &state.orm,
        Some(user.user_id),
        "order_state_update",
        "orders",
        serde_json::json!({ "order_id": order.id, "from": current.as_str(), "to": next.as_str() }),
    )
    .await;

    Ok(ApiResponse::success(
        "Order updated",
        Order::try_from(order)?,
        Some(Meta::empty()),
    ))
}
