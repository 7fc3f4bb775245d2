use axum::{
    Json, Router,
    extract::State,
    routing::get,
};

use crate::{
    dto::{
        basket::{AddBasketItemsRequest, OrderWithItems, UpdateBasketItemsRequest},
        contacts::DeleteItemsRequest,
    },
    error::AppResult,
    middleware::auth::AuthUser,
    response::{Affected, ApiResponse},
    services::order_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/",
        get(get_basket)
            .post(add_items)
            .put(update_items)
            .delete(remove_items),
    )
}

#[utoipa::path(
    get,
    path = "/api/basket",
    responses(
        (status = 200, description = "Current basket with items and total", body = ApiResponse<OrderWithItems>),
        (status = 403, description = "Not authenticated")
    ),
    security(("bearer_auth" = [])),
    tag = "Basket"
)]
pub async fn get_basket(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<OrderWithItems>>> {
    let resp = order_service::get_basket(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/basket",
    request_body = AddBasketItemsRequest,
    responses(
        (status = 200, description = "Items added", body = ApiResponse<Affected>),
        (status = 400, description = "Bad quantity or unknown listing"),
        (status = 403, description = "Not authenticated")
    ),
    security(("bearer_auth" = [])),
    tag = "Basket"
)]
pub async fn add_items(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<AddBasketItemsRequest>,
) -> AppResult<Json<ApiResponse<Affected>>> {
    let resp = order_service::add_items(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/basket",
    request_body = UpdateBasketItemsRequest,
    responses(
        (status = 200, description = "Quantities updated", body = ApiResponse<Affected>),
        (status = 400, description = "Bad quantity"),
        (status = 404, description = "Item not in basket"),
        (status = 403, description = "Not authenticated")
    ),
    security(("bearer_auth" = [])),
    tag = "Basket"
)]
pub async fn update_items(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<UpdateBasketItemsRequest>,
) -> AppResult<Json<ApiResponse<Affected>>> {
    let resp = order_service::update_items(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/basket",
    request_body = DeleteItemsRequest,
    responses(
        (status = 200, description = "Items removed", body = ApiResponse<Affected>),
        (status = 404, description = "Item not in basket"),
        (status = 403, description = "Not authenticated")
    ),
    security(("bearer_auth" = [])),
    tag = "Basket"
)]
pub async fn remove_items(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<DeleteItemsRequest>,
) -> AppResult<Json<ApiResponse<Affected>>> {
    let resp = order_service::remove_items(&state, &user, payload).await?;
    Ok(Json(resp))
}
