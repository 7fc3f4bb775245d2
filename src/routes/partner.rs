use axum::{
    Json, Router,
    extract::{Query, State},
    routing::{get, post},
};

use crate::{
    dto::{
        catalog::{PartnerStateRequest, PartnerUpdateRequest, SyncReport},
        orders::PartnerOrderList,
    },
    error::AppResult,
    middleware::auth::AuthUser,
    models::Shop,
    response::ApiResponse,
    routes::params::OrderListQuery,
    services::{catalog_service, order_service},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/update", post(update_catalog))
        .route("/state", get(get_state).post(set_state))
        .route("/orders", get(list_orders))
}

#[utoipa::path(
    post,
    path = "/api/partner/update",
    request_body = PartnerUpdateRequest,
    responses(
        (status = 200, description = "Catalog fetched and synchronized", body = ApiResponse<SyncReport>),
        (status = 400, description = "Bad URL or unreachable catalog"),
        (status = 403, description = "Not a shop account"),
        (status = 422, description = "Malformed catalog document")
    ),
    security(("bearer_auth" = [])),
    tag = "Partner"
)]
pub async fn update_catalog(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<PartnerUpdateRequest>,
) -> AppResult<Json<ApiResponse<SyncReport>>> {
    let resp = catalog_service::update_from_url(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/partner/state",
    responses(
        (status = 200, description = "The partner's shop", body = ApiResponse<Shop>),
        (status = 403, description = "Not a shop account"),
        (status = 404, description = "No shop yet")
    ),
    security(("bearer_auth" = [])),
    tag = "Partner"
)]
pub async fn get_state(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<Shop>>> {
    let resp = catalog_service::get_shop_state(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/partner/state",
    request_body = PartnerStateRequest,
    responses(
        (status = 200, description = "Order intake switched on or off", body = ApiResponse<Shop>),
        (status = 403, description = "Not a shop account"),
        (status = 404, description = "No shop yet")
    ),
    security(("bearer_auth" = [])),
    tag = "Partner"
)]
pub async fn set_state(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<PartnerStateRequest>,
) -> AppResult<Json<ApiResponse<Shop>>> {
    let resp = catalog_service::set_shop_state(&state, &user, payload.state).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/partner/orders",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
        ("state" = Option<String>, Query, description = "Filter by order state"),
        ("sort_order" = Option<String>, Query, description = "Sort order: asc, desc")
    ),
    responses(
        (status = 200, description = "Placed orders containing this shop's listings", body = ApiResponse<PartnerOrderList>),
        (status = 403, description = "Not a shop account")
    ),
    security(("bearer_auth" = [])),
    tag = "Partner"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<OrderListQuery>,
) -> AppResult<Json<ApiResponse<PartnerOrderList>>> {
    let resp = order_service::list_partner_orders(&state, &user, query).await?;
    Ok(Json(resp))
}
