use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};

use crate::{
    dto::catalog::{CategoryList, ProductInfoList, ShopList},
    error::AppResult,
    response::ApiResponse,
    routes::params::ProductQuery,
    services::catalog_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/shops", get(list_shops))
        .route("/categories", get(list_categories))
        .route("/products", get(list_products))
}

#[utoipa::path(
    get,
    path = "/api/shops",
    responses(
        (status = 200, description = "Shops currently accepting orders", body = ApiResponse<ShopList>)
    ),
    tag = "Catalog"
)]
pub async fn list_shops(State(state): State<AppState>) -> AppResult<Json<ApiResponse<ShopList>>> {
    let resp = catalog_service::list_shops(&state).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/categories",
    responses(
        (status = 200, description = "All categories", body = ApiResponse<CategoryList>)
    ),
    tag = "Catalog"
)]
pub async fn list_categories(
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<CategoryList>>> {
    let resp = catalog_service::list_categories(&state).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/products",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
        ("shop_id" = Option<String>, Query, description = "Only listings of this shop"),
        ("category_id" = Option<String>, Query, description = "Only listings in this category"),
        ("q" = Option<String>, Query, description = "Search in product name or model"),
        ("min_price" = Option<i64>, Query, description = "Minimum price"),
        ("max_price" = Option<i64>, Query, description = "Maximum price"),
        ("sort_by" = Option<String>, Query, description = "Sort by: name, price, quantity"),
        ("sort_order" = Option<String>, Query, description = "Sort order: asc, desc")
    ),
    responses(
        (status = 200, description = "Listings from accepting shops", body = ApiResponse<ProductInfoList>)
    ),
    tag = "Catalog"
)]
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductQuery>,
) -> AppResult<Json<ApiResponse<ProductInfoList>>> {
    let resp = catalog_service::list_product_infos(&state, query).await?;
    Ok(Json(resp))
}
