use std::collections::{HashMap, HashSet};

use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseTransaction, EntityTrait,
    JoinType, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, RelationTrait, Set,
    TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::catalog::{
        CatalogDocument, CategoryList, PartnerUpdateRequest, ProductInfoList, ShopList, SyncReport,
    },
    entity::{
        categories::{ActiveModel as CategoryActive, Column as CategoryCol, Entity as Categories},
        order_items::{Column as OrderItemCol, Entity as OrderItems},
        parameters::{ActiveModel as ParameterActive, Column as ParameterCol, Entity as Parameters},
        product_infos::{
            ActiveModel as InfoActive, Column as InfoCol, Entity as ProductInfos,
            Model as InfoModel, Relation as InfoRel,
        },
        product_parameters::{
            ActiveModel as ProductParameterActive, Column as ProductParameterCol,
            Entity as ProductParameters,
        },
        products::{ActiveModel as ProductActive, Column as ProductCol, Entity as Products},
        shop_categories::{ActiveModel as ShopCategoryActive, Entity as ShopCategories},
        shops::{ActiveModel as ShopActive, Column as ShopCol, Entity as Shops, Model as ShopModel},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_partner},
    models::{Category, ProductInfo, ProductParameter, Shop},
    response::{ApiResponse, Meta},
    routes::params::{ProductQuery, ProductSortBy, SortOrder},
    state::AppState,
};

// Column widths from migrations/0001_init.sql.
const SHOP_NAME_MAX: usize = 50;
const CATEGORY_NAME_MAX: usize = 40;
const PRODUCT_NAME_MAX: usize = 80;
const MODEL_MAX: usize = 80;
const PARAMETER_NAME_MAX: usize = 40;
const PARAMETER_VALUE_MAX: usize = 100;

/// Highest accepted price, in minor units.
pub const MAX_PRICE: i64 = 1_000_000_000_000;
/// Largest price list body `fetch_catalog` will read.
pub const MAX_CATALOG_BYTES: usize = 10 * 1024 * 1024;

fn ensure_len(what: &str, value: &str, max: usize) -> AppResult<()> {
    if value.chars().count() > max {
        return Err(AppError::Parse(format!("{what} is longer than {max} characters")));
    }
    Ok(())
}

/// Parses and validates a partner price list.
pub fn parse_catalog(bytes: &[u8]) -> AppResult<CatalogDocument> {
    let document: CatalogDocument =
        serde_yaml::from_slice(bytes).map_err(|e| AppError::Parse(e.to_string()))?;
    validate_document(&document)?;
    Ok(document)
}

pub fn validate_document(document: &CatalogDocument) -> AppResult<()> {
    if document.shop.trim().is_empty() {
        return Err(AppError::Parse("shop name is empty".into()));
    }
    ensure_len("shop name", &document.shop, SHOP_NAME_MAX)?;

    let mut categories = HashSet::new();
    for category in &document.categories {
        if category.name.trim().is_empty() {
            return Err(AppError::Parse(format!("category {} has no name", category.id)));
        }
        ensure_len(&format!("category {} name", category.id), &category.name, CATEGORY_NAME_MAX)?;
        if !categories.insert(category.id) {
            return Err(AppError::Parse(format!("category {} is declared twice", category.id)));
        }
    }

    let mut external_ids = HashSet::new();
    for good in &document.goods {
        if !external_ids.insert(good.id) {
            return Err(AppError::Parse(format!("good {} is listed twice", good.id)));
        }
        if good.name.trim().is_empty() {
            return Err(AppError::Parse(format!("good {} has no name", good.id)));
        }
        if !categories.contains(&good.category) {
            return Err(AppError::Parse(format!(
                "good {} refers to unknown category {}",
                good.id, good.category
            )));
        }
        if good.price < 0 || good.price_rrc < 0 || good.quantity < 0 {
            return Err(AppError::Parse(format!(
                "good {} has a negative price or quantity",
                good.id
            )));
        }
        if good.price > MAX_PRICE || good.price_rrc > MAX_PRICE {
            return Err(AppError::Parse(format!(
                "good {} has a price above {MAX_PRICE}",
                good.id
            )));
        }
        ensure_len(&format!("good {} name", good.id), &good.name, PRODUCT_NAME_MAX)?;
        ensure_len(&format!("good {} model", good.id), &good.model, MODEL_MAX)?;
        for (name, value) in &good.parameters {
            ensure_len(&format!("good {} parameter name", good.id), name, PARAMETER_NAME_MAX)?;
            ensure_len(
                &format!("good {} parameter {name}", good.id),
                &value.to_string(),
                PARAMETER_VALUE_MAX,
            )?;
        }
    }

    Ok(())
}

/// Downloads the price list published at `url`.
pub async fn fetch_catalog(state: &AppState, url: &str) -> AppResult<CatalogDocument> {
    let parsed = reqwest::Url::parse(url.trim())
        .map_err(|_| AppError::field("url", "Enter a valid URL."))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(AppError::field("url", "Only http and https URLs are supported."));
    }

    let mut response = state
        .http
        .get(parsed)
        .send()
        .await
        .map_err(|e| AppError::Validation(format!("Could not fetch catalog: {e}")))?;
    if !response.status().is_success() {
        return Err(AppError::Validation(format!(
            "Catalog source answered {}",
            response.status()
        )));
    }
    let too_large =
        || AppError::Validation(format!("Catalog is larger than {MAX_CATALOG_BYTES} bytes"));
    if response
        .content_length()
        .is_some_and(|len| len > MAX_CATALOG_BYTES as u64)
    {
        return Err(too_large());
    }

    let mut body = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| AppError::Validation(format!("Could not read catalog: {e}")))?
    {
        if body.len() + chunk.len() > MAX_CATALOG_BYTES {
            return Err(too_large());
        }
        body.extend_from_slice(&chunk);
    }

    parse_catalog(&body)
}

pub async fn update_from_url(
    state: &AppState,
    user: &AuthUser,
    payload: PartnerUpdateRequest,
) -> AppResult<ApiResponse<SyncReport>> {
    ensure_partner(user)?;
    let document = fetch_catalog(state, &payload.url).await?;
    sync_catalog(state, user, document, Some(payload.url)).await
}

/// Replaces the partner's listings with the ones in `document`.
///
/// Listings are matched on (shop, external id). Listings missing from the document are
/// deleted, or zeroed out when an order already refers to them. The whole sync runs in one
/// transaction.
pub async fn sync_catalog(
    state: &AppState,
    user: &AuthUser,
    document: CatalogDocument,
    source_url: Option<String>,
) -> AppResult<ApiResponse<SyncReport>> {
    ensure_partner(user)?;
    validate_document(&document)?;

    let txn = state.orm.begin().await?;
    let shop = claim_shop(&txn, user, &document.shop, source_url).await?;

    let mut category_ids: HashMap<i64, Uuid> = HashMap::new();
    for category in &document.categories {
        let category_id = upsert_category(&txn, category.name.trim()).await?;
        if ShopCategories::find_by_id((shop.id, category_id))
            .one(&txn)
            .await?
            .is_none()
        {
            ShopCategoryActive {
                shop_id: Set(shop.id),
                category_id: Set(category_id),
            }
            .insert(&txn)
            .await?;
        }
        category_ids.insert(category.id, category_id);
    }

    let mut existing: HashMap<i64, InfoModel> = ProductInfos::find()
        .filter(InfoCol::ShopId.eq(shop.id))
        .all(&txn)
        .await?
        .into_iter()
        .map(|info| (info.external_id, info))
        .collect();

    let mut report = SyncReport::default();
    let mut parameter_ids: HashMap<String, Uuid> = HashMap::new();

    for good in &document.goods {
        let category_id = *category_ids.get(&good.category).ok_or_else(|| {
            AppError::Parse(format!("good {} refers to unknown category", good.id))
        })?;
        let product_id = upsert_product(&txn, good.name.trim(), category_id).await?;

        let info = match existing.remove(&good.id) {
            Some(current) => {
                let mut active: InfoActive = current.into();
                active.product_id = Set(product_id);
                active.model = Set(good.model.clone());
                active.quantity = Set(good.quantity);
                active.price = Set(good.price);
                active.price_rrc = Set(good.price_rrc);
                report.updated += 1;
                active.update(&txn).await?
            }
            None => {
                report.created += 1;
                InfoActive {
                    id: Set(Uuid::new_v4()),
                    product_id: Set(product_id),
                    shop_id: Set(shop.id),
                    model: Set(good.model.clone()),
                    external_id: Set(good.id),
                    quantity: Set(good.quantity),
                    price: Set(good.price),
                    price_rrc: Set(good.price_rrc),
                }
                .insert(&txn)
                .await?
            }
        };

        let mut current_params: HashMap<Uuid, _> = ProductParameters::find()
            .filter(ProductParameterCol::ProductInfoId.eq(info.id))
            .all(&txn)
            .await?
            .into_iter()
            .map(|pp| (pp.parameter_id, pp))
            .collect();

        for (name, value) in &good.parameters {
            let parameter_id = match parameter_ids.get(name) {
                Some(id) => *id,
                None => {
                    let id = upsert_parameter(&txn, name).await?;
                    parameter_ids.insert(name.clone(), id);
                    id
                }
            };
            let value = value.to_string();
            match current_params.remove(&parameter_id) {
                Some(pp) if pp.value == value => {}
                Some(pp) => {
                    let mut active: ProductParameterActive = pp.into();
                    active.value = Set(value);
                    active.update(&txn).await?;
                }
                None => {
                    ProductParameterActive {
                        id: Set(Uuid::new_v4()),
                        product_info_id: Set(info.id),
                        parameter_id: Set(parameter_id),
                        value: Set(value),
                    }
                    .insert(&txn)
                    .await?;
                }
            }
        }

        if !current_params.is_empty() {
            let stale: Vec<Uuid> = current_params.values().map(|pp| pp.id).collect();
            ProductParameters::delete_many()
                .filter(ProductParameterCol::Id.is_in(stale))
                .exec(&txn)
                .await?;
        }
    }

    for stale in existing.into_values() {
        let referenced = OrderItems::find()
            .filter(OrderItemCol::ProductInfoId.eq(stale.id))
            .count(&txn)
            .await?
            > 0;
        if referenced {
            if stale.quantity != 0 {
                let mut active: InfoActive = stale.into();
                active.quantity = Set(0);
                active.update(&txn).await?;
                report.retired += 1;
            }
        } else {
            ProductInfos::delete_by_id(stale.id).exec(&txn).await?;
            report.deleted += 1;
        }
    }

    txn.commit().await?;

    tracing::info!(
        shop_id = %shop.id,
        created = report.created,
        updated = report.updated,
        deleted = report.deleted,
        retired = report.retired,
        "catalog synchronized"
    );
    audit::record(
        &state.orm,
        Some(user.user_id),
        "catalog_sync",
        "product_infos",
        serde_json::json!({ "shop_id": shop.id, "report": report }),
    )
    .await;

    Ok(ApiResponse::success("Catalog updated", report, Some(Meta::empty())))
}

/// Finds the shop named in the document, making sure it belongs to `user`.
async fn claim_shop(
    txn: &DatabaseTransaction,
    user: &AuthUser,
    name: &str,
    source_url: Option<String>,
) -> AppResult<ShopModel> {
    let name = name.trim();
    let by_name = Shops::find()
        .filter(ShopCol::Name.eq(name))
        .one(txn)
        .await?;

    if let Some(shop) = &by_name {
        if shop.user_id.is_some_and(|owner| owner != user.user_id) {
            return Err(AppError::Authorization(format!(
                "Shop '{name}' is managed by another partner"
            )));
        }
    }

    let owned = Shops::find()
        .filter(ShopCol::UserId.eq(user.user_id))
        .one(txn)
        .await?;

    let shop = match (by_name, owned) {
        (Some(shop), _) if shop.user_id == Some(user.user_id) => shop,
        (Some(_), Some(mine)) => {
            return Err(AppError::Validation(format!(
                "You already manage shop '{}'",
                mine.name
            )));
        }
        (Some(orphan), None) => {
            let mut active: ShopActive = orphan.into();
            active.user_id = Set(Some(user.user_id));
            active.update(txn).await?
        }
        (None, Some(mine)) => {
            tracing::info!(shop_id = %mine.id, from = %mine.name, to = name, "renaming shop");
            let mut active: ShopActive = mine.into();
            active.name = Set(name.to_string());
            active.update(txn).await?
        }
        (None, None) => {
            ShopActive {
                id: Set(Uuid::new_v4()),
                name: Set(name.to_string()),
                url: Set(None),
                user_id: Set(Some(user.user_id)),
                state: Set(true),
                created_at: Set(chrono::Utc::now().into()),
            }
            .insert(txn)
            .await?
        }
    };

    match source_url {
        Some(url) if shop.url.as_deref() != Some(url.as_str()) => {
            let mut active: ShopActive = shop.into();
            active.url = Set(Some(url));
            Ok(active.update(txn).await?)
        }
        _ => Ok(shop),
    }
}

async fn upsert_category(txn: &DatabaseTransaction, name: &str) -> AppResult<Uuid> {
    if let Some(category) = Categories::find()
        .filter(CategoryCol::Name.eq(name))
        .one(txn)
        .await?
    {
        return Ok(category.id);
    }
    let category = CategoryActive {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
    }
    .insert(txn)
    .await?;
    Ok(category.id)
}

async fn upsert_product(txn: &DatabaseTransaction, name: &str, category_id: Uuid) -> AppResult<Uuid> {
    if let Some(product) = Products::find()
        .filter(
            Condition::all()
                .add(ProductCol::Name.eq(name))
                .add(ProductCol::CategoryId.eq(category_id)),
        )
        .one(txn)
        .await?
    {
        return Ok(product.id);
    }
    let product = ProductActive {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        category_id: Set(category_id),
    }
    .insert(txn)
    .await?;
    Ok(product.id)
}

async fn upsert_parameter(txn: &DatabaseTransaction, name: &str) -> AppResult<Uuid> {
    if let Some(parameter) = Parameters::find()
        .filter(ParameterCol::Name.eq(name))
        .one(txn)
        .await?
    {
        return Ok(parameter.id);
    }
    let parameter = ParameterActive {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
    }
    .insert(txn)
    .await?;
    Ok(parameter.id)
}

pub async fn get_shop_state(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<Shop>> {
    ensure_partner(user)?;
    let shop = partner_shop(state, user).await?;
    Ok(ApiResponse::success("OK", Shop::from(shop), Some(Meta::empty())))
}

pub async fn set_shop_state(
    state: &AppState,
    user: &AuthUser,
    accepting: bool,
) -> AppResult<ApiResponse<Shop>> {
    ensure_partner(user)?;
    let shop = partner_shop(state, user).await?;

    let mut active: ShopActive = shop.into();
    active.state = Set(accepting);
    let shop = active.update(&state.orm).await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "shop_state",
        "shops",
        serde_json::json!({ "shop_id": shop.id, "state": accepting }),
    )
    .await;

    Ok(ApiResponse::success("Updated", Shop::from(shop), Some(Meta::empty())))
}

pub(crate) async fn partner_shop(state: &AppState, user: &AuthUser) -> AppResult<ShopModel> {
    Shops::find()
        .filter(ShopCol::UserId.eq(user.user_id))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)
}

pub async fn list_shops(state: &AppState) -> AppResult<ApiResponse<ShopList>> {
    let items: Vec<Shop> = Shops::find()
        .filter(ShopCol::State.eq(true))
        .order_by_asc(ShopCol::Name)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Shop::from)
        .collect();
    let total = items.len() as i64;
    Ok(ApiResponse::success("Shops", ShopList { items }, Some(Meta::new(1, total, total))))
}

pub async fn list_categories(state: &AppState) -> AppResult<ApiResponse<CategoryList>> {
    let items: Vec<Category> = Categories::find()
        .order_by_asc(CategoryCol::Name)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Category::from)
        .collect();
    let total = items.len() as i64;
    Ok(ApiResponse::success(
        "Categories",
        CategoryList { items },
        Some(Meta::new(1, total, total)),
    ))
}

pub async fn list_product_infos(
    state: &AppState,
    query: ProductQuery,
) -> AppResult<ApiResponse<ProductInfoList>> {
    let (page, limit, offset) = query.pagination().normalize();

    let mut condition = Condition::all()
        .add(ShopCol::State.eq(true))
        .add(InfoCol::Quantity.gt(0));
    if let Some(shop_id) = query.shop_id {
        condition = condition.add(InfoCol::ShopId.eq(shop_id));
    }
    if let Some(category_id) = query.category_id {
        condition = condition.add(ProductCol::CategoryId.eq(category_id));
    }
    if let Some(search) = query.q.as_ref().filter(|s| !s.is_empty()) {
        condition = condition.add(
            Condition::any()
                .add(ProductCol::Name.contains(search.as_str()))
                .add(InfoCol::Model.contains(search.as_str())),
        );
    }
    if let Some(min_price) = query.min_price {
        condition = condition.add(InfoCol::Price.gte(min_price));
    }
    if let Some(max_price) = query.max_price {
        condition = condition.add(InfoCol::Price.lte(max_price));
    }

    let order = query.sort_order.unwrap_or(SortOrder::Asc).as_order();
    let finder = ProductInfos::find()
        .join(JoinType::InnerJoin, InfoRel::Shops.def())
        .join(JoinType::InnerJoin, InfoRel::Products.def())
        .filter(condition);
    let finder = match query.sort_by.unwrap_or(ProductSortBy::Name) {
        ProductSortBy::Name => finder.order_by(ProductCol::Name, order),
        ProductSortBy::Price => finder.order_by(InfoCol::Price, order),
        ProductSortBy::Quantity => finder.order_by(InfoCol::Quantity, order),
    }
    .order_by_asc(InfoCol::Id);

    let total = finder.clone().count(&state.orm).await? as i64;

    let infos = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?;
    let items = hydrate_product_infos(&state.orm, infos).await?;

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Products", ProductInfoList { items }, Some(meta)))
}

/// Loads product, category, shop and parameters for a batch of listings, keeping input order.
pub(crate) async fn hydrate_product_infos<C: ConnectionTrait>(
    conn: &C,
    infos: Vec<InfoModel>,
) -> AppResult<Vec<ProductInfo>> {
    if infos.is_empty() {
        return Ok(Vec::new());
    }

    let info_ids: Vec<Uuid> = infos.iter().map(|i| i.id).collect();
    let product_ids: Vec<Uuid> = infos.iter().map(|i| i.product_id).collect();
    let shop_ids: Vec<Uuid> = infos.iter().map(|i| i.shop_id).collect();

    let products: HashMap<Uuid, _> = Products::find()
        .filter(ProductCol::Id.is_in(product_ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    let category_ids: Vec<Uuid> = products.values().map(|p| p.category_id).collect();
    let categories: HashMap<Uuid, _> = Categories::find()
        .filter(CategoryCol::Id.is_in(category_ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|c| (c.id, c))
        .collect();

    let shops: HashMap<Uuid, _> = Shops::find()
        .filter(ShopCol::Id.is_in(shop_ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|s| (s.id, s))
        .collect();

    let mut parameters: HashMap<Uuid, Vec<ProductParameter>> = HashMap::new();
    for (pp, parameter) in ProductParameters::find()
        .filter(ProductParameterCol::ProductInfoId.is_in(info_ids))
        .find_also_related(Parameters)
        .all(conn)
        .await?
    {
        if let Some(parameter) = parameter {
            parameters
                .entry(pp.product_info_id)
                .or_default()
                .push(ProductParameter {
                    parameter: parameter.name,
                    value: pp.value,
                });
        }
    }

    infos
        .into_iter()
        .map(|info| {
            let missing =
                |what: &str| AppError::Internal(anyhow::anyhow!("listing {} has no {what}", info.id));
            let product = products.get(&info.product_id).ok_or_else(|| missing("product"))?;
            let category = categories
                .get(&product.category_id)
                .ok_or_else(|| missing("category"))?;
            let shop = shops.get(&info.shop_id).ok_or_else(|| missing("shop"))?;
            let mut params = parameters.remove(&info.id).unwrap_or_default();
            params.sort_by(|a, b| a.parameter.cmp(&b.parameter));

            Ok(ProductInfo {
                id: info.id,
                model: info.model,
                external_id: info.external_id,
                product: product.name.clone(),
                category: category.name.clone(),
                shop: Shop::from(shop.clone()),
                quantity: info.quantity,
                price: info.price,
                price_rrc: info.price_rrc,
                parameters: params,
            })
        })
        .collect()
}
