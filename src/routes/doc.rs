use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        auth::{
            ConfirmEmailRequest, LoginRequest, LoginResponse, PasswordResetConfirmRequest,
            PasswordResetRequest, RegisterRequest, UpdateAccountRequest,
        },
        basket::{AddBasketItemsRequest, BasketItemUpdate, NewBasketItem, OrderWithItems, UpdateBasketItemsRequest},
        catalog::{CategoryList, PartnerStateRequest, PartnerUpdateRequest, ProductInfoList, ShopList, SyncReport},
        contacts::{ContactList, ContactRequest, DeleteItemsRequest},
        orders::{CheckoutRequest, OrderList, OrderSummary, PartnerOrderList, UpdateOrderStateRequest},
    },
    models::{Category, Contact, Order, OrderItem, OrderState, ProductInfo, ProductParameter, Shop, User, UserType},
    response::{Affected, ApiResponse, Meta},
    routes::{admin, basket, catalog, health, orders, partner, user},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        user::register,
        user::confirm_email,
        user::login,
        user::account_details,
        user::update_account,
        user::list_contacts,
        user::create_contact,
        user::update_contact,
        user::delete_contacts,
        user::password_reset,
        user::password_reset_confirm,
        partner::update_catalog,
        partner::get_state,
        partner::set_state,
        partner::list_orders,
        catalog::list_shops,
        catalog::list_categories,
        catalog::list_products,
        basket::get_basket,
        basket::add_items,
        basket::update_items,
        basket::remove_items,
        orders::list_orders,
        orders::checkout,
        orders::get_order,
        admin::list_all_orders,
        admin::get_order_admin,
        admin::update_order_state
    ),
    components(
        schemas(
            User,
            UserType,
            Shop,
            Category,
            ProductInfo,
            ProductParameter,
            Contact,
            Order,
            OrderState,
            OrderItem,
            RegisterRequest,
            ConfirmEmailRequest,
            LoginRequest,
            LoginResponse,
            UpdateAccountRequest,
            PasswordResetRequest,
            PasswordResetConfirmRequest,
            ContactRequest,
            ContactList,
            DeleteItemsRequest,
            PartnerUpdateRequest,
            PartnerStateRequest,
            SyncReport,
            ShopList,
            CategoryList,
            ProductInfoList,
            NewBasketItem,
            AddBasketItemsRequest,
            BasketItemUpdate,
            UpdateBasketItemsRequest,
            OrderWithItems,
            CheckoutRequest,
            UpdateOrderStateRequest,
            OrderSummary,
            OrderList,
            PartnerOrderList,
            Affected,
            Meta,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>,
            ApiResponse<User>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "User", description = "Registration, login, account and contacts"),
        (name = "Partner", description = "Shop owner endpoints: catalog sync, order intake, orders"),
        (name = "Catalog", description = "Public browsing of shops, categories and listings"),
        (name = "Basket", description = "Basket endpoints"),
        (name = "Orders", description = "Order endpoints"),
        (name = "Admin", description = "Staff endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_route_is_documented() {
        let doc = ApiDoc::openapi();
        for path in [
            "/health",
            "/api/user/register",
            "/api/user/contact",
            "/api/partner/update",
            "/api/products",
            "/api/basket",
            "/api/order",
            "/api/order/{id}",
            "/api/admin/orders/{id}/state",
        ] {
            assert!(doc.paths.paths.contains_key(path), "{path} missing from OpenAPI");
        }
    }
}
