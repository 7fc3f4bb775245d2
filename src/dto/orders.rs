use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::basket::OrderWithItems,
    models::{Contact, Order, OrderState},
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    pub id: Uuid,
    pub contact: Uuid,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderStateRequest {
    pub state: OrderState,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderSummary {
    pub order: Order,
    pub contact: Option<Contact>,
    pub total_sum: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderList {
    pub items: Vec<OrderSummary>,
}

/// Orders touching a partner's shop, each reduced to that shop's items.
#[derive(Debug, Serialize, ToSchema)]
pub struct PartnerOrderList {
    pub items: Vec<OrderWithItems>,
}
