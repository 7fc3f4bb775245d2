use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{Order, OrderItem};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewBasketItem {
    pub product_info: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddBasketItemsRequest {
    pub items: Vec<NewBasketItem>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct BasketItemUpdate {
    pub id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateBasketItemsRequest {
    pub items: Vec<BasketItemUpdate>,
}

/// An order together with its items and their sum.
#[derive(Debug, Serialize, ToSchema)]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub total_sum: i64,
}
