use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entity::{
    categories::Model as CategoryModel, contacts::Model as ContactModel,
    orders::Model as OrderModel, shops::Model as ShopModel, users::Model as UserModel,
};
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    Buyer,
    Shop,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Buyer => "buyer",
            UserType::Shop => "shop",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "buyer" => Ok(UserType::Buyer),
            "shop" => Ok(UserType::Shop),
            other => Err(AppError::field("type", format!("unknown user type '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    Basket,
    New,
    Confirmed,
    Assembled,
    Sent,
    Delivered,
    Canceled,
}

impl OrderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderState::Basket => "basket",
            OrderState::New => "new",
            OrderState::Confirmed => "confirmed",
            OrderState::Assembled => "assembled",
            OrderState::Sent => "sent",
            OrderState::Delivered => "delivered",
            OrderState::Canceled => "canceled",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        Ok(match value {
            "basket" => OrderState::Basket,
            "new" => OrderState::New,
            "confirmed" => OrderState::Confirmed,
            "assembled" => OrderState::Assembled,
            "sent" => OrderState::Sent,
            "delivered" => OrderState::Delivered,
            "canceled" => OrderState::Canceled,
            other => return Err(AppError::Validation(format!("Invalid order state '{other}'"))),
        })
    }

    /// Administrative transitions. Checkout (basket -> new) is the only user-driven one
    /// and is not reachable through this table.
    pub fn can_transition_to(self, next: OrderState) -> bool {
        use OrderState::*;
        matches!(
            (self, next),
            (New, Confirmed)
                | (Confirmed, Assembled)
                | (Assembled, Sent)
                | (Sent, Delivered)
                | (New | Confirmed | Assembled, Canceled)
        )
    }

    /// States whose items have already been taken out of stock.
    pub fn holds_stock(self) -> bool {
        !matches!(self, OrderState::Basket | OrderState::Canceled)
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub company: String,
    pub position: String,
    #[serde(rename = "type")]
    pub user_type: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<UserModel> for User {
    fn from(model: UserModel) -> Self {
        Self {
            id: model.id,
            email: model.email,
            first_name: model.first_name,
            last_name: model.last_name,
            company: model.company,
            position: model.position,
            user_type: model.user_type,
            is_active: model.is_active,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Shop {
    pub id: Uuid,
    pub name: String,
    pub url: Option<String>,
    pub state: bool,
}

impl From<ShopModel> for Shop {
    fn from(model: ShopModel) -> Self {
        Self {
            id: model.id,
            name: model.name,
            url: model.url,
            state: model.state,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
}

impl From<CategoryModel> for Category {
    fn from(model: CategoryModel) -> Self {
        Self {
            id: model.id,
            name: model.name,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProductParameter {
    pub parameter: String,
    pub value: String,
}

/// A listing as shown to buyers: product, shop and parameters flattened together.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProductInfo {
    pub id: Uuid,
    pub model: String,
    pub external_id: i64,
    pub product: String,
    pub category: String,
    pub shop: Shop,
    pub quantity: i32,
    pub price: i64,
    pub price_rrc: i64,
    pub parameters: Vec<ProductParameter>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Contact {
    pub id: Uuid,
    pub city: String,
    pub street: String,
    pub house: String,
    pub structure: String,
    pub building: String,
    pub apartment: String,
    pub phone: String,
}

impl From<ContactModel> for Contact {
    fn from(model: ContactModel) -> Self {
        Self {
            id: model.id,
            city: model.city,
            street: model.street,
            house: model.house,
            structure: model.structure,
            building: model.building,
            apartment: model.apartment,
            phone: model.phone,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub state: OrderState,
    pub contact_id: Option<Uuid>,
    pub dt: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<OrderModel> for Order {
    type Error = AppError;

    fn try_from(model: OrderModel) -> Result<Self, Self::Error> {
        Ok(Self {
            id: model.id,
            user_id: model.user_id,
            state: OrderState::parse(&model.state)
                .map_err(|_| AppError::Internal(anyhow::anyhow!("corrupt order state {}", model.state)))?,
            contact_id: model.contact_id,
            dt: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItem {
    pub id: Uuid,
    pub product_info: Uuid,
    pub product: String,
    pub shop: String,
    pub model: String,
    pub quantity: i32,
    pub price: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_state_round_trips_through_storage_names() {
        for state in [
            OrderState::Basket,
            OrderState::New,
            OrderState::Confirmed,
            OrderState::Assembled,
            OrderState::Sent,
            OrderState::Delivered,
            OrderState::Canceled,
        ] {
            assert_eq!(OrderState::parse(state.as_str()).unwrap(), state);
        }
        assert!(OrderState::parse("paid").is_err());
    }

    #[test]
    fn administrative_transitions_follow_fulfilment_order() {
        assert!(OrderState::New.can_transition_to(OrderState::Confirmed));
        assert!(OrderState::Sent.can_transition_to(OrderState::Delivered));
        assert!(OrderState::Assembled.can_transition_to(OrderState::Canceled));

        assert!(!OrderState::Basket.can_transition_to(OrderState::New));
        assert!(!OrderState::New.can_transition_to(OrderState::Sent));
        assert!(!OrderState::Delivered.can_transition_to(OrderState::Canceled));
        assert!(!OrderState::Canceled.can_transition_to(OrderState::New));
    }

    #[test]
    fn only_placed_orders_hold_stock() {
        assert!(!OrderState::Basket.holds_stock());
        assert!(OrderState::New.holds_stock());
        assert!(OrderState::Delivered.holds_stock());
        assert!(!OrderState::Canceled.holds_stock());
    }
}
