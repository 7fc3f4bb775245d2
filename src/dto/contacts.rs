use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::Contact;

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ContactRequest {
    pub id: Option<Uuid>,
    pub city: Option<String>,
    pub street: Option<String>,
    pub house: Option<String>,
    pub structure: Option<String>,
    pub building: Option<String>,
    pub apartment: Option<String>,
    pub phone: Option<String>,
}

/// Comma separated ids, e.g. `"id1,id2"`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct DeleteItemsRequest {
    pub items: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct ContactList {
    #[schema(value_type = Vec<Contact>)]
    pub items: Vec<Contact>,
}
