use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{Category, ProductInfo, Shop};

#[derive(Debug, Deserialize, ToSchema)]
pub struct PartnerUpdateRequest {
    pub url: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PartnerStateRequest {
    pub state: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct SyncReport {
    pub created: u64,
    pub updated: u64,
    pub deleted: u64,
    pub retired: u64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct ShopList {
    #[schema(value_type = Vec<Shop>)]
    pub items: Vec<Shop>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct CategoryList {
    #[schema(value_type = Vec<Category>)]
    pub items: Vec<Category>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct ProductInfoList {
    #[schema(value_type = Vec<ProductInfo>)]
    pub items: Vec<ProductInfo>,
}

/// A partner's price list as published at the partner's catalog URL.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CatalogDocument {
    pub shop: String,
    #[serde(default)]
    pub categories: Vec<CatalogCategory>,
    #[serde(default)]
    pub goods: Vec<CatalogGood>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CatalogCategory {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CatalogGood {
    pub id: i64,
    pub category: i64,
    #[serde(default)]
    pub model: String,
    pub name: String,
    pub price: i64,
    pub price_rrc: i64,
    pub quantity: i32,
    #[serde(default)]
    pub parameters: std::collections::BTreeMap<String, ParameterValue>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ParameterValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl std::fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParameterValue::Bool(v) => write!(f, "{v}"),
            ParameterValue::Integer(v) => write!(f, "{v}"),
            ParameterValue::Float(v) => write!(f, "{v}"),
            ParameterValue::Text(v) => f.write_str(v),
        }
    }
}
