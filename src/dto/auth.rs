use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::UserType;

#[derive(Deserialize, Debug, Default, ToSchema)]
pub struct RegisterRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company: Option<String>,
    pub position: Option<String>,
    #[serde(rename = "type")]
    pub user_type: Option<UserType>,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct ConfirmEmailRequest {
    pub email: String,
    pub token: String,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    #[serde(rename = "Token")]
    pub token: String,
}

#[derive(Deserialize, Debug, Default, ToSchema)]
pub struct UpdateAccountRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company: Option<String>,
    pub position: Option<String>,
    #[serde(rename = "type")]
    pub user_type: Option<UserType>,
    pub password: Option<String>,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct PasswordResetConfirmRequest {
    pub email: String,
    pub token: String,
    pub password: String,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    #[serde(default)]
    pub staff: bool,
    pub exp: usize,
}
