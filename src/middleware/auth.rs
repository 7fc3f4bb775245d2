use axum::{extract::FromRequestParts, http::header};
use jsonwebtoken::{DecodingKey, Validation, decode};
use sea_orm::EntityTrait;
use uuid::Uuid;

use crate::{
    dto::auth::Claims, entity::users::Entity as Users, error::AppError, models::UserType,
    state::AppState,
};

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub user_type: UserType,
    pub is_staff: bool,
}

pub fn ensure_partner(user: &AuthUser) -> Result<(), AppError> {
    if user.user_type != UserType::Shop {
        return Err(AppError::Authorization("Only shops can do this".into()));
    }
    Ok(())
}

pub fn ensure_staff(user: &AuthUser) -> Result<(), AppError> {
    if !user.is_staff {
        return Err(AppError::Authorization("Staff only".into()));
    }
    Ok(())
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_str = parts
            .headers
            .get(header::AUTHORIZATION)
            .ok_or(AppError::Unauthenticated)?
            .to_str()
            .map_err(|_| AppError::Unauthenticated)?;

        let token = auth_str
            .strip_prefix("Bearer ")
            .ok_or(AppError::Unauthenticated)?
            .trim();

        let decoded = decode::<Claims>(
            token,
            &DecodingKey::from_secret(state.config.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|err| {
            tracing::debug!(error = %err, "rejected bearer token");
            AppError::Unauthenticated
        })?;

        let user_id =
            Uuid::parse_str(&decoded.claims.sub).map_err(|_| AppError::Unauthenticated)?;

        // Role and staff flag come from the stored user, not the token claims.
        let user = Users::find_by_id(user_id)
            .one(&state.orm)
            .await?
            .filter(|user| user.is_active)
            .ok_or(AppError::Unauthenticated)?;
        let user_type = UserType::parse(&user.user_type).map_err(|_| AppError::Unauthenticated)?;

        Ok(AuthUser {
            user_id,
            user_type,
            is_staff: user.is_staff,
        })
    }
}
