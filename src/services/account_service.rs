use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};

use crate::{
    audit,
    dto::auth::UpdateAccountRequest,
    entity::{
        shops::{Column as ShopCol, Entity as Shops},
        users::{ActiveModel as UserActive, Entity as Users, Model as UserModel},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{User, UserType},
    response::{ApiResponse, Meta},
    services::auth_service::{ensure_strong_password, hash_password},
    state::AppState,
};

pub async fn account_details(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<User>> {
    let model = find_user(state, user).await?;
    Ok(ApiResponse::success("OK", User::from(model), Some(Meta::empty())))
}

pub async fn update_account(
    state: &AppState,
    user: &AuthUser,
    payload: UpdateAccountRequest,
) -> AppResult<ApiResponse<User>> {
    if let Some(password) = payload.password.as_deref() {
        ensure_strong_password(password)?;
    }

    let existing = find_user(state, user).await?;
    let existing_id = existing.id;
    let mut active: UserActive = existing.into();
    if let Some(first_name) = payload.first_name {
        active.first_name = Set(first_name);
    }
    if let Some(last_name) = payload.last_name {
        active.last_name = Set(last_name);
    }
    if let Some(company) = payload.company {
        active.company = Set(company);
    }
    if let Some(position) = payload.position {
        active.position = Set(position);
    }
    if let Some(user_type) = payload.user_type {
        if user_type != UserType::Shop {
            let owned = Shops::find()
                .filter(ShopCol::UserId.eq(existing_id))
                .count(&state.orm)
                .await?;
            if owned > 0 {
                return Err(AppError::Validation(
                    "A shop owner cannot switch to a buyer account".into(),
                ));
            }
        }
        active.user_type = Set(user_type.as_str().to_string());
    }
    let password_changed = payload.password.is_some();
    if let Some(password) = payload.password {
        active.password_hash = Set(hash_password(&password)?);
    }

    let updated = active.update(&state.orm).await?;

    audit::record(
        &state.orm,
        Some(updated.id),
        "account_update",
        "users",
        serde_json::json!({ "user_id": updated.id, "password_changed": password_changed }),
    )
    .await;

    Ok(ApiResponse::success("Updated", User::from(updated), Some(Meta::empty())))
}

async fn find_user(state: &AppState, user: &AuthUser) -> AppResult<UserModel> {
    // A valid token for a deleted account is treated like no token at all.
    Users::find_by_id(user.user_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::Unauthenticated)
}
