use argon2::{
    Argon2, PasswordHasher,
    password_hash::{PasswordHash, PasswordVerifier, SaltString},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use password_hash::rand_core::OsRng;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, QueryFilter, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::auth::{
        Claims, ConfirmEmailRequest, LoginRequest, LoginResponse, PasswordResetConfirmRequest,
        PasswordResetRequest, RegisterRequest,
    },
    entity::{
        confirm_email_tokens::{
            ActiveModel as ConfirmTokenActive, Column as ConfirmTokenCol,
            Entity as ConfirmEmailTokens,
        },
        password_reset_tokens::{
            ActiveModel as ResetTokenActive, Column as ResetTokenCol, Entity as PasswordResetTokens,
        },
        users::{ActiveModel as UserActive, Column as UserCol, Entity as Users, Model as UserModel},
    },
    error::{AppError, AppResult, FieldErrors},
    models::{User, UserType},
    notify::NotificationKind,
    response::{ApiResponse, Meta},
    state::AppState,
};

/// Reset tokens older than this are rejected.
const RESET_TOKEN_TTL_HOURS: i64 = 24;

pub async fn register_user(
    state: &AppState,
    payload: RegisterRequest,
) -> AppResult<ApiResponse<User>> {
    let mut errors = FieldErrors::new();
    let email = required(&mut errors, "email", payload.email);
    let password = required(&mut errors, "password", payload.password);
    let first_name = required(&mut errors, "first_name", payload.first_name);
    let last_name = required(&mut errors, "last_name", payload.last_name);
    let company = required(&mut errors, "company", payload.company);
    let position = required(&mut errors, "position", payload.position);

    let email = email.map(|e| normalize_email(&e));
    if let Some(email) = email.as_deref() {
        if !email.contains('@') {
            errors
                .entry("email".into())
                .or_default()
                .push("Enter a valid email address.".into());
        }
    }
    if let Some(password) = password.as_deref() {
        let problems = password_problems(password);
        if !problems.is_empty() {
            errors.entry("password".into()).or_default().extend(problems);
        }
    }

    let (
        Some(email),
        Some(password),
        Some(first_name),
        Some(last_name),
        Some(company),
        Some(position),
    ) = (email, password, first_name, last_name, company, position)
    else {
        return Err(AppError::InvalidFields(errors));
    };
    if !errors.is_empty() {
        return Err(AppError::InvalidFields(errors));
    }

    let exist = Users::find()
        .filter(UserCol::Email.eq(email.as_str()))
        .one(&state.orm)
        .await?;
    if exist.is_some() {
        return Err(AppError::field("email", "Email is already taken"));
    }

    let password_hash = hash_password(&password)?;
    let user_type = payload.user_type.unwrap_or(UserType::Buyer);
    let key = new_token();

    let txn = state.orm.begin().await?;
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set(email.clone()),
        password_hash: Set(password_hash),
        first_name: Set(first_name),
        last_name: Set(last_name),
        company: Set(company),
        position: Set(position),
        user_type: Set(user_type.as_str().to_string()),
        is_active: Set(false),
        is_staff: Set(false),
        created_at: Set(Utc::now().into()),
    }
    .insert(&txn)
    .await?;

    ConfirmTokenActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.id),
        key: Set(key.clone()),
        created_at: Set(Utc::now().into()),
    }
    .insert(&txn)
    .await?;
    txn.commit().await?;

    state.notifier.enqueue(
        NotificationKind::EmailConfirmation,
        &user.email,
        serde_json::json!({ "token": key }),
    );
    audit::record(
        &state.orm,
        Some(user.id),
        "user_register",
        "users",
        serde_json::json!({ "user_id": user.id, "type": user.user_type }),
    )
    .await;

    tracing::info!(user_id = %user.id, "user registered, awaiting confirmation");
    Ok(ApiResponse::success("User created", User::from(user), None))
}

pub async fn confirm_email(
    state: &AppState,
    payload: ConfirmEmailRequest,
) -> AppResult<ApiResponse<User>> {
    let invalid = || AppError::Validation("Invalid token or email".into());
    let email = normalize_email(&payload.email);

    let user = Users::find()
        .filter(UserCol::Email.eq(email.as_str()))
        .one(&state.orm)
        .await?
        .ok_or_else(invalid)?;

    let token = ConfirmEmailTokens::find()
        .filter(
            Condition::all()
                .add(ConfirmTokenCol::UserId.eq(user.id))
                .add(ConfirmTokenCol::Key.eq(payload.token.trim())),
        )
        .one(&state.orm)
        .await?
        .ok_or_else(invalid)?;

    let txn = state.orm.begin().await?;
    let mut active: UserActive = user.into();
    active.is_active = Set(true);
    let user = active.update(&txn).await?;
    ConfirmEmailTokens::delete_by_id(token.id).exec(&txn).await?;
    txn.commit().await?;

    audit::record(
        &state.orm,
        Some(user.id),
        "email_confirmed",
        "users",
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    Ok(ApiResponse::success("Email confirmed", User::from(user), Some(Meta::empty())))
}

pub async fn login_user(
    state: &AppState,
    payload: LoginRequest,
) -> AppResult<ApiResponse<LoginResponse>> {
    let LoginRequest { email, password } = payload;
    let user = Users::find()
        .filter(UserCol::Email.eq(normalize_email(&email)))
        .one(&state.orm)
        .await?;

    let user = match user {
        Some(u) => u,
        None => return Err(AppError::Validation("Invalid email or password".into())),
    };

    if !verify_password(&password, &user.password_hash)? {
        return Err(AppError::Validation("Invalid email or password".into()));
    }
    if !user.is_active {
        return Err(AppError::Validation("Account email is not confirmed".into()));
    }

    let token = issue_token(state, &user)?;
    let resp = LoginResponse { token };

    audit::record(
        &state.orm,
        Some(user.id),
        "user_login",
        "users",
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    Ok(ApiResponse::success("Logged in", resp, Some(Meta::empty())))
}

/// Always reports success so that the endpoint cannot be used to enumerate accounts.
pub async fn request_password_reset(
    state: &AppState,
    payload: PasswordResetRequest,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let email = normalize_email(&payload.email);
    let user = Users::find()
        .filter(UserCol::Email.eq(email.as_str()))
        .one(&state.orm)
        .await?;

    if let Some(user) = user {
        let key = new_token();
        let txn = state.orm.begin().await?;
        PasswordResetTokens::delete_many()
            .filter(ResetTokenCol::UserId.eq(user.id))
            .exec(&txn)
            .await?;
        ResetTokenActive {
            id: Set(Uuid::new_v4()),
            user_id: Set(user.id),
            key: Set(key.clone()),
            created_at: Set(Utc::now().into()),
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;

        state.notifier.enqueue(
            NotificationKind::PasswordReset,
            &user.email,
            serde_json::json!({ "token": key }),
        );
    } else {
        tracing::debug!("password reset requested for unknown email");
    }

    Ok(ApiResponse::success(
        "If the account exists, a reset token has been sent",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn confirm_password_reset(
    state: &AppState,
    payload: PasswordResetConfirmRequest,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let invalid = || AppError::Validation("Invalid token or email".into());
    let email = normalize_email(&payload.email);

    let user = Users::find()
        .filter(UserCol::Email.eq(email.as_str()))
        .one(&state.orm)
        .await?
        .ok_or_else(invalid)?;

    let token = PasswordResetTokens::find()
        .filter(
            Condition::all()
                .add(ResetTokenCol::UserId.eq(user.id))
                .add(ResetTokenCol::Key.eq(payload.token.trim())),
        )
        .one(&state.orm)
        .await?
        .ok_or_else(invalid)?;

    let age = Utc::now() - token.created_at.with_timezone(&Utc);
    if age > Duration::hours(RESET_TOKEN_TTL_HOURS) {
        PasswordResetTokens::delete_by_id(token.id)
            .exec(&state.orm)
            .await?;
        return Err(AppError::Validation("Reset token has expired".into()));
    }

    ensure_strong_password(&payload.password)?;
    let password_hash = hash_password(&payload.password)?;

    let txn = state.orm.begin().await?;
    let user_id = user.id;
    let mut active: UserActive = user.into();
    active.password_hash = Set(password_hash);
    active.update(&txn).await?;
    PasswordResetTokens::delete_many()
        .filter(ResetTokenCol::UserId.eq(user_id))
        .exec(&txn)
        .await?;
    txn.commit().await?;

    audit::record(
        &state.orm,
        Some(user_id),
        "password_reset",
        "users",
        serde_json::json!({ "user_id": user_id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Password updated",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub fn issue_token(state: &AppState, user: &UserModel) -> AppResult<String> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::hours(state.config.jwt_ttl_hours))
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to set expiration")))?;

    let claims = Claims {
        sub: user.id.to_string(),
        role: user.user_type.clone(),
        staff: user.is_staff,
        exp: expiration.timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(state.config.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))?;

    Ok(token)
}

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))?
        .to_string();
    Ok(password_hash)
}

fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid password hash")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Strength rules applied on registration, reset and password change.
pub fn password_problems(password: &str) -> Vec<String> {
    let mut problems = Vec::new();
    if password.chars().count() < 8 {
        problems.push("This password is too short. It must contain at least 8 characters.".into());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        problems.push("This password must contain at least one digit.".into());
    }
    if !password.chars().any(char::is_alphabetic) {
        problems.push("This password is entirely numeric.".into());
    }
    problems
}

pub fn ensure_strong_password(password: &str) -> AppResult<()> {
    let problems = password_problems(password);
    if problems.is_empty() {
        return Ok(());
    }
    let mut errors = FieldErrors::new();
    errors.insert("password".into(), problems);
    Err(AppError::InvalidFields(errors))
}

fn required(errors: &mut FieldErrors, field: &str, value: Option<String>) -> Option<String> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Some(v),
        _ => {
            errors
                .entry(field.to_string())
                .or_default()
                .push("This field is required.".into());
            None
        }
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn new_token() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strong_password_passes() {
        assert!(password_problems("StrongPassword123").is_empty());
    }

    #[test]
    fn short_password_without_digits_reports_both_problems() {
        let problems = password_problems("weak");
        assert_eq!(problems.len(), 2);
    }

    #[test]
    fn numeric_password_is_rejected() {
        assert_eq!(password_problems("1234567890").len(), 1);
        assert!(ensure_strong_password("1234567890").is_err());
    }

    #[test]
    fn hashed_password_verifies() {
        let hash = hash_password("StrongPassword123").unwrap();
        assert!(verify_password("StrongPassword123", &hash).unwrap());
        assert!(!verify_password("WrongPassword123", &hash).unwrap());
    }

    #[test]
    fn missing_fields_are_collected() {
        let mut errors = FieldErrors::new();
        assert_eq!(required(&mut errors, "email", Some("  ".into())), None);
        assert_eq!(required(&mut errors, "company", None), None);
        assert_eq!(
            required(&mut errors, "position", Some(" Manager ".into())).as_deref(),
            Some("Manager")
        );
        assert_eq!(errors.len(), 2);
    }
}
