use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};

use crate::{
    dto::{
        auth::{
            ConfirmEmailRequest, LoginRequest, LoginResponse, PasswordResetConfirmRequest,
            PasswordResetRequest, RegisterRequest, UpdateAccountRequest,
        },
        contacts::{ContactList, ContactRequest, DeleteItemsRequest},
    },
    error::AppResult,
    middleware::auth::AuthUser,
    models::{Contact, User},
    response::{Affected, ApiResponse},
    services::{account_service, auth_service, contact_service},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/register/confirm", post(confirm_email))
        .route("/login", post(login))
        .route("/details", get(account_details).post(update_account))
        .route(
            "/contact",
            get(list_contacts)
                .post(create_contact)
                .put(update_contact)
                .delete(delete_contacts),
        )
        .route("/password_reset", post(password_reset))
        .route("/password_reset/confirm", post(password_reset_confirm))
}

#[utoipa::path(
    post,
    path = "/api/user/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Register user, a confirmation token is emailed", body = ApiResponse<User>),
        (status = 400, description = "Missing fields, weak password or duplicate email")
    ),
    tag = "User"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<User>>)> {
    let resp = auth_service::register_user(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    post,
    path = "/api/user/register/confirm",
    request_body = ConfirmEmailRequest,
    responses(
        (status = 200, description = "Account activated", body = ApiResponse<User>),
        (status = 400, description = "Invalid token or email")
    ),
    tag = "User"
)]
pub async fn confirm_email(
    State(state): State<AppState>,
    Json(payload): Json<ConfirmEmailRequest>,
) -> AppResult<Json<ApiResponse<User>>> {
    let resp = auth_service::confirm_email(&state, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/user/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login user", body = ApiResponse<LoginResponse>),
        (status = 400, description = "Invalid credentials")
    ),
    tag = "User"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<ApiResponse<LoginResponse>>> {
    let resp = auth_service::login_user(&state, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/user/details",
    responses(
        (status = 200, description = "Current account", body = ApiResponse<User>),
        (status = 403, description = "Not authenticated")
    ),
    security(("bearer_auth" = [])),
    tag = "User"
)]
pub async fn account_details(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<User>>> {
    let resp = account_service::account_details(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/user/details",
    request_body = UpdateAccountRequest,
    responses(
        (status = 200, description = "Account updated", body = ApiResponse<User>),
        (status = 400, description = "Weak password"),
        (status = 403, description = "Not authenticated")
    ),
    security(("bearer_auth" = [])),
    tag = "User"
)]
pub async fn update_account(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<UpdateAccountRequest>,
) -> AppResult<Json<ApiResponse<User>>> {
    let resp = account_service::update_account(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/user/contact",
    responses(
        (status = 200, description = "Contacts of the current user", body = ApiResponse<ContactList>),
        (status = 403, description = "Not authenticated")
    ),
    security(("bearer_auth" = [])),
    tag = "User"
)]
pub async fn list_contacts(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<ContactList>>> {
    let resp = contact_service::list_contacts(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/user/contact",
    request_body = ContactRequest,
    responses(
        (status = 200, description = "Contact created", body = ApiResponse<Contact>),
        (status = 400, description = "Missing fields"),
        (status = 403, description = "Not authenticated")
    ),
    security(("bearer_auth" = [])),
    tag = "User"
)]
pub async fn create_contact(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<ContactRequest>,
) -> AppResult<Json<ApiResponse<Contact>>> {
    let resp = contact_service::create_contact(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/user/contact",
    request_body = ContactRequest,
    responses(
        (status = 200, description = "Contact updated", body = ApiResponse<Contact>),
        (status = 404, description = "Contact not found"),
        (status = 403, description = "Not authenticated")
    ),
    security(("bearer_auth" = [])),
    tag = "User"
)]
pub async fn update_contact(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<ContactRequest>,
) -> AppResult<Json<ApiResponse<Contact>>> {
    let resp = contact_service::update_contact(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/user/contact",
    request_body = DeleteItemsRequest,
    responses(
        (status = 200, description = "Contacts deleted", body = ApiResponse<Affected>),
        (status = 400, description = "Malformed id list"),
        (status = 403, description = "Not authenticated")
    ),
    security(("bearer_auth" = [])),
    tag = "User"
)]
pub async fn delete_contacts(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<DeleteItemsRequest>,
) -> AppResult<Json<ApiResponse<Affected>>> {
    let resp = contact_service::delete_contacts(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/user/password_reset",
    request_body = PasswordResetRequest,
    responses(
        (status = 200, description = "Reset token emailed if the account exists")
    ),
    tag = "User"
)]
pub async fn password_reset(
    State(state): State<AppState>,
    Json(payload): Json<PasswordResetRequest>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = auth_service::request_password_reset(&state, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/user/password_reset/confirm",
    request_body = PasswordResetConfirmRequest,
    responses(
        (status = 200, description = "Password changed"),
        (status = 400, description = "Invalid token or weak password")
    ),
    tag = "User"
)]
pub async fn password_reset_confirm(
    State(state): State<AppState>,
    Json(payload): Json<PasswordResetConfirmRequest>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = auth_service::confirm_password_reset(&state, payload).await?;
    Ok(Json(resp))
}
