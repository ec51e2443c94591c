use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tourbook_core::account::{NewUser, Role, UserUpdate};
use tourbook_core::pii::Masked;
use tourbook_core::validation::{require_email, require_non_empty, require_password};
use tracing::info;
use uuid::Uuid;

use crate::error::{AppError, AppJson};
use crate::middleware::auth::{issue_token, removal_cookie, session_cookie, AuthUser};
use crate::password::{hash_password, verify_password};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/register", post(register))
        .route("/logout", post(logout))
        .route("/me", get(me))
        .route("/change-password", post(change_password))
        .route("/forgot-password", post(forgot_password))
        .route("/reset-password", post(reset_password))
        .route("/update-profile", put(update_profile))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: String,
    password: Masked<String>,
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    email: String,
    password: Masked<String>,
    first_name: String,
    last_name: String,
    phone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChangePasswordRequest {
    current_password: Masked<String>,
    new_password: Masked<String>,
}

#[derive(Debug, Deserialize)]
struct ForgotPasswordRequest {
    email: String,
}

#[derive(Debug, Deserialize)]
struct ResetPasswordRequest {
    token: Masked<String>,
    password: Masked<String>,
}

#[derive(Debug, Deserialize)]
struct ProfileRequest {
    email: String,
    first_name: String,
    last_name: String,
    phone: Option<String>,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    AppJson(req): AppJson<LoginRequest>,
) -> Result<(CookieJar, Json<Value>), AppError> {
    let invalid = || AppError::AuthenticationError("Invalid email or password".to_string());

    let user = state
        .users
        .get_user_by_email(&normalize_email(&req.email))
        .await?
        .ok_or_else(invalid)?;
    if !verify_password(req.password.expose(), &user.password_hash).await? {
        return Err(invalid());
    }

    let token = issue_token(&user, &state.auth)?;
    info!(user_id = user.id, "User logged in");
    let jar = jar.add(session_cookie(token.clone(), &state.auth));
    Ok((jar, Json(json!({ "user": user, "token": token }))))
}

async fn register(
    State(state): State<AppState>,
    AppJson(req): AppJson<RegisterRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let email = normalize_email(&req.email);
    require_email(&email)?;
    require_password(req.password.expose())?;
    require_non_empty("first_name", &req.first_name)?;
    require_non_empty("last_name", &req.last_name)?;

    if state.users.get_user_by_email(&email).await?.is_some() {
        return Err(AppError::ValidationError("User with this email already exists".to_string()));
    }

    let password_hash = hash_password(req.password.expose(), state.auth.bcrypt_cost).await?;
    let user = state
        .users
        .create_user(&NewUser {
            email,
            password_hash,
            first_name: req.first_name,
            last_name: req.last_name,
            phone: req.phone,
            role: Role::Customer,
        })
        .await?;

    info!(user_id = user.id, "User registered");
    Ok((StatusCode::CREATED, Json(json!({ "user": user }))))
}

async fn logout(jar: CookieJar) -> (CookieJar, Json<Value>) {
    (jar.add(removal_cookie()), Json(json!({ "success": true })))
}

async fn me(AuthUser(user): AuthUser) -> Json<Value> {
    Json(json!({ "user": user }))
}

async fn change_password(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AppJson(req): AppJson<ChangePasswordRequest>,
) -> Result<Json<Value>, AppError> {
    require_password(req.new_password.expose())?;
    if !verify_password(req.current_password.expose(), &user.password_hash).await? {
        return Err(AppError::ValidationError("Current password is incorrect".to_string()));
    }

    let password_hash = hash_password(req.new_password.expose(), state.auth.bcrypt_cost).await?;
    state.users.update_password(user.id, &password_hash).await?;
    info!(user_id = user.id, "Password changed");
    Ok(Json(json!({ "success": true })))
}

/// Always succeeds so the response does not reveal which emails have accounts.
async fn forgot_password(
    State(state): State<AppState>,
    AppJson(req): AppJson<ForgotPasswordRequest>,
) -> Result<Json<Value>, AppError> {
    let email = normalize_email(&req.email);
    require_email(&email)?;

    if let Some(user) = state.users.get_user_by_email(&email).await? {
        let token = Uuid::new_v4().simple().to_string();
        let expires_at = Utc::now() + Duration::seconds(state.auth.reset_token_ttl as i64);
        state.resets.upsert_reset_token(user.id, &token, expires_at).await?;
        // No mail delivery; the token is only written to the log.
        info!(user_id = user.id, reset_token = %token, %expires_at, "Password reset token issued");
    }

    Ok(Json(json!({ "success": true })))
}

async fn reset_password(
    State(state): State<AppState>,
    AppJson(req): AppJson<ResetPasswordRequest>,
) -> Result<Json<Value>, AppError> {
    require_password(req.password.expose())?;
    let invalid = || AppError::ValidationError("Invalid or expired token".to_string());

    let reset = state.resets.find_reset_token(req.token.expose()).await?.ok_or_else(invalid)?;
    if reset.is_expired(Utc::now()) {
        return Err(invalid());
    }

    let password_hash = hash_password(req.password.expose(), state.auth.bcrypt_cost).await?;
    state.users.update_password(reset.user_id, &password_hash).await?;
    state.resets.delete_reset_token(&reset.token).await?;

    info!(user_id = reset.user_id, "Password reset");
    Ok(Json(json!({ "success": true })))
}

async fn update_profile(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AppJson(req): AppJson<ProfileRequest>,
) -> Result<Json<Value>, AppError> {
    let update = UserUpdate {
        email: normalize_email(&req.email),
        first_name: req.first_name,
        last_name: req.last_name,
        phone: req.phone,
        role: None,
    };
    update.validate()?;

    if let Some(other) = state.users.get_user_by_email(&update.email).await? {
        if other.id != user.id {
            return Err(AppError::ValidationError("Email already in use by another account".to_string()));
        }
    }

    let updated = state.users.update_user(user.id, &update).await?;
    Ok(Json(json!({ "user": updated })))
}
