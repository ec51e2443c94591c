use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tourbook_core::account::{NewUser, Role, UserFilter, UserUpdate};
use tourbook_core::pii::Masked;
use tourbook_core::validation::{require_email, require_non_empty, require_password};
use tracing::info;

use crate::error::{AppError, AppJson, AppPath, AppQuery};
use crate::password::hash_password;
use crate::state::AppState;

/// Admin-only; the caller is checked by the router's middleware.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/{id}", get(get_user).put(update_user).delete(delete_user))
}

#[derive(Debug, Deserialize)]
struct CreateUserRequest {
    email: String,
    password: Masked<String>,
    first_name: String,
    last_name: String,
    phone: Option<String>,
    #[serde(default)]
    role: Role,
}

async fn list_users(
    State(state): State<AppState>,
    AppQuery(filter): AppQuery<UserFilter>,
) -> Result<Json<Value>, AppError> {
    let users = state.users.list_users(&filter).await?;
    Ok(Json(json!({ "users": users })))
}

async fn get_user(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<Json<Value>, AppError> {
    let user = state
        .users
        .get_user(id)
        .await?
        .ok_or_else(|| AppError::NotFoundError("User not found".to_string()))?;
    Ok(Json(json!({ "user": user })))
}

async fn create_user(
    State(state): State<AppState>,
    AppJson(req): AppJson<CreateUserRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let email = req.email.trim().to_lowercase();
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
            role: req.role,
        })
        .await?;

    info!(user_id = user.id, role = %user.role, "User created");
    Ok((StatusCode::CREATED, Json(json!({ "user": user }))))
}

async fn update_user(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
    AppJson(mut req): AppJson<UserUpdate>,
) -> Result<Json<Value>, AppError> {
    req.email = req.email.trim().to_lowercase();
    req.validate()?;
    if let Some(other) = state.users.get_user_by_email(&req.email).await? {
        if other.id != id {
            return Err(AppError::ValidationError("Email already in use by another account".to_string()));
        }
    }

    let user = state.users.update_user(id, &req).await?;
    Ok(Json(json!({ "user": user })))
}

async fn delete_user(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<Json<Value>, AppError> {
    state.users.delete_user(id).await?;
    info!(user_id = id, "User deleted");
    Ok(Json(json!({ "success": true })))
}
