use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tourbook_core::catalog::NewCategory;

use crate::error::{AppError, AppJson, AppPath};
use crate::middleware::auth::{require_admin, AuthUser};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_categories).post(create_category))
        .route("/{id}", get(get_category).put(update_category).delete(delete_category))
}

async fn list_categories(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let categories = state.categories.list_categories().await?;
    Ok(Json(json!({ "categories": categories })))
}

async fn get_category(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<Json<Value>, AppError> {
    let category = state
        .categories
        .get_category(id)
        .await?
        .ok_or_else(|| AppError::NotFoundError("Category not found".to_string()))?;
    Ok(Json(json!({ "category": category })))
}

async fn create_category(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AppJson(req): AppJson<NewCategory>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    require_admin(&user)?;
    req.validate()?;
    let category = state.categories.create_category(&req).await?;
    Ok((StatusCode::CREATED, Json(json!({ "category": category }))))
}

async fn update_category(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AppPath(id): AppPath<i64>,
    AppJson(req): AppJson<NewCategory>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;
    req.validate()?;
    let category = state.categories.update_category(id, &req).await?;
    Ok(Json(json!({ "category": category })))
}

async fn delete_category(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AppPath(id): AppPath<i64>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;
    state.categories.delete_category(id).await?;
    Ok(Json(json!({ "success": true })))
}
