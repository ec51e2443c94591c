use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tourbook_core::catalog::{NewTour, TourFilter};
use tracing::info;

use crate::error::{AppError, AppJson, AppPath, AppQuery};
use crate::middleware::auth::{require_tour_owner, vendor_scope, AuthUser};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tours).post(create_tour))
        .route("/{id}", get(get_tour).put(update_tour).delete(delete_tour))
}

async fn list_tours(
    State(state): State<AppState>,
    AppQuery(filter): AppQuery<TourFilter>,
) -> Result<Json<Value>, AppError> {
    let tours = state.tours.list_tours(&filter).await?;
    Ok(Json(json!({ "tours": tours })))
}

async fn get_tour(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<Json<Value>, AppError> {
    let tour = state
        .tours
        .get_tour(id)
        .await?
        .ok_or_else(|| AppError::NotFoundError("Tour not found".to_string()))?;
    Ok(Json(json!({ "tour": tour })))
}

async fn create_tour(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AppJson(mut req): AppJson<NewTour>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    // Vendors always list under their own profile.
    if let Some(vendor_id) = vendor_scope(&state, &user).await? {
        req.vendor_id = Some(vendor_id);
    }
    req.validate()?;

    let tour = state.tours.create_tour(&req).await?;
    info!(tour_id = tour.id, vendor_id = ?tour.vendor_id, "Tour created");
    Ok((StatusCode::CREATED, Json(json!({ "tour": tour }))))
}

async fn update_tour(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AppPath(id): AppPath<i64>,
    AppJson(mut req): AppJson<NewTour>,
) -> Result<Json<Value>, AppError> {
    let scope = vendor_scope(&state, &user).await?;
    let existing = state
        .tours
        .get_tour(id)
        .await?
        .ok_or_else(|| AppError::NotFoundError("Tour not found".to_string()))?;
    require_tour_owner(scope, existing.vendor_id)?;
    if scope.is_some() {
        req.vendor_id = existing.vendor_id;
    }
    req.validate()?;

    let tour = state.tours.update_tour(id, &req).await?;
    Ok(Json(json!({ "tour": tour })))
}

async fn delete_tour(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AppPath(id): AppPath<i64>,
) -> Result<Json<Value>, AppError> {
    let scope = vendor_scope(&state, &user).await?;
    let existing = state
        .tours
        .get_tour(id)
        .await?
        .ok_or_else(|| AppError::NotFoundError("Tour not found".to_string()))?;
    require_tour_owner(scope, existing.vendor_id)?;

    state.tours.delete_tour(id).await?;
    info!(tour_id = id, "Tour deleted");
    Ok(Json(json!({ "success": true })))
}
