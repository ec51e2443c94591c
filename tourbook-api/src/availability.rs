use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use tourbook_core::account::User;
use tourbook_core::availability::{AvailabilityFilter, BulkSlotRequest, NewSlot, SlotUpdate};
use tracing::info;

use crate::error::{AppError, AppJson, AppPath, AppQuery};
use crate::middleware::auth::{require_tour_owner, vendor_scope, AuthUser};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_slots).post(create_slot))
        .route("/bulk", post(bulk_create_slots))
        .route("/{id}", get(get_slot).put(update_slot).delete(delete_slot))
}

#[derive(Debug, Deserialize)]
struct AvailabilityQuery {
    #[serde(alias = "tourId")]
    tour_id: Option<i64>,
    /// With `date`, only open slots that still have free seats are returned.
    date: Option<NaiveDate>,
    date_from: Option<NaiveDate>,
    date_to: Option<NaiveDate>,
    is_available: Option<bool>,
    vendor_id: Option<i64>,
}

/// Vendors may only manage slots of their own tours.
async fn check_tour_access(state: &AppState, user: &User, tour_id: i64) -> Result<(), AppError> {
    let scope = vendor_scope(state, user).await?;
    let tour = state
        .tours
        .get_tour(tour_id)
        .await?
        .ok_or_else(|| AppError::NotFoundError("Tour not found".to_string()))?;
    require_tour_owner(scope, tour.vendor_id)
}

async fn list_slots(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<AvailabilityQuery>,
) -> Result<Json<Value>, AppError> {
    let slots = match (query.tour_id, query.date) {
        (Some(tour_id), Some(date)) => state.availability.available_slots(tour_id, date).await?,
        (None, Some(_)) => {
            return Err(AppError::ValidationError("Tour ID and date are required".to_string()));
        }
        (tour_id, None) => {
            let filter = AvailabilityFilter {
                tour_id,
                date_from: query.date_from,
                date_to: query.date_to,
                is_available: query.is_available,
                vendor_id: query.vendor_id,
            };
            state.availability.list_slots(&filter).await?
        }
    };
    Ok(Json(json!({ "slots": slots })))
}

async fn get_slot(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<Json<Value>, AppError> {
    let slot = state
        .availability
        .get_slot(id)
        .await?
        .ok_or_else(|| AppError::NotFoundError("Availability not found".to_string()))?;
    Ok(Json(json!({ "availability": slot })))
}

async fn create_slot(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AppJson(req): AppJson<NewSlot>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    req.validate()?;
    check_tour_access(&state, &user, req.tour_id).await?;

    let slot = state.availability.create_slot(&req).await?;
    info!(availability_id = slot.id, tour_id = slot.tour_id, date = %slot.date, "Availability created");
    Ok((StatusCode::CREATED, Json(json!({ "availability": slot }))))
}

async fn bulk_create_slots(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AppJson(req): AppJson<BulkSlotRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    req.validate()?;
    check_tour_access(&state, &user, req.tour_id).await?;

    let slots = state.availability.create_slots(&req.expand()).await?;
    info!(tour_id = req.tour_id, count = slots.len(), "Availability created in bulk");
    Ok((StatusCode::CREATED, Json(json!({ "slots": slots }))))
}

async fn update_slot(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AppPath(id): AppPath<i64>,
    AppJson(req): AppJson<SlotUpdate>,
) -> Result<Json<Value>, AppError> {
    req.validate()?;
    let existing = state
        .availability
        .get_slot(id)
        .await?
        .ok_or_else(|| AppError::NotFoundError("Availability not found".to_string()))?;
    check_tour_access(&state, &user, existing.tour_id).await?;

    let slot = state.availability.update_slot(id, &req).await?;
    Ok(Json(json!({ "availability": slot })))
}

async fn delete_slot(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AppPath(id): AppPath<i64>,
) -> Result<Json<Value>, AppError> {
    let existing = state
        .availability
        .get_slot(id)
        .await?
        .ok_or_else(|| AppError::NotFoundError("Availability not found".to_string()))?;
    check_tour_access(&state, &user, existing.tour_id).await?;

    state.availability.delete_slot(id).await?;
    info!(availability_id = id, "Availability deleted");
    Ok(Json(json!({ "success": true })))
}
