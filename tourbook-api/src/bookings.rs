use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tourbook_core::account::Role;
use tourbook_core::booking::{BookingChanges, BookingFilter, BookingRequest, NewTraveler};
use tracing::info;

use crate::error::{AppError, AppJson, AppPath, AppQuery};
use crate::middleware::auth::{require_admin, require_booking_access, vendor_scope, AuthUser};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_bookings).post(create_booking))
        .route(
            "/{id}",
            get(get_booking)
                .put(update_booking)
                .patch(patch_booking)
                .delete(delete_booking),
        )
        .route("/number/{booking_number}", get(get_booking_by_number))
        .route("/{id}/travelers", get(list_travelers).post(add_traveler))
}

/// Customers only ever see their own bookings and vendors those on their tours.
async fn list_bookings(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AppQuery(mut filter): AppQuery<BookingFilter>,
) -> Result<Json<Value>, AppError> {
    match user.role {
        Role::Admin => {}
        Role::Vendor => filter.vendor_id = vendor_scope(&state, &user).await?,
        Role::Customer => filter.user_id = Some(user.id),
    }
    let bookings = state.bookings.list(&filter).await?;
    Ok(Json(json!({ "bookings": bookings })))
}

async fn create_booking(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AppJson(req): AppJson<BookingRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let booking = state.bookings.create(Some(user.id), req).await?;
    Ok((StatusCode::CREATED, Json(json!({ "booking": booking }))))
}

async fn get_booking(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AppPath(id): AppPath<i64>,
) -> Result<Json<Value>, AppError> {
    let booking = state.bookings.get(id).await?;
    require_booking_access(&user, &booking)?;
    Ok(Json(json!({ "booking": booking })))
}

async fn get_booking_by_number(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AppPath(booking_number): AppPath<String>,
) -> Result<Json<Value>, AppError> {
    let booking = state.bookings.get_by_number(&booking_number).await?;
    require_booking_access(&user, &booking)?;
    Ok(Json(json!({ "booking": booking })))
}

async fn update_booking(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AppPath(id): AppPath<i64>,
    AppJson(changes): AppJson<BookingChanges>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;
    let booking = state.bookings.update(id, changes).await?;
    Ok(Json(json!({ "booking": booking })))
}

/// A status in the body wins, then a payment status; anything else is a
/// plain update.
async fn patch_booking(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AppPath(id): AppPath<i64>,
    AppJson(changes): AppJson<BookingChanges>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;
    let booking = if let Some(status) = changes.status {
        state.bookings.set_status(id, status).await?
    } else if let Some(payment_status) = changes.payment_status {
        state
            .bookings
            .set_payment_status(id, payment_status, changes.payment_intent_id)
            .await?
    } else {
        state.bookings.update(id, changes).await?
    };
    Ok(Json(json!({ "booking": booking })))
}

async fn delete_booking(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AppPath(id): AppPath<i64>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;
    state.bookings.delete(id).await?;
    info!(booking_id = id, deleted_by = user.id, "Booking deleted");
    Ok(Json(json!({ "success": true })))
}

async fn list_travelers(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AppPath(id): AppPath<i64>,
) -> Result<Json<Value>, AppError> {
    let booking = state.bookings.get(id).await?;
    require_booking_access(&user, &booking)?;
    let travelers = state.bookings.travelers(id).await?;
    Ok(Json(json!({ "travelers": travelers })))
}

async fn add_traveler(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AppPath(id): AppPath<i64>,
    AppJson(req): AppJson<NewTraveler>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let booking = state.bookings.get(id).await?;
    require_booking_access(&user, &booking)?;
    let traveler = state.bookings.add_traveler(id, req).await?;
    Ok((StatusCode::CREATED, Json(json!({ "traveler": traveler }))))
}
