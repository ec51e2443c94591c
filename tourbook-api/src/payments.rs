use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tourbook_core::payment::{NewPayment, PaymentFilter, PaymentUpdate};

use crate::error::{AppError, AppJson, AppPath, AppQuery};
use crate::middleware::auth::{require_admin, require_booking_access, AuthUser};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_payments).post(record_payment))
        .route("/{id}", get(get_payment).put(update_payment))
}

async fn list_payments(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AppQuery(filter): AppQuery<PaymentFilter>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;
    let payments = state.payments.list(&filter).await?;
    Ok(Json(json!({ "payments": payments })))
}

/// Records a settled payment; a succeeded one marks the booking paid.
async fn record_payment(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AppJson(req): AppJson<NewPayment>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let booking = state.bookings.get(req.booking_id).await?;
    require_booking_access(&user, &booking)?;

    let payment = state.payments.record(req).await?;
    Ok((StatusCode::CREATED, Json(json!({ "payment": payment }))))
}

async fn get_payment(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AppPath(id): AppPath<i64>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;
    let payment = state.payments.get(id).await?;
    Ok(Json(json!({ "payment": payment })))
}

async fn update_payment(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AppPath(id): AppPath<i64>,
    AppJson(req): AppJson<PaymentUpdate>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;
    let payment = state.payments.update(id, req).await?;
    Ok(Json(json!({ "payment": payment })))
}
