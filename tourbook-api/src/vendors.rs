use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tourbook_core::account::{NewVendor, VendorFilter, VendorProfile};
use tracing::info;

use crate::error::{AppError, AppJson, AppPath, AppQuery};
use crate::state::AppState;

/// Admin-only; the caller is checked by the router's middleware.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_vendors).post(create_vendor))
        .route("/{id}", get(get_vendor).put(update_vendor).delete(delete_vendor))
}

async fn list_vendors(
    State(state): State<AppState>,
    AppQuery(filter): AppQuery<VendorFilter>,
) -> Result<Json<Value>, AppError> {
    let vendors = state.vendors.list_vendors(&filter).await?;
    Ok(Json(json!({ "vendors": vendors })))
}

async fn get_vendor(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<Json<Value>, AppError> {
    let vendor = state
        .vendors
        .get_vendor(id)
        .await?
        .ok_or_else(|| AppError::NotFoundError("Vendor not found".to_string()))?;
    Ok(Json(json!({ "vendor": vendor })))
}

/// Also gives the owning user the vendor role.
async fn create_vendor(
    State(state): State<AppState>,
    AppJson(req): AppJson<NewVendor>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    req.profile.validate()?;
    let vendor = state.vendors.create_vendor(&req).await?;
    info!(vendor_id = vendor.id, user_id = vendor.user_id, "Vendor created");
    Ok((StatusCode::CREATED, Json(json!({ "vendor": vendor }))))
}

async fn update_vendor(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
    AppJson(req): AppJson<VendorProfile>,
) -> Result<Json<Value>, AppError> {
    req.validate()?;
    let vendor = state.vendors.update_vendor(id, &req).await?;
    Ok(Json(json!({ "vendor": vendor })))
}

async fn delete_vendor(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<Json<Value>, AppError> {
    state.vendors.delete_vendor(id).await?;
    info!(vendor_id = id, "Vendor deleted");
    Ok(Json(json!({ "success": true })))
}
