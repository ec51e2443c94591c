use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequest, FromRequestParts,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tourbook_core::CoreError;

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    ValidationError(String),
    NotFoundError(String),
    InternalServerError(String),
    Anyhow(anyhow::Error),
}

impl AppError {
    pub fn unauthorized() -> Self {
        AppError::AuthenticationError("Unauthorized".to_string())
    }
}

fn core_error_parts(err: &CoreError) -> (StatusCode, String) {
    match err {
        CoreError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        CoreError::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        CoreError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
        CoreError::CapacityExceeded { .. }
        | CoreError::DuplicateBookingNumber(_)
        | CoreError::Conflict(_) => (StatusCode::CONFLICT, err.to_string()),
        CoreError::StoreError(msg) => {
            tracing::error!("Internal Server Error: {}", msg);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
        }
    }
}

fn anyhow_parts(err: anyhow::Error) -> (StatusCode, String) {
    if let Some(core) = err.downcast_ref::<CoreError>() {
        return core_error_parts(core);
    }
    if let Some(rejection) = err.downcast_ref::<JsonRejection>() {
        return (StatusCode::BAD_REQUEST, rejection.body_text());
    }
    if let Some(rejection) = err.downcast_ref::<QueryRejection>() {
        return (StatusCode::BAD_REQUEST, rejection.body_text());
    }
    if let Some(rejection) = err.downcast_ref::<PathRejection>() {
        return (StatusCode::BAD_REQUEST, rejection.body_text());
    }
    tracing::error!("Internal Server Error: {:#}", err);
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
            AppError::Anyhow(err) => anyhow_parts(err),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::Anyhow(err.into())
    }
}

// Extractors whose rejections render as `{"error": ...}` like every other failure.

#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct AppQuery<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct AppPath<T>(pub T);
