use axum::{
    http::Method,
    middleware::from_fn_with_state,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod availability;
pub mod bookings;
pub mod categories;
pub mod error;
pub mod middleware;
pub mod password;
pub mod payments;
pub mod state;
pub mod tours;
pub mod users;
pub mod vendors;

pub use state::AppState;

pub fn app(state: AppState) -> Router {
    // CORS Middleware
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    let admin_only = from_fn_with_state(state.clone(), middleware::admin_auth_middleware);

    Router::new()
        .route("/health", get(health))
        .nest("/auth", auth::routes())
        .nest("/tours", tours::routes())
        .nest("/categories", categories::routes())
        .nest("/availability", availability::routes())
        .nest("/bookings", bookings::routes())
        .nest("/payments", payments::routes())
        .nest("/users", users::routes().route_layer(admin_only.clone()))
        .nest("/vendors", vendors::routes().route_layer(admin_only))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
