use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tourbook_api::middleware::auth::issue_token;
use tourbook_api::password::hash_password;
use tourbook_api::state::{AppState, AuthConfig, Repositories};
use tourbook_api::app;
use tourbook_core::account::{NewUser, Role};
use tourbook_core::repository::{PasswordResetRepository, UserRepository};
use tourbook_store::app_config::BusinessRules;
use tourbook_store::MemoryStore;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    store: Arc<MemoryStore>,
    auth: AuthConfig,
}

struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

fn test_app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let auth = AuthConfig {
        secret: "integration-secret".into(),
        expiration: 3600,
        bcrypt_cost: 4,
        cookie_secure: false,
        reset_token_ttl: 3600,
    };
    let state = AppState::new(Repositories::shared(store.clone()), auth.clone(), BusinessRules::default());
    TestApp { router: app(state), store, auth }
}

impl TestApp {
    async fn send(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send_request(request).await
    }

    async fn send_request(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        TestResponse { status, headers, body }
    }

    /// Creates a user straight in the store and returns a bearer token for it.
    async fn user_with_token(&self, email: &str, role: Role) -> (i64, String) {
        let user = self
            .store
            .create_user(&NewUser {
                email: email.to_string(),
                password_hash: hash_password("password123", 4).await.unwrap(),
                first_name: "Test".into(),
                last_name: "User".into(),
                phone: None,
                role,
            })
            .await
            .unwrap();
        let token = issue_token(&user, &self.auth).unwrap();
        (user.id, token)
    }

    /// A tour with one slot of `max_spots` seats at 50 per adult.
    async fn tour_with_slot(&self, admin: &str, max_spots: i32) -> (i64, i64) {
        let tour = self
            .send(
                Method::POST,
                "/tours",
                Some(admin),
                Some(json!({
                    "abstract": "Old town walk",
                    "description": "Two hours through the historic centre",
                    "activity_type": "walking"
                })),
            )
            .await;
        assert_eq!(tour.status, StatusCode::CREATED);
        let tour_id = tour.body["tour"]["id"].as_i64().unwrap();

        let slot = self
            .send(
                Method::POST,
                "/availability",
                Some(admin),
                Some(json!({
                    "tour_id": tour_id,
                    "date": "2030-05-01",
                    "start_time": "09:00:00",
                    "max_spots": max_spots,
                    "price_adult": "50.00",
                    "price_child": "20.00"
                })),
            )
            .await;
        assert_eq!(slot.status, StatusCode::CREATED);
        (tour_id, slot.body["availability"]["id"].as_i64().unwrap())
    }
}

fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().unwrap(),
        other => other.to_string().parse().unwrap(),
    }
}

#[tokio::test]
async fn test_health() {
    let app = test_app();
    let res = app.send(Method::GET, "/health", None, None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["status"], "ok");
}

#[tokio::test]
async fn test_register_login_me_logout() {
    let app = test_app();
    let registration = json!({
        "email": "Maria@Example.com",
        "password": "s3cret-pass",
        "first_name": "Maria",
        "last_name": "Souza"
    });

    let res = app.send(Method::POST, "/auth/register", None, Some(registration.clone())).await;
    assert_eq!(res.status, StatusCode::CREATED);
    assert_eq!(res.body["user"]["email"], "maria@example.com");
    assert_eq!(res.body["user"]["role"], "customer");
    assert!(res.body["user"].get("password_hash").is_none());

    let dup = app.send(Method::POST, "/auth/register", None, Some(registration)).await;
    assert_eq!(dup.status, StatusCode::BAD_REQUEST);
    assert_eq!(dup.body["error"], "User with this email already exists");

    let bad = app
        .send(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "email": "maria@example.com", "password": "wrong-pass" })),
        )
        .await;
    assert_eq!(bad.status, StatusCode::UNAUTHORIZED);
    assert_eq!(bad.body["error"], "Invalid email or password");

    let login = app
        .send(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "email": "maria@example.com", "password": "s3cret-pass" })),
        )
        .await;
    assert_eq!(login.status, StatusCode::OK);
    let set_cookie = login.headers.get(header::SET_COOKIE).unwrap().to_str().unwrap().to_string();
    assert!(set_cookie.starts_with("token="));
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("SameSite=Lax"));

    let cookie = set_cookie.split(';').next().unwrap().to_string();
    let me = app
        .send_request(
            Request::builder()
                .uri("/auth/me")
                .header(header::COOKIE, cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["user"]["first_name"], "Maria");

    let logout = app.send(Method::POST, "/auth/logout", None, None).await;
    assert_eq!(logout.status, StatusCode::OK);
    assert_eq!(logout.body["success"], true);
    let cleared = logout.headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(cleared.contains("Max-Age=0"));
}

#[tokio::test]
async fn test_register_rejects_short_password() {
    let app = test_app();
    let res = app
        .send(
            Method::POST,
            "/auth/register",
            None,
            Some(json!({ "email": "a@b.io", "password": "short", "first_name": "A", "last_name": "B" })),
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["error"], "Password must be at least 8 characters");
}

#[tokio::test]
async fn test_me_requires_session() {
    let app = test_app();
    let res = app.send(Method::GET, "/auth/me", None, None).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);

    let forged = app.send(Method::GET, "/auth/me", Some("not-a-jwt"), None).await;
    assert_eq!(forged.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_change_password_checks_current_password() {
    let app = test_app();
    let (_, token) = app.user_with_token("pat@example.com", Role::Customer).await;

    let wrong = app
        .send(
            Method::POST,
            "/auth/change-password",
            Some(&token),
            Some(json!({ "current_password": "nope-nope", "new_password": "brand-new-pass" })),
        )
        .await;
    assert_eq!(wrong.status, StatusCode::BAD_REQUEST);
    assert_eq!(wrong.body["error"], "Current password is incorrect");

    let ok = app
        .send(
            Method::POST,
            "/auth/change-password",
            Some(&token),
            Some(json!({ "current_password": "password123", "new_password": "brand-new-pass" })),
        )
        .await;
    assert_eq!(ok.status, StatusCode::OK);

    let login = app
        .send(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "email": "pat@example.com", "password": "brand-new-pass" })),
        )
        .await;
    assert_eq!(login.status, StatusCode::OK);
}

#[tokio::test]
async fn test_password_reset_flow() {
    let app = test_app();
    let (user_id, _) = app.user_with_token("lee@example.com", Role::Customer).await;

    let unknown = app
        .send(Method::POST, "/auth/forgot-password", None, Some(json!({ "email": "ghost@example.com" })))
        .await;
    assert_eq!(unknown.status, StatusCode::OK);
    assert_eq!(unknown.body["success"], true);

    let invalid = app
        .send(
            Method::POST,
            "/auth/reset-password",
            None,
            Some(json!({ "token": "missing", "password": "another-pass" })),
        )
        .await;
    assert_eq!(invalid.status, StatusCode::BAD_REQUEST);
    assert_eq!(invalid.body["error"], "Invalid or expired token");

    app.store
        .upsert_reset_token(user_id, "expired-token", Utc::now() - Duration::minutes(1))
        .await
        .unwrap();
    let expired = app
        .send(
            Method::POST,
            "/auth/reset-password",
            None,
            Some(json!({ "token": "expired-token", "password": "another-pass" })),
        )
        .await;
    assert_eq!(expired.status, StatusCode::BAD_REQUEST);

    app.store
        .upsert_reset_token(user_id, "fresh-token", Utc::now() + Duration::hours(1))
        .await
        .unwrap();
    let reset = app
        .send(
            Method::POST,
            "/auth/reset-password",
            None,
            Some(json!({ "token": "fresh-token", "password": "another-pass" })),
        )
        .await;
    assert_eq!(reset.status, StatusCode::OK);
    assert!(app.store.find_reset_token("fresh-token").await.unwrap().is_none());

    let login = app
        .send(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "email": "lee@example.com", "password": "another-pass" })),
        )
        .await;
    assert_eq!(login.status, StatusCode::OK);
}

#[tokio::test]
async fn test_update_profile_rejects_taken_email() {
    let app = test_app();
    app.user_with_token("taken@example.com", Role::Customer).await;
    let (_, token) = app.user_with_token("me@example.com", Role::Customer).await;

    let clash = app
        .send(
            Method::PUT,
            "/auth/update-profile",
            Some(&token),
            Some(json!({ "email": "taken@example.com", "first_name": "Me", "last_name": "Too" })),
        )
        .await;
    assert_eq!(clash.status, StatusCode::BAD_REQUEST);
    assert_eq!(clash.body["error"], "Email already in use by another account");

    let ok = app
        .send(
            Method::PUT,
            "/auth/update-profile",
            Some(&token),
            Some(json!({ "email": "me@example.com", "first_name": "Renamed", "last_name": "Too" })),
        )
        .await;
    assert_eq!(ok.status, StatusCode::OK);
    assert_eq!(ok.body["user"]["first_name"], "Renamed");
    assert_eq!(ok.body["user"]["role"], "customer");
}

#[tokio::test]
async fn test_admin_routes_reject_other_roles() {
    let app = test_app();
    let (_, customer) = app.user_with_token("c@example.com", Role::Customer).await;
    let (_, admin) = app.user_with_token("root@example.com", Role::Admin).await;

    assert_eq!(app.send(Method::GET, "/users", None, None).await.status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.send(Method::GET, "/users", Some(&customer), None).await.status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.send(Method::GET, "/vendors", Some(&customer), None).await.status, StatusCode::UNAUTHORIZED);

    let users = app.send(Method::GET, "/users", Some(&admin), None).await;
    assert_eq!(users.status, StatusCode::OK);
    assert_eq!(users.body["users"].as_array().unwrap().len(), 2);

    let category = app
        .send(Method::POST, "/categories", Some(&customer), Some(json!({ "name": "Food", "code": "food" })))
        .await;
    assert_eq!(category.status, StatusCode::UNAUTHORIZED);

    let tour = app
        .send(
            Method::POST,
            "/tours",
            Some(&customer),
            Some(json!({ "abstract": "x", "description": "y", "activity_type": "z" })),
        )
        .await;
    assert_eq!(tour.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_vendor_manages_only_own_tours() {
    let app = test_app();
    let (_, admin) = app.user_with_token("root@example.com", Role::Admin).await;
    let (vendor_user, _) = app.user_with_token("guide@example.com", Role::Customer).await;

    let vendor = app
        .send(
            Method::POST,
            "/vendors",
            Some(&admin),
            Some(json!({ "user_id": vendor_user, "company_name": "Harbour Guides" })),
        )
        .await;
    assert_eq!(vendor.status, StatusCode::CREATED);
    let vendor_id = vendor.body["vendor"]["id"].as_i64().unwrap();

    // The role changed, so sign in again to pick it up.
    let login = app
        .send(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "email": "guide@example.com", "password": "password123" })),
        )
        .await;
    assert_eq!(login.body["user"]["role"], "vendor");
    let vendor_token = login.body["token"].as_str().unwrap().to_string();

    let own = app
        .send(
            Method::POST,
            "/tours",
            Some(&vendor_token),
            Some(json!({
                "abstract": "Harbour cruise",
                "description": "Boats",
                "activity_type": "boat",
                "vendor_id": 999
            })),
        )
        .await;
    assert_eq!(own.status, StatusCode::CREATED);
    assert_eq!(own.body["tour"]["vendor_id"], vendor_id);

    let (other_tour, _) = app.tour_with_slot(&admin, 4).await;
    let denied = app.send(Method::DELETE, &format!("/tours/{}", other_tour), Some(&vendor_token), None).await;
    assert_eq!(denied.status, StatusCode::UNAUTHORIZED);

    let own_id = own.body["tour"]["id"].as_i64().unwrap();
    let deleted = app.send(Method::DELETE, &format!("/tours/{}", own_id), Some(&vendor_token), None).await;
    assert_eq!(deleted.status, StatusCode::OK);
    assert_eq!(deleted.body["success"], true);
}

#[tokio::test]
async fn test_booking_reserves_seats_and_rejects_overbooking() {
    let app = test_app();
    let (_, admin) = app.user_with_token("root@example.com", Role::Admin).await;
    let (_, alice) = app.user_with_token("alice@example.com", Role::Customer).await;
    let (_, bob) = app.user_with_token("bob@example.com", Role::Customer).await;
    let (tour_id, slot_id) = app.tour_with_slot(&admin, 3).await;

    let booking = app
        .send(
            Method::POST,
            "/bookings",
            Some(&alice),
            Some(json!({ "tour_id": tour_id, "availability_id": slot_id, "adults": 1, "children": 1 })),
        )
        .await;
    assert_eq!(booking.status, StatusCode::CREATED);
    assert_eq!(booking.body["booking"]["status"], "pending");
    assert_eq!(booking.body["booking"]["payment_status"], "unpaid");
    assert_eq!(decimal(&booking.body["booking"]["total_price"]), Decimal::from(70));
    assert!(booking.body["booking"]["booking_number"].as_str().unwrap().starts_with("RSQ"));

    let slot = app.send(Method::GET, &format!("/availability/{}", slot_id), None, None).await;
    assert_eq!(slot.body["availability"]["spots_booked"], 2);

    let over = app
        .send(
            Method::POST,
            "/bookings",
            Some(&bob),
            Some(json!({ "tour_id": tour_id, "availability_id": slot_id, "adults": 2 })),
        )
        .await;
    assert_eq!(over.status, StatusCode::CONFLICT);

    let fits = app
        .send(
            Method::POST,
            "/bookings",
            Some(&bob),
            Some(json!({ "tour_id": tour_id, "availability_id": slot_id, "adults": 1 })),
        )
        .await;
    assert_eq!(fits.status, StatusCode::CREATED);

    let open = app
        .send(Method::GET, &format!("/availability?tourId={}&date=2030-05-01", tour_id), None, None)
        .await;
    assert_eq!(open.status, StatusCode::OK);
    assert!(open.body["slots"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_customers_only_see_their_own_bookings() {
    let app = test_app();
    let (_, admin) = app.user_with_token("root@example.com", Role::Admin).await;
    let (_, alice) = app.user_with_token("alice@example.com", Role::Customer).await;
    let (_, bob) = app.user_with_token("bob@example.com", Role::Customer).await;
    let (tour_id, slot_id) = app.tour_with_slot(&admin, 10).await;

    let created = app
        .send(
            Method::POST,
            "/bookings",
            Some(&alice),
            Some(json!({ "tour_id": tour_id, "availability_id": slot_id, "adults": 2 })),
        )
        .await;
    let booking_id = created.body["booking"]["id"].as_i64().unwrap();
    let number = created.body["booking"]["booking_number"].as_str().unwrap().to_string();

    let mine = app.send(Method::GET, "/bookings", Some(&alice), None).await;
    assert_eq!(mine.body["bookings"].as_array().unwrap().len(), 1);
    let theirs = app.send(Method::GET, "/bookings", Some(&bob), None).await;
    assert!(theirs.body["bookings"].as_array().unwrap().is_empty());

    let peek = app.send(Method::GET, &format!("/bookings/{}", booking_id), Some(&bob), None).await;
    assert_eq!(peek.status, StatusCode::UNAUTHORIZED);
    let by_number = app.send(Method::GET, &format!("/bookings/number/{}", number), Some(&alice), None).await;
    assert_eq!(by_number.status, StatusCode::OK);
    assert_eq!(by_number.body["booking"]["id"], booking_id);

    let edit = app
        .send(Method::PUT, &format!("/bookings/{}", booking_id), Some(&alice), Some(json!({ "adults": 1 })))
        .await;
    assert_eq!(edit.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_update_and_delete_move_seats() {
    let app = test_app();
    let (_, admin) = app.user_with_token("root@example.com", Role::Admin).await;
    let (_, alice) = app.user_with_token("alice@example.com", Role::Customer).await;
    let (tour_id, slot_id) = app.tour_with_slot(&admin, 10).await;
    let slot_uri = format!("/availability/{}", slot_id);

    let created = app
        .send(
            Method::POST,
            "/bookings",
            Some(&alice),
            Some(json!({ "tour_id": tour_id, "availability_id": slot_id, "adults": 2, "children": 1 })),
        )
        .await;
    let booking_uri = format!("/bookings/{}", created.body["booking"]["id"].as_i64().unwrap());
    assert_eq!(app.send(Method::GET, &slot_uri, None, None).await.body["availability"]["spots_booked"], 3);

    let shrunk = app.send(Method::PUT, &booking_uri, Some(&admin), Some(json!({ "adults": 1 }))).await;
    assert_eq!(shrunk.status, StatusCode::OK);
    assert_eq!(decimal(&shrunk.body["booking"]["total_price"]), Decimal::from(70));
    assert_eq!(app.send(Method::GET, &slot_uri, None, None).await.body["availability"]["spots_booked"], 2);

    let cancelled = app.send(Method::PATCH, &booking_uri, Some(&admin), Some(json!({ "status": "cancelled" }))).await;
    assert_eq!(cancelled.body["booking"]["status"], "cancelled");
    assert_eq!(app.send(Method::GET, &slot_uri, None, None).await.body["availability"]["spots_booked"], 0);

    let restored = app.send(Method::PATCH, &booking_uri, Some(&admin), Some(json!({ "status": "confirmed" }))).await;
    assert_eq!(restored.status, StatusCode::OK);
    assert_eq!(app.send(Method::GET, &slot_uri, None, None).await.body["availability"]["spots_booked"], 2);

    let deleted = app.send(Method::DELETE, &booking_uri, Some(&admin), None).await;
    assert_eq!(deleted.body["success"], true);
    assert_eq!(app.send(Method::GET, &slot_uri, None, None).await.body["availability"]["spots_booked"], 0);
    assert_eq!(app.send(Method::GET, &booking_uri, Some(&admin), None).await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_payment_success_then_refund() {
    let app = test_app();
    let (_, admin) = app.user_with_token("root@example.com", Role::Admin).await;
    let (_, alice) = app.user_with_token("alice@example.com", Role::Customer).await;
    let (tour_id, slot_id) = app.tour_with_slot(&admin, 10).await;

    let created = app
        .send(
            Method::POST,
            "/bookings",
            Some(&alice),
            Some(json!({ "tour_id": tour_id, "availability_id": slot_id, "adults": 2 })),
        )
        .await;
    let booking_id = created.body["booking"]["id"].as_i64().unwrap();

    let payment = app
        .send(
            Method::POST,
            "/payments",
            Some(&alice),
            Some(json!({
                "booking_id": booking_id,
                "amount": "100.00",
                "payment_method": "card",
                "payment_intent_id": "pi_123",
                "status": "succeeded"
            })),
        )
        .await;
    assert_eq!(payment.status, StatusCode::CREATED);
    assert_eq!(payment.body["payment"]["currency"], "USD");
    let payment_id = payment.body["payment"]["id"].as_i64().unwrap();

    let booking = app.send(Method::GET, &format!("/bookings/{}", booking_id), Some(&alice), None).await;
    assert_eq!(booking.body["booking"]["payment_status"], "paid");
    assert_eq!(booking.body["booking"]["payment_intent_id"], "pi_123");
    assert_eq!(booking.body["booking"]["status"], "confirmed");

    let forbidden = app
        .send(
            Method::PUT,
            &format!("/payments/{}", payment_id),
            Some(&alice),
            Some(json!({ "status": "refunded" })),
        )
        .await;
    assert_eq!(forbidden.status, StatusCode::UNAUTHORIZED);

    let refunded = app
        .send(
            Method::PUT,
            &format!("/payments/{}", payment_id),
            Some(&admin),
            Some(json!({ "status": "refunded", "refund_amount": "100.00" })),
        )
        .await;
    assert_eq!(refunded.status, StatusCode::OK);

    let booking = app.send(Method::GET, &format!("/bookings/{}", booking_id), Some(&alice), None).await;
    assert_eq!(booking.body["booking"]["payment_status"], "refunded");
    assert_eq!(booking.body["booking"]["status"], "refunded");
    let slot = app.send(Method::GET, &format!("/availability/{}", slot_id), None, None).await;
    assert_eq!(slot.body["availability"]["spots_booked"], 0);

    let listed = app.send(Method::GET, &format!("/payments?booking_id={}", booking_id), Some(&admin), None).await;
    assert_eq!(listed.body["payments"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_travelers_are_listed_lead_first() {
    let app = test_app();
    let (_, admin) = app.user_with_token("root@example.com", Role::Admin).await;
    let (_, alice) = app.user_with_token("alice@example.com", Role::Customer).await;
    let (tour_id, slot_id) = app.tour_with_slot(&admin, 10).await;

    let created = app
        .send(
            Method::POST,
            "/bookings",
            Some(&alice),
            Some(json!({ "tour_id": tour_id, "availability_id": slot_id, "adults": 2 })),
        )
        .await;
    let uri = format!("/bookings/{}/travelers", created.body["booking"]["id"].as_i64().unwrap());

    let companion = app
        .send(Method::POST, &uri, Some(&alice), Some(json!({ "first_name": "Bo", "last_name": "Ng" })))
        .await;
    assert_eq!(companion.status, StatusCode::CREATED);
    assert_eq!(companion.body["traveler"]["traveler_type"], "adult");
    let lead = app
        .send(
            Method::POST,
            &uri,
            Some(&alice),
            Some(json!({ "first_name": "Alice", "last_name": "Ng", "is_lead": true })),
        )
        .await;
    assert_eq!(lead.status, StatusCode::CREATED);

    let listed = app.send(Method::GET, &uri, Some(&alice), None).await;
    let travelers = listed.body["travelers"].as_array().unwrap();
    assert_eq!(travelers.len(), 2);
    assert_eq!(travelers[0]["first_name"], "Alice");
}

#[tokio::test]
async fn test_bad_requests_render_json_errors() {
    let app = test_app();
    let (_, alice) = app.user_with_token("alice@example.com", Role::Customer).await;

    let malformed = app
        .send_request(
            Request::builder()
                .method(Method::POST)
                .uri("/bookings")
                .header(header::AUTHORIZATION, format!("Bearer {}", alice))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await;
    assert_eq!(malformed.status, StatusCode::BAD_REQUEST);
    assert!(malformed.body["error"].is_string());

    let bad_path = app.send(Method::GET, "/tours/abc", None, None).await;
    assert_eq!(bad_path.status, StatusCode::BAD_REQUEST);
    assert!(bad_path.body["error"].is_string());

    let missing = app.send(Method::GET, "/tours/404", None, None).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    assert_eq!(missing.body["error"], "Tour not found");

    let no_tour = app.send(Method::GET, "/availability?date=2030-05-01", None, None).await;
    assert_eq!(no_tour.status, StatusCode::BAD_REQUEST);
    assert_eq!(no_tour.body["error"], "Tour ID and date are required");

    let empty_party = app
        .send(
            Method::POST,
            "/bookings",
            Some(&alice),
            Some(json!({ "tour_id": 1, "availability_id": 1, "adults": 0, "children": 0 })),
        )
        .await;
    assert_eq!(empty_party.status, StatusCode::BAD_REQUEST);

    let huge_party = app
        .send(
            Method::POST,
            "/bookings",
            Some(&alice),
            Some(json!({ "tour_id": 1, "availability_id": 1, "adults": i32::MAX, "children": 1 })),
        )
        .await;
    assert_eq!(huge_party.status, StatusCode::BAD_REQUEST);
    assert!(huge_party.body["error"].is_string());
}
