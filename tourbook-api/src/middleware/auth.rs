use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tourbook_core::account::{Role, User};
use tourbook_core::booking::Booking;

use crate::error::AppError;
use crate::state::{AppState, AuthConfig};

pub const TOKEN_COOKIE: &str = "token";

// ============================================================================
// JWT Claims
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub email: String,
    pub role: Role,
    pub exp: usize,
}

pub fn issue_token(user: &User, auth: &AuthConfig) -> Result<String, AppError> {
    let exp = Utc::now().timestamp() as usize + auth.expiration as usize;
    let claims = Claims {
        sub: user.id.to_string(),
        email: user.email.clone(),
        role: user.role,
        exp,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(auth.secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalServerError(format!("Failed to sign token: {}", e)))
}

pub fn decode_token(token: &str, secret: &str) -> Result<Claims, AppError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::unauthorized())
}

// ============================================================================
// Session cookie
// ============================================================================

pub fn session_cookie(token: String, auth: &AuthConfig) -> Cookie<'static> {
    Cookie::build((TOKEN_COOKIE, token))
        .http_only(true)
        .secure(auth.cookie_secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(time::Duration::seconds(auth.expiration as i64))
        .build()
}

pub fn removal_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::build((TOKEN_COOKIE, "")).path("/").build();
    cookie.make_removal();
    cookie
}

/// Cookie first, then `Authorization: Bearer`.
fn token_from_parts(parts: &Parts) -> Option<String> {
    let jar = CookieJar::from_headers(&parts.headers);
    if let Some(cookie) = jar.get(TOKEN_COOKIE) {
        if !cookie.value().is_empty() {
            return Some(cookie.value().to_string());
        }
    }
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::to_string)
}

async fn current_user(parts: &Parts, state: &AppState) -> Result<User, AppError> {
    if let Some(user) = parts.extensions.get::<User>() {
        return Ok(user.clone());
    }
    let token = token_from_parts(parts).ok_or_else(AppError::unauthorized)?;
    let claims = decode_token(&token, &state.auth.secret)?;
    let user_id: i64 = claims.sub.parse().map_err(|_| AppError::unauthorized())?;

    // Tokens outlive accounts; a deleted user has no session.
    state
        .users
        .get_user(user_id)
        .await?
        .ok_or_else(AppError::unauthorized)
}

// ============================================================================
// Extractor
// ============================================================================

/// The signed-in user. Rejects with 401 when there is no valid session.
pub struct AuthUser(pub User);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        current_user(parts, state).await.map(AuthUser)
    }
}

// ============================================================================
// Role checks
// ============================================================================

pub fn require_admin(user: &User) -> Result<(), AppError> {
    match user.role {
        Role::Admin => Ok(()),
        _ => Err(AppError::unauthorized()),
    }
}

/// Which vendor's tours `user` may manage: `None` for admins (all of them),
/// the user's own vendor id for vendors. Customers and vendors without a
/// vendor profile are rejected.
pub async fn vendor_scope(state: &AppState, user: &User) -> Result<Option<i64>, AppError> {
    match user.role {
        Role::Admin => Ok(None),
        Role::Vendor => {
            let vendor = state
                .vendors
                .get_vendor_by_user_id(user.id)
                .await?
                .ok_or_else(AppError::unauthorized)?;
            Ok(Some(vendor.id))
        }
        Role::Customer => Err(AppError::unauthorized()),
    }
}

pub fn require_tour_owner(scope: Option<i64>, tour_vendor_id: Option<i64>) -> Result<(), AppError> {
    match scope {
        Some(vendor_id) if tour_vendor_id != Some(vendor_id) => Err(AppError::unauthorized()),
        _ => Ok(()),
    }
}

/// Admins see every booking; everyone else only their own.
pub fn require_booking_access(user: &User, booking: &Booking) -> Result<(), AppError> {
    if user.role == Role::Admin || booking.user_id == Some(user.id) {
        Ok(())
    } else {
        Err(AppError::unauthorized())
    }
}

// ============================================================================
// Admin Authentication Middleware
// ============================================================================

pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let (mut parts, body) = req.into_parts();
    let user = current_user(&parts, &state).await?;
    require_admin(&user)?;

    parts.extensions.insert(user);
    Ok(next.run(Request::from_parts(parts, body)).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request as HttpRequest;

    fn auth() -> AuthConfig {
        AuthConfig {
            secret: "test-secret".into(),
            expiration: 3600,
            bcrypt_cost: 4,
            cookie_secure: false,
            reset_token_ttl: 3600,
        }
    }

    fn user(role: Role) -> User {
        User {
            id: 42,
            email: "ana@example.com".into(),
            password_hash: String::new(),
            first_name: "Ana".into(),
            last_name: "Lima".into(),
            phone: None,
            role,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_token_round_trip_carries_identity() {
        let token = issue_token(&user(Role::Vendor), &auth()).unwrap();
        let claims = decode_token(&token, "test-secret").unwrap();
        assert_eq!(claims.sub, "42");
        assert_eq!(claims.email, "ana@example.com");
        assert_eq!(claims.role, Role::Vendor);
    }

    #[test]
    fn test_token_signed_with_other_secret_is_rejected() {
        let token = issue_token(&user(Role::Admin), &auth()).unwrap();
        assert!(decode_token(&token, "another-secret").is_err());
    }

    #[test]
    fn test_cookie_wins_over_bearer_header() {
        let (parts, _) = HttpRequest::builder()
            .header(header::COOKIE, "theme=dark; token=from-cookie")
            .header(header::AUTHORIZATION, "Bearer from-header")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(token_from_parts(&parts).as_deref(), Some("from-cookie"));
    }

    #[test]
    fn test_bearer_header_used_without_cookie() {
        let (parts, _) = HttpRequest::builder()
            .header(header::AUTHORIZATION, "Bearer abc.def.ghi")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(token_from_parts(&parts).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn test_session_cookie_attributes() {
        let cookie = session_cookie("jwt".into(), &auth());
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age(), Some(time::Duration::seconds(3600)));
    }

    #[test]
    fn test_role_checks() {
        assert!(require_admin(&user(Role::Admin)).is_ok());
        assert!(require_admin(&user(Role::Vendor)).is_err());
    }

    #[test]
    fn test_tour_ownership() {
        assert!(require_tour_owner(None, Some(3)).is_ok());
        assert!(require_tour_owner(Some(3), Some(3)).is_ok());
        assert!(require_tour_owner(Some(3), Some(4)).is_err());
        assert!(require_tour_owner(Some(3), None).is_err());
    }
}
