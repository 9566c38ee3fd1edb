//! Request authentication
//!
//! Two credential forms are accepted: `Authorization: Bearer <jwt>` signed
//! HS256 with the configured shared secret, and `X-API-Key: pk_live_...`
//! keys stored as salted SHA-256 hashes and looked up by their public
//! prefix. Token issuance belongs to the identity provider; this module
//! only verifies. Either path resolves to a [`RequestContext`] that travels
//! through handlers into the signal dispatcher as the acting user.

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;
use compass_common::models::{ApiKey, User};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::SqliteConnection;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Public lead-in of every API key; the indexed lookup prefix includes it
pub const API_KEY_LEAD: &str = "pk_live_";
/// Length of the stored lookup prefix
const PREFIX_LEN: usize = 12;
const SECRET_LEN: usize = 32;
const SALT_LEN: usize = 16;

/// Bearer token payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id as a UUID string
    pub sub: String,
    pub email: String,
    pub iat: u64,
    pub exp: u64,
}

/// Acting user attached to every authenticated request
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user_id: Uuid,
    pub email: String,
}

/// Sign a token for a user. The server never exposes this over HTTP; it
/// exists for tests and local tooling that stand in for the identity
/// provider.
pub fn issue_token(secret: &str, user: &User, expiry_seconds: u64) -> ApiResult<String> {
    let now = unix_now()?;
    let claims = Claims {
        sub: user.id.to_string(),
        email: user.email.clone(),
        iat: now,
        exp: now + expiry_seconds,
    };
    sign(secret, &claims)
}

fn sign(secret: &str, claims: &Claims) -> ApiResult<String> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(format!("Cannot sign token: {}", e)))
}

/// Verify and decode a bearer token
pub fn verify_token(secret: &str, token: &str) -> ApiResult<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|err| {
        use jsonwebtoken::errors::ErrorKind;
        let message = match err.kind() {
            ErrorKind::ExpiredSignature => "Token expired",
            ErrorKind::InvalidSignature => "Invalid signature",
            _ => "Invalid token",
        };
        ApiError::Unauthorized(message.to_string())
    })
}

/// Mint a fresh key for a user. Returns the storable row and the cleartext
/// token, which is shown once and never persisted.
pub fn generate_api_key(user_id: Uuid) -> (ApiKey, String) {
    let token = format!("{}{}", API_KEY_LEAD, random_alphanumeric(SECRET_LEN));
    let salt = random_alphanumeric(SALT_LEN);
    let key = ApiKey {
        id: Uuid::new_v4(),
        prefix: token[..PREFIX_LEN].to_string(),
        hashed_key: hash_key(&token, &salt),
        salt,
        user_id,
        is_active: true,
        last_used: None,
        created_at: Utc::now(),
    };
    (key, token)
}

/// Resolve a presented API key to its user. Lookup is by prefix, the match
/// is a constant-time hash comparison, and successful use stamps
/// `last_used`.
pub async fn verify_api_key(conn: &mut SqliteConnection, presented: &str) -> ApiResult<User> {
    if presented.len() <= PREFIX_LEN || !presented.starts_with(API_KEY_LEAD) {
        return Err(ApiError::Unauthorized("Invalid API key".to_string()));
    }

    let key = db::api_keys::find_by_prefix(&mut *conn, &presented[..PREFIX_LEN])
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid API key".to_string()))?;

    let computed = hash_key(presented, &key.salt);
    if !constant_time_compare(&computed, &key.hashed_key) {
        return Err(ApiError::Unauthorized("Invalid API key".to_string()));
    }

    db::api_keys::touch_last_used(&mut *conn, key.id, Utc::now()).await?;

    db::users::find_user(&mut *conn, key.user_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("API key user no longer exists".to_string()))
}

/// Router middleware: authenticate the request and attach the
/// [`RequestContext`] extension, or fail with 401.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> ApiResult<Response> {
    let context = authenticate(&state, request.headers()).await?;
    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}

async fn authenticate(state: &AppState, headers: &HeaderMap) -> ApiResult<RequestContext> {
    if let Some(token) = bearer_token(headers) {
        let claims = verify_token(&state.config.jwt_secret, token)?;
        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| ApiError::Unauthorized("Invalid token subject".to_string()))?;
        let mut conn = state
            .db
            .acquire()
            .await
            .map_err(|e| ApiError::Common(e.into()))?;
        let user = db::users::find_user(&mut conn, user_id)
            .await?
            .ok_or_else(|| ApiError::Unauthorized("Unknown user".to_string()))?;
        return Ok(RequestContext {
            user_id: user.id,
            email: user.email,
        });
    }

    if let Some(presented) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        let mut conn = state
            .db
            .acquire()
            .await
            .map_err(|e| ApiError::Common(e.into()))?;
        let user = verify_api_key(&mut conn, presented).await?;
        return Ok(RequestContext {
            user_id: user.id,
            email: user.email,
        });
    }

    Err(ApiError::Unauthorized("Missing credentials".to_string()))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get("authorization")?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

fn hash_key(token: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn random_alphanumeric(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Constant-time comparison so hash matching leaks no timing signal
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

fn unix_now() -> ApiResult<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| ApiError::Internal(format!("System time error: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util;
    use axum::http::HeaderValue;

    const SECRET: &str = "test-secret-that-is-at-least-32-characters";

    #[test]
    fn test_token_round_trip() {
        let user = test_util::user("alice@compass.io");
        let token = issue_token(SECRET, &user, 3600).unwrap();

        let claims = verify_token(SECRET, &token).unwrap();
        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.email, "alice@compass.io");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let user = test_util::user("alice@compass.io");
        let token = issue_token(SECRET, &user, 3600).unwrap();

        let result = verify_token("another-secret-that-is-32-characters-ok", &token);
        assert!(matches!(result, Err(ApiError::Unauthorized(_))));
    }

    #[test]
    fn test_expired_token_rejected() {
        let user = test_util::user("alice@compass.io");
        let now = unix_now().unwrap();
        let claims = Claims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            iat: now - 7200,
            exp: now - 3600,
        };
        let token = sign(SECRET, &claims).unwrap();

        let result = verify_token(SECRET, &token);
        assert!(matches!(result, Err(ApiError::Unauthorized(_))));
    }

    #[test]
    fn test_bearer_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Bearer abc123"));
        assert_eq!(bearer_token(&headers), Some("abc123"));

        headers.insert("authorization", HeaderValue::from_static("Basic abc123"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("hello", "hello"));
        assert!(!constant_time_compare("hello", "world"));
        assert!(!constant_time_compare("hello", "hell"));
    }

    #[tokio::test]
    async fn test_api_key_round_trip_stamps_last_used() {
        let pool = test_util::memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let user = test_util::user("alice@compass.io");
        db::users::insert_user(&mut conn, &user).await.unwrap();
        let (key, token) = generate_api_key(user.id);
        assert!(token.starts_with(API_KEY_LEAD));
        db::api_keys::insert_api_key(&mut conn, &key).await.unwrap();

        let resolved = verify_api_key(&mut conn, &token).await.unwrap();
        assert_eq!(resolved.id, user.id);

        let stored = db::api_keys::find_by_prefix(&mut conn, &key.prefix)
            .await
            .unwrap()
            .unwrap();
        assert!(stored.last_used.is_some());
    }

    #[tokio::test]
    async fn test_tampered_key_rejected() {
        let pool = test_util::memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let user = test_util::user("alice@compass.io");
        db::users::insert_user(&mut conn, &user).await.unwrap();
        let (key, token) = generate_api_key(user.id);
        db::api_keys::insert_api_key(&mut conn, &key).await.unwrap();

        // Same prefix, different secret part
        let mut forged = token.clone();
        forged.push('x');
        assert!(verify_api_key(&mut conn, &forged).await.is_err());

        let unknown = format!("{}{}", API_KEY_LEAD, "0000nope0000nope0000nope0000nope");
        assert!(verify_api_key(&mut conn, &unknown).await.is_err());
    }

    #[tokio::test]
    async fn test_inactive_key_rejected() {
        let pool = test_util::memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let user = test_util::user("alice@compass.io");
        db::users::insert_user(&mut conn, &user).await.unwrap();
        let (mut key, token) = generate_api_key(user.id);
        key.is_active = false;
        db::api_keys::insert_api_key(&mut conn, &key).await.unwrap();

        let result = verify_api_key(&mut conn, &token).await;
        assert!(matches!(result, Err(ApiError::Unauthorized(_))));
    }
}
