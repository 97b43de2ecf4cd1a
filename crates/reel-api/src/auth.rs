use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::extract::{Query, State};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::info;

use reel_db::Database;
use reel_types::api::{AuthResponse, Claims, LoginRequest, RegisterRequest};
use reel_types::models::UserId;

use crate::blocking;
use crate::error::ServiceError;
use crate::ingest::VideoIngestionPipeline;
use crate::response::Reply;

const MAX_USERNAME_CHARS: usize = 32;
const MIN_PASSWORD_CHARS: usize = 6;
const MAX_PASSWORD_CHARS: usize = 32;
const TOKEN_LIFETIME_DAYS: i64 = 30;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
    pub pipeline: VideoIngestionPipeline,
}

pub async fn register(
    State(state): State<AppState>,
    Query(req): Query<RegisterRequest>,
) -> Result<Reply<AuthResponse>, ServiceError> {
    let db = state.db.clone();
    let secret = state.jwt_secret.clone();
    let response =
        blocking(move || register_user(&db, &secret, &req.username, &req.password)).await?;
    Ok(Reply::ok(response))
}

pub async fn login(
    State(state): State<AppState>,
    Query(req): Query<LoginRequest>,
) -> Result<Reply<AuthResponse>, ServiceError> {
    let db = state.db.clone();
    let secret = state.jwt_secret.clone();
    let response = blocking(move || login_user(&db, &secret, &req.username, &req.password)).await?;
    Ok(Reply::ok(response))
}

/// Creates an account and issues its first token. An existing name fails
/// before anything is written.
pub fn register_user(
    db: &Database,
    secret: &str,
    username: &str,
    password: &str,
) -> Result<AuthResponse, ServiceError> {
    let name_len = username.chars().count();
    if name_len == 0 || name_len > MAX_USERNAME_CHARS {
        return Err(ServiceError::validation(format!(
            "username must be 1 to {} characters",
            MAX_USERNAME_CHARS
        )));
    }
    let password_len = password.chars().count();
    if !(MIN_PASSWORD_CHARS..=MAX_PASSWORD_CHARS).contains(&password_len) {
        return Err(ServiceError::validation(format!(
            "password must be {} to {} characters",
            MIN_PASSWORD_CHARS, MAX_PASSWORD_CHARS
        )));
    }

    let existing = db
        .get_user_by_username(username)
        .map_err(|e| ServiceError::internal(format!("look up username '{}'", username), e))?;
    if existing.is_some() {
        return Err(ServiceError::UserAlreadyExists);
    }

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| ServiceError::internal("hash password", e))?
        .to_string();

    // Losing a race with a concurrent registration surfaces as `None`.
    let user_id = db
        .create_user(username, &password_hash, Utc::now().timestamp_millis())
        .map_err(|e| ServiceError::internal(format!("create user '{}'", username), e))?
        .ok_or(ServiceError::UserAlreadyExists)?;

    info!(user_id, username, "user registered");

    let token = create_token(secret, user_id, username)?;
    Ok(AuthResponse { user_id, token })
}

/// Unknown names and wrong passwords fail identically.
pub fn login_user(
    db: &Database,
    secret: &str,
    username: &str,
    password: &str,
) -> Result<AuthResponse, ServiceError> {
    let user = db
        .get_user_by_username(username)
        .map_err(|e| ServiceError::internal(format!("look up username '{}'", username), e))?
        .ok_or(ServiceError::Unauthorized)?;

    let parsed_hash = PasswordHash::new(&user.password)
        .map_err(|e| ServiceError::internal(format!("parse stored hash of user {}", user.id), e))?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| ServiceError::Unauthorized)?;

    let token = create_token(secret, user.id, &user.username)?;
    Ok(AuthResponse { user_id: user.id, token })
}

pub fn create_token(secret: &str, user_id: UserId, username: &str) -> Result<String, ServiceError> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (Utc::now() + chrono::Duration::days(TOKEN_LIFETIME_DAYS)).timestamp() as usize,
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| ServiceError::internal(format!("sign token for user {}", user_id), e))
}

pub fn decode_token(secret: &str, token: &str) -> Result<Claims, ServiceError> {
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &Validation::default())
        .map(|data| data.claims)
        .map_err(|_| ServiceError::Unauthorized)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    fn user_count(db: &Database) -> i64 {
        db.with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?))
            .unwrap()
    }

    #[test]
    fn duplicate_registration_fails_without_writing() {
        let db = Database::open_in_memory().unwrap();
        let first = register_user(&db, SECRET, "alice", "pw1pw1").unwrap();
        assert_eq!(user_count(&db), 1);

        let err = register_user(&db, SECRET, "alice", "another").unwrap_err();
        assert!(matches!(err, ServiceError::UserAlreadyExists));
        assert_eq!(user_count(&db), 1);

        let claims = decode_token(SECRET, &first.token).unwrap();
        assert_eq!(claims.sub, first.user_id);
        assert_eq!(claims.username, "alice");
    }

    #[test]
    fn invalid_credentials_are_rejected_before_storage() {
        let db = Database::open_in_memory().unwrap();
        let long_name = "x".repeat(33);
        for (name, password) in [("", "secret"), ("bob", "short"), (long_name.as_str(), "secret")] {
            let err = register_user(&db, SECRET, name, password).unwrap_err();
            assert!(matches!(err, ServiceError::Validation(_)));
        }
        assert_eq!(user_count(&db), 0);
    }

    #[test]
    fn login_checks_the_password() {
        let db = Database::open_in_memory().unwrap();
        let registered = register_user(&db, SECRET, "carol", "correct-horse").unwrap();

        let ok = login_user(&db, SECRET, "carol", "correct-horse").unwrap();
        assert_eq!(ok.user_id, registered.user_id);

        assert!(matches!(
            login_user(&db, SECRET, "carol", "wrong-horse"),
            Err(ServiceError::Unauthorized)
        ));
        assert!(matches!(
            login_user(&db, SECRET, "nobody", "correct-horse"),
            Err(ServiceError::Unauthorized)
        ));
    }

    #[test]
    fn tokens_from_another_secret_are_rejected() {
        let token = create_token("one", 1, "dave").unwrap();
        assert!(matches!(decode_token("two", &token), Err(ServiceError::Unauthorized)));
        assert!(matches!(decode_token("one", "not.a.jwt"), Err(ServiceError::Unauthorized)));
    }
}
