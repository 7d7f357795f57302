use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::{SaltString, rand_core::OsRng}};
use axum::{Json, extract::State, extract::rejection::JsonRejection};
use jsonwebtoken::{EncodingKey, Header, encode};
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use campus_db::Database;
use campus_db::models::UserRow;
use campus_types::api::{AuthResponse, Claims, LoginRequest, RegisterRequest, UserProfile};
use campus_types::models::{Role, SENTINEL_USER_ID};

use crate::error::ApiError;
use crate::storage::Storage;

pub type AppState = Arc<AppStateInner>;

/// Well-formed Argon2id hash (default parameters) that matches no password.
/// Verified against when the account does not exist.
const DUMMY_PASSWORD_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$c29tZXNhbHRzb21lc2FsdA$AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub sentinel: SentinelAdmin,
    pub storage: Storage,
}

/// The configured super-admin credential. It is checked before the account
/// store and never persisted.
#[derive(Debug, Clone)]
pub struct SentinelAdmin {
    pub aliases: Vec<String>,
    /// `None` disables sentinel login entirely.
    pub secret: Option<String>,
}

impl SentinelAdmin {
    pub fn is_alias(&self, identifier: &str) -> bool {
        self.aliases.iter().any(|a| a.eq_ignore_ascii_case(identifier))
    }

    pub fn matches(&self, identifier: &str, secret: &str) -> bool {
        let Some(expected) = &self.secret else {
            return false;
        };
        // Both comparisons always run.
        let alias_ok = self.is_alias(identifier);
        let secret_ok: bool = expected.as_bytes().ct_eq(secret.as_bytes()).into();
        alias_ok & secret_ok
    }

    pub fn profile(&self) -> UserProfile {
        let email = self
            .aliases
            .iter()
            .find(|a| a.contains('@'))
            .cloned()
            .unwrap_or_else(|| "admin@admin.com".to_string());
        UserProfile {
            id: SENTINEL_USER_ID,
            email,
            username: "admin".to_string(),
            role: Role::Admin,
        }
    }
}

pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, ApiError> {
    let Json(req) = payload?;

    let response = crate::blocking(&state, move |state| {
        let profile = register_account(state, &req)?;
        let token = issue_token(&state.jwt_secret, profile.id, profile.role)?;
        Ok(AuthResponse { token, user: profile })
    })
    .await?;

    info!("Registered user {} ({})", response.user.id, response.user.username);
    Ok(Json(response))
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, ApiError> {
    let Json(req) = payload?;

    let response = crate::blocking(&state, move |state| {
        let profile = authenticate(state, &req.email, &req.password)?;
        let token = issue_token(&state.jwt_secret, profile.id, profile.role)?;
        Ok(AuthResponse { token, user: profile })
    })
    .await?;

    info!("User {} logged in", response.user.id);
    Ok(Json(response))
}

/// Verify an identifier/secret pair. The sentinel credential is tried first
/// and never touches the account store.
pub fn authenticate(
    state: &AppStateInner,
    identifier: &str,
    secret: &str,
) -> Result<UserProfile, ApiError> {
    let identifier = identifier.trim();

    if state.sentinel.matches(identifier, secret) {
        info!("Sentinel admin authenticated");
        return Ok(state.sentinel.profile());
    }

    let Some(user) = state.db.get_user_by_email(&normalize_email(identifier))? else {
        // Same Argon2 cost as a wrong password.
        verify_password(secret, DUMMY_PASSWORD_HASH)?;
        return Err(ApiError::InvalidCredentials);
    };

    if !verify_password(secret, &user.password)? {
        warn!("Failed login for user {}", user.id);
        return Err(ApiError::InvalidCredentials);
    }

    profile_from_row(user)
}

/// Validate, hash and persist a new `USER` account.
pub fn register_account(state: &AppStateInner, req: &RegisterRequest) -> Result<UserProfile, ApiError> {
    let email = normalize_email(&req.email);
    let username = req.username.trim();

    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::validation("A valid email is required"));
    }
    if state.sentinel.is_alias(&email) {
        return Err(ApiError::validation("This email is reserved"));
    }
    let name_len = username.chars().count();
    if !(3..=32).contains(&name_len) {
        return Err(ApiError::validation("Username must be 3-32 characters"));
    }
    if req.password.chars().count() < 8 {
        return Err(ApiError::validation("Password must be at least 8 characters"));
    }

    if state.db.get_user_by_email(&email)?.is_some() {
        return Err(ApiError::DuplicateAccount);
    }

    let password_hash = hash_password(&req.password)?;

    // The UNIQUE constraint settles a race with a concurrent registration.
    let id = state
        .db
        .create_user(&email, username, &password_hash, Role::User)?
        .ok_or(ApiError::DuplicateAccount)?;

    Ok(UserProfile {
        id,
        email,
        username: username.to_string(),
        role: Role::User,
    })
}

/// Hash a password with Argon2id and a random salt.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Password hashing failed: {}", e))?
        .to_string();
    Ok(hash)
}

fn verify_password(password: &str, stored_hash: &str) -> Result<bool, ApiError> {
    let parsed_hash = PasswordHash::new(stored_hash)
        .map_err(|e| anyhow::anyhow!("Corrupt password hash: {}", e))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

pub fn issue_token(secret: &str, user_id: i64, role: Role) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        role,
        iat: chrono::Utc::now().timestamp(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn profile_from_row(user: UserRow) -> Result<UserProfile, ApiError> {
    let role = Role::from_db(&user.role)
        .ok_or_else(|| anyhow::anyhow!("Unknown role '{}' on user {}", user.role, user.id))?;
    Ok(UserProfile {
        id: user.id,
        email: user.email,
        username: user.username,
        role,
    })
}
