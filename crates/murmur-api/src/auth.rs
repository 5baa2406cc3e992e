use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::{SaltString, rand_core::OsRng}};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::info;
use uuid::Uuid;

use murmur_db::Database;
use murmur_gateway::Relay;
use murmur_types::api::{
    LoginRequest, LoginResponse, SignupRequest, StatusResponse, UpdateProfileRequest, UserInfoResponse,
};

use crate::error::ApiError;
use crate::middleware::{AuthUser, create_token};

const PASSWORD_MIN_LEN: usize = 6;
const PASSWORD_MAX_LEN: usize = 20;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub relay: Relay,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
}

/// Run a blocking database closure off the async runtime.
pub(crate) async fn with_db<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let db = state.db.clone();
    tokio::task::spawn_blocking(move || f(&db)).await?
}

pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim().to_string();
    let first_name = req.first_name.trim().to_string();
    let last_name = req.last_name.trim().to_string();
    if email.is_empty() || req.password.is_empty() || first_name.is_empty() || last_name.is_empty() {
        return Err(ApiError::bad_request("Missing email, password, first or last name"));
    }

    let password = req.password;
    let user_id = with_db(&state, move |db| {
        if db.get_user_by_email(&email)?.is_some() {
            return Err(ApiError::Conflict("Email already registered".into()));
        }

        let len = password.chars().count();
        if len < PASSWORD_MIN_LEN {
            return Err(ApiError::bad_request(format!(
                "Password requires at least {} characters",
                PASSWORD_MIN_LEN
            )));
        }
        if len > PASSWORD_MAX_LEN {
            return Err(ApiError::bad_request(format!(
                "Password must be at most {} characters",
                PASSWORD_MAX_LEN
            )));
        }

        // Hash password with Argon2id
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
            .to_string();

        let user_id = Uuid::new_v4().to_string();
        // a concurrent signup can take the email between the check above and this insert
        db.create_user(&user_id, &email, &password_hash, &first_name, &last_name)
            .map_err(|e| {
                if murmur_db::is_constraint_violation(&e) {
                    ApiError::Conflict("Email already registered".into())
                } else {
                    e.into()
                }
            })?;
        Ok(user_id)
    })
    .await?;

    info!("registered user {}", user_id);
    Ok((StatusCode::CREATED, Json(StatusResponse::new("User successfully created"))))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim().to_string();
    if email.is_empty() || req.password.is_empty() {
        return Err(ApiError::bad_request("Missing email or password"));
    }

    let password = req.password;
    let user = with_db(&state, move |db| {
        let user = db
            .get_user_by_email(&email)?
            .ok_or_else(|| ApiError::not_found("No user found with this email"))?;

        let parsed_hash = PasswordHash::new(&user.password)
            .map_err(|e| anyhow::anyhow!("stored hash for {} unreadable: {}", user.id, e))?;

        Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .map_err(|_| ApiError::bad_request("Invalid password"))?;

        Ok(user)
    })
    .await?;

    let token = create_token(&state.jwt_secret, &user.id, state.token_ttl)?;

    Ok(Json(LoginResponse {
        message: "User successfully logged-in".into(),
        token,
        user_id: user.id,
    }))
}

/// Tokens are stateless; the client forgets its token.
pub async fn logout(Extension(AuthUser(user_id)): Extension<AuthUser>) -> impl IntoResponse {
    info!("{} logged out", user_id);
    Json(StatusResponse::new("Logout successful"))
}

pub async fn user_info(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let user = with_db(&state, move |db| {
        db.get_user_by_id(&user_id)?
            .ok_or_else(|| ApiError::not_found("User not found"))
    })
    .await?;

    Ok(Json(UserInfoResponse {
        id: user.id,
        email: user.email,
        first_name: user.first_name,
        last_name: user.last_name,
        color: user.color,
    }))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let first_name = req.first_name.trim().to_string();
    let last_name = req.last_name.trim().to_string();
    if first_name.is_empty() || last_name.is_empty() {
        return Err(ApiError::bad_request("Missing required fields"));
    }
    let color = req.color.filter(|c| !c.trim().is_empty());

    with_db(&state, move |db| {
        if db.update_profile(&user_id, &first_name, &last_name, color.as_deref())? {
            Ok(())
        } else {
            Err(ApiError::not_found("User not found"))
        }
    })
    .await?;

    Ok(Json(StatusResponse::new("Profile updated")))
}
