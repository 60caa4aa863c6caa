use std::sync::Arc;
use std::time::Duration;

use argon2::{
    password_hash::{PasswordHasher, SaltString},
    Argon2, PasswordHash, PasswordVerifier,
};
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_email::Email;
use uuid::Uuid;

use crate::db::models::User;
use crate::db::store::Store;
use crate::error::CoreError;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    sub: Uuid, // user_id
    exp: i64,  // expiration timestamp
    iat: i64,  // issued at timestamp
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    name: String,
    email: Email,
    username: String,
    country: String,
    password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    email: Email,
    password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user_uid: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct RefreshTokenRequest {
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    email: Email,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    email: Email,
    token: String,
    new_password: String,
}

// Authentication service
pub struct AuthService {
    store: Arc<dyn Store>,
    jwt_secret: String,
}

impl AuthService {
    pub fn new(store: Arc<dyn Store>, jwt_secret: String) -> Self {
        Self { store, jwt_secret }
    }

    pub async fn register(&self, req: RegisterRequest) -> Result<AuthResponse, CoreError> {
        // username and email must both be free
        if self
            .store
            .find_user_by_username(&req.username)
            .await?
            .is_some()
            || self
                .store
                .find_user_by_email(req.email.as_str())
                .await?
                .is_some()
        {
            return Err(CoreError::DuplicateIdentity);
        }

        crate::routes::utils::check_password(&req.password)?;
        let password_hash = hash_password(&req.password)?;

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: req.name,
            email: req.email.as_str().to_string(),
            username: req.username,
            country: req.country,
            password_hash,
            is_admin: false,
            reset_token: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_user(&user).await?;
        tracing::info!("user created with email: {}", user.email);

        let (access_token, refresh_token) = self.generate_tokens(user.id)?;
        let expires_at = Utc::now() + Duration::from_secs(60 * 60); // 1 hr
        self.store
            .store_refresh_token(user.id, &refresh_token, expires_at)
            .await?;

        Ok(AuthResponse {
            access_token,
            refresh_token,
            user_uid: user.id,
        })
    }

    pub async fn login(&self, req: LoginRequest) -> Result<AuthResponse, CoreError> {
        tracing::info!("Attempting to log in user with email: {}", req.email);

        let user = self
            .store
            .find_user_by_email(req.email.as_str())
            .await?
            .ok_or(CoreError::AuthFailure)?;

        let parsed_hash =
            PasswordHash::new(&user.password_hash).map_err(|_err| CoreError::AuthFailure)?;
        if Argon2::default()
            .verify_password(req.password.as_bytes(), &parsed_hash)
            .is_err()
        {
            tracing::warn!("Invalid credentials for user: {}", user.email);
            return Err(CoreError::AuthFailure);
        }

        let (access_token, refresh_token) = self.generate_tokens(user.id)?;
        let expires_at = Utc::now() + Duration::from_secs(60 * 60); // 1 hr
        self.store
            .store_refresh_token(user.id, &refresh_token, expires_at)
            .await?;
        tracing::info!("Stored refresh token for user: {}", user.email);

        Ok(AuthResponse {
            access_token,
            refresh_token,
            user_uid: user.id,
        })
    }

    pub fn verify_token(&self, token: &str) -> Result<Uuid, CoreError> {
        let mut validation = jsonwebtoken::Validation::default();

        validation.leeway = 10;
        validation.validate_exp = true;
        validation.algorithms = vec![jsonwebtoken::Algorithm::HS256];

        let token_data = jsonwebtoken::decode::<Claims>(
            token,
            &jsonwebtoken::DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|err| {
            tracing::error!("Error decoding token: {:?}", err);
            CoreError::AuthFailure
        })?;

        Ok(token_data.claims.sub)
    }

    pub async fn refresh_token(&self, refresh_token: String) -> Result<AuthResponse, CoreError> {
        let user = self
            .store
            .verify_refresh_token(&refresh_token)
            .await?
            .ok_or(CoreError::AuthFailure)?;
        // rotation: the presented token dies with the exchange
        self.store.revoke_refresh_token(&refresh_token).await?;

        let (access_token, new_refresh_token) = self.generate_tokens(user.id)?;
        let expires_at = Utc::now() + Duration::from_secs(60 * 60); // 1 hr
        self.store
            .store_refresh_token(user.id, &new_refresh_token, expires_at)
            .await?;

        Ok(AuthResponse {
            access_token,
            refresh_token: new_refresh_token,
            user_uid: user.id,
        })
    }

    /// Revokes a refresh token so it can no longer mint access tokens.
    /// Already-issued access tokens expire on their own.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), CoreError> {
        self.store.revoke_refresh_token(refresh_token).await
    }

    /// Stores a one-time reset token on the account. Email delivery is an
    /// external service; the event is logged instead of sent.
    pub async fn forgot_password(&self, email: &str) -> Result<(), CoreError> {
        let user = self
            .store
            .find_user_by_email(email)
            .await?
            .ok_or(CoreError::NotFound)?;
        let token = crate::routes::utils::generate_reset_token();
        self.store.set_reset_token(user.id, Some(&token)).await?;
        tracing::info!("password reset token issued for user: {}", user.email);
        Ok(())
    }

    pub async fn reset_password(&self, req: ResetPasswordRequest) -> Result<(), CoreError> {
        let user = self
            .store
            .find_user_by_email(req.email.as_str())
            .await?
            .ok_or(CoreError::AuthFailure)?;
        match &user.reset_token {
            Some(stored) if *stored == req.token => {}
            _ => return Err(CoreError::AuthFailure),
        }

        crate::routes::utils::check_password(&req.new_password)?;
        let password_hash = hash_password(&req.new_password)?;
        self.store.update_password(user.id, &password_hash).await?;
        // invalidate the token
        self.store.set_reset_token(user.id, None).await?;
        tracing::info!("password reset for user: {}", user.email);
        Ok(())
    }

    fn generate_tokens(&self, user_id: Uuid) -> Result<(String, String), CoreError> {
        let now = Utc::now();

        // Access token (15 minutes)
        let access_claims = Claims {
            sub: user_id,
            exp: (now + Duration::from_secs(15 * 60)).timestamp(),
            iat: now.timestamp(),
        };

        let access_token = jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &access_claims,
            &jsonwebtoken::EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|err| CoreError::Internal(format!("failed to sign token: {err}")))?;

        // Refresh token
        let refresh_token = Uuid::new_v4().to_string();

        Ok((access_token, refresh_token))
    }
}

fn hash_password(password: &str) -> Result<String, CoreError> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_err| CoreError::Internal("unable to hash password".to_string()))
}

// Route for handling new user registration
pub async fn register_handler(
    State(service): State<Arc<AuthService>>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, CoreError> {
    let response = service.register(req).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

// Route for handling user login
pub async fn login_handler(
    State(service): State<Arc<AuthService>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, CoreError> {
    let response = service.login(req).await?;
    Ok((StatusCode::OK, Json(response)))
}

// Route for handling token refresh
pub async fn refresh_token_handler(
    State(service): State<Arc<AuthService>>,
    Json(req): Json<RefreshTokenRequest>,
) -> Result<impl IntoResponse, CoreError> {
    let response = service.refresh_token(req.refresh_token).await?;
    Ok((StatusCode::OK, Json(response)))
}

pub async fn logout_handler(
    State(service): State<Arc<AuthService>>,
    Json(req): Json<RefreshTokenRequest>,
) -> Result<impl IntoResponse, CoreError> {
    service.logout(&req.refresh_token).await?;
    Ok((StatusCode::OK, "Logged out"))
}

pub async fn forgot_password_handler(
    State(service): State<Arc<AuthService>>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, CoreError> {
    service.forgot_password(req.email.as_str()).await?;
    Ok((StatusCode::OK, "Password reset email sent"))
}

pub async fn reset_password_handler(
    State(service): State<Arc<AuthService>>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse, CoreError> {
    service.reset_password(req).await?;
    Ok((StatusCode::OK, "Password reset successful"))
}

pub fn auth_routes(service: Arc<AuthService>) -> Router {
    Router::new()
        .route("/auth/register", post(register_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/refresh", post(refresh_token_handler))
        .route("/auth/logout", post(logout_handler))
        .route("/auth/forgot-password", post(forgot_password_handler))
        .route("/auth/reset-password", post(reset_password_handler))
        .with_state(service)
}
