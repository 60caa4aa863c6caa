use axum::http::HeaderMap;
use rand::RngCore;
use uuid::Uuid;

use crate::error::CoreError;

use super::auth::AuthService;

#[inline]
pub fn validate_auth_token(headers: HeaderMap, service: &AuthService) -> Result<Uuid, CoreError> {
    let jwt_header_token = match headers.get("Authorization").map(|token| token.to_str()) {
        Some(Ok(token)) => token,
        _ => {
            return Err(CoreError::AuthFailure);
        }
    };
    // accept both a bare token and the Bearer scheme
    let token = jwt_header_token
        .strip_prefix("Bearer ")
        .unwrap_or(jwt_header_token);
    service.verify_token(token)
}

#[inline]
pub fn check_password(password: &str) -> Result<(), CoreError> {
    let valid = password.len() >= 8
        && password.chars().any(|c| c.is_uppercase())
        && password.chars().any(|c| c.is_lowercase())
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| !c.is_alphanumeric());
    if valid {
        Ok(())
    } else {
        Err(CoreError::Validation(
            "Password must be at least 8 characters with upper, lower, digit and special characters"
                .to_string(),
        ))
    }
}

/// 20 random bytes, hex encoded.
pub fn generate_reset_token() -> String {
    let mut bytes = [0u8; 20];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
