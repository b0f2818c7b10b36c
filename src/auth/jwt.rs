//! JWT token handling
//!
//! Tokens are signed with HS256 (HMAC-SHA256) and expire after 24 hours.
//! The admin stream accepts the token via a `?token=` query parameter
//! because EventSource clients cannot set custom headers.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::auth::Role;
use crate::types::RootlineError;

const ISSUER: &str = "rootline-api";

/// Payload stored in JWT token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User document id
    pub user_id: String,
    /// User email
    pub email: String,
    /// Role granted at token issue time
    pub role: Role,
    /// Convenience flag (role == admin)
    pub is_admin: bool,
    /// Issuer
    pub iss: String,
    /// Subject (user id)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Not before (Unix timestamp)
    pub nbf: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Result of token validation
#[derive(Debug)]
pub struct TokenValidationResult {
    pub valid: bool,
    pub claims: Option<Claims>,
    pub error: Option<String>,
}

impl TokenValidationResult {
    pub fn valid(claims: Claims) -> Self {
        Self {
            valid: true,
            claims: Some(claims),
            error: None,
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            claims: None,
            error: Some(error.into()),
        }
    }
}

/// JWT validator and generator
#[derive(Clone)]
pub struct JwtValidator {
    secret: String,
    expiry_seconds: u64,
}

impl JwtValidator {
    /// Create a new JWT validator
    ///
    /// Returns an error if the secret is empty or too short.
    pub fn new(secret: String, expiry_seconds: u64) -> Result<Self, RootlineError> {
        if secret.is_empty() {
            return Err(RootlineError::Config("JWT_SECRET is required".into()));
        }
        if secret.len() < 32 {
            return Err(RootlineError::Config(
                "JWT_SECRET must be at least 32 characters".into(),
            ));
        }

        Ok(Self {
            secret,
            expiry_seconds,
        })
    }

    /// Generate a token for an authenticated user
    pub fn generate_token(
        &self,
        user_id: &str,
        email: &str,
        role: Role,
    ) -> Result<String, RootlineError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| RootlineError::Auth(format!("System time error: {}", e)))?
            .as_secs();

        let claims = Claims {
            user_id: user_id.to_string(),
            email: email.to_string(),
            role,
            is_admin: role == Role::Admin,
            iss: ISSUER.to_string(),
            sub: user_id.to_string(),
            iat: now,
            nbf: now,
            exp: now + self.expiry_seconds,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| RootlineError::Auth(format!("Failed to generate token: {}", e)))?;

        Ok(token)
    }

    /// Verify and decode a token
    pub fn verify_token(&self, token: &str) -> TokenValidationResult {
        let validation = Validation::default();

        match decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        ) {
            Ok(token_data) => TokenValidationResult::valid(token_data.claims),
            Err(err) => {
                use jsonwebtoken::errors::ErrorKind;
                let error_msg = match err.kind() {
                    ErrorKind::ExpiredSignature => "Token expired",
                    ErrorKind::InvalidToken => "Invalid token",
                    ErrorKind::InvalidSignature => "Invalid signature",
                    _ => "Token validation failed",
                };
                TokenValidationResult::invalid(error_msg)
            }
        }
    }
}

/// Extract token from Authorization header ("Bearer <token>")
pub fn extract_token_from_header(auth_header: Option<&str>) -> Option<&str> {
    let header = auth_header?;
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Extract token from URL query string (`?token=...`)
pub fn extract_token_from_query(query: Option<&str>, param_name: &str) -> Option<String> {
    for param in query?.split('&') {
        if let Some((key, value)) = param.split_once('=') {
            if key == param_name && !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_validator() -> JwtValidator {
        JwtValidator::new(
            "test-secret-that-is-at-least-32-characters-long".into(),
            86400,
        )
        .unwrap()
    }

    #[test]
    fn test_generate_and_verify_token() {
        let validator = test_validator();

        let token = validator
            .generate_token("user-1", "a@x", Role::CoAdmin)
            .unwrap();
        assert!(!token.is_empty());

        let result = validator.verify_token(&token);
        assert!(result.valid);

        let claims = result.claims.unwrap();
        assert_eq!(claims.user_id, "user-1");
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.email, "a@x");
        assert_eq!(claims.role, Role::CoAdmin);
        assert!(!claims.is_admin);
        assert_eq!(claims.exp - claims.iat, 86400);
    }

    #[test]
    fn test_admin_flag_set_for_admin() {
        let validator = test_validator();
        let token = validator
            .generate_token("user-2", "admin@x", Role::Admin)
            .unwrap();
        let claims = validator.verify_token(&token).claims.unwrap();
        assert!(claims.is_admin);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let validator1 = test_validator();
        let validator2 = JwtValidator::new(
            "different-secret-that-is-at-least-32-characters".into(),
            86400,
        )
        .unwrap();

        let token = validator1
            .generate_token("user-1", "a@x", Role::Viewer)
            .unwrap();
        assert!(!validator2.verify_token(&token).valid);
    }

    #[test]
    fn test_secret_validation() {
        assert!(JwtValidator::new("short".into(), 3600).is_err());
        assert!(JwtValidator::new("".into(), 3600).is_err());
        assert!(JwtValidator::new("this-secret-is-at-least-32-chars-long".into(), 3600).is_ok());
    }

    #[test]
    fn test_extract_token_from_header() {
        assert_eq!(
            extract_token_from_header(Some("Bearer abc123")),
            Some("abc123")
        );
        assert_eq!(extract_token_from_header(None), None);
        assert_eq!(extract_token_from_header(Some("")), None);
        assert_eq!(extract_token_from_header(Some("Bearer ")), None);
        assert_eq!(extract_token_from_header(Some("Basic abc123")), None);
    }

    #[test]
    fn test_extract_token_from_query() {
        assert_eq!(
            extract_token_from_query(Some("token=abc123"), "token"),
            Some("abc123".into())
        );
        assert_eq!(
            extract_token_from_query(Some("foo=bar&token=abc123"), "token"),
            Some("abc123".into())
        );
        assert_eq!(extract_token_from_query(Some("foo=bar"), "token"), None);
        assert_eq!(extract_token_from_query(None, "token"), None);
    }
}
