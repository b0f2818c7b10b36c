//! Authentication and authorization
//!
//! Provides:
//! - JWT token generation and validation
//! - Password hashing with Argon2
//! - The role lattice used by all mutation guards

pub mod jwt;
pub mod password;
pub mod roles;

pub use jwt::{
    extract_token_from_header, extract_token_from_query, Claims, JwtValidator,
    TokenValidationResult,
};
pub use password::{hash_password, verify_password};
pub use roles::Role;

/// Authenticated request context derived from verified JWT claims
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: String,
    pub email: String,
    pub role: Role,
}

impl From<Claims> for AuthContext {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.user_id,
            email: claims.email,
            role: claims.role,
        }
    }
}
