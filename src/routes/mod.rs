//! HTTP route handlers
//!
//! Thin binding layer: authenticate, check the role guard, decode the
//! body, call the service, encode the result. All policy lives in the
//! services; all status-code mapping lives in the error type.

pub mod admin_users;
pub mod auth_routes;
pub mod health;
pub mod identity;
pub mod stream;
pub mod suggestions;
pub mod tree;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::auth::{extract_token_from_header, AuthContext};
use crate::server::AppState;
use crate::types::{Result, RootlineError};

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

pub fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

pub fn empty_body() -> BoxBody {
    Full::new(Bytes::new())
        .map_err(|never| match never {})
        .boxed()
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<BoxBody> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, PUT, DELETE, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type, Authorization")
        .header("Access-Control-Allow-Credentials", "true")
        .body(full_body(json))
        .unwrap()
}

/// Map a service error to its HTTP shape. Internal details are scrubbed.
pub fn error_response(err: RootlineError) -> Response<BoxBody> {
    json_response(
        err.status_code(),
        &ErrorResponse {
            error: err.public_message(),
        },
    )
}

pub fn cors_preflight() -> Response<BoxBody> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, PUT, DELETE, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type, Authorization")
        .header("Access-Control-Allow-Credentials", "true")
        .header("Access-Control-Max-Age", "86400")
        .body(empty_body())
        .unwrap()
}

pub fn not_found(path: &str) -> Response<BoxBody> {
    json_response(
        StatusCode::NOT_FOUND,
        &ErrorResponse {
            error: format!("Not found: {}", path),
        },
    )
}

const MAX_BODY_BYTES: usize = 1 << 20;

pub async fn parse_json_body<T: for<'de> Deserialize<'de>>(
    req: Request<Incoming>,
) -> Result<T> {
    let body = req
        .collect()
        .await
        .map_err(|e| RootlineError::BadRequest(format!("Failed to read body: {}", e)))?;

    let bytes = body.to_bytes();
    if bytes.len() > MAX_BODY_BYTES {
        return Err(RootlineError::BadRequest("Request body too large".into()));
    }

    serde_json::from_slice(&bytes)
        .map_err(|e| RootlineError::BadRequest(format!("Invalid JSON: {}", e)))
}

/// Verify the bearer token and build the request's auth context.
pub fn authenticate(state: &AppState, req: &Request<Incoming>) -> Result<AuthContext> {
    let auth_header = req
        .headers()
        .get(hyper::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let token = extract_token_from_header(auth_header)
        .ok_or_else(|| RootlineError::Unauthorized("Authorization header required".into()))?;

    let result = state.jwt.verify_token(token);
    if !result.valid {
        return Err(RootlineError::Unauthorized(
            result.error.unwrap_or_else(|| "Invalid or expired token".into()),
        ));
    }

    Ok(result.claims.expect("valid result carries claims").into())
}

/// Read a single query parameter from a request URI.
pub fn query_param(req: &Request<Incoming>, name: &str) -> Option<String> {
    let query = req.uri().query()?;
    for pair in query.split('&') {
        if let Some((key, value)) = pair.split_once('=') {
            if key == name {
                return Some(value.to_string());
            }
        }
    }
    None
}
