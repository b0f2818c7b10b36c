//! Authentication routes
//!
//! - POST /auth/login              - authenticate, returns a 24h token
//! - POST /auth/register           - register against the configured tree
//! - GET  /auth/validate           - token + derived person link
//! - POST /auth/request-permission - file a role-elevation request

use std::sync::Arc;

use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;

use crate::auth::Role;
use crate::server::AppState;
use crate::services::RegisterRequest;

use super::{authenticate, error_response, json_response, parse_json_body, BoxBody};

#[derive(Debug, Deserialize)]
struct LoginRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Deserialize)]
struct PermissionRequestBody {
    requested_role: Role,
    #[serde(default)]
    message: String,
}

/// POST /auth/login
pub async fn handle_login(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let body: LoginRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(e),
    };

    match state.users.login(&body.email, &body.password).await {
        Ok(outcome) => json_response(StatusCode::OK, &outcome),
        Err(e) => error_response(e),
    }
}

/// POST /auth/register
pub async fn handle_register(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let body: RegisterRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(e),
    };

    match state.users.register(body).await {
        Ok(outcome) => json_response(StatusCode::CREATED, &outcome),
        Err(e) => error_response(e),
    }
}

/// GET /auth/validate
pub async fn handle_validate(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let ctx = match authenticate(&state, &req) {
        Ok(ctx) => ctx,
        Err(e) => return error_response(e),
    };

    match state.users.validate(&ctx).await {
        Ok(user) => json_response(StatusCode::OK, &json!({ "valid": true, "user": user })),
        Err(e) => error_response(e),
    }
}

/// POST /auth/request-permission
pub async fn handle_request_permission(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let ctx = match authenticate(&state, &req) {
        Ok(ctx) => ctx,
        Err(e) => return error_response(e),
    };

    let body: PermissionRequestBody = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(e),
    };

    match state
        .users
        .request_permission(&ctx, body.requested_role, body.message)
        .await
    {
        Ok(request) => json_response(
            StatusCode::CREATED,
            &json!({
                "message": "Permission request submitted successfully",
                "id": request.id,
            }),
        ),
        Err(e) => error_response(e),
    }
}
