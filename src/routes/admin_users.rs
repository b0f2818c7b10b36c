//! Admin user management routes
//!
//! All endpoints here require `CanManageUsers` (admin).
//!
//! - GET    /admin/users                           - list with derived links
//! - PUT    /admin/users/:id/role                  - change role
//! - DELETE /admin/users/:id/access                - revoke to viewer
//! - DELETE /admin/users/:id                       - delete with cascade
//! - GET    /admin/permission-requests             - list by status
//! - POST   /admin/permission-requests/:id/approve
//! - POST   /admin/permission-requests/:id/reject

use std::sync::Arc;

use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;

use crate::auth::{AuthContext, Role};
use crate::models::ReviewStatus;
use crate::server::AppState;
use crate::types::RootlineError;

use super::{
    authenticate, error_response, json_response, parse_json_body, query_param, BoxBody,
    MessageResponse,
};

fn require_admin(ctx: &AuthContext) -> Result<(), RootlineError> {
    if !ctx.role.can_manage_users() {
        return Err(RootlineError::Forbidden("Admin access required".into()));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct UpdateRoleBody {
    role: Role,
}

/// GET /admin/users
pub async fn handle_list_users(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let ctx = match authenticate(&state, &req) {
        Ok(ctx) => ctx,
        Err(e) => return error_response(e),
    };
    if let Err(e) = require_admin(&ctx) {
        return error_response(e);
    }

    match state.users.list_users().await {
        Ok(users) => json_response(StatusCode::OK, &users),
        Err(e) => error_response(e),
    }
}

/// PUT /admin/users/:id/role
pub async fn handle_update_role(
    req: Request<Incoming>,
    state: Arc<AppState>,
    target_user_id: &str,
) -> Response<BoxBody> {
    let ctx = match authenticate(&state, &req) {
        Ok(ctx) => ctx,
        Err(e) => return error_response(e),
    };
    if let Err(e) = require_admin(&ctx) {
        return error_response(e);
    }

    let body: UpdateRoleBody = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(e),
    };

    match state.users.update_role(&ctx, target_user_id, body.role).await {
        Ok(user) => json_response(
            StatusCode::OK,
            &json!({
                "message": "User role updated",
                "user": user.email,
                "role": user.role,
            }),
        ),
        Err(e) => error_response(e),
    }
}

/// DELETE /admin/users/:id/access
pub async fn handle_revoke_access(
    req: Request<Incoming>,
    state: Arc<AppState>,
    target_user_id: &str,
) -> Response<BoxBody> {
    let ctx = match authenticate(&state, &req) {
        Ok(ctx) => ctx,
        Err(e) => return error_response(e),
    };
    if let Err(e) = require_admin(&ctx) {
        return error_response(e);
    }

    match state.users.revoke_access(&ctx, target_user_id).await {
        Ok(user) => json_response(
            StatusCode::OK,
            &json!({
                "message": "User access revoked",
                "user": user.email,
            }),
        ),
        Err(e) => error_response(e),
    }
}

/// DELETE /admin/users/:id
pub async fn handle_delete_user(
    req: Request<Incoming>,
    state: Arc<AppState>,
    target_user_id: &str,
) -> Response<BoxBody> {
    let ctx = match authenticate(&state, &req) {
        Ok(ctx) => ctx,
        Err(e) => return error_response(e),
    };
    if let Err(e) = require_admin(&ctx) {
        return error_response(e);
    }

    match state.users.delete_user(&ctx, target_user_id).await {
        Ok(()) => json_response(
            StatusCode::OK,
            &MessageResponse {
                message: "User deleted successfully".into(),
            },
        ),
        Err(e) => error_response(e),
    }
}

/// GET /admin/permission-requests?status=pending
pub async fn handle_list_permission_requests(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let ctx = match authenticate(&state, &req) {
        Ok(ctx) => ctx,
        Err(e) => return error_response(e),
    };
    if let Err(e) = require_admin(&ctx) {
        return error_response(e);
    }

    let status = query_param(&req, "status")
        .as_deref()
        .and_then(parse_status)
        .unwrap_or(ReviewStatus::Pending);

    match state.users.list_permission_requests(status).await {
        Ok(requests) => json_response(StatusCode::OK, &requests),
        Err(e) => error_response(e),
    }
}

/// POST /admin/permission-requests/:id/approve
pub async fn handle_approve_permission_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
    request_id: &str,
) -> Response<BoxBody> {
    let ctx = match authenticate(&state, &req) {
        Ok(ctx) => ctx,
        Err(e) => return error_response(e),
    };
    if let Err(e) = require_admin(&ctx) {
        return error_response(e);
    }

    match state.users.approve_permission_request(request_id).await {
        Ok(request) => json_response(
            StatusCode::OK,
            &json!({
                "message": "Permission request approved",
                "user": request.user_email,
                "role": request.requested_role,
            }),
        ),
        Err(e) => error_response(e),
    }
}

/// POST /admin/permission-requests/:id/reject
pub async fn handle_reject_permission_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
    request_id: &str,
) -> Response<BoxBody> {
    let ctx = match authenticate(&state, &req) {
        Ok(ctx) => ctx,
        Err(e) => return error_response(e),
    };
    if let Err(e) = require_admin(&ctx) {
        return error_response(e);
    }

    match state.users.reject_permission_request(request_id).await {
        Ok(request) => json_response(
            StatusCode::OK,
            &json!({
                "message": "Permission request rejected",
                "user": request.user_email,
            }),
        ),
        Err(e) => error_response(e),
    }
}

pub(crate) fn parse_status(s: &str) -> Option<ReviewStatus> {
    match s {
        "pending" => Some(ReviewStatus::Pending),
        "approved" => Some(ReviewStatus::Approved),
        "rejected" => Some(ReviewStatus::Rejected),
        _ => None,
    }
}
