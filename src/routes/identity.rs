//! Identity-link routes
//!
//! - POST /identity/claim                    - claim a tree node (authenticated)
//! - GET  /identity/my-claim                 - link/claim status (authenticated)
//! - GET  /admin/identity-claims             - list by status (admin)
//! - POST /admin/identity-claims/:id/review  - approve/reject (admin)
//! - POST /admin/unlink-user/:user_id        - break a link (admin)
//! - POST /admin/link-user-to-person         - direct link (approver; co-admin
//!                                             may only self-link)
//! - PUT  /admin/person/:id/instagram        - attach profile username (approver)
//! - GET  /admin/instagram/lookup?username=  - adapter lookup (approver)

use std::sync::Arc;

use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;

use crate::auth::AuthContext;
use crate::models::ReviewStatus;
use crate::server::AppState;
use crate::types::RootlineError;

use super::admin_users::parse_status;
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

fn require_approver(ctx: &AuthContext) -> Result<(), RootlineError> {
    if !ctx.role.can_approve() {
        return Err(RootlineError::Forbidden(
            "Co-Admin or Admin access required".into(),
        ));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct ClaimBody {
    person_id: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ReviewBody {
    approved: bool,
    #[serde(default)]
    review_notes: String,
}

#[derive(Debug, Deserialize)]
struct LinkBody {
    user_id: String,
    person_id: String,
    #[serde(default)]
    instagram_username: String,
}

#[derive(Debug, Deserialize)]
struct InstagramBody {
    username: String,
}

/// POST /identity/claim
pub async fn handle_claim(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let ctx = match authenticate(&state, &req) {
        Ok(ctx) => ctx,
        Err(e) => return error_response(e),
    };

    let body: ClaimBody = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(e),
    };
    if body.person_id.is_empty() {
        return error_response(RootlineError::BadRequest("person_id is required".into()));
    }

    match state.identity.claim(&ctx, &body.person_id, body.message).await {
        Ok(claim) => json_response(
            StatusCode::CREATED,
            &json!({
                "message": "Identity claim submitted successfully. An admin will review your request.",
                "claim": claim,
            }),
        ),
        Err(e) => error_response(e),
    }
}

/// GET /identity/my-claim
pub async fn handle_my_claim(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let ctx = match authenticate(&state, &req) {
        Ok(ctx) => ctx,
        Err(e) => return error_response(e),
    };

    match state.identity.my_claim(&ctx).await {
        Ok(status) => json_response(StatusCode::OK, &status),
        Err(e) => error_response(e),
    }
}

/// GET /admin/identity-claims?status=pending
pub async fn handle_list_claims(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
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

    match state.identity.list(status).await {
        Ok(claims) => json_response(StatusCode::OK, &claims),
        Err(e) => error_response(e),
    }
}

/// POST /admin/identity-claims/:id/review
pub async fn handle_review_claim(
    req: Request<Incoming>,
    state: Arc<AppState>,
    claim_id: &str,
) -> Response<BoxBody> {
    let ctx = match authenticate(&state, &req) {
        Ok(ctx) => ctx,
        Err(e) => return error_response(e),
    };
    if let Err(e) = require_admin(&ctx) {
        return error_response(e);
    }

    let body: ReviewBody = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(e),
    };

    match state
        .identity
        .review(claim_id, body.approved, body.review_notes, &ctx)
        .await
    {
        Ok(message) => json_response(
            StatusCode::OK,
            &MessageResponse {
                message: message.into(),
            },
        ),
        Err(e) => error_response(e),
    }
}

/// POST /admin/unlink-user/:user_id
pub async fn handle_unlink(
    req: Request<Incoming>,
    state: Arc<AppState>,
    user_id: &str,
) -> Response<BoxBody> {
    let ctx = match authenticate(&state, &req) {
        Ok(ctx) => ctx,
        Err(e) => return error_response(e),
    };
    if let Err(e) = require_admin(&ctx) {
        return error_response(e);
    }

    match state.identity.unlink(user_id).await {
        Ok(()) => json_response(
            StatusCode::OK,
            &MessageResponse {
                message: "User unlinked from tree node successfully".into(),
            },
        ),
        Err(e) => error_response(e),
    }
}

/// POST /admin/link-user-to-person
///
/// Admins may link anyone; a co-admin may only link their own account.
pub async fn handle_link_user_to_person(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let ctx = match authenticate(&state, &req) {
        Ok(ctx) => ctx,
        Err(e) => return error_response(e),
    };
    if let Err(e) = require_approver(&ctx) {
        return error_response(e);
    }

    let body: LinkBody = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(e),
    };
    if body.user_id.is_empty() || body.person_id.is_empty() {
        return error_response(RootlineError::BadRequest(
            "user_id and person_id are required".into(),
        ));
    }

    if !ctx.role.can_manage_users() && body.user_id != ctx.user_id {
        return error_response(RootlineError::Forbidden(
            "Co-admins may only link their own account".into(),
        ));
    }

    // Best-effort profile snapshot; adapter failures only lose the cache.
    let profile = if body.instagram_username.is_empty() {
        None
    } else {
        state
            .profile
            .fetch(&body.instagram_username)
            .await
            .unwrap_or_default()
    };

    match state
        .identity
        .link_user_to_person(&body.user_id, &body.person_id, profile)
        .await
    {
        Ok(()) => json_response(
            StatusCode::OK,
            &MessageResponse {
                message: "User linked to person successfully".into(),
            },
        ),
        Err(e) => error_response(e),
    }
}

/// PUT /admin/person/:id/instagram
pub async fn handle_set_instagram(
    req: Request<Incoming>,
    state: Arc<AppState>,
    person_id: &str,
) -> Response<BoxBody> {
    let ctx = match authenticate(&state, &req) {
        Ok(ctx) => ctx,
        Err(e) => return error_response(e),
    };
    if let Err(e) = require_approver(&ctx) {
        return error_response(e);
    }

    let body: InstagramBody = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(e),
    };

    let profile = state
        .profile
        .fetch(&body.username)
        .await
        .unwrap_or_default();

    match state
        .identity
        .set_instagram(person_id, &body.username, profile)
        .await
    {
        Ok(person) => json_response(StatusCode::OK, &person),
        Err(e) => error_response(e),
    }
}

/// GET /admin/instagram/lookup?username=...
pub async fn handle_instagram_lookup(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let ctx = match authenticate(&state, &req) {
        Ok(ctx) => ctx,
        Err(e) => return error_response(e),
    };
    if let Err(e) = require_approver(&ctx) {
        return error_response(e);
    }

    let Some(username) = query_param(&req, "username") else {
        return error_response(RootlineError::BadRequest("username is required".into()));
    };

    match state.profile.fetch(&username).await {
        Ok(Some(profile)) => json_response(StatusCode::OK, &profile),
        Ok(None) => error_response(RootlineError::NotFound("Profile not found".into())),
        Err(e) => error_response(e),
    }
}
