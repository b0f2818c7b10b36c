//! Suggestion routes
//!
//! - POST /suggestions                        - file a suggestion (contributor+)
//! - GET  /suggestions/my                     - own suggestions (contributor+)
//! - GET  /admin/suggestions                  - list by status (approver)
//! - POST /admin/suggestions/:id/review       - approve/reject (approver)
//! - GET  /admin/suggestions/grouped          - grouped pending view (approver)
//! - POST /admin/suggestions/batch-review     - review many (approver)

use std::sync::Arc;

use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;

use crate::auth::AuthContext;
use crate::models::ReviewStatus;
use crate::server::AppState;
use crate::services::CreateSuggestionRequest;
use crate::types::RootlineError;

use super::admin_users::parse_status;
use super::{
    authenticate, error_response, json_response, parse_json_body, query_param, BoxBody,
};

fn require_suggester(ctx: &AuthContext) -> Result<(), RootlineError> {
    if !ctx.role.can_suggest() {
        return Err(RootlineError::Forbidden(
            "Contributor access required".into(),
        ));
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
struct ReviewBody {
    approved: bool,
    #[serde(default)]
    review_notes: String,
}

#[derive(Debug, Deserialize)]
struct BatchReviewBody {
    suggestion_ids: Vec<String>,
    approved: bool,
    #[serde(default)]
    review_notes: String,
}

/// POST /suggestions
pub async fn handle_create(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let ctx = match authenticate(&state, &req) {
        Ok(ctx) => ctx,
        Err(e) => return error_response(e),
    };
    if let Err(e) = require_suggester(&ctx) {
        return error_response(e);
    }

    let body: CreateSuggestionRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(e),
    };

    match state.suggestions.create(&ctx, body).await {
        Ok(suggestion) => json_response(
            StatusCode::CREATED,
            &json!({
                "message": "Suggestion submitted successfully",
                "id": suggestion.id,
            }),
        ),
        Err(e) => error_response(e),
    }
}

/// GET /suggestions/my?status=...
pub async fn handle_my_suggestions(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let ctx = match authenticate(&state, &req) {
        Ok(ctx) => ctx,
        Err(e) => return error_response(e),
    };
    if let Err(e) = require_suggester(&ctx) {
        return error_response(e);
    }

    let status = query_param(&req, "status").as_deref().and_then(parse_status);

    match state.suggestions.my_suggestions(&ctx, status).await {
        Ok(suggestions) => json_response(StatusCode::OK, &suggestions),
        Err(e) => error_response(e),
    }
}

/// GET /admin/suggestions?status=pending
pub async fn handle_all_suggestions(
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

    let status = query_param(&req, "status")
        .as_deref()
        .and_then(parse_status)
        .unwrap_or(ReviewStatus::Pending);

    match state.suggestions.all_suggestions(status).await {
        Ok(suggestions) => json_response(StatusCode::OK, &suggestions),
        Err(e) => error_response(e),
    }
}

/// POST /admin/suggestions/:id/review
pub async fn handle_review(
    req: Request<Incoming>,
    state: Arc<AppState>,
    suggestion_id: &str,
) -> Response<BoxBody> {
    let ctx = match authenticate(&state, &req) {
        Ok(ctx) => ctx,
        Err(e) => return error_response(e),
    };
    if let Err(e) = require_approver(&ctx) {
        return error_response(e);
    }

    let body: ReviewBody = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(e),
    };

    match state
        .suggestions
        .review(suggestion_id, body.approved, body.review_notes, &ctx)
        .await
    {
        Ok(status) => json_response(
            StatusCode::OK,
            &json!({
                "message": format!("Suggestion {}", status.as_str()),
                "id": suggestion_id,
            }),
        ),
        Err(e) => error_response(e),
    }
}

/// GET /admin/suggestions/grouped
pub async fn handle_grouped(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let ctx = match authenticate(&state, &req) {
        Ok(ctx) => ctx,
        Err(e) => return error_response(e),
    };
    if let Err(e) = require_approver(&ctx) {
        return error_response(e);
    }

    match state.suggestions.grouped().await {
        Ok(groups) => json_response(StatusCode::OK, &groups),
        Err(e) => error_response(e),
    }
}

/// POST /admin/suggestions/batch-review
pub async fn handle_batch_review(
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

    let body: BatchReviewBody = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(e),
    };

    match state
        .suggestions
        .batch_review(&body.suggestion_ids, body.approved, body.review_notes, &ctx)
        .await
    {
        Ok(result) => json_response(StatusCode::OK, &result),
        Err(e) => error_response(e),
    }
}
