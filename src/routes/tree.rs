//! Tree routes
//!
//! Reads are open to any authenticated user; direct mutations require
//! `CanEditDirectly`; delete-all and bulk import are admin-only.
//!
//! - GET    /tree                    - all people (scrubbed)
//! - GET    /tree/:id                - one person
//! - POST   /tree                    - create (editor+)
//! - PUT    /tree/:id                - update (editor+, creator-or-admin)
//! - DELETE /tree/:id                - delete with cascade (editor+, creator-or-admin)
//! - POST   /tree/:id/like           - like (authenticated)
//! - DELETE /tree/:id/like           - unlike (authenticated)
//! - POST   /tree/check-duplicate    - duplicate-name check (authenticated)
//! - DELETE /tree/all                - delete everything (admin)
//! - POST   /tree/populate           - bulk import from indented text (admin)

use std::sync::Arc;

use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::auth::AuthContext;
use crate::naming;
use crate::server::AppState;
use crate::services::{CreatePersonRequest, UpdatePersonRequest};
use crate::types::RootlineError;

use super::{
    authenticate, error_response, json_response, parse_json_body, BoxBody, MessageResponse,
};

fn require_editor(ctx: &AuthContext) -> Result<(), RootlineError> {
    if !ctx.role.can_edit_directly() {
        return Err(RootlineError::Forbidden(
            "Editor or Admin access required".into(),
        ));
    }
    Ok(())
}

fn require_admin(ctx: &AuthContext) -> Result<(), RootlineError> {
    if !ctx.role.can_manage_users() {
        return Err(RootlineError::Forbidden("Admin access required".into()));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct CheckDuplicateBody {
    name: String,
    #[serde(default)]
    threshold: f64,
    #[serde(default)]
    use_ai: bool,
}

#[derive(Debug, Deserialize)]
struct PopulateBody {
    text: String,
}

/// GET /tree
pub async fn handle_get_all(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    if let Err(e) = authenticate(&state, &req) {
        return error_response(e);
    }

    match state.tree.read_all().await {
        Ok(people) => json_response(StatusCode::OK, &people),
        Err(e) => error_response(e),
    }
}

/// GET /tree/:id
pub async fn handle_get_one(
    req: Request<Incoming>,
    state: Arc<AppState>,
    person_id: &str,
) -> Response<BoxBody> {
    if let Err(e) = authenticate(&state, &req) {
        return error_response(e);
    }

    match state.tree.get(person_id).await {
        Ok(person) => json_response(StatusCode::OK, &person),
        Err(e) => error_response(e),
    }
}

/// POST /tree
pub async fn handle_create(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let ctx = match authenticate(&state, &req) {
        Ok(ctx) => ctx,
        Err(e) => return error_response(e),
    };
    if let Err(e) = require_editor(&ctx) {
        return error_response(e);
    }

    let body: CreatePersonRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(e),
    };

    match state.tree.create(body, &ctx.user_id).await {
        Ok(person) => json_response(StatusCode::CREATED, &person),
        Err(e) => error_response(e),
    }
}

/// PUT /tree/:id
pub async fn handle_update(
    req: Request<Incoming>,
    state: Arc<AppState>,
    person_id: &str,
) -> Response<BoxBody> {
    let ctx = match authenticate(&state, &req) {
        Ok(ctx) => ctx,
        Err(e) => return error_response(e),
    };
    if let Err(e) = require_editor(&ctx) {
        return error_response(e);
    }

    let body: UpdatePersonRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(e),
    };

    match state.tree.update(person_id, body, &ctx).await {
        Ok(person) => json_response(StatusCode::OK, &person),
        Err(e) => error_response(e),
    }
}

/// DELETE /tree/:id
pub async fn handle_delete(
    req: Request<Incoming>,
    state: Arc<AppState>,
    person_id: &str,
) -> Response<BoxBody> {
    let ctx = match authenticate(&state, &req) {
        Ok(ctx) => ctx,
        Err(e) => return error_response(e),
    };
    if let Err(e) = require_editor(&ctx) {
        return error_response(e);
    }

    match state.tree.delete(person_id, &ctx).await {
        Ok(()) => json_response(
            StatusCode::OK,
            &MessageResponse {
                message: "Person deleted successfully".into(),
            },
        ),
        Err(e) => error_response(e),
    }
}

/// POST /tree/:id/like
pub async fn handle_like(
    req: Request<Incoming>,
    state: Arc<AppState>,
    person_id: &str,
) -> Response<BoxBody> {
    let ctx = match authenticate(&state, &req) {
        Ok(ctx) => ctx,
        Err(e) => return error_response(e),
    };

    match state.tree.like(person_id, &ctx.user_id).await {
        Ok(()) => json_response(
            StatusCode::OK,
            &MessageResponse {
                message: "Person liked successfully".into(),
            },
        ),
        Err(e) => error_response(e),
    }
}

/// DELETE /tree/:id/like
pub async fn handle_unlike(
    req: Request<Incoming>,
    state: Arc<AppState>,
    person_id: &str,
) -> Response<BoxBody> {
    let ctx = match authenticate(&state, &req) {
        Ok(ctx) => ctx,
        Err(e) => return error_response(e),
    };

    match state.tree.unlike(person_id, &ctx.user_id).await {
        Ok(()) => json_response(
            StatusCode::OK,
            &MessageResponse {
                message: "Person unliked successfully".into(),
            },
        ),
        Err(e) => error_response(e),
    }
}

/// POST /tree/check-duplicate
pub async fn handle_check_duplicate(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    if let Err(e) = authenticate(&state, &req) {
        return error_response(e);
    }

    let body: CheckDuplicateBody = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(e),
    };
    if body.name.is_empty() {
        return error_response(RootlineError::BadRequest("name is required".into()));
    }

    let threshold = if body.threshold > 0.0 {
        body.threshold
    } else {
        naming::DEFAULT_THRESHOLD
    };

    let people = match state.tree.read_all().await {
        Ok(people) => people,
        Err(e) => return error_response(e),
    };
    let existing: Vec<(String, String)> = people
        .iter()
        .map(|p| (p.id.clone(), p.name.clone()))
        .collect();

    let mut matches = naming::find_similar_names(
        &body.name,
        existing.iter().map(|(id, name)| (id.as_str(), name.as_str())),
        threshold,
    );

    // Optional AI pass merges in matches the edit-distance scan missed
    let mut ai_used = false;
    if body.use_ai {
        if let Some(adapter) = &state.name_match {
            match adapter.match_names(&body.name, &existing).await {
                Ok(ai_matches) => {
                    ai_used = true;
                    for ai_match in ai_matches {
                        if !matches.iter().any(|m| m.person_id == ai_match.person_id) {
                            matches.push(ai_match);
                        }
                    }
                }
                Err(e) => {
                    warn!("AI name matching failed, using edit-distance only: {}", e);
                }
            }
        }
    }

    json_response(
        StatusCode::OK,
        &json!({
            "has_duplicates": !matches.is_empty(),
            "matches": matches,
            "input_name": body.name,
            "normalized": naming::normalize_keep_spaces(&body.name),
            "ai_enhanced": ai_used,
        }),
    )
}

/// DELETE /tree/all
pub async fn handle_delete_all(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let ctx = match authenticate(&state, &req) {
        Ok(ctx) => ctx,
        Err(e) => return error_response(e),
    };
    if let Err(e) = require_admin(&ctx) {
        return error_response(e);
    }

    match state.tree.delete_all().await {
        Ok(count) => json_response(
            StatusCode::OK,
            &json!({
                "message": "All people deleted successfully",
                "deleted_count": count,
            }),
        ),
        Err(e) => error_response(e),
    }
}

/// POST /tree/populate
pub async fn handle_populate(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let ctx = match authenticate(&state, &req) {
        Ok(ctx) => ctx,
        Err(e) => return error_response(e),
    };
    if let Err(e) = require_admin(&ctx) {
        return error_response(e);
    }

    let body: PopulateBody = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(e),
    };

    match state.tree.populate_from_text(&body.text, &ctx.user_id).await {
        Ok(people) => json_response(
            StatusCode::CREATED,
            &json!({
                "created_count": people.len(),
                "people": people,
            }),
        ),
        Err(e) => error_response(e),
    }
}
