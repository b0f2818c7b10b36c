//! Health check endpoint

use hyper::{Response, StatusCode};
use serde::Serialize;

use super::{json_response, BoxBody};

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// GET /health
pub fn health_check() -> Response<BoxBody> {
    json_response(StatusCode::OK, &HealthResponse { status: "healthy" })
}
