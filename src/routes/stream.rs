//! Admin stream endpoint (server-sent events)
//!
//! GET /stream/admin?token=...
//!
//! EventSource clients cannot set headers, so the bearer token is accepted
//! as a query parameter, with the Authorization header as a fallback. Only
//! approvers (co-admin, admin) may connect. The response opens with a
//! `connected` event and a snapshot of each pending moderation queue, then
//! forwards live change events until the client goes away.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body_util::{BodyExt, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::{Request, Response, StatusCode};
use serde_json::json;
use tokio::sync::mpsc;

use crate::auth::{extract_token_from_header, extract_token_from_query};
use crate::server::AppState;
use crate::store::Filter;
use crate::stream::{SessionGuard, StreamEvent, WATCHED_COLLECTIONS};
use crate::types::RootlineError;

use super::{error_response, BoxBody};

/// SSE body: queued initial events, then the live session channel. The
/// guard unregisters the session when the client disconnects and the body
/// is dropped.
struct SessionStream {
    initial: VecDeque<StreamEvent>,
    rx: mpsc::Receiver<StreamEvent>,
    _guard: SessionGuard,
}

impl futures_util::Stream for SessionStream {
    type Item = std::result::Result<Frame<Bytes>, hyper::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if let Some(event) = this.initial.pop_front() {
            return Poll::Ready(Some(Ok(Frame::data(event.to_bytes()))));
        }

        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(event)) => Poll::Ready(Some(Ok(Frame::data(event.to_bytes())))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// GET /stream/admin
pub async fn handle_admin_stream(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    // Query-parameter token first, header as fallback
    let token = extract_token_from_query(req.uri().query(), "token").or_else(|| {
        let header = req
            .headers()
            .get(hyper::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        extract_token_from_header(header).map(str::to_string)
    });

    let Some(token) = token else {
        return error_response(RootlineError::Unauthorized("Token required".into()));
    };

    let result = state.jwt.verify_token(&token);
    let Some(claims) = result.claims else {
        return error_response(RootlineError::Unauthorized("Invalid token".into()));
    };

    if !claims.role.can_approve() {
        return error_response(RootlineError::Forbidden("Admin access required".into()));
    }

    let session_id = format!("{}-{}", claims.user_id, uuid::Uuid::new_v4());

    let mut initial = VecDeque::new();
    initial.push_back(StreamEvent::new(
        "connected",
        json!({
            "message": "Connected to admin stream",
            "clientId": session_id,
        }),
    ));

    // One-shot snapshot of each pending queue
    for collection in WATCHED_COLLECTIONS {
        match state
            .store
            .query(collection, Filter::new().eq("status", "pending"))
            .await
        {
            Ok(docs) => {
                let items: Vec<serde_json::Value> = docs
                    .iter()
                    .filter_map(|d| serde_json::to_value(d).ok())
                    .collect();
                initial.push_back(StreamEvent::new(
                    collection,
                    json!({ "items": items, "collection": collection }),
                ));
            }
            Err(e) => return error_response(e),
        }
    }

    let rx = state.broadcaster.register(session_id.clone()).await;
    let guard = SessionGuard::new(Arc::clone(&state.broadcaster), session_id);

    let stream = SessionStream {
        initial,
        rx,
        _guard: guard,
    };

    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "text/event-stream")
        .header("Cache-Control", "no-cache")
        .header("Connection", "keep-alive")
        .header("Access-Control-Allow-Origin", "*")
        .header("X-Accel-Buffering", "no")
        .body(StreamBody::new(stream).boxed())
        .unwrap()
}
