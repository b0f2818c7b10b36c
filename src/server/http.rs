//! HTTP server implementation
//!
//! hyper http1 with TokioIo; one spawned task per connection. Routing is a
//! match over (method, path) with the `/api/v1` prefix stripped; every
//! endpoint maps to exactly one role-guard predicate in its handler.

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::auth::JwtValidator;
use crate::config::Args;
use crate::routes;
use crate::services::{
    IdentityService, IntegrityService, NameMatchAdapter, NoopProfileFetcher, ProfileFetcher,
    SuggestionService, TreeService, UserService,
};
use crate::store::DocumentStore;
use crate::stream::AdminBroadcaster;
use crate::types::Result;

type BoxBody = routes::BoxBody;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub store: Arc<dyn DocumentStore>,
    pub jwt: JwtValidator,
    pub tree: TreeService,
    pub identity: IdentityService,
    pub suggestions: SuggestionService,
    pub users: UserService,
    pub broadcaster: Arc<AdminBroadcaster>,
    /// External profile lookups; defaults to the no-op adapter
    pub profile: Arc<dyn ProfileFetcher>,
    /// Optional AI name matching for the duplicate check
    pub name_match: Option<Arc<dyn NameMatchAdapter>>,
}

impl AppState {
    pub fn new(args: Args, store: Arc<dyn DocumentStore>) -> Result<Self> {
        let jwt = JwtValidator::new(args.jwt_secret()?, args.jwt_expiry_seconds)?;

        let integrity = IntegrityService::new(Arc::clone(&store));
        let tree = TreeService::new(Arc::clone(&store), integrity.clone());
        let identity = IdentityService::new(Arc::clone(&store), integrity.clone());
        let suggestions = SuggestionService::new(Arc::clone(&store), tree.clone());
        let users = UserService::new(Arc::clone(&store), jwt.clone(), integrity);

        Ok(Self {
            args,
            store,
            jwt,
            tree,
            identity,
            suggestions,
            users,
            broadcaster: Arc::new(AdminBroadcaster::new()),
            profile: Arc::new(NoopProfileFetcher),
            name_match: None,
        })
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let addr = state.args.listen_addr();
    let listener = TcpListener::bind(&addr).await?;

    info!("rootline listening on {}", addr);

    // The broadcaster subscribes to the moderation queues before the first
    // request is accepted.
    Arc::clone(&state.broadcaster)
        .start(Arc::clone(&state.store))
        .await?;

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, req).await }
                    });

                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        debug!("connection from {} ended with error: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    req: Request<Incoming>,
) -> std::result::Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let full_path = req.uri().path().to_string();

    debug!("{} {}", method, full_path);

    if method == Method::OPTIONS {
        return Ok(routes::cors_preflight());
    }

    if method == Method::GET && full_path == "/health" {
        return Ok(routes::health::health_check());
    }

    // Everything else is versioned
    let Some(path) = full_path.strip_prefix("/api/v1") else {
        return Ok(routes::not_found(&full_path));
    };
    let path = path.to_string();

    let response = match (method, path.as_str()) {
        // ---- auth ----
        (Method::POST, "/auth/login") => {
            routes::auth_routes::handle_login(req, state).await
        }
        (Method::POST, "/auth/register") => {
            routes::auth_routes::handle_register(req, state).await
        }
        (Method::GET, "/auth/validate") => {
            routes::auth_routes::handle_validate(req, state).await
        }
        (Method::POST, "/auth/request-permission") => {
            routes::auth_routes::handle_request_permission(req, state).await
        }

        // ---- admin: users ----
        (Method::GET, "/admin/users") => {
            routes::admin_users::handle_list_users(req, state).await
        }
        (Method::PUT, p) if p.starts_with("/admin/users/") && p.ends_with("/role") => {
            let id = p
                .strip_prefix("/admin/users/")
                .and_then(|s| s.strip_suffix("/role"))
                .unwrap_or("");
            routes::admin_users::handle_update_role(req, state, id).await
        }
        (Method::DELETE, p) if p.starts_with("/admin/users/") && p.ends_with("/access") => {
            let id = p
                .strip_prefix("/admin/users/")
                .and_then(|s| s.strip_suffix("/access"))
                .unwrap_or("");
            routes::admin_users::handle_revoke_access(req, state, id).await
        }
        (Method::DELETE, p) if p.starts_with("/admin/users/") => {
            let id = p.strip_prefix("/admin/users/").unwrap_or("");
            routes::admin_users::handle_delete_user(req, state, id).await
        }

        // ---- admin: permission requests ----
        (Method::GET, "/admin/permission-requests") => {
            routes::admin_users::handle_list_permission_requests(req, state).await
        }
        (Method::POST, p)
            if p.starts_with("/admin/permission-requests/") && p.ends_with("/approve") =>
        {
            let id = p
                .strip_prefix("/admin/permission-requests/")
                .and_then(|s| s.strip_suffix("/approve"))
                .unwrap_or("");
            routes::admin_users::handle_approve_permission_request(req, state, id).await
        }
        (Method::POST, p)
            if p.starts_with("/admin/permission-requests/") && p.ends_with("/reject") =>
        {
            let id = p
                .strip_prefix("/admin/permission-requests/")
                .and_then(|s| s.strip_suffix("/reject"))
                .unwrap_or("");
            routes::admin_users::handle_reject_permission_request(req, state, id).await
        }

        // ---- identity ----
        (Method::POST, "/identity/claim") => {
            routes::identity::handle_claim(req, state).await
        }
        (Method::GET, "/identity/my-claim") => {
            routes::identity::handle_my_claim(req, state).await
        }
        (Method::GET, "/admin/identity-claims") => {
            routes::identity::handle_list_claims(req, state).await
        }
        (Method::POST, p)
            if p.starts_with("/admin/identity-claims/") && p.ends_with("/review") =>
        {
            let id = p
                .strip_prefix("/admin/identity-claims/")
                .and_then(|s| s.strip_suffix("/review"))
                .unwrap_or("");
            routes::identity::handle_review_claim(req, state, id).await
        }
        (Method::POST, p) if p.starts_with("/admin/unlink-user/") => {
            let user_id = p.strip_prefix("/admin/unlink-user/").unwrap_or("");
            routes::identity::handle_unlink(req, state, user_id).await
        }
        (Method::POST, "/admin/link-user-to-person") => {
            routes::identity::handle_link_user_to_person(req, state).await
        }
        (Method::PUT, p) if p.starts_with("/admin/person/") && p.ends_with("/instagram") => {
            let id = p
                .strip_prefix("/admin/person/")
                .and_then(|s| s.strip_suffix("/instagram"))
                .unwrap_or("");
            routes::identity::handle_set_instagram(req, state, id).await
        }
        (Method::GET, "/admin/instagram/lookup") => {
            routes::identity::handle_instagram_lookup(req, state).await
        }

        // ---- suggestions ----
        (Method::POST, "/suggestions") => {
            routes::suggestions::handle_create(req, state).await
        }
        (Method::GET, "/suggestions/my") => {
            routes::suggestions::handle_my_suggestions(req, state).await
        }
        (Method::GET, "/admin/suggestions") => {
            routes::suggestions::handle_all_suggestions(req, state).await
        }
        (Method::GET, "/admin/suggestions/grouped") => {
            routes::suggestions::handle_grouped(req, state).await
        }
        (Method::POST, "/admin/suggestions/batch-review") => {
            routes::suggestions::handle_batch_review(req, state).await
        }
        (Method::POST, p) if p.starts_with("/admin/suggestions/") && p.ends_with("/review") => {
            let id = p
                .strip_prefix("/admin/suggestions/")
                .and_then(|s| s.strip_suffix("/review"))
                .unwrap_or("");
            routes::suggestions::handle_review(req, state, id).await
        }

        // ---- tree ----
        (Method::GET, "/tree") => routes::tree::handle_get_all(req, state).await,
        (Method::POST, "/tree") => routes::tree::handle_create(req, state).await,
        (Method::POST, "/tree/check-duplicate") => {
            routes::tree::handle_check_duplicate(req, state).await
        }
        (Method::POST, "/tree/populate") => routes::tree::handle_populate(req, state).await,
        (Method::DELETE, "/tree/all") => routes::tree::handle_delete_all(req, state).await,
        (Method::POST, p) if p.starts_with("/tree/") && p.ends_with("/like") => {
            let id = p
                .strip_prefix("/tree/")
                .and_then(|s| s.strip_suffix("/like"))
                .unwrap_or("");
            routes::tree::handle_like(req, state, id).await
        }
        (Method::DELETE, p) if p.starts_with("/tree/") && p.ends_with("/like") => {
            let id = p
                .strip_prefix("/tree/")
                .and_then(|s| s.strip_suffix("/like"))
                .unwrap_or("");
            routes::tree::handle_unlike(req, state, id).await
        }
        (Method::GET, p) if p.starts_with("/tree/") => {
            let id = p.strip_prefix("/tree/").unwrap_or("");
            routes::tree::handle_get_one(req, state, id).await
        }
        (Method::PUT, p) if p.starts_with("/tree/") => {
            let id = p.strip_prefix("/tree/").unwrap_or("");
            routes::tree::handle_update(req, state, id).await
        }
        (Method::DELETE, p) if p.starts_with("/tree/") => {
            let id = p.strip_prefix("/tree/").unwrap_or("");
            routes::tree::handle_delete(req, state, id).await
        }

        // ---- admin stream ----
        (Method::GET, "/stream/admin") => {
            routes::stream::handle_admin_stream(req, state).await
        }

        _ => routes::not_found(&full_path),
    };

    Ok(response)
}
