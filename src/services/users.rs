//! Auth and user management
//!
//! Registration with heuristic tree-membership verification, login with
//! 24-hour bearer tokens, the permission-request workflow, and admin role
//! management. Login and registration failures use uniform messages so the
//! API never discloses which accounts exist.

use std::collections::HashMap;
use std::sync::Arc;

use bson::Bson;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::auth::{hash_password, verify_password, AuthContext, JwtValidator, Role};
use crate::models::{self, PermissionRequest, Person, ReviewStatus, TreeSettings, User};
use crate::naming;
use crate::services::integrity::{load_user, IntegrityService};
use crate::store::{DocumentStore, FieldOp, Filter, StoreTxn};
use crate::types::{Result, RootlineError};

const MIN_PASSWORD_LEN: usize = 6;

/// Registration input
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub tree_name: String,
    #[serde(default)]
    pub father_name: String,
    #[serde(default)]
    pub birth_year: String,
}

/// User fields safe for API responses
#[derive(Debug, Clone, Serialize)]
pub struct UserPublic {
    pub id: String,
    pub email: String,
    pub role: Role,
    pub is_admin: bool,
    pub tree_name: String,
    pub is_verified: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub person_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub person_name: String,
}

impl UserPublic {
    fn from_user(user: &User, person: Option<&Person>) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            role: user.role,
            is_admin: user.role == Role::Admin,
            tree_name: user.tree_name.clone(),
            is_verified: user.is_verified,
            person_id: person.map(|p| p.id.clone()).unwrap_or_default(),
            person_name: person.map(|p| p.name.clone()).unwrap_or_default(),
        }
    }
}

/// Successful login/registration payload
#[derive(Debug, Serialize)]
pub struct AuthOutcome {
    pub token: String,
    pub user: UserPublic,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// User listing entry with the derived person link
#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub id: String,
    pub email: String,
    pub role: Role,
    pub tree_name: String,
    pub is_verified: bool,
    pub person_id: String,
    pub person_name: String,
    pub created_at: String,
}

/// Registration verification, tokens, permission requests, role changes
#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn DocumentStore>,
    jwt: JwtValidator,
    integrity: IntegrityService,
}

impl UserService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        jwt: JwtValidator,
        integrity: IntegrityService,
    ) -> Self {
        Self {
            store,
            jwt,
            integrity,
        }
    }

    fn now_bson() -> Bson {
        Bson::String(Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let docs = self
            .store
            .query(models::USERS, Filter::new().eq("email", email))
            .await?;
        Ok(docs
            .into_iter()
            .next()
            .and_then(|d| models::from_document(d).ok()))
    }

    /// Register a new viewer. Tree membership is verified heuristically:
    /// among people with the given birth year, some parent's name must
    /// match the supplied father name (normalized equality or prefix).
    /// A failed match still creates the account, unverified.
    pub async fn register(&self, req: RegisterRequest) -> Result<AuthOutcome> {
        if req.email.is_empty() || req.password.is_empty() {
            return Err(RootlineError::BadRequest(
                "Email and password are required".into(),
            ));
        }
        if req.password.len() < MIN_PASSWORD_LEN {
            return Err(RootlineError::BadRequest(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        // The configured tree name gates registration entirely
        let configured = self.configured_tree_name().await?;
        if configured.is_empty() {
            return Err(RootlineError::BadRequest(
                "No tree has been created yet. Please contact admin.".into(),
            ));
        }
        if req.tree_name != configured {
            return Err(RootlineError::BadRequest(format!(
                "Invalid tree name. The available tree is: {}",
                configured
            )));
        }

        if self.find_by_email(&req.email).await?.is_some() {
            return Err(RootlineError::Conflict("User already exists".into()));
        }

        let verified = self
            .verify_tree_membership(&req.father_name, &req.birth_year)
            .await?;

        let password_hash = hash_password(&req.password)?;
        let mut user = User::new(
            uuid::Uuid::new_v4().to_string(),
            req.email.clone(),
            password_hash,
            Role::Viewer,
        );
        user.tree_name = req.tree_name.clone();
        user.father_name = req.father_name.clone();
        user.birth_year = req.birth_year.clone();
        user.is_verified = verified;

        self.store
            .set(models::USERS, &user.id, models::to_document(&user)?)
            .await?;

        info!(email = %user.email, verified, "registered new user");

        let token = self.jwt.generate_token(&user.id, &user.email, user.role)?;
        let message = if verified {
            "Account created and verified! You are part of the family tree.".to_string()
        } else {
            "Account created. Verification pending - we couldn't automatically match your \
             information to the tree. An admin will review your details."
                .to_string()
        };

        Ok(AuthOutcome {
            token,
            user: UserPublic::from_user(&user, None),
            message: Some(message),
        })
    }

    async fn configured_tree_name(&self) -> Result<String> {
        let settings: TreeSettings = match self
            .store
            .get(models::SETTINGS, models::TREE_SETTINGS_ID)
            .await?
        {
            Some(doc) => models::from_document(doc)?,
            None => TreeSettings::default(),
        };
        Ok(settings.tree_name)
    }

    /// Walk people with the requested birth year and check whether any of
    /// their parents carries the supplied father name.
    async fn verify_tree_membership(&self, father_name: &str, birth_year: &str) -> Result<bool> {
        if father_name.is_empty() || birth_year.is_empty() {
            return Ok(false);
        }

        let candidates = self
            .store
            .query(models::PEOPLE, Filter::new().eq("birth", birth_year))
            .await?;

        for candidate in candidates {
            let Ok(person_id) = candidate.get_str("id") else { continue };

            let parents = self
                .store
                .query(
                    models::PEOPLE,
                    Filter::new().array_contains("children", person_id),
                )
                .await?;

            for parent in parents {
                let Ok(parent_name) = parent.get_str("name") else { continue };
                if father_name_matches(parent_name, father_name) {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Authenticate and issue a bearer token. The error message never
    /// distinguishes a missing account from a wrong password.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthOutcome> {
        if email.is_empty() || password.is_empty() {
            return Err(RootlineError::BadRequest(
                "Email and password are required".into(),
            ));
        }

        let user = match self.find_by_email(email).await? {
            Some(u) => u,
            None => {
                warn!(email, "login failed: unknown user");
                return Err(RootlineError::Unauthorized("Invalid email or password".into()));
            }
        };

        if !verify_password(password, &user.password_hash)? {
            warn!(email, "login failed: wrong password");
            return Err(RootlineError::Unauthorized("Invalid email or password".into()));
        }

        info!(email, "login successful");
        let token = self.jwt.generate_token(&user.id, &user.email, user.role)?;
        Ok(AuthOutcome {
            token,
            user: UserPublic::from_user(&user, None),
            message: None,
        })
    }

    /// Resolve the authenticated user plus their derived person link.
    pub async fn validate(&self, ctx: &AuthContext) -> Result<UserPublic> {
        let user = load_user(self.store.as_ref(), &ctx.user_id)
            .await?
            .ok_or_else(|| RootlineError::Unauthorized("User not found".into()))?;

        let person = self.derived_person(&user.id).await?;
        Ok(UserPublic::from_user(&user, person.as_ref()))
    }

    async fn derived_person(&self, user_id: &str) -> Result<Option<Person>> {
        let docs = self
            .store
            .query(models::PEOPLE, Filter::new().eq("linked_user_id", user_id))
            .await?;
        Ok(docs
            .into_iter()
            .next()
            .and_then(|d| models::from_document(d).ok()))
    }

    /// File a permission request; a user holds at most one pending.
    pub async fn request_permission(
        &self,
        ctx: &AuthContext,
        requested_role: Role,
        message: String,
    ) -> Result<PermissionRequest> {
        if !matches!(
            requested_role,
            Role::Contributor | Role::CoAdmin | Role::Admin
        ) {
            return Err(RootlineError::BadRequest(
                "Invalid role requested. Must be 'contributor', 'co-admin', or 'admin'".into(),
            ));
        }

        let pending = self
            .store
            .query(
                models::PERMISSION_REQUESTS,
                Filter::new()
                    .eq("user_id", ctx.user_id.as_str())
                    .eq("status", "pending"),
            )
            .await?;
        if !pending.is_empty() {
            return Err(RootlineError::Conflict(
                "You already have a pending permission request".into(),
            ));
        }

        let mut request = PermissionRequest::new(
            uuid::Uuid::new_v4().to_string(),
            ctx.user_id.clone(),
            ctx.email.clone(),
            requested_role,
        );
        request.message = message;

        self.store
            .set(
                models::PERMISSION_REQUESTS,
                &request.id,
                models::to_document(&request)?,
            )
            .await?;

        info!(user = %ctx.email, role = %requested_role, "permission request filed");
        Ok(request)
    }

    /// Permission requests by status, newest first.
    pub async fn list_permission_requests(
        &self,
        status: ReviewStatus,
    ) -> Result<Vec<PermissionRequest>> {
        let mut requests: Vec<PermissionRequest> = self
            .store
            .query(
                models::PERMISSION_REQUESTS,
                Filter::new().eq("status", status.as_str()),
            )
            .await?
            .into_iter()
            .filter_map(|d| models::from_document(d).ok())
            .collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(requests)
    }

    /// Approve a pending request: the role change and the status
    /// transition commit in one transaction.
    pub async fn approve_permission_request(&self, request_id: &str) -> Result<PermissionRequest> {
        let request = self.load_request(request_id).await?;
        if request.status.is_terminal() {
            return Err(RootlineError::Precondition(
                "Request has already been processed".into(),
            ));
        }

        let request_id_owned = request_id.to_string();
        let user_id = request.user_id.clone();
        let new_role = request.requested_role;

        self.store
            .run_transaction(Box::new(move |tx: &mut dyn StoreTxn| {
                Box::pin(async move {
                    if tx.get(models::USERS, &user_id).await?.is_none() {
                        return Err(RootlineError::NotFound("User not found".into()));
                    }
                    tx.update(
                        models::USERS,
                        &user_id,
                        vec![
                            FieldOp::Set("role".into(), new_role.as_str().into()),
                            FieldOp::Set(
                                "is_admin".into(),
                                Bson::Boolean(new_role == Role::Admin),
                            ),
                            FieldOp::Set("updated_at".into(), Self::now_bson()),
                        ],
                    );
                    tx.update(
                        models::PERMISSION_REQUESTS,
                        &request_id_owned,
                        vec![
                            FieldOp::Set("status".into(), "approved".into()),
                            FieldOp::Set("updated_at".into(), Self::now_bson()),
                        ],
                    );
                    Ok(())
                })
            }))
            .await?;

        info!(user = %request.user_email, role = %new_role, "permission request approved");
        Ok(request)
    }

    pub async fn reject_permission_request(&self, request_id: &str) -> Result<PermissionRequest> {
        let request = self.load_request(request_id).await?;
        if request.status.is_terminal() {
            return Err(RootlineError::Precondition(
                "Request has already been processed".into(),
            ));
        }

        self.store
            .update(
                models::PERMISSION_REQUESTS,
                request_id,
                vec![
                    FieldOp::Set("status".into(), "rejected".into()),
                    FieldOp::Set("updated_at".into(), Self::now_bson()),
                ],
            )
            .await?;

        info!(user = %request.user_email, "permission request rejected");
        Ok(request)
    }

    async fn load_request(&self, request_id: &str) -> Result<PermissionRequest> {
        match self.store.get(models::PERMISSION_REQUESTS, request_id).await? {
            Some(doc) => Ok(models::from_document(doc)?),
            None => Err(RootlineError::NotFound(
                "Permission request not found".into(),
            )),
        }
    }

    /// All users with their derived person links, sorted by email. The
    /// people collection is the source of truth for the links.
    pub async fn list_users(&self) -> Result<Vec<UserSummary>> {
        let mut link_map: HashMap<String, (String, String)> = HashMap::new();
        for doc in self.store.query(models::PEOPLE, Filter::new()).await? {
            let Ok(person) = models::from_document::<Person>(doc) else { continue };
            if !person.linked_user_id.is_empty() {
                link_map.insert(person.linked_user_id.clone(), (person.id, person.name));
            }
        }

        let mut users: Vec<UserSummary> = Vec::new();
        for doc in self.store.query(models::USERS, Filter::new()).await? {
            let Ok(user) = models::from_document::<User>(doc) else { continue };
            let (person_id, person_name) = link_map
                .get(&user.id)
                .cloned()
                .unwrap_or_default();
            users.push(UserSummary {
                id: user.id,
                email: user.email,
                role: user.role,
                tree_name: user.tree_name,
                is_verified: user.is_verified,
                person_id,
                person_name,
                created_at: user.created_at.to_rfc3339(),
            });
        }

        users.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(users)
    }

    /// Change a user's role. Admins cannot change their own role.
    pub async fn update_role(
        &self,
        ctx: &AuthContext,
        target_user_id: &str,
        role: Role,
    ) -> Result<User> {
        if ctx.user_id == target_user_id {
            return Err(RootlineError::BadRequest(
                "Cannot change your own role".into(),
            ));
        }

        let mut user = load_user(self.store.as_ref(), target_user_id)
            .await?
            .ok_or_else(|| RootlineError::NotFound("User not found".into()))?;

        self.store
            .update(
                models::USERS,
                target_user_id,
                vec![
                    FieldOp::Set("role".into(), role.as_str().into()),
                    FieldOp::Set("is_admin".into(), Bson::Boolean(role == Role::Admin)),
                    FieldOp::Set("updated_at".into(), Self::now_bson()),
                ],
            )
            .await?;

        info!(user = %user.email, role = %role, "user role updated");
        user.role = role;
        user.is_admin = role == Role::Admin;
        Ok(user)
    }

    /// Drop a user back to viewer. Admins cannot revoke themselves.
    pub async fn revoke_access(&self, ctx: &AuthContext, target_user_id: &str) -> Result<User> {
        if ctx.user_id == target_user_id {
            return Err(RootlineError::BadRequest(
                "Cannot revoke your own access".into(),
            ));
        }
        self.update_role(ctx, target_user_id, Role::Viewer).await
    }

    /// Delete a user account entirely: cascade first, then the document.
    pub async fn delete_user(&self, ctx: &AuthContext, target_user_id: &str) -> Result<()> {
        if ctx.user_id == target_user_id {
            return Err(RootlineError::BadRequest(
                "Cannot delete your own account".into(),
            ));
        }

        load_user(self.store.as_ref(), target_user_id)
            .await?
            .ok_or_else(|| RootlineError::NotFound("User not found".into()))?;

        self.integrity.on_user_deleted(target_user_id).await;
        self.store.delete(models::USERS, target_user_id).await?;
        info!(user_id = target_user_id, "deleted user");
        Ok(())
    }
}

/// Normalized father-name comparison: equality or prefix after script
/// folding, so "محمد" matches a parent stored as "محمد رضا".
fn father_name_matches(parent_name: &str, father_name: &str) -> bool {
    let parent = naming::normalize(parent_name);
    let father = naming::normalize(father_name);
    !father.is_empty() && (parent == father || parent.starts_with(&father))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::integrity::load_person;
    use crate::store::MemoryStore;

    async fn setup() -> (Arc<dyn DocumentStore>, UserService) {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let integrity = IntegrityService::new(Arc::clone(&store));
        let jwt = JwtValidator::new(
            "test-secret-that-is-at-least-32-characters-long".into(),
            86400,
        )
        .unwrap();
        let users = UserService::new(Arc::clone(&store), jwt, integrity);
        (store, users)
    }

    async fn seed_tree_settings(store: &dyn DocumentStore, name: &str) {
        let settings = TreeSettings {
            tree_name: name.into(),
        };
        store
            .set(
                models::SETTINGS,
                models::TREE_SETTINGS_ID,
                models::to_document(&settings).unwrap(),
            )
            .await
            .unwrap();
    }

    async fn seed_family(store: &dyn DocumentStore) {
        // father "Hassan" with a child born 1990
        let mut father = Person::new("father".into(), "Hassan Karimi".into(), "admin".into());
        father.children = vec!["kid".into()];
        let mut kid = Person::new("kid".into(), "Kid".into(), "admin".into());
        kid.birth = "1990".into();
        for p in [&father, &kid] {
            store
                .set(models::PEOPLE, &p.id, models::to_document(p).unwrap())
                .await
                .unwrap();
        }
    }

    fn ctx_for(user: &User) -> AuthContext {
        AuthContext {
            user_id: user.id.clone(),
            email: user.email.clone(),
            role: user.role,
        }
    }

    #[test]
    fn test_father_name_matching() {
        assert!(father_name_matches("Hassan Karimi", "Hassan"));
        assert!(father_name_matches("Hassan", "Hassan"));
        assert!(father_name_matches("حسین", "حسين")); // Arabic ya folds
        assert!(!father_name_matches("Hossein", "Hassan"));
        assert!(!father_name_matches("Hassan", ""));
    }

    #[tokio::test]
    async fn test_register_verified_when_family_matches() {
        let (store, users) = setup().await;
        seed_tree_settings(store.as_ref(), "batur").await;
        seed_family(store.as_ref()).await;

        let outcome = users
            .register(RegisterRequest {
                email: "new@x".into(),
                password: "secret-pass".into(),
                tree_name: "batur".into(),
                father_name: "Hassan".into(),
                birth_year: "1990".into(),
            })
            .await
            .unwrap();

        assert!(outcome.user.is_verified);
        assert_eq!(outcome.user.role, Role::Viewer);
        assert!(!outcome.token.is_empty());
    }

    #[tokio::test]
    async fn test_register_unverified_on_no_match_still_creates() {
        let (store, users) = setup().await;
        seed_tree_settings(store.as_ref(), "batur").await;
        seed_family(store.as_ref()).await;

        let outcome = users
            .register(RegisterRequest {
                email: "new@x".into(),
                password: "secret-pass".into(),
                tree_name: "batur".into(),
                father_name: "Nobody".into(),
                birth_year: "1990".into(),
            })
            .await
            .unwrap();

        assert!(!outcome.user.is_verified);
        assert!(outcome.message.unwrap().contains("Verification pending"));
        // Account exists
        assert!(users.find_by_email("new@x").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_register_rejects_wrong_tree_and_duplicates() {
        let (store, users) = setup().await;

        // No tree configured
        let err = users
            .register(RegisterRequest {
                email: "a@x".into(),
                password: "secret-pass".into(),
                tree_name: "any".into(),
                father_name: String::new(),
                birth_year: String::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RootlineError::BadRequest(_)));

        seed_tree_settings(store.as_ref(), "batur").await;

        // Wrong tree name
        let err = users
            .register(RegisterRequest {
                email: "a@x".into(),
                password: "secret-pass".into(),
                tree_name: "other".into(),
                father_name: String::new(),
                birth_year: String::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RootlineError::BadRequest(_)));

        // First registration passes, duplicate email conflicts
        users
            .register(RegisterRequest {
                email: "a@x".into(),
                password: "secret-pass".into(),
                tree_name: "batur".into(),
                father_name: String::new(),
                birth_year: String::new(),
            })
            .await
            .unwrap();
        let err = users
            .register(RegisterRequest {
                email: "a@x".into(),
                password: "secret-pass".into(),
                tree_name: "batur".into(),
                father_name: String::new(),
                birth_year: String::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RootlineError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_login_uniform_errors() {
        let (store, users) = setup().await;
        seed_tree_settings(store.as_ref(), "batur").await;
        users
            .register(RegisterRequest {
                email: "a@x".into(),
                password: "secret-pass".into(),
                tree_name: "batur".into(),
                father_name: String::new(),
                birth_year: String::new(),
            })
            .await
            .unwrap();

        let unknown = users.login("nobody@x", "whatever-pass").await.unwrap_err();
        let wrong = users.login("a@x", "wrong-password").await.unwrap_err();
        assert_eq!(unknown.to_string(), wrong.to_string());

        let outcome = users.login("a@x", "secret-pass").await.unwrap();
        assert!(!outcome.token.is_empty());
        assert_eq!(outcome.user.email, "a@x");
    }

    #[tokio::test]
    async fn test_permission_request_single_pending_and_approval() {
        let (store, users) = setup().await;
        let user = User::new("u1".into(), "u@x".into(), String::new(), Role::Viewer);
        store
            .set(models::USERS, "u1", models::to_document(&user).unwrap())
            .await
            .unwrap();
        let ctx = ctx_for(&user);

        let request = users
            .request_permission(&ctx, Role::Contributor, "please".into())
            .await
            .unwrap();

        // Second pending request conflicts
        let err = users
            .request_permission(&ctx, Role::CoAdmin, String::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RootlineError::Conflict(_)));

        // Editor is not a requestable role
        let err = users
            .request_permission(&ctx, Role::Editor, String::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RootlineError::BadRequest(_)));

        users.approve_permission_request(&request.id).await.unwrap();

        // Role changed atomically with the request status
        let updated = load_user(store.as_ref(), "u1").await.unwrap().unwrap();
        assert_eq!(updated.role, Role::Contributor);
        let pending = users
            .list_permission_requests(ReviewStatus::Pending)
            .await
            .unwrap();
        assert!(pending.is_empty());

        // Terminal request cannot be re-processed
        let err = users
            .approve_permission_request(&request.id)
            .await
            .unwrap_err();
        assert!(matches!(err, RootlineError::Precondition(_)));

        // After approval the user may file again
        let ctx = AuthContext {
            role: Role::Contributor,
            ..ctx
        };
        users
            .request_permission(&ctx, Role::CoAdmin, String::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_role_update_and_self_lockout_guard() {
        let (store, users) = setup().await;
        let admin = User::new("admin".into(), "admin@x".into(), String::new(), Role::Admin);
        let other = User::new("u1".into(), "u@x".into(), String::new(), Role::Viewer);
        for u in [&admin, &other] {
            store
                .set(models::USERS, &u.id, models::to_document(u).unwrap())
                .await
                .unwrap();
        }
        let ctx = ctx_for(&admin);

        let updated = users.update_role(&ctx, "u1", Role::Editor).await.unwrap();
        assert_eq!(updated.role, Role::Editor);

        let err = users.update_role(&ctx, "admin", Role::Viewer).await.unwrap_err();
        assert!(matches!(err, RootlineError::BadRequest(_)));
        let err = users.revoke_access(&ctx, "admin").await.unwrap_err();
        assert!(matches!(err, RootlineError::BadRequest(_)));

        let reverted = users.revoke_access(&ctx, "u1").await.unwrap();
        assert_eq!(reverted.role, Role::Viewer);
    }

    #[tokio::test]
    async fn test_delete_user_cascades() {
        let (store, users) = setup().await;
        let admin = User::new("admin".into(), "admin@x".into(), String::new(), Role::Admin);
        let victim = User::new("u1".into(), "u@x".into(), String::new(), Role::Viewer);
        for u in [&admin, &victim] {
            store
                .set(models::USERS, &u.id, models::to_document(u).unwrap())
                .await
                .unwrap();
        }

        let mut person = Person::new("p1".into(), "P".into(), "admin".into());
        person.linked_user_id = "u1".into();
        person.liked_by = vec!["u1".into()];
        person.likes_count = 1;
        store
            .set(models::PEOPLE, "p1", models::to_document(&person).unwrap())
            .await
            .unwrap();

        users.delete_user(&ctx_for(&admin), "u1").await.unwrap();

        assert!(load_user(store.as_ref(), "u1").await.unwrap().is_none());
        let person = load_person(store.as_ref(), "p1").await.unwrap().unwrap();
        assert_eq!(person.linked_user_id, "");
        assert_eq!(person.likes_count, 0);
    }

    #[tokio::test]
    async fn test_list_users_derives_person_links() {
        let (store, users) = setup().await;
        let user = User::new("u1".into(), "u@x".into(), String::new(), Role::Viewer);
        store
            .set(models::USERS, "u1", models::to_document(&user).unwrap())
            .await
            .unwrap();

        let mut person = Person::new("p1".into(), "Linked Person".into(), "admin".into());
        person.linked_user_id = "u1".into();
        store
            .set(models::PEOPLE, "p1", models::to_document(&person).unwrap())
            .await
            .unwrap();

        let listing = users.list_users().await.unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].person_id, "p1");
        assert_eq!(listing[0].person_name, "Linked Person");
    }
}
