//! End-to-end workflow tests over the in-memory store
//!
//! Exercises the service layer the way the HTTP surface drives it:
//! create-and-link, cascading deletes, the suggestion lifecycle, identity
//! ownership, bulk import, like idempotence, and conflict grouping.

use std::sync::Arc;

use rootline::auth::{AuthContext, JwtValidator, Role};
use rootline::models::{self, PersonData, ReviewStatus, SuggestionType, User};
use rootline::services::{
    CreatePersonRequest, CreateSuggestionRequest, IdentityService, IntegrityService,
    SuggestionService, TreeService, UserService,
};
use rootline::store::{DocumentStore, MemoryStore};
use rootline::RootlineError;

struct Harness {
    store: Arc<dyn DocumentStore>,
    tree: TreeService,
    identity: IdentityService,
    suggestions: SuggestionService,
    users: UserService,
}

fn harness() -> Harness {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let integrity = IntegrityService::new(Arc::clone(&store));
    let tree = TreeService::new(Arc::clone(&store), integrity.clone());
    let identity = IdentityService::new(Arc::clone(&store), integrity.clone());
    let suggestions = SuggestionService::new(Arc::clone(&store), tree.clone());
    let jwt = JwtValidator::new(
        "integration-test-secret-at-least-32-chars".into(),
        86400,
    )
    .unwrap();
    let users = UserService::new(Arc::clone(&store), jwt, integrity);

    Harness {
        store,
        tree,
        identity,
        suggestions,
        users,
    }
}

fn ctx(user_id: &str, role: Role) -> AuthContext {
    AuthContext {
        user_id: user_id.into(),
        email: format!("{user_id}@x"),
        role,
    }
}

async fn seed_user(store: &dyn DocumentStore, id: &str, role: Role) {
    let user = User::new(id.into(), format!("{id}@x"), String::new(), role);
    store
        .set(models::USERS, id, models::to_document(&user).unwrap())
        .await
        .unwrap();
}

// Scenario 1: create a root, then a child under it.
#[tokio::test]
async fn create_and_link_root() {
    let h = harness();

    let root = h
        .tree
        .create(
            CreatePersonRequest {
                name: "Root".into(),
                role: "Father".into(),
                ..Default::default()
            },
            "admin",
        )
        .await
        .unwrap();

    let kid = h
        .tree
        .create(
            CreatePersonRequest {
                name: "Kid".into(),
                role: "Son".into(),
                parent_id: Some(root.id.clone()),
                ..Default::default()
            },
            "admin",
        )
        .await
        .unwrap();

    let people = h.tree.read_all().await.unwrap();
    assert_eq!(people.len(), 2);

    let root = people.iter().find(|p| p.id == root.id).unwrap();
    assert_eq!(root.children, vec![kid.id.clone()]);
}

// Scenario 2: deleting the root leaves the child as a root.
#[tokio::test]
async fn cascade_delete_leaves_orphan_as_root() {
    let h = harness();
    let admin = ctx("admin", Role::Admin);

    let root = h
        .tree
        .create(
            CreatePersonRequest {
                name: "Root".into(),
                role: "Father".into(),
                ..Default::default()
            },
            "admin",
        )
        .await
        .unwrap();
    let kid = h
        .tree
        .create(
            CreatePersonRequest {
                name: "Kid".into(),
                role: "Son".into(),
                parent_id: Some(root.id.clone()),
                ..Default::default()
            },
            "admin",
        )
        .await
        .unwrap();

    h.tree.delete(&root.id, &admin).await.unwrap();

    let people = h.tree.read_all().await.unwrap();
    assert_eq!(people.len(), 1);
    assert_eq!(people[0].id, kid.id);
    assert!(people[0].children.is_empty());
}

// Scenario 3: suggestion edit flow; the second review fails.
#[tokio::test]
async fn suggestion_flow() {
    let h = harness();
    let contributor = ctx("c1", Role::Contributor);
    let admin = ctx("admin", Role::Admin);

    let kid = h
        .tree
        .create(
            CreatePersonRequest {
                name: "Kid".into(),
                role: "Son".into(),
                ..Default::default()
            },
            "admin",
        )
        .await
        .unwrap();

    let suggestion = h
        .suggestions
        .create(
            &contributor,
            CreateSuggestionRequest {
                suggestion_type: SuggestionType::Edit,
                target_person_id: kid.id.clone(),
                person_data: Some(PersonData {
                    name: "Kiddo".into(),
                    ..Default::default()
                }),
                message: String::new(),
            },
        )
        .await
        .unwrap();

    h.suggestions
        .review(&suggestion.id, true, String::new(), &admin)
        .await
        .unwrap();

    assert_eq!(h.tree.get(&kid.id).await.unwrap().name, "Kiddo");

    let err = h
        .suggestions
        .review(&suggestion.id, true, String::new(), &admin)
        .await
        .unwrap_err();
    assert!(matches!(err, RootlineError::Precondition(_)));
    // Maps to HTTP 400
    assert_eq!(err.status_code().as_u16(), 400);
}

// Scenario 4: identity ownership lives on the person.
#[tokio::test]
async fn identity_ownership() {
    let h = harness();
    seed_user(h.store.as_ref(), "u1", Role::Viewer).await;
    let user = ctx("u1", Role::Viewer);
    let admin = ctx("admin", Role::Admin);

    let kid = h
        .tree
        .create(
            CreatePersonRequest {
                name: "Kid".into(),
                role: "Son".into(),
                ..Default::default()
            },
            "admin",
        )
        .await
        .unwrap();

    let claim = h.identity.claim(&user, &kid.id, String::new()).await.unwrap();
    h.identity
        .review(&claim.id, true, String::new(), &admin)
        .await
        .unwrap();

    let person = h.tree.get(&kid.id).await.unwrap();
    assert_eq!(person.linked_user_id, "u1");

    let user_doc = h.store.get(models::USERS, "u1").await.unwrap().unwrap();
    assert!(user_doc.get_bool("is_verified").unwrap());
    // No persisted person_id on the user document
    assert!(user_doc.get("person_id").is_none());

    let status = h.identity.my_claim(&user).await.unwrap();
    assert!(status.linked);
    assert_eq!(status.person.unwrap().id, kid.id);
}

// Scenario 5: bulk import from indented text.
#[tokio::test]
async fn bulk_import() {
    let h = harness();
    let text = "A (m) 1950\n  B (f) 1975 l:NYC\n  C (m) 1978\n    D (m) 2005\n";

    let created = h.tree.populate_from_text(text, "admin").await.unwrap();
    assert_eq!(created.len(), 4);

    let people = h.tree.read_all().await.unwrap();
    let by_name = |n: &str| people.iter().find(|p| p.name == n).unwrap();

    let a = by_name("A");
    let b = by_name("B");
    let c = by_name("C");
    let d = by_name("D");

    assert_eq!(a.children, vec![b.id.clone(), c.id.clone()]);
    assert_eq!(c.children, vec![d.id.clone()]);
    assert_eq!(b.gender, "female");
    assert_eq!(b.location, "NYC");
    assert_eq!(c.location, "");
    assert_eq!(d.birth, "2005");
}

// Scenario 6: a repeated like conflicts and leaves the count unchanged.
#[tokio::test]
async fn like_idempotence() {
    let h = harness();

    let person = h
        .tree
        .create(
            CreatePersonRequest {
                name: "P".into(),
                role: "Father".into(),
                ..Default::default()
            },
            "admin",
        )
        .await
        .unwrap();

    h.tree.like(&person.id, "u1").await.unwrap();
    let err = h.tree.like(&person.id, "u1").await.unwrap_err();
    assert_eq!(err.status_code().as_u16(), 409);

    let person = h.tree.get(&person.id).await.unwrap();
    assert_eq!(person.likes_count, 1);
}

// Scenario 7: two delete suggestions and one edit on the same target form
// two cross-referenced conflict groups.
#[tokio::test]
async fn conflict_grouping() {
    let h = harness();

    let person = h
        .tree
        .create(
            CreatePersonRequest {
                name: "P".into(),
                role: "Father".into(),
                ..Default::default()
            },
            "admin",
        )
        .await
        .unwrap();

    for user in ["c1", "c2"] {
        h.suggestions
            .create(
                &ctx(user, Role::Contributor),
                CreateSuggestionRequest {
                    suggestion_type: SuggestionType::Delete,
                    target_person_id: person.id.clone(),
                    person_data: None,
                    message: String::new(),
                },
            )
            .await
            .unwrap();
    }
    h.suggestions
        .create(
            &ctx("c3", Role::Contributor),
            CreateSuggestionRequest {
                suggestion_type: SuggestionType::Edit,
                target_person_id: person.id.clone(),
                person_data: Some(PersonData {
                    name: "X".into(),
                    ..Default::default()
                }),
                message: String::new(),
            },
        )
        .await
        .unwrap();

    let groups = h.suggestions.grouped().await.unwrap();
    assert_eq!(groups.len(), 2);
    assert!(groups.iter().all(|g| g.has_conflict));

    let delete_group = groups
        .iter()
        .find(|g| g.suggestion_type == SuggestionType::Delete)
        .unwrap();
    let edit_group = groups
        .iter()
        .find(|g| g.suggestion_type == SuggestionType::Edit)
        .unwrap();
    assert_eq!(delete_group.count, 2);
    assert!(delete_group.conflicts_with.contains(&edit_group.id));
    assert!(edit_group.conflicts_with.contains(&delete_group.id));
}

// Permission approval changes the role atomically with the request.
#[tokio::test]
async fn permission_request_promotion() {
    let h = harness();
    seed_user(h.store.as_ref(), "u1", Role::Viewer).await;
    let user = ctx("u1", Role::Viewer);

    let request = h
        .users
        .request_permission(&user, Role::Contributor, "let me help".into())
        .await
        .unwrap();

    h.users.approve_permission_request(&request.id).await.unwrap();

    let doc = h.store.get(models::USERS, "u1").await.unwrap().unwrap();
    assert_eq!(doc.get_str("role").unwrap(), "contributor");

    let pending = h
        .users
        .list_permission_requests(ReviewStatus::Pending)
        .await
        .unwrap();
    assert!(pending.is_empty());
}

// Deleting a person auto-rejects the pending claim that targeted it.
#[tokio::test]
async fn person_delete_rejects_pending_claims() {
    let h = harness();
    seed_user(h.store.as_ref(), "u1", Role::Viewer).await;
    let user = ctx("u1", Role::Viewer);
    let admin = ctx("admin", Role::Admin);

    let kid = h
        .tree
        .create(
            CreatePersonRequest {
                name: "Kid".into(),
                role: "Son".into(),
                ..Default::default()
            },
            "admin",
        )
        .await
        .unwrap();

    h.identity.claim(&user, &kid.id, String::new()).await.unwrap();
    h.tree.delete(&kid.id, &admin).await.unwrap();

    let status = h.identity.my_claim(&user).await.unwrap();
    assert!(!status.linked);
    let claim = status.claim.unwrap();
    assert_eq!(claim.status, ReviewStatus::Rejected);
    assert!(claim.review_notes.contains("deleted"));
}
