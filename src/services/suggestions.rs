//! Suggestion workflow
//!
//! Contributors file add/edit/delete proposals; approvers review them.
//! Approval replays the mutation through the tree engine, so an approved
//! suggestion behaves exactly like a direct edit by the author. Grouping
//! buckets semantically identical proposals, and conflict detection flags
//! groups that cannot all be applied to the same target.

use std::collections::HashMap;
use std::sync::Arc;

use bson::Bson;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::auth::AuthContext;
use crate::models::{
    self, Person, PersonData, ReviewStatus, Suggestion, SuggestionType,
};
use crate::services::integrity::{load_person, load_suggestion};
use crate::services::tree::{CreatePersonRequest, TreeService, UpdatePersonRequest};
use crate::store::{DocumentStore, FieldOp, Filter};
use crate::types::{Result, RootlineError};

/// Request to create a suggestion
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSuggestionRequest {
    #[serde(rename = "type")]
    pub suggestion_type: SuggestionType,
    #[serde(default)]
    pub target_person_id: String,
    #[serde(default)]
    pub person_data: Option<PersonData>,
    #[serde(default)]
    pub message: String,
}

/// Suggestion enriched with its denormalized target for listings
#[derive(Debug, Serialize)]
pub struct SuggestionView {
    #[serde(flatten)]
    pub suggestion: Suggestion,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_person: Option<Person>,
}

/// A bucket of semantically identical suggestions
#[derive(Debug, Serialize)]
pub struct SuggestionGroup {
    /// Group id: the shared group key
    pub id: String,
    #[serde(rename = "type")]
    pub suggestion_type: SuggestionType,
    pub target_person_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub person_data: Option<PersonData>,
    pub count: usize,
    pub suggestion_ids: Vec<String>,
    pub user_emails: Vec<String>,
    pub messages: Vec<String>,
    pub first_created_at: DateTime<Utc>,
    pub last_created_at: DateTime<Utc>,
    pub has_conflict: bool,
    /// Group ids this group conflicts with
    pub conflicts_with: Vec<String>,
}

/// Outcome of a batch review
#[derive(Debug, Serialize)]
pub struct BatchReviewResult {
    pub succeeded: usize,
    pub failed: usize,
}

/// Create/group/review/execute suggestions
#[derive(Clone)]
pub struct SuggestionService {
    store: Arc<dyn DocumentStore>,
    tree: TreeService,
}

impl SuggestionService {
    pub fn new(store: Arc<dyn DocumentStore>, tree: TreeService) -> Self {
        Self { store, tree }
    }

    fn now_bson() -> Bson {
        Bson::String(Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true))
    }

    /// Validate and persist a pending suggestion.
    pub async fn create(
        &self,
        ctx: &AuthContext,
        req: CreateSuggestionRequest,
    ) -> Result<Suggestion> {
        match req.suggestion_type {
            SuggestionType::Add => {
                let Some(data) = &req.person_data else {
                    return Err(RootlineError::BadRequest(
                        "person_data is required for add suggestions".into(),
                    ));
                };
                if data.name.is_empty() || data.role.is_empty() || data.birth.is_empty() {
                    return Err(RootlineError::BadRequest(
                        "name, role, and birth are required in person_data".into(),
                    ));
                }
                // Add with a parent: the parent must exist
                if !req.target_person_id.is_empty()
                    && load_person(self.store.as_ref(), &req.target_person_id)
                        .await?
                        .is_none()
                {
                    return Err(RootlineError::NotFound("Parent person not found".into()));
                }
            }
            SuggestionType::Edit => {
                if req.target_person_id.is_empty() {
                    return Err(RootlineError::BadRequest(
                        "target_person_id is required for edit suggestions".into(),
                    ));
                }
                if req.person_data.is_none() {
                    return Err(RootlineError::BadRequest(
                        "person_data is required for edit suggestions".into(),
                    ));
                }
                if load_person(self.store.as_ref(), &req.target_person_id)
                    .await?
                    .is_none()
                {
                    return Err(RootlineError::NotFound("Target person not found".into()));
                }
            }
            SuggestionType::Delete => {
                if req.target_person_id.is_empty() {
                    return Err(RootlineError::BadRequest(
                        "target_person_id is required for delete suggestions".into(),
                    ));
                }
                if load_person(self.store.as_ref(), &req.target_person_id)
                    .await?
                    .is_none()
                {
                    return Err(RootlineError::NotFound("Target person not found".into()));
                }
            }
        }

        let now = Utc::now();
        let suggestion = Suggestion {
            id: uuid::Uuid::new_v4().to_string(),
            suggestion_type: req.suggestion_type,
            target_person_id: req.target_person_id,
            person_data: req.person_data,
            message: req.message,
            status: ReviewStatus::Pending,
            user_id: ctx.user_id.clone(),
            user_email: ctx.email.clone(),
            reviewed_by: String::new(),
            reviewer_email: String::new(),
            review_notes: String::new(),
            created_at: now,
            updated_at: now,
        };

        self.store
            .set(
                models::SUGGESTIONS,
                &suggestion.id,
                models::to_document(&suggestion)?,
            )
            .await?;

        info!(
            suggestion_id = %suggestion.id,
            user = %ctx.email,
            kind = suggestion.suggestion_type.as_str(),
            "suggestion submitted"
        );
        Ok(suggestion)
    }

    /// Suggestions by the acting user, optionally filtered by status,
    /// newest first.
    pub async fn my_suggestions(
        &self,
        ctx: &AuthContext,
        status: Option<ReviewStatus>,
    ) -> Result<Vec<SuggestionView>> {
        let mut filter = Filter::new().eq("user_id", ctx.user_id.as_str());
        if let Some(status) = status {
            filter = filter.eq("status", status.as_str());
        }
        self.list_views(filter).await
    }

    /// Every suggestion with the given status, newest first.
    pub async fn all_suggestions(&self, status: ReviewStatus) -> Result<Vec<SuggestionView>> {
        self.list_views(Filter::new().eq("status", status.as_str()))
            .await
    }

    async fn list_views(&self, filter: Filter) -> Result<Vec<SuggestionView>> {
        let mut suggestions: Vec<Suggestion> = self
            .store
            .query(models::SUGGESTIONS, filter)
            .await?
            .into_iter()
            .filter_map(|d| models::from_document(d).ok())
            .collect();
        suggestions.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut views = Vec::with_capacity(suggestions.len());
        for suggestion in suggestions {
            let target_person = match suggestion.suggestion_type {
                SuggestionType::Edit | SuggestionType::Delete
                    if !suggestion.target_person_id.is_empty() =>
                {
                    load_person(self.store.as_ref(), &suggestion.target_person_id).await?
                }
                _ => None,
            };
            views.push(SuggestionView {
                suggestion,
                target_person,
            });
        }
        Ok(views)
    }

    /// Review one suggestion. Approval executes the mutation through the
    /// tree engine first; an execution failure leaves the suggestion
    /// pending and surfaces the engine's error.
    pub async fn review(
        &self,
        suggestion_id: &str,
        approved: bool,
        notes: String,
        reviewer: &AuthContext,
    ) -> Result<ReviewStatus> {
        let suggestion = load_suggestion(self.store.as_ref(), suggestion_id)
            .await?
            .ok_or_else(|| RootlineError::NotFound("Suggestion not found".into()))?;

        if suggestion.status.is_terminal() {
            return Err(RootlineError::Precondition(
                "Suggestion has already been reviewed".into(),
            ));
        }

        let new_status = if approved {
            self.execute(&suggestion).await?;
            ReviewStatus::Approved
        } else {
            ReviewStatus::Rejected
        };

        self.store
            .update(
                models::SUGGESTIONS,
                suggestion_id,
                vec![
                    FieldOp::Set("status".into(), new_status.as_str().into()),
                    FieldOp::Set("reviewed_by".into(), reviewer.user_id.as_str().into()),
                    FieldOp::Set("reviewer_email".into(), reviewer.email.as_str().into()),
                    FieldOp::Set("review_notes".into(), notes.as_str().into()),
                    FieldOp::Set("updated_at".into(), Self::now_bson()),
                ],
            )
            .await?;

        info!(
            suggestion_id,
            status = new_status.as_str(),
            reviewer = %reviewer.email,
            "suggestion reviewed"
        );
        Ok(new_status)
    }

    /// Replay the proposed mutation through the tree engine.
    async fn execute(&self, suggestion: &Suggestion) -> Result<()> {
        match suggestion.suggestion_type {
            SuggestionType::Add => {
                let data = suggestion.person_data.clone().unwrap_or_default();
                let parent_id = if suggestion.target_person_id.is_empty() {
                    None
                } else {
                    Some(suggestion.target_person_id.clone())
                };
                self.tree
                    .create(
                        CreatePersonRequest {
                            name: data.name,
                            role: data.role,
                            birth: data.birth,
                            location: data.location,
                            avatar: data.avatar,
                            bio: data.bio,
                            parent_id,
                            ..Default::default()
                        },
                        &suggestion.user_id,
                    )
                    .await?;
            }
            SuggestionType::Edit => {
                let data = suggestion.person_data.clone().unwrap_or_default();
                // Only non-empty payload fields overwrite the target
                let patch = UpdatePersonRequest {
                    name: non_empty(data.name),
                    role: non_empty(data.role),
                    birth: non_empty(data.birth),
                    location: non_empty(data.location),
                    avatar: non_empty(data.avatar),
                    bio: non_empty(data.bio),
                    ..Default::default()
                };
                self.tree
                    .apply_update(&suggestion.target_person_id, patch)
                    .await?;
            }
            SuggestionType::Delete => {
                self.tree
                    .delete_cascade(&suggestion.target_person_id)
                    .await?;
            }
        }
        Ok(())
    }

    /// Pending suggestions bucketed by group key, sorted by count
    /// descending then earliest first, with cross-group conflicts flagged.
    pub async fn grouped(&self) -> Result<Vec<SuggestionGroup>> {
        let suggestions: Vec<Suggestion> = self
            .store
            .query(models::SUGGESTIONS, Filter::new().eq("status", "pending"))
            .await?
            .into_iter()
            .filter_map(|d| models::from_document(d).ok())
            .collect();

        let mut buckets: HashMap<String, Vec<Suggestion>> = HashMap::new();
        for suggestion in suggestions {
            buckets
                .entry(suggestion.group_key())
                .or_default()
                .push(suggestion);
        }

        let mut groups: Vec<SuggestionGroup> = Vec::with_capacity(buckets.len());
        for (key, mut members) in buckets {
            members.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            let first = members.first().expect("bucket is non-empty");

            let mut user_emails: Vec<String> = Vec::new();
            let mut messages: Vec<String> = Vec::new();
            for member in &members {
                if !member.user_email.is_empty() && !user_emails.contains(&member.user_email) {
                    user_emails.push(member.user_email.clone());
                }
                if !member.message.is_empty() {
                    messages.push(member.message.clone());
                }
            }

            groups.push(SuggestionGroup {
                id: key,
                suggestion_type: first.suggestion_type,
                target_person_id: first.target_person_id.clone(),
                person_data: first.person_data.clone(),
                count: members.len(),
                suggestion_ids: members.iter().map(|s| s.id.clone()).collect(),
                user_emails,
                messages,
                first_created_at: first.created_at,
                last_created_at: members.last().expect("bucket is non-empty").created_at,
                has_conflict: false,
                conflicts_with: Vec::new(),
            });
        }

        mark_conflicts(&mut groups);

        groups.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then(a.first_created_at.cmp(&b.first_created_at))
        });
        Ok(groups)
    }

    /// Review many suggestions through the single-item path. Terminal items
    /// count as failures; an all-failure batch is an error.
    pub async fn batch_review(
        &self,
        suggestion_ids: &[String],
        approved: bool,
        notes: String,
        reviewer: &AuthContext,
    ) -> Result<BatchReviewResult> {
        if suggestion_ids.is_empty() {
            return Err(RootlineError::BadRequest("suggestion_ids is required".into()));
        }

        let mut succeeded = 0usize;
        let mut failed = 0usize;

        for id in suggestion_ids {
            match self.review(id, approved, notes.clone(), reviewer).await {
                Ok(_) => succeeded += 1,
                Err(e) => {
                    warn!(suggestion_id = %id, "batch review item failed: {}", e);
                    failed += 1;
                }
            }
        }

        if succeeded == 0 {
            return Err(RootlineError::BadRequest(
                "All suggestions in the batch failed to process".into(),
            ));
        }

        Ok(BatchReviewResult { succeeded, failed })
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Flag conflicting groups sharing a target: any delete group against any
/// edit group, and every pair of distinct edit groups.
fn mark_conflicts(groups: &mut [SuggestionGroup]) {
    let mut by_target: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, group) in groups.iter().enumerate() {
        if group.target_person_id.is_empty() {
            continue;
        }
        if matches!(
            group.suggestion_type,
            SuggestionType::Edit | SuggestionType::Delete
        ) {
            by_target
                .entry(group.target_person_id.clone())
                .or_default()
                .push(i);
        }
    }

    for indices in by_target.values() {
        for (a_pos, &a) in indices.iter().enumerate() {
            for &b in &indices[a_pos + 1..] {
                let conflict = match (groups[a].suggestion_type, groups[b].suggestion_type) {
                    (SuggestionType::Delete, SuggestionType::Edit)
                    | (SuggestionType::Edit, SuggestionType::Delete)
                    | (SuggestionType::Edit, SuggestionType::Edit) => true,
                    _ => false,
                };
                if conflict {
                    let (id_a, id_b) = (groups[a].id.clone(), groups[b].id.clone());
                    groups[a].has_conflict = true;
                    groups[b].has_conflict = true;
                    if !groups[a].conflicts_with.contains(&id_b) {
                        groups[a].conflicts_with.push(id_b);
                    }
                    if !groups[b].conflicts_with.contains(&id_a) {
                        groups[b].conflicts_with.push(id_a);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::services::integrity::IntegrityService;
    use crate::store::MemoryStore;

    fn setup() -> (Arc<dyn DocumentStore>, TreeService, SuggestionService) {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let integrity = IntegrityService::new(Arc::clone(&store));
        let tree = TreeService::new(Arc::clone(&store), integrity);
        let suggestions = SuggestionService::new(Arc::clone(&store), tree.clone());
        (store, tree, suggestions)
    }

    fn contributor(user_id: &str) -> AuthContext {
        AuthContext {
            user_id: user_id.into(),
            email: format!("{user_id}@x"),
            role: Role::Contributor,
        }
    }

    fn approver() -> AuthContext {
        AuthContext {
            user_id: "co-admin".into(),
            email: "co@x".into(),
            role: Role::CoAdmin,
        }
    }

    async fn seed_person(tree: &TreeService, name: &str) -> Person {
        tree.create(
            CreatePersonRequest {
                name: name.into(),
                role: "Member".into(),
                ..Default::default()
            },
            "admin",
        )
        .await
        .unwrap()
    }

    fn edit_req(target: &str, name: &str) -> CreateSuggestionRequest {
        CreateSuggestionRequest {
            suggestion_type: SuggestionType::Edit,
            target_person_id: target.into(),
            person_data: Some(PersonData {
                name: name.into(),
                ..Default::default()
            }),
            message: String::new(),
        }
    }

    #[tokio::test]
    async fn test_create_validations() {
        let (_, tree, suggestions) = setup();
        let person = seed_person(&tree, "Kid").await;

        // Add without payload
        let err = suggestions
            .create(
                &contributor("c1"),
                CreateSuggestionRequest {
                    suggestion_type: SuggestionType::Add,
                    target_person_id: String::new(),
                    person_data: None,
                    message: String::new(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RootlineError::BadRequest(_)));

        // Add with incomplete payload
        let err = suggestions
            .create(
                &contributor("c1"),
                CreateSuggestionRequest {
                    suggestion_type: SuggestionType::Add,
                    target_person_id: String::new(),
                    person_data: Some(PersonData {
                        name: "X".into(),
                        ..Default::default()
                    }),
                    message: String::new(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RootlineError::BadRequest(_)));

        // Edit of a missing target
        let err = suggestions
            .create(&contributor("c1"), edit_req("ghost", "X"))
            .await
            .unwrap_err();
        assert!(matches!(err, RootlineError::NotFound(_)));

        // Delete without target
        let err = suggestions
            .create(
                &contributor("c1"),
                CreateSuggestionRequest {
                    suggestion_type: SuggestionType::Delete,
                    target_person_id: String::new(),
                    person_data: None,
                    message: String::new(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RootlineError::BadRequest(_)));

        // Valid edit persists pending
        let s = suggestions
            .create(&contributor("c1"), edit_req(&person.id, "Kiddo"))
            .await
            .unwrap();
        assert_eq!(s.status, ReviewStatus::Pending);
    }

    #[tokio::test]
    async fn test_approve_edit_applies_non_empty_fields() {
        let (_, tree, suggestions) = setup();
        let person = seed_person(&tree, "Kid").await;

        let s = suggestions
            .create(&contributor("c1"), edit_req(&person.id, "Kiddo"))
            .await
            .unwrap();

        let status = suggestions
            .review(&s.id, true, String::new(), &approver())
            .await
            .unwrap();
        assert_eq!(status, ReviewStatus::Approved);

        let person = tree.get(&person.id).await.unwrap();
        assert_eq!(person.name, "Kiddo");
        // Empty payload fields did not overwrite
        assert_eq!(person.role, "Member");
    }

    #[tokio::test]
    async fn test_second_review_fails_with_precondition() {
        let (_, tree, suggestions) = setup();
        let person = seed_person(&tree, "Kid").await;

        let s = suggestions
            .create(&contributor("c1"), edit_req(&person.id, "Kiddo"))
            .await
            .unwrap();
        suggestions
            .review(&s.id, true, String::new(), &approver())
            .await
            .unwrap();

        let err = suggestions
            .review(&s.id, true, String::new(), &approver())
            .await
            .unwrap_err();
        assert!(matches!(err, RootlineError::Precondition(_)));
    }

    #[tokio::test]
    async fn test_approve_add_creates_under_parent() {
        let (_, tree, suggestions) = setup();
        let parent = seed_person(&tree, "Parent").await;

        let s = suggestions
            .create(
                &contributor("c1"),
                CreateSuggestionRequest {
                    suggestion_type: SuggestionType::Add,
                    target_person_id: parent.id.clone(),
                    person_data: Some(PersonData {
                        name: "New Kid".into(),
                        role: "Son".into(),
                        birth: "2010".into(),
                        ..Default::default()
                    }),
                    message: String::new(),
                },
            )
            .await
            .unwrap();

        suggestions
            .review(&s.id, true, String::new(), &approver())
            .await
            .unwrap();

        let parent = tree.get(&parent.id).await.unwrap();
        assert_eq!(parent.children.len(), 1);

        let kid = tree.get(&parent.children[0]).await.unwrap();
        assert_eq!(kid.name, "New Kid");
        // The suggestion author owns the created node
        assert_eq!(kid.created_by, "c1");
    }

    #[tokio::test]
    async fn test_approve_delete_runs_cascade() {
        let (_, tree, suggestions) = setup();
        let parent = seed_person(&tree, "Parent").await;
        let kid = tree
            .create(
                CreatePersonRequest {
                    name: "Kid".into(),
                    role: "Son".into(),
                    parent_id: Some(parent.id.clone()),
                    ..Default::default()
                },
                "admin",
            )
            .await
            .unwrap();

        let s = suggestions
            .create(
                &contributor("c1"),
                CreateSuggestionRequest {
                    suggestion_type: SuggestionType::Delete,
                    target_person_id: kid.id.clone(),
                    person_data: None,
                    message: String::new(),
                },
            )
            .await
            .unwrap();

        suggestions
            .review(&s.id, true, String::new(), &approver())
            .await
            .unwrap();

        assert!(tree.get(&kid.id).await.is_err());
        let parent = tree.get(&parent.id).await.unwrap();
        assert!(parent.children.is_empty());
    }

    #[tokio::test]
    async fn test_failed_execution_keeps_suggestion_pending() {
        let (_, tree, suggestions) = setup();
        let person = seed_person(&tree, "Kid").await;

        let s = suggestions
            .create(&contributor("c1"), edit_req(&person.id, "Kiddo"))
            .await
            .unwrap();

        // Target vanishes between filing and review
        tree.delete_cascade(&person.id).await.unwrap();

        // The cascade auto-rejected the pending suggestion, so the review
        // now hits the terminal guard.
        let err = suggestions
            .review(&s.id, true, String::new(), &approver())
            .await
            .unwrap_err();
        assert!(matches!(err, RootlineError::Precondition(_)));
    }

    #[tokio::test]
    async fn test_listings_denormalize_target() {
        let (_, tree, suggestions) = setup();
        let person = seed_person(&tree, "Kid").await;

        suggestions
            .create(&contributor("c1"), edit_req(&person.id, "Kiddo"))
            .await
            .unwrap();

        let mine = suggestions
            .my_suggestions(&contributor("c1"), None)
            .await
            .unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].target_person.as_ref().unwrap().id, person.id);

        let all = suggestions.all_suggestions(ReviewStatus::Pending).await.unwrap();
        assert_eq!(all.len(), 1);

        let none = suggestions
            .my_suggestions(&contributor("someone-else"), None)
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_grouping_accumulates_identical_suggestions() {
        let (_, tree, suggestions) = setup();
        let person = seed_person(&tree, "Kid").await;

        for user in ["c1", "c2", "c3"] {
            suggestions
                .create(&contributor(user), {
                    let mut req = edit_req(&person.id, "Kiddo");
                    req.message = format!("from {user}");
                    req
                })
                .await
                .unwrap();
        }
        // A differently-keyed edit
        suggestions
            .create(&contributor("c4"), edit_req(&person.id, "Other Name"))
            .await
            .unwrap();

        let groups = suggestions.grouped().await.unwrap();
        assert_eq!(groups.len(), 2);

        // Count-descending order
        assert_eq!(groups[0].count, 3);
        assert_eq!(groups[0].user_emails.len(), 3);
        assert_eq!(groups[0].messages.len(), 3);
        assert_eq!(groups[1].count, 1);
        assert!(groups[0].first_created_at <= groups[0].last_created_at);
    }

    #[tokio::test]
    async fn test_conflict_detection_delete_vs_edit() {
        let (_, tree, suggestions) = setup();
        let person = seed_person(&tree, "P").await;

        suggestions
            .create(
                &contributor("c1"),
                CreateSuggestionRequest {
                    suggestion_type: SuggestionType::Delete,
                    target_person_id: person.id.clone(),
                    person_data: None,
                    message: String::new(),
                },
            )
            .await
            .unwrap();
        suggestions
            .create(
                &contributor("c2"),
                CreateSuggestionRequest {
                    suggestion_type: SuggestionType::Delete,
                    target_person_id: person.id.clone(),
                    person_data: None,
                    message: String::new(),
                },
            )
            .await
            .unwrap();
        suggestions
            .create(&contributor("c3"), edit_req(&person.id, "X"))
            .await
            .unwrap();

        let groups = suggestions.grouped().await.unwrap();
        // Two delete suggestions share a group; the edit stands alone
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

    #[tokio::test]
    async fn test_conflict_detection_distinct_edits() {
        let (_, tree, suggestions) = setup();
        let person = seed_person(&tree, "P").await;
        let other = seed_person(&tree, "Q").await;

        suggestions
            .create(&contributor("c1"), edit_req(&person.id, "A"))
            .await
            .unwrap();
        suggestions
            .create(&contributor("c2"), edit_req(&person.id, "B"))
            .await
            .unwrap();
        // An edit on a different target does not conflict
        suggestions
            .create(&contributor("c3"), edit_req(&other.id, "C"))
            .await
            .unwrap();

        let groups = suggestions.grouped().await.unwrap();
        assert_eq!(groups.len(), 3);

        let conflicted: Vec<_> = groups.iter().filter(|g| g.has_conflict).collect();
        assert_eq!(conflicted.len(), 2);
        assert!(conflicted
            .iter()
            .all(|g| g.target_person_id == person.id));
    }

    #[tokio::test]
    async fn test_batch_review_partial_success() {
        let (_, tree, suggestions) = setup();
        let person = seed_person(&tree, "Kid").await;

        let s1 = suggestions
            .create(&contributor("c1"), edit_req(&person.id, "A"))
            .await
            .unwrap();
        let s2 = suggestions
            .create(&contributor("c2"), edit_req(&person.id, "B"))
            .await
            .unwrap();

        // Pre-approve s2 so the batch sees one terminal item
        suggestions
            .review(&s2.id, true, String::new(), &approver())
            .await
            .unwrap();

        let result = suggestions
            .batch_review(
                &[s1.id.clone(), s2.id.clone()],
                true,
                String::new(),
                &approver(),
            )
            .await
            .unwrap();
        assert_eq!(result.succeeded, 1);
        assert_eq!(result.failed, 1);

        // All-terminal batch is an error
        let err = suggestions
            .batch_review(&[s1.id, s2.id], true, String::new(), &approver())
            .await
            .unwrap_err();
        assert!(matches!(err, RootlineError::BadRequest(_)));
    }
}
