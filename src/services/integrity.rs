//! Referential-integrity service
//!
//! Cross-collection cleanup runs before a person or user document is
//! deleted, plus the lazy scrub used when lists are read. The store offers
//! no multi-collection transaction, so each cleanup step is best-effort:
//! a failed step is logged and the remaining steps still run.

use std::collections::HashSet;
use std::sync::Arc;

use bson::Bson;
use chrono::Utc;
use tracing::{info, warn};

use crate::models::{self, IdentityClaim, Person, Suggestion, User};
use crate::store::{DocumentStore, FieldOp, Filter};
use crate::types::Result;

const NOTE_PERSON_DELETED: &str = "Auto-rejected: target person was deleted";
const NOTE_USER_DELETED: &str = "Auto-rejected: user account deleted";

/// Cascading cleanup and lazy scrub over the document store
#[derive(Clone)]
pub struct IntegrityService {
    store: Arc<dyn DocumentStore>,
}

impl IntegrityService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    fn now_bson() -> Bson {
        Bson::String(Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true))
    }

    /// Clean up every reference to a person. Must run before the person
    /// document itself is deleted.
    pub async fn on_person_deleted(&self, person_id: &str) {
        info!(person_id, "cleaning up references for deleted person");

        // 1. Clear derived flags on the linked user, if any. The link lives
        //    on the person, so read it there.
        if let Err(e) = self.clear_linked_user_flags(person_id).await {
            warn!(person_id, "failed to clear linked user flags: {}", e);
        }

        // 2. Remove the person from any parent's children array.
        if let Err(e) = self.remove_from_parent_children(person_id).await {
            warn!(person_id, "failed to remove from parent children: {}", e);
        }

        // 3. Orphaned children become roots; they are not deleted.

        // 4. Auto-reject pending suggestions targeting this person.
        if let Err(e) = self.reject_suggestions_for_person(person_id).await {
            warn!(person_id, "failed to reject suggestions: {}", e);
        }

        // 5. Auto-reject pending identity claims for this person.
        if let Err(e) = self.reject_claims_for_person(person_id).await {
            warn!(person_id, "failed to reject identity claims: {}", e);
        }
    }

    /// Clean up every reference to a user. Must run before the user
    /// document itself is deleted. `created_by`/`reviewed_by` fields are
    /// preserved as historical pointers.
    pub async fn on_user_deleted(&self, user_id: &str) {
        info!(user_id, "cleaning up references for deleted user");

        if let Err(e) = self.clear_person_user_links(user_id).await {
            warn!(user_id, "failed to clear person links: {}", e);
        }

        if let Err(e) = self.remove_from_liked_by(user_id).await {
            warn!(user_id, "failed to remove from liked_by: {}", e);
        }

        if let Err(e) = self
            .reject_pending_authored(models::PERMISSION_REQUESTS, user_id, None)
            .await
        {
            warn!(user_id, "failed to cancel permission requests: {}", e);
        }

        if let Err(e) = self
            .reject_pending_authored(models::IDENTITY_CLAIMS, user_id, Some(NOTE_USER_DELETED))
            .await
        {
            warn!(user_id, "failed to cancel identity claims: {}", e);
        }

        if let Err(e) = self
            .reject_pending_authored(models::SUGGESTIONS, user_id, Some(NOTE_USER_DELETED))
            .await
        {
            warn!(user_id, "failed to cancel suggestions: {}", e);
        }
    }

    async fn clear_linked_user_flags(&self, person_id: &str) -> Result<()> {
        let Some(doc) = self.store.get(models::PEOPLE, person_id).await? else {
            return Ok(());
        };
        let person: Person = models::from_document(doc)?;
        if person.linked_user_id.is_empty() {
            return Ok(());
        }

        if let Err(e) = self
            .store
            .update(
                models::USERS,
                &person.linked_user_id,
                vec![
                    FieldOp::Set("is_verified".into(), Bson::Boolean(false)),
                    FieldOp::Set("updated_at".into(), Self::now_bson()),
                ],
            )
            .await
        {
            warn!(
                user_id = %person.linked_user_id,
                "failed to clear verification flag: {}", e
            );
        } else {
            info!(user_id = %person.linked_user_id, "cleared derived link flags");
        }
        Ok(())
    }

    async fn remove_from_parent_children(&self, person_id: &str) -> Result<()> {
        let parents = self
            .store
            .query(
                models::PEOPLE,
                Filter::new().array_contains("children", person_id),
            )
            .await?;

        for parent in parents {
            let Ok(parent_id) = parent.get_str("id") else { continue };
            if let Err(e) = self
                .store
                .update(
                    models::PEOPLE,
                    parent_id,
                    vec![
                        FieldOp::ArrayRemove("children".into(), person_id.into()),
                        FieldOp::Set("updated_at".into(), Self::now_bson()),
                    ],
                )
                .await
            {
                warn!(parent_id, "failed to remove child reference: {}", e);
            } else {
                info!(parent_id, person_id, "removed person from parent children");
            }
        }
        Ok(())
    }

    async fn reject_suggestions_for_person(&self, person_id: &str) -> Result<()> {
        let pending = self
            .store
            .query(
                models::SUGGESTIONS,
                Filter::new()
                    .eq("target_person_id", person_id)
                    .eq("status", "pending"),
            )
            .await?;

        for doc in pending {
            let Ok(id) = doc.get_str("id") else { continue };
            if let Err(e) = self
                .store
                .update(
                    models::SUGGESTIONS,
                    id,
                    vec![
                        FieldOp::Set("status".into(), "rejected".into()),
                        FieldOp::Set("review_notes".into(), NOTE_PERSON_DELETED.into()),
                        FieldOp::Set("updated_at".into(), Self::now_bson()),
                    ],
                )
                .await
            {
                warn!(suggestion_id = id, "failed to auto-reject suggestion: {}", e);
            } else {
                info!(suggestion_id = id, "auto-rejected suggestion (person deleted)");
            }
        }
        Ok(())
    }

    async fn reject_claims_for_person(&self, person_id: &str) -> Result<()> {
        let pending = self
            .store
            .query(
                models::IDENTITY_CLAIMS,
                Filter::new()
                    .eq("person_id", person_id)
                    .eq("status", "pending"),
            )
            .await?;

        for doc in pending {
            let Ok(id) = doc.get_str("id") else { continue };
            if let Err(e) = self
                .store
                .update(
                    models::IDENTITY_CLAIMS,
                    id,
                    vec![
                        FieldOp::Set("status".into(), "rejected".into()),
                        FieldOp::Set("review_notes".into(), NOTE_PERSON_DELETED.into()),
                        FieldOp::Set("updated_at".into(), Self::now_bson()),
                    ],
                )
                .await
            {
                warn!(claim_id = id, "failed to auto-reject identity claim: {}", e);
            } else {
                info!(claim_id = id, "auto-rejected identity claim (person deleted)");
            }
        }
        Ok(())
    }

    async fn clear_person_user_links(&self, user_id: &str) -> Result<()> {
        let people = self
            .store
            .query(models::PEOPLE, Filter::new().eq("linked_user_id", user_id))
            .await?;

        for doc in people {
            let Ok(person_id) = doc.get_str("id") else { continue };
            if let Err(e) = self
                .store
                .update(
                    models::PEOPLE,
                    person_id,
                    vec![
                        FieldOp::Set("linked_user_id".into(), "".into()),
                        FieldOp::Set("updated_at".into(), Self::now_bson()),
                    ],
                )
                .await
            {
                warn!(person_id, "failed to clear user link: {}", e);
            } else {
                info!(person_id, "cleared user link");
            }
        }
        Ok(())
    }

    async fn remove_from_liked_by(&self, user_id: &str) -> Result<()> {
        let people = self
            .store
            .query(
                models::PEOPLE,
                Filter::new().array_contains("liked_by", user_id),
            )
            .await?;

        for doc in people {
            let Ok(person_id) = doc.get_str("id") else { continue };
            if let Err(e) = self
                .store
                .update(
                    models::PEOPLE,
                    person_id,
                    vec![
                        FieldOp::ArrayRemove("liked_by".into(), user_id.into()),
                        FieldOp::Increment("likes_count".into(), -1),
                        FieldOp::Set("updated_at".into(), Self::now_bson()),
                    ],
                )
                .await
            {
                warn!(person_id, "failed to remove like: {}", e);
            }
        }
        Ok(())
    }

    async fn reject_pending_authored(
        &self,
        collection: &str,
        user_id: &str,
        note: Option<&str>,
    ) -> Result<()> {
        let pending = self
            .store
            .query(
                collection,
                Filter::new().eq("user_id", user_id).eq("status", "pending"),
            )
            .await?;

        for doc in pending {
            let Ok(id) = doc.get_str("id") else { continue };
            let mut ops = vec![
                FieldOp::Set("status".into(), "rejected".into()),
                FieldOp::Set("updated_at".into(), Self::now_bson()),
            ];
            if let Some(note) = note {
                ops.push(FieldOp::Set("review_notes".into(), note.into()));
            }
            if let Err(e) = self.store.update(collection, id, ops).await {
                warn!(collection, id, "failed to auto-reject pending item: {}", e);
            }
        }
        Ok(())
    }

    /// Repair a person's dangling references in place. Returns true when a
    /// cleanup write was performed.
    pub async fn validate_person_references(&self, person_id: &str) -> Result<bool> {
        let Some(doc) = self.store.get(models::PEOPLE, person_id).await? else {
            return Ok(false);
        };
        let person: Person = models::from_document(doc)?;

        let person_ids = self.collect_ids(models::PEOPLE).await?;
        let user_ids = self.collect_ids(models::USERS).await?;

        let mut ops = Vec::new();

        let valid_children: Vec<String> = person
            .children
            .iter()
            .filter(|c| person_ids.contains(*c))
            .cloned()
            .collect();
        if valid_children.len() != person.children.len() {
            info!(
                person_id,
                removed = person.children.len() - valid_children.len(),
                "scrubbing dangling child references"
            );
            ops.push(FieldOp::Set(
                "children".into(),
                Bson::Array(valid_children.iter().map(|c| c.clone().into()).collect()),
            ));
        }

        let valid_liked_by: Vec<String> = person
            .liked_by
            .iter()
            .filter(|u| user_ids.contains(*u))
            .cloned()
            .collect();
        if valid_liked_by.len() != person.liked_by.len() {
            info!(
                person_id,
                removed = person.liked_by.len() - valid_liked_by.len(),
                "scrubbing dangling liked_by references"
            );
            ops.push(FieldOp::Set(
                "liked_by".into(),
                Bson::Array(valid_liked_by.iter().map(|u| u.clone().into()).collect()),
            ));
            ops.push(FieldOp::Set(
                "likes_count".into(),
                Bson::Int64(valid_liked_by.len() as i64),
            ));
        }

        if !person.linked_user_id.is_empty() && !user_ids.contains(&person.linked_user_id) {
            info!(person_id, "scrubbing dangling linked_user_id");
            ops.push(FieldOp::Set("linked_user_id".into(), "".into()));
        }

        if ops.is_empty() {
            return Ok(false);
        }

        ops.push(FieldOp::Set("updated_at".into(), Self::now_bson()));
        self.store.update(models::PEOPLE, person_id, ops).await?;
        Ok(true)
    }

    /// Repair the user side of the identity link: at most one person may
    /// hold a given `linked_user_id`. Keeps the earliest-created holder and
    /// clears the rest. Returns true when a cleanup write was performed.
    pub async fn validate_user_references(&self, user_id: &str) -> Result<bool> {
        let docs = self
            .store
            .query(models::PEOPLE, Filter::new().eq("linked_user_id", user_id))
            .await?;
        if docs.len() <= 1 {
            return Ok(false);
        }

        let mut holders: Vec<Person> = Vec::new();
        for doc in docs {
            if let Ok(p) = models::from_document::<Person>(doc) {
                holders.push(p);
            }
        }
        holders.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        warn!(
            user_id,
            holders = holders.len(),
            "multiple people share one linked user, clearing duplicates"
        );

        for person in holders.iter().skip(1) {
            if let Err(e) = self
                .store
                .update(
                    models::PEOPLE,
                    &person.id,
                    vec![
                        FieldOp::Set("linked_user_id".into(), "".into()),
                        FieldOp::Set("updated_at".into(), Self::now_bson()),
                    ],
                )
                .await
            {
                warn!(person_id = %person.id, "failed to clear duplicate link: {}", e);
            }
        }
        Ok(true)
    }

    async fn collect_ids(&self, collection: &str) -> Result<HashSet<String>> {
        let docs = self.store.query(collection, Filter::new()).await?;
        Ok(docs
            .into_iter()
            .filter_map(|d| d.get_str("id").ok().map(str::to_string))
            .collect())
    }
}

// Typed read helpers used in tests and by the suggestion/identity services.
pub(crate) async fn load_person(
    store: &dyn DocumentStore,
    id: &str,
) -> Result<Option<Person>> {
    match store.get(models::PEOPLE, id).await? {
        Some(doc) => Ok(Some(models::from_document(doc)?)),
        None => Ok(None),
    }
}

pub(crate) async fn load_user(store: &dyn DocumentStore, id: &str) -> Result<Option<User>> {
    match store.get(models::USERS, id).await? {
        Some(doc) => Ok(Some(models::from_document(doc)?)),
        None => Ok(None),
    }
}

pub(crate) async fn load_suggestion(
    store: &dyn DocumentStore,
    id: &str,
) -> Result<Option<Suggestion>> {
    match store.get(models::SUGGESTIONS, id).await? {
        Some(doc) => Ok(Some(models::from_document(doc)?)),
        None => Ok(None),
    }
}

pub(crate) async fn load_claim(
    store: &dyn DocumentStore,
    id: &str,
) -> Result<Option<IdentityClaim>> {
    match store.get(models::IDENTITY_CLAIMS, id).await? {
        Some(doc) => Ok(Some(models::from_document(doc)?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::models::{PersonData, ReviewStatus, SuggestionType};
    use crate::store::MemoryStore;

    async fn seed_person(store: &dyn DocumentStore, person: &Person) {
        store
            .set(models::PEOPLE, &person.id, models::to_document(person).unwrap())
            .await
            .unwrap();
    }

    async fn seed_user(store: &dyn DocumentStore, user: &User) {
        store
            .set(models::USERS, &user.id, models::to_document(user).unwrap())
            .await
            .unwrap();
    }

    fn test_suggestion(id: &str, target: &str, user_id: &str) -> Suggestion {
        let now = Utc::now();
        Suggestion {
            id: id.into(),
            suggestion_type: SuggestionType::Edit,
            target_person_id: target.into(),
            person_data: Some(PersonData::default()),
            message: String::new(),
            status: ReviewStatus::Pending,
            user_id: user_id.into(),
            user_email: format!("{user_id}@x"),
            reviewed_by: String::new(),
            reviewer_email: String::new(),
            review_notes: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_person_cascade() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let integrity = IntegrityService::new(Arc::clone(&store));

        let mut user = User::new("u1".into(), "u@x".into(), String::new(), Role::Viewer);
        user.is_verified = true;
        seed_user(store.as_ref(), &user).await;

        let mut target = Person::new("p1".into(), "Target".into(), "u1".into());
        target.linked_user_id = "u1".into();
        seed_person(store.as_ref(), &target).await;

        let mut parent = Person::new("p0".into(), "Parent".into(), "u1".into());
        parent.children = vec!["p1".into(), "p2".into()];
        seed_person(store.as_ref(), &parent).await;

        let suggestion = test_suggestion("s1", "p1", "u9");
        store
            .set(models::SUGGESTIONS, "s1", models::to_document(&suggestion).unwrap())
            .await
            .unwrap();

        let claim = IdentityClaim::new(
            "c1".into(),
            "u9".into(),
            "u9@x".into(),
            "p1".into(),
            "Target".into(),
            String::new(),
        );
        store
            .set(models::IDENTITY_CLAIMS, "c1", models::to_document(&claim).unwrap())
            .await
            .unwrap();

        integrity.on_person_deleted("p1").await;

        // Parent no longer references the person
        let parent = load_person(store.as_ref(), "p0").await.unwrap().unwrap();
        assert_eq!(parent.children, vec!["p2".to_string()]);

        // Linked user lost derived flags
        let user = load_user(store.as_ref(), "u1").await.unwrap().unwrap();
        assert!(!user.is_verified);

        // Pending suggestion and claim were auto-rejected
        let suggestion = load_suggestion(store.as_ref(), "s1").await.unwrap().unwrap();
        assert_eq!(suggestion.status, ReviewStatus::Rejected);
        assert_eq!(suggestion.review_notes, NOTE_PERSON_DELETED);

        let claim = load_claim(store.as_ref(), "c1").await.unwrap().unwrap();
        assert_eq!(claim.status, ReviewStatus::Rejected);
    }

    #[tokio::test]
    async fn test_user_cascade() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let integrity = IntegrityService::new(Arc::clone(&store));

        let user = User::new("u1".into(), "u@x".into(), String::new(), Role::Contributor);
        seed_user(store.as_ref(), &user).await;

        let mut linked = Person::new("p1".into(), "Linked".into(), "admin".into());
        linked.linked_user_id = "u1".into();
        seed_person(store.as_ref(), &linked).await;

        let mut liked = Person::new("p2".into(), "Liked".into(), "admin".into());
        liked.liked_by = vec!["u1".into(), "u2".into()];
        liked.likes_count = 2;
        seed_person(store.as_ref(), &liked).await;

        let suggestion = test_suggestion("s1", "p2", "u1");
        store
            .set(models::SUGGESTIONS, "s1", models::to_document(&suggestion).unwrap())
            .await
            .unwrap();

        integrity.on_user_deleted("u1").await;

        let linked = load_person(store.as_ref(), "p1").await.unwrap().unwrap();
        assert_eq!(linked.linked_user_id, "");

        let liked = load_person(store.as_ref(), "p2").await.unwrap().unwrap();
        assert_eq!(liked.liked_by, vec!["u2".to_string()]);
        assert_eq!(liked.likes_count, 1);

        let suggestion = load_suggestion(store.as_ref(), "s1").await.unwrap().unwrap();
        assert_eq!(suggestion.status, ReviewStatus::Rejected);
        assert_eq!(suggestion.review_notes, NOTE_USER_DELETED);
    }

    #[tokio::test]
    async fn test_validate_person_references_scrubs_dangling() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let integrity = IntegrityService::new(Arc::clone(&store));

        seed_user(
            store.as_ref(),
            &User::new("u1".into(), "u@x".into(), String::new(), Role::Viewer),
        )
        .await;

        let kid = Person::new("kid".into(), "Kid".into(), "u1".into());
        seed_person(store.as_ref(), &kid).await;

        let mut person = Person::new("p1".into(), "P".into(), "u1".into());
        person.children = vec!["kid".into(), "ghost-child".into()];
        person.liked_by = vec!["u1".into(), "ghost-user".into()];
        person.likes_count = 2;
        person.linked_user_id = "ghost-user".into();
        seed_person(store.as_ref(), &person).await;

        let changed = integrity.validate_person_references("p1").await.unwrap();
        assert!(changed);

        let person = load_person(store.as_ref(), "p1").await.unwrap().unwrap();
        assert_eq!(person.children, vec!["kid".to_string()]);
        assert_eq!(person.liked_by, vec!["u1".to_string()]);
        assert_eq!(person.likes_count, 1);
        assert_eq!(person.linked_user_id, "");

        // Second pass finds nothing to repair
        assert!(!integrity.validate_person_references("p1").await.unwrap());
    }

    #[tokio::test]
    async fn test_validate_user_references_clears_duplicate_links() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let integrity = IntegrityService::new(Arc::clone(&store));

        let mut first = Person::new("p1".into(), "First".into(), "admin".into());
        first.linked_user_id = "u1".into();
        first.created_at = Utc::now() - chrono::Duration::hours(1);
        seed_person(store.as_ref(), &first).await;

        let mut second = Person::new("p2".into(), "Second".into(), "admin".into());
        second.linked_user_id = "u1".into();
        seed_person(store.as_ref(), &second).await;

        assert!(integrity.validate_user_references("u1").await.unwrap());

        let first = load_person(store.as_ref(), "p1").await.unwrap().unwrap();
        let second = load_person(store.as_ref(), "p2").await.unwrap().unwrap();
        assert_eq!(first.linked_user_id, "u1");
        assert_eq!(second.linked_user_id, "");
    }
}
