//! Identity-link service
//!
//! The person owns the user link: a user's "am I linked?" question is
//! answered by querying people for `linked_user_id`, and the user document
//! never stores a person id. Claims go through a pending/approved/rejected
//! lifecycle; approval links user and person in one transaction.

use std::sync::Arc;

use bson::Bson;
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::auth::AuthContext;
use crate::models::{self, IdentityClaim, Person, ProfileSnapshot, ReviewStatus};
use crate::services::integrity::{load_claim, load_person, load_user, IntegrityService};
use crate::store::{DocumentStore, FieldOp, Filter, StoreTxn};
use crate::types::{Result, RootlineError};

/// Current link/claim state for a user
#[derive(Debug, Serialize)]
pub struct MyClaimStatus {
    pub linked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub person: Option<Person>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim: Option<IdentityClaim>,
}

/// Claim lifecycle over the document store
#[derive(Clone)]
pub struct IdentityService {
    store: Arc<dyn DocumentStore>,
    integrity: IntegrityService,
}

impl IdentityService {
    pub fn new(store: Arc<dyn DocumentStore>, integrity: IntegrityService) -> Self {
        Self { store, integrity }
    }

    fn now_bson() -> Bson {
        Bson::String(Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true))
    }

    /// The person this user is linked to, derived by query. Duplicate
    /// holders violate the one-link invariant and are scrubbed lazily.
    pub async fn derived_person(&self, user_id: &str) -> Result<Option<Person>> {
        let docs = self
            .store
            .query(models::PEOPLE, Filter::new().eq("linked_user_id", user_id))
            .await?;

        if docs.len() > 1 {
            let integrity = self.integrity.clone();
            let user_id = user_id.to_string();
            tokio::spawn(async move {
                if let Err(e) = integrity.validate_user_references(&user_id).await {
                    warn!(user_id = %user_id, "duplicate-link scrub failed: {}", e);
                }
            });
        }

        let mut people: Vec<Person> = docs
            .into_iter()
            .filter_map(|d| models::from_document(d).ok())
            .collect();
        people.sort_by(|a: &Person, b: &Person| a.created_at.cmp(&b.created_at));
        Ok(people.into_iter().next())
    }

    /// Submit a claim that the acting user is `person_id`.
    pub async fn claim(
        &self,
        ctx: &AuthContext,
        person_id: &str,
        message: String,
    ) -> Result<IdentityClaim> {
        if self.derived_person(&ctx.user_id).await?.is_some() {
            return Err(RootlineError::Conflict(
                "You are already linked to a person in the tree".into(),
            ));
        }

        let person = load_person(self.store.as_ref(), person_id)
            .await?
            .ok_or_else(|| RootlineError::NotFound("Person not found in the tree".into()))?;

        if !person.linked_user_id.is_empty() {
            return Err(RootlineError::Conflict(
                "This person is already linked to another user".into(),
            ));
        }

        let pending = self
            .store
            .query(
                models::IDENTITY_CLAIMS,
                Filter::new()
                    .eq("user_id", ctx.user_id.as_str())
                    .eq("status", "pending"),
            )
            .await?;
        if !pending.is_empty() {
            return Err(RootlineError::Conflict(
                "You already have a pending identity claim".into(),
            ));
        }

        let claim = IdentityClaim::new(
            uuid::Uuid::new_v4().to_string(),
            ctx.user_id.clone(),
            ctx.email.clone(),
            person_id.to_string(),
            person.name.clone(),
            message,
        );
        self.store
            .set(
                models::IDENTITY_CLAIMS,
                &claim.id,
                models::to_document(&claim)?,
            )
            .await?;

        info!(claim_id = %claim.id, user = %ctx.email, person_id, "identity claim submitted");
        Ok(claim)
    }

    /// The user's link state: derived link first, else their latest claim.
    pub async fn my_claim(&self, ctx: &AuthContext) -> Result<MyClaimStatus> {
        if let Some(person) = self.derived_person(&ctx.user_id).await? {
            return Ok(MyClaimStatus {
                linked: true,
                person: Some(person),
                claim: None,
            });
        }

        let mut claims: Vec<IdentityClaim> = self
            .store
            .query(
                models::IDENTITY_CLAIMS,
                Filter::new().eq("user_id", ctx.user_id.as_str()),
            )
            .await?
            .into_iter()
            .filter_map(|d| models::from_document(d).ok())
            .collect();
        claims.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(MyClaimStatus {
            linked: false,
            person: None,
            claim: claims.into_iter().next(),
        })
    }

    /// Claims filtered by status, newest first.
    pub async fn list(&self, status: ReviewStatus) -> Result<Vec<IdentityClaim>> {
        let mut claims: Vec<IdentityClaim> = self
            .store
            .query(
                models::IDENTITY_CLAIMS,
                Filter::new().eq("status", status.as_str()),
            )
            .await?
            .into_iter()
            .filter_map(|d| models::from_document(d).ok())
            .collect();
        claims.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(claims)
    }

    /// Approve or reject a pending claim. On approval, one transaction
    /// updates the claim, sets the user verified, and points the person at
    /// the user.
    pub async fn review(
        &self,
        claim_id: &str,
        approved: bool,
        notes: String,
        reviewer: &AuthContext,
    ) -> Result<&'static str> {
        let claim = load_claim(self.store.as_ref(), claim_id)
            .await?
            .ok_or_else(|| RootlineError::NotFound("Claim not found".into()))?;

        if claim.status.is_terminal() {
            return Err(RootlineError::Precondition(
                "This claim has already been reviewed".into(),
            ));
        }

        let new_status = if approved { "approved" } else { "rejected" };
        let claim_id_owned = claim_id.to_string();
        let reviewer_id = reviewer.user_id.clone();
        let user_id = claim.user_id.clone();
        let person_id = claim.person_id.clone();

        self.store
            .run_transaction(Box::new(move |tx: &mut dyn StoreTxn| {
                Box::pin(async move {
                    tx.update(
                        models::IDENTITY_CLAIMS,
                        &claim_id_owned,
                        vec![
                            FieldOp::Set("status".into(), new_status.into()),
                            FieldOp::Set("reviewed_by".into(), reviewer_id.as_str().into()),
                            FieldOp::Set("review_notes".into(), notes.as_str().into()),
                            FieldOp::Set("updated_at".into(), Self::now_bson()),
                        ],
                    );

                    if approved {
                        // The person may have been claimed since the claim
                        // was filed; re-check inside the transaction.
                        let person_doc = tx
                            .get(models::PEOPLE, &person_id)
                            .await?
                            .ok_or_else(|| {
                                RootlineError::NotFound("Person no longer exists".into())
                            })?;
                        let person: Person = models::from_document(person_doc)?;
                        if !person.linked_user_id.is_empty()
                            && person.linked_user_id != user_id
                        {
                            return Err(RootlineError::Conflict(
                                "This person is already linked to another user".into(),
                            ));
                        }

                        tx.update(
                            models::USERS,
                            &user_id,
                            vec![
                                FieldOp::Set("is_verified".into(), Bson::Boolean(true)),
                                FieldOp::Set("updated_at".into(), Self::now_bson()),
                            ],
                        );
                        tx.update(
                            models::PEOPLE,
                            &person_id,
                            vec![
                                FieldOp::Set("linked_user_id".into(), user_id.as_str().into()),
                                FieldOp::Set("updated_at".into(), Self::now_bson()),
                            ],
                        );
                    }
                    Ok(())
                })
            }))
            .await?;

        info!(claim_id, status = new_status, reviewer = %reviewer.email, "identity claim reviewed");
        Ok(if approved {
            "Identity claim approved. User is now linked to the tree node."
        } else {
            "Identity claim rejected"
        })
    }

    /// Break a user's link by clearing the owning person's back-pointer.
    /// No user write is needed.
    pub async fn unlink(&self, user_id: &str) -> Result<()> {
        let person = self
            .derived_person(user_id)
            .await?
            .ok_or_else(|| {
                RootlineError::BadRequest("User is not linked to any person".into())
            })?;

        self.store
            .update(
                models::PEOPLE,
                &person.id,
                vec![
                    FieldOp::Set("linked_user_id".into(), "".into()),
                    FieldOp::Set("updated_at".into(), Self::now_bson()),
                ],
            )
            .await?;

        info!(user_id, person_id = %person.id, "unlinked user from person");
        Ok(())
    }

    /// Direct admin link, optionally attaching a fetched profile snapshot.
    /// Same transaction shape as an approved claim review.
    pub async fn link_user_to_person(
        &self,
        user_id: &str,
        person_id: &str,
        profile: Option<ProfileSnapshot>,
    ) -> Result<()> {
        load_user(self.store.as_ref(), user_id)
            .await?
            .ok_or_else(|| RootlineError::NotFound("User not found".into()))?;

        let person = load_person(self.store.as_ref(), person_id)
            .await?
            .ok_or_else(|| RootlineError::NotFound("Person not found".into()))?;
        if !person.linked_user_id.is_empty() && person.linked_user_id != user_id {
            return Err(RootlineError::Conflict(
                "This person is already linked to another user".into(),
            ));
        }
        if self.derived_person(user_id).await?.is_some() {
            return Err(RootlineError::Conflict(
                "User is already linked to a person".into(),
            ));
        }

        let user_id_owned = user_id.to_string();
        let person_id_owned = person_id.to_string();
        self.store
            .run_transaction(Box::new(move |tx: &mut dyn StoreTxn| {
                Box::pin(async move {
                    tx.update(
                        models::USERS,
                        &user_id_owned,
                        vec![
                            FieldOp::Set("is_verified".into(), Bson::Boolean(true)),
                            FieldOp::Set("updated_at".into(), Self::now_bson()),
                        ],
                    );

                    let mut person_ops = vec![
                        FieldOp::Set("linked_user_id".into(), user_id_owned.as_str().into()),
                        FieldOp::Set("updated_at".into(), Self::now_bson()),
                    ];
                    if let Some(profile) = profile {
                        person_ops.push(FieldOp::Set(
                            "instagram_username".into(),
                            profile.username.as_str().into(),
                        ));
                        person_ops.push(FieldOp::Set(
                            "instagram_profile".into(),
                            Bson::Document(bson::to_document(&profile).map_err(|e| {
                                RootlineError::Internal(format!("profile encode: {e}"))
                            })?),
                        ));
                    }
                    tx.update(models::PEOPLE, &person_id_owned, person_ops);
                    Ok(())
                })
            }))
            .await?;

        info!(user_id, person_id, "linked user to person");
        Ok(())
    }

    /// Attach an external profile username (and optional cached snapshot)
    /// to a person.
    pub async fn set_instagram(
        &self,
        person_id: &str,
        username: &str,
        profile: Option<ProfileSnapshot>,
    ) -> Result<Person> {
        load_person(self.store.as_ref(), person_id)
            .await?
            .ok_or_else(|| RootlineError::NotFound("Person not found".into()))?;

        let mut ops = vec![
            FieldOp::Set("instagram_username".into(), username.into()),
            FieldOp::Set("updated_at".into(), Self::now_bson()),
        ];
        match &profile {
            Some(profile) => ops.push(FieldOp::Set(
                "instagram_profile".into(),
                Bson::Document(bson::to_document(profile)?),
            )),
            None => ops.push(FieldOp::Unset("instagram_profile".into())),
        }

        self.store.update(models::PEOPLE, person_id, ops).await?;
        load_person(self.store.as_ref(), person_id)
            .await?
            .ok_or_else(|| RootlineError::NotFound("Person not found".into()))
    }
}
