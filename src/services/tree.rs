//! Tree mutation engine
//!
//! Owns every structural change to the person graph: creation in its three
//! forms, patch updates, cascading deletes, likes, bulk import from
//! indented text, and the lazily-scrubbed read path. Suggestion approval
//! replays mutations through this engine via the unchecked entry points.

use std::collections::HashSet;
use std::sync::Arc;

use bson::Bson;
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};

use crate::auth::{AuthContext, Role};
use crate::models::{self, default_avatar, Person};
use crate::services::integrity::IntegrityService;
use crate::store::{DocumentStore, FieldOp, Filter, StoreTxn, WriteOp};
use crate::types::{Result, RootlineError};

/// Role label given to bulk-imported people
const IMPORT_ROLE: &str = "Family Member";

/// Request to create a person
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreatePersonRequest {
    pub name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub birth: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub bio: String,
    /// Child-of-parent form: link the new person under this parent
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Insert-as-parent form: adopt these existing nodes
    #[serde(default)]
    pub children: Option<Vec<String>>,
}

/// Patch for an existing person; only present fields are applied
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePersonRequest {
    pub name: Option<String>,
    pub role: Option<String>,
    pub gender: Option<String>,
    pub birth: Option<String>,
    pub location: Option<String>,
    pub avatar: Option<String>,
    pub bio: Option<String>,
    pub children: Option<Vec<String>>,
}

/// Tree mutation engine over the document store
#[derive(Clone)]
pub struct TreeService {
    store: Arc<dyn DocumentStore>,
    integrity: IntegrityService,
}

impl TreeService {
    pub fn new(store: Arc<dyn DocumentStore>, integrity: IntegrityService) -> Self {
        Self { store, integrity }
    }

    fn now_bson() -> Bson {
        Bson::String(Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true))
    }

    /// All people, scrubbed: dangling children/liked_by/linked_user_id are
    /// filtered out of the returned value and a background task persists
    /// the repair. The read never blocks on the scrub.
    pub async fn read_all(&self) -> Result<Vec<Person>> {
        let person_docs = self.store.query(models::PEOPLE, Filter::new()).await?;
        let user_docs = self.store.query(models::USERS, Filter::new()).await?;

        let person_ids: HashSet<String> = person_docs
            .iter()
            .filter_map(|d| d.get_str("id").ok().map(str::to_string))
            .collect();
        let user_ids: HashSet<String> = user_docs
            .iter()
            .filter_map(|d| d.get_str("id").ok().map(str::to_string))
            .collect();

        let mut people = Vec::with_capacity(person_docs.len());
        let mut dirty = Vec::new();

        for doc in person_docs {
            let mut person: Person = match models::from_document(doc) {
                Ok(p) => p,
                Err(e) => {
                    warn!("skipping unreadable person document: {}", e);
                    continue;
                }
            };

            let mut needs_cleanup = false;

            let before = person.children.len();
            person.children.retain(|c| person_ids.contains(c));
            if person.children.len() != before {
                needs_cleanup = true;
            }

            let before = person.liked_by.len();
            person.liked_by.retain(|u| user_ids.contains(u));
            if person.liked_by.len() != before {
                person.likes_count = person.liked_by.len() as i64;
                needs_cleanup = true;
            }

            if !person.linked_user_id.is_empty() && !user_ids.contains(&person.linked_user_id) {
                person.linked_user_id.clear();
                needs_cleanup = true;
            }

            if needs_cleanup {
                dirty.push(person.id.clone());
            }
            people.push(person);
        }

        // Persist repairs off the request path, at most one task per call.
        if !dirty.is_empty() {
            let integrity = self.integrity.clone();
            tokio::spawn(async move {
                for id in dirty {
                    if let Err(e) = integrity.validate_person_references(&id).await {
                        warn!(person_id = %id, "background scrub failed: {}", e);
                    }
                }
            });
        }

        Ok(people)
    }

    pub async fn get(&self, id: &str) -> Result<Person> {
        match self.store.get(models::PEOPLE, id).await? {
            Some(doc) => Ok(models::from_document(doc)?),
            None => Err(RootlineError::NotFound("Person not found".into())),
        }
    }

    /// Create a person. `created_by` is the acting user (or the suggestion
    /// author when replayed through the workflow).
    pub async fn create(&self, req: CreatePersonRequest, created_by: &str) -> Result<Person> {
        if req.name.trim().is_empty() {
            return Err(RootlineError::BadRequest("name is required".into()));
        }
        if req.role.trim().is_empty() {
            return Err(RootlineError::BadRequest("role is required".into()));
        }

        let gender = normalize_gender(&req.gender);
        let avatar = if req.avatar.is_empty() {
            default_avatar(&req.name, &gender)
        } else {
            req.avatar.clone()
        };

        let mut person = Person::new(uuid::Uuid::new_v4().to_string(), req.name.clone(), created_by.to_string());
        person.role = req.role.clone();
        person.gender = gender;
        person.birth = req.birth.clone();
        person.location = req.location.clone();
        person.avatar = avatar;
        person.bio = req.bio.clone();
        if let Some(children) = &req.children {
            person.children = children.clone();
        }

        let id = person.id.clone();
        let doc = models::to_document(&person)?;

        match (&req.children, &req.parent_id) {
            // Insert-as-parent: strip each adopted child from its current
            // parent, then write the new node holding them.
            (Some(children), _) if !children.is_empty() => {
                let children = children.clone();
                let id = id.clone();
                self.store
                    .run_transaction(Box::new(move |tx: &mut dyn StoreTxn| {
                        Box::pin(async move {
                            for child_id in &children {
                                let parents = tx
                                    .query(
                                        models::PEOPLE,
                                        Filter::new().array_contains("children", child_id.as_str()),
                                    )
                                    .await?;
                                for parent in parents {
                                    let Ok(parent_id) = parent.get_str("id") else { continue };
                                    tx.update(
                                        models::PEOPLE,
                                        parent_id,
                                        vec![
                                            FieldOp::ArrayRemove(
                                                "children".into(),
                                                child_id.as_str().into(),
                                            ),
                                            FieldOp::Set("updated_at".into(), Self::now_bson()),
                                        ],
                                    );
                                    info!(%child_id, parent_id, "moved child under new parent");
                                }
                            }
                            tx.set(models::PEOPLE, &id, doc);
                            Ok(())
                        })
                    }))
                    .await?;
            }
            // Child-of-parent: read the parent, write the child, add the
            // fresh id via array-union, bump the parent timestamp.
            (_, Some(parent_id)) if !parent_id.is_empty() => {
                let parent_id = parent_id.clone();
                let id = id.clone();
                self.store
                    .run_transaction(Box::new(move |tx: &mut dyn StoreTxn| {
                        Box::pin(async move {
                            let parent = tx.get(models::PEOPLE, &parent_id).await?;
                            if parent.is_none() {
                                return Err(RootlineError::NotFound(
                                    "Parent person not found".into(),
                                ));
                            }
                            tx.set(models::PEOPLE, &id, doc);
                            tx.update(
                                models::PEOPLE,
                                &parent_id,
                                vec![
                                    FieldOp::ArrayUnion("children".into(), id.as_str().into()),
                                    FieldOp::Set("updated_at".into(), Self::now_bson()),
                                ],
                            );
                            Ok(())
                        })
                    }))
                    .await?;
            }
            _ => {
                self.store.set(models::PEOPLE, &id, doc).await?;
            }
        }

        info!(person_id = %person.id, name = %person.name, "created person");
        Ok(person)
    }

    /// Authorized update: only the creator or an admin may edit a node.
    pub async fn update(
        &self,
        id: &str,
        patch: UpdatePersonRequest,
        ctx: &AuthContext,
    ) -> Result<Person> {
        let person = self.get(id).await?;
        authorize_owner(&person, ctx, "You can only edit nodes you created")?;
        self.apply_update(id, patch).await
    }

    /// Apply a patch without ownership checks. Used by the authorized path
    /// above and by suggestion execution, where approval already carries
    /// the authority.
    pub async fn apply_update(&self, id: &str, patch: UpdatePersonRequest) -> Result<Person> {
        let mut person = self.get(id).await?;

        let mut ops = vec![FieldOp::Set("updated_at".into(), Self::now_bson())];

        if let Some(name) = patch.name {
            ops.push(FieldOp::Set("name".into(), name.as_str().into()));
            person.name = name;
        }
        if let Some(role) = patch.role {
            ops.push(FieldOp::Set("role".into(), role.as_str().into()));
            person.role = role;
        }
        if let Some(gender) = patch.gender {
            let gender = normalize_gender(&gender);
            ops.push(FieldOp::Set("gender".into(), gender.as_str().into()));
            person.gender = gender;
        }
        if let Some(birth) = patch.birth {
            ops.push(FieldOp::Set("birth".into(), birth.as_str().into()));
            person.birth = birth;
        }
        if let Some(location) = patch.location {
            ops.push(FieldOp::Set("location".into(), location.as_str().into()));
            person.location = location;
        }
        if let Some(avatar) = patch.avatar {
            ops.push(FieldOp::Set("avatar".into(), avatar.as_str().into()));
            person.avatar = avatar;
        }
        if let Some(bio) = patch.bio {
            ops.push(FieldOp::Set("bio".into(), bio.as_str().into()));
            person.bio = bio;
        }
        if let Some(children) = patch.children {
            ops.push(FieldOp::Set(
                "children".into(),
                Bson::Array(children.iter().map(|c| c.as_str().into()).collect()),
            ));
            person.children = children;
        }

        self.store.update(models::PEOPLE, id, ops).await?;
        person.updated_at = Utc::now();
        Ok(person)
    }

    /// Authorized delete: only the creator or an admin may remove a node.
    pub async fn delete(&self, id: &str, ctx: &AuthContext) -> Result<()> {
        let person = self.get(id).await?;
        authorize_owner(&person, ctx, "You can only delete nodes you created")?;
        self.delete_cascade(id).await
    }

    /// Cascade cleanup, then the primary delete. The cascade is best-effort
    /// and completes before the delete; its failures are logged, not
    /// surfaced.
    pub async fn delete_cascade(&self, id: &str) -> Result<()> {
        self.integrity.on_person_deleted(id).await;
        self.store.delete(models::PEOPLE, id).await?;
        info!(person_id = id, "deleted person");
        Ok(())
    }

    /// Record a like. Single-document transaction: the re-read of
    /// `liked_by` and the write commit atomically, so concurrent likes for
    /// one person serialize.
    pub async fn like(&self, id: &str, user_id: &str) -> Result<()> {
        let id = id.to_string();
        let user_id = user_id.to_string();
        self.store
            .run_transaction(Box::new(move |tx: &mut dyn StoreTxn| {
                Box::pin(async move {
                    let doc = tx
                        .get(models::PEOPLE, &id)
                        .await?
                        .ok_or_else(|| RootlineError::NotFound("Person not found".into()))?;
                    let person: Person = models::from_document(doc)?;

                    if person.liked_by.iter().any(|u| u == &user_id) {
                        return Err(RootlineError::Conflict(
                            "You have already liked this person".into(),
                        ));
                    }

                    tx.update(
                        models::PEOPLE,
                        &id,
                        vec![
                            FieldOp::ArrayUnion("liked_by".into(), user_id.as_str().into()),
                            FieldOp::Set(
                                "likes_count".into(),
                                Bson::Int64(person.liked_by.len() as i64 + 1),
                            ),
                            FieldOp::Set("updated_at".into(), Self::now_bson()),
                        ],
                    );
                    Ok(())
                })
            }))
            .await
    }

    /// Remove a like; rejects with Conflict when the user never liked the
    /// person.
    pub async fn unlike(&self, id: &str, user_id: &str) -> Result<()> {
        let id = id.to_string();
        let user_id = user_id.to_string();
        self.store
            .run_transaction(Box::new(move |tx: &mut dyn StoreTxn| {
                Box::pin(async move {
                    let doc = tx
                        .get(models::PEOPLE, &id)
                        .await?
                        .ok_or_else(|| RootlineError::NotFound("Person not found".into()))?;
                    let person: Person = models::from_document(doc)?;

                    if !person.liked_by.iter().any(|u| u == &user_id) {
                        return Err(RootlineError::Conflict(
                            "You have not liked this person".into(),
                        ));
                    }

                    let new_count = (person.liked_by.len() as i64 - 1).max(0);
                    tx.update(
                        models::PEOPLE,
                        &id,
                        vec![
                            FieldOp::ArrayRemove("liked_by".into(), user_id.as_str().into()),
                            FieldOp::Set("likes_count".into(), Bson::Int64(new_count)),
                            FieldOp::Set("updated_at".into(), Self::now_bson()),
                        ],
                    );
                    Ok(())
                })
            }))
            .await
    }

    /// Delete every person, in batches sized to the store's batch limit.
    pub async fn delete_all(&self) -> Result<usize> {
        let docs = self.store.query(models::PEOPLE, Filter::new()).await?;
        let total = docs.len();

        let deletes: Vec<WriteOp> = docs
            .into_iter()
            .filter_map(|d| d.get_str("id").ok().map(str::to_string))
            .map(|id| WriteOp::Delete {
                collection: models::PEOPLE.to_string(),
                id,
            })
            .collect();

        for chunk in deletes.chunks(self.store.batch_limit()) {
            self.store.batch(chunk.to_vec()).await?;
        }

        info!(count = total, "deleted all people");
        Ok(total)
    }

    /// Bulk import from indented text. Each non-empty line becomes a
    /// person; indentation depth derives the parent edges via a stack.
    pub async fn populate_from_text(&self, text: &str, created_by: &str) -> Result<Vec<Person>> {
        let parsed = parse_indented_tree(text);
        if parsed.is_empty() {
            return Err(RootlineError::BadRequest(
                "No valid entries found in text".into(),
            ));
        }

        let now = Utc::now();
        let mut people = Vec::with_capacity(parsed.len());
        for node in &parsed {
            let mut person = Person::new(node.id.clone(), node.name.clone(), created_by.to_string());
            person.role = IMPORT_ROLE.to_string();
            person.gender = node.gender.clone();
            person.birth = node.birth.clone();
            person.location = node.location.clone();
            person.avatar = default_avatar(&node.name, &node.gender);
            person.children = node.children.clone();
            person.created_at = now;
            person.updated_at = now;
            people.push(person);
        }

        let mut writes = Vec::with_capacity(people.len());
        for person in &people {
            writes.push(WriteOp::Set {
                collection: models::PEOPLE.to_string(),
                id: person.id.clone(),
                doc: models::to_document(person)?,
            });
        }

        for chunk in writes.chunks(self.store.batch_limit()) {
            self.store.batch(chunk.to_vec()).await?;
        }

        info!(count = people.len(), "bulk-imported people from text");
        Ok(people)
    }
}

fn authorize_owner(person: &Person, ctx: &AuthContext, message: &str) -> Result<()> {
    if person.created_by != ctx.user_id && ctx.role != Role::Admin {
        return Err(RootlineError::Forbidden(message.into()));
    }
    Ok(())
}

fn normalize_gender(gender: &str) -> String {
    match gender {
        "male" | "female" => gender.to_string(),
        _ => String::new(),
    }
}

/// A line parsed out of the bulk-import text
#[derive(Debug)]
struct ParsedNode {
    id: String,
    name: String,
    gender: String,
    birth: String,
    location: String,
    depth: usize,
    children: Vec<String>,
}

/// Parse the indentation-encoded text format. The indent unit is the
/// leading-whitespace count of the first indented line (tab = 4 spaces);
/// a line's depth is leading / unit. Parent edges come from a stack: pop
/// while top.depth >= depth, the remaining top is the parent.
fn parse_indented_tree(text: &str) -> Vec<ParsedNode> {
    let mut nodes: Vec<ParsedNode> = Vec::new();
    let mut indent_unit = 0usize;

    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }

        let mut leading = 0usize;
        for c in line.chars() {
            match c {
                '\t' => leading += 4,
                ' ' => leading += 1,
                _ => break,
            }
        }

        if leading > 0 && indent_unit == 0 {
            indent_unit = leading;
        }
        let depth = if indent_unit > 0 { leading / indent_unit } else { 0 };

        let (name, gender, birth, location) = parse_person_line(line.trim());
        if name.is_empty() {
            continue;
        }

        nodes.push(ParsedNode {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            gender,
            birth,
            location,
            depth,
            children: Vec::new(),
        });
    }

    // Stack-derived parent-child edges
    let mut stack: Vec<usize> = Vec::new();
    for i in 0..nodes.len() {
        while let Some(&top) = stack.last() {
            if nodes[top].depth >= nodes[i].depth {
                stack.pop();
            } else {
                break;
            }
        }
        if let Some(&parent) = stack.last() {
            let child_id = nodes[i].id.clone();
            nodes[parent].children.push(child_id);
        }
        stack.push(i);
    }

    nodes
}

/// Parse one line: `NAME [(m|M|f|F)] [b:YYYY | YYYY] [l:LOCATION]`.
/// Gender defaults to male; the location marker consumes the rest of the
/// line; the birth token is `b:YYYY` or a standalone year in 1900-2099.
fn parse_person_line(line: &str) -> (String, String, String, String) {
    let mut name = line.trim().to_string();

    // Gender marker, suffix or inline
    let mut gender = "male".to_string();
    for (marker, value) in [
        ("(m)", "male"),
        ("(M)", "male"),
        ("(f)", "female"),
        ("(F)", "female"),
    ] {
        if name.contains(marker) {
            name = name.replacen(marker, "", 1).trim().to_string();
            gender = value.to_string();
            break;
        }
    }

    // Location marker takes the rest of the line
    let mut location = String::new();
    if let Some(idx) = name.find(" l:") {
        location = name[idx + 3..].trim().to_string();
        name = name[..idx].trim().to_string();
    } else if let Some(idx) = name.find(" loc:") {
        location = name[idx + 5..].trim().to_string();
        name = name[..idx].trim().to_string();
    }

    // Birth: "b:YYYY" or a standalone 4-digit year in range
    let mut birth = String::new();
    if let Some(idx) = name.find(" b:") {
        let rest = &name[idx + 3..];
        let (token, tail) = match rest.find(' ') {
            Some(end) => (&rest[..end], &rest[end..]),
            None => (rest, ""),
        };
        birth = token.trim().to_string();
        name = format!("{} {}", name[..idx].trim(), tail.trim())
            .trim()
            .to_string();
    } else {
        let mut kept: Vec<&str> = Vec::new();
        for token in name.split_whitespace() {
            if birth.is_empty() && is_plausible_year(token) {
                birth = token.to_string();
            } else {
                kept.push(token);
            }
        }
        name = kept.join(" ");
    }

    // Collapse whitespace left behind by marker removal
    name = name.split_whitespace().collect::<Vec<_>>().join(" ");

    (name, gender, birth, location)
}

fn is_plausible_year(token: &str) -> bool {
    token.len() == 4
        && token.chars().all(|c| c.is_ascii_digit())
        && (token.starts_with("19") || token.starts_with("20"))
}
