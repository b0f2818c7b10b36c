//! User document schema
//!
//! Holds credentials and the assigned role. There is deliberately no
//! `person_id` field: the user-to-person link is derived by querying the
//! people collection for `linked_user_id`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::Role;

/// User document stored in the `users` collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    /// Argon2 PHC-formatted hash. Never exposed through the API; response
    /// types are built per-handler.
    #[serde(default)]
    pub password_hash: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub is_admin: bool,
    /// Family tree the user registered against
    #[serde(default)]
    pub tree_name: String,
    /// Registration heuristics input, kept for admin review
    #[serde(default)]
    pub father_name: String,
    #[serde(default)]
    pub birth_year: String,
    #[serde(default)]
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(id: String, email: String, password_hash: String, role: Role) -> Self {
        let now = Utc::now();
        Self {
            id,
            email,
            password_hash,
            role,
            is_admin: role == Role::Admin,
            tree_name: String::new(),
            father_name: String::new(),
            birth_year: String::new(),
            is_verified: false,
            created_at: now,
            updated_at: now,
        }
    }
}
