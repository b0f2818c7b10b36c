//! Permission request document schema
//!
//! A user's request to be elevated to a higher role. At most one pending
//! request per user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ReviewStatus;
use crate::auth::Role;

/// Permission request stored in the `permission_requests` collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionRequest {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub user_email: String,
    pub requested_role: Role,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: ReviewStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PermissionRequest {
    pub fn new(id: String, user_id: String, user_email: String, requested_role: Role) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id,
            user_email,
            requested_role,
            message: String::new(),
            status: ReviewStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}
