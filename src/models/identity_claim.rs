//! Identity claim document schema
//!
//! A user's assertion that they are a specific person in the tree. Approval
//! sets the person's `linked_user_id` and marks the user verified, in one
//! transaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ReviewStatus;

/// Identity claim stored in the `identity_claims` collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityClaim {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub user_email: String,
    pub person_id: String,
    /// Denormalized for admin listings
    #[serde(default)]
    pub person_name: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: ReviewStatus,
    #[serde(default)]
    pub reviewed_by: String,
    #[serde(default)]
    pub review_notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IdentityClaim {
    pub fn new(
        id: String,
        user_id: String,
        user_email: String,
        person_id: String,
        person_name: String,
        message: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id,
            user_email,
            person_id,
            person_name,
            message,
            status: ReviewStatus::Pending,
            reviewed_by: String::new(),
            review_notes: String::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let claim = IdentityClaim::new(
            "c1".into(),
            "u1".into(),
            "u@x".into(),
            "p1".into(),
            "Ali".into(),
            "that's me".into(),
        );
        let doc = crate::models::to_document(&claim).unwrap();
        let back: IdentityClaim = crate::models::from_document(doc).unwrap();
        assert_eq!(back.person_id, "p1");
        assert_eq!(back.status, ReviewStatus::Pending);
    }
}
