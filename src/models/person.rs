//! Person document schema
//!
//! Tree node. `children` holds child person ids; a person id appears in at
//! most one other person's `children`. The person also owns the optional
//! back-pointer to a user account (`linked_user_id`) - the user side is
//! always derived by querying this collection.

use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

/// Cached external profile fields, only meaningful while `linked_user_id`
/// is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProfileSnapshot {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub profile_pic_url: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub followers: i64,
}

/// Person document stored in the `people` collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
    pub id: String,
    pub name: String,
    /// Free-text role label, e.g. "Father", "Daughter"
    #[serde(default)]
    pub role: String,
    /// "male", "female", or "" for unspecified
    #[serde(default)]
    pub gender: String,
    /// Birth year or free text
    #[serde(default)]
    pub birth: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub bio: String,
    /// Ordered set of child person ids
    #[serde(default)]
    pub children: Vec<String>,
    /// User who created this node
    #[serde(default)]
    pub created_by: String,
    /// Back-pointer to a user account; empty when unlinked. The person owns
    /// this relationship.
    #[serde(default)]
    pub linked_user_id: String,
    #[serde(default)]
    pub liked_by: Vec<String>,
    #[serde(default)]
    pub likes_count: i64,
    #[serde(default)]
    pub instagram_username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instagram_profile: Option<ProfileSnapshot>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Person {
    /// Create a new person with a fresh timestamp pair.
    pub fn new(id: String, name: String, created_by: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            name,
            role: String::new(),
            gender: String::new(),
            birth: String::new(),
            location: String::new(),
            avatar: String::new(),
            bio: String::new(),
            children: Vec::new(),
            created_by,
            linked_user_id: String::new(),
            liked_by: Vec::new(),
            likes_count: 0,
            instagram_username: String::new(),
            instagram_profile: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Gender-styled default avatar for a person without one.
pub fn default_avatar(name: &str, gender: &str) -> String {
    let seed = utf8_percent_encode(name, NON_ALPHANUMERIC);
    if gender == "female" {
        format!(
            "https://api.dicebear.com/7.x/avataaars/svg?seed={}&backgroundColor=ffdfbf&facialHairProbability=0&top=longHair,hat",
            seed
        )
    } else {
        format!(
            "https://api.dicebear.com/7.x/avataaars/svg?seed={}&backgroundColor=b6e3f4&facialHairProbability=50",
            seed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_round_trip() {
        let mut person = Person::new("p1".into(), "Ali".into(), "u1".into());
        person.children = vec!["c1".into(), "c2".into()];
        person.likes_count = 2;
        person.liked_by = vec!["u1".into(), "u2".into()];

        let doc = crate::models::to_document(&person).unwrap();
        assert_eq!(doc.get_str("id").unwrap(), "p1");
        assert_eq!(doc.get_array("children").unwrap().len(), 2);

        let back: Person = crate::models::from_document(doc).unwrap();
        assert_eq!(back.id, person.id);
        assert_eq!(back.children, person.children);
        assert_eq!(back.likes_count, 2);
    }

    #[test]
    fn test_sparse_document_gets_defaults() {
        let doc = bson::doc! {
            "id": "p1",
            "name": "Ali",
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339(),
        };
        let person: Person = crate::models::from_document(doc).unwrap();
        assert!(person.children.is_empty());
        assert_eq!(person.linked_user_id, "");
        assert_eq!(person.likes_count, 0);
    }

    #[test]
    fn test_default_avatar_encodes_seed() {
        let avatar = default_avatar("Ali Reza", "male");
        assert!(avatar.contains("seed=Ali%20Reza"));
        assert!(avatar.contains("facialHairProbability=50"));

        let avatar = default_avatar("Maryam", "female");
        assert!(avatar.contains("longHair"));
    }
}
