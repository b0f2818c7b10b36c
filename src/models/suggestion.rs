//! Suggestion document schema
//!
//! A deferred tree mutation proposed by a contributor. Approval replays the
//! mutation through the tree engine; pending -> approved/rejected is
//! terminal and execution happens exactly once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ReviewStatus;

/// Kind of deferred mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionType {
    Add,
    Edit,
    Delete,
}

impl SuggestionType {
    pub fn as_str(self) -> &'static str {
        match self {
            SuggestionType::Add => "add",
            SuggestionType::Edit => "edit",
            SuggestionType::Delete => "delete",
        }
    }
}

/// Embedded person payload for add/edit suggestions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonData {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub birth: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub bio: String,
}

/// Suggestion document stored in the `suggestions` collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    pub id: String,
    #[serde(rename = "type")]
    pub suggestion_type: SuggestionType,
    /// Parent id for add, subject id for edit/delete; empty for a parentless
    /// add.
    #[serde(default)]
    pub target_person_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub person_data: Option<PersonData>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: ReviewStatus,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub user_email: String,
    #[serde(default)]
    pub reviewed_by: String,
    #[serde(default)]
    pub reviewer_email: String,
    #[serde(default)]
    pub review_notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Suggestion {
    /// Group key bucketing semantically identical suggestions: type and
    /// target, with the payload folded in for add/edit.
    pub fn group_key(&self) -> String {
        match self.suggestion_type {
            SuggestionType::Delete => format!("delete:{}", self.target_person_id),
            SuggestionType::Edit => {
                let data = self.person_data.clone().unwrap_or_default();
                format!(
                    "edit:{}:{}:{}:{}",
                    self.target_person_id, data.name, data.role, data.birth
                )
            }
            SuggestionType::Add => {
                let data = self.person_data.clone().unwrap_or_default();
                format!(
                    "add:{}:{}:{}:{}",
                    self.target_person_id, data.name, data.role, data.birth
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suggestion(
        suggestion_type: SuggestionType,
        target: &str,
        data: Option<PersonData>,
    ) -> Suggestion {
        let now = Utc::now();
        Suggestion {
            id: "s1".into(),
            suggestion_type,
            target_person_id: target.into(),
            person_data: data,
            message: String::new(),
            status: ReviewStatus::Pending,
            user_id: "u1".into(),
            user_email: "u@x".into(),
            reviewed_by: String::new(),
            reviewer_email: String::new(),
            review_notes: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_type_tag_round_trip() {
        let s = suggestion(SuggestionType::Edit, "p1", None);
        let doc = crate::models::to_document(&s).unwrap();
        assert_eq!(doc.get_str("type").unwrap(), "edit");

        let back: Suggestion = crate::models::from_document(doc).unwrap();
        assert_eq!(back.suggestion_type, SuggestionType::Edit);
    }

    #[test]
    fn test_group_keys() {
        let del = suggestion(SuggestionType::Delete, "p1", None);
        assert_eq!(del.group_key(), "delete:p1");

        let edit = suggestion(
            SuggestionType::Edit,
            "p1",
            Some(PersonData {
                name: "X".into(),
                role: "Son".into(),
                birth: "1990".into(),
                ..Default::default()
            }),
        );
        assert_eq!(edit.group_key(), "edit:p1:X:Son:1990");

        let add = suggestion(
            SuggestionType::Add,
            "parent1",
            Some(PersonData {
                name: "New".into(),
                role: "Daughter".into(),
                birth: "2010".into(),
                ..Default::default()
            }),
        );
        assert_eq!(add.group_key(), "add:parent1:New:Daughter:2010");
    }

    #[test]
    fn test_identical_payloads_share_group_key() {
        let data = PersonData {
            name: "X".into(),
            ..Default::default()
        };
        let a = suggestion(SuggestionType::Edit, "p1", Some(data.clone()));
        let b = suggestion(SuggestionType::Edit, "p1", Some(data));
        assert_eq!(a.group_key(), b.group_key());
    }
}
