//! Document schemas
//!
//! One module per collection, mirroring the persisted layout. All documents
//! carry a string `id` plus RFC3339 timestamps; serde defaults keep older,
//! sparser documents readable.

mod identity_claim;
mod permission_request;
mod person;
mod settings;
mod suggestion;
mod user;

pub use identity_claim::IdentityClaim;
pub use permission_request::PermissionRequest;
pub use person::{default_avatar, Person, ProfileSnapshot};
pub use settings::{TreeSettings, TREE_SETTINGS_ID};
pub use suggestion::{PersonData, Suggestion, SuggestionType};
pub use user::User;

use bson::Document;
use serde::{de::DeserializeOwned, Serialize};

use crate::types::Result;

/// Collection names as persisted
pub const PEOPLE: &str = "people";
pub const USERS: &str = "users";
pub const SUGGESTIONS: &str = "suggestions";
pub const PERMISSION_REQUESTS: &str = "permission_requests";
pub const IDENTITY_CLAIMS: &str = "identity_claims";
pub const SETTINGS: &str = "settings";

/// Every collection the store indexes
pub const ALL_COLLECTIONS: [&str; 6] = [
    PEOPLE,
    USERS,
    SUGGESTIONS,
    PERMISSION_REQUESTS,
    IDENTITY_CLAIMS,
    SETTINGS,
];

/// Review lifecycle shared by suggestions, claims, and permission requests.
/// Pending is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl ReviewStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(self) -> bool {
        self != ReviewStatus::Pending
    }
}

/// Serialize a schema value into its stored document form.
pub fn to_document<T: Serialize>(value: &T) -> Result<Document> {
    Ok(bson::to_document(value)?)
}

/// Decode a stored document into a schema value.
pub fn from_document<T: DeserializeOwned>(doc: Document) -> Result<T> {
    Ok(bson::from_document(doc)?)
}
