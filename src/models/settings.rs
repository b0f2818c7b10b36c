//! Settings documents
//!
//! The `settings` collection holds a single `tree` document with the
//! admin-configured tree name that registration must match.

use serde::{Deserialize, Serialize};

/// Id of the singleton tree settings document
pub const TREE_SETTINGS_ID: &str = "tree";

/// Tree-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TreeSettings {
    #[serde(default)]
    pub tree_name: String,
}
